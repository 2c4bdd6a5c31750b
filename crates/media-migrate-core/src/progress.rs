use media_migrate_models::{DestinationShowMatch, MigrationResult, MigrationSummary, Tally, WatchedShow};
use std::fmt::Display;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Receives run progress alongside the `migration` log target.
///
/// A failing sink never interrupts the run; its errors are only counted.
pub trait ProgressSink: Send {
    fn on_run_start(&mut self, _total_shows: usize) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_show_start(&mut self, _index: usize, _show: &WatchedShow) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_show_complete(&mut self, _result: &MigrationResult, _tally: &Tally) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_run_complete(&mut self, _summary: &MigrationSummary) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Failure counter shared with writers outside the logger, such as the
/// `migration.log` file writer.
#[derive(Debug, Clone, Default)]
pub struct LogHealth(Arc<AtomicUsize>);

impl LogHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_failure(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failures(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

/// Structured progress events for one run.
///
/// Every event is a `tracing` record under the `migration` target carrying
/// `show`, `action` and `outcome` fields.
#[derive(Default)]
pub struct ProgressLogger {
    sinks: Vec<Box<dyn ProgressSink>>,
    health: LogHealth,
    dry_run: bool,
}

impl ProgressLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Box<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_health(mut self, health: LogHealth) -> Self {
        self.health = health;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn failures(&self) -> usize {
        self.health.failures()
    }

    pub fn event(&self, show: &str, action: &str, outcome: impl Display) {
        info!(target: "migration", show = show, action = action, outcome = %outcome, dry_run = self.dry_run);
    }

    pub fn warning(&self, show: &str, action: &str, outcome: impl Display) {
        warn!(target: "migration", show = show, action = action, outcome = %outcome, dry_run = self.dry_run);
    }

    fn each_sink(&mut self, mut f: impl FnMut(&mut dyn ProgressSink) -> anyhow::Result<()>) {
        for sink in &mut self.sinks {
            if let Err(e) = f(sink.as_mut()) {
                self.health.record_failure();
                debug!("Progress sink failed: {}", e);
            }
        }
    }

    pub fn run_started(&mut self, total_shows: usize) {
        self.event("*", "start", format_args!("{} shows to migrate", total_shows));
        self.each_sink(|sink| sink.on_run_start(total_shows));
    }

    pub fn show_started(&mut self, index: usize, total: usize, show: &WatchedShow) {
        self.event(
            &show.display_name(),
            "begin",
            format_args!("{}/{} with {} episodes", index + 1, total, show.episode_count()),
        );
        self.each_sink(|sink| sink.on_show_start(index, show));
    }

    pub fn show_finished(&mut self, result: &MigrationResult, tally: &Tally) {
        let outcome = describe(result);
        if result.is_clean() {
            self.event(&result.title, "done", &outcome);
        } else {
            self.warning(&result.title, "done", &outcome);
        }
        info!(
            target: "migration",
            "Progress: {} matched, {} unresolved, {} failed",
            tally.matched, tally.unresolved, tally.failed
        );
        self.each_sink(|sink| sink.on_show_complete(result, tally));
    }

    /// Write one line per show plus the totals, then settle `log_failures`
    pub fn flush_summary(&mut self, summary: &mut MigrationSummary) {
        for result in &summary.results {
            info!(
                target: "migration",
                show = %result.title,
                action = "summary",
                outcome = %describe(result),
                errors = result.errors.len(),
            );
        }
        info!(
            target: "migration",
            action = "summary",
            matched = summary.tally.matched,
            unresolved = summary.tally.unresolved,
            failed = summary.tally.failed,
            episodes_marked = summary.episodes_marked(),
            interrupted = summary.interrupted,
            aborted = summary.aborted.as_deref().unwrap_or(""),
            "Migration finished"
        );

        let finished: &MigrationSummary = summary;
        self.each_sink(|sink| sink.on_run_complete(finished));
        summary.log_failures = self.health.failures();
    }
}

/// Short human description of a show's outcome
pub fn describe(result: &MigrationResult) -> String {
    match &result.destination {
        DestinationShowMatch::Unresolved { reason } => format!("unresolved: {}", reason),
        DestinationShowMatch::Matched { show_id, method, score } => {
            let mut outcome = format!(
                "show {} via {} ({:.2}): {} episodes, {} seasons marked, {} already logged",
                show_id, method, score, result.episodes_marked, result.seasons_marked, result.already_watched
            );
            if result.has_errors() {
                outcome.push_str(&format!(", {} errors", result.errors.len()));
            }
            outcome
        }
    }
}
