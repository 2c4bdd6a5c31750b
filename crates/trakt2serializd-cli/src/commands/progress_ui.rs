use indicatif::{ProgressBar, ProgressStyle};
use media_migrate_core::ProgressSink;
use media_migrate_models::{MigrationResult, MigrationSummary, Tally, WatchedShow};
use std::io::IsTerminal;

/// Progress bar over the show list. Hidden when not attached to a terminal.
pub struct MigrationUI {
    bar: ProgressBar,
}

impl MigrationUI {
    pub fn new(visible: bool) -> Self {
        let bar = if visible && is_interactive() {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█▉▊▋▌▍▎▏  "),
            );
            bar
        } else {
            tracing::debug!(
                operation = "ui_init",
                mode = "non_interactive",
                "Progress bar disabled, using structured logging"
            );
            ProgressBar::hidden()
        };
        Self { bar }
    }
}

impl ProgressSink for MigrationUI {
    fn on_run_start(&mut self, total_shows: usize) -> anyhow::Result<()> {
        self.bar.set_length(total_shows as u64);
        self.bar.set_message("Starting migration...");
        Ok(())
    }

    fn on_show_start(&mut self, _index: usize, show: &WatchedShow) -> anyhow::Result<()> {
        self.bar.set_message(show.display_name());
        Ok(())
    }

    fn on_show_complete(&mut self, _result: &MigrationResult, tally: &Tally) -> anyhow::Result<()> {
        self.bar.inc(1);
        self.bar.set_message(format!(
            "{} matched, {} unresolved, {} failed",
            tally.matched, tally.unresolved, tally.failed
        ));
        Ok(())
    }

    fn on_run_complete(&mut self, _summary: &MigrationSummary) -> anyhow::Result<()> {
        self.bar.finish_and_clear();
        Ok(())
    }
}

pub fn is_interactive() -> bool {
    std::io::stdout().is_terminal() && std::io::stderr().is_terminal()
}
