use media_migrate_models::{DestinationShowMatch, MigrationResult, MigrationSummary, WatchedShow};
use media_migrate_sources::{CancellationFlag, Destination, HistorySource, MigrateError};
use std::collections::HashMap;
use tracing::{info, instrument, warn};

use crate::marker::{MarkingOptions, WatchMarker};
use crate::matcher::ShowMatcher;
use crate::progress::ProgressLogger;

/// Drives one migration: authenticate, fetch, then match and mark each show
/// in order.
pub struct MigrationRunner {
    source: Box<dyn HistorySource>,
    destination: Box<dyn Destination>,
    matcher: ShowMatcher,
    marker: WatchMarker,
    progress: ProgressLogger,
    cancel: CancellationFlag,
}

impl MigrationRunner {
    pub fn new(
        source: Box<dyn HistorySource>,
        destination: Box<dyn Destination>,
        progress: ProgressLogger,
        cancel: CancellationFlag,
    ) -> Self {
        Self {
            source,
            destination,
            matcher: ShowMatcher::default(),
            marker: WatchMarker::new(MarkingOptions::default()),
            progress,
            cancel,
        }
    }

    pub fn with_matcher(mut self, matcher: ShowMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_marker(mut self, marker: WatchMarker) -> Self {
        self.marker = marker;
        self
    }

    /// Log in to the destination first, then the source. Nothing is fetched
    /// until both succeed.
    pub async fn authenticate(&mut self) -> Result<(), MigrateError> {
        info!("Authenticating with {}", self.destination.destination_name());
        self.destination.authenticate().await?;
        if self.cancel.is_cancelled() {
            return Err(MigrateError::Interrupted);
        }

        info!("Authenticating with {}", self.source.source_name());
        self.source.authenticate().await?;
        if self.cancel.is_cancelled() {
            return Err(MigrateError::Interrupted);
        }
        Ok(())
    }

    pub async fn fetch(&mut self) -> Result<Vec<WatchedShow>, MigrateError> {
        if !self.source.is_authenticated() || !self.destination.is_authenticated() {
            self.authenticate().await?;
        }
        let shows = self.source.fetch_watched_shows().await?;
        info!(
            "Fetched {} shows from {}",
            shows.len(),
            self.source.source_name()
        );
        Ok(shows)
    }

    /// Migrate `shows` one at a time.
    ///
    /// Per-show failures are recorded and the loop moves on. A fatal error
    /// or cancellation ends the loop early; the summary is flushed either way.
    #[instrument(skip_all, fields(shows = shows.len()))]
    pub async fn migrate(&mut self, shows: Vec<WatchedShow>) -> MigrationSummary {
        let mut summary = MigrationSummary::new();
        let mut matches: HashMap<String, DestinationShowMatch> = HashMap::new();
        let total = shows.len();
        self.progress.run_started(total);

        for (index, show) in shows.iter().enumerate() {
            if self.cancel.is_cancelled() {
                summary.interrupted = true;
                break;
            }
            self.progress.show_started(index, total, show);

            let (result, error) = self.migrate_show(show, &mut matches).await;
            summary.push(result);
            if let Some(result) = summary.results.last() {
                self.progress.show_finished(result, &summary.tally);
            }

            match error {
                None => {}
                Some(MigrateError::Interrupted) => {
                    summary.interrupted = true;
                    break;
                }
                Some(e) => {
                    warn!("Aborting migration: {}", e);
                    summary.aborted = Some(e.to_string());
                    break;
                }
            }
        }

        summary.finish();
        self.progress.flush_summary(&mut summary);
        summary
    }

    /// Result for one show, plus the fatal error that stopped it, if any
    async fn migrate_show(
        &self,
        show: &WatchedShow,
        matches: &mut HashMap<String, DestinationShowMatch>,
    ) -> (MigrationResult, Option<MigrateError>) {
        let name = show.display_name();
        let key = show.ids.identity_key();

        let memoised = key.as_ref().and_then(|k| matches.get(k)).cloned();
        let resolved = match memoised {
            Some(found) => Ok(found),
            None => self.matcher.resolve(self.destination.as_ref(), show).await,
        };

        let destination = match resolved {
            Ok(destination) => destination,
            Err(e) => {
                let mut result = MigrationResult::new(
                    show.title.clone(),
                    show.ids.clone(),
                    DestinationShowMatch::Unresolved {
                        reason: format!("lookup aborted: {}", e),
                    },
                );
                result.record_error(e.to_string());
                return (result, Some(e));
            }
        };
        if let Some(key) = key {
            matches.insert(key, destination.clone());
        }

        let mut result = MigrationResult::new(show.title.clone(), show.ids.clone(), destination.clone());
        match destination {
            DestinationShowMatch::Unresolved { reason } => {
                self.progress.warning(&name, "match", format_args!("unresolved: {}", reason));
                (result, None)
            }
            DestinationShowMatch::Matched { show_id, method, score } => {
                self.progress.event(
                    &name,
                    "match",
                    format_args!("show {} via {} ({:.2})", show_id, method, score),
                );
                let marked = self
                    .marker
                    .mark_show(
                        self.destination.as_ref(),
                        show_id,
                        show,
                        &mut result,
                        &self.progress,
                        &self.cancel,
                    )
                    .await;
                match marked {
                    Ok(()) => (result, None),
                    Err(e) => {
                        if !matches!(e, MigrateError::Interrupted) {
                            result.record_error(e.to_string());
                        }
                        (result, Some(e))
                    }
                }
            }
        }
    }

    /// Authenticate, fetch and migrate.
    ///
    /// Errors before migration starts are returned as-is; everything after
    /// is reported through the summary.
    pub async fn run(&mut self) -> Result<MigrationSummary, MigrateError> {
        self.authenticate().await?;
        let shows = self.fetch().await?;
        Ok(self.migrate(shows).await)
    }
}
