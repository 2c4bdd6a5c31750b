use media_migrate_config::MarkingConfig;
use media_migrate_models::{MigrationResult, SeasonInfo, WatchedShow};
use media_migrate_sources::{CancellationFlag, Destination, MigrateError};
use std::collections::BTreeSet;

use crate::progress::ProgressLogger;

#[derive(Debug, Clone)]
pub struct MarkingOptions {
    pub prefer_season_bulk: bool,
    /// Share of a season's episodes that must be watched for the bulk call
    pub season_complete_ratio: f64,
    /// Plan and log writes without sending them
    pub dry_run: bool,
}

impl Default for MarkingOptions {
    fn default() -> Self {
        Self::from_config(&MarkingConfig::default(), false)
    }
}

impl MarkingOptions {
    pub fn from_config(config: &MarkingConfig, dry_run: bool) -> Self {
        Self {
            prefer_season_bulk: config.prefer_season_bulk,
            season_complete_ratio: config.season_complete_ratio,
            dry_run,
        }
    }
}

/// A season whose pending episodes still have to be written
struct PendingSeason {
    info: SeasonInfo,
    episodes: Vec<u32>,
}

/// The destination show being written, and what every write reports to
struct ShowTarget<'a> {
    destination: &'a dyn Destination,
    show_id: u32,
    name: &'a str,
    progress: &'a ProgressLogger,
    cancel: &'a CancellationFlag,
}

impl ShowTarget<'_> {
    fn check_cancelled(&self) -> Result<(), MigrateError> {
        if self.cancel.is_cancelled() {
            return Err(MigrateError::Interrupted);
        }
        Ok(())
    }
}

/// Writes a matched show's watched episodes to the destination.
pub struct WatchMarker {
    options: MarkingOptions,
}

impl WatchMarker {
    pub fn new(options: MarkingOptions) -> Self {
        Self { options }
    }

    /// Mark every watched season of `show` on destination show `show_id`.
    ///
    /// Non-fatal failures land in `result.errors`. A fatal error, or
    /// cancellation before the next request, stops the show and is returned.
    pub async fn mark_show(
        &self,
        destination: &dyn Destination,
        show_id: u32,
        show: &WatchedShow,
        result: &mut MigrationResult,
        progress: &ProgressLogger,
        cancel: &CancellationFlag,
    ) -> Result<(), MigrateError> {
        let name = show.display_name();
        let target = ShowTarget {
            destination,
            show_id,
            name: &name,
            progress,
            cancel,
        };
        let mut bulk: Vec<PendingSeason> = Vec::new();

        for (season_number, watched) in show.seasons() {
            target.check_cancelled()?;

            let info = match destination.season(show_id, season_number).await {
                Ok(Some(info)) => info,
                Ok(None) => {
                    result.record_error(format!("season {} not found on {}", season_number, destination.destination_name()));
                    progress.warning(&name, "season_lookup", format_args!("season {} missing", season_number));
                    continue;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    result.record_error(format!("season {} lookup failed: {}", season_number, e));
                    progress.warning(&name, "season_lookup", format_args!("season {}: {}", season_number, e));
                    continue;
                }
            };

            let logged = match destination.logged_episodes(show_id, &info).await {
                Ok(logged) => logged,
                Err(e) if e.is_fatal() => return Err(e),
                Err(_) => BTreeSet::new(),
            };

            let pending: Vec<u32> = watched.difference(&logged).copied().collect();
            result.already_watched += watched.len() - pending.len();
            if pending.is_empty() {
                progress.event(&name, "skip_season", format_args!("season {} already logged", season_number));
                continue;
            }

            let pending = PendingSeason { info, episodes: pending };
            if self.qualifies_for_bulk(&pending.info, &watched) {
                bulk.push(pending);
            } else {
                self.mark_episodes(&target, &pending, result).await?;
            }
        }

        if !bulk.is_empty() {
            self.mark_seasons(&target, &bulk, result).await?;
        }
        Ok(())
    }

    fn qualifies_for_bulk(&self, season: &SeasonInfo, watched: &BTreeSet<u32>) -> bool {
        if !self.options.prefer_season_bulk || season.episode_numbers.is_empty() {
            return false;
        }
        let covered = season
            .episode_numbers
            .iter()
            .filter(|e| watched.contains(e))
            .count();
        covered as f64 / season.episode_total() as f64 + 1e-9 >= self.options.season_complete_ratio
    }

    async fn mark_seasons(
        &self,
        target: &ShowTarget<'_>,
        seasons: &[PendingSeason],
        result: &mut MigrationResult,
    ) -> Result<(), MigrateError> {
        let season_ids: Vec<u64> = seasons.iter().map(|s| s.info.season_id).collect();
        let numbers: Vec<u32> = seasons.iter().map(|s| s.info.season_number).collect();
        let name = target.name;

        if self.options.dry_run {
            target.progress.event(name, "mark_seasons", format_args!("would mark seasons {:?}", numbers));
            result.seasons_marked += seasons.len();
            result.episodes_marked += seasons.iter().map(|s| s.episodes.len()).sum::<usize>();
            return Ok(());
        }

        target.check_cancelled()?;
        match target.destination.log_seasons(target.show_id, &season_ids).await {
            Ok(()) => {
                result.seasons_marked += seasons.len();
                result.episodes_marked += seasons.iter().map(|s| s.episodes.len()).sum::<usize>();
                target.progress.event(name, "mark_seasons", format_args!("marked seasons {:?}", numbers));
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                target.progress.warning(
                    name,
                    "mark_seasons",
                    format_args!("bulk call failed ({}), falling back to episodes", e),
                );
                for season in seasons {
                    self.mark_episodes(target, season, result).await?;
                }
                Ok(())
            }
        }
    }

    /// One write per episode. Cancellation is checked before every request.
    async fn mark_episodes(
        &self,
        target: &ShowTarget<'_>,
        season: &PendingSeason,
        result: &mut MigrationResult,
    ) -> Result<(), MigrateError> {
        let season_number = season.info.season_number;
        let name = target.name;

        for &episode in &season.episodes {
            let label = format!("S{:02}E{:02}", season_number, episode);
            if self.options.dry_run {
                target.progress.event(name, "mark_episode", format_args!("would mark {}", label));
                result.episodes_marked += 1;
                continue;
            }
            target.check_cancelled()?;

            match target
                .destination
                .log_episodes(target.show_id, &season.info, &[episode])
                .await
            {
                Ok(()) => {
                    result.episodes_marked += 1;
                    target.progress.event(name, "mark_episode", format_args!("marked {}", label));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    result.record_error(format!("{}: {}", label, e));
                    target.progress.warning(name, "mark_episode", format_args!("{} failed: {}", label, e));
                }
            }
        }
        Ok(())
    }
}
