pub mod show_ids;
pub mod watched_show;
pub mod destination;
pub mod migration_result;

pub use show_ids::ShowIds;
pub use watched_show::{WatchedEpisode, WatchedShow};
pub use destination::{DestinationShow, DestinationShowMatch, MatchMethod, SearchHit, SeasonInfo};
pub use migration_result::{MigrationResult, MigrationSummary, RunOutcome, Tally};
