pub mod similarity;
pub mod matcher;
pub mod marker;
pub mod progress;
pub mod runner;

#[cfg(test)]
mod testing;

pub use matcher::ShowMatcher;
pub use marker::{MarkingOptions, WatchMarker};
pub use progress::{LogHealth, ProgressLogger, ProgressSink};
pub use runner::MigrationRunner;
pub use media_migrate_sources::CancellationFlag;
