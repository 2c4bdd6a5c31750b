use async_trait::async_trait;
use media_migrate_models::{DestinationShow, SearchHit, SeasonInfo, WatchedShow};
use std::collections::BTreeSet;

use crate::error::MigrateError;

/// The service watch history is read from.
#[async_trait]
pub trait HistorySource: Send {
    fn source_name(&self) -> &str;

    async fn authenticate(&mut self) -> Result<(), MigrateError>;
    fn is_authenticated(&self) -> bool;

    /// Every watched show with its watched episodes.
    ///
    /// Pagination is handled internally. A rejected token triggers a single
    /// re-authentication before the error is returned.
    async fn fetch_watched_shows(&mut self) -> Result<Vec<WatchedShow>, MigrateError>;
}

/// The service watch history is written to.
///
/// Implementations gate every call through their rate limiter.
#[async_trait]
pub trait Destination: Send + Sync {
    fn destination_name(&self) -> &str;

    async fn authenticate(&mut self) -> Result<(), MigrateError>;
    fn is_authenticated(&self) -> bool;

    // Catalog lookups
    async fn show_by_tmdb_id(&self, tmdb_id: u32) -> Result<Option<DestinationShow>, MigrateError>;
    async fn search_shows(&self, query: &str) -> Result<Vec<SearchHit>, MigrateError>;
    async fn season(&self, show_id: u32, season_number: u32) -> Result<Option<SeasonInfo>, MigrateError>;

    /// Episode numbers of `season` the user already has logged
    async fn logged_episodes(&self, show_id: u32, season: &SeasonInfo) -> Result<BTreeSet<u32>, MigrateError>;

    // Writes
    async fn log_episodes(&self, show_id: u32, season: &SeasonInfo, episodes: &[u32]) -> Result<(), MigrateError>;
    async fn log_seasons(&self, show_id: u32, season_ids: &[u64]) -> Result<(), MigrateError>;
}
