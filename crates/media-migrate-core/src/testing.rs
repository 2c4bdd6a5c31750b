//! In-memory source and destination used by the core tests.

use async_trait::async_trait;
use media_migrate_models::{DestinationShow, SearchHit, SeasonInfo, ShowIds, WatchedEpisode, WatchedShow};
use media_migrate_sources::{CancellationFlag, Destination, HistorySource, MigrateError};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

pub(crate) fn show(title: &str, year: Option<u32>, tmdb_id: Option<u32>) -> WatchedShow {
    let ids = ShowIds {
        slug: Some(title.to_lowercase().replace(' ', "-")),
        tmdb_id,
        ..ShowIds::default()
    };
    WatchedShow::new(title, year, ids)
}

pub(crate) fn watched(show: WatchedShow, season: u32, episodes: impl IntoIterator<Item = u32>) -> WatchedShow {
    show.with_episodes(episodes.into_iter().map(|e| WatchedEpisode::new(season, e)))
}

pub(crate) fn season(season_id: u64, season_number: u32, episodes: u32) -> SeasonInfo {
    SeasonInfo {
        season_id,
        season_number,
        episode_numbers: (1..=episodes).collect(),
    }
}

#[derive(Default)]
struct DestinationState {
    shows: HashMap<u32, DestinationShow>,
    search_hits: Vec<SearchHit>,
    seasons: HashMap<(u32, u32), SeasonInfo>,
    logged: HashMap<u64, BTreeSet<u32>>,
    lookup_error: Option<fn() -> MigrateError>,
    write_error: Option<fn() -> MigrateError>,
    failing_episodes: Vec<(u64, u32)>,
    bulk_fails: bool,
    cancel_on_write: Option<CancellationFlag>,
    login_fails: bool,
    authenticated: bool,
    calls: Vec<String>,
    episode_writes: Vec<(u64, Vec<u32>)>,
    season_writes: Vec<Vec<u64>>,
}

/// Clones share state, so a test can keep one while the runner owns another.
#[derive(Clone, Default)]
pub(crate) struct FakeDestination {
    state: Arc<Mutex<DestinationState>>,
}

impl FakeDestination {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn edit(self, f: impl FnOnce(&mut DestinationState)) -> Self {
        f(&mut *self.state.lock().unwrap());
        self
    }

    pub(crate) fn with_show(self, show: DestinationShow) -> Self {
        self.edit(|s| {
            s.shows.insert(show.id, show);
        })
    }

    pub(crate) fn with_search_hits(self, hits: Vec<SearchHit>) -> Self {
        self.edit(|s| s.search_hits = hits)
    }

    pub(crate) fn with_season(self, show_id: u32, season: SeasonInfo) -> Self {
        self.edit(|s| {
            s.seasons.insert((show_id, season.season_number), season);
        })
    }

    pub(crate) fn with_logged(self, season_id: u64, episodes: impl IntoIterator<Item = u32>) -> Self {
        self.edit(|s| s.logged.entry(season_id).or_default().extend(episodes))
    }

    pub(crate) fn failing_lookups(self, error: fn() -> MigrateError) -> Self {
        self.edit(|s| s.lookup_error = Some(error))
    }

    pub(crate) fn failing_writes(self, error: fn() -> MigrateError) -> Self {
        self.edit(|s| s.write_error = Some(error))
    }

    pub(crate) fn failing_episode(self, season_id: u64, episode: u32) -> Self {
        self.edit(|s| s.failing_episodes.push((season_id, episode)))
    }

    /// Sets `flag` as the first episode write goes out
    pub(crate) fn cancelling_on_write(self, flag: CancellationFlag) -> Self {
        self.edit(|s| s.cancel_on_write = Some(flag))
    }

    pub(crate) fn failing_bulk(self) -> Self {
        self.edit(|s| s.bulk_fails = true)
    }

    pub(crate) fn failing_login(self) -> Self {
        self.edit(|s| s.login_fails = true)
    }

    pub(crate) fn calls(&self, name: &str) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|c| *c == name).count()
    }

    pub(crate) fn write_calls(&self) -> usize {
        self.calls("log_episodes") + self.calls("log_seasons")
    }

    pub(crate) fn episode_writes(&self) -> Vec<(u64, Vec<u32>)> {
        self.state.lock().unwrap().episode_writes.clone()
    }

    pub(crate) fn season_writes(&self) -> Vec<Vec<u64>> {
        self.state.lock().unwrap().season_writes.clone()
    }

    fn record(&self, name: &str) -> std::sync::MutexGuard<'_, DestinationState> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(name.to_string());
        state
    }
}

#[async_trait]
impl Destination for FakeDestination {
    fn destination_name(&self) -> &str {
        "Fake"
    }

    async fn authenticate(&mut self) -> Result<(), MigrateError> {
        let mut state = self.record("authenticate");
        if state.login_fails {
            return Err(MigrateError::InvalidCredentials { service: "serializd" });
        }
        state.authenticated = true;
        Ok(())
    }

    fn is_authenticated(&self) -> bool {
        self.state.lock().unwrap().authenticated
    }

    async fn show_by_tmdb_id(&self, tmdb_id: u32) -> Result<Option<DestinationShow>, MigrateError> {
        let state = self.record("show");
        if let Some(error) = state.lookup_error {
            return Err(error());
        }
        Ok(state.shows.get(&tmdb_id).cloned())
    }

    async fn search_shows(&self, _query: &str) -> Result<Vec<SearchHit>, MigrateError> {
        let state = self.record("search");
        if let Some(error) = state.lookup_error {
            return Err(error());
        }
        Ok(state.search_hits.clone())
    }

    async fn season(&self, show_id: u32, season_number: u32) -> Result<Option<SeasonInfo>, MigrateError> {
        let state = self.record("season");
        Ok(state.seasons.get(&(show_id, season_number)).cloned())
    }

    async fn logged_episodes(&self, _show_id: u32, season: &SeasonInfo) -> Result<BTreeSet<u32>, MigrateError> {
        let state = self.record("logged");
        Ok(state.logged.get(&season.season_id).cloned().unwrap_or_default())
    }

    async fn log_episodes(&self, show_id: u32, season: &SeasonInfo, episodes: &[u32]) -> Result<(), MigrateError> {
        let mut state = self.record("log_episodes");
        if let Some(flag) = state.cancel_on_write.take() {
            flag.cancel();
        }
        if let Some(error) = state.write_error {
            return Err(error());
        }
        if episodes
            .iter()
            .any(|e| state.failing_episodes.contains(&(season.season_id, *e)))
        {
            // What the real client reports once a write's retries run out
            return Err(MigrateError::MarkFailed {
                target: format!("show {} season {} episodes {:?}", show_id, season.season_number, episodes),
                message: "serializd is unavailable: gave up after 3 attempts: 500 Internal Server Error - "
                    .to_string(),
            });
        }
        state.episode_writes.push((season.season_id, episodes.to_vec()));
        state.logged.entry(season.season_id).or_default().extend(episodes);
        Ok(())
    }

    async fn log_seasons(&self, show_id: u32, season_ids: &[u64]) -> Result<(), MigrateError> {
        let mut state = self.record("log_seasons");
        if let Some(error) = state.write_error {
            return Err(error());
        }
        if state.bulk_fails {
            return Err(MigrateError::MarkFailed {
                target: format!("show {} seasons", show_id),
                message: "500 Internal Server Error".to_string(),
            });
        }
        state.season_writes.push(season_ids.to_vec());
        let full: Vec<(u64, Vec<u32>)> = state
            .seasons
            .values()
            .filter(|s| season_ids.contains(&s.season_id))
            .map(|s| (s.season_id, s.episode_numbers.clone()))
            .collect();
        for (season_id, episodes) in full {
            state.logged.entry(season_id).or_default().extend(episodes);
        }
        Ok(())
    }
}

#[derive(Default)]
struct SourceState {
    shows: Vec<WatchedShow>,
    auth_error: Option<fn() -> MigrateError>,
    authenticated: bool,
    fetches: usize,
}

#[derive(Clone, Default)]
pub(crate) struct FakeSource {
    state: Arc<Mutex<SourceState>>,
}

impl FakeSource {
    pub(crate) fn new(shows: Vec<WatchedShow>) -> Self {
        let source = Self::default();
        source.state.lock().unwrap().shows = shows;
        source
    }

    pub(crate) fn failing_auth(self, error: fn() -> MigrateError) -> Self {
        self.state.lock().unwrap().auth_error = Some(error);
        self
    }

    pub(crate) fn fetches(&self) -> usize {
        self.state.lock().unwrap().fetches
    }

    pub(crate) fn is_authed(&self) -> bool {
        self.state.lock().unwrap().authenticated
    }
}

#[async_trait]
impl HistorySource for FakeSource {
    fn source_name(&self) -> &str {
        "Fake"
    }

    async fn authenticate(&mut self) -> Result<(), MigrateError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.auth_error {
            return Err(error());
        }
        state.authenticated = true;
        Ok(())
    }

    fn is_authenticated(&self) -> bool {
        self.state.lock().unwrap().authenticated
    }

    async fn fetch_watched_shows(&mut self) -> Result<Vec<WatchedShow>, MigrateError> {
        let mut state = self.state.lock().unwrap();
        state.fetches += 1;
        Ok(state.shows.clone())
    }
}
