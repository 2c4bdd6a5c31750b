use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::show_ids::ShowIds;

/// A (season, episode) pair the user has watched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatchedEpisode {
    pub season: u32,
    pub episode: u32,
}

impl WatchedEpisode {
    pub fn new(season: u32, episode: u32) -> Self {
        Self { season, episode }
    }
}

impl fmt::Display for WatchedEpisode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{:02}E{:02}", self.season, self.episode)
    }
}

/// A show from the source history together with every episode watched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchedShow {
    pub title: String,
    pub year: Option<u32>,
    pub ids: ShowIds,
    pub episodes: BTreeSet<WatchedEpisode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_watched_at: Option<DateTime<Utc>>,
}

impl WatchedShow {
    pub fn new(title: impl Into<String>, year: Option<u32>, ids: ShowIds) -> Self {
        Self {
            title: title.into(),
            year,
            ids,
            episodes: BTreeSet::new(),
            last_watched_at: None,
        }
    }

    pub fn with_episodes<I>(mut self, episodes: I) -> Self
    where
        I: IntoIterator<Item = WatchedEpisode>,
    {
        self.episodes.extend(episodes);
        self
    }

    /// Watched episode numbers grouped by season, ascending.
    pub fn seasons(&self) -> BTreeMap<u32, BTreeSet<u32>> {
        let mut seasons: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();
        for ep in &self.episodes {
            seasons.entry(ep.season).or_default().insert(ep.episode);
        }
        seasons
    }

    pub fn episode_count(&self) -> usize {
        self.episodes.len()
    }

    /// "Title (Year)" or just "Title" when the year is unknown
    pub fn display_name(&self) -> String {
        match self.year {
            Some(year) => format!("{} ({})", self.title, year),
            None => self.title.clone(),
        }
    }
}
