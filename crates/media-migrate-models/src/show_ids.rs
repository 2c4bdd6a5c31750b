use serde::{Deserialize, Serialize};

/// External identifiers attached to a show on the source service.
///
/// Serializd keys shows by their TMDB id, so `tmdb_id` is the one the
/// matcher cares about. The rest are kept for logging and for a stable
/// identity key when a show carries no TMDB id at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShowIds {
    pub trakt_id: Option<u64>,
    pub slug: Option<String>,
    pub tmdb_id: Option<u32>,
    pub imdb_id: Option<String>,
    pub tvdb_id: Option<u32>,
}

impl ShowIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if all ID fields are empty
    pub fn is_empty(&self) -> bool {
        self.trakt_id.is_none()
            && self.slug.is_none()
            && self.tmdb_id.is_none()
            && self.imdb_id.is_none()
            && self.tvdb_id.is_none()
    }

    /// Stable key used to memoise matches within a run.
    ///
    /// Prefers the source-native trakt id, then the external ids.
    pub fn identity_key(&self) -> Option<String> {
        self.trakt_id
            .map(|id| format!("trakt:{}", id))
            .or_else(|| self.tmdb_id.map(|id| format!("tmdb:{}", id)))
            .or_else(|| self.imdb_id.clone())
            .or_else(|| self.tvdb_id.map(|id| format!("tvdb:{}", id)))
            .or_else(|| self.slug.clone())
    }

    /// Fill in any missing ids from `other`. Existing values are kept.
    pub fn merge(&mut self, other: &ShowIds) {
        if self.trakt_id.is_none() {
            self.trakt_id = other.trakt_id;
        }
        if self.slug.is_none() {
            self.slug = other.slug.clone();
        }
        if self.tmdb_id.is_none() {
            self.tmdb_id = other.tmdb_id;
        }
        if self.imdb_id.is_none() {
            self.imdb_id = other.imdb_id.clone();
        }
        if self.tvdb_id.is_none() {
            self.tvdb_id = other.tvdb_id;
        }
    }
}
