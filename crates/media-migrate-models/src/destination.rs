use serde::{Deserialize, Serialize};
use std::fmt;

/// A show as the destination catalog describes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DestinationShow {
    pub id: u32,
    pub name: String,
    pub year: Option<u32>,
}

/// One entry from a destination title search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub id: u32,
    pub name: String,
    pub year: Option<u32>,
}

/// Season metadata needed to log episodes against it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeasonInfo {
    pub season_id: u64,
    pub season_number: u32,
    pub episode_numbers: Vec<u32>,
}

impl SeasonInfo {
    pub fn episode_total(&self) -> usize {
        self.episode_numbers.len()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MatchMethod {
    /// Looked up directly by the show's TMDB id
    ExternalId,
    /// Best-scoring title search hit above the similarity threshold
    TitleSearch,
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMethod::ExternalId => write!(f, "external-id"),
            MatchMethod::TitleSearch => write!(f, "title-search"),
        }
    }
}

/// Outcome of resolving one source show against the destination catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DestinationShowMatch {
    Matched {
        show_id: u32,
        method: MatchMethod,
        score: f64,
    },
    Unresolved {
        reason: String,
    },
}

impl DestinationShowMatch {
    pub fn show_id(&self) -> Option<u32> {
        match self {
            DestinationShowMatch::Matched { show_id, .. } => Some(*show_id),
            DestinationShowMatch::Unresolved { .. } => None,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, DestinationShowMatch::Matched { .. })
    }
}
