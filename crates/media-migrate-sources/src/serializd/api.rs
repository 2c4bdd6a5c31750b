use media_migrate_models::{DestinationShow, SearchHit, SeasonInfo};
use reqwest::RequestBuilder;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;

use crate::error::MigrateError;

pub(crate) const SERVICE: &str = "serializd";
pub(crate) const API_BASE: &str = "https://www.serializd.com/api";
const SITE: &str = "https://www.serializd.com";

/// Headers the Serializd web app sends with every API call
pub(crate) fn with_site_headers(request: RequestBuilder) -> RequestBuilder {
    request
        .header("Accept", "application/json")
        .header("Content-Type", "application/json")
        .header("Origin", SITE)
        .header("Referer", SITE)
        .header("X-Requested-With", "serializd_vercel")
}

pub(crate) fn session_cookie(token: &str) -> String {
    format!("tvproject_credentials={}", token)
}

/// Leading four-digit year of a date like "2008-01-20"
fn year_from_date(date: Option<&str>) -> Option<u32> {
    date.and_then(|d| d.get(..4)).and_then(|y| y.parse().ok())
}

#[derive(Debug, Deserialize)]
struct ShowResponse {
    id: Option<u32>,
    #[serde(default, alias = "title")]
    name: Option<String>,
    #[serde(default, alias = "premiereDate", alias = "first_air_date")]
    premiere_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: u32,
    #[serde(default, alias = "title")]
    name: Option<String>,
    #[serde(default, alias = "first_air_date", alias = "premiereDate")]
    release_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SeasonEpisode {
    #[serde(rename = "episodeNumber", alias = "episode_number")]
    episode_number: u32,
}

#[derive(Debug, Deserialize)]
struct SeasonResponse {
    #[serde(rename = "seasonId", alias = "season_id")]
    season_id: Option<u64>,
    #[serde(default, rename = "seasonNumber", alias = "season_number")]
    season_number: Option<u32>,
    #[serde(default)]
    episodes: Vec<SeasonEpisode>,
}

/// Show details by TMDB id. A body for a different id counts as no match.
pub(crate) fn parse_show(body: &str, tmdb_id: u32) -> Result<Option<DestinationShow>, MigrateError> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    let show: ShowResponse = serde_json::from_str(body)?;
    Ok(match show.id {
        Some(id) if id == tmdb_id => Some(DestinationShow {
            id,
            name: show.name.unwrap_or_default(),
            year: year_from_date(show.premiere_date.as_deref()),
        }),
        _ => None,
    })
}

/// Search hits from either `{"results": [...]}` or a bare array
pub(crate) fn parse_search(body: &str) -> Result<Vec<SearchHit>, MigrateError> {
    let value: Value = serde_json::from_str(body)?;
    let results = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => map.remove("results").unwrap_or(Value::Array(Vec::new())),
        _ => Value::Array(Vec::new()),
    };
    let results: Vec<SearchResult> = serde_json::from_value(results)?;
    Ok(results
        .into_iter()
        .map(|r| SearchHit {
            id: r.id,
            name: r.name.unwrap_or_default(),
            year: year_from_date(r.release_date.as_deref()),
        })
        .collect())
}

/// Season details. A body without a season id is treated as a missing season.
pub(crate) fn parse_season(body: &str, season_number: u32) -> Result<Option<SeasonInfo>, MigrateError> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    let season: SeasonResponse = serde_json::from_str(body)?;
    let Some(season_id) = season.season_id else {
        return Ok(None);
    };
    let mut episode_numbers: Vec<u32> = season.episodes.iter().map(|e| e.episode_number).collect();
    episode_numbers.sort_unstable();
    episode_numbers.dedup();
    Ok(Some(SeasonInfo {
        season_id,
        season_number: season.season_number.unwrap_or(season_number),
        episode_numbers,
    }))
}

/// Episode numbers from an episode log listing.
///
/// Accepts a bare list of numbers, a list of log entries, or an object
/// wrapping either under `episodes`, `episode_numbers` or `logs`. Entries
/// for other seasons are ignored.
pub(crate) fn parse_logged_episodes(body: &str, season_id: u64) -> Result<BTreeSet<u32>, MigrateError> {
    let value: Value = serde_json::from_str(body)?;
    let entries = match &value {
        Value::Array(items) => items.clone(),
        Value::Object(map) => ["episodes", "episode_numbers", "episodeNumbers", "logs"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array).cloned())
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    let mut logged = BTreeSet::new();
    for entry in entries {
        match entry {
            Value::Number(n) => {
                if let Some(n) = n.as_u64() {
                    logged.insert(n as u32);
                }
            }
            Value::Object(map) => {
                let entry_season = map
                    .get("seasonId")
                    .or_else(|| map.get("season_id"))
                    .and_then(Value::as_u64);
                if entry_season.is_some_and(|s| s != season_id) {
                    continue;
                }
                let numbers = map
                    .get("episodeNumber")
                    .or_else(|| map.get("episode_number"))
                    .into_iter()
                    .chain(
                        map.get("episode_numbers")
                            .or_else(|| map.get("episodeNumbers"))
                            .and_then(Value::as_array)
                            .into_iter()
                            .flatten(),
                    )
                    .filter_map(Value::as_u64);
                logged.extend(numbers.map(|n| n as u32));
            }
            _ => {}
        }
    }
    Ok(logged)
}
