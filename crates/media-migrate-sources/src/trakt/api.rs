use chrono::{DateTime, Utc};
use media_migrate_models::{ShowIds, WatchedEpisode, WatchedShow};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::MigrateError;
use crate::http;
use crate::rate_limit::RateLimiter;
use crate::retry::{retry_with_backoff, Backoff};

const SERVICE: &str = "trakt";
const PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct TraktIds {
    pub trakt: Option<u64>,
    pub slug: Option<String>,
    pub tmdb: Option<u32>,
    pub imdb: Option<String>,
    pub tvdb: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TraktShow {
    title: String,
    year: Option<u32>,
    ids: TraktIds,
}

#[derive(Debug, Deserialize)]
struct TraktWatchedEpisode {
    number: u32,
}

#[derive(Debug, Deserialize)]
struct TraktWatchedSeason {
    number: u32,
    #[serde(default)]
    episodes: Vec<TraktWatchedEpisode>,
}

#[derive(Debug, Deserialize)]
struct TraktWatchedItem {
    show: TraktShow,
    #[serde(default)]
    seasons: Vec<TraktWatchedSeason>,
    last_watched_at: Option<DateTime<Utc>>,
}

/// Remove slashes from IMDB ID (Trakt sometimes includes them)
fn remove_slashes(s: &str) -> String {
    s.replace('/', "")
}

fn show_ids_from_trakt(ids: &TraktIds) -> ShowIds {
    ShowIds {
        trakt_id: ids.trakt,
        slug: ids.slug.clone(),
        tmdb_id: ids.tmdb,
        imdb_id: ids
            .imdb
            .as_deref()
            .map(remove_slashes)
            .filter(|s| !s.is_empty()),
        tvdb_id: ids.tvdb,
    }
}

fn authorized_get(client: &Client, url: &str, access_token: &str, client_id: &str) -> RequestBuilder {
    client
        .get(url)
        .header("Authorization", format!("Bearer {}", access_token))
        .header("trakt-api-version", "2")
        .header("trakt-api-key", client_id)
        .header("Accept", "application/json")
        .header("Accept-Language", "en-US,en;q=0.9")
        .header("Content-Type", "application/json")
        .header("Origin", "https://trakt.tv")
        .header("Referer", "https://trakt.tv/")
}

/// Username of the account the token belongs to
pub async fn get_username(
    client: &Client,
    api_base: &str,
    access_token: &str,
    client_id: &str,
) -> Result<String, MigrateError> {
    let url = format!("{}/users/settings", api_base);
    let response = authorized_get(client, &url, access_token, client_id).send().await?;

    if !response.status().is_success() {
        return Err(http::status_error(SERVICE, response).await);
    }

    let json: serde_json::Value = response.json().await?;
    let username = json["user"]["username"]
        .as_str()
        .or_else(|| json["user"]["ids"]["slug"].as_str())
        .unwrap_or("unknown");
    Ok(username.to_string())
}

async fn fetch_watched_page(
    client: &Client,
    api_base: &str,
    access_token: &str,
    client_id: &str,
    page: u32,
) -> Result<(Vec<TraktWatchedItem>, u32), MigrateError> {
    let url = format!(
        "{}/sync/watched/shows?page={}&limit={}",
        api_base, page, PAGE_SIZE
    );
    let response = authorized_get(client, &url, access_token, client_id).send().await?;

    if !response.status().is_success() {
        return Err(http::status_error(SERVICE, response).await);
    }

    let total_pages = http::page_count(response.headers());
    let body = response.text().await?;
    let items: Vec<TraktWatchedItem> = serde_json::from_str(&body)?;
    Ok((items, total_pages))
}

/// Fetch every watched show, following `X-Pagination-Page-Count`.
///
/// Each page goes through `limiter`, which waits out a 429 once, and is
/// retried on transient failures. A rejected token surfaces as `AuthExpired`
/// for the client to handle.
pub async fn get_watched_shows(
    client: &Client,
    api_base: &str,
    access_token: &str,
    client_id: &str,
    backoff: &Backoff,
    limiter: &RateLimiter,
) -> Result<Vec<WatchedShow>, MigrateError> {
    let mut items = Vec::new();
    let mut page = 1;

    loop {
        let (page_items, total_pages) = retry_with_backoff(SERVICE, backoff, || {
            limiter.call(|| fetch_watched_page(client, api_base, access_token, client_id, page))
        })
        .await?;

        debug!(
            "Trakt watched API: page={}, total_pages={}, items_on_page={}",
            page,
            total_pages,
            page_items.len()
        );
        items.extend(page_items);

        if page >= total_pages {
            break;
        }
        page += 1;
    }

    let shows = convert_watched(items);
    info!(
        "Fetched {} watched shows ({} episodes) from Trakt",
        shows.len(),
        shows.iter().map(WatchedShow::episode_count).sum::<usize>()
    );
    Ok(shows)
}

/// Turn raw watched items into `WatchedShow`s.
///
/// Empty seasons are dropped, as are shows left with no episodes. A show that
/// appears on more than one page is merged into its first occurrence.
fn convert_watched(items: Vec<TraktWatchedItem>) -> Vec<WatchedShow> {
    let mut shows: Vec<WatchedShow> = Vec::new();
    let mut index_by_key: HashMap<String, usize> = HashMap::new();

    for item in items {
        let ids = show_ids_from_trakt(&item.show.ids);
        let episodes: Vec<WatchedEpisode> = item
            .seasons
            .iter()
            .filter(|season| !season.episodes.is_empty())
            .flat_map(|season| {
                season
                    .episodes
                    .iter()
                    .map(move |ep| WatchedEpisode::new(season.number, ep.number))
            })
            .collect();

        if episodes.is_empty() {
            debug!("Skipping '{}': no watched episodes", item.show.title);
            continue;
        }

        let key = ids.identity_key();
        if let Some(&idx) = key.as_ref().and_then(|k| index_by_key.get(k)) {
            let existing = &mut shows[idx];
            existing.episodes.extend(episodes);
            existing.ids.merge(&ids);
            if item.last_watched_at > existing.last_watched_at {
                existing.last_watched_at = item.last_watched_at;
            }
            continue;
        }

        let mut show = WatchedShow::new(item.show.title, item.show.year, ids).with_episodes(episodes);
        show.last_watched_at = item.last_watched_at;
        if let Some(key) = key {
            index_by_key.insert(key, shows.len());
        }
        shows.push(show);
    }

    shows
}

#[cfg(test)]
mod tests {
    use super::*;

    const WATCHED_JSON: &str = r#"[
        {
            "plays": 3,
            "last_watched_at": "2024-03-01T20:00:00.000Z",
            "show": {
                "title": "Breaking Bad",
                "year": 2008,
                "ids": {"trakt": 1388, "slug": "breaking-bad", "tvdb": 81189, "imdb": "tt0903747", "tmdb": 1396}
            },
            "seasons": [
                {"number": 0, "episodes": [{"number": 1, "plays": 1}]},
                {"number": 1, "episodes": [{"number": 1, "plays": 1}, {"number": 2, "plays": 1}]},
                {"number": 2, "episodes": []}
            ]
        },
        {
            "plays": 0,
            "last_watched_at": null,
            "show": {
                "title": "Nothing Watched",
                "year": null,
                "ids": {"trakt": 2, "slug": "nothing", "tvdb": null, "imdb": null, "tmdb": null}
            },
            "seasons": []
        },
        {
            "show": {
                "title": "Breaking Bad",
                "year": 2008,
                "ids": {"trakt": 1388, "slug": "breaking-bad", "tvdb": 81189, "imdb": "tt0903747", "tmdb": 1396}
            },
            "seasons": [{"number": 1, "episodes": [{"number": 3}]}]
        }
    ]"#;

    #[test]
    fn test_convert_watched() {
        let items: Vec<TraktWatchedItem> = serde_json::from_str(WATCHED_JSON).unwrap();
        let shows = convert_watched(items);

        assert_eq!(shows.len(), 1);
        let show = &shows[0];
        assert_eq!(show.title, "Breaking Bad");
        assert_eq!(show.year, Some(2008));
        assert_eq!(show.ids.tmdb_id, Some(1396));
        assert_eq!(show.ids.imdb_id.as_deref(), Some("tt0903747"));

        let seasons = show.seasons();
        assert_eq!(seasons.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(seasons[&1].iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(show.last_watched_at.is_some());
    }

    fn page_body(title: &str, trakt_id: u64, tmdb_id: u32) -> String {
        serde_json::json!([{
            "last_watched_at": "2024-03-01T20:00:00.000Z",
            "show": {
                "title": title,
                "year": 2017,
                "ids": {"trakt": trakt_id, "slug": null, "tvdb": null, "imdb": null, "tmdb": tmdb_id}
            },
            "seasons": [{"number": 1, "episodes": [{"number": 1}, {"number": 2}]}]
        }])
        .to_string()
    }

    fn limiter() -> RateLimiter {
        RateLimiter::new(100, std::time::Duration::from_secs(1), std::time::Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_follows_pagination_header() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/sync/watched/shows")
            .match_query(mockito::Matcher::UrlEncoded("page".into(), "1".into()))
            .match_header("authorization", "Bearer token")
            .match_header("trakt-api-key", "client")
            .with_status(200)
            .with_header("X-Pagination-Page-Count", "2")
            .with_body(page_body("Dark", 1, 70523))
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/sync/watched/shows")
            .match_query(mockito::Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_header("X-Pagination-Page-Count", "2")
            .with_body(page_body("Severance", 2, 95396))
            .expect(1)
            .create_async()
            .await;

        let shows = get_watched_shows(
            &Client::new(),
            &server.url(),
            "token",
            "client",
            &Backoff::default(),
            &limiter(),
        )
        .await
        .unwrap();

        first.assert_async().await;
        second.assert_async().await;
        let titles: Vec<&str> = shows.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Dark", "Severance"]);
        assert_eq!(shows[1].episode_count(), 2);
    }

    #[tokio::test]
    async fn test_rate_limited_page_is_retried_once() {
        let mut server = mockito::Server::new_async().await;
        let limited = server
            .mock("GET", "/sync/watched/shows")
            .match_query(mockito::Matcher::Any)
            .with_status(429)
            .with_header("Retry-After", "0")
            .expect(2)
            .create_async()
            .await;

        let result = get_watched_shows(
            &Client::new(),
            &server.url(),
            "token",
            "client",
            &Backoff::default(),
            &limiter(),
        )
        .await;

        // one retry after Retry-After, then the limit surfaces
        assert!(matches!(result, Err(MigrateError::RateLimitExceeded { service: "trakt", .. })));
        limited.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_token_is_auth_expired() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sync/watched/shows")
            .match_query(mockito::Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let result = get_watched_shows(
            &Client::new(),
            &server.url(),
            "stale",
            "client",
            &Backoff::default(),
            &limiter(),
        )
        .await;
        assert!(matches!(result, Err(MigrateError::AuthExpired { service: "trakt" })));
    }

    #[test]
    fn test_imdb_slashes_removed() {
        let ids = TraktIds {
            trakt: Some(1),
            slug: None,
            tmdb: None,
            imdb: Some("/tt123/".to_string()),
            tvdb: None,
        };
        assert_eq!(show_ids_from_trakt(&ids).imdb_id.as_deref(), Some("tt123"));

        let blank = TraktIds { imdb: Some("/".to_string()), ..ids };
        assert_eq!(show_ids_from_trakt(&blank).imdb_id, None);
    }
}
