use async_trait::async_trait;
use media_migrate_models::{DestinationShow, SearchHit, SeasonInfo};
use reqwest::{Client, RequestBuilder};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::error::MigrateError;
use crate::http;
use crate::rate_limit::RateLimiter;
use crate::retry::{retry_with_backoff, Backoff};
use crate::serializd::api::{self, with_site_headers, API_BASE, SERVICE};
use crate::serializd::auth::{self, DestinationSession, SerializdCredentials};
use crate::traits::Destination;

/// Writes in a row that may exhaust their retries before the service counts as down
const WRITE_OUTAGE_LIMIT: u32 = 3;

pub struct SerializdClient {
    client: Client,
    api_base: String,
    credentials: SerializdCredentials,
    session: Mutex<Option<DestinationSession>>,
    limiter: RateLimiter,
    backoff: Backoff,
    write_outages: AtomicU32,
}

impl SerializdClient {
    pub fn new(credentials: SerializdCredentials, limiter: RateLimiter) -> Self {
        Self {
            client: Client::new(),
            api_base: API_BASE.to_string(),
            credentials,
            session: Mutex::new(None),
            limiter,
            backoff: Backoff::default(),
            write_outages: AtomicU32::new(0),
        }
    }

    fn token(&self) -> Option<String> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|session| session.token.clone())
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, MigrateError> {
        let token = self.token().ok_or(MigrateError::AuthExpired { service: SERVICE })?;
        Ok(with_site_headers(request).header(reqwest::header::COOKIE, api::session_cookie(&token)))
    }

    async fn login(&self) -> Result<(), MigrateError> {
        let session = auth::login(&self.client, &self.api_base, &self.credentials, &self.backoff).await?;
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session);
        Ok(())
    }

    /// Run `call`, logging in again and repeating it once if the session was rejected
    async fn with_session<T, F, Fut>(&self, mut call: F) -> Result<T, MigrateError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, MigrateError>>,
    {
        match call().await {
            Err(MigrateError::AuthExpired { .. }) => {
                warn!("Serializd session rejected, logging in again");
                self.login().await?;
                call().await
            }
            other => other,
        }
    }

    /// GET `path`, returning the body, or `None` on 404
    async fn get_once(&self, path: &str) -> Result<Option<String>, MigrateError> {
        let request = self.authorized(self.client.get(format!("{}{}", self.api_base, path)))?;
        let response = request.send().await?;
        if !response.status().is_success() {
            return match http::status_error(SERVICE, response).await {
                MigrateError::NotFound(_) => Ok(None),
                e => Err(e),
            };
        }
        Ok(Some(response.text().await?))
    }

    async fn post_once(&self, path: &str, payload: &serde_json::Value) -> Result<(), MigrateError> {
        let request = self.authorized(self.client.post(format!("{}{}", self.api_base, path)))?;
        let response = request.json(payload).send().await?;
        if !response.status().is_success() {
            return Err(http::status_error(SERVICE, response).await);
        }
        Ok(())
    }

    /// Rate-limited GET with backoff on transient failures
    async fn get(&self, path: &str) -> Result<Option<String>, MigrateError> {
        debug!(operation = "get", path = path, "Serializd request");
        self.with_session(move || {
            retry_with_backoff(SERVICE, &self.backoff, move || {
                self.limiter.call(move || self.get_once(path))
            })
        })
        .await
    }

    /// Rate-limited POST. Rejections other than auth become `MarkFailed` for
    /// `target`, and so does an outage until `WRITE_OUTAGE_LIMIT` writes in a
    /// row have hit one.
    async fn post(&self, path: &str, payload: serde_json::Value, target: String) -> Result<(), MigrateError> {
        debug!(operation = "post", path = path, target = %target, "Serializd request");
        let payload = &payload;
        let result = self
            .with_session(move || {
                retry_with_backoff(SERVICE, &self.backoff, move || {
                    self.limiter.call(move || self.post_once(path, payload))
                })
            })
            .await;

        if !matches!(result, Err(MigrateError::ServiceUnavailable { .. })) {
            self.write_outages.store(0, Ordering::Relaxed);
        }
        match result {
            Err(MigrateError::ServiceUnavailable { service, message }) => {
                let outages = self.write_outages.fetch_add(1, Ordering::Relaxed) + 1;
                if outages >= WRITE_OUTAGE_LIMIT {
                    return Err(MigrateError::ServiceUnavailable {
                        service,
                        message: format!("{} consecutive writes failed, last: {}", outages, message),
                    });
                }
                warn!(outages = outages, "Write to {} gave up: {}", target, message);
                Err(MigrateError::MarkFailed {
                    target,
                    message: format!("{} is unavailable: {}", service, message),
                })
            }
            Err(e @ MigrateError::NotFound(_)) | Err(e @ MigrateError::UnexpectedStatus { .. }) => {
                Err(MigrateError::MarkFailed {
                    target,
                    message: e.to_string(),
                })
            }
            other => other,
        }
    }
}

#[async_trait]
impl Destination for SerializdClient {
    fn destination_name(&self) -> &str {
        "Serializd"
    }

    async fn authenticate(&mut self) -> Result<(), MigrateError> {
        self.login().await
    }

    fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    async fn show_by_tmdb_id(&self, tmdb_id: u32) -> Result<Option<DestinationShow>, MigrateError> {
        match self.get(&format!("/show/{}", tmdb_id)).await? {
            Some(body) => api::parse_show(&body, tmdb_id),
            None => Ok(None),
        }
    }

    async fn search_shows(&self, query: &str) -> Result<Vec<SearchHit>, MigrateError> {
        let path = format!("/search/shows/{}?page=1", urlencoding::encode(query));
        match self.get(&path).await? {
            Some(body) => api::parse_search(&body),
            None => Ok(Vec::new()),
        }
    }

    async fn season(&self, show_id: u32, season_number: u32) -> Result<Option<SeasonInfo>, MigrateError> {
        match self.get(&format!("/show/{}/season/{}", show_id, season_number)).await? {
            Some(body) => api::parse_season(&body, season_number),
            None => Ok(None),
        }
    }

    async fn logged_episodes(&self, show_id: u32, season: &SeasonInfo) -> Result<BTreeSet<u32>, MigrateError> {
        let path = format!("/episode_log/show/{}/season/{}", show_id, season.season_id);
        match self.get(&path).await {
            Ok(Some(body)) => match api::parse_logged_episodes(&body, season.season_id) {
                Ok(logged) => Ok(logged),
                Err(e) => {
                    warn!("Unreadable episode log for show {} season {}: {}", show_id, season.season_number, e);
                    Ok(BTreeSet::new())
                }
            },
            Ok(None) => Ok(BTreeSet::new()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("Episode log lookup failed for show {} season {}: {}", show_id, season.season_number, e);
                Ok(BTreeSet::new())
            }
        }
    }

    async fn log_episodes(&self, show_id: u32, season: &SeasonInfo, episodes: &[u32]) -> Result<(), MigrateError> {
        let payload = serde_json::json!({
            "episode_numbers": episodes,
            "season_id": season.season_id,
            "show_id": show_id,
            "should_get_next_episode": false,
        });
        let target = format!("show {} season {} episodes {:?}", show_id, season.season_number, episodes);
        self.post("/episode_log/add", payload, target).await?;
        info!("Logged {} episodes for show {} season {}", episodes.len(), show_id, season.season_number);
        Ok(())
    }

    async fn log_seasons(&self, show_id: u32, season_ids: &[u64]) -> Result<(), MigrateError> {
        let payload = serde_json::json!({
            "season_ids": season_ids,
            "show_id": show_id,
        });
        let target = format!("show {} seasons {:?}", show_id, season_ids);
        self.post("/watched_v2", payload, target).await?;
        info!("Logged {} seasons as watched for show {}", season_ids.len(), show_id);
        Ok(())
    }
}
