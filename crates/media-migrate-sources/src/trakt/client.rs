use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use media_migrate_config::CredentialStore;
use media_migrate_models::WatchedShow;
use reqwest::Client;
use tracing::{info, warn};

use crate::cancel::CancellationFlag;
use crate::error::MigrateError;
use crate::rate_limit::RateLimiter;
use crate::retry::Backoff;
use crate::trakt::{api, API_BASE};
use crate::trakt::auth::{self, TokenInfo};
use crate::traits::HistorySource;

/// A cached token is only reused when it outlives this margin
const CACHED_TOKEN_MARGIN_MINUTES: i64 = 5;

/// Trakt allows 1000 GET calls every five minutes per user
const GET_BUDGET: u32 = 1000;
const GET_WINDOW_SECS: u64 = 300;

pub struct TraktClient {
    client: Client,
    api_base: String,
    client_id: String,
    client_secret: String,
    access_token: Option<String>,
    refresh_token: Option<String>,
    credentials: Option<CredentialStore>,
    cancel: CancellationFlag,
    backoff: Backoff,
    limiter: RateLimiter,
}

impl TraktClient {
    pub fn new(client_id: String, client_secret: String, cancel: CancellationFlag) -> Self {
        Self {
            client: auth::create_trakt_client(),
            api_base: API_BASE.to_string(),
            client_id,
            client_secret,
            access_token: None,
            refresh_token: None,
            credentials: None,
            cancel,
            backoff: Backoff::default(),
            limiter: RateLimiter::new(
                GET_BUDGET,
                std::time::Duration::from_secs(GET_WINDOW_SECS),
                std::time::Duration::from_secs(1),
            ),
        }
    }

    /// Reuse and persist tokens through `store`. Without one every run
    /// goes through the device flow.
    pub fn with_credential_store(mut self, store: CredentialStore) -> Self {
        self.credentials = Some(store);
        self
    }

    async fn try_cached_token(&mut self) -> bool {
        let Some(store) = self.credentials.as_ref() else {
            return false;
        };
        if let Some(refresh) = store.get_trakt_refresh_token() {
            self.refresh_token = Some(refresh.clone());
        }
        let Some(token) = usable_cached_token(store, Utc::now()) else {
            info!("No usable cached Trakt access token");
            return false;
        };

        match api::get_username(&self.client, &self.api_base, &token, &self.client_id).await {
            Ok(username) => {
                info!("Using saved Trakt access token for {}", username);
                self.access_token = Some(token);
                true
            }
            Err(e) => {
                info!("Saved Trakt token appears invalid ({}), attempting refresh", e);
                false
            }
        }
    }

    async fn obtain_token(&mut self) -> Result<(), MigrateError> {
        let token_info = auth::authenticate(
            &self.client,
            &self.api_base,
            &self.client_id,
            &self.client_secret,
            self.refresh_token.as_deref(),
            &self.cancel,
        )
        .await?;
        self.store_token(&token_info);
        self.access_token = Some(token_info.access_token);
        if !token_info.refresh_token.is_empty() {
            self.refresh_token = Some(token_info.refresh_token);
        }

        if let Some(token) = self.access_token.as_deref() {
            match api::get_username(&self.client, &self.api_base, token, &self.client_id).await {
                Ok(username) => info!("Authenticated with Trakt as {}", username),
                Err(e) => warn!("Could not read Trakt user settings: {}", e),
            }
        }
        Ok(())
    }

    fn store_token(&mut self, token_info: &TokenInfo) {
        let Some(store) = self.credentials.as_mut() else {
            return;
        };
        store.set_trakt_access_token(token_info.access_token.clone());
        store.set_trakt_refresh_token(token_info.refresh_token.clone());
        store.set_trakt_token_expires(token_info.expires_at);
        if let Err(e) = store.save() {
            // The run can go on without the cache
            warn!("Failed to save Trakt credentials: {}", e);
        }
    }

    /// Drop the rejected token and authenticate again
    async fn reauthenticate(&mut self) -> Result<(), MigrateError> {
        self.access_token = None;
        if let Some(store) = self.credentials.as_mut() {
            store.clear_trakt_access_token();
        }
        self.obtain_token().await
    }

    async fn fetch_once(&self) -> Result<Vec<WatchedShow>, MigrateError> {
        let token = self
            .access_token
            .as_deref()
            .ok_or(MigrateError::AuthExpired { service: "trakt" })?;
        api::get_watched_shows(
            &self.client,
            &self.api_base,
            token,
            &self.client_id,
            &self.backoff,
            &self.limiter,
        )
        .await
    }
}

/// The cached access token, if it expires comfortably after `now`
fn usable_cached_token(store: &CredentialStore, now: DateTime<Utc>) -> Option<String> {
    let token = store.get_trakt_access_token().filter(|t| !t.is_empty())?;
    let expires_at = store.get_trakt_token_expires()?;
    if expires_at > now + Duration::minutes(CACHED_TOKEN_MARGIN_MINUTES) {
        Some(token.clone())
    } else {
        info!("Trakt access token expired or expiring soon (expires at {})", expires_at);
        None
    }
}

#[async_trait]
impl HistorySource for TraktClient {
    fn source_name(&self) -> &str {
        "Trakt"
    }

    async fn authenticate(&mut self) -> Result<(), MigrateError> {
        if self.try_cached_token().await {
            return Ok(());
        }
        self.obtain_token().await
    }

    fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    async fn fetch_watched_shows(&mut self) -> Result<Vec<WatchedShow>, MigrateError> {
        match self.fetch_once().await {
            Err(MigrateError::AuthExpired { .. }) => {
                warn!("Trakt rejected the access token, re-authenticating once");
                self.reauthenticate().await?;
                self.fetch_once().await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_with(token: &str, expires_at: Option<DateTime<Utc>>) -> (TempDir, CredentialStore) {
        let dir = TempDir::new().unwrap();
        let mut store = CredentialStore::new(dir.path().join("credentials.toml"));
        store.set_trakt_access_token(token.to_string());
        if let Some(expires_at) = expires_at {
            store.set_trakt_token_expires(expires_at);
        }
        (dir, store)
    }

    #[test]
    fn test_cached_token_reused_when_fresh() {
        let now = Utc::now();
        let (_dir, store) = store_with("abc", Some(now + Duration::days(30)));
        assert_eq!(usable_cached_token(&store, now).as_deref(), Some("abc"));
    }

    #[test]
    fn test_cached_token_skipped_when_expiring() {
        let now = Utc::now();
        let (_dir, store) = store_with("abc", Some(now + Duration::minutes(2)));
        assert_eq!(usable_cached_token(&store, now), None);

        let (_dir, store) = store_with("abc", None);
        assert_eq!(usable_cached_token(&store, now), None);

        let (_dir, store) = store_with("", Some(now + Duration::days(30)));
        assert_eq!(usable_cached_token(&store, now), None);
    }

    const WATCHED_BODY: &str = r#"[{
        "last_watched_at": "2024-03-01T20:00:00.000Z",
        "show": {"title": "Dark", "year": 2017, "ids": {"trakt": 1, "slug": "dark", "tvdb": null, "imdb": null, "tmdb": 70523}},
        "seasons": [{"number": 1, "episodes": [{"number": 1}]}]
    }]"#;

    fn client_for(server: &mockito::Server) -> TraktClient {
        let mut client = TraktClient::new("client".to_string(), "secret".to_string(), CancellationFlag::new());
        client.api_base = server.url();
        client.access_token = Some("stale".to_string());
        client.refresh_token = Some("refresh".to_string());
        client
    }

    async fn token_refresh(server: &mut mockito::Server) -> mockito::Mock {
        server
            .mock("POST", "/oauth/token")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "refresh_token": "refresh",
                "grant_type": "refresh_token"
            })))
            .with_status(200)
            .with_body(r#"{"access_token":"fresh","refresh_token":"refresh2","expires_in":7776000}"#)
            .expect(1)
            .create_async()
            .await
    }

    async fn watched_shows(server: &mut mockito::Server, token: &str, status: usize) -> mockito::Mock {
        server
            .mock("GET", "/sync/watched/shows")
            .match_query(mockito::Matcher::Any)
            .match_header("authorization", format!("Bearer {}", token).as_str())
            .with_status(status)
            .with_body(if status == 200 { WATCHED_BODY } else { "" })
            .expect(1)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_rejected_token_reauthenticates_once() {
        let mut server = mockito::Server::new_async().await;
        let refresh = token_refresh(&mut server).await;
        server
            .mock("GET", "/users/settings")
            .with_status(200)
            .with_body(r#"{"user": {"username": "viewer"}}"#)
            .create_async()
            .await;
        let stale = watched_shows(&mut server, "stale", 401).await;
        let fresh = watched_shows(&mut server, "fresh", 200).await;

        let dir = TempDir::new().unwrap();
        let mut client = client_for(&server)
            .with_credential_store(CredentialStore::new(dir.path().join("credentials.toml")));

        let shows = client.fetch_watched_shows().await.unwrap();

        refresh.assert_async().await;
        stale.assert_async().await;
        fresh.assert_async().await;
        assert_eq!(shows.len(), 1);
        assert_eq!(shows[0].title, "Dark");
        assert_eq!(client.refresh_token.as_deref(), Some("refresh2"));

        let mut saved = CredentialStore::new(dir.path().join("credentials.toml"));
        saved.load().unwrap();
        assert_eq!(saved.get_trakt_access_token(), Some(&"fresh".to_string()));
    }

    #[tokio::test]
    async fn test_second_rejection_is_fatal() {
        let mut server = mockito::Server::new_async().await;
        let refresh = token_refresh(&mut server).await;
        server
            .mock("GET", "/users/settings")
            .with_status(200)
            .with_body(r#"{"user": {"username": "viewer"}}"#)
            .create_async()
            .await;
        let stale = watched_shows(&mut server, "stale", 401).await;
        let fresh = watched_shows(&mut server, "fresh", 401).await;

        let mut client = client_for(&server);
        let result = client.fetch_watched_shows().await;

        assert!(matches!(result, Err(MigrateError::AuthExpired { service: "trakt" })));
        assert!(result.unwrap_err().is_fatal());
        // exactly one re-authentication between the two attempts
        refresh.assert_async().await;
        stale.assert_async().await;
        fresh.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_without_token_is_auth_expired() {
        let client = TraktClient::new("id".to_string(), "secret".to_string(), CancellationFlag::new());
        assert!(!client.is_authenticated());
        assert!(matches!(
            client.fetch_once().await,
            Err(MigrateError::AuthExpired { service: "trakt" })
        ));
    }
}
