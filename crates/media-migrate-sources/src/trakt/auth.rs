use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration as StdDuration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::cancel::CancellationFlag;
use crate::error::MigrateError;
use crate::http;

const SERVICE: &str = "trakt";
const REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Extra seconds added to the poll interval on a slow-down response
const SLOW_DOWN_STEP_SECS: u64 = 5;

/// Create a reqwest Client with browser-like headers to bypass Cloudflare
pub fn create_trakt_client() -> Client {
    Client::builder()
        .user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
        .build()
        .unwrap_or_else(|_| Client::new())
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    // Trakt tokens last three months
    7_776_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    pub verification_url: String,
    pub expires_in: u64,
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    5
}

#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<TokenResponse> for TokenInfo {
    fn from(token: TokenResponse) -> Self {
        // Renew two minutes early
        let expires_at = Utc::now() + Duration::seconds(token.expires_in as i64 - 120);
        Self {
            access_token: token.access_token,
            refresh_token: token.refresh_token.unwrap_or_default(),
            expires_at,
        }
    }
}

/// Result of one poll of the device token endpoint.
#[derive(Debug)]
pub enum DevicePoll {
    Authorized(TokenInfo),
    Pending,
    SlowDown,
    Expired,
    Denied,
    Failed(u16),
}

/// Outcome implied by a device token endpoint status, before reading the body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    Success,
    Pending,
    SlowDown,
    Expired,
    Denied,
    Failed,
}

pub fn poll_status(status: StatusCode) -> PollStatus {
    match status.as_u16() {
        200 => PollStatus::Success,
        400 => PollStatus::Pending,
        429 => PollStatus::SlowDown,
        410 => PollStatus::Expired,
        418 => PollStatus::Denied,
        // 404 invalid device code, 409 code already used
        _ => PollStatus::Failed,
    }
}

/// Reuse the refresh token when possible, otherwise run the device flow
pub async fn authenticate(
    client: &Client,
    api_base: &str,
    client_id: &str,
    client_secret: &str,
    refresh_token: Option<&str>,
    cancel: &CancellationFlag,
) -> Result<TokenInfo, MigrateError> {
    if let Some(refresh_token) = refresh_token.filter(|t| !t.is_empty()) {
        match refresh_access_token(client, api_base, client_id, client_secret, refresh_token).await {
            Ok(token_info) => return Ok(token_info),
            Err(e) => {
                // Refresh failed, fall through to new authorization
                info!("Trakt token refresh failed ({}), starting device authorization", e);
            }
        }
    }

    authorize_with_device_code(client, api_base, client_id, client_secret, cancel).await
}

pub async fn refresh_access_token(
    client: &Client,
    api_base: &str,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<TokenInfo, MigrateError> {
    let payload = serde_json::json!({
        "refresh_token": refresh_token,
        "client_id": client_id,
        "client_secret": client_secret,
        "redirect_uri": REDIRECT_URI,
        "grant_type": "refresh_token"
    });

    let response = client
        .post(format!("{}/oauth/token", api_base))
        .json(&payload)
        .header("Accept", "application/json")
        .header("Content-Type", "application/json")
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(MigrateError::AuthFailed {
            service: SERVICE,
            message: format!("token refresh returned {}", response.status()),
        });
    }

    let token_response: TokenResponse = response.json().await?;
    Ok(token_response.into())
}

pub async fn request_device_code(client: &Client, api_base: &str, client_id: &str) -> Result<DeviceCode, MigrateError> {
    let response = client
        .post(format!("{}/oauth/device/code", api_base))
        .json(&serde_json::json!({ "client_id": client_id }))
        .header("Accept", "application/json")
        .header("Content-Type", "application/json")
        .send()
        .await?;

    let status = response.status();
    if status.is_server_error() {
        return Err(http::status_error(SERVICE, response).await);
    }
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(MigrateError::AuthFailed {
            service: SERVICE,
            message: format!("failed to request device code: {} - {}", status, error_text),
        });
    }

    let response_text = response.text().await?;
    let device_code: DeviceCode = serde_json::from_str(&response_text)?;
    Ok(device_code)
}

pub async fn poll_device_token(
    client: &Client,
    api_base: &str,
    client_id: &str,
    client_secret: &str,
    device_code: &str,
) -> Result<DevicePoll, MigrateError> {
    let response = client
        .post(format!("{}/oauth/device/token", api_base))
        .json(&serde_json::json!({
            "code": device_code,
            "client_id": client_id,
            "client_secret": client_secret
        }))
        .header("Accept", "application/json")
        .header("Content-Type", "application/json")
        .send()
        .await?;

    let status = response.status();
    if status.is_server_error() {
        return Err(http::status_error(SERVICE, response).await);
    }
    Ok(match poll_status(status) {
        PollStatus::Success => {
            let token_response: TokenResponse = response.json().await?;
            DevicePoll::Authorized(token_response.into())
        }
        PollStatus::Pending => DevicePoll::Pending,
        PollStatus::SlowDown => DevicePoll::SlowDown,
        PollStatus::Expired => DevicePoll::Expired,
        PollStatus::Denied => DevicePoll::Denied,
        PollStatus::Failed => DevicePoll::Failed(status.as_u16()),
    })
}

/// Poll until the user authorizes, the code expires, or the run is cancelled.
///
/// The loop is bounded by the device code's lifetime.
pub async fn wait_for_authorization<F, Fut>(
    device: &DeviceCode,
    cancel: &CancellationFlag,
    mut poll: F,
) -> Result<TokenInfo, MigrateError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<DevicePoll, MigrateError>>,
{
    let deadline = Instant::now() + StdDuration::from_secs(device.expires_in);
    let mut interval = StdDuration::from_secs(device.interval.max(1));

    loop {
        if Instant::now() + interval > deadline {
            return Err(MigrateError::AuthTimeout);
        }
        sleep(interval).await;
        if cancel.is_cancelled() {
            return Err(MigrateError::Interrupted);
        }

        let polled = match poll().await {
            Ok(polled) => polled,
            Err(e) if e.is_transient() => {
                // A dropped connection is not an answer; keep waiting
                warn!("Trakt token poll failed, retrying: {}", e);
                continue;
            }
            Err(e) => return Err(e),
        };

        match polled {
            DevicePoll::Authorized(token) => return Ok(token),
            DevicePoll::Pending => debug!("Trakt authorization pending"),
            DevicePoll::SlowDown => {
                interval += StdDuration::from_secs(SLOW_DOWN_STEP_SECS);
                warn!("Trakt asked to slow down, polling every {}s", interval.as_secs());
            }
            DevicePoll::Expired => return Err(MigrateError::AuthTimeout),
            DevicePoll::Denied => return Err(MigrateError::AuthDenied { service: SERVICE }),
            DevicePoll::Failed(status) => {
                return Err(MigrateError::AuthFailed {
                    service: SERVICE,
                    message: format!("device token endpoint returned {}", status),
                })
            }
        }
    }
}

async fn authorize_with_device_code(
    client: &Client,
    api_base: &str,
    client_id: &str,
    client_secret: &str,
    cancel: &CancellationFlag,
) -> Result<TokenInfo, MigrateError> {
    let device = request_device_code(client, api_base, client_id).await?;

    eprintln!("\n╔══════════════════════════════════════════════════════════════╗");
    eprintln!("║           Trakt Device Authorization Required                ║");
    eprintln!("╚══════════════════════════════════════════════════════════════╝");
    eprintln!("\n1. Visit this URL in your browser:");
    eprintln!("   {}\n", device.verification_url);
    eprintln!("2. Enter this code when prompted:");
    eprintln!("   {}\n", device.user_code);
    eprintln!("3. Waiting for authorization ({} seconds before the code expires)...\n", device.expires_in);

    let token = wait_for_authorization(&device, cancel, || {
        poll_device_token(client, api_base, client_id, client_secret, &device.device_code)
    })
    .await?;

    eprintln!("\n✓ Trakt authorization successful!\n");
    Ok(token)
}
