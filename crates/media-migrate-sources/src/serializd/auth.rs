use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::fmt;
use tracing::info;

use crate::error::MigrateError;
use crate::http;
use crate::retry::{retry_with_backoff, Backoff};
use crate::serializd::api::{with_site_headers, SERVICE};

/// Email and password for the Serializd login endpoint.
#[derive(Clone)]
pub struct SerializdCredentials {
    pub email: String,
    pub password: String,
}

impl SerializdCredentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for SerializdCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializdCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Session established by a successful login. Lives for the run.
#[derive(Clone)]
pub struct DestinationSession {
    pub token: String,
    pub username: String,
}

impl fmt::Debug for DestinationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationSession")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

/// Build a session from a 200 login body. A missing token means the
/// credentials were not accepted.
pub(crate) fn session_from_body(body: &str, email: &str) -> Result<DestinationSession, MigrateError> {
    let response: LoginResponse =
        serde_json::from_str(body).map_err(|_| MigrateError::InvalidCredentials { service: SERVICE })?;
    let token = response
        .token
        .filter(|t| !t.is_empty())
        .ok_or(MigrateError::InvalidCredentials { service: SERVICE })?;
    Ok(DestinationSession {
        token,
        username: response
            .username
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| email.to_string()),
    })
}

async fn login_once(
    client: &Client,
    api_base: &str,
    credentials: &SerializdCredentials,
) -> Result<DestinationSession, MigrateError> {
    let response = with_site_headers(client.post(format!("{}/login", api_base)))
        .json(&serde_json::json!({
            "email": credentials.email,
            "password": credentials.password,
        }))
        .send()
        .await?;

    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(MigrateError::InvalidCredentials { service: SERVICE })
        }
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            Err(http::status_error(SERVICE, response).await)
        }
        s if !s.is_success() => {
            let error_text = response.text().await.unwrap_or_default();
            Err(MigrateError::AuthFailed {
                service: SERVICE,
                message: format!("login returned {} - {}", s, error_text),
            })
        }
        _ => {
            let body = response.text().await?;
            session_from_body(&body, &credentials.email)
        }
    }
}

/// Log in, retrying transient failures with backoff.
///
/// Rejected credentials are never retried.
pub async fn login(
    client: &Client,
    api_base: &str,
    credentials: &SerializdCredentials,
    backoff: &Backoff,
) -> Result<DestinationSession, MigrateError> {
    let session = retry_with_backoff(SERVICE, backoff, || login_once(client, api_base, credentials)).await?;
    info!("Serializd authentication successful for {}", session.username);
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_from_body() {
        let session = session_from_body(r#"{"token":"abc","username":"viewer"}"#, "me@example.com").unwrap();
        assert_eq!(session.token, "abc");
        assert_eq!(session.username, "viewer");

        let session = session_from_body(r#"{"token":"abc"}"#, "me@example.com").unwrap();
        assert_eq!(session.username, "me@example.com");
    }

    #[test]
    fn test_missing_token_is_invalid_credentials() {
        for body in [r#"{}"#, r#"{"token":""}"#, r#"{"token":null}"#, "not json"] {
            assert!(matches!(
                session_from_body(body, "me@example.com"),
                Err(MigrateError::InvalidCredentials { service: "serializd" })
            ));
        }
    }

    fn fast_backoff() -> Backoff {
        Backoff::new(3, std::time::Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_login_posts_credentials() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/login")
            .match_header("x-requested-with", "serializd_vercel")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "email": "me@example.com",
                "password": "pw"
            })))
            .with_status(200)
            .with_body(r#"{"token":"abc","username":"viewer"}"#)
            .create_async()
            .await;

        let creds = SerializdCredentials::new("me@example.com", "pw");
        let session = login(&Client::new(), &server.url(), &creds, &fast_backoff()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(session.token, "abc");
        assert_eq!(session.username, "viewer");
    }

    #[tokio::test]
    async fn test_rejected_login_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/login")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let creds = SerializdCredentials::new("me@example.com", "wrong");
        let result = login(&Client::new(), &server.url(), &creds, &fast_backoff()).await;

        mock.assert_async().await;
        let err = result.unwrap_err();
        assert!(matches!(err, MigrateError::InvalidCredentials { service: "serializd" }));
        assert!(err.is_auth_failure());
    }

    #[tokio::test]
    async fn test_login_outage_gives_up_after_retries() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/login")
            .with_status(503)
            .with_body("maintenance")
            .expect(3)
            .create_async()
            .await;

        let creds = SerializdCredentials::new("me@example.com", "pw");
        let result = login(&Client::new(), &server.url(), &creds, &fast_backoff()).await;

        mock.assert_async().await;
        assert!(matches!(result, Err(MigrateError::ServiceUnavailable { service: "serializd", .. })));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let creds = SerializdCredentials::new("me@example.com", "hunter2");
        assert!(!format!("{:?}", creds).contains("hunter2"));

        let session = DestinationSession {
            token: "secret-token".to_string(),
            username: "viewer".to_string(),
        };
        assert!(!format!("{:?}", session).contains("secret-token"));
    }
}
