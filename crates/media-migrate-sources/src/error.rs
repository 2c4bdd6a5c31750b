use std::time::Duration;
use thiserror::Error;

/// Every failure the migration can run into, grouped by how far it propagates.
///
/// Auth failures abort before any history is read. `AuthExpired` gets one
/// re-auth. `ServiceUnavailable` has already been retried with backoff when
/// it surfaces and aborts the run; a single write that runs out of retries is
/// reported as `MarkFailed` instead. The rest are recorded per show or episode.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("device code expired before authorization was granted")]
    AuthTimeout,

    #[error("authorization was denied on the {service} website")]
    AuthDenied { service: &'static str },

    #[error("{service} authentication failed: {message}")]
    AuthFailed { service: &'static str, message: String },

    #[error("invalid {service} credentials")]
    InvalidCredentials { service: &'static str },

    #[error("{service} rejected the access token")]
    AuthExpired { service: &'static str },

    #[error("{service} is unavailable: {message}")]
    ServiceUnavailable { service: &'static str, message: String },

    #[error("{service} rate limit exceeded")]
    RateLimitExceeded {
        service: &'static str,
        retry_after: Option<Duration>,
    },

    #[error("failed to mark {target} watched: {message}")]
    MarkFailed { target: String, message: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("unexpected response from {service}: {status} - {body}")]
    UnexpectedStatus {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("interrupted by user")]
    Interrupted,
}

impl MigrateError {
    /// Failures that stop the run before migration starts
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            MigrateError::AuthTimeout
                | MigrateError::AuthDenied { .. }
                | MigrateError::AuthFailed { .. }
                | MigrateError::InvalidCredentials { .. }
        )
    }

    /// Failures that abort the whole run rather than a single show or episode
    pub fn is_fatal(&self) -> bool {
        self.is_auth_failure()
            || matches!(
                self,
                MigrateError::AuthExpired { .. }
                    | MigrateError::ServiceUnavailable { .. }
                    | MigrateError::Interrupted
            )
    }

    /// Failures worth retrying with backoff
    pub fn is_transient(&self) -> bool {
        match self {
            MigrateError::ServiceUnavailable { .. } => true,
            MigrateError::Http(e) => !e.is_decode() && !e.is_builder(),
            _ => false,
        }
    }
}
