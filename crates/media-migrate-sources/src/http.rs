use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};
use std::time::Duration;

use crate::error::MigrateError;

/// Read Trakt's pagination header, treating a missing header as a single page
pub fn page_count(headers: &HeaderMap) -> u32 {
    headers
        .get("X-Pagination-Page-Count")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(1)
}

/// Seconds form of `Retry-After`. The HTTP-date form is ignored.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Map a non-success status onto the error taxonomy
pub fn classify_status(
    service: &'static str,
    status: StatusCode,
    retry_after: Option<Duration>,
    body: String,
) -> MigrateError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => MigrateError::AuthExpired { service },
        StatusCode::NOT_FOUND => MigrateError::NotFound(format!("{} resource", service)),
        StatusCode::TOO_MANY_REQUESTS => MigrateError::RateLimitExceeded { service, retry_after },
        s if s.is_server_error() => MigrateError::ServiceUnavailable {
            service,
            message: format!("{} - {}", s, body),
        },
        s => MigrateError::UnexpectedStatus {
            service,
            status: s.as_u16(),
            body,
        },
    }
}

/// Consume a failed response into an error
pub async fn status_error(service: &'static str, response: Response) -> MigrateError {
    let status = response.status();
    let retry_after = retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    classify_status(service, status, retry_after, body)
}
