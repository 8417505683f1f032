use std::time::Duration;

use kollektiv_core::KollektivError;
use thiserror::Error;

pub type CrawlerResult<T> = Result<T, CrawlerError>;

#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("kollektiv error: {0}")]
    Core(#[from] KollektivError),

    #[error("invalid crawl request: {0}")]
    InvalidRequest(String),
}

impl From<CrawlerError> for KollektivError {
    fn from(err: CrawlerError) -> Self {
        match err {
            CrawlerError::Core(inner) => inner,
            CrawlerError::InvalidRequest(reason) => KollektivError::Validation(reason),
        }
    }
}

/// Classifies an HTTP status: 429 and 5xx are transient, everything else
/// is a client-side problem not worth retrying. `retry_after` is the
/// parsed `Retry-After` header value, read by the caller before the
/// response body is consumed; honored only on 429.
pub fn classify_status(
    service: &'static str,
    status: reqwest::StatusCode,
    body: &str,
    retry_after: Option<Duration>,
) -> KollektivError {
    if status.as_u16() == 429 || status.is_server_error() {
        KollektivError::RetryableExternal {
            service,
            reason: format!("{status}: {body}"),
            retry_after: if status.as_u16() == 429 { retry_after } else { None },
        }
    } else {
        KollektivError::NonRetryableExternal {
            service,
            reason: format!("{status}: {body}"),
        }
    }
}

/// Parse a `Retry-After` header value: either a delay in seconds or an
/// HTTP-date. Only the seconds form is supported; an HTTP-date falls back
/// to the policy's own backoff schedule.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
