//! Shared error taxonomy for the Kollektiv workspace.
//!
//! Every crate defines its own narrow error enum for the failures specific
//! to its domain, but all of them bottom out in the categories here so that
//! callers at a service boundary (HTTP handlers, the worker pipeline) can
//! classify a failure without matching on crate-specific variants.

use std::time::Duration;

use uuid::Uuid;

/// Alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, KollektivError>;

/// Top-level error taxonomy, matching the classification in the
/// specification's error-handling design (retryable vs. non-retryable
/// external errors, validation, not-found, database, job errors).
#[derive(Debug, thiserror::Error)]
pub enum KollektivError {
    /// A transient failure from an external HTTP dependency (crawler, LLM,
    /// embedding, or reranker provider): 429/5xx, connection reset, or
    /// timeout. The outer retry layer decides whether to retry.
    /// `retry_after` carries a server-supplied `Retry-After` delay (429
    /// responses only); when present it overrides the policy's own backoff
    /// schedule for that attempt.
    #[error("retryable external error calling {service}: {reason}")]
    RetryableExternal {
        service: &'static str,
        reason: String,
        retry_after: Option<Duration>,
    },

    /// A non-retryable failure from an external HTTP dependency: 4xx other
    /// than 429, authentication, or permission errors.
    #[error("non-retryable external error calling {service}: {reason}")]
    NonRetryableExternal { service: &'static str, reason: String },

    /// Malformed entity or illegal state transition. Fatal for the request
    /// that triggered it.
    #[error("validation error: {0}")]
    Validation(String),

    /// An entity lookup found nothing.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A durable-store operation failed, carrying (operation, entity type)
    /// context as required by the durable repository contract.
    #[error("database error during {operation} on {entity}: {reason}")]
    Database {
        operation: &'static str,
        entity: &'static str,
        reason: String,
    },

    /// The ingestion job referenced does not exist.
    #[error("job not found: {job_id}")]
    JobNotFound { job_id: Uuid },

    /// The job is not in a state that permits the requested transition.
    #[error("invalid job state transition for {job_id}: {reason}")]
    JobStateError { job_id: Uuid, reason: String },

    /// The job patch failed validation (e.g. attempted to mutate a
    /// protected field).
    #[error("job validation error: {0}")]
    JobValidationError(String),

    /// A crawl produced zero pages; fatal for the source.
    #[error("crawl for source {source_id} returned no content")]
    EmptyContent { source_id: Uuid },

    /// Encode/decode failure in the tagged-variant serializer.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// JSON (de)serialization failure, usually from a store or wire
    /// boundary.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration was missing or failed validation at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Catch-all for unexpected internal errors. Prefer a typed variant
    /// whenever one fits.
    #[error("internal error: {0}")]
    Internal(String),
}

impl KollektivError {
    /// True when the failure is safe for an outer retry policy to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RetryableExternal { .. })
    }

    /// The server-supplied `Retry-After` delay, if this error carries one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RetryableExternal { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
