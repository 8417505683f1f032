//! Error types for the kollektiv-store crate.
//!
//! All storage operations return [`StoreError`] via [`StoreResult`]; every
//! variant maps onto [`kollektiv_core::KollektivError`] at the crate
//! boundary so callers one layer up never need to know whether a failure
//! came from Redis or Postgres.

use kollektiv_core::KollektivError;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("redis pool error: {0}")]
    Pool(String),

    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("kollektiv error: {0}")]
    Core(#[from] KollektivError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
}

impl From<StoreError> for KollektivError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Core(inner) => inner,
            StoreError::NotFound { entity, id } => KollektivError::NotFound { entity, id },
            StoreError::Redis(e) => KollektivError::RetryableExternal {
                service: "redis",
                reason: e.to_string(),
                retry_after: None,
            },
            StoreError::Pool(reason) => KollektivError::RetryableExternal {
                service: "redis",
                reason,
                retry_after: None,
            },
            StoreError::Postgres(e) => KollektivError::Database {
                operation: "query",
                entity: "unknown",
                reason: e.to_string(),
            },
            StoreError::Migration(reason) => KollektivError::Database {
                operation: "migrate",
                entity: "schema",
                reason,
            },
            StoreError::Json(e) => KollektivError::Serialization(e.to_string()),
        }
    }
}
