use kollektiv_core::KollektivError;
use thiserror::Error;

pub type EventsResult<T> = Result<T, EventsError>;

#[derive(Debug, Error)]
pub enum EventsError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("redis pool error: {0}")]
    Pool(String),

    #[error("kollektiv error: {0}")]
    Core(#[from] KollektivError),
}

impl From<EventsError> for KollektivError {
    fn from(err: EventsError) -> Self {
        match err {
            EventsError::Core(inner) => inner,
            EventsError::Redis(e) => KollektivError::RetryableExternal {
                service: "redis",
                reason: e.to_string(),
                retry_after: None,
            },
            EventsError::Pool(reason) => KollektivError::RetryableExternal {
                service: "redis",
                reason,
                retry_after: None,
            },
        }
    }
}
