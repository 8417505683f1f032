use kollektiv_core::KollektivError;
use thiserror::Error;

pub type RetrievalResult<T> = Result<T, RetrievalError>;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("kollektiv error: {0}")]
    Core(#[from] KollektivError),

    #[error("vector store error: {0}")]
    VectorStore(String),
}

impl From<RetrievalError> for KollektivError {
    fn from(err: RetrievalError) -> Self {
        match err {
            RetrievalError::Core(inner) => inner,
            RetrievalError::VectorStore(reason) => KollektivError::NonRetryableExternal {
                service: "qdrant",
                reason,
            },
        }
    }
}

pub(crate) fn classify_status(service: &'static str, status: reqwest::StatusCode, body: &str) -> KollektivError {
    if status.as_u16() == 429 || status.is_server_error() {
        KollektivError::RetryableExternal {
            service,
            reason: format!("{status}: {body}"),
            retry_after: None,
        }
    } else {
        KollektivError::NonRetryableExternal {
            service,
            reason: format!("{status}: {body}"),
        }
    }
}
