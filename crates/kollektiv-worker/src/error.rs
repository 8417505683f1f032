use kollektiv_core::KollektivError;
use kollektiv_events::EventsError;
use kollektiv_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("kollektiv error: {0}")]
    Core(#[from] KollektivError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("events error: {0}")]
    Events(#[from] EventsError),

    #[error("chat error: {0}")]
    Chat(#[from] kollektiv_chat::ChatError),

    #[error("source {source_id} has no documents to process")]
    NoDocuments { source_id: Uuid },

    #[error("summary generation failed for source {source_id}: {reason}")]
    SummaryFailed { source_id: Uuid, reason: String },
}

impl From<WorkerError> for KollektivError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::Core(inner) => inner,
            WorkerError::Store(inner) => inner.into(),
            WorkerError::Events(inner) => inner.into(),
            WorkerError::Chat(inner) => inner.into(),
            other => KollektivError::Internal(other.to_string()),
        }
    }
}
