use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kollektiv_core::KollektivError;
use serde_json::json;
use thiserror::Error;

pub type WebResult<T> = Result<T, WebError>;

#[derive(Debug, Error)]
pub enum WebError {
    #[error("kollektiv error: {0}")]
    Core(#[from] KollektivError),

    #[error("store error: {0}")]
    Store(#[from] kollektiv_store::StoreError),

    #[error("events error: {0}")]
    Events(#[from] kollektiv_events::EventsError),

    #[error("chat error: {0}")]
    Chat(#[from] kollektiv_chat::ChatError),

    #[error("invalid webhook payload: {0}")]
    InvalidWebhook(String),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            WebError::Core(KollektivError::NotFound { .. }) => (StatusCode::NOT_FOUND, self.to_string()),
            WebError::Core(KollektivError::JobNotFound { .. }) => (StatusCode::NOT_FOUND, self.to_string()),
            WebError::Core(KollektivError::Validation(_)) => (StatusCode::BAD_REQUEST, self.to_string()),
            WebError::Core(KollektivError::JobValidationError(_)) => (StatusCode::BAD_REQUEST, self.to_string()),
            WebError::Core(KollektivError::EmptyContent { .. }) => (StatusCode::BAD_REQUEST, self.to_string()),
            WebError::InvalidWebhook(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
