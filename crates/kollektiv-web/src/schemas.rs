//! Request/response wire shapes for the REST surface. Kept separate from
//! the domain model in `kollektiv-core::models` so the HTTP contract can
//! evolve (pagination envelopes, frontend-only fields) without touching
//! persisted records.

use chrono::{DateTime, Utc};
use kollektiv_core::models::{ContentProcessingEvent, Source, SourceStage, SourceType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct AddSourceRequest {
    pub url: String,
    #[serde(default)]
    pub source_type: Option<SourceType>,
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

fn default_page_limit() -> u32 {
    100
}

fn default_max_depth() -> u32 {
    3
}

#[derive(Debug, Serialize)]
pub struct AddSourceResponse {
    pub source_id: Uuid,
    pub stage: SourceStage,
}

#[derive(Debug, Serialize)]
pub struct SourceView {
    pub source_id: Uuid,
    pub source_type: SourceType,
    pub stage: SourceStage,
    pub total_pages: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Source> for SourceView {
    fn from(source: &Source) -> Self {
        Self {
            source_id: source.source_id,
            source_type: source.source_type,
            stage: source.stage,
            total_pages: source.metadata.total_pages,
            error: source.error.clone(),
            created_at: source.created_at,
            updated_at: source.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Serialize)]
pub struct SourceListResponse {
    pub sources: Vec<SourceView>,
    pub limit: i64,
    pub offset: i64,
}

/// Wire shape streamed over `GET /api/v0/sources/{id}/events`; a direct
/// projection of [`ContentProcessingEvent`] since the frontend only needs
/// the stage transition and an optional error reason.
#[derive(Debug, Serialize)]
pub struct SourceEvent {
    pub source_id: Uuid,
    pub stage: SourceStage,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<&ContentProcessingEvent> for SourceEvent {
    fn from(event: &ContentProcessingEvent) -> Self {
        Self {
            source_id: event.source_id,
            stage: event.stage,
            error: event.error.clone(),
            timestamp: event.timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    pub conversation_id: Option<Uuid>,
    pub user_id: Uuid,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub conversation_id: Uuid,
    pub title: String,
    pub token_count: u32,
}

#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationSummary>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct ConversationDetailResponse {
    pub conversation_id: Uuid,
    pub title: String,
    pub messages: Vec<kollektiv_core::models::ConversationMessage>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
    pub redis: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kollektiv_core::models::{CrawlConfig, SourceMetadata};

    #[test]
    fn add_source_request_defaults_page_limit_and_depth() {
        let request: AddSourceRequest = serde_json::from_str(r#"{"url": "https://example.com"}"#).unwrap();
        assert_eq!(request.page_limit, 100);
        assert_eq!(request.max_depth, 3);
        assert!(request.include_patterns.is_empty());
    }

    #[test]
    fn source_view_carries_total_pages_from_metadata() {
        let source = Source {
            source_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            job_id: None,
            source_type: SourceType::Web,
            stage: SourceStage::Completed,
            metadata: SourceMetadata {
                crawl_config: CrawlConfig { page_limit: 100, max_depth: 3, include_patterns: vec![], exclude_patterns: vec![] },
                total_pages: 12,
            },
            error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let view = SourceView::from(&source);
        assert_eq!(view.total_pages, 12);
        assert_eq!(view.stage, SourceStage::Completed);
    }

    #[test]
    fn source_event_projects_error_and_stage() {
        let event = ContentProcessingEvent::new(Uuid::new_v4(), SourceStage::Failed).with_error("boom");
        let view = SourceEvent::from(&event);
        assert_eq!(view.error.as_deref(), Some("boom"));
        assert_eq!(view.stage, SourceStage::Failed);
    }
}
