//! REST handlers for source ingestion and conversation history, built on
//! axum's `State<Arc<Services>>` + `Json<T>` extractors.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use kollektiv_core::models::{CrawlConfig, Source, SourceMetadata, SourceStage, SourceType};
use kollektiv_core::KollektivError;
use kollektiv_crawler::CrawlRequest;
use uuid::Uuid;

use crate::error::{WebError, WebResult};
use crate::schemas::{
    AddSourceRequest, AddSourceResponse, ConversationDetailResponse, ConversationListResponse,
    ConversationSummary, HealthResponse, PageQuery, SourceListResponse, SourceView,
};
use crate::state::Services;

pub async fn health(State(services): State<Arc<Services>>) -> Json<HealthResponse> {
    let database = sqlx::query("SELECT 1").fetch_one(services.durable.pool()).await.is_ok();
    let redis = services.events.queue.len().await.is_ok();
    let status = if database && redis { "ok" } else { "degraded" };
    Json(HealthResponse { status, database, redis })
}

pub async fn add_source(
    State(services): State<Arc<Services>>,
    Json(request): Json<AddSourceRequest>,
) -> WebResult<Json<AddSourceResponse>> {
    let url = url::Url::parse(&request.url)
        .map_err(|e| WebError::Core(KollektivError::Validation(format!("invalid url: {e}"))))?;

    let config = CrawlConfig {
        page_limit: request.page_limit,
        max_depth: request.max_depth,
        include_patterns: request.include_patterns,
        exclude_patterns: request.exclude_patterns,
    };

    let submission = services
        .crawler
        .submit_crawl(&CrawlRequest { url, config: config.clone(), webhook_url: services.config.webhook_base_url() })
        .await?;

    let job = services.jobs.create_crawl_job(submission.firecrawl_id, config.clone()).await?;

    let source = Source {
        source_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        request_id: Uuid::new_v4(),
        job_id: Some(job.job_id),
        source_type: request.source_type.unwrap_or(SourceType::Web),
        stage: SourceStage::Created,
        metadata: SourceMetadata { crawl_config: config, total_pages: 0 },
        error: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    services.durable.save_source(&source).await?;

    Ok(Json(AddSourceResponse { source_id: source.source_id, stage: source.stage }))
}

pub async fn list_sources(
    State(services): State<Arc<Services>>,
    Query(page): Query<PageQuery>,
) -> WebResult<Json<SourceListResponse>> {
    // Filtering by the caller's user id is left to an authentication layer
    // this system does not implement; the nil id lists every source.
    let sources = services.durable.list_sources(Uuid::nil(), page.limit, page.offset).await?;
    Ok(Json(SourceListResponse {
        sources: sources.iter().map(SourceView::from).collect(),
        limit: page.limit,
        offset: page.offset,
    }))
}

pub async fn get_source(
    State(services): State<Arc<Services>>,
    Path(source_id): Path<Uuid>,
) -> WebResult<Json<SourceView>> {
    let source = services
        .durable
        .find_source(source_id)
        .await?
        .ok_or_else(|| WebError::Core(KollektivError::NotFound { entity: "source", id: source_id.to_string() }))?;
    Ok(Json(SourceView::from(&source)))
}

pub async fn list_conversations(
    State(services): State<Arc<Services>>,
    Query(page): Query<PageQuery>,
) -> WebResult<Json<ConversationListResponse>> {
    let conversations = services.durable.list_conversations(Uuid::nil(), page.limit, page.offset).await?;
    Ok(Json(ConversationListResponse {
        conversations: conversations
            .into_iter()
            .map(|c| ConversationSummary { conversation_id: c.conversation_id, title: c.title, token_count: c.token_count })
            .collect(),
        limit: page.limit,
        offset: page.offset,
    }))
}

pub async fn get_conversation(
    State(services): State<Arc<Services>>,
    Path(conversation_id): Path<Uuid>,
) -> WebResult<Json<ConversationDetailResponse>> {
    let conversation = services
        .durable
        .find_conversation(conversation_id)
        .await?
        .ok_or_else(|| WebError::Core(KollektivError::NotFound { entity: "conversation", id: conversation_id.to_string() }))?;
    let messages = services.durable.find_conversation_messages(conversation_id).await?;
    Ok(Json(ConversationDetailResponse { conversation_id, title: conversation.title, messages }))
}
