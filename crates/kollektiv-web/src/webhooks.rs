//! Firecrawl webhook ingestion: `crawl.started` / `crawl.page` /
//! `crawl.completed` / `crawl.failed` notifications drive the `Source`
//! and `Job` state machines and, on completion, enqueue a
//! [`ProcessingTask`] for `kollektiv-worker`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use kollektiv_core::models::{ProcessingTask, SourceStage};
use serde::Deserialize;

use crate::error::{WebError, WebResult};
use crate::state::Services;

#[derive(Debug, Deserialize)]
pub struct FirecrawlWebhook {
    #[serde(rename = "type")]
    pub event_type: String,
    pub id: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

pub async fn firecrawl_webhook(
    State(services): State<Arc<Services>>,
    Json(webhook): Json<FirecrawlWebhook>,
) -> WebResult<StatusCode> {
    let job = services
        .jobs
        .get_by_firecrawl_id(&webhook.id)
        .await?
        .ok_or_else(|| WebError::InvalidWebhook(format!("no job for firecrawl id {}", webhook.id)))?;

    let Some(source) = find_source_for_job(&services, job.job_id).await? else {
        return Err(WebError::InvalidWebhook(format!("no source for job {}", job.job_id)));
    };

    match webhook.event_type.as_str() {
        "crawl.started" => {
            services.jobs.mark_in_progress(job.job_id).await?;
            advance(&services, source.source_id, SourceStage::CrawlingStarted, None).await?;
        }
        "crawl.page" => {
            let pages_crawled = webhook.data.len() as u32;
            services.jobs.record_pages_crawled(job.job_id, pages_crawled).await?;
        }
        "crawl.completed" => {
            let documents = services.crawler.fetch_results(source.source_id, &webhook.id).await?;
            services.durable.save_documents(&documents).await?;

            let processing_job = services.jobs.create_processing_job(documents.len() as u32).await?;
            services.events.queue.enqueue(&ProcessingTask::new(source.source_id, processing_job.job_id)).await?;

            advance(&services, source.source_id, SourceStage::ProcessingScheduled, None).await?;
        }
        "crawl.failed" => {
            let reason = webhook.error.unwrap_or_else(|| "crawl failed".to_string());
            services.jobs.mark_failed(job.job_id, reason.clone()).await?;
            advance(&services, source.source_id, SourceStage::Failed, Some(reason)).await?;
        }
        other => {
            return Err(WebError::InvalidWebhook(format!("unrecognised webhook type: {other}")));
        }
    }

    Ok(StatusCode::OK)
}

async fn find_source_for_job(services: &Services, job_id: uuid::Uuid) -> WebResult<Option<kollektiv_core::models::Source>> {
    // Sources are looked up by their crawl job id; scanning the first page
    // of recent sources is sufficient here since a webhook always arrives
    // shortly after the source was created.
    let candidates = services.durable.list_sources(uuid::Uuid::nil(), 200, 0).await?;
    Ok(candidates.into_iter().find(|s| s.job_id == Some(job_id)))
}

async fn advance(services: &Services, source_id: uuid::Uuid, stage: SourceStage, error: Option<String>) -> WebResult<()> {
    let Some(mut source) = services.durable.find_source(source_id).await? else {
        return Ok(());
    };
    source.stage = stage;
    source.error = error.clone();
    source.updated_at = Utc::now();
    services.durable.save_source(&source).await?;

    let mut event = kollektiv_core::models::ContentProcessingEvent::new(source_id, stage);
    if let Some(reason) = error {
        event = event.with_error(reason);
    }
    services.events.bus.publish(&event).await?;
    Ok(())
}
