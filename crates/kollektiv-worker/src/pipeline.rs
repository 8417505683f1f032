//! Worker Pipeline: chunk, embed, and summarize a source once its
//! crawl has finished, transitioning `Source`/`Job` through their stages
//! and publishing a `ContentProcessingEvent` at every boundary.
//!
//! N tokio tasks pull from one shared queue; each task processes one
//! `ProcessingTask` at a time end to end, no dependency graph between
//! stages.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kollektiv_chunker::MarkdownChunker;
use kollektiv_core::models::{
    ContentProcessingEvent, Document, Job, JobDetails, JobStatus, ProcessingTask, Source, SourceStage,
};
use kollektiv_events::EventsClient;
use kollektiv_retrieval::VectorIndex;
use kollektiv_store::DurableRepository;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{WorkerError, WorkerResult};
use crate::summary::SummaryGenerator;

/// How long a worker blocks on an empty queue before polling again.
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a pipeline run needs, bundled so `run_worker_pool` can clone
/// one `Arc` into each spawned task rather than threading five handles
/// through every function signature.
pub struct Services {
    pub durable: DurableRepository,
    pub events: EventsClient,
    pub chunker: MarkdownChunker,
    pub vector_index: VectorIndex,
    pub summary_generator: SummaryGenerator,
}

/// Spawn `concurrency` workers, each looping on `BRPOP`-style dequeue of
/// `ProcessingTask`s until the process is told to stop.
pub fn run_worker_pool(services: Arc<Services>, concurrency: usize) -> Vec<tokio::task::JoinHandle<()>> {
    (0..concurrency.max(1))
        .map(|i| {
            let services = services.clone();
            tokio::spawn(async move {
                info!(worker = i, "pipeline worker started");
                loop {
                    match services.events.queue.dequeue::<ProcessingTask>(DEFAULT_POLL_TIMEOUT).await {
                        Ok(Some(task)) => {
                            if let Err(e) = process_source(&services, task.source_id, task.job_id).await {
                                error!(worker = i, source_id = %task.source_id, error = %e, "pipeline run failed");
                            }
                        }
                        Ok(None) => continue,
                        Err(e) => {
                            warn!(worker = i, error = %e, "queue dequeue error, backing off");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            })
        })
        .collect()
}

/// Run the full pipeline for one source: chunk its documents, embed and
/// persist the chunks, generate a summary, and advance `Source`/`Job`
/// through their stages. On any failure, both records are marked `Failed`
/// and a `Failed` event is published before the error is returned.
pub async fn process_source(services: &Services, source_id: Uuid, job_id: Uuid) -> WorkerResult<()> {
    let mut source = services
        .durable
        .find_source(source_id)
        .await?
        .ok_or_else(|| WorkerError::Core(kollektiv_core::KollektivError::NotFound {
            entity: "source",
            id: source_id.to_string(),
        }))?;
    let mut job = services
        .durable
        .find_job(job_id)
        .await?
        .ok_or_else(|| WorkerError::Core(kollektiv_core::KollektivError::JobNotFound { job_id }))?;

    match run_stages(services, &mut source, &mut job).await {
        Ok(()) => Ok(()),
        Err(e) => {
            fail(services, &mut source, &mut job, &e.to_string()).await?;
            Err(e)
        }
    }
}

async fn run_stages(services: &Services, source: &mut Source, job: &mut Job) -> WorkerResult<()> {
    advance(services, source, SourceStage::ProcessingScheduled).await?;

    let documents = services.durable.find_documents_by_source(source.source_id).await?;
    if documents.is_empty() {
        return Err(WorkerError::NoDocuments { source_id: source.source_id });
    }

    generate_and_persist_chunks(services, source, &documents).await?;
    advance(services, source, SourceStage::ChunksGenerated).await?;

    let summary = services.summary_generator.generate(source.source_id, &documents).await?;
    services.durable.save_source_summary(&summary).await?;
    advance(services, source, SourceStage::SummaryGenerated).await?;

    job.status = JobStatus::Completed;
    job.completed_at = Some(Utc::now());
    if let JobDetails::Processing { document_count } = &mut job.details {
        *document_count = documents.len() as u32;
    }
    services.durable.save_job(job).await?;
    advance(services, source, SourceStage::Completed).await?;

    Ok(())
}

async fn generate_and_persist_chunks(services: &Services, source: &Source, documents: &[Document]) -> WorkerResult<()> {
    for document_batch in services.chunker.batch_documents(documents) {
        let chunks = services.chunker.process_documents(document_batch);
        for chunk_batch in services.chunker.batch_chunks(&chunks) {
            services.durable.save_chunks(chunk_batch).await?;
            services.vector_index.add_chunks(source.user_id, chunk_batch).await?;
        }
    }
    Ok(())
}

async fn advance(services: &Services, source: &mut Source, stage: SourceStage) -> WorkerResult<()> {
    source.stage = stage;
    source.updated_at = Utc::now();
    services.durable.save_source(source).await?;
    services.events.bus.publish(&ContentProcessingEvent::new(source.source_id, stage)).await?;
    Ok(())
}

async fn fail(services: &Services, source: &mut Source, job: &mut Job, reason: &str) -> WorkerResult<()> {
    source.stage = SourceStage::Failed;
    source.error = Some(reason.to_string());
    source.updated_at = Utc::now();
    services.durable.save_source(source).await?;

    job.status = JobStatus::Failed;
    job.error = Some(reason.to_string());
    job.completed_at = Some(Utc::now());
    services.durable.save_job(job).await?;

    let event = ContentProcessingEvent::new(source.source_id, SourceStage::Failed).with_error(reason);
    services.events.bus.publish(&event).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_stage_order_excludes_failed() {
        assert_eq!(SourceStage::HAPPY_PATH.last(), Some(&SourceStage::Completed));
        assert!(!SourceStage::HAPPY_PATH.contains(&SourceStage::Failed));
    }
}
