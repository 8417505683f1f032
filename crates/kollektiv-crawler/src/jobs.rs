//! Job lifecycle: `Pending -> InProgress -> {Completed, Failed, Cancelled}`.
//!
//! Backed by the Postgres durable repository rather than a flat file, with
//! protected-field enforcement: callers patch a job through
//! [`JobManager::transition`] rather than writing a whole new `Job`, so
//! `job_id` and `created_at` can never drift.

use chrono::Utc;
use kollektiv_core::models::{Job, JobDetails, JobStatus};
use kollektiv_core::KollektivError;
use kollektiv_store::DurableRepository;
use uuid::Uuid;

pub struct JobManager {
    repository: DurableRepository,
}

impl JobManager {
    pub fn new(repository: DurableRepository) -> Self {
        Self { repository }
    }

    pub async fn create_crawl_job(&self, firecrawl_id: String, config: kollektiv_core::models::CrawlConfig) -> Result<Job, KollektivError> {
        let job = Job {
            job_id: Uuid::new_v4(),
            status: JobStatus::Pending,
            details: JobDetails::Crawl {
                firecrawl_id,
                config,
                pages_crawled: 0,
            },
            result_id: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        self.repository.save_job(&job).await?;
        Ok(job)
    }

    pub async fn create_processing_job(&self, document_count: u32) -> Result<Job, KollektivError> {
        let job = Job {
            job_id: Uuid::new_v4(),
            status: JobStatus::Pending,
            details: JobDetails::Processing { document_count },
            result_id: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        self.repository.save_job(&job).await?;
        Ok(job)
    }

    pub async fn get(&self, job_id: Uuid) -> Result<Job, KollektivError> {
        self.repository
            .find_job(job_id)
            .await?
            .ok_or(KollektivError::JobNotFound { job_id })
    }

    pub async fn get_by_firecrawl_id(&self, firecrawl_id: &str) -> Result<Option<Job>, KollektivError> {
        Ok(self.repository.find_job_by_firecrawl_id(firecrawl_id).await?)
    }

    /// Move a job to `InProgress`. Only legal from `Pending`.
    pub async fn mark_in_progress(&self, job_id: Uuid) -> Result<Job, KollektivError> {
        let mut job = self.get(job_id).await?;
        require_transition(&job, JobStatus::Pending, JobStatus::InProgress)?;
        job.status = JobStatus::InProgress;
        self.repository.save_job(&job).await?;
        Ok(job)
    }

    /// Move a job to `Completed`, recording the result entity's id.
    pub async fn mark_completed(&self, job_id: Uuid, result_id: Uuid) -> Result<Job, KollektivError> {
        let mut job = self.get(job_id).await?;
        require_non_terminal(&job)?;
        job.status = JobStatus::Completed;
        job.result_id = Some(result_id);
        job.completed_at = Some(Utc::now());
        self.repository.save_job(&job).await?;
        Ok(job)
    }

    /// Move a job to `Failed`, recording why.
    pub async fn mark_failed(&self, job_id: Uuid, reason: impl Into<String>) -> Result<Job, KollektivError> {
        let mut job = self.get(job_id).await?;
        require_non_terminal(&job)?;
        job.status = JobStatus::Failed;
        job.error = Some(reason.into());
        job.completed_at = Some(Utc::now());
        self.repository.save_job(&job).await?;
        Ok(job)
    }

    /// Move a job to `Cancelled`. Legal from any non-terminal state.
    pub async fn cancel(&self, job_id: Uuid) -> Result<Job, KollektivError> {
        let mut job = self.get(job_id).await?;
        require_non_terminal(&job)?;
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        self.repository.save_job(&job).await?;
        Ok(job)
    }

    /// Record incremental crawl progress without changing status.
    pub async fn record_pages_crawled(&self, job_id: Uuid, pages_crawled: u32) -> Result<Job, KollektivError> {
        let mut job = self.get(job_id).await?;
        match &mut job.details {
            JobDetails::Crawl { pages_crawled: current, .. } => *current = pages_crawled,
            JobDetails::Processing { .. } => {
                return Err(KollektivError::JobValidationError(
                    "pages_crawled only applies to crawl jobs".into(),
                ))
            }
        }
        self.repository.save_job(&job).await?;
        Ok(job)
    }
}

fn require_transition(job: &Job, expected: JobStatus, target: JobStatus) -> Result<(), KollektivError> {
    if job.status != expected {
        return Err(KollektivError::JobStateError {
            job_id: job.job_id,
            reason: format!("cannot move to {target:?} from {:?}, expected {expected:?}", job.status),
        });
    }
    Ok(())
}

fn require_non_terminal(job: &Job) -> Result<(), KollektivError> {
    if job.status.is_terminal() {
        return Err(KollektivError::JobStateError {
            job_id: job.job_id,
            reason: format!("job is already terminal ({:?})", job.status),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_reject_further_transitions() {
        let job = Job {
            job_id: Uuid::new_v4(),
            status: JobStatus::Completed,
            details: JobDetails::Processing { document_count: 3 },
            result_id: Some(Uuid::new_v4()),
            error: None,
            created_at: Utc::now(),
            completed_at: Some(Utc::now()),
        };
        assert!(require_non_terminal(&job).is_err());
    }
}
