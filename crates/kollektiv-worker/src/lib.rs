//! Background ingestion pipeline: chunking, embedding, and
//! summarization for a source once its crawl has completed.

pub mod error;
pub mod pipeline;
pub mod summary;

pub use error::{WorkerError, WorkerResult};
pub use pipeline::{process_source, run_worker_pool, Services};
pub use summary::SummaryGenerator;
