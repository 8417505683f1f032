//! Domain model shared by every Kollektiv crate.
//!
//! These types carry no behaviour beyond small helpers; the operations that
//! act on them (chunking, retrieval, conversation commit) live in their
//! owning crates. Every record here round-trips through
//! [`crate::serializer`] and is persisted by `kollektiv-store`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Where a source's content originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Web,
    GitHub,
    Jira,
    Confluence,
}

/// Ingestion milestones, emitted over the event bus and persisted on
/// [`Source::stage`]. Progresses monotonically except that `Failed`
/// absorbs from any prior stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStage {
    Created,
    CrawlingStarted,
    ProcessingScheduled,
    ChunksGenerated,
    SummaryGenerated,
    Completed,
    Failed,
}

impl SourceStage {
    /// The ordered, successful progression. Used to validate that emitted
    /// stage sequences are a prefix of this list, or end in `Failed`.
    pub const HAPPY_PATH: [SourceStage; 5] = [
        SourceStage::CrawlingStarted,
        SourceStage::ProcessingScheduled,
        SourceStage::ChunksGenerated,
        SourceStage::SummaryGenerated,
        SourceStage::Completed,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, SourceStage::Completed | SourceStage::Failed)
    }
}

/// Crawl configuration captured at add-source time, persisted as part of
/// `Source::metadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    pub page_limit: u32,
    pub max_depth: u32,
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub crawl_config: CrawlConfig,
    #[serde(default)]
    pub total_pages: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub source_id: Uuid,
    pub user_id: Uuid,
    pub request_id: Uuid,
    pub job_id: Option<Uuid>,
    pub source_type: SourceType,
    pub stage: SourceStage,
    pub metadata: SourceMetadata,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// The phase-specific payload a job carries. Distinguishes a crawl job
/// (tracked by the external crawler's id) from a processing job (tracked by
/// document count).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobDetails {
    Crawl {
        firecrawl_id: String,
        config: CrawlConfig,
        #[serde(default)]
        pages_crawled: u32,
    },
    Processing {
        document_count: u32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub details: JobDetails,
    pub result_id: Option<Uuid>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// The job's external crawler id, if this is a crawl job.
    pub fn firecrawl_id(&self) -> Option<&str> {
        match &self.details {
            JobDetails::Crawl { firecrawl_id, .. } => Some(firecrawl_id),
            JobDetails::Processing { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub source_url: String,
    pub og_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: Uuid,
    pub source_id: Uuid,
    pub content: String,
    pub metadata: DocumentMetadata,
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// The header path a chunk belongs to: the most recent h1/h2/h3 seen in
/// document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkHeaders {
    #[serde(default)]
    pub h1: String,
    #[serde(default)]
    pub h2: String,
    #[serde(default)]
    pub h3: String,
}

impl ChunkHeaders {
    /// Merge two header paths level by level, preferring the non-empty
    /// value at each level (self first).
    pub fn merge(&self, other: &ChunkHeaders) -> ChunkHeaders {
        fn pick(a: &str, b: &str) -> String {
            if !a.trim().is_empty() {
                a.to_string()
            } else {
                b.to_string()
            }
        }
        ChunkHeaders {
            h1: pick(&self.h1, &other.h1),
            h2: pick(&self.h2, &other.h2),
            h3: pick(&self.h3, &other.h3),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: Uuid,
    pub source_id: Uuid,
    pub document_id: Uuid,
    pub headers: ChunkHeaders,
    /// The chunk's own text, including any leading overlap from its
    /// predecessor.
    pub text: String,
    /// `headers` concatenated with `text`; this is the string that gets
    /// embedded.
    pub content: String,
    pub token_count: u32,
    pub page_title: String,
    pub page_url: String,
}

// ---------------------------------------------------------------------------
// SourceSummary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSummary {
    pub summary_id: Uuid,
    pub source_id: Uuid,
    pub summary: String,
    pub keywords: Vec<String>,
}

// ---------------------------------------------------------------------------
// Conversation & messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// A single block within a [`ConversationMessage`]'s content list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: serde_json::Value,
        #[serde(default)]
        is_error: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

/// Same shape as [`ConversationMessage`]; the distinct name documents where
/// a message currently lives (the K/V pending queue) rather than implying a
/// different wire format.
pub type PendingMessage = ConversationMessage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub message_ids: Vec<Uuid>,
    pub token_count: u32,
    #[serde(default)]
    pub data_sources: Vec<Uuid>,
}

/// The volatile, in-memory aggregate a streaming turn operates on. Built by
/// `kollektiv-chat::ConversationManager` from the K/V store, durable store,
/// or freshly created, and extended with any pending messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationHistory {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
    #[serde(default)]
    pub token_count: u32,
}

impl ConversationHistory {
    pub fn new(conversation_id: Uuid, user_id: Uuid) -> Self {
        Self {
            conversation_id,
            user_id,
            messages: Vec::new(),
            token_count: 0,
        }
    }

    /// Consecutive messages never share a role.
    pub fn roles_alternate(&self) -> bool {
        self.messages
            .windows(2)
            .all(|pair| pair[0].role != pair[1].role)
    }
}

// ---------------------------------------------------------------------------
// Event bus payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentProcessingEvent {
    pub source_id: Uuid,
    pub stage: SourceStage,
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl ContentProcessingEvent {
    pub fn new(source_id: Uuid, stage: SourceStage) -> Self {
        Self {
            source_id,
            stage,
            error: None,
            metadata: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Task queue payload
// ---------------------------------------------------------------------------

/// Enqueued when a source's crawl has finished and is ready for chunking,
/// embedding, and summarization. Deliberately thin: the worker re-reads
/// current `Source`/`Job` state from the durable store rather than trusting
/// a stale snapshot carried on the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingTask {
    pub source_id: Uuid,
    pub job_id: Uuid,
}

impl ProcessingTask {
    pub fn new(source_id: Uuid, job_id: Uuid) -> Self {
        Self { source_id, job_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_merge_prefers_non_empty_self() {
        let a = ChunkHeaders {
            h1: "Intro".into(),
            h2: String::new(),
            h3: String::new(),
        };
        let b = ChunkHeaders {
            h1: "Other".into(),
            h2: "Sub".into(),
            h3: String::new(),
        };
        let merged = a.merge(&b);
        assert_eq!(merged.h1, "Intro");
        assert_eq!(merged.h2, "Sub");
        assert_eq!(merged.h3, "");
    }

    #[test]
    fn roles_alternate_detects_violation() {
        let uid = Uuid::nil();
        let mut history = ConversationHistory::new(uid, uid);
        history.messages.push(ConversationMessage {
            message_id: Uuid::nil(),
            conversation_id: uid,
            role: Role::User,
            content: vec![],
        });
        history.messages.push(ConversationMessage {
            message_id: Uuid::nil(),
            conversation_id: uid,
            role: Role::User,
            content: vec![],
        });
        assert!(!history.roles_alternate());
    }
}
