//! Postgres-backed durable storage.
//!
//! The system of record for everything the Redis working-set store only
//! caches or queues. Queries are hand-written with `sqlx::query` (not the
//! `query!` macro) so this crate never needs a live database at build time.

use chrono::{DateTime, Utc};
use kollektiv_core::models::{
    Chunk, Conversation, ConversationMessage, Document, Job, Source, SourceSummary,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::StoreResult;

#[derive(Clone)]
pub struct DurableRepository {
    pool: PgPool,
}

impl DurableRepository {
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // -- Source --------------------------------------------------------

    pub async fn save_source(&self, source: &Source) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sources
                (source_id, user_id, request_id, job_id, source_type, stage, metadata, error, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (source_id) DO UPDATE SET
                job_id = EXCLUDED.job_id,
                stage = EXCLUDED.stage,
                metadata = EXCLUDED.metadata,
                error = EXCLUDED.error,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(source.source_id)
        .bind(source.user_id)
        .bind(source.request_id)
        .bind(source.job_id)
        .bind(serde_json::to_string(&source.source_type)?.trim_matches('"').to_string())
        .bind(serde_json::to_string(&source.stage)?.trim_matches('"').to_string())
        .bind(Json(&source.metadata))
        .bind(&source.error)
        .bind(source.created_at)
        .bind(source.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_source(&self, source_id: Uuid) -> StoreResult<Option<Source>> {
        let row = sqlx::query(
            r#"SELECT source_id, user_id, request_id, job_id, source_type, stage, metadata, error, created_at, updated_at
               FROM sources WHERE source_id = $1"#,
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_source).transpose()
    }

    pub async fn list_sources(&self, user_id: Uuid, limit: i64, offset: i64) -> StoreResult<Vec<Source>> {
        let rows = sqlx::query(
            r#"SELECT source_id, user_id, request_id, job_id, source_type, stage, metadata, error, created_at, updated_at
               FROM sources WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3"#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_source).collect()
    }

    // -- Job -------------------------------------------------------------

    pub async fn save_job(&self, job: &Job) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (job_id, status, details, result_id, error, created_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (job_id) DO UPDATE SET
                status = EXCLUDED.status,
                details = EXCLUDED.details,
                result_id = EXCLUDED.result_id,
                error = EXCLUDED.error,
                completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(job.job_id)
        .bind(serde_json::to_string(&job.status)?.trim_matches('"').to_string())
        .bind(Json(&job.details))
        .bind(job.result_id)
        .bind(&job.error)
        .bind(job.created_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_job(&self, job_id: Uuid) -> StoreResult<Option<Job>> {
        let row = sqlx::query(
            r#"SELECT job_id, status, details, result_id, error, created_at, completed_at FROM jobs WHERE job_id = $1"#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_job).transpose()
    }

    /// Looks a job up by the crawler's own id, stored inside the tagged
    /// `details` JSON column (`details->>'firecrawl_id'`), matching the
    /// original `query_entities(Job, filters={"details->>firecrawl_id": ...})`.
    pub async fn find_job_by_firecrawl_id(&self, firecrawl_id: &str) -> StoreResult<Option<Job>> {
        let row = sqlx::query(
            r#"SELECT job_id, status, details, result_id, error, created_at, completed_at
               FROM jobs WHERE details->>'firecrawl_id' = $1"#,
        )
        .bind(firecrawl_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_job).transpose()
    }

    // -- Document ----------------------------------------------------------

    pub async fn save_documents(&self, documents: &[Document]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for document in documents {
            sqlx::query(
                r#"
                INSERT INTO documents (document_id, source_id, content, metadata)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (document_id) DO UPDATE SET content = EXCLUDED.content, metadata = EXCLUDED.metadata
                "#,
            )
            .bind(document.document_id)
            .bind(document.source_id)
            .bind(&document.content)
            .bind(Json(&document.metadata))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn find_documents_by_source(&self, source_id: Uuid) -> StoreResult<Vec<Document>> {
        let rows = sqlx::query(r#"SELECT document_id, source_id, content, metadata FROM documents WHERE source_id = $1"#)
            .bind(source_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                Ok(Document {
                    document_id: row.try_get("document_id")?,
                    source_id: row.try_get("source_id")?,
                    content: row.try_get("content")?,
                    metadata: row.try_get::<Json<_>, _>("metadata")?.0,
                })
            })
            .collect()
    }

    // -- Chunk ---------------------------------------------------------------

    pub async fn save_chunks(&self, chunks: &[Chunk]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks
                    (chunk_id, source_id, document_id, headers, text, content, token_count, page_title, page_url)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (chunk_id) DO NOTHING
                "#,
            )
            .bind(chunk.chunk_id)
            .bind(chunk.source_id)
            .bind(chunk.document_id)
            .bind(Json(&chunk.headers))
            .bind(&chunk.text)
            .bind(&chunk.content)
            .bind(chunk.token_count as i32)
            .bind(&chunk.page_title)
            .bind(&chunk.page_url)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn find_chunks_by_source(&self, source_id: Uuid) -> StoreResult<Vec<Chunk>> {
        let rows = sqlx::query(
            r#"SELECT chunk_id, source_id, document_id, headers, text, content, token_count, page_title, page_url
               FROM chunks WHERE source_id = $1"#,
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                let token_count: i32 = row.try_get("token_count")?;
                Ok(Chunk {
                    chunk_id: row.try_get("chunk_id")?,
                    source_id: row.try_get("source_id")?,
                    document_id: row.try_get("document_id")?,
                    headers: row.try_get::<Json<_>, _>("headers")?.0,
                    text: row.try_get("text")?,
                    content: row.try_get("content")?,
                    token_count: token_count as u32,
                    page_title: row.try_get("page_title")?,
                    page_url: row.try_get("page_url")?,
                })
            })
            .collect()
    }

    // -- SourceSummary -------------------------------------------------------

    pub async fn save_source_summary(&self, summary: &SourceSummary) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO source_summaries (summary_id, source_id, summary, keywords)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (summary_id) DO UPDATE SET summary = EXCLUDED.summary, keywords = EXCLUDED.keywords
            "#,
        )
        .bind(summary.summary_id)
        .bind(summary.source_id)
        .bind(&summary.summary)
        .bind(Json(&summary.keywords))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_source_summary(&self, source_id: Uuid) -> StoreResult<Option<SourceSummary>> {
        let row = sqlx::query(
            r#"SELECT summary_id, source_id, summary, keywords FROM source_summaries WHERE source_id = $1"#,
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            Ok(SourceSummary {
                summary_id: row.try_get("summary_id")?,
                source_id: row.try_get("source_id")?,
                summary: row.try_get("summary")?,
                keywords: row.try_get::<Json<_>, _>("keywords")?.0,
            })
        })
        .transpose()
    }

    // -- Conversation & messages ---------------------------------------------

    pub async fn save_conversation(&self, conversation: &Conversation) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO conversations (conversation_id, user_id, title, token_count, data_sources)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (conversation_id) DO UPDATE SET
                title = EXCLUDED.title,
                token_count = EXCLUDED.token_count,
                data_sources = EXCLUDED.data_sources
            "#,
        )
        .bind(conversation.conversation_id)
        .bind(conversation.user_id)
        .bind(&conversation.title)
        .bind(conversation.token_count as i32)
        .bind(Json(&conversation.data_sources))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_conversation(&self, conversation_id: Uuid) -> StoreResult<Option<Conversation>> {
        let row = sqlx::query(
            r#"SELECT conversation_id, user_id, title, token_count, data_sources FROM conversations WHERE conversation_id = $1"#,
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_conversation).transpose()
    }

    pub async fn list_conversations(&self, user_id: Uuid, limit: i64, offset: i64) -> StoreResult<Vec<Conversation>> {
        let rows = sqlx::query(
            r#"SELECT conversation_id, user_id, title, token_count, data_sources
               FROM conversations WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3"#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_conversation).collect()
    }

    /// Appends committed messages at the end of the conversation's
    /// transcript, preserving arrival order via an explicit `position`
    /// column (Postgres gives no ordering guarantee across inserts without
    /// one).
    pub async fn append_conversation_messages(
        &self,
        conversation_id: Uuid,
        messages: &[ConversationMessage],
    ) -> StoreResult<()> {
        let next_position: i64 = sqlx::query(
            "SELECT COALESCE(MAX(position), -1) + 1 AS next FROM conversation_messages WHERE conversation_id = $1",
        )
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await?
        .try_get("next")?;

        let mut tx = self.pool.begin().await?;
        for (offset, message) in messages.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO conversation_messages (message_id, conversation_id, role, content, position)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (message_id) DO NOTHING
                "#,
            )
            .bind(message.message_id)
            .bind(message.conversation_id)
            .bind(serde_json::to_string(&message.role)?.trim_matches('"').to_string())
            .bind(Json(&message.content))
            .bind(next_position + offset as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn find_conversation_messages(&self, conversation_id: Uuid) -> StoreResult<Vec<ConversationMessage>> {
        let rows = sqlx::query(
            r#"SELECT message_id, conversation_id, role, content FROM conversation_messages
               WHERE conversation_id = $1 ORDER BY position ASC"#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                let role_raw: String = row.try_get("role")?;
                Ok(ConversationMessage {
                    message_id: row.try_get("message_id")?,
                    conversation_id: row.try_get("conversation_id")?,
                    role: serde_json::from_str(&format!("\"{role_raw}\""))?,
                    content: row.try_get::<Json<_>, _>("content")?.0,
                })
            })
            .collect()
    }
}

fn row_to_source(row: sqlx::postgres::PgRow) -> StoreResult<Source> {
    let source_type_raw: String = row.try_get("source_type")?;
    let stage_raw: String = row.try_get("stage")?;
    Ok(Source {
        source_id: row.try_get("source_id")?,
        user_id: row.try_get("user_id")?,
        request_id: row.try_get("request_id")?,
        job_id: row.try_get("job_id")?,
        source_type: serde_json::from_str(&format!("\"{source_type_raw}\""))?,
        stage: serde_json::from_str(&format!("\"{stage_raw}\""))?,
        metadata: row.try_get::<Json<_>, _>("metadata")?.0,
        error: row.try_get("error")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn row_to_job(row: sqlx::postgres::PgRow) -> StoreResult<Job> {
    let status_raw: String = row.try_get("status")?;
    Ok(Job {
        job_id: row.try_get("job_id")?,
        status: serde_json::from_str(&format!("\"{status_raw}\""))?,
        details: row.try_get::<Json<_>, _>("details")?.0,
        result_id: row.try_get("result_id")?,
        error: row.try_get("error")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn row_to_conversation(row: sqlx::postgres::PgRow) -> StoreResult<Conversation> {
    let token_count: i32 = row.try_get("token_count")?;
    Ok(Conversation {
        conversation_id: row.try_get("conversation_id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        message_ids: Vec::new(),
        token_count: token_count as u32,
        data_sources: row.try_get::<Json<_>, _>("data_sources")?.0,
    })
}
