//! Schema migrations for the Postgres durable store.
//!
//! Adapted from the sqlite connection pool's versioned-table approach:
//! each migration is a named, ordered SQL statement; an `__migrations`
//! tracking table records what has already run, so `run` is safe to call
//! on every process startup.

use sqlx::{PgPool, Row};

use crate::error::{StoreError, StoreResult};

struct Migration {
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "0001_sources",
        sql: r#"
            CREATE TABLE IF NOT EXISTS sources (
                source_id    UUID PRIMARY KEY,
                user_id      UUID NOT NULL,
                request_id   UUID NOT NULL,
                job_id       UUID,
                source_type  TEXT NOT NULL,
                stage        TEXT NOT NULL,
                metadata     JSONB NOT NULL,
                error        TEXT,
                created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at   TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE INDEX IF NOT EXISTS sources_user_id_idx ON sources (user_id);
        "#,
    },
    Migration {
        name: "0002_jobs",
        sql: r#"
            CREATE TABLE IF NOT EXISTS jobs (
                job_id       UUID PRIMARY KEY,
                status       TEXT NOT NULL,
                details      JSONB NOT NULL,
                result_id    UUID,
                error        TEXT,
                created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
                completed_at TIMESTAMPTZ
            );
        "#,
    },
    Migration {
        name: "0003_documents",
        sql: r#"
            CREATE TABLE IF NOT EXISTS documents (
                document_id UUID PRIMARY KEY,
                source_id   UUID NOT NULL REFERENCES sources (source_id) ON DELETE CASCADE,
                content     TEXT NOT NULL,
                metadata    JSONB NOT NULL
            );
            CREATE INDEX IF NOT EXISTS documents_source_id_idx ON documents (source_id);
        "#,
    },
    Migration {
        name: "0004_chunks",
        sql: r#"
            CREATE TABLE IF NOT EXISTS chunks (
                chunk_id    UUID PRIMARY KEY,
                source_id   UUID NOT NULL REFERENCES sources (source_id) ON DELETE CASCADE,
                document_id UUID NOT NULL REFERENCES documents (document_id) ON DELETE CASCADE,
                headers     JSONB NOT NULL,
                text        TEXT NOT NULL,
                content     TEXT NOT NULL,
                token_count INTEGER NOT NULL,
                page_title  TEXT NOT NULL,
                page_url    TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS chunks_source_id_idx ON chunks (source_id);
        "#,
    },
    Migration {
        name: "0005_source_summaries",
        sql: r#"
            CREATE TABLE IF NOT EXISTS source_summaries (
                summary_id UUID PRIMARY KEY,
                source_id  UUID NOT NULL REFERENCES sources (source_id) ON DELETE CASCADE,
                summary    TEXT NOT NULL,
                keywords   JSONB NOT NULL
            );
        "#,
    },
    Migration {
        name: "0006_conversations",
        sql: r#"
            CREATE TABLE IF NOT EXISTS conversations (
                conversation_id UUID PRIMARY KEY,
                user_id         UUID NOT NULL,
                title           TEXT NOT NULL DEFAULT '',
                token_count     INTEGER NOT NULL DEFAULT 0,
                data_sources    JSONB NOT NULL DEFAULT '[]',
                created_at      TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE INDEX IF NOT EXISTS conversations_user_id_idx ON conversations (user_id);
        "#,
    },
    Migration {
        name: "0007_conversation_messages",
        sql: r#"
            CREATE TABLE IF NOT EXISTS conversation_messages (
                message_id      UUID PRIMARY KEY,
                conversation_id UUID NOT NULL REFERENCES conversations (conversation_id) ON DELETE CASCADE,
                role            TEXT NOT NULL,
                content         JSONB NOT NULL,
                position        INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS conversation_messages_conversation_id_idx
                ON conversation_messages (conversation_id, position);
        "#,
    },
];

async fn ensure_migrations_table(pool: &PgPool) -> StoreResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS __migrations (
            id         SERIAL PRIMARY KEY,
            name       TEXT NOT NULL UNIQUE,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| StoreError::Migration(format!("creating __migrations table: {e}")))?;
    Ok(())
}

async fn is_applied(pool: &PgPool, name: &str) -> StoreResult<bool> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM __migrations WHERE name = $1")
        .bind(name)
        .fetch_one(pool)
        .await
        .map_err(|e| StoreError::Migration(format!("checking migration {name}: {e}")))?;
    let count: i64 = row.get("count");
    Ok(count > 0)
}

async fn mark_applied(pool: &PgPool, name: &str) -> StoreResult<()> {
    sqlx::query("INSERT INTO __migrations (name) VALUES ($1)")
        .bind(name)
        .execute(pool)
        .await
        .map_err(|e| StoreError::Migration(format!("marking migration {name} applied: {e}")))?;
    Ok(())
}

/// Apply every migration not yet recorded in `__migrations`, in order.
pub async fn run(pool: &PgPool) -> StoreResult<()> {
    ensure_migrations_table(pool).await?;
    for migration in MIGRATIONS {
        if is_applied(pool, migration.name).await? {
            continue;
        }
        tracing::info!(migration = migration.name, "applying migration");
        sqlx::query(migration.sql)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Migration(format!("{}: {e}", migration.name)))?;
        mark_applied(pool, migration.name).await?;
    }
    Ok(())
}
