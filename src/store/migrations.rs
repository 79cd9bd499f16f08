// src/store/migrations.rs
// In-process schema setup, executed at startup and by the test suites

use sqlx::SqlitePool;
use tracing::info;

use crate::error::ApiResult;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('user', 'admin')),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS transcripts (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    youtube_video_id TEXT NOT NULL,
    title TEXT NOT NULL,
    channel_name TEXT,
    duration_s INTEGER,
    transcript_text TEXT NOT NULL,
    metadata TEXT,
    created_at INTEGER NOT NULL,
    UNIQUE (user_id, youtube_video_id)
);

CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    transcript_id TEXT NOT NULL REFERENCES transcripts(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL,
    channel_id TEXT,
    chunk_index INTEGER NOT NULL,
    chunk_text TEXT NOT NULL,
    token_count INTEGER NOT NULL DEFAULT 0,
    metadata TEXT,
    created_at INTEGER NOT NULL,
    UNIQUE (transcript_id, chunk_index)
);
CREATE INDEX IF NOT EXISTS idx_chunks_transcript ON chunks(transcript_id);
CREATE INDEX IF NOT EXISTS idx_chunks_channel ON chunks(channel_id);

CREATE TABLE IF NOT EXISTS channels (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    display_title TEXT NOT NULL,
    description TEXT,
    qdrant_collection_name TEXT NOT NULL,
    created_by TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    deleted_at INTEGER
);

CREATE TABLE IF NOT EXISTS channel_videos (
    id TEXT PRIMARY KEY,
    channel_id TEXT NOT NULL REFERENCES channels(id),
    transcript_id TEXT NOT NULL REFERENCES transcripts(id),
    added_by TEXT NOT NULL,
    added_at INTEGER NOT NULL,
    UNIQUE (channel_id, transcript_id)
);

CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    title TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id, updated_at);

CREATE TABLE IF NOT EXISTS channel_conversations (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    channel_id TEXT NOT NULL REFERENCES channels(id),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE (user_id, channel_id)
);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    conversation_id TEXT REFERENCES conversations(id),
    channel_conversation_id TEXT REFERENCES channel_conversations(id),
    role TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system')),
    content TEXT NOT NULL,
    metadata TEXT,
    created_at INTEGER NOT NULL,
    CHECK ((conversation_id IS NULL) != (channel_conversation_id IS NULL))
);
CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, created_at);
CREATE INDEX IF NOT EXISTS idx_messages_channel_conversation ON messages(channel_conversation_id, created_at);
"#;

pub async fn run_migrations(pool: &SqlitePool) -> ApiResult<()> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    info!("Database schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        // One pinned connection: a pooled :memory: database is
        // per-connection.
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(":memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn schema_applies_cleanly_and_is_idempotent() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn message_xor_constraint_holds() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();

        // Neither FK set: rejected.
        let result = sqlx::query(
            "INSERT INTO messages (id, role, content, created_at) VALUES ('m1', 'user', 'hi', 0)",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }
}
