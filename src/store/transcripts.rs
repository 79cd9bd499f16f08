// src/store/transcripts.rs
// Row persistence for transcripts and their chunks

use chrono::Utc;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::debug;
use uuid::Uuid;

use super::datetime_from_ts;
use super::types::{Chunk, ChunkWithTitle, NewChunk, NewTranscript, Transcript};
use crate::error::{ApiError, ApiResult};

pub struct TranscriptStore {
    pool: SqlitePool,
}

fn transcript_from_row(row: &SqliteRow) -> Transcript {
    let metadata: Option<String> = row.get("metadata");
    Transcript {
        id: row.get("id"),
        user_id: row.get("user_id"),
        youtube_video_id: row.get("youtube_video_id"),
        title: row.get("title"),
        channel_name: row.get("channel_name"),
        duration_s: row.get("duration_s"),
        transcript_text: row.get("transcript_text"),
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        created_at: datetime_from_ts(row.get("created_at")),
    }
}

impl TranscriptStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, new: NewTranscript) -> ApiResult<Transcript> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let metadata_json = new.metadata.as_ref().map(|m| m.to_string());

        let result = sqlx::query(
            r#"
            INSERT INTO transcripts (
                id, user_id, youtube_video_id, title, channel_name,
                duration_s, transcript_text, metadata, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.user_id)
        .bind(&new.youtube_video_id)
        .bind(&new.title)
        .bind(&new.channel_name)
        .bind(new.duration_s)
        .bind(&new.transcript_text)
        .bind(&metadata_json)
        .bind(now.timestamp())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(ApiError::InvalidInput(format!(
                    "video {} already ingested for this user",
                    new.youtube_video_id
                )));
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Transcript {
            id,
            user_id: new.user_id,
            youtube_video_id: new.youtube_video_id,
            title: new.title,
            channel_name: new.channel_name,
            duration_s: new.duration_s,
            transcript_text: new.transcript_text,
            metadata: new.metadata,
            created_at: now,
        })
    }

    pub async fn get(&self, id: &str) -> ApiResult<Option<Transcript>> {
        let row = sqlx::query("SELECT * FROM transcripts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| transcript_from_row(&r)))
    }

    /// All transcripts a user owns, newest first. Feeds the `metadata`
    /// intent's video list.
    pub async fn list_for_user(&self, user_id: &str) -> ApiResult<Vec<Transcript>> {
        let rows = sqlx::query(
            "SELECT * FROM transcripts WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(transcript_from_row).collect())
    }

    /// Transcripts reachable through a channel's video joins.
    pub async fn list_for_channel(&self, channel_id: &str) -> ApiResult<Vec<Transcript>> {
        let rows = sqlx::query(
            r#"
            SELECT t.* FROM transcripts t
            JOIN channel_videos cv ON cv.transcript_id = t.id
            WHERE cv.channel_id = ?
            ORDER BY cv.added_at DESC
            "#,
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(transcript_from_row).collect())
    }

    /// Delete a transcript row. Chunk rows cascade; vector cleanup is the
    /// caller's job and must happen first.
    pub async fn delete(&self, id: &str) -> ApiResult<()> {
        // Cascade manually so we do not depend on the connection's
        // foreign_keys pragma.
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE transcript_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM transcripts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

pub struct ChunkStore {
    pool: SqlitePool,
}

fn chunk_from_row(row: &SqliteRow) -> Chunk {
    let metadata: Option<String> = row.get("metadata");
    Chunk {
        id: row.get("id"),
        transcript_id: row.get("transcript_id"),
        user_id: row.get("user_id"),
        channel_id: row.get("channel_id"),
        chunk_index: row.get("chunk_index"),
        chunk_text: row.get("chunk_text"),
        token_count: row.get("token_count"),
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        created_at: datetime_from_ts(row.get("created_at")),
    }
}

impl ChunkStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert_many(&self, chunks: Vec<NewChunk>) -> ApiResult<Vec<Chunk>> {
        let now = Utc::now();
        let mut saved = Vec::with_capacity(chunks.len());

        let mut tx = self.pool.begin().await?;
        for new in chunks {
            let id = Uuid::new_v4().to_string();
            let metadata_json = new.metadata.as_ref().map(|m| m.to_string());

            sqlx::query(
                r#"
                INSERT INTO chunks (
                    id, transcript_id, user_id, channel_id, chunk_index,
                    chunk_text, token_count, metadata, created_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(&new.transcript_id)
            .bind(&new.user_id)
            .bind(&new.channel_id)
            .bind(new.chunk_index)
            .bind(&new.chunk_text)
            .bind(new.token_count)
            .bind(&metadata_json)
            .bind(now.timestamp())
            .execute(&mut *tx)
            .await?;

            saved.push(Chunk {
                id,
                transcript_id: new.transcript_id,
                user_id: new.user_id,
                channel_id: new.channel_id,
                chunk_index: new.chunk_index,
                chunk_text: new.chunk_text,
                token_count: new.token_count,
                metadata: new.metadata,
                created_at: now,
            });
        }
        tx.commit().await?;

        debug!("Inserted {} chunk rows", saved.len());
        Ok(saved)
    }

    /// Bulk hydration for retrieval: load chunk rows (joined with transcript
    /// titles) for the given ids. Ids with no row are simply absent from the
    /// result.
    pub async fn get_by_ids(&self, ids: &[String]) -> ApiResult<Vec<ChunkWithTitle>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            r#"
            SELECT c.*, t.title AS transcript_title, t.youtube_video_id
            FROM chunks c
            JOIN transcripts t ON t.id = c.transcript_id
            WHERE c.id IN ({})
            "#,
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| ChunkWithTitle {
                chunk: chunk_from_row(row),
                title: row.get("transcript_title"),
                youtube_video_id: row.get("youtube_video_id"),
            })
            .collect())
    }

    /// Ids of the chunks a channel owns for one transcript.
    pub async fn ids_for_channel_video(
        &self,
        channel_id: &str,
        transcript_id: &str,
    ) -> ApiResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT id FROM chunks WHERE channel_id = ? AND transcript_id = ?",
        )
        .bind(channel_id)
        .bind(transcript_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    /// Ids of every chunk under a transcript, regardless of scope.
    pub async fn ids_for_transcript(&self, transcript_id: &str) -> ApiResult<Vec<String>> {
        let rows = sqlx::query("SELECT id FROM chunks WHERE transcript_id = ?")
            .bind(transcript_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    /// Personal-scope chunks remaining under a transcript. A transcript
    /// with any of these is still in use even when no channel references
    /// it.
    pub async fn count_personal_chunks(&self, transcript_id: &str) -> ApiResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chunks WHERE transcript_id = ? AND channel_id IS NULL",
        )
        .bind(transcript_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Remove only the chunks a channel contributed for a transcript.
    /// Personal-scope chunks of the same transcript are untouched.
    pub async fn delete_channel_chunks(
        &self,
        channel_id: &str,
        transcript_id: &str,
    ) -> ApiResult<u64> {
        let result = sqlx::query(
            "DELETE FROM chunks WHERE channel_id = ? AND transcript_id = ?",
        )
        .bind(channel_id)
        .bind(transcript_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
