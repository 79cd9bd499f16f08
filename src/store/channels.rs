// src/store/channels.rs
// Channel and channel-video persistence with soft delete

use chrono::Utc;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::datetime_from_ts;
use super::types::{Channel, ChannelVideo};
use crate::error::{ApiError, ApiResult};
use crate::vector::channel_collection_name;

pub struct ChannelStore {
    pool: SqlitePool,
}

fn channel_from_row(row: &SqliteRow) -> Channel {
    let deleted_at: Option<i64> = row.get("deleted_at");
    Channel {
        id: row.get("id"),
        name: row.get("name"),
        display_title: row.get("display_title"),
        description: row.get("description"),
        qdrant_collection_name: row.get("qdrant_collection_name"),
        created_by: row.get("created_by"),
        created_at: datetime_from_ts(row.get("created_at")),
        updated_at: datetime_from_ts(row.get("updated_at")),
        deleted_at: deleted_at.map(datetime_from_ts),
    }
}

impl ChannelStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        name: &str,
        display_title: &str,
        description: Option<&str>,
        created_by: &str,
    ) -> ApiResult<Channel> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        // The collection name is fixed here for the channel's whole
        // lifetime, surviving soft-delete/reactivate cycles.
        let collection = channel_collection_name(name);

        let result = sqlx::query(
            r#"
            INSERT INTO channels (
                id, name, display_title, description, qdrant_collection_name,
                created_by, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(name)
        .bind(display_title)
        .bind(description)
        .bind(&collection)
        .bind(created_by)
        .bind(now.timestamp())
        .bind(now.timestamp())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(ApiError::InvalidInput(format!(
                    "channel name {} is taken",
                    name
                )));
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Channel {
            id,
            name: name.to_string(),
            display_title: display_title.to_string(),
            description: description.map(String::from),
            qdrant_collection_name: collection,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Fetch a live channel. Soft-deleted channels are invisible here.
    pub async fn get_active(&self, id: &str) -> ApiResult<Option<Channel>> {
        let row = sqlx::query("SELECT * FROM channels WHERE id = ? AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| channel_from_row(&r)))
    }

    /// Fetch regardless of deletion state, for admin tooling.
    pub async fn get_any(&self, id: &str) -> ApiResult<Option<Channel>> {
        let row = sqlx::query("SELECT * FROM channels WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| channel_from_row(&r)))
    }

    pub async fn list_active(&self) -> ApiResult<Vec<Channel>> {
        let rows = sqlx::query(
            "SELECT * FROM channels WHERE deleted_at IS NULL ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(channel_from_row).collect())
    }

    pub async fn soft_delete(&self, id: &str) -> ApiResult<()> {
        let now = Utc::now().timestamp();
        sqlx::query("UPDATE channels SET deleted_at = ?, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Clear `deleted_at`. The collection name is untouched, so the channel
    /// resumes serving from its existing corpus.
    pub async fn reactivate(&self, id: &str) -> ApiResult<()> {
        sqlx::query("UPDATE channels SET deleted_at = NULL, updated_at = ? WHERE id = ?")
            .bind(Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn add_video(
        &self,
        channel_id: &str,
        transcript_id: &str,
        added_by: &str,
    ) -> ApiResult<ChannelVideo> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO channel_videos (id, channel_id, transcript_id, added_by, added_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(channel_id)
        .bind(transcript_id)
        .bind(added_by)
        .bind(now.timestamp())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(ApiError::InvalidInput(
                    "video is already in this channel".into(),
                ));
            }
            Err(e) => return Err(e.into()),
        }

        Ok(ChannelVideo {
            id,
            channel_id: channel_id.to_string(),
            transcript_id: transcript_id.to_string(),
            added_by: added_by.to_string(),
            added_at: now,
        })
    }

    pub async fn remove_video(&self, channel_id: &str, transcript_id: &str) -> ApiResult<()> {
        sqlx::query("DELETE FROM channel_videos WHERE channel_id = ? AND transcript_id = ?")
            .bind(channel_id)
            .bind(transcript_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// How many channels still reference a transcript. Drives the orphan
    /// retention policy.
    pub async fn channels_referencing(&self, transcript_id: &str) -> ApiResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM channel_videos WHERE transcript_id = ?")
                .bind(transcript_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
