// src/store/conversations.rs
// Conversation and message persistence, including the atomic turn commit

use chrono::Utc;
use serde_json::Value;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::debug;
use uuid::Uuid;

use super::datetime_from_ts;
use super::types::{
    ChannelConversation, ChannelConversationSummary, Conversation, ConversationRef, Message,
    MessageRole, Page, default_conversation_title,
};
use crate::error::{ApiError, ApiResult};

pub struct ConversationStore {
    pool: SqlitePool,
}

fn conversation_from_row(row: &SqliteRow) -> Conversation {
    Conversation {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        created_at: datetime_from_ts(row.get("created_at")),
        updated_at: datetime_from_ts(row.get("updated_at")),
    }
}

fn message_from_row(row: &SqliteRow) -> Message {
    let role: String = row.get("role");
    let metadata: Option<String> = row.get("metadata");
    Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        channel_conversation_id: row.get("channel_conversation_id"),
        role: MessageRole::parse(&role).unwrap_or(MessageRole::System),
        content: row.get("content"),
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        created_at: datetime_from_ts(row.get("created_at")),
    }
}

impl ConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user_id: &str, title: Option<String>) -> ApiResult<Conversation> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let title = title.unwrap_or_else(|| default_conversation_title(now));

        sqlx::query(
            "INSERT INTO conversations (id, user_id, title, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(&title)
        .bind(now.timestamp())
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?;

        debug!(conversation_id = %id, user_id, "created conversation");

        Ok(Conversation {
            id,
            user_id: user_id.to_string(),
            title,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get(&self, id: &str) -> ApiResult<Option<Conversation>> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| conversation_from_row(&r)))
    }

    pub async fn list(&self, user_id: &str, limit: i64, offset: i64) -> ApiResult<Page<Conversation>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(
            "SELECT * FROM conversations WHERE user_id = ? ORDER BY updated_at DESC LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(Page {
            items: rows.iter().map(conversation_from_row).collect(),
            total,
            limit,
            offset,
        })
    }

    pub async fn update_title(&self, id: &str, title: &str) -> ApiResult<()> {
        sqlx::query("UPDATE conversations SET title = ?, updated_at = ? WHERE id = ?")
            .bind(title)
            .bind(Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a conversation and its messages in one transaction.
    pub async fn delete(&self, id: &str) -> ApiResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM messages WHERE conversation_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    fn fk_column(conversation: &ConversationRef) -> &'static str {
        match conversation {
            ConversationRef::Personal(_) => "conversation_id",
            ConversationRef::Channel(_) => "channel_conversation_id",
        }
    }

    /// Every message in a conversation, oldest first.
    pub async fn all_messages(&self, conversation: &ConversationRef) -> ApiResult<Vec<Message>> {
        let sql = format!(
            "SELECT * FROM messages WHERE {} = ? ORDER BY created_at ASC, rowid ASC",
            Self::fk_column(conversation)
        );
        let rows = sqlx::query(&sql)
            .bind(conversation.id())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(message_from_row).collect())
    }

    /// The last `limit` messages, returned oldest first for prompt assembly.
    pub async fn load_recent_messages(
        &self,
        conversation: &ConversationRef,
        limit: usize,
    ) -> ApiResult<Vec<Message>> {
        let sql = format!(
            "SELECT * FROM messages WHERE {} = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
            Self::fk_column(conversation)
        );
        let rows = sqlx::query(&sql)
            .bind(conversation.id())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut messages: Vec<Message> = rows.iter().map(message_from_row).collect();
        messages.reverse();
        Ok(messages)
    }

    /// Atomic turn commit: the user message, the assistant message, and the
    /// conversation's `updated_at` bump land in one transaction or not at
    /// all.
    pub async fn commit_turn(
        &self,
        conversation: &ConversationRef,
        user_content: &str,
        assistant_content: &str,
        assistant_metadata: &Value,
    ) -> ApiResult<(Message, Message)> {
        let now = Utc::now();
        let fk = Self::fk_column(conversation);
        let (conversation_id, channel_conversation_id) = match conversation {
            ConversationRef::Personal(id) => (Some(id.clone()), None),
            ConversationRef::Channel(id) => (None, Some(id.clone())),
        };

        let user_id = Uuid::new_v4().to_string();
        let assistant_id = Uuid::new_v4().to_string();
        let metadata_json = assistant_metadata.to_string();

        let insert_sql = format!(
            "INSERT INTO messages (id, {}, role, content, metadata, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            fk
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(&insert_sql)
            .bind(&user_id)
            .bind(conversation.id())
            .bind(MessageRole::User.as_str())
            .bind(user_content)
            .bind(Option::<String>::None)
            .bind(now.timestamp())
            .execute(&mut *tx)
            .await?;

        sqlx::query(&insert_sql)
            .bind(&assistant_id)
            .bind(conversation.id())
            .bind(MessageRole::Assistant.as_str())
            .bind(assistant_content)
            .bind(Some(&metadata_json))
            .bind(now.timestamp())
            .execute(&mut *tx)
            .await?;

        let bump_sql = match conversation {
            ConversationRef::Personal(_) => "UPDATE conversations SET updated_at = ? WHERE id = ?",
            ConversationRef::Channel(_) => {
                "UPDATE channel_conversations SET updated_at = ? WHERE id = ?"
            }
        };
        sqlx::query(bump_sql)
            .bind(now.timestamp())
            .bind(conversation.id())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(
            conversation_id = conversation.id(),
            "committed turn pair"
        );

        let user_message = Message {
            id: user_id,
            conversation_id: conversation_id.clone(),
            channel_conversation_id: channel_conversation_id.clone(),
            role: MessageRole::User,
            content: user_content.to_string(),
            metadata: None,
            created_at: now,
        };
        let assistant_message = Message {
            id: assistant_id,
            conversation_id,
            channel_conversation_id,
            role: MessageRole::Assistant,
            content: assistant_content.to_string(),
            metadata: Some(assistant_metadata.clone()),
            created_at: now,
        };

        Ok((user_message, assistant_message))
    }
}

pub struct ChannelConversationStore {
    pool: SqlitePool,
}

fn channel_conversation_from_row(row: &SqliteRow) -> ChannelConversation {
    ChannelConversation {
        id: row.get("id"),
        user_id: row.get("user_id"),
        channel_id: row.get("channel_id"),
        created_at: datetime_from_ts(row.get("created_at")),
        updated_at: datetime_from_ts(row.get("updated_at")),
    }
}

impl ChannelConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Select-or-insert under the `(user_id, channel_id)` uniqueness
    /// constraint: any number of calls yields the same row.
    pub async fn get_or_create(
        &self,
        user_id: &str,
        channel_id: &str,
    ) -> ApiResult<ChannelConversation> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO channel_conversations (id, user_id, channel_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (user_id, channel_id) DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(channel_id)
        .bind(now.timestamp())
        .bind(now.timestamp())
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(
            "SELECT * FROM channel_conversations WHERE user_id = ? AND channel_id = ?",
        )
        .bind(user_id)
        .bind(channel_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(channel_conversation_from_row(&row))
    }

    pub async fn get(&self, id: &str) -> ApiResult<Option<ChannelConversation>> {
        let row = sqlx::query("SELECT * FROM channel_conversations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| channel_conversation_from_row(&r)))
    }

    pub async fn list(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> ApiResult<Page<ChannelConversationSummary>> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM channel_conversations WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        let rows = sqlx::query(
            r#"
            SELECT cc.*, ch.name AS channel_name, ch.display_title AS channel_display_title
            FROM channel_conversations cc
            JOIN channels ch ON ch.id = cc.channel_id
            WHERE cc.user_id = ?
            ORDER BY cc.updated_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .iter()
            .map(|row| ChannelConversationSummary {
                conversation: channel_conversation_from_row(row),
                channel_name: row.get("channel_name"),
                channel_display_title: row.get("channel_display_title"),
            })
            .collect();

        Ok(Page {
            items,
            total,
            limit,
            offset,
        })
    }

    pub async fn delete(&self, id: &str) -> ApiResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM messages WHERE channel_conversation_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM channel_conversations WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Fail if the content is outside the accepted length band. Shared by the
/// gateway and the conversation service.
pub fn validate_content_length(content: &str) -> ApiResult<()> {
    let length = content.chars().count();
    if length == 0 {
        return Err(ApiError::InvalidInput("content must not be empty".into()));
    }
    if length > 2000 {
        return Err(ApiError::InvalidInput(format!(
            "content exceeds 2000 characters ({})",
            length
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_length_band() {
        assert!(validate_content_length("").is_err());
        assert!(validate_content_length(&"a".repeat(1)).is_ok());
        assert!(validate_content_length(&"a".repeat(2000)).is_ok());
        assert!(validate_content_length(&"a".repeat(2001)).is_err());
    }
}
