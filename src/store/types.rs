// src/store/types.rs
// Row types for the transcript, channel, and conversation tables

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub id: String,
    pub user_id: String,
    pub youtube_video_id: String,
    pub title: String,
    pub channel_name: Option<String>,
    pub duration_s: Option<i64>,
    pub transcript_text: String,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTranscript {
    pub user_id: String,
    pub youtube_video_id: String,
    pub title: String,
    pub channel_name: Option<String>,
    pub duration_s: Option<i64>,
    pub transcript_text: String,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub transcript_id: String,
    pub user_id: String,
    /// Set iff the chunk entered through a channel-video admin action.
    pub channel_id: Option<String>,
    pub chunk_index: i64,
    pub chunk_text: String,
    pub token_count: i64,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewChunk {
    pub transcript_id: String,
    pub user_id: String,
    pub channel_id: Option<String>,
    pub chunk_index: i64,
    pub chunk_text: String,
    pub token_count: i64,
    pub metadata: Option<Value>,
}

/// Chunk joined with its parent transcript's title and video id, as the
/// retriever hydrates it.
#[derive(Debug, Clone)]
pub struct ChunkWithTitle {
    pub chunk: Chunk,
    pub title: String,
    pub youtube_video_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    /// URL-safe, immutable, globally unique.
    pub name: String,
    pub display_title: String,
    pub description: Option<String>,
    /// Derived from `name` at creation; never changes afterwards.
    pub qdrant_collection_name: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelVideo {
    pub id: String,
    pub channel_id: String,
    pub transcript_id: String,
    pub added_by: String,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConversation {
    pub id: String,
    pub user_id: String,
    pub channel_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Channel conversation joined with the channel's display fields for
/// listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConversationSummary {
    #[serde(flatten)]
    pub conversation: ChannelConversation,
    pub channel_name: String,
    pub channel_display_title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            "system" => Some(MessageRole::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: Option<String>,
    pub channel_conversation_id: Option<String>,
    pub role: MessageRole,
    pub content: String,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Which conversation table a message belongs to. Exactly one of the two
/// foreign keys is set on every row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationRef {
    Personal(String),
    Channel(String),
}

impl ConversationRef {
    pub fn id(&self) -> &str {
        match self {
            ConversationRef::Personal(id) | ConversationRef::Channel(id) => id,
        }
    }
}

/// Offset-paginated result envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Default conversation title when the client supplies none.
pub fn default_conversation_title(now: DateTime<Utc>) -> String {
    format!("Chat {}", now.format("%Y-%m-%d %H:%M"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trip() {
        for role in [MessageRole::User, MessageRole::Assistant, MessageRole::System] {
            assert_eq!(MessageRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(MessageRole::parse("tool"), None);
    }

    #[test]
    fn default_title_shape() {
        let now = DateTime::parse_from_rfc3339("2026-03-04T15:06:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(default_conversation_title(now), "Chat 2026-03-04 15:06");
    }
}
