// src/store/mod.rs

//! Row-oriented persistence over SQLite

pub mod channels;
pub mod conversations;
pub mod migrations;
pub mod transcripts;
pub mod types;

use chrono::{DateTime, Utc};

pub use channels::ChannelStore;
pub use conversations::{ChannelConversationStore, ConversationStore, validate_content_length};
pub use migrations::run_migrations;
pub use transcripts::{ChunkStore, TranscriptStore};
pub use types::*;

/// Unix-second column to DateTime, tolerating clock garbage.
pub(crate) fn datetime_from_ts(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}
