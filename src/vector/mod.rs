// src/vector/mod.rs
// Vector index contract: named collections of chunk points with payload filters

pub mod qdrant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;

pub use qdrant::QdrantIndex;

/// The per-user global collection. Channel corpora get their own
/// `channel_<name>` collections.
pub const GLOBAL_COLLECTION: &str = "youtube_chunks";

/// Collection name for a channel corpus. Derived once at channel creation
/// and stable for the channel's lifetime, including across soft-delete
/// cycles.
pub fn channel_collection_name(channel_name: &str) -> String {
    format!("channel_{}", channel_name)
}

/// Payload stored alongside every vector. Treated as a cache of the chunk
/// row; the row store stays authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub chunk_id: String,
    pub user_id: String,
    pub youtube_video_id: String,
    pub chunk_index: i64,
    pub chunk_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VectorPoint {
    /// Mirrors the chunk row id.
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub payload: ChunkPayload,
}

/// Tenant-isolation filter applied to every search.
#[derive(Debug, Clone)]
pub enum ScopeFilter {
    User(String),
    Channel(String),
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection (and its payload indexes) if absent.
    async fn ensure_collection(&self, name: &str, dimensions: u64) -> ApiResult<()>;

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> ApiResult<()>;

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        filter: ScopeFilter,
        limit: u64,
    ) -> ApiResult<Vec<VectorHit>>;

    async fn delete(&self, collection: &str, ids: Vec<String>) -> ApiResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_collection_names_are_prefixed() {
        assert_eq!(channel_collection_name("rustconf"), "channel_rustconf");
    }
}
