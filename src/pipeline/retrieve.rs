// src/pipeline/retrieve.rs
// Embed the query, search the tenant's collection, hydrate rows

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};
use crate::llm::{CallMetadata, EmbeddingModel};
use crate::store::ChunkStore;
use crate::vector::{GLOBAL_COLLECTION, ScopeFilter, VectorIndex};

/// One retrieval result after hydration. `chunk_text` and `title` come from
/// the row store; the vector payload is only a cache.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub score: f32,
    pub chunk_text: String,
    pub youtube_video_id: String,
    pub chunk_index: i64,
    pub title: String,
}

pub struct RetrieveRequest<'a> {
    pub user_query: &'a str,
    pub user_id: &'a str,
    /// `(channel_id, collection)` for channel scope, `None` for personal.
    pub channel: Option<(&'a str, &'a str)>,
    pub top_k: usize,
    pub meta: &'a CallMetadata,
}

/// Run one retrieval. An empty result is a legitimate outcome the
/// downstream generator must handle.
pub async fn retrieve(
    embedder: &dyn EmbeddingModel,
    index: &dyn VectorIndex,
    chunk_store: &ChunkStore,
    req: RetrieveRequest<'_>,
) -> ApiResult<Vec<RetrievedChunk>> {
    if req.top_k == 0 {
        debug!(request_id = %req.meta.request_id, "retrieval disabled (top_k = 0)");
        return Ok(Vec::new());
    }

    let embeddings = embedder
        .embed_batch(
            &[req.user_query.to_string()],
            &req.meta.clone().tagged("retrieve"),
        )
        .await?;
    let query_vector = embeddings
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::external_fatal("embedding provider returned nothing"))?;

    let (collection, filter) = match req.channel {
        Some((channel_id, collection)) => {
            (collection.to_string(), ScopeFilter::Channel(channel_id.to_string()))
        }
        None => (
            GLOBAL_COLLECTION.to_string(),
            ScopeFilter::User(req.user_id.to_string()),
        ),
    };

    let hits = index
        .search(&collection, query_vector, filter, req.top_k as u64)
        .await?;

    if hits.is_empty() {
        return Ok(Vec::new());
    }

    // Hydrate against the row store; a hit whose row has vanished is
    // silently dropped.
    let ids: Vec<String> = hits.iter().map(|h| h.id.clone()).collect();
    let rows = chunk_store.get_by_ids(&ids).await?;
    let mut by_id: HashMap<String, _> = rows
        .into_iter()
        .map(|row| (row.chunk.id.clone(), row))
        .collect();

    let mut chunks = Vec::with_capacity(hits.len());
    for hit in hits {
        match by_id.remove(&hit.id) {
            Some(row) => chunks.push(RetrievedChunk {
                chunk_id: row.chunk.id,
                score: hit.score,
                chunk_text: row.chunk.chunk_text,
                youtube_video_id: row.youtube_video_id,
                chunk_index: row.chunk.chunk_index,
                title: row.title,
            }),
            None => {
                warn!(
                    request_id = %req.meta.request_id,
                    chunk_id = %hit.id,
                    "vector hit has no chunk row; dropping"
                );
            }
        }
    }

    // Hits arrive ranked, but re-assert descending score after hydration.
    chunks.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    debug!(
        request_id = %req.meta.request_id,
        collection = %collection,
        hits = chunks.len(),
        "retrieval complete"
    );

    Ok(chunks)
}
