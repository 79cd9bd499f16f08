// src/services/corpus.rs
// Keeps chunk rows and vector points in step: every chunk row has a vector
// point with the same id, and vector deletes run before row deletes.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::llm::{CallMetadata, EmbeddingModel};
use crate::store::{Channel, ChannelStore, Chunk, ChunkStore, TranscriptStore};
use crate::vector::{ChunkPayload, GLOBAL_COLLECTION, VectorIndex, VectorPoint};

pub struct CorpusService {
    transcripts: Arc<TranscriptStore>,
    chunks: Arc<ChunkStore>,
    channels: Arc<ChannelStore>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingModel>,
    delete_orphan_transcripts: bool,
}

impl CorpusService {
    pub fn new(
        transcripts: Arc<TranscriptStore>,
        chunks: Arc<ChunkStore>,
        channels: Arc<ChannelStore>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingModel>,
        delete_orphan_transcripts: bool,
    ) -> Self {
        Self {
            transcripts,
            chunks,
            channels,
            vectors,
            embedder,
            delete_orphan_transcripts,
        }
    }

    /// Embed persisted chunk rows and upsert their vector points, ids
    /// matching row ids. Channel chunks land in the channel's collection,
    /// personal chunks in the global one.
    pub async fn index_chunks(
        &self,
        chunks: &[Chunk],
        youtube_video_id: &str,
        channel: Option<&Channel>,
        meta: &CallMetadata,
    ) -> ApiResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let collection = match channel {
            Some(c) => c.qdrant_collection_name.clone(),
            None => GLOBAL_COLLECTION.to_string(),
        };
        self.vectors
            .ensure_collection(&collection, self.embedder.dimensions() as u64)
            .await?;

        let texts: Vec<String> = chunks.iter().map(|c| c.chunk_text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts, &meta.clone().tagged("index"))
            .await?;
        if embeddings.len() != chunks.len() {
            return Err(ApiError::external_fatal(format!(
                "embedding count mismatch: {} texts, {} vectors",
                chunks.len(),
                embeddings.len()
            )));
        }

        let points: Vec<VectorPoint> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, vector)| VectorPoint {
                id: chunk.id.clone(),
                vector,
                payload: ChunkPayload {
                    chunk_id: chunk.id.clone(),
                    user_id: chunk.user_id.clone(),
                    youtube_video_id: youtube_video_id.to_string(),
                    chunk_index: chunk.chunk_index,
                    chunk_text: chunk.chunk_text.clone(),
                    channel_id: chunk.channel_id.clone(),
                },
            })
            .collect();

        self.vectors.upsert(&collection, points).await?;
        info!(collection = %collection, count = chunks.len(), "indexed chunks");
        Ok(())
    }

    /// Delete a user's transcript: vectors first, rows second. A vector
    /// delete failure is logged and skipped; orphan points are never served
    /// because the tenant filters miss them.
    pub async fn delete_transcript(&self, user_id: &str, transcript_id: &str) -> ApiResult<()> {
        let transcript = self
            .transcripts
            .get(transcript_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("transcript {}", transcript_id)))?;
        if transcript.user_id != user_id {
            return Err(ApiError::Forbidden(
                "transcript belongs to another user".into(),
            ));
        }

        let ids = self.chunks.ids_for_transcript(transcript_id).await?;
        if let Err(e) = self.vectors.delete(GLOBAL_COLLECTION, ids).await {
            warn!(
                transcript_id,
                error = %e,
                "vector cleanup failed; proceeding with row delete"
            );
        }

        self.transcripts.delete(transcript_id).await
    }

    /// Remove a video from a channel: the channel's vector points and chunk
    /// rows for that transcript go away; personal copies are untouched.
    /// Admin-only.
    pub async fn remove_channel_video(
        &self,
        is_admin: bool,
        channel: &Channel,
        transcript_id: &str,
    ) -> ApiResult<()> {
        if !is_admin {
            return Err(ApiError::Forbidden("admin role required".into()));
        }

        let ids = self
            .chunks
            .ids_for_channel_video(&channel.id, transcript_id)
            .await?;
        if let Err(e) = self
            .vectors
            .delete(&channel.qdrant_collection_name, ids)
            .await
        {
            warn!(
                channel_id = %channel.id,
                transcript_id,
                error = %e,
                "vector cleanup failed; proceeding with row delete"
            );
        }

        self.chunks
            .delete_channel_chunks(&channel.id, transcript_id)
            .await?;
        self.channels.remove_video(&channel.id, transcript_id).await?;

        if self.delete_orphan_transcripts {
            let remaining = self.channels.channels_referencing(transcript_id).await?;
            // A transcript still backing the owner's personal corpus is not
            // an orphan; deleting it would cascade over their chunks.
            let personal = self.chunks.count_personal_chunks(transcript_id).await?;
            if remaining == 0 && personal == 0 {
                info!(transcript_id, "removing orphaned transcript per retention policy");
                let leftover = self.chunks.ids_for_transcript(transcript_id).await?;
                if let Err(e) = self.vectors.delete(GLOBAL_COLLECTION, leftover).await {
                    warn!(transcript_id, error = %e, "orphan vector cleanup failed");
                }
                self.transcripts.delete(transcript_id).await?;
            }
        }

        Ok(())
    }
}
