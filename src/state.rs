// src/state.rs
// Process-wide wiring: stores, services, pipeline, and the two shared
// singletons (rate-limiter table and connection registry).

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::api::ws::ConnectionRegistry;
use crate::config::AppConfig;
use crate::llm::{ChatModel, EmbeddingModel};
use crate::pipeline::{Pipeline, VideoIngestor};
use crate::services::{ConversationService, CorpusService};
use crate::store::{
    ChannelConversationStore, ChannelStore, ChunkStore, ConversationStore, TranscriptStore,
};
use crate::utils::RateLimiter;
use crate::vector::VectorIndex;

pub struct AppState {
    pub config: AppConfig,
    pub pool: SqlitePool,
    pub conversations: Arc<ConversationStore>,
    pub channel_conversations: Arc<ChannelConversationStore>,
    pub channels: Arc<ChannelStore>,
    pub transcripts: Arc<TranscriptStore>,
    pub chunks: Arc<ChunkStore>,
    pub conversation_service: Arc<ConversationService>,
    pub corpus: Arc<CorpusService>,
    pub pipeline: Arc<Pipeline>,
    pub rate_limiter: Arc<RateLimiter>,
    pub registry: Arc<ConnectionRegistry>,
}

impl AppState {
    /// Wire everything from a pool and the external collaborators. Used by
    /// `main` with live clients and by the test suites with mocks.
    pub fn build(
        config: AppConfig,
        pool: SqlitePool,
        chat: Arc<dyn ChatModel>,
        embedder: Arc<dyn EmbeddingModel>,
        vectors: Arc<dyn VectorIndex>,
        ingestor: Arc<dyn VideoIngestor>,
    ) -> Arc<Self> {
        let conversations = Arc::new(ConversationStore::new(pool.clone()));
        let channel_conversations = Arc::new(ChannelConversationStore::new(pool.clone()));
        let channels = Arc::new(ChannelStore::new(pool.clone()));
        let transcripts = Arc::new(TranscriptStore::new(pool.clone()));
        let chunks = Arc::new(ChunkStore::new(pool.clone()));

        let conversation_service = Arc::new(ConversationService::new(
            conversations.clone(),
            channel_conversations.clone(),
            channels.clone(),
        ));

        let corpus = Arc::new(CorpusService::new(
            transcripts.clone(),
            chunks.clone(),
            channels.clone(),
            vectors.clone(),
            embedder.clone(),
            config.retention.delete_orphan_transcripts,
        ));

        let pipeline = Arc::new(Pipeline::new(
            chat,
            embedder,
            vectors,
            chunks.clone(),
            transcripts.clone(),
            ingestor,
            config.retrieval.top_k,
            config.retrieval.grader_concurrency,
        ));

        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit.per_minute,
            Duration::from_secs(config.rate_limit.window_s),
        ));

        Arc::new(Self {
            config,
            pool,
            conversations,
            channel_conversations,
            channels,
            transcripts,
            chunks,
            conversation_service,
            corpus,
            pipeline,
            rate_limiter,
            registry: Arc::new(ConnectionRegistry::new()),
        })
    }

    /// Replace the pipeline, keeping everything else. Tests use this to
    /// swap in a zero-backoff retry policy.
    pub fn with_pipeline(self: &Arc<Self>, pipeline: Pipeline) -> Arc<Self> {
        Arc::new(Self {
            config: self.config.clone(),
            pool: self.pool.clone(),
            conversations: self.conversations.clone(),
            channel_conversations: self.channel_conversations.clone(),
            channels: self.channels.clone(),
            transcripts: self.transcripts.clone(),
            chunks: self.chunks.clone(),
            conversation_service: self.conversation_service.clone(),
            corpus: self.corpus.clone(),
            pipeline: Arc::new(pipeline),
            rate_limiter: self.rate_limiter.clone(),
            registry: self.registry.clone(),
        })
    }
}
