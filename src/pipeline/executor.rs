// src/pipeline/executor.rs
// Drives the node graph: conditional edges, per-node retry on transient
// errors, cancellation checkpoints between nodes.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::classify::{self, Intent};
use super::generate::{self, GenerateInput};
use super::grade;
use super::retrieve::{self, RetrieveRequest};
use super::video_load::{self, VideoIngestor};
use super::{PipelineState, ProgressSink, Step};
use crate::error::{ApiError, ApiResult};
use crate::llm::{CallMetadata, ChatModel, EmbeddingModel, RetryPolicy, retry};
use crate::store::{ChunkStore, Transcript, TranscriptStore};
use crate::vector::VectorIndex;

pub struct Pipeline {
    chat: Arc<dyn ChatModel>,
    embedder: Arc<dyn EmbeddingModel>,
    vectors: Arc<dyn VectorIndex>,
    chunks: Arc<ChunkStore>,
    transcripts: Arc<TranscriptStore>,
    ingestor: Arc<dyn VideoIngestor>,
    top_k: usize,
    grader_concurrency: usize,
    retry_policy: RetryPolicy,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chat: Arc<dyn ChatModel>,
        embedder: Arc<dyn EmbeddingModel>,
        vectors: Arc<dyn VectorIndex>,
        chunks: Arc<ChunkStore>,
        transcripts: Arc<TranscriptStore>,
        ingestor: Arc<dyn VideoIngestor>,
        top_k: usize,
        grader_concurrency: usize,
    ) -> Self {
        Self {
            chat,
            embedder,
            vectors,
            chunks,
            transcripts,
            ingestor,
            top_k,
            grader_concurrency,
            retry_policy: RetryPolicy::external(),
        }
    }

    /// Swap the backoff schedule; test suites use the zero-delay policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    fn checkpoint(cancel: &CancellationToken) -> ApiResult<()> {
        if cancel.is_cancelled() {
            return Err(ApiError::Canceled);
        }
        Ok(())
    }

    /// Execute one turn's node graph. Progress emission is best-effort; the
    /// cancellation token is consulted only between nodes, so in-flight
    /// external calls run to completion and their results are discarded.
    pub async fn run(
        &self,
        mut state: PipelineState,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> ApiResult<PipelineState> {
        let meta = CallMetadata::new(state.request_id.clone(), state.user_id.clone());

        Self::checkpoint(cancel)?;
        sink.status(Step::Routing, "Working out what you need");
        let decision = retry(&self.retry_policy, "classify", || {
            classify::classify(
                self.chat.as_ref(),
                &state.user_query,
                &state.conversation_history,
                &meta,
            )
        })
        .await?;
        info!(
            request_id = %state.request_id,
            intent = decision.intent.as_str(),
            confidence = decision.confidence,
            "intent routed"
        );
        let intent = decision.intent;
        state.intent = Some(decision);

        if intent == Intent::VideoLoad {
            Self::checkpoint(cancel)?;
            let reply = video_load::run(
                self.ingestor.as_ref(),
                sink,
                &state.user_query,
                &state.user_id,
                &meta,
                &self.retry_policy,
            )
            .await?;
            state.response = Some(reply);
            return Ok(state);
        }

        if intent.needs_retrieval() {
            Self::checkpoint(cancel)?;
            sink.status(Step::Retrieving, "Searching your transcripts");
            let retrieved = retry(&self.retry_policy, "retrieve", || {
                retrieve::retrieve(
                    self.embedder.as_ref(),
                    self.vectors.as_ref(),
                    self.chunks.as_ref(),
                    RetrieveRequest {
                        user_query: &state.user_query,
                        user_id: &state.user_id,
                        channel: state
                            .channel_id
                            .as_deref()
                            .zip(state.channel_collection.as_deref()),
                        top_k: self.top_k,
                        meta: &meta,
                    },
                )
            })
            .await?;
            state.retrieved_chunks = Some(retrieved.clone());

            Self::checkpoint(cancel)?;
            sink.status(Step::Grading, "Checking which excerpts matter");
            // Per-chunk failures are swallowed inside the grader, so the
            // node itself never needs a retry.
            let graded = grade::grade(
                self.chat.as_ref(),
                &state.user_query,
                retrieved,
                self.grader_concurrency,
                &meta,
            )
            .await;
            debug!(
                request_id = %state.request_id,
                graded = graded.len(),
                "chunks survived grading"
            );
            state.graded_chunks = Some(graded);
        }

        Self::checkpoint(cancel)?;
        sink.status(Step::Generating, "Writing your answer");

        let videos: Vec<Transcript> = if intent == Intent::Metadata {
            match state.channel_id.as_deref() {
                Some(channel_id) => self.transcripts.list_for_channel(channel_id).await?,
                None => self.transcripts.list_for_user(&state.user_id).await?,
            }
        } else {
            Vec::new()
        };

        let graded = state.graded_chunks.clone().unwrap_or_default();
        let reply = retry(&self.retry_policy, "generate", || {
            generate::generate(
                self.chat.as_ref(),
                GenerateInput {
                    intent,
                    user_query: &state.user_query,
                    history: &state.conversation_history,
                    graded: &graded,
                    videos: &videos,
                    meta: &meta,
                },
            )
        })
        .await?;

        state.response = Some(reply);
        Ok(state)
    }
}
