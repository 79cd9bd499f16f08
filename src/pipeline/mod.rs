// src/pipeline/mod.rs
// The intent-routed RAG pipeline: classify -> maybe retrieve -> maybe grade
// -> generate, with staged progress and cancellation between nodes.

pub mod classify;
pub mod executor;
pub mod generate;
pub mod grade;
pub mod prompts;
pub mod retrieve;
pub mod video_load;

use serde::{Deserialize, Serialize};

pub use classify::{Intent, IntentDecision};
pub use executor::Pipeline;
pub use generate::GeneratedReply;
pub use retrieve::RetrievedChunk;
pub use video_load::{DisabledIngestor, IngestedVideo, VideoIngestor, VideoLoadEvent, VideoLoadPhase};

use crate::llm::ChatMessage;

/// The staged-progress steps a client can observe during a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Routing,
    Retrieving,
    Grading,
    Generating,
    Ingesting,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Routing => "routing",
            Step::Retrieving => "retrieving",
            Step::Grading => "grading",
            Step::Generating => "generating",
            Step::Ingesting => "ingesting",
        }
    }
}

/// Non-blocking progress outlet injected by the gateway. Emissions are
/// best-effort; a closed channel turns them into no-ops and the pipeline
/// carries on until its next cancellation checkpoint.
pub trait ProgressSink: Send + Sync {
    fn status(&self, step: Step, message: &str);
    fn video(&self, event: VideoLoadEvent);
}

/// Sink that drops everything; used by tests that only care about results.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn status(&self, _step: Step, _message: &str) {}
    fn video(&self, _event: VideoLoadEvent) {}
}

/// Metadata attached to every assistant reply and persisted with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyMetadata {
    pub intent: Intent,
    pub chunks_used: usize,
    pub source_chunks: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub no_context: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// State threaded through the pipeline. Nodes extend it; they never mutate
/// what an earlier node wrote.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub request_id: String,
    pub user_id: String,
    pub conversation_id: String,
    pub channel_id: Option<String>,
    /// Collection searched for channel scope; `None` means the per-user
    /// global collection.
    pub channel_collection: Option<String>,
    pub user_query: String,
    pub conversation_history: Vec<ChatMessage>,
    pub intent: Option<IntentDecision>,
    pub retrieved_chunks: Option<Vec<RetrievedChunk>>,
    pub graded_chunks: Option<Vec<RetrievedChunk>>,
    pub response: Option<GeneratedReply>,
}

impl PipelineState {
    pub fn new(
        request_id: impl Into<String>,
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
        user_query: impl Into<String>,
        conversation_history: Vec<ChatMessage>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            channel_id: None,
            channel_collection: None,
            user_query: user_query.into(),
            conversation_history,
            intent: None,
            retrieved_chunks: None,
            graded_chunks: None,
            response: None,
        }
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>, collection: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self.channel_collection = Some(collection.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_serialize_snake_case() {
        assert_eq!(serde_json::to_string(&Step::Retrieving).unwrap(), "\"retrieving\"");
        assert_eq!(Step::Ingesting.as_str(), "ingesting");
    }

    #[test]
    fn reply_metadata_omits_no_context_when_false() {
        let metadata = ReplyMetadata {
            intent: Intent::Chitchat,
            chunks_used: 0,
            source_chunks: vec![],
            no_context: false,
        };
        let json = serde_json::to_value(&metadata).unwrap();
        assert!(json.get("no_context").is_none());
        assert_eq!(json["intent"], "chitchat");
    }
}
