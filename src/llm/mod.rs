// src/llm/mod.rs
// Language-model collaborator contracts and shared request types

pub mod chat;
pub mod embeddings;
pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiResult;

pub use chat::OpenAIChat;
pub use embeddings::OpenAIEmbeddings;
pub use retry::{RetryPolicy, retry};

/// Simple message format shared across providers and the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// Tags carried on every external call for correlation and telemetry.
#[derive(Debug, Clone, Default)]
pub struct CallMetadata {
    pub request_id: String,
    pub user_id: String,
    pub tags: Vec<String>,
}

impl CallMetadata {
    pub fn new(request_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            user_id: user_id.into(),
            tags: Vec::new(),
        }
    }

    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub system: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub metadata: CallMetadata,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: i64,
    pub output: i64,
}

#[derive(Debug, Clone)]
pub struct ChatOutput {
    pub text: String,
    pub usage: TokenUsage,
}

/// Schema handed to `ChatModel::structured`; rendered as a forced
/// single-function tool call on OpenAI-compatible backends.
#[derive(Debug, Clone)]
pub struct StructuredSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Free-form completion.
    async fn chat(&self, req: ChatRequest) -> ApiResult<ChatOutput>;

    /// Schema-constrained completion. Returns the raw value; callers parse
    /// and fail closed on anything out of contract.
    async fn structured(&self, req: ChatRequest, schema: StructuredSchema) -> ApiResult<Value>;
}

#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Output dimension of this model. Collections are sized from this;
    /// nothing else hard-codes it.
    fn dimensions(&self) -> usize;

    /// Embed up to an arbitrary number of texts; implementations batch
    /// upstream calls at 100 texts apiece.
    async fn embed_batch(&self, texts: &[String], meta: &CallMetadata)
    -> ApiResult<Vec<Vec<f32>>>;
}
