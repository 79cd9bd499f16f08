// src/config/llm.rs
// OpenAI chat and embedding model configuration

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::helpers::{env_or, env_usize};

/// OpenAI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub chat_model: String,
    pub embedding_model: String,
}

impl OpenAIConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: env_or("OPENAI_API_KEY", ""),
            chat_model: env_or("TUBETALK_CHAT_MODEL", "gpt-4o-mini"),
            embedding_model: env_or("TUBETALK_EMBEDDING_MODEL", "text-embedding-3-small"),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            anyhow::bail!("OPENAI_API_KEY is required");
        }
        Ok(())
    }
}

/// Qdrant configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    pub url: String,
}

impl QdrantConfig {
    pub fn from_env() -> Self {
        Self {
            url: env_or("QDRANT_URL", "http://localhost:6334"),
        }
    }
}

/// Prompt-context sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Messages loaded into prompt history.
    pub max_messages: usize,
}

impl ContextConfig {
    pub fn from_env() -> Self {
        Self {
            max_messages: env_usize("TUBETALK_CONTEXT_MESSAGES", 10),
        }
    }
}

/// Vector search depth and grading fan-out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub grader_concurrency: usize,
}

impl RetrievalConfig {
    pub fn from_env() -> Self {
        Self {
            top_k: env_usize("TUBETALK_RETRIEVAL_TOP_K", 12),
            grader_concurrency: env_usize("TUBETALK_GRADER_CONCURRENCY", 4),
        }
    }
}

/// Ingestion-side chunking knobs. Referenced by ingestion collaborators;
/// the online path never reads them but they live in the same snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub size_tokens: usize,
    pub overlap_pct: usize,
}

impl ChunkingConfig {
    pub fn from_env() -> Self {
        Self {
            size_tokens: env_usize("TUBETALK_CHUNK_SIZE_TOKENS", 700),
            overlap_pct: env_usize("TUBETALK_CHUNK_OVERLAP_PCT", 20),
        }
    }
}
