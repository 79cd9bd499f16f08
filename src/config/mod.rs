// src/config/mod.rs
// Central configuration for tubetalk - env-driven, snapshotted at startup

pub mod helpers;
pub mod llm;
pub mod server;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

lazy_static! {
    pub static ref CONFIG: AppConfig = AppConfig::from_env();
}

/// Main configuration structure - composes all domain configs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: server::ServerConfig,
    pub database: server::DatabaseConfig,
    pub logging: server::LoggingConfig,
    pub rate_limit: server::RateLimitConfig,
    pub heartbeat: server::HeartbeatConfig,
    pub timeouts: server::TimeoutConfig,
    pub retention: server::RetentionConfig,
    pub openai: llm::OpenAIConfig,
    pub qdrant: llm::QdrantConfig,
    pub context: llm::ContextConfig,
    pub retrieval: llm::RetrievalConfig,
    pub chunking: llm::ChunkingConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        // Don't panic if .env doesn't exist (for production)
        dotenvy::dotenv().ok();

        Self {
            server: server::ServerConfig::from_env(),
            database: server::DatabaseConfig::from_env(),
            logging: server::LoggingConfig::from_env(),
            rate_limit: server::RateLimitConfig::from_env(),
            heartbeat: server::HeartbeatConfig::from_env(),
            timeouts: server::TimeoutConfig::from_env(),
            retention: server::RetentionConfig::from_env(),
            openai: llm::OpenAIConfig::from_env(),
            qdrant: llm::QdrantConfig::from_env(),
            context: llm::ContextConfig::from_env(),
            retrieval: llm::RetrievalConfig::from_env(),
            chunking: llm::ChunkingConfig::from_env(),
        }
    }

    /// Validate config on startup
    pub fn validate(&self) -> anyhow::Result<()> {
        self.openai.validate()?;
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        self.server.bind_address()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::from_env();
        assert_eq!(config.context.max_messages, 10);
        assert_eq!(config.retrieval.top_k, 12);
        assert_eq!(config.retrieval.grader_concurrency, 4);
        assert_eq!(config.rate_limit.per_minute, 10);
        assert_eq!(config.heartbeat.interval_s, 30);
        assert_eq!(config.timeouts.turn_s, 120);
    }
}
