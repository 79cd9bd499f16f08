// src/config/server.rs
// Server, database, and infrastructure configuration

use serde::{Deserialize, Serialize};

use super::helpers::{env_bool, env_or, env_u16, env_u32, env_u64, env_usize};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: env_or("TUBETALK_HOST", "0.0.0.0"),
            port: env_u16("TUBETALK_PORT", 8080),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// Pool acquire + sqlite busy timeout, seconds.
    pub timeout_s: u64,
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        Self {
            url: env_or("DATABASE_URL", "sqlite://tubetalk.db"),
            max_connections: env_u32("TUBETALK_SQLITE_MAX_CONNECTIONS", 20),
            timeout_s: env_u64("TUBETALK_DATABASE_TIMEOUT_S", 5),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self {
            level: env_or("TUBETALK_LOG_LEVEL", "info"),
        }
    }
}

/// Per-user gateway throttle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub per_minute: usize,
    pub window_s: u64,
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        Self {
            per_minute: env_usize("TUBETALK_RATE_PER_MINUTE", 10),
            window_s: env_u64("TUBETALK_RATE_WINDOW_S", 60),
        }
    }
}

/// Heartbeat cadence for open sockets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    pub interval_s: u64,
}

impl HeartbeatConfig {
    pub fn from_env() -> Self {
        Self {
            interval_s: env_u64("TUBETALK_HEARTBEAT_INTERVAL_S", 30),
        }
    }
}

/// Wall-clock budgets for external calls and whole turns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub llm_s: u64,
    pub embedding_s: u64,
    pub vector_s: u64,
    pub turn_s: u64,
}

impl TimeoutConfig {
    pub fn from_env() -> Self {
        Self {
            llm_s: env_u64("TUBETALK_LLM_TIMEOUT_S", 60),
            embedding_s: env_u64("TUBETALK_EMBEDDING_TIMEOUT_S", 30),
            vector_s: env_u64("TUBETALK_VECTOR_TIMEOUT_S", 10),
            turn_s: env_u64("TUBETALK_TURN_TIMEOUT_S", 120),
        }
    }
}

/// Corpus retention policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Delete a transcript when the last channel referencing it is removed.
    pub delete_orphan_transcripts: bool,
}

impl RetentionConfig {
    pub fn from_env() -> Self {
        Self {
            delete_orphan_transcripts: env_bool("TUBETALK_DELETE_ORPHAN_TRANSCRIPTS", false),
        }
    }
}
