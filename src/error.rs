// src/error.rs
// Client-visible error taxonomy shared by the gateway and the pipeline.

use thiserror::Error;

/// Errors that can cross the socket boundary. Each variant maps to a stable
/// client-visible code; the full cause stays in the server-side logs.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication failed: {0}")]
    Unauthenticated(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("a turn is already in flight for this session")]
    ConversationBusy,

    /// Upstream service failure (embedding, vector store, LLM, database
    /// connectivity). `transient` selects whether the retry wrapper may
    /// re-attempt the call.
    #[error("external service error: {message}")]
    External { message: String, transient: bool },

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),

    /// The owning channel went away mid-turn. Never serialized to a frame;
    /// the gateway discards the turn silently.
    #[error("turn canceled")]
    Canceled,
}

impl ApiError {
    /// Stable code carried in outbound `error` frames.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated(_) => "UNAUTHENTICATED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::RateLimited => "RATE_LIMIT",
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::ConversationBusy => "CONVERSATION_BUSY",
            ApiError::External { .. } => "EXTERNAL_API_ERROR",
            ApiError::Internal(_) => "INTERNAL",
            ApiError::Canceled => "INTERNAL",
        }
    }

    /// Message safe to show a client. External and internal failures get a
    /// generic line; validation errors are actionable as-is.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::External { .. } => {
                "An upstream service is unavailable. Please try again.".to_string()
            }
            ApiError::Internal(_) => "Something went wrong processing your message.".to_string(),
            other => other.to_string(),
        }
    }

    /// Whether the retry wrapper is allowed to re-attempt the failed call.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::External { transient: true, .. })
    }

    pub fn external(message: impl Into<String>) -> Self {
        ApiError::External {
            message: message.into(),
            transient: true,
        }
    }

    pub fn external_fatal(message: impl Into<String>) -> Self {
        ApiError::External {
            message: message.into(),
            transient: false,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => ApiError::NotFound("row not found".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                ApiError::external(format!("database unavailable: {}", e))
            }
            other => ApiError::Internal(anyhow::anyhow!("database error: {}", other)),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        let transient = e.is_timeout()
            || e.is_connect()
            || e.status().map(|s| s.is_server_error()).unwrap_or(false);
        ApiError::External {
            message: e.to_string(),
            transient,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Internal(anyhow::anyhow!("serialization error: {}", e))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ApiError::RateLimited.code(), "RATE_LIMIT");
        assert_eq!(ApiError::ConversationBusy.code(), "CONVERSATION_BUSY");
        assert_eq!(ApiError::external("boom").code(), "EXTERNAL_API_ERROR");
        assert_eq!(
            ApiError::InvalidInput("too long".into()).code(),
            "INVALID_INPUT"
        );
    }

    #[test]
    fn transient_split() {
        assert!(ApiError::external("503").is_transient());
        assert!(!ApiError::external_fatal("401").is_transient());
        assert!(!ApiError::InvalidInput("x".into()).is_transient());
    }

    #[test]
    fn external_user_message_is_generic() {
        let e = ApiError::external("connection reset by qdrant at 10.0.0.3");
        assert!(!e.user_message().contains("qdrant"));
    }
}
