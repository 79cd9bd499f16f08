// src/api/ws/frames.rs
// Wire frames for the chat channel, tagged by `type`

use serde::{Deserialize, Serialize};

use crate::pipeline::{ReplyMetadata, Step, VideoLoadEvent, VideoLoadPhase};
use crate::store::MessageRole;

/// One inbound user utterance. `conversation_id` of `"new"` (or absent)
/// auto-provisions a conversation in personal scope; channel scope always
/// resolves to the single (user, channel) conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientFrame {
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub content: String,
}

/// Everything the server pushes over the channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Staged progress; zero or more per turn, always before the terminal
    /// frame.
    Status { step: Step, message: String },

    /// The terminal frame of a successful turn.
    Message {
        role: MessageRole,
        content: String,
        metadata: ReplyMetadata,
    },

    VideoLoadConfirmation {
        youtube_url: String,
        video_id: String,
    },

    VideoLoadStatus {
        status: VideoLoadPhase,
        video_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        video_title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Terminal for the turn, not for the channel.
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
}

impl ServerFrame {
    pub fn error(code: &str, message: impl Into<String>, request_id: Option<String>) -> Self {
        ServerFrame::Error {
            code: code.to_string(),
            message: message.into(),
            request_id,
        }
    }

    pub fn from_video_event(event: VideoLoadEvent) -> Self {
        match event {
            VideoLoadEvent::Confirmation {
                youtube_url,
                video_id,
            } => ServerFrame::VideoLoadConfirmation {
                youtube_url,
                video_id,
            },
            VideoLoadEvent::Status {
                status,
                video_id,
                video_title,
                error,
            } => ServerFrame::VideoLoadStatus {
                status,
                video_id,
                video_title,
                error,
            },
        }
    }

    /// Whether this frame ends a turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerFrame::Message { .. } | ServerFrame::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Intent;

    #[test]
    fn client_frame_accepts_missing_conversation_id() {
        let frame: ClientFrame = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        assert_eq!(frame.conversation_id, None);
        assert_eq!(frame.content, "hi");
    }

    #[test]
    fn status_frame_shape() {
        let frame = ServerFrame::Status {
            step: Step::Retrieving,
            message: "Searching".into(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["step"], "retrieving");
    }

    #[test]
    fn message_frame_shape() {
        let frame = ServerFrame::Message {
            role: MessageRole::Assistant,
            content: "hello".into(),
            metadata: ReplyMetadata {
                intent: Intent::Chitchat,
                chunks_used: 0,
                source_chunks: vec![],
                no_context: false,
            },
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["metadata"]["intent"], "chitchat");
        assert!(frame.is_terminal());
    }

    #[test]
    fn video_status_omits_empty_fields() {
        let frame = ServerFrame::VideoLoadStatus {
            status: VideoLoadPhase::Started,
            video_id: "abc".into(),
            video_title: None,
            error: None,
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "video_load_status");
        assert_eq!(json["status"], "started");
        assert!(json.get("video_title").is_none());
        assert!(!frame.is_terminal());
    }
}
