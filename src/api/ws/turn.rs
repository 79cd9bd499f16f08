// src/api/ws/turn.rs
// One user utterance in, one terminal frame out: rate limit, validation,
// conversation resolution, history, pipeline, atomic persist.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::frames::{ClientFrame, ServerFrame};
use crate::error::{ApiError, ApiResult};
use crate::llm::ChatMessage;
use crate::pipeline::{PipelineState, ProgressSink, Step, VideoLoadEvent};
use crate::state::AppState;
use crate::store::{Channel, ConversationRef, MessageRole, validate_content_length};

/// What a session is bound to for its whole lifetime.
#[derive(Clone)]
pub enum SessionScope {
    Personal,
    Channel(Channel),
}

/// Progress outlet over the session's outbound frame queue. `try_send`
/// keeps emission non-blocking; a full or closed queue drops the frame.
pub struct ChannelSink {
    tx: mpsc::Sender<ServerFrame>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<ServerFrame>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelSink {
    fn status(&self, step: Step, message: &str) {
        let _ = self.tx.try_send(ServerFrame::Status {
            step,
            message: message.to_string(),
        });
    }

    fn video(&self, event: VideoLoadEvent) {
        let _ = self.tx.try_send(ServerFrame::from_video_event(event));
    }
}

/// Run one turn to its terminal frame. Cancellation mid-turn discards
/// everything: no frames, no rows.
pub async fn run_turn(
    app: &Arc<AppState>,
    user_id: &str,
    scope: &SessionScope,
    frame: ClientFrame,
    tx: &mpsc::Sender<ServerFrame>,
    cancel: &CancellationToken,
) {
    let request_id = Uuid::new_v4().to_string();
    debug!(request_id = %request_id, user_id, "turn started");

    match execute_turn(app, user_id, scope, &frame, tx, cancel, &request_id).await {
        Ok(terminal) => {
            let _ = tx.send(terminal).await;
            debug!(request_id = %request_id, "turn finished");
        }
        Err(ApiError::Canceled) => {
            debug!(request_id = %request_id, "turn canceled, nothing persisted");
        }
        Err(e) => {
            error!(request_id = %request_id, error = %e, code = e.code(), "turn failed");
            if !cancel.is_cancelled() {
                let _ = tx
                    .send(ServerFrame::error(
                        e.code(),
                        e.user_message(),
                        Some(request_id),
                    ))
                    .await;
            }
        }
    }
}

async fn execute_turn(
    app: &Arc<AppState>,
    user_id: &str,
    scope: &SessionScope,
    frame: &ClientFrame,
    tx: &mpsc::Sender<ServerFrame>,
    cancel: &CancellationToken,
    request_id: &str,
) -> ApiResult<ServerFrame> {
    // Denied submissions leave no trace: no conversation, no rows.
    if !app.rate_limiter.try_acquire(user_id) {
        info!(request_id, user_id, "rate limit exceeded");
        return Err(ApiError::RateLimited);
    }

    validate_content_length(&frame.content)?;

    let (conversation, channel): (ConversationRef, Option<Channel>) = match scope {
        SessionScope::Personal => {
            let conv = app
                .conversation_service
                .resolve_personal(user_id, frame.conversation_id.as_deref())
                .await?;
            (ConversationRef::Personal(conv.id), None)
        }
        SessionScope::Channel(channel) => {
            let (channel, conv) = app
                .conversation_service
                .get_or_create_channel_conversation(user_id, &channel.id)
                .await?;
            (ConversationRef::Channel(conv.id), Some(channel))
        }
    };

    let history: Vec<ChatMessage> = app
        .conversations
        .load_recent_messages(&conversation, app.config.context.max_messages)
        .await?
        .into_iter()
        .map(|m| ChatMessage {
            role: m.role.as_str().to_string(),
            content: m.content,
        })
        .collect();

    let mut state = PipelineState::new(
        request_id,
        user_id,
        conversation.id(),
        frame.content.as_str(),
        history,
    );
    if let Some(ref ch) = channel {
        state = state.with_channel(ch.id.as_str(), ch.qdrant_collection_name.as_str());
    }

    let sink = ChannelSink::new(tx.clone());
    let budget = Duration::from_secs(app.config.timeouts.turn_s);
    let state = match tokio::time::timeout(budget, app.pipeline.run(state, &sink, cancel)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(ApiError::Internal(anyhow!(
                "turn exceeded its {}s budget",
                app.config.timeouts.turn_s
            )));
        }
    };

    // A close that raced the pipeline's final node: drop the turn whole.
    if cancel.is_cancelled() {
        return Err(ApiError::Canceled);
    }

    let reply = state
        .response
        .ok_or_else(|| ApiError::Internal(anyhow!("pipeline finished without a reply")))?;

    let metadata_value = serde_json::to_value(&reply.metadata)?;
    let (_user_message, assistant_message) = app
        .conversations
        .commit_turn(&conversation, &frame.content, &reply.response, &metadata_value)
        .await?;

    info!(
        request_id,
        conversation_id = conversation.id(),
        intent = reply.metadata.intent.as_str(),
        chunks_used = reply.metadata.chunks_used,
        "turn persisted"
    );

    Ok(ServerFrame::Message {
        role: MessageRole::Assistant,
        content: assistant_message.content,
        metadata: reply.metadata,
    })
}
