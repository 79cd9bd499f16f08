// src/services/conversation.rs
// Ownership-authoritative conversation operations; the gateway assumes
// success once this layer returns.

use std::sync::Arc;

use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::store::{
    Channel, ChannelConversation, ChannelConversationStore, ChannelConversationSummary,
    ChannelStore, Conversation, ConversationRef, ConversationStore, Message, Page,
};

pub struct ConversationService {
    conversations: Arc<ConversationStore>,
    channel_conversations: Arc<ChannelConversationStore>,
    channels: Arc<ChannelStore>,
}

impl ConversationService {
    pub fn new(
        conversations: Arc<ConversationStore>,
        channel_conversations: Arc<ChannelConversationStore>,
        channels: Arc<ChannelStore>,
    ) -> Self {
        Self {
            conversations,
            channel_conversations,
            channels,
        }
    }

    pub async fn list_personal(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> ApiResult<Page<Conversation>> {
        self.conversations.list(user_id, limit, offset).await
    }

    pub async fn list_channel(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> ApiResult<Page<ChannelConversationSummary>> {
        self.channel_conversations.list(user_id, limit, offset).await
    }

    /// Resolve the conversation a turn belongs to. `None` (or the literal
    /// "new") creates a fresh conversation; an explicit id must exist and be
    /// owned by the caller.
    pub async fn resolve_personal(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
    ) -> ApiResult<Conversation> {
        match conversation_id {
            None | Some("new") => {
                let conversation = self.conversations.create(user_id, None).await?;
                debug!(conversation_id = %conversation.id, "auto-provisioned conversation");
                Ok(conversation)
            }
            Some(id) => {
                let conversation = self
                    .conversations
                    .get(id)
                    .await?
                    .ok_or_else(|| ApiError::NotFound(format!("conversation {}", id)))?;
                if conversation.user_id != user_id {
                    return Err(ApiError::Forbidden(
                        "conversation belongs to another user".into(),
                    ));
                }
                Ok(conversation)
            }
        }
    }

    /// Exactly one conversation per (user, channel): returns the existing
    /// row or creates it. The channel must be live.
    pub async fn get_or_create_channel_conversation(
        &self,
        user_id: &str,
        channel_id: &str,
    ) -> ApiResult<(Channel, ChannelConversation)> {
        let channel = self
            .channels
            .get_active(channel_id)
            .await?
            .ok_or_else(|| ApiError::Forbidden(format!("channel {} is unavailable", channel_id)))?;

        let conversation = self
            .channel_conversations
            .get_or_create(user_id, channel_id)
            .await?;

        Ok((channel, conversation))
    }

    pub async fn get_personal_detail(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> ApiResult<(Conversation, Vec<Message>)> {
        let conversation = self
            .conversations
            .get(conversation_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("conversation {}", conversation_id)))?;
        if conversation.user_id != user_id {
            return Err(ApiError::Forbidden(
                "conversation belongs to another user".into(),
            ));
        }
        let messages = self
            .conversations
            .all_messages(&ConversationRef::Personal(conversation_id.to_string()))
            .await?;
        Ok((conversation, messages))
    }

    pub async fn get_channel_detail(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> ApiResult<(ChannelConversation, Vec<Message>)> {
        let conversation = self
            .channel_conversations
            .get(conversation_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("conversation {}", conversation_id)))?;
        if conversation.user_id != user_id {
            return Err(ApiError::Forbidden(
                "conversation belongs to another user".into(),
            ));
        }
        let messages = self
            .conversations
            .all_messages(&ConversationRef::Channel(conversation_id.to_string()))
            .await?;
        Ok((conversation, messages))
    }

    pub async fn update_title(
        &self,
        user_id: &str,
        conversation_id: &str,
        title: &str,
    ) -> ApiResult<()> {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(ApiError::InvalidInput("title must not be empty".into()));
        }
        if trimmed.chars().count() > 200 {
            return Err(ApiError::InvalidInput(
                "title exceeds 200 characters".into(),
            ));
        }

        // Ownership first; the update itself is unconditional.
        let conversation = self
            .conversations
            .get(conversation_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("conversation {}", conversation_id)))?;
        if conversation.user_id != user_id {
            return Err(ApiError::Forbidden(
                "conversation belongs to another user".into(),
            ));
        }

        self.conversations.update_title(conversation_id, trimmed).await
    }

    pub async fn delete_personal(&self, user_id: &str, conversation_id: &str) -> ApiResult<()> {
        let conversation = self
            .conversations
            .get(conversation_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("conversation {}", conversation_id)))?;
        if conversation.user_id != user_id {
            return Err(ApiError::Forbidden(
                "conversation belongs to another user".into(),
            ));
        }
        self.conversations.delete(conversation_id).await
    }

    pub async fn delete_channel(&self, user_id: &str, conversation_id: &str) -> ApiResult<()> {
        let conversation = self
            .channel_conversations
            .get(conversation_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("conversation {}", conversation_id)))?;
        if conversation.user_id != user_id {
            return Err(ApiError::Forbidden(
                "conversation belongs to another user".into(),
            ));
        }
        self.channel_conversations.delete(conversation_id).await
    }
}
