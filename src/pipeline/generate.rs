// src/pipeline/generate.rs
// Intent-dispatched answer synthesis over graded context

use tracing::debug;

use super::classify::Intent;
use super::prompts;
use super::retrieve::RetrievedChunk;
use super::ReplyMetadata;
use crate::error::{ApiError, ApiResult};
use crate::llm::{CallMetadata, ChatMessage, ChatModel, ChatRequest};
use crate::store::Transcript;

/// The generator's product: the reply text plus the metadata persisted with
/// the assistant message and echoed in the terminal frame.
#[derive(Debug, Clone)]
pub struct GeneratedReply {
    pub response: String,
    pub metadata: ReplyMetadata,
}

pub struct GenerateInput<'a> {
    pub intent: Intent,
    pub user_query: &'a str,
    pub history: &'a [ChatMessage],
    pub graded: &'a [RetrievedChunk],
    /// Video list context; populated only for the `metadata` intent.
    pub videos: &'a [Transcript],
    pub meta: &'a CallMetadata,
}

/// Sampling parameters per intent: (temperature, max output tokens).
fn sampling_for(intent: Intent) -> (f32, u32) {
    match intent {
        Intent::Chitchat => (0.8, 500),
        Intent::Qa => (0.7, 2000),
        Intent::Linkedin => (0.7, 2000),
        Intent::Metadata => (0.3, 1500),
        Intent::MetadataSearch => (0.3, 1500),
        Intent::MetadataSearchAndSummarize => (0.3, 2000),
        // The side-effect path never reaches the generator.
        Intent::VideoLoad => (0.0, 1),
    }
}

pub async fn generate(chat: &dyn ChatModel, input: GenerateInput<'_>) -> ApiResult<GeneratedReply> {
    let (system, prompt) = match input.intent {
        Intent::Chitchat => (
            prompts::CHITCHAT_SYSTEM,
            prompts::build_chitchat_prompt(input.user_query, input.history),
        ),
        Intent::Qa => (
            prompts::QA_RAG_SYSTEM,
            prompts::build_qa_prompt(input.user_query, input.history, input.graded),
        ),
        Intent::Linkedin => (
            prompts::LINKEDIN_SYSTEM,
            prompts::build_qa_prompt(input.user_query, input.history, input.graded),
        ),
        Intent::Metadata => (
            prompts::METADATA_LIST_SYSTEM,
            prompts::build_video_list_prompt(input.user_query, input.videos),
        ),
        Intent::MetadataSearch => (
            prompts::METADATA_SEARCH_SYSTEM,
            prompts::build_metadata_search_prompt(input.user_query, input.graded, false),
        ),
        Intent::MetadataSearchAndSummarize => (
            prompts::METADATA_SEARCH_SYSTEM,
            prompts::build_metadata_search_prompt(input.user_query, input.graded, true),
        ),
        Intent::VideoLoad => {
            return Err(ApiError::Internal(anyhow::anyhow!(
                "video_load reached the generator"
            )));
        }
    };

    let (temperature, max_tokens) = sampling_for(input.intent);

    let request = ChatRequest {
        messages: vec![ChatMessage::user(prompt)],
        system: Some(system.to_string()),
        temperature,
        max_tokens,
        metadata: input.meta.clone().tagged("generate"),
    };

    let output = chat.chat(request).await?;

    let no_context = input.intent.needs_retrieval() && input.graded.is_empty();
    let metadata = ReplyMetadata {
        intent: input.intent,
        chunks_used: input.graded.len(),
        source_chunks: input.graded.iter().map(|c| c.chunk_id.clone()).collect(),
        no_context,
    };

    debug!(
        request_id = %input.meta.request_id,
        intent = input.intent.as_str(),
        chunks_used = metadata.chunks_used,
        "generation complete"
    );

    Ok(GeneratedReply {
        response: output.text,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_table_matches_contract() {
        assert_eq!(sampling_for(Intent::Chitchat), (0.8, 500));
        assert_eq!(sampling_for(Intent::Qa), (0.7, 2000));
        assert_eq!(sampling_for(Intent::Linkedin), (0.7, 2000));
        assert_eq!(sampling_for(Intent::Metadata), (0.3, 1500));
        assert_eq!(sampling_for(Intent::MetadataSearch), (0.3, 1500));
        assert_eq!(sampling_for(Intent::MetadataSearchAndSummarize), (0.3, 2000));
    }
}
