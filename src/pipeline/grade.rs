// src/pipeline/grade.rs
// Per-chunk relevance judgment with bounded, order-preserving fan-out

use futures::StreamExt;
use futures::stream;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::retrieve::RetrievedChunk;
use crate::llm::{CallMetadata, ChatMessage, ChatModel, ChatRequest, StructuredSchema};

const GRADER_SYSTEM: &str = "\
You judge whether a transcript excerpt is relevant to a user's question. \
Relevant means the excerpt contains information that helps answer it, not \
merely shared keywords.";

#[derive(Deserialize)]
struct Verdict {
    is_relevant: bool,
    #[serde(default)]
    #[allow(dead_code)]
    reasoning: String,
}

fn grading_schema() -> StructuredSchema {
    StructuredSchema {
        name: "grade_chunk".to_string(),
        description: "Record whether the excerpt is relevant to the question".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "is_relevant": { "type": "boolean" },
                "reasoning": { "type": "string" }
            },
            "required": ["is_relevant", "reasoning"]
        }),
    }
}

async fn grade_one(
    chat: &dyn ChatModel,
    user_query: &str,
    chunk: RetrievedChunk,
    meta: &CallMetadata,
) -> Option<RetrievedChunk> {
    let prompt = format!(
        "Question:\n{}\n\nExcerpt from \"{}\":\n{}",
        user_query, chunk.title, chunk.chunk_text
    );

    let request = ChatRequest {
        messages: vec![ChatMessage::user(prompt)],
        system: Some(GRADER_SYSTEM.to_string()),
        temperature: 0.0,
        max_tokens: 200,
        metadata: meta.clone().tagged("grade"),
    };

    // Grading is advisory: any failure drops the chunk, never the turn.
    match chat.structured(request, grading_schema()).await {
        Ok(value) => match serde_json::from_value::<Verdict>(value) {
            Ok(verdict) if verdict.is_relevant => Some(chunk),
            Ok(_) => None,
            Err(e) => {
                warn!(
                    request_id = %meta.request_id,
                    chunk_id = %chunk.chunk_id,
                    error = %e,
                    "grader verdict unparseable; dropping chunk"
                );
                None
            }
        },
        Err(e) => {
            warn!(
                request_id = %meta.request_id,
                chunk_id = %chunk.chunk_id,
                error = %e,
                "grader call failed; dropping chunk"
            );
            None
        }
    }
}

/// Grade retrieved chunks with at most `concurrency` calls in flight.
/// Retrieval-score order is preserved in the output.
pub async fn grade(
    chat: &dyn ChatModel,
    user_query: &str,
    chunks: Vec<RetrievedChunk>,
    concurrency: usize,
    meta: &CallMetadata,
) -> Vec<RetrievedChunk> {
    if chunks.is_empty() {
        return Vec::new();
    }

    let total = chunks.len();
    let kept: Vec<RetrievedChunk> = stream::iter(
        chunks
            .into_iter()
            .map(|chunk| grade_one(chat, user_query, chunk, meta)),
    )
    .buffered(concurrency.max(1))
    .filter_map(|kept| async move { kept })
    .collect()
    .await;

    debug!(
        request_id = %meta.request_id,
        kept = kept.len(),
        total,
        "grading complete"
    );

    kept
}
