// src/pipeline/classify.rs
// Intent classification: one structured LLM call, parsed fail-closed

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::prompts;
use super::video_load::extract_youtube_url;
use crate::error::ApiResult;
use crate::llm::{CallMetadata, ChatMessage, ChatModel, ChatRequest, StructuredSchema};

/// Number of extra attempts when the model returns an out-of-set or
/// malformed intent. Transport failures are handled by the node-level retry
/// wrapper, not here.
const MALFORMED_RETRIES: usize = 2;

/// The discrete label selecting which downstream path runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Chitchat,
    Qa,
    Linkedin,
    Metadata,
    MetadataSearch,
    MetadataSearchAndSummarize,
    VideoLoad,
}

impl Intent {
    pub const ALL: [Intent; 7] = [
        Intent::Chitchat,
        Intent::Qa,
        Intent::Linkedin,
        Intent::Metadata,
        Intent::MetadataSearch,
        Intent::MetadataSearchAndSummarize,
        Intent::VideoLoad,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Chitchat => "chitchat",
            Intent::Qa => "qa",
            Intent::Linkedin => "linkedin",
            Intent::Metadata => "metadata",
            Intent::MetadataSearch => "metadata_search",
            Intent::MetadataSearchAndSummarize => "metadata_search_and_summarize",
            Intent::VideoLoad => "video_load",
        }
    }

    /// Fail-closed parse: anything outside the enumeration is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        Intent::ALL.iter().copied().find(|i| i.as_str() == s)
    }

    /// Whether this intent routes through retrieval before generation.
    pub fn needs_retrieval(&self) -> bool {
        matches!(
            self,
            Intent::Qa
                | Intent::Linkedin
                | Intent::MetadataSearch
                | Intent::MetadataSearchAndSummarize
        )
    }
}

#[derive(Debug, Clone)]
pub struct IntentDecision {
    pub intent: Intent,
    pub confidence: f32,
    pub reasoning: String,
}

#[derive(Deserialize)]
struct RawDecision {
    intent: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    reasoning: String,
}

fn classification_schema() -> StructuredSchema {
    StructuredSchema {
        name: "classify_intent".to_string(),
        description: "Record the intent classification for the user's message".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "intent": {
                    "type": "string",
                    "enum": Intent::ALL.iter().map(|i| i.as_str()).collect::<Vec<_>>(),
                },
                "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
                "reasoning": { "type": "string" }
            },
            "required": ["intent", "confidence", "reasoning"]
        }),
    }
}

/// Classify one user utterance. YouTube URLs short-circuit to `video_load`
/// without spending a model call; everything else goes through the
/// structured classifier. Persistent malformed output degrades to chitchat
/// with zero confidence rather than failing the turn.
pub async fn classify(
    chat: &dyn ChatModel,
    user_query: &str,
    history: &[ChatMessage],
    meta: &CallMetadata,
) -> ApiResult<IntentDecision> {
    if let Some((url, _video_id)) = extract_youtube_url(user_query) {
        debug!(request_id = %meta.request_id, url = %url, "detected YouTube URL");
        return Ok(IntentDecision {
            intent: Intent::VideoLoad,
            confidence: 1.0,
            reasoning: "message contains a YouTube video URL".to_string(),
        });
    }

    let request = ChatRequest {
        messages: vec![ChatMessage::user(prompts::build_classifier_prompt(
            user_query, history,
        ))],
        system: Some(prompts::CLASSIFIER_SYSTEM.to_string()),
        temperature: 0.2,
        max_tokens: 300,
        metadata: meta.clone().tagged("classify"),
    };

    let schema = classification_schema();

    for attempt in 0..=MALFORMED_RETRIES {
        let value = chat.structured(request.clone(), schema.clone()).await?;

        match serde_json::from_value::<RawDecision>(value) {
            Ok(raw) => {
                if let Some(intent) = Intent::parse(&raw.intent) {
                    debug!(
                        request_id = %meta.request_id,
                        intent = intent.as_str(),
                        confidence = raw.confidence,
                        "classified"
                    );
                    return Ok(IntentDecision {
                        intent,
                        confidence: raw.confidence.clamp(0.0, 1.0),
                        reasoning: raw.reasoning,
                    });
                }
                warn!(
                    request_id = %meta.request_id,
                    attempt,
                    got = %raw.intent,
                    "classifier returned out-of-set intent"
                );
            }
            Err(e) => {
                warn!(
                    request_id = %meta.request_id,
                    attempt,
                    error = %e,
                    "classifier output did not match schema"
                );
            }
        }
    }

    warn!(
        request_id = %meta.request_id,
        "classifier kept misbehaving; defaulting to chitchat"
    );
    Ok(IntentDecision {
        intent: Intent::Chitchat,
        confidence: 0.0,
        reasoning: "classifier output invalid after retries".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_fail_closed() {
        assert_eq!(Intent::parse("qa"), Some(Intent::Qa));
        assert_eq!(
            Intent::parse("metadata_search_and_summarize"),
            Some(Intent::MetadataSearchAndSummarize)
        );
        assert_eq!(Intent::parse("QA"), None);
        assert_eq!(Intent::parse("summarize"), None);
        assert_eq!(Intent::parse(""), None);
    }

    #[test]
    fn retrieval_routing() {
        assert!(Intent::Qa.needs_retrieval());
        assert!(Intent::Linkedin.needs_retrieval());
        assert!(Intent::MetadataSearch.needs_retrieval());
        assert!(Intent::MetadataSearchAndSummarize.needs_retrieval());
        assert!(!Intent::Chitchat.needs_retrieval());
        assert!(!Intent::Metadata.needs_retrieval());
        assert!(!Intent::VideoLoad.needs_retrieval());
    }

    #[test]
    fn intent_serializes_snake_case() {
        let json = serde_json::to_string(&Intent::MetadataSearchAndSummarize).unwrap();
        assert_eq!(json, "\"metadata_search_and_summarize\"");
    }
}
