// src/llm/chat.rs
// OpenAI chat-completions client with structured output via forced tool calls

use std::time::{Duration, Instant};

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{ChatModel, ChatOutput, ChatRequest, StructuredSchema, TokenUsage};
use crate::error::{ApiError, ApiResult};
use crate::utils::with_timeout;

/// OpenAI chat provider
#[derive(Clone)]
pub struct OpenAIChat {
    client: Client,
    api_key: String,
    model: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<ApiMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Deserialize)]
struct FunctionCall {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: i64,
    completion_tokens: i64,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

impl OpenAIChat {
    const BASE_URL: &'static str = "https://api.openai.com/v1";

    pub fn new(api_key: String, model: String, timeout: Duration) -> ApiResult<Self> {
        if api_key.is_empty() {
            return Err(ApiError::Internal(anyhow!("OpenAI API key is required")));
        }

        let client = Client::builder().timeout(timeout).build().map_err(ApiError::from)?;

        Ok(Self {
            client,
            api_key,
            model,
            timeout,
        })
    }

    fn build_messages(req: &ChatRequest) -> Vec<ApiMessage> {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);
        if let Some(ref system) = req.system {
            messages.push(ApiMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.extend(req.messages.iter().map(|m| ApiMessage {
            role: m.role.clone(),
            content: m.content.clone(),
        }));
        messages
    }

    async fn send_request(&self, request: &CompletionRequest, request_id: &str) -> ApiResult<CompletionResponse> {
        debug!(
            request_id,
            model = %self.model,
            messages = request.messages.len(),
            "sending chat completion request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", Self::BASE_URL))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ErrorResponse>(&error_text) {
                Ok(parsed) => format!(
                    "OpenAI API error ({}): {}",
                    parsed.error.error_type, parsed.error.message
                ),
                Err(_) => format!("OpenAI API returned {}: {}", status, error_text),
            };

            // 429 and 5xx are worth re-attempting; other 4xx are not.
            return if status.as_u16() == 429 || status.is_server_error() {
                Err(ApiError::external(message))
            } else {
                Err(ApiError::external_fatal(message))
            };
        }

        let body: CompletionResponse = response.json().await?;
        Ok(body)
    }

    fn usage_of(response: &CompletionResponse) -> TokenUsage {
        response
            .usage
            .as_ref()
            .map(|u| TokenUsage {
                input: u.prompt_tokens,
                output: u.completion_tokens,
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    async fn chat(&self, req: ChatRequest) -> ApiResult<ChatOutput> {
        let start = Instant::now();
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: Self::build_messages(&req),
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            tools: None,
            tool_choice: None,
            user: Some(req.metadata.user_id.clone()),
        };

        let response = with_timeout(
            self.timeout,
            self.send_request(&request, &req.metadata.request_id),
            "llm chat",
        )
        .await?;

        let usage = Self::usage_of(&response);
        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        debug!(
            request_id = %req.metadata.request_id,
            tags = ?req.metadata.tags,
            input_tokens = usage.input,
            output_tokens = usage.output,
            latency_ms = start.elapsed().as_millis() as i64,
            "chat completion finished"
        );

        Ok(ChatOutput { text, usage })
    }

    async fn structured(&self, req: ChatRequest, schema: StructuredSchema) -> ApiResult<Value> {
        let tool = json!({
            "type": "function",
            "function": {
                "name": schema.name,
                "description": schema.description,
                "parameters": schema.parameters,
            }
        });

        let request = CompletionRequest {
            model: self.model.clone(),
            messages: Self::build_messages(&req),
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            tools: Some(vec![tool]),
            tool_choice: Some(json!({
                "type": "function",
                "function": { "name": schema.name }
            })),
            user: Some(req.metadata.user_id.clone()),
        };

        let response = with_timeout(
            self.timeout,
            self.send_request(&request, &req.metadata.request_id),
            "llm structured",
        )
        .await?;

        let call = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.tool_calls)
            .and_then(|calls| calls.into_iter().find(|tc| tc.function.name == schema.name))
            .ok_or_else(|| {
                warn!(
                    request_id = %req.metadata.request_id,
                    tool = %schema.name,
                    "model did not call the forced tool"
                );
                ApiError::external_fatal(format!("no {} tool call in response", schema.name))
            })?;

        let value: Value = serde_json::from_str(&call.function.arguments).map_err(|e| {
            ApiError::external_fatal(format!("unparseable tool arguments: {}", e))
        })?;

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CallMetadata, ChatMessage};

    #[test]
    fn requires_api_key() {
        let provider = OpenAIChat::new(String::new(), "gpt-4o-mini".into(), Duration::from_secs(60));
        assert!(provider.is_err());
    }

    #[test]
    fn system_prompt_is_prepended() {
        let req = ChatRequest {
            messages: vec![ChatMessage::user("hi")],
            system: Some("be brief".into()),
            temperature: 0.7,
            max_tokens: 100,
            metadata: CallMetadata::new("req-1", "user-1"),
        };
        let messages = OpenAIChat::build_messages(&req);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
    }
}
