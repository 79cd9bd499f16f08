// src/llm/embeddings.rs
// OpenAI embeddings client with batched requests

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CallMetadata, EmbeddingModel};
use crate::error::{ApiError, ApiResult};
use crate::utils::with_timeout;

/// Upstream batch cap; requests with more texts are split.
const MAX_BATCH_SIZE: usize = 100;

pub struct OpenAIEmbeddings {
    client: Client,
    api_key: String,
    model: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAIEmbeddings {
    const BASE_URL: &'static str = "https://api.openai.com/v1";

    pub fn new(api_key: String, model: String, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            timeout,
        }
    }

    fn model_dimensions(model: &str) -> usize {
        match model {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        }
    }

    async fn embed_one_batch(&self, texts: &[String], meta: &CallMetadata) -> ApiResult<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            input: texts,
            model: &self.model,
            user: Some(&meta.user_id),
        };

        let response = self
            .client
            .post(format!("{}/embeddings", Self::BASE_URL))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = format!("OpenAI embeddings error {}: {}", status, error_text);
            return if status.as_u16() == 429 || status.is_server_error() {
                Err(ApiError::external(message))
            } else {
                Err(ApiError::external_fatal(message))
            };
        }

        let result: EmbeddingResponse = response.json().await?;

        // Restore request order by index.
        let mut indexed: Vec<(usize, Vec<f32>)> = result
            .data
            .into_iter()
            .map(|d| (d.index, d.embedding))
            .collect();
        indexed.sort_by_key(|(idx, _)| *idx);

        Ok(indexed.into_iter().map(|(_, e)| e).collect())
    }
}

#[async_trait]
impl EmbeddingModel for OpenAIEmbeddings {
    fn dimensions(&self) -> usize {
        Self::model_dimensions(&self.model)
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        meta: &CallMetadata,
    ) -> ApiResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            request_id = %meta.request_id,
            count = texts.len(),
            model = %self.model,
            "generating embeddings"
        );

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH_SIZE) {
            let embeddings = with_timeout(
                self.timeout,
                self.embed_one_batch(batch, meta),
                "embedding batch",
            )
            .await?;
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_follow_model() {
        assert_eq!(OpenAIEmbeddings::model_dimensions("text-embedding-3-large"), 3072);
        assert_eq!(OpenAIEmbeddings::model_dimensions("text-embedding-3-small"), 1536);
    }

    #[tokio::test]
    async fn empty_input_short_circuits() {
        let client = OpenAIEmbeddings::new(
            "test-key".into(),
            "text-embedding-3-small".into(),
            Duration::from_secs(30),
        );
        let out = client
            .embed_batch(&[], &CallMetadata::new("req", "user"))
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
