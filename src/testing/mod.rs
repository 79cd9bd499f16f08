// src/testing/mod.rs

//! Scripted collaborator doubles for the integration suites. The chat model
//! replays queued responses per tool, the embedder is a deterministic
//! bag-of-words hasher, and the vector index is an in-memory cosine store.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::error::{ApiError, ApiResult};
use crate::llm::{
    CallMetadata, ChatModel, ChatOutput, ChatRequest, EmbeddingModel, StructuredSchema, TokenUsage,
};
use crate::pipeline::{IngestedVideo, VideoIngestor};
use crate::vector::{ScopeFilter, VectorHit, VectorIndex, VectorPoint};

/// A scripted outcome for one mock call.
#[derive(Debug, Clone)]
pub enum Scripted {
    Ok(Value),
    TransientError(String),
    FatalError(String),
}

impl Scripted {
    fn into_result(self) -> ApiResult<Value> {
        match self {
            Scripted::Ok(value) => Ok(value),
            Scripted::TransientError(message) => Err(ApiError::external(message)),
            Scripted::FatalError(message) => Err(ApiError::external_fatal(message)),
        }
    }
}

/// Chat model double. Structured calls pop a per-tool queue; chat calls pop
/// a shared queue. Empty queues fall back to benign defaults so tests only
/// script what they assert on.
#[derive(Default)]
pub struct MockChatModel {
    chat_queue: Mutex<VecDeque<Scripted>>,
    structured_queues: Mutex<HashMap<String, VecDeque<Scripted>>>,
    pub chat_requests: Mutex<Vec<ChatRequest>>,
    pub structured_requests: Mutex<Vec<(String, ChatRequest)>>,
}

impl MockChatModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_chat(&self, text: &str) {
        self.chat_queue
            .lock()
            .push_back(Scripted::Ok(Value::String(text.to_string())));
    }

    pub fn push_chat_outcome(&self, outcome: Scripted) {
        self.chat_queue.lock().push_back(outcome);
    }

    pub fn push_structured(&self, tool: &str, value: Value) {
        self.structured_queues
            .lock()
            .entry(tool.to_string())
            .or_default()
            .push_back(Scripted::Ok(value));
    }

    pub fn push_structured_outcome(&self, tool: &str, outcome: Scripted) {
        self.structured_queues
            .lock()
            .entry(tool.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Shorthand for scripting the classifier.
    pub fn push_intent(&self, intent: &str, confidence: f32) {
        self.push_structured(
            "classify_intent",
            json!({ "intent": intent, "confidence": confidence, "reasoning": "scripted" }),
        );
    }

    fn default_for(tool: &str) -> Option<Value> {
        match tool {
            "classify_intent" => Some(json!({
                "intent": "chitchat",
                "confidence": 0.9,
                "reasoning": "default"
            })),
            "grade_chunk" => Some(json!({ "is_relevant": true, "reasoning": "default" })),
            _ => None,
        }
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn chat(&self, req: ChatRequest) -> ApiResult<ChatOutput> {
        self.chat_requests.lock().push(req);
        let scripted = self
            .chat_queue
            .lock()
            .pop_front()
            .unwrap_or(Scripted::Ok(Value::String("Okay.".to_string())));
        let value = scripted.into_result()?;
        Ok(ChatOutput {
            text: value.as_str().unwrap_or_default().to_string(),
            usage: TokenUsage { input: 10, output: 10 },
        })
    }

    async fn structured(&self, req: ChatRequest, schema: StructuredSchema) -> ApiResult<Value> {
        self.structured_requests
            .lock()
            .push((schema.name.clone(), req));
        let scripted = self
            .structured_queues
            .lock()
            .get_mut(&schema.name)
            .and_then(|queue| queue.pop_front());
        match scripted {
            Some(outcome) => outcome.into_result(),
            None => Self::default_for(&schema.name).ok_or_else(|| {
                ApiError::external_fatal(format!("no scripted response for tool {}", schema.name))
            }),
        }
    }
}

/// Deterministic bag-of-words embedder: same text, same vector; texts
/// sharing tokens land near each other under cosine.
pub struct MockEmbeddingModel {
    dims: usize,
    pub calls: Mutex<Vec<usize>>,
}

impl MockEmbeddingModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            dims: 16,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for token in text.to_lowercase().split_whitespace() {
            let mut bucket: usize = 0;
            for byte in token.bytes() {
                bucket = bucket.wrapping_mul(31).wrapping_add(byte as usize);
            }
            vector[bucket % self.dims] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingModel for MockEmbeddingModel {
    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        _meta: &CallMetadata,
    ) -> ApiResult<Vec<Vec<f32>>> {
        self.calls.lock().push(texts.len());
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// In-memory vector index with real cosine ranking and scope filters.
#[derive(Default)]
pub struct MockVectorIndex {
    collections: Mutex<HashMap<String, Vec<VectorPoint>>>,
}

impl MockVectorIndex {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn point_count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .get(collection)
            .map(|points| points.len())
            .unwrap_or(0)
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
    }
}

#[async_trait]
impl VectorIndex for MockVectorIndex {
    async fn ensure_collection(&self, name: &str, _dimensions: u64) -> ApiResult<()> {
        self.collections
            .lock()
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> ApiResult<()> {
        let mut collections = self.collections.lock();
        let existing = collections.entry(collection.to_string()).or_default();
        for point in points {
            existing.retain(|p| p.id != point.id);
            existing.push(point);
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        filter: ScopeFilter,
        limit: u64,
    ) -> ApiResult<Vec<VectorHit>> {
        let collections = self.collections.lock();
        let Some(points) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<VectorHit> = points
            .iter()
            .filter(|p| match &filter {
                ScopeFilter::User(user_id) => &p.payload.user_id == user_id,
                ScopeFilter::Channel(channel_id) => {
                    p.payload.channel_id.as_deref() == Some(channel_id.as_str())
                }
            })
            .map(|p| VectorHit {
                id: p.id.clone(),
                score: Self::cosine(&vector, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit as usize);
        Ok(hits)
    }

    async fn delete(&self, collection: &str, ids: Vec<String>) -> ApiResult<()> {
        if let Some(points) = self.collections.lock().get_mut(collection) {
            points.retain(|p| !ids.contains(&p.id));
        }
        Ok(())
    }
}

/// Ingestor double: succeeds with a fixed title unless told to fail.
pub struct MockIngestor {
    pub fail_with: Mutex<Option<String>>,
    pub transient_failures: Mutex<u32>,
    pub calls: Mutex<Vec<String>>,
}

impl MockIngestor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail_with: Mutex::new(None),
            transient_failures: Mutex::new(0),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_next(&self, message: &str) {
        *self.fail_with.lock() = Some(message.to_string());
    }

    /// Fail the next `times` calls with a retryable error, then succeed.
    pub fn fail_transiently(&self, times: u32) {
        *self.transient_failures.lock() = times;
    }
}

#[async_trait]
impl VideoIngestor for MockIngestor {
    async fn ingest(
        &self,
        youtube_url: &str,
        _user_id: &str,
        _meta: &CallMetadata,
    ) -> ApiResult<IngestedVideo> {
        self.calls.lock().push(youtube_url.to_string());
        {
            let mut transient = self.transient_failures.lock();
            if *transient > 0 {
                *transient -= 1;
                return Err(ApiError::external("ingestion backend briefly unavailable"));
            }
        }
        if let Some(message) = self.fail_with.lock().take() {
            return Err(ApiError::external_fatal(message));
        }
        let video_id = youtube_url
            .rsplit(['=', '/'])
            .next()
            .unwrap_or("unknown")
            .to_string();
        Ok(IngestedVideo {
            video_id,
            title: "Mock Video".to_string(),
        })
    }
}
