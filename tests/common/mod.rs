// tests/common/mod.rs
// Shared wiring for the integration suites: in-memory SQLite, scripted
// collaborators, zero-backoff retries.

use std::sync::Arc;

use parking_lot::Mutex;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use tubetalk::config::AppConfig;
use tubetalk::llm::RetryPolicy;
use tubetalk::pipeline::{Pipeline, ProgressSink, Step, VideoLoadEvent};
use tubetalk::state::AppState;
use tubetalk::store::run_migrations;
use tubetalk::testing::{MockChatModel, MockEmbeddingModel, MockIngestor, MockVectorIndex};

pub struct TestCtx {
    pub app: Arc<AppState>,
    pub chat: Arc<MockChatModel>,
    pub embedder: Arc<MockEmbeddingModel>,
    pub vectors: Arc<MockVectorIndex>,
    pub ingestor: Arc<MockIngestor>,
}

pub async fn setup() -> TestCtx {
    setup_with_top_k(None).await
}

pub async fn setup_with_top_k(top_k: Option<usize>) -> TestCtx {
    // One pinned connection: a pooled :memory: database is per-connection.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect(":memory:")
        .await
        .expect("in-memory sqlite pool");
    run_migrations(&pool).await.expect("migrations");

    let config = AppConfig::from_env();
    let chat = MockChatModel::new();
    let embedder = MockEmbeddingModel::new();
    let vectors = MockVectorIndex::new();
    let ingestor = MockIngestor::new();

    let app = AppState::build(
        config,
        pool,
        chat.clone(),
        embedder.clone(),
        vectors.clone(),
        ingestor.clone(),
    );

    // Swap in a zero-backoff pipeline so retry paths do not sleep.
    let pipeline = Pipeline::new(
        chat.clone(),
        embedder.clone(),
        vectors.clone(),
        app.chunks.clone(),
        app.transcripts.clone(),
        ingestor.clone(),
        top_k.unwrap_or(app.config.retrieval.top_k),
        app.config.retrieval.grader_concurrency,
    )
    .with_retry_policy(RetryPolicy::immediate(3));
    let app = app.with_pipeline(pipeline);

    TestCtx {
        app,
        chat,
        embedder,
        vectors,
        ingestor,
    }
}

/// Progress sink that records everything it sees.
#[derive(Default)]
pub struct RecordingSink {
    pub statuses: Mutex<Vec<(Step, String)>>,
    pub video_events: Mutex<Vec<VideoLoadEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> Vec<Step> {
        self.statuses.lock().iter().map(|(step, _)| *step).collect()
    }
}

impl ProgressSink for RecordingSink {
    fn status(&self, step: Step, message: &str) {
        self.statuses.lock().push((step, message.to_string()));
    }

    fn video(&self, event: VideoLoadEvent) {
        self.video_events.lock().push(event);
    }
}

/// Count rows in a table; the persistence-discipline assertions live on
/// this.
pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    sqlx::query_scalar(&sql).fetch_one(pool).await.unwrap()
}
