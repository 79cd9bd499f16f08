// src/main.rs
// tubetalk - retrieval-augmented chat over YouTube transcript libraries

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use tubetalk::api;
use tubetalk::config::AppConfig;
use tubetalk::llm::{EmbeddingModel, OpenAIChat, OpenAIEmbeddings};
use tubetalk::pipeline::DisabledIngestor;
use tubetalk::state::AppState;
use tubetalk::store::run_migrations;
use tubetalk::vector::{GLOBAL_COLLECTION, QdrantIndex, VectorIndex};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env();

    let level: Level = config.logging.level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;

    config.validate()?;

    let connect_options: SqliteConnectOptions = config
        .database
        .url
        .parse::<SqliteConnectOptions>()
        .context("invalid DATABASE_URL")?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(config.database.timeout_s));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(config.database.timeout_s))
        .connect_with(connect_options)
        .await
        .context("failed to open database")?;
    run_migrations(&pool).await?;

    let chat = Arc::new(OpenAIChat::new(
        config.openai.api_key.clone(),
        config.openai.chat_model.clone(),
        Duration::from_secs(config.timeouts.llm_s),
    )?);
    let embedder = Arc::new(OpenAIEmbeddings::new(
        config.openai.api_key.clone(),
        config.openai.embedding_model.clone(),
        Duration::from_secs(config.timeouts.embedding_s),
    ));
    let vectors = Arc::new(QdrantIndex::new(
        &config.qdrant.url,
        Duration::from_secs(config.timeouts.vector_s),
    )?);

    vectors
        .ensure_collection(GLOBAL_COLLECTION, embedder.dimensions() as u64)
        .await?;

    let bind_address = config.bind_address();
    let app_state = AppState::build(
        config,
        pool,
        chat,
        embedder,
        vectors,
        Arc::new(DisabledIngestor),
    );

    let router = api::router(app_state);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {}", bind_address))?;

    info!("tubetalk listening on {}", bind_address);
    axum::serve(listener, router).await?;

    Ok(())
}
