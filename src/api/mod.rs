// src/api/mod.rs

pub mod ws;

use std::sync::Arc;

use axum::{Router, routing::get};

use crate::state::AppState;

/// The service's API surface: one WebSocket route.
pub fn router(app: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws/chat", get(ws::ws_chat_handler))
        .with_state(app)
}
