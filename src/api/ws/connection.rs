// src/api/ws/connection.rs
// A wrapper around the WebSocket connection to manage state and message sending.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use bytes::Bytes;
use futures_util::SinkExt;
use futures_util::stream::SplitSink;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::frames::ServerFrame;
use crate::error::{ApiError, ApiResult};

/// Manages the state and sending logic for a single WebSocket connection.
pub struct WebSocketConnection {
    sender: Arc<Mutex<SplitSink<WebSocket, Message>>>,
    is_closed: Arc<Mutex<bool>>,
    last_pong: Arc<Mutex<Instant>>,
}

impl WebSocketConnection {
    pub fn new(sender: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sender: Arc::new(Mutex::new(sender)),
            is_closed: Arc::new(Mutex::new(false)),
            last_pong: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Mark this connection as closed to prevent further sends.
    pub async fn mark_closed(&self) {
        *self.is_closed.lock().await = true;
        debug!("Connection marked as closed");
    }

    pub async fn is_closed(&self) -> bool {
        *self.is_closed.lock().await
    }

    /// Sends a typed frame to the client with immediate flushing.
    pub async fn send_frame(&self, frame: &ServerFrame) -> ApiResult<()> {
        if self.is_closed().await {
            debug!("Skipping send on closed connection");
            return Ok(());
        }

        let json_str = serde_json::to_string(frame)?;

        let mut sender = self.sender.lock().await;

        if let Err(e) = sender.send(Message::Text(Utf8Bytes::from(json_str))).await {
            warn!("Failed to send frame (connection likely closed): {}", e);
            drop(sender);
            self.mark_closed().await;
            return Err(ApiError::Internal(anyhow::anyhow!("ws send failed: {}", e)));
        }

        if let Err(e) = sender.flush().await {
            warn!("Failed to flush frame (connection likely closed): {}", e);
            drop(sender);
            self.mark_closed().await;
            return Err(ApiError::Internal(anyhow::anyhow!("ws flush failed: {}", e)));
        }

        Ok(())
    }

    /// Protocol-level ping for the heartbeat loop.
    pub async fn send_ping(&self) -> ApiResult<()> {
        if self.is_closed().await {
            return Ok(());
        }

        let mut sender = self.sender.lock().await;
        if let Err(e) = sender.send(Message::Ping(Bytes::new())).await {
            warn!("Heartbeat ping failed (connection likely closed): {}", e);
            drop(sender);
            self.mark_closed().await;
            return Err(ApiError::Internal(anyhow::anyhow!("ping failed: {}", e)));
        }
        sender.flush().await.ok();

        Ok(())
    }

    /// Answer a client's ping.
    pub async fn send_pong(&self, data: Bytes) -> ApiResult<()> {
        if self.is_closed().await {
            return Ok(());
        }

        let mut sender = self.sender.lock().await;
        if let Err(e) = sender.send(Message::Pong(data)).await {
            warn!("Failed to send pong: {}", e);
            drop(sender);
            self.mark_closed().await;
            return Err(ApiError::Internal(anyhow::anyhow!("pong failed: {}", e)));
        }
        sender.flush().await.ok();

        Ok(())
    }

    /// Record a pong from the client; the heartbeat loop reads this.
    pub async fn record_pong(&self) {
        *self.last_pong.lock().await = Instant::now();
    }

    pub async fn last_pong(&self) -> Instant {
        *self.last_pong.lock().await
    }
}
