// src/api/ws/mod.rs
// WebSocket upgrade, session lifecycle, and the one-turn-in-flight queue

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures::StreamExt;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub mod connection;
pub mod frames;
pub mod heartbeat;
pub mod registry;
pub mod turn;

pub use connection::WebSocketConnection;
pub use frames::{ClientFrame, ServerFrame};
pub use heartbeat::HeartbeatManager;
pub use registry::ConnectionRegistry;
pub use turn::{ChannelSink, SessionScope, run_turn};

use crate::auth::verify_token;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
    channel_id: Option<String>,
}

/// Turn discipline: one in-flight turn per channel, at most one frame
/// queued behind it, everything else refused as busy.
enum TurnState {
    Idle,
    Active { pending: Option<ClientFrame> },
}

struct Session {
    app: Arc<AppState>,
    user_id: String,
    scope: SessionScope,
    tx: mpsc::Sender<ServerFrame>,
    cancel: CancellationToken,
    turn_state: Mutex<TurnState>,
}

impl Session {
    /// Accept or refuse an inbound frame under the turn state machine.
    fn submit(self: Arc<Self>, frame: ClientFrame) {
        let mut state = self.turn_state.lock();
        match &mut *state {
            TurnState::Idle => {
                *state = TurnState::Active { pending: None };
                drop(state);
                self.clone().spawn_worker(frame);
            }
            TurnState::Active { pending } if pending.is_none() => {
                debug!(user_id = %self.user_id, "queued one frame behind the active turn");
                *pending = Some(frame);
            }
            TurnState::Active { .. } => {
                warn!(user_id = %self.user_id, "refusing frame, turn active and queue full");
                let _ = self.tx.try_send(ServerFrame::error(
                    "CONVERSATION_BUSY",
                    "A previous message is still being processed.",
                    None,
                ));
            }
        }
    }

    fn spawn_worker(self: Arc<Self>, first: ClientFrame) {
        tokio::spawn(async move {
            let mut frame = first;
            loop {
                let turn_cancel = self.cancel.child_token();
                run_turn(
                    &self.app,
                    &self.user_id,
                    &self.scope,
                    frame,
                    &self.tx,
                    &turn_cancel,
                )
                .await;

                if self.cancel.is_cancelled() {
                    break;
                }

                let next = {
                    let mut state = self.turn_state.lock();
                    match &mut *state {
                        TurnState::Active { pending } => match pending.take() {
                            Some(next) => Some(next),
                            None => {
                                *state = TurnState::Idle;
                                None
                            }
                        },
                        TurnState::Idle => None,
                    }
                };

                match next {
                    Some(next) => frame = next,
                    None => break,
                }
            }
        });
    }
}

pub async fn ws_chat_handler(
    ws: WebSocketUpgrade,
    State(app): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app, query))
}

async fn handle_socket(socket: WebSocket, app: Arc<AppState>, query: WsQuery) {
    let connection_start = Instant::now();
    let (sender, mut receiver) = socket.split();
    let connection = Arc::new(WebSocketConnection::new(sender));

    // Authentication happens before anything else flows; a bad token gets
    // one error frame and an immediate close.
    let claims = match query.token.as_deref() {
        Some(token) => match verify_token(token) {
            Ok(claims) => claims,
            Err(e) => {
                warn!("rejecting socket: {}", e);
                let _ = connection
                    .send_frame(&ServerFrame::error("UNAUTHENTICATED", e.user_message(), None))
                    .await;
                return;
            }
        },
        None => {
            warn!("rejecting socket without token");
            let _ = connection
                .send_frame(&ServerFrame::error(
                    "UNAUTHENTICATED",
                    "authentication token required",
                    None,
                ))
                .await;
            return;
        }
    };
    let user_id = claims.sub.clone();

    // A channel-scoped session must name a live channel.
    let scope = match query.channel_id.as_deref() {
        Some(channel_id) => match app.channels.get_active(channel_id).await {
            Ok(Some(channel)) => SessionScope::Channel(channel),
            Ok(None) => {
                warn!(user_id = %user_id, channel_id, "rejecting socket: unknown or deleted channel");
                let _ = connection
                    .send_frame(&ServerFrame::error(
                        "FORBIDDEN",
                        "channel is unavailable",
                        None,
                    ))
                    .await;
                return;
            }
            Err(e) => {
                error!(error = %e, "channel lookup failed during connect");
                let _ = connection
                    .send_frame(&ServerFrame::error("INTERNAL", e.user_message(), None))
                    .await;
                return;
            }
        },
        None => SessionScope::Personal,
    };

    let connection_id = Uuid::new_v4().to_string();
    app.registry.register(&user_id, &connection_id);
    info!(user_id = %user_id, connection_id = %connection_id, "websocket session opened");

    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel::<ServerFrame>(64);

    // Single forwarder task owns outbound ordering: status frames always
    // precede their turn's terminal frame.
    let forwarder = {
        let connection = connection.clone();
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if connection.send_frame(&frame).await.is_err() {
                    break;
                }
            }
        })
    };

    let heartbeat = HeartbeatManager::new();
    heartbeat.start(
        connection.clone(),
        Duration::from_secs(app.config.heartbeat.interval_s),
        cancel.clone(),
    );

    let session = Arc::new(Session {
        app: app.clone(),
        user_id: user_id.clone(),
        scope,
        tx: tx.clone(),
        cancel: cancel.clone(),
        turn_state: Mutex::new(TurnState::Idle),
    });

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            incoming = receiver.next() => match incoming {
                None => break,
                Some(Err(e)) => {
                    error!(user_id = %user_id, "websocket error: {}", e);
                    break;
                }
                Some(Ok(msg)) => match msg {
                    Message::Text(text) => match serde_json::from_str::<ClientFrame>(&text) {
                        Ok(frame) => session.clone().submit(frame),
                        Err(e) => {
                            debug!(user_id = %user_id, "unparseable frame: {}", e);
                            let _ = tx.try_send(ServerFrame::error(
                                "INVALID_INPUT",
                                "frame must be {conversation_id?, content}",
                                None,
                            ));
                        }
                    },
                    Message::Pong(_) => connection.record_pong().await,
                    Message::Ping(data) => {
                        let _ = connection.send_pong(data).await;
                    }
                    Message::Close(_) => {
                        debug!(user_id = %user_id, "client initiated close");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    // Tear down: cancel the in-flight turn (it will discard its work at the
    // next node boundary), stop the heartbeat, drop the registry entry.
    cancel.cancel();
    heartbeat.stop();
    connection.mark_closed().await;
    app.registry.unregister(&user_id, &connection_id);
    drop(tx);
    drop(session);
    forwarder.abort();

    info!(
        user_id = %user_id,
        connection_id = %connection_id,
        duration_s = connection_start.elapsed().as_secs_f64(),
        "websocket session closed"
    );
}
