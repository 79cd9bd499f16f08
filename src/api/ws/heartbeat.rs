// src/api/ws/heartbeat.rs
// Heartbeat loop: ping on an interval, close the channel after two missed
// pongs. The task stops itself once the connection closes.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::connection::WebSocketConnection;

pub struct HeartbeatManager {
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatManager {
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            stop_tx,
            stop_rx,
            handle: Mutex::new(None),
        }
    }

    /// Starts the heartbeat loop. `on_dead` is cancelled when the client
    /// misses two consecutive pongs, which tears down the whole session.
    /// Safe to call once; subsequent calls replace the previous task.
    pub fn start(
        &self,
        connection: Arc<WebSocketConnection>,
        period: Duration,
        on_dead: CancellationToken,
    ) {
        self.stop();

        let mut rx = self.stop_rx.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            // First tick completes immediately; skip it so the deadline
            // math starts one full period in.
            ticker.tick().await;
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let silence = connection.last_pong().await.elapsed();
                        if silence >= period * 2 {
                            warn!(?silence, "two heartbeats unanswered, closing channel");
                            connection.mark_closed().await;
                            on_dead.cancel();
                            break;
                        }
                        if connection.send_ping().await.is_err() {
                            on_dead.cancel();
                            break;
                        }
                        debug!("heartbeat ping sent");
                    }
                    changed = rx.changed() => {
                        if changed.is_ok() && *rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        *self.handle.lock() = Some(handle);
    }

    /// Signals the heartbeat task to stop.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.handle.lock().take() {
            tokio::spawn(async move {
                let _ = handle.await;
            });
        }
    }
}

impl Default for HeartbeatManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HeartbeatManager {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}
