//! Push-channel client for live bot state
//!
//! Keeps one WebSocket open to the bot API, decodes every state frame into a
//! [`BotStateSnapshot`] and hands it to the [`StateStore`]. When the socket
//! closes or errors the manager waits a fixed delay and reconnects, until
//! [`ConnectionManager::stop`] is called.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use operator_core::{BotStateSnapshot, ConnectionState, ConsoleError, ConsoleResult};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::DEFAULT_RECONNECT_DELAY;
use crate::store::StateStore;

/// Text frames from one open connection, in send order
pub type FrameStream = BoxStream<'static, ConsoleResult<String>>;

/// Opens the push channel
#[async_trait]
pub trait PushConnector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> ConsoleResult<FrameStream>;
}

/// WebSocket connector backed by tokio-tungstenite
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

#[async_trait]
impl PushConnector for WsConnector {
    async fn connect(&self, url: &str) -> ConsoleResult<FrameStream> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| ConsoleError::network(e.to_string()))?;

        // Ping replies are queued by tungstenite and flushed on the next read
        let frames = ws_stream.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => {
                        debug!("[Push WS] Dropping non-UTF-8 binary frame");
                        None
                    }
                },
                Ok(_) => None,
                Err(e) => Some(Err(ConsoleError::transport(e.to_string()))),
            }
        });

        Ok(frames.boxed())
    }
}

// ============================================================================
// Frame Classification
// ============================================================================

/// Classified inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum PushFrame {
    /// `{"type": "keepalive"}`
    Keepalive,
    /// Any frame carrying a `status` key
    Snapshot(Box<BotStateSnapshot>),
    /// Malformed or unrecognised
    Ignored,
}

/// Classify a raw text frame from the push channel
pub fn classify_frame(text: &str) -> PushFrame {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return PushFrame::Ignored;
    }

    let json = match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(json) => json,
        Err(_) => {
            debug!("[Push WS] Failed to parse frame: {}", trimmed);
            return PushFrame::Ignored;
        }
    };

    if json.get("type").and_then(|v| v.as_str()) == Some("keepalive") {
        return PushFrame::Keepalive;
    }

    if json.get("status").is_none() {
        debug!("[Push WS] Unknown frame: {}", trimmed);
        return PushFrame::Ignored;
    }

    match serde_json::from_value::<BotStateSnapshot>(json) {
        Ok(snapshot) => PushFrame::Snapshot(Box::new(snapshot)),
        Err(e) => {
            debug!("[Push WS] Failed to decode snapshot: {}", e);
            PushFrame::Ignored
        }
    }
}

// ============================================================================
// Connection Manager
// ============================================================================

/// Configuration for ConnectionManager
#[derive(Debug, Clone)]
pub struct ConnectionManagerConfig {
    pub url: String,
    /// Fixed delay between a disconnect and the next attempt
    pub reconnect_delay: Duration,
}

impl ConnectionManagerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

struct RunningLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owner of the single push-channel connection
///
/// One instance per console session. At most one connection loop runs at a
/// time, so there is never more than one socket or pending retry.
pub struct ConnectionManager {
    config: ConnectionManagerConfig,
    connector: Arc<dyn PushConnector>,
    store: Arc<StateStore>,
    state_tx: watch::Sender<ConnectionState>,
    running: Option<RunningLoop>,
}

impl ConnectionManager {
    pub fn new(
        config: ConnectionManagerConfig,
        connector: Arc<dyn PushConnector>,
        store: Arc<StateStore>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            connector,
            store,
            state_tx,
            running: None,
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Receiver that observes connection state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Whether a connection loop is active (connected, connecting, or waiting to retry)
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Open the channel
    ///
    /// Returns `false` without doing anything when a connection loop is
    /// already active.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            debug!("[Push WS] start() ignored, already {}", self.state());
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Self::connection_loop(
            self.config.clone(),
            Arc::clone(&self.connector),
            Arc::clone(&self.store),
            self.state_tx.clone(),
            cancel.clone(),
        ));

        self.running = Some(RunningLoop { cancel, handle });
        true
    }

    /// Close the channel and cancel any pending retry
    ///
    /// Idempotent. Once this returns no further connection attempt is made.
    pub async fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            if let Err(e) = running.handle.await {
                if !e.is_cancelled() {
                    error!("[Push WS] Connection loop panicked: {}", e);
                }
            }
            info!("[Push WS] Stopped");
        }
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }

    /// Main connection loop with fixed-delay reconnection
    async fn connection_loop(
        config: ConnectionManagerConfig,
        connector: Arc<dyn PushConnector>,
        store: Arc<StateStore>,
        state_tx: watch::Sender<ConnectionState>,
        cancel: CancellationToken,
    ) {
        'reconnect: loop {
            state_tx.send_replace(ConnectionState::Connecting);
            info!("[Push WS] Connecting to {}", config.url);

            let connected = tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'reconnect,
                result = connector.connect(&config.url) => result,
            };

            match connected {
                Ok(mut frames) => {
                    info!("[Push WS] Connected successfully");
                    state_tx.send_replace(ConnectionState::Connected);

                    loop {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break 'reconnect,
                            frame = frames.next() => match frame {
                                Some(Ok(text)) => Self::handle_frame(&text, &store),
                                Some(Err(e)) => {
                                    error!("[Push WS] Error: {}", e);
                                    break;
                                }
                                None => {
                                    info!("[Push WS] Connection closed by server");
                                    break;
                                }
                            },
                        }
                    }
                }
                Err(e) => {
                    error!("[Push WS] Connection failed: {}", e);
                }
            }

            state_tx.send_replace(ConnectionState::Disconnected);

            info!("[Push WS] Reconnecting in {:?}", config.reconnect_delay);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'reconnect,
                _ = tokio::time::sleep(config.reconnect_delay) => {}
            }
        }

        state_tx.send_replace(ConnectionState::Disconnected);
        info!("[Push WS] Connection loop exited");
    }

    /// Route one inbound frame
    fn handle_frame(text: &str, store: &StateStore) {
        match classify_frame(text) {
            PushFrame::Snapshot(snapshot) => {
                store.replace(*snapshot);
            }
            PushFrame::Keepalive | PushFrame::Ignored => {}
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}
