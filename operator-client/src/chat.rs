//! Streaming chat session for the trading assistant
//!
//! A session owns one conversation. Each `send` runs a single turn: it
//! appends the user message and an empty assistant message, opens the
//! streaming endpoint and folds every `data:` payload into the assistant
//! message as it arrives.
//!
//! Only one turn may be in flight per session. A `send` issued while another
//! turn is running is dropped and returns [`TurnOutcome::Rejected`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use operator_core::{ChatMessage, ChatPayload, ChatRequest, ConsoleResult, Conversation};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use crate::gateway::{ensure_success, network_error};
use crate::stream::EventLineDecoder;

/// Raw response body chunks
pub type ByteStream = BoxStream<'static, ConsoleResult<Bytes>>;

/// Transport for the streaming chat endpoint
#[async_trait]
pub trait ChatTransport: Send + Sync + 'static {
    /// Start a turn and return the chunked response body
    async fn open_stream(&self, request: &ChatRequest) -> ConsoleResult<ByteStream>;

    /// Delete a conversation on the server
    async fn delete_conversation(&self, conversation_id: &str) -> ConsoleResult<()>;
}

/// HTTP transport for `POST /api/chat` and `DELETE /api/chat/{id}`
#[derive(Debug, Clone)]
pub struct HttpChatTransport {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpChatTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_connect_timeout(base_url, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Only connecting is bounded; a reply may stream for as long as it needs
    pub fn with_connect_timeout(base_url: impl Into<String>, connect_timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent("operator-console/1.0")
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn open_stream(&self, request: &ChatRequest) -> ConsoleResult<ByteStream> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(network_error)?;
        let response = ensure_success(response).await?;

        Ok(response.bytes_stream().map(|chunk| chunk.map_err(network_error)).boxed())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> ConsoleResult<()> {
        let url = format!("{}/api/chat/{}", self.base_url, conversation_id);
        let response = self
            .http_client
            .delete(&url)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(network_error)?;
        ensure_success(response).await?;
        Ok(())
    }
}

// ============================================================================
// Events and Outcomes
// ============================================================================

/// Progress of a turn, broadcast to renderers
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    TurnStarted {
        user_message_id: String,
        assistant_message_id: String,
    },
    /// The server assigned the conversation ID
    ConversationBound { conversation_id: String },
    /// Text appended to the assistant message
    Delta { message_id: String, content: String },
    /// `done` received
    Completed { message_id: String },
    /// The turn was aborted with an error shown as the message content
    Failed { message_id: String, content: String },
    Cancelled { message_id: String },
    /// Stream released; a new turn may start
    TurnEnded { message_id: String },
}

/// How a call to [`ChatSession::send`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Another turn was in flight; nothing was sent
    Rejected,
    /// `done` was received
    Completed,
    /// The stream ended before `done`
    Ended,
    /// Error payload or transport failure
    Failed,
    Cancelled,
}

/// Handle that aborts the in-flight turn of a session
#[derive(Debug, Clone, Default)]
pub struct ChatCanceller {
    slot: Arc<Mutex<Option<CancellationToken>>>,
}

impl ChatCanceller {
    /// Cancel the current turn; returns `false` if none was in flight
    pub fn cancel(&self) -> bool {
        match self.slot.lock().take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Clears the in-flight flag however the turn future ends, including drop
struct InFlightGuard {
    flag: Arc<AtomicBool>,
    canceller: ChatCanceller,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.canceller.slot.lock().take();
        self.flag.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// Chat Session
// ============================================================================

/// One conversation with the trading assistant
pub struct ChatSession {
    transport: Arc<dyn ChatTransport>,
    conversation: Mutex<Conversation>,
    in_flight: Arc<AtomicBool>,
    canceller: ChatCanceller,
    events_tx: broadcast::Sender<ChatEvent>,
}

impl ChatSession {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            transport,
            conversation: Mutex::new(Conversation::default()),
            in_flight: Arc::new(AtomicBool::new(false)),
            canceller: ChatCanceller::default(),
            events_tx,
        }
    }

    /// Receive turn progress events
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events_tx.subscribe()
    }

    pub fn canceller(&self) -> ChatCanceller {
        self.canceller.clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Server-assigned conversation ID, once bound
    pub fn conversation_id(&self) -> Option<String> {
        self.conversation.lock().id.clone()
    }

    /// Messages in conversation order
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.conversation.lock().messages.clone()
    }

    pub fn conversation(&self) -> Conversation {
        self.conversation.lock().clone()
    }

    /// Run one turn to completion
    pub async fn send(&self, text: &str) -> TurnOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("[Chat] Turn already in flight, dropping message");
            return TurnOutcome::Rejected;
        }

        let cancel = CancellationToken::new();
        *self.canceller.slot.lock() = Some(cancel.clone());
        let _guard = InFlightGuard {
            flag: Arc::clone(&self.in_flight),
            canceller: self.canceller.clone(),
        };

        let user = ChatMessage::user(text);
        let assistant = ChatMessage::assistant_placeholder();
        let message_id = assistant.id.clone();
        let request = {
            let mut conversation = self.conversation.lock();
            // A previous turn whose future was dropped mid-stream
            for stale in conversation.messages.iter_mut().filter(|m| m.streaming) {
                stale.streaming = false;
            }
            self.emit(ChatEvent::TurnStarted {
                user_message_id: user.id.clone(),
                assistant_message_id: message_id.clone(),
            });
            conversation.messages.push(user);
            conversation.messages.push(assistant);
            ChatRequest {
                message: text.to_string(),
                conversation_id: conversation.id.clone(),
            }
        };

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.transport.open_stream(&request) => Some(result),
        };

        let outcome = match opened {
            None => self.cancel_turn(&message_id),
            Some(Err(e)) => {
                warn!("[Chat] Failed to open stream: {}", e);
                self.fail_turn(&message_id, format!("Error: {}", e.operator_text()))
            }
            Some(Ok(stream)) => self.read_stream(&message_id, stream, &cancel).await,
        };

        self.update_message(&message_id, |message| message.streaming = false);
        self.emit(ChatEvent::TurnEnded { message_id });
        outcome
    }

    /// Drop all messages and the bound conversation
    ///
    /// Cancels an in-flight turn. Remote deletion is best-effort.
    pub async fn clear(&self) {
        self.canceller.cancel();

        let conversation_id = {
            let mut conversation = self.conversation.lock();
            conversation.messages.clear();
            conversation.id.take()
        };

        if let Some(id) = conversation_id {
            match self.transport.delete_conversation(&id).await {
                Ok(()) => info!("[Chat] Deleted conversation {}", id),
                Err(e) => warn!("[Chat] Failed to delete conversation {}: {}", id, e),
            }
        }
    }

    async fn read_stream(
        &self,
        message_id: &str,
        mut stream: ByteStream,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        let mut decoder = EventLineDecoder::new();
        let mut done = false;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancel_turn(message_id),
                chunk = stream.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    for payload in decoder.push(&bytes) {
                        if let Some(outcome) = self.apply_payload(message_id, payload, &mut done) {
                            return outcome;
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!("[Chat] Stream error: {}", e);
                    if done {
                        return TurnOutcome::Completed;
                    }
                    let partial = self
                        .message(message_id)
                        .map(|m| !m.content.is_empty())
                        .unwrap_or(false);
                    if partial {
                        // Keep what already streamed
                        self.emit(ChatEvent::Failed {
                            message_id: message_id.to_string(),
                            content: e.operator_text(),
                        });
                        return TurnOutcome::Failed;
                    }
                    return self.fail_turn(message_id, format!("Error: {}", e.operator_text()));
                }
                None => {
                    if let Some(payload) = decoder.finish() {
                        if let Some(outcome) = self.apply_payload(message_id, payload, &mut done) {
                            return outcome;
                        }
                    }
                    debug!("[Chat] Stream ended (done: {})", done);
                    return if done {
                        TurnOutcome::Completed
                    } else {
                        TurnOutcome::Ended
                    };
                }
            }
        }
    }

    /// Fold one payload into the turn; returns an outcome if it ends the turn
    fn apply_payload(
        &self,
        message_id: &str,
        payload: ChatPayload,
        done: &mut bool,
    ) -> Option<TurnOutcome> {
        if let Some(id) = payload.conversation_id.as_deref().filter(|id| !id.is_empty()) {
            self.bind_conversation(id);
        }

        if let Some(error) = payload.error_text() {
            if *done {
                // Completed replies are frozen
                debug!("[Chat] Ignoring error after done: {}", error);
                return None;
            }
            return Some(self.fail_turn(message_id, error));
        }
        let finished = payload.is_done();

        if let Some(content) = payload.content.filter(|c| !c.is_empty()) {
            if *done {
                debug!("[Chat] Ignoring content after done");
            } else {
                self.update_message(message_id, |message| message.content.push_str(&content));
                self.emit(ChatEvent::Delta {
                    message_id: message_id.to_string(),
                    content,
                });
            }
        }

        if finished && !*done {
            *done = true;
            self.update_message(message_id, |message| message.streaming = false);
            self.emit(ChatEvent::Completed {
                message_id: message_id.to_string(),
            });
        }

        None
    }

    /// Capture the conversation ID the first time the server sends one
    fn bind_conversation(&self, id: &str) {
        let mut conversation = self.conversation.lock();
        match conversation.id.as_deref() {
            None => {
                info!("[Chat] Conversation bound to {}", id);
                conversation.id = Some(id.to_string());
                self.emit(ChatEvent::ConversationBound {
                    conversation_id: id.to_string(),
                });
            }
            Some(existing) if existing != id => {
                debug!("[Chat] Ignoring conversation_id {} (bound to {})", id, existing);
            }
            Some(_) => {}
        }
    }

    fn fail_turn(&self, message_id: &str, content: String) -> TurnOutcome {
        self.update_message(message_id, |message| {
            message.content = content.clone();
            message.streaming = false;
        });
        self.emit(ChatEvent::Failed {
            message_id: message_id.to_string(),
            content,
        });
        TurnOutcome::Failed
    }

    fn cancel_turn(&self, message_id: &str) -> TurnOutcome {
        info!("[Chat] Turn cancelled");
        self.update_message(message_id, |message| message.streaming = false);
        self.emit(ChatEvent::Cancelled {
            message_id: message_id.to_string(),
        });
        TurnOutcome::Cancelled
    }

    fn message(&self, message_id: &str) -> Option<ChatMessage> {
        self.conversation
            .lock()
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .cloned()
    }

    /// Mutate a message by ID; no-op if it was cleared
    fn update_message<F>(&self, message_id: &str, f: F)
    where
        F: FnOnce(&mut ChatMessage),
    {
        let mut conversation = self.conversation.lock();
        if let Some(message) = conversation.messages.iter_mut().rev().find(|m| m.id == message_id) {
            f(message);
        }
    }

    fn emit(&self, event: ChatEvent) {
        // No receivers is fine
        let _ = self.events_tx.send(event);
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let conversation = self.conversation.lock();
        f.debug_struct("ChatSession")
            .field("conversation_id", &conversation.id)
            .field("messages", &conversation.messages.len())
            .field("in_flight", &self.is_in_flight())
            .finish()
    }
}
