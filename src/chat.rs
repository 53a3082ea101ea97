//! Per-room chat with optimistic local echo
//!
//! Sends append to the local view immediately, then publish; the broker
//! echoes every message back, the sender's own included. An echo is
//! recognized by its (sender, content, time-window) fingerprint against the
//! visible log and dropped, so a message is never displayed twice whichever
//! order the append and the echo land in.

use crate::error::{ArenaError, Result};
use crate::store::ChatBroker;
use crate::time::{sleep, spawn, Duration};
use crate::types::{ChatMessage, Identity, now_ms, SessionConfig};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tracing::{debug, warn};

/// Chat connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatState {
    #[default]
    Connecting,
    Connected,
    Disconnected,
}

/// Chat events emitted to the application
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A message became visible: an own optimistic send or a peer's
    Message(ChatMessage),
    /// Connection state changed
    State(ChatState),
}

/// Plumbing shared with the background receive loop.
struct ChatShared {
    broker: Arc<dyn ChatBroker>,
    room_id: String,
    dedup_window: u64,
    retry: Duration,
    state: RwLock<ChatState>,
    /// Visible message log; also the dedup reference for incoming echoes.
    log: RwLock<Vec<ChatMessage>>,
    event_tx: mpsc::Sender<ChatEvent>,
}

impl ChatShared {
    async fn set_state(&self, next: ChatState) {
        let changed = {
            let mut state = self.state.write().await;
            let changed = *state != next;
            *state = next;
            changed
        };
        if changed {
            let _ = self.event_tx.send(ChatEvent::State(next)).await;
        }
    }

    /// Show an incoming message unless it is an echo of one already shown.
    async fn deliver(&self, message: ChatMessage) {
        if message.room_id != self.room_id {
            return;
        }
        {
            let mut log = self.log.write().await;
            if log
                .iter()
                .any(|seen| seen.is_same_send(&message, self.dedup_window))
            {
                debug!("Dropped duplicate chat echo from {}", message.sender_name);
                return;
            }
            log.push(message.clone());
        }
        let _ = self.event_tx.send(ChatEvent::Message(message)).await;
    }
}

/// Bidirectional chat channel for one room.
pub struct ChatChannel {
    shared: Arc<ChatShared>,
    identity: Identity,
    event_rx: RwLock<mpsc::Receiver<ChatEvent>>,
    shutdown: RwLock<Option<watch::Sender<bool>>>,
}

impl ChatChannel {
    pub fn new(
        broker: Arc<dyn ChatBroker>,
        room_id: &str,
        identity: Identity,
        config: &SessionConfig,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(100);
        Self {
            shared: Arc::new(ChatShared {
                broker,
                room_id: room_id.to_ascii_uppercase(),
                dedup_window: config.chat_dedup_window,
                retry: Duration::from_millis(config.chat_retry),
                state: RwLock::new(ChatState::Connecting),
                log: RwLock::new(Vec::new()),
                event_tx,
            }),
            identity,
            event_rx: RwLock::new(event_rx),
            shutdown: RwLock::new(None),
        }
    }

    /// Start the receive loop with its reconnect schedule. Idempotent while
    /// open.
    pub async fn open(&self) {
        let mut shutdown = self.shutdown.write().await;
        if shutdown.is_some() {
            return;
        }
        let (tx, rx) = watch::channel(false);
        *shutdown = Some(tx);
        spawn(receive_loop(self.shared.clone(), rx));
    }

    /// Stop the receive loop and the reconnect schedule.
    pub async fn close(&self) {
        if let Some(tx) = self.shutdown.write().await.take() {
            let _ = tx.send(true);
        }
        self.shared.set_state(ChatState::Disconnected).await;
    }

    pub async fn state(&self) -> ChatState {
        *self.shared.state.read().await
    }

    /// The visible message log, oldest first.
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.shared.log.read().await.clone()
    }

    /// Receive the next chat event (blocking).
    pub async fn recv(&self) -> Option<ChatEvent> {
        self.event_rx.write().await.recv().await
    }

    /// Receive the next chat event (non-blocking).
    pub async fn try_recv(&self) -> Option<ChatEvent> {
        self.event_rx.write().await.try_recv().ok()
    }

    /// Optimistic send: the message is visible locally before the publish,
    /// and the broker echo is absorbed by the dedup rule. Rejected without
    /// touching the broker while not connected.
    pub async fn send(&self, content: &str) -> Result<ChatMessage> {
        if *self.shared.state.read().await != ChatState::Connected {
            return Err(ArenaError::NetworkUnavailable);
        }

        let content = content.trim();
        if content.is_empty() {
            return Err(ArenaError::InvalidConfig(
                "empty chat message".to_string(),
            ));
        }

        let message = ChatMessage {
            room_id: self.shared.room_id.clone(),
            sender_id: self.identity.user_id.clone(),
            sender_name: self.identity.username.clone(),
            content: content.to_string(),
            timestamp: now_ms(),
        };

        // Append before publishing so the echo always finds its original.
        self.shared.log.write().await.push(message.clone());
        let _ = self
            .shared
            .event_tx
            .send(ChatEvent::Message(message.clone()))
            .await;

        self.shared.broker.publish(message.clone()).await?;
        Ok(message)
    }
}

/// Subscribe, relay, and reconnect on a fixed delay until shut down.
async fn receive_loop(shared: Arc<ChatShared>, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        shared.set_state(ChatState::Connecting).await;

        match shared.broker.subscribe_chat(&shared.room_id).await {
            Ok(mut rx) => {
                shared.set_state(ChatState::Connected).await;
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => {
                            shared.set_state(ChatState::Disconnected).await;
                            return;
                        }
                        message = rx.recv() => match message {
                            Ok(message) => shared.deliver(message).await,
                            Err(broadcast::error::RecvError::Lagged(missed)) => {
                                warn!("Chat receiver lagged, {} messages missed", missed);
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        },
                    }
                }
            }
            Err(e) => {
                warn!("Chat subscribe failed: {}", e);
            }
        }

        shared.set_state(ChatState::Disconnected).await;
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = sleep(shared.retry) => {}
        }
    }
}
