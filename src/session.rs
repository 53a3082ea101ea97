//! Client-side room session: dual-channel sync with snapshot replacement
//!
//! Push delivery is not guaranteed exactly-once or ordered relative to
//! storage writes, so a push event is only ever a hint to re-fetch. The
//! poll reconciler performs the same full re-fetch on a fixed schedule
//! regardless of push health, and every re-fetch replaces local state
//! wholesale. Arbitrary loss, duplication or reordering of push events
//! therefore converges to the authoritative store.

use crate::error::{ArenaError, Result};
use crate::store::RoomStore;
use crate::time::{interval, sleep, spawn, Duration};
use crate::types::{Participant, ProblemId, RoomSnapshot, RoomStatus, SessionConfig};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tracing::debug;

/// Session events emitted to the application
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A fresh snapshot replaced local state (push- or poll-triggered)
    RoomUpdated(RoomSnapshot),
    /// A user appeared in the active roster
    ParticipantJoined(Participant),
    /// A user dropped out of the active roster
    ParticipantLeft(String),
    /// Every active participant is ready
    AllReady,
    /// First observation of the active status; navigate to the contest view
    ContestStarted {
        problem_id: ProblemId,
        started_at: u64,
    },
    /// First observation of the completed status
    ContestFinished {
        winner_id: Option<String>,
        ended_at: Option<u64>,
    },
    /// The room disappeared from the store
    RoomClosed,
    /// A re-fetch failed; the poll keeps trying on its own schedule
    SyncError(String),
}

#[derive(Default)]
struct LocalState {
    snapshot: Option<RoomSnapshot>,
    started_emitted: bool,
    finished_emitted: bool,
    closed_emitted: bool,
}

/// State and plumbing shared by the push watcher and the poll loop.
struct SyncShared {
    store: Arc<dyn RoomStore>,
    room_id: String,
    state: RwLock<LocalState>,
    event_tx: mpsc::Sender<SessionEvent>,
}

impl SyncShared {
    /// One full re-fetch, applied by replacement. All outcomes are reported
    /// through the event channel; callers never branch on this.
    async fn refresh(&self) {
        match self.store.fetch_room(&self.room_id).await {
            Ok(snapshot) => self.apply(snapshot).await,
            Err(ArenaError::RoomNotFound) => {
                let emit = {
                    let mut state = self.state.write().await;
                    let first = !state.closed_emitted;
                    state.closed_emitted = true;
                    state.snapshot = None;
                    first
                };
                if emit {
                    let _ = self.event_tx.send(SessionEvent::RoomClosed).await;
                }
            }
            Err(e) => {
                let _ = self
                    .event_tx
                    .send(SessionEvent::SyncError(e.to_string()))
                    .await;
            }
        }
    }

    /// Replace local state with a snapshot and derive edge-triggered events
    /// by diffing against the previous one. The diff and the flag updates
    /// happen under one lock so concurrent push/poll refreshes cannot emit
    /// a transition twice.
    async fn apply(&self, snapshot: RoomSnapshot) {
        let mut events = Vec::new();
        {
            let mut state = self.state.write().await;
            let prev = state.snapshot.replace(snapshot.clone());

            events.push(SessionEvent::RoomUpdated(snapshot.clone()));

            match &prev {
                Some(prev) => {
                    for p in &snapshot.participants {
                        if !prev.has_participant(&p.user_id) {
                            events.push(SessionEvent::ParticipantJoined(p.clone()));
                        }
                    }
                    for p in &prev.participants {
                        if !snapshot.has_participant(&p.user_id) {
                            events.push(SessionEvent::ParticipantLeft(p.user_id.clone()));
                        }
                    }
                    if snapshot.all_ready() && !prev.all_ready() {
                        events.push(SessionEvent::AllReady);
                    }
                }
                None => {
                    if snapshot.all_ready() {
                        events.push(SessionEvent::AllReady);
                    }
                }
            }

            if snapshot.room.status == RoomStatus::Active && !state.started_emitted {
                state.started_emitted = true;
                if let Some(problem_id) = snapshot.room.problem_id {
                    events.push(SessionEvent::ContestStarted {
                        problem_id,
                        started_at: snapshot.room.started_at.unwrap_or_default(),
                    });
                }
            }

            if snapshot.room.status == RoomStatus::Completed && !state.finished_emitted {
                state.finished_emitted = true;
                state.started_emitted = true;
                events.push(SessionEvent::ContestFinished {
                    winner_id: snapshot.room.winner_id.clone(),
                    ended_at: snapshot.room.ended_at,
                });
            }
        }

        for event in events {
            let _ = self.event_tx.send(event).await;
        }
    }
}

struct ActiveWatch {
    shared: Arc<SyncShared>,
    shutdown: watch::Sender<bool>,
}

/// Watches one room through both sync channels and feeds the application an
/// event stream. Open one per room view; closing (or dropping) the session
/// tears both channels down.
pub struct RoomSession {
    store: Arc<dyn RoomStore>,
    config: SessionConfig,
    current: RwLock<Option<ActiveWatch>>,
    event_tx: mpsc::Sender<SessionEvent>,
    event_rx: RwLock<mpsc::Receiver<SessionEvent>>,
}

impl RoomSession {
    pub fn new(store: Arc<dyn RoomStore>, config: SessionConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(100);
        Self {
            store,
            config,
            current: RwLock::new(None),
            event_tx,
            event_rx: RwLock::new(event_rx),
        }
    }

    /// Receive the next session event (blocking).
    pub async fn recv(&self) -> Option<SessionEvent> {
        self.event_rx.write().await.recv().await
    }

    /// Receive the next session event (non-blocking).
    pub async fn try_recv(&self) -> Option<SessionEvent> {
        self.event_rx.write().await.try_recv().ok()
    }

    /// Last applied snapshot, if any.
    pub async fn snapshot(&self) -> Option<RoomSnapshot> {
        match &*self.current.read().await {
            Some(active) => active.shared.state.read().await.snapshot.clone(),
            None => None,
        }
    }

    /// Open the session on a room: prime local state with one fetch, then
    /// start the push watcher and the poll reconciler. Switching rooms
    /// closes the previous watchers first.
    pub async fn open(&self, room_id: &str) -> Result<()> {
        self.close().await;

        let room_id = room_id.to_ascii_uppercase();
        let shared = Arc::new(SyncShared {
            store: self.store.clone(),
            room_id: room_id.clone(),
            state: RwLock::new(LocalState::default()),
            event_tx: self.event_tx.clone(),
        });

        // The first fetch failing is an open failure, not a sync hiccup.
        let snapshot = self.store.fetch_room(&room_id).await?;
        shared.apply(snapshot).await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        spawn(push_watcher(
            shared.clone(),
            shutdown_rx.clone(),
            self.config.poll_interval,
        ));
        spawn(poll_loop(
            shared.clone(),
            shutdown_rx,
            self.config.poll_interval,
        ));

        *self.current.write().await = Some(ActiveWatch {
            shared,
            shutdown: shutdown_tx,
        });
        debug!("Session open on room {}", room_id);
        Ok(())
    }

    /// Stop both sync channels and drop local state.
    pub async fn close(&self) {
        if let Some(active) = self.current.write().await.take() {
            let _ = active.shutdown.send(true);
            debug!("Session closed on room {}", active.shared.room_id);
        }
    }

    /// Force one re-fetch outside the regular schedule.
    pub async fn refresh(&self) {
        let shared = match &*self.current.read().await {
            Some(active) => active.shared.clone(),
            None => return,
        };
        shared.refresh().await;
    }
}

/// Consume push hints for the room, re-fetching on every one. Loss of the
/// subscription is not fatal: the poll loop keeps healing state while this
/// task resubscribes.
async fn push_watcher(shared: Arc<SyncShared>, mut shutdown: watch::Receiver<bool>, retry_ms: u64) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        let mut rx = match shared.store.subscribe(&shared.room_id).await {
            Ok(rx) => rx,
            Err(_) => {
                tokio::select! {
                    _ = shutdown.changed() => return,
                    _ = sleep(Duration::from_millis(retry_ms)) => continue,
                }
            }
        };
        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                event = rx.recv() => match event {
                    // Hint only: never apply the payload, always re-fetch.
                    Ok(_) => shared.refresh().await,
                    // Missed events are healed by the same full re-fetch.
                    Err(broadcast::error::RecvError::Lagged(_)) => shared.refresh().await,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        // Sender gone: the room was deleted or the backend restarted.
        shared.refresh().await;
    }
}

/// Unconditional re-fetch on a fixed interval, independent of push health.
async fn poll_loop(shared: Arc<SyncShared>, mut shutdown: watch::Receiver<bool>, poll_ms: u64) {
    let mut ticker = interval(Duration::from_millis(poll_ms));
    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = ticker.tick() => shared.refresh().await,
        }
    }
}
