//! Storage and broadcast collaborator seams
//!
//! The core never owns persistence: this module defines the operations a
//! storage collaborator must provide and the atomicity contract each one
//! carries. `MemoryBackend` is the in-process reference implementation used
//! by tests and demos; a real deployment substitutes a database-backed
//! implementation with equivalent guarantees.

use crate::error::{ArenaError, Result};
use crate::types::{
    ChatMessage, now_ms, Participant, ProblemId, ProblemMode, Room, RoomEvent, RoomSnapshot,
    RoomStatus, RoomSummary,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

/// Authoritative room + participant storage.
///
/// Every operation is atomic and linearizable: the capacity check in
/// [`join_room`](RoomStore::join_room) happens in the same step as the
/// insert, and the status checks in [`start_room`](RoomStore::start_room)
/// and [`complete_room`](RoomStore::complete_room) happen in the same step
/// as the transition write. Concurrent callers observe either the state
/// before or the state after, never an intermediate.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Whether a room with this id exists.
    async fn room_exists(&self, room_id: &str) -> Result<bool>;

    /// Insert a new room with its creator as the first participant.
    async fn create_room(&self, room: Room, creator: Participant) -> Result<()>;

    /// Linearizable read of the room plus its active participants.
    async fn fetch_room(&self, room_id: &str) -> Result<RoomSnapshot>;

    /// Waiting, public, non-expired rooms for discovery.
    async fn list_public_rooms(&self) -> Result<Vec<RoomSummary>>;

    /// Rooms in which the user is an active participant.
    async fn list_rooms_for_user(&self, user_id: &str) -> Result<Vec<RoomSummary>>;

    /// Add a participant, atomically with the capacity check. Re-joining is
    /// idempotent: an active row is returned as-is and a soft-left row is
    /// re-activated instead of duplicated.
    async fn join_room(&self, room_id: &str, user: Participant) -> Result<RoomSnapshot>;

    /// Soft-remove a participant, freeing the slot immediately. No-op if the
    /// user is not active in the room.
    async fn leave_room(&self, room_id: &str, user_id: &str) -> Result<()>;

    /// Flip the ready flag on the caller's own participant row.
    async fn set_ready(&self, room_id: &str, user_id: &str, is_ready: bool) -> Result<()>;

    /// The `Waiting -> Active` gate. The creator check, the readiness
    /// snapshot, the status check and the activation write are one atomic
    /// step; exactly one concurrent caller succeeds and every other caller
    /// gets [`ArenaError::AlreadyStarted`]. `candidate_problem` is recorded
    /// for `Random` rooms; `Single` rooms keep their fixed problem. Returns
    /// the problem the room was started with.
    async fn start_room(
        &self,
        room_id: &str,
        requester_id: &str,
        candidate_problem: Option<ProblemId>,
    ) -> Result<ProblemId>;

    /// The `Active -> Completed` gate, recording the winner and the end
    /// instant. Same single-winner contract as `start_room`.
    async fn complete_room(&self, room_id: &str, winner_id: &str) -> Result<()>;

    /// Hard-delete a room. Only the creator may delete, and only while the
    /// room is still `Waiting`.
    async fn delete_room(&self, room_id: &str, requester_id: &str) -> Result<()>;

    /// Drop non-active rooms created before `cutoff`. Returns how many were
    /// removed.
    async fn purge_expired(&self, cutoff: u64) -> Result<usize>;

    /// Best-effort push channel for one room. Events are re-fetch hints,
    /// not state; delivery may be lossy or reordered.
    async fn subscribe(&self, room_id: &str) -> Result<broadcast::Receiver<RoomEvent>>;
}

/// Per-room chat relay. The channel echoes every published message to all
/// subscribers, the sender included.
#[async_trait]
pub trait ChatBroker: Send + Sync {
    /// Publish one message to the room channel. A zero timestamp is stamped
    /// with the broker's clock.
    async fn publish(&self, message: ChatMessage) -> Result<()>;

    /// Subscribe to the room channel.
    async fn subscribe_chat(&self, room_id: &str) -> Result<broadcast::Receiver<ChatMessage>>;
}

const EVENT_CHANNEL_CAPACITY: usize = 100;

struct RoomRecord {
    room: Room,
    /// All membership rows, soft-left ones included.
    participants: Vec<Participant>,
    events: broadcast::Sender<RoomEvent>,
    chat: broadcast::Sender<ChatMessage>,
}

impl RoomRecord {
    fn active(&self) -> Vec<Participant> {
        self.participants
            .iter()
            .filter(|p| p.is_active())
            .cloned()
            .collect()
    }

    fn active_count(&self) -> usize {
        self.participants.iter().filter(|p| p.is_active()).count()
    }

    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room: self.room.clone(),
            participants: self.active(),
        }
    }

    fn summary(&self) -> RoomSummary {
        RoomSummary {
            room_id: self.room.id.clone(),
            status: self.room.status,
            created_by: self.room.created_by.clone(),
            mode: self.room.mode,
            participant_count: self.active_count(),
            max_participants: self.room.max_participants,
            created_at: self.room.created_at,
        }
    }

    fn emit(&self, event: RoomEvent) {
        // Nobody listening is fine; the poll reconciler covers them.
        let _ = self.events.send(event);
    }

    fn expired(&self, ttl: u64, now: u64) -> bool {
        ttl > 0 && now.saturating_sub(self.room.created_at) > ttl
    }
}

/// In-process reference backend. A single writer lock over the room table
/// makes every operation linearizable, which is the same contract a
/// transactional database gives the production implementation.
pub struct MemoryBackend {
    rooms: RwLock<HashMap<String, RoomRecord>>,
    /// Room expiry in ms; 0 disables expiry.
    room_ttl: u64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_ttl(75 * 60 * 1000)
    }

    pub fn with_ttl(room_ttl: u64) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            room_ttl,
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoomStore for MemoryBackend {
    async fn room_exists(&self, room_id: &str) -> Result<bool> {
        Ok(self.rooms.read().await.contains_key(room_id))
    }

    async fn create_room(&self, room: Room, creator: Participant) -> Result<()> {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(&room.id) {
            return Err(ArenaError::Storage(format!(
                "duplicate room id: {}",
                room.id
            )));
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (chat, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let record = RoomRecord {
            room,
            participants: vec![creator],
            events,
            chat,
        };
        debug!("Stored room: {}", record.room.id);
        rooms.insert(record.room.id.clone(), record);
        Ok(())
    }

    async fn fetch_room(&self, room_id: &str) -> Result<RoomSnapshot> {
        let rooms = self.rooms.read().await;
        let record = rooms.get(room_id).ok_or(ArenaError::RoomNotFound)?;
        Ok(record.snapshot())
    }

    async fn list_public_rooms(&self) -> Result<Vec<RoomSummary>> {
        let now = now_ms();
        let rooms = self.rooms.read().await;
        let mut summaries: Vec<RoomSummary> = rooms
            .values()
            .filter(|r| {
                r.room.status == RoomStatus::Waiting
                    && !r.room.is_private
                    && !r.expired(self.room_ttl, now)
            })
            .map(|r| r.summary())
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    async fn list_rooms_for_user(&self, user_id: &str) -> Result<Vec<RoomSummary>> {
        let rooms = self.rooms.read().await;
        let mut summaries: Vec<RoomSummary> = rooms
            .values()
            .filter(|r| r.participants.iter().any(|p| p.is_active() && p.user_id == user_id))
            .map(|r| r.summary())
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    async fn join_room(&self, room_id: &str, user: Participant) -> Result<RoomSnapshot> {
        let mut rooms = self.rooms.write().await;
        let ttl = self.room_ttl;
        let record = rooms.get_mut(room_id).ok_or(ArenaError::RoomNotFound)?;

        if record.expired(ttl, now_ms()) {
            return Err(ArenaError::RoomExpired);
        }
        if record.room.status != RoomStatus::Waiting {
            return Err(ArenaError::RoomNotJoinable);
        }

        // Already active: idempotent re-join.
        if record
            .participants
            .iter()
            .any(|p| p.is_active() && p.user_id == user.user_id)
        {
            return Ok(record.snapshot());
        }

        // Capacity check and insert under the same lock.
        if record.active_count() >= record.room.max_participants {
            return Err(ArenaError::RoomFull);
        }

        if let Some(row) = record
            .participants
            .iter_mut()
            .find(|p| p.user_id == user.user_id)
        {
            // Soft-left row comes back instead of duplicating.
            row.left_at = None;
            row.is_ready = false;
            row.joined_at = user.joined_at;
            row.username = user.username;
        } else {
            record.participants.push(user);
        }

        record.emit(RoomEvent::ParticipantChanged {
            room_id: room_id.to_string(),
        });
        Ok(record.snapshot())
    }

    async fn leave_room(&self, room_id: &str, user_id: &str) -> Result<()> {
        let mut rooms = self.rooms.write().await;
        let record = rooms.get_mut(room_id).ok_or(ArenaError::RoomNotFound)?;

        let Some(row) = record
            .participants
            .iter_mut()
            .find(|p| p.is_active() && p.user_id == user_id)
        else {
            return Ok(());
        };

        row.left_at = Some(now_ms());
        record.emit(RoomEvent::ParticipantChanged {
            room_id: room_id.to_string(),
        });
        Ok(())
    }

    async fn set_ready(&self, room_id: &str, user_id: &str, is_ready: bool) -> Result<()> {
        let mut rooms = self.rooms.write().await;
        let record = rooms.get_mut(room_id).ok_or(ArenaError::RoomNotFound)?;

        let row = record
            .participants
            .iter_mut()
            .find(|p| p.is_active() && p.user_id == user_id)
            .ok_or(ArenaError::NotAParticipant)?;

        row.is_ready = is_ready;
        record.emit(RoomEvent::ParticipantChanged {
            room_id: room_id.to_string(),
        });
        Ok(())
    }

    async fn start_room(
        &self,
        room_id: &str,
        requester_id: &str,
        candidate_problem: Option<ProblemId>,
    ) -> Result<ProblemId> {
        let mut rooms = self.rooms.write().await;
        let record = rooms.get_mut(room_id).ok_or(ArenaError::RoomNotFound)?;

        if record.room.created_by != requester_id {
            return Err(ArenaError::Forbidden(
                "only the room creator can start the room".to_string(),
            ));
        }

        // Readiness is judged on the roster as of this same lock hold, so a
        // participant who left a moment ago is not counted.
        let active = record.active();
        let all_ready = !active.is_empty() && active.iter().all(|p| p.is_ready);
        if record.room.status == RoomStatus::Waiting && !all_ready {
            return Err(ArenaError::NotReady);
        }

        if record.room.status != RoomStatus::Waiting {
            return Err(ArenaError::AlreadyStarted);
        }

        let problem_id = match record.room.mode {
            ProblemMode::Single => record.room.problem_id.ok_or_else(|| {
                ArenaError::InvalidConfig("single-mode room has no problem".to_string())
            })?,
            ProblemMode::Random => candidate_problem.ok_or_else(|| {
                ArenaError::InvalidConfig("no candidate problem for random room".to_string())
            })?,
        };

        record.room.problem_id = Some(problem_id);
        record.room.started_at = Some(now_ms());
        record.room.status = RoomStatus::Active;
        info!("Room {} is now active", room_id);

        record.emit(RoomEvent::StatusChanged {
            room_id: room_id.to_string(),
            status: RoomStatus::Active,
        });
        Ok(problem_id)
    }

    async fn complete_room(&self, room_id: &str, winner_id: &str) -> Result<()> {
        let mut rooms = self.rooms.write().await;
        let record = rooms.get_mut(room_id).ok_or(ArenaError::RoomNotFound)?;

        match record.room.status {
            RoomStatus::Active => {}
            RoomStatus::Waiting => return Err(ArenaError::NotActive),
            RoomStatus::Completed => return Err(ArenaError::NotActive),
        }

        record.room.winner_id = Some(winner_id.to_string());
        record.room.ended_at = Some(now_ms());
        record.room.status = RoomStatus::Completed;
        info!("Room {} completed, winner {}", room_id, winner_id);

        record.emit(RoomEvent::StatusChanged {
            room_id: room_id.to_string(),
            status: RoomStatus::Completed,
        });
        Ok(())
    }

    async fn delete_room(&self, room_id: &str, requester_id: &str) -> Result<()> {
        let mut rooms = self.rooms.write().await;
        let record = rooms.get(room_id).ok_or(ArenaError::RoomNotFound)?;

        if record.room.created_by != requester_id {
            return Err(ArenaError::Forbidden(
                "only the room creator can delete the room".to_string(),
            ));
        }
        if record.room.status != RoomStatus::Waiting {
            return Err(ArenaError::RoomNotDeletable);
        }

        record.emit(RoomEvent::RoomDeleted {
            room_id: room_id.to_string(),
        });
        rooms.remove(room_id);
        info!("Deleted room: {}", room_id);
        Ok(())
    }

    async fn purge_expired(&self, cutoff: u64) -> Result<usize> {
        let mut rooms = self.rooms.write().await;
        let expired: Vec<String> = rooms
            .values()
            .filter(|r| r.room.status != RoomStatus::Active && r.room.created_at < cutoff)
            .map(|r| r.room.id.clone())
            .collect();

        for room_id in &expired {
            if let Some(record) = rooms.remove(room_id) {
                record.emit(RoomEvent::RoomDeleted {
                    room_id: room_id.clone(),
                });
            }
        }

        if !expired.is_empty() {
            info!("Purged {} expired rooms", expired.len());
        }
        Ok(expired.len())
    }

    async fn subscribe(&self, room_id: &str) -> Result<broadcast::Receiver<RoomEvent>> {
        let rooms = self.rooms.read().await;
        let record = rooms.get(room_id).ok_or(ArenaError::RoomNotFound)?;
        Ok(record.events.subscribe())
    }
}

#[async_trait]
impl ChatBroker for MemoryBackend {
    async fn publish(&self, mut message: ChatMessage) -> Result<()> {
        let rooms = self.rooms.read().await;
        let record = rooms.get(&message.room_id).ok_or(ArenaError::RoomNotFound)?;

        if message.timestamp == 0 {
            message.timestamp = now_ms();
        }
        debug!(
            "Chat message in room {}: {}",
            message.room_id, message.content
        );
        let _ = record.chat.send(message);
        Ok(())
    }

    async fn subscribe_chat(&self, room_id: &str) -> Result<broadcast::Receiver<ChatMessage>> {
        let rooms = self.rooms.read().await;
        let record = rooms.get(room_id).ok_or(ArenaError::RoomNotFound)?;
        Ok(record.chat.subscribe())
    }
}
