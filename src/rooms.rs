//! Room membership and start arbitration

use crate::catalog::ProblemCatalog;
use crate::error::{ArenaError, Result};
use crate::store::RoomStore;
use crate::types::{
    generate_room_code, Identity, normalize_room_code, now_ms, Participant, ProblemId,
    ProblemMode, Room, RoomConfig, RoomSnapshot, RoomStatus, RoomSummary,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Membership operations and the start gate, applied against the storage
/// collaborator. Every failure surfaces synchronously to the caller;
/// nothing here retries on its own.
pub struct RoomService {
    store: Arc<dyn RoomStore>,
    catalog: Arc<dyn ProblemCatalog>,
}

impl RoomService {
    pub fn new(store: Arc<dyn RoomStore>, catalog: Arc<dyn ProblemCatalog>) -> Self {
        Self { store, catalog }
    }

    /// Create a room with the creator auto-joined and not ready.
    pub async fn create_room(
        &self,
        creator: &Identity,
        config: RoomConfig,
    ) -> Result<RoomSnapshot> {
        if config.max_participants < 1 || config.max_participants > 4 {
            return Err(ArenaError::InvalidConfig(
                "max_participants must be between 1 and 4".to_string(),
            ));
        }
        if config.mode == ProblemMode::Single && config.problem_id.is_none() {
            return Err(ArenaError::InvalidConfig(
                "single mode requires a problem id".to_string(),
            ));
        }

        // Collisions are rare (36^6 codes) but real; loop until unused.
        let room_id = loop {
            let candidate = generate_room_code();
            if !self.store.room_exists(&candidate).await? {
                break candidate;
            }
        };

        let now = now_ms();
        let room = Room {
            id: room_id.clone(),
            created_by: creator.user_id.clone(),
            max_participants: config.max_participants,
            mode: config.mode,
            // A random room resolves its problem at start time, never before.
            problem_id: match config.mode {
                ProblemMode::Single => config.problem_id,
                ProblemMode::Random => None,
            },
            status: RoomStatus::Waiting,
            is_private: config.is_private,
            created_at: now,
            started_at: None,
            ended_at: None,
            winner_id: None,
        };

        self.store
            .create_room(room, Participant::new(creator, now))
            .await?;
        info!("Created room: {}", room_id);
        self.store.fetch_room(&room_id).await
    }

    /// Join by user-entered code. Codes are case-insensitive and must be
    /// exactly 6 alphanumeric characters once normalized.
    pub async fn join_room(&self, code: &str, user: &Identity) -> Result<RoomSnapshot> {
        let room_id = normalize_room_code(code).ok_or_else(|| {
            ArenaError::InvalidConfig("room code must be 6 characters, A-Z and 0-9".to_string())
        })?;

        let snapshot = self
            .store
            .join_room(&room_id, Participant::new(user, now_ms()))
            .await?;
        info!("{} joined room: {}", user.user_id, room_id);
        Ok(snapshot)
    }

    /// Soft-leave. The freed slot is visible to racing joiners immediately.
    pub async fn leave_room(&self, room_id: &str, user_id: &str) -> Result<()> {
        let room_id = room_id.to_ascii_uppercase();
        self.store.leave_room(&room_id, user_id).await?;
        info!("{} left room: {}", user_id, room_id);
        Ok(())
    }

    /// Update the caller's own ready flag.
    pub async fn set_ready(&self, room_id: &str, user_id: &str, is_ready: bool) -> Result<()> {
        let room_id = room_id.to_ascii_uppercase();
        self.store.set_ready(&room_id, user_id, is_ready).await
    }

    /// Hard-delete a waiting room, creator only.
    pub async fn delete_room(&self, room_id: &str, requester_id: &str) -> Result<()> {
        let room_id = room_id.to_ascii_uppercase();
        self.store.delete_room(&room_id, requester_id).await
    }

    /// Current room + active participants.
    pub async fn room(&self, room_id: &str) -> Result<RoomSnapshot> {
        self.store.fetch_room(&room_id.to_ascii_uppercase()).await
    }

    pub async fn list_public_rooms(&self) -> Result<Vec<RoomSummary>> {
        self.store.list_public_rooms().await
    }

    pub async fn list_rooms_for_user(&self, user_id: &str) -> Result<Vec<RoomSummary>> {
        self.store.list_rooms_for_user(user_id).await
    }

    /// Start arbitration. Resolves a candidate problem for random rooms,
    /// then lets the store's compare-and-set pick the single winner; racing
    /// callers may each carry their own candidate, only the winner's is
    /// recorded. Returns the problem the room starts with, so the caller can
    /// navigate without another round trip.
    pub async fn start_room(&self, room_id: &str, requester_id: &str) -> Result<ProblemId> {
        let room_id = room_id.to_ascii_uppercase();

        let snapshot = self.store.fetch_room(&room_id).await?;
        let candidate = match snapshot.room.mode {
            ProblemMode::Random => Some(self.catalog.pick_random().await?),
            ProblemMode::Single => None,
        };

        let problem_id = self
            .store
            .start_room(&room_id, requester_id, candidate)
            .await?;
        info!("Started room {} with problem {}", room_id, problem_id);
        Ok(problem_id)
    }

    /// Record the contest outcome: `Active -> Completed` with a winner.
    pub async fn complete_room(&self, room_id: &str, winner_id: &str) -> Result<()> {
        let room_id = room_id.to_ascii_uppercase();
        self.store.complete_room(&room_id, winner_id).await
    }

    /// Join any waiting public room with a free slot, or create a fresh
    /// random-mode room when none accepts. The caller always ends up in a
    /// room; only storage failure surfaces.
    pub async fn random_join(&self, user: &Identity) -> Result<RoomSnapshot> {
        let candidates = self.store.list_public_rooms().await?;
        for summary in candidates {
            if summary.participant_count >= summary.max_participants {
                continue;
            }
            match self
                .store
                .join_room(&summary.room_id, Participant::new(user, now_ms()))
                .await
            {
                Ok(snapshot) => {
                    info!("{} random-joined room: {}", user.user_id, summary.room_id);
                    return Ok(snapshot);
                }
                // Filled up, started or vanished since the listing; move on.
                Err(
                    ArenaError::RoomFull
                    | ArenaError::RoomNotJoinable
                    | ArenaError::RoomExpired
                    | ArenaError::RoomNotFound,
                ) => continue,
                Err(e) => return Err(e),
            }
        }

        warn!("No joinable room for {}, creating one", user.user_id);
        self.create_room(user, RoomConfig::default()).await
    }

    /// Sweep rooms past their ttl. `Active` rooms are never removed.
    pub async fn purge_expired(&self, ttl: u64) -> Result<usize> {
        if ttl == 0 {
            return Ok(0);
        }
        self.store.purge_expired(now_ms().saturating_sub(ttl)).await
    }
}
