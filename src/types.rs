//! Type definitions for battle-arena

use serde::{Deserialize, Serialize};

/// Room codes are 6 characters from this alphabet, always uppercase.
pub const ROOM_CODE_LEN: usize = 6;
const ROOM_CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Room lifecycle status. Transitions are monotonic: `Waiting -> Active ->
/// Completed`, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    #[default]
    Waiting,
    Active,
    Completed,
}

impl RoomStatus {
    /// Whether `next` is a legal transition from `self`.
    pub fn can_transition_to(self, next: RoomStatus) -> bool {
        matches!(
            (self, next),
            (RoomStatus::Waiting, RoomStatus::Active)
                | (RoomStatus::Active, RoomStatus::Completed)
        )
    }
}

/// How the contest problem is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProblemMode {
    /// One problem is picked from the catalog when the room starts.
    #[default]
    Random,
    /// The problem is fixed at creation time.
    Single,
}

/// Opaque problem identifier resolved by the problem catalog.
pub type ProblemId = u64;

/// Already-authenticated user facts supplied by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
        }
    }
}

/// Room settings fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Capacity, 1 to 4.
    pub max_participants: usize,
    pub mode: ProblemMode,
    /// Required for `Single` mode, ignored for `Random`.
    pub problem_id: Option<ProblemId>,
    /// Private rooms are hidden from discovery but joinable by code.
    pub is_private: bool,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_participants: 4,
            mode: ProblemMode::Random,
            problem_id: None,
            is_private: false,
        }
    }
}

impl RoomConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_participants(mut self, n: usize) -> Self {
        self.max_participants = n;
        self
    }

    /// Fix the contest problem up front.
    pub fn single_problem(mut self, problem_id: ProblemId) -> Self {
        self.mode = ProblemMode::Single;
        self.problem_id = Some(problem_id);
        self
    }

    pub fn private(mut self, is_private: bool) -> Self {
        self.is_private = is_private;
        self
    }
}

/// Client session tuning. All intervals are in milliseconds.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Poll reconciler interval (default: 3000).
    pub poll_interval: u64,
    /// Contest clock tick (default: 1000).
    pub clock_tick: u64,
    /// Chat reconnect delay (default: 5000).
    pub chat_retry: u64,
    /// Window within which an echoed chat message counts as the same send
    /// (default: 1000).
    pub chat_dedup_window: u64,
    /// Room expiry in ms, 0 = never (default: 4_500_000, 75 minutes).
    pub room_ttl: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: 3000,
            clock_tick: 1000,
            chat_retry: 5000,
            chat_dedup_window: 1000,
            room_ttl: 75 * 60 * 1000,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval = ms;
        self
    }

    pub fn clock_tick(mut self, ms: u64) -> Self {
        self.clock_tick = ms;
        self
    }

    pub fn chat_retry(mut self, ms: u64) -> Self {
        self.chat_retry = ms;
        self
    }

    pub fn chat_dedup_window(mut self, ms: u64) -> Self {
        self.chat_dedup_window = ms;
        self
    }

    pub fn room_ttl(mut self, ms: u64) -> Self {
        self.room_ttl = ms;
        self
    }
}

/// Authoritative room record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    /// 6-character uppercase code, immutable once created.
    pub id: String,
    pub created_by: String,
    pub max_participants: usize,
    pub mode: ProblemMode,
    /// Set at creation for `Single` rooms, recorded by start arbitration for
    /// `Random` rooms, immutable afterwards.
    pub problem_id: Option<ProblemId>,
    pub status: RoomStatus,
    pub is_private: bool,
    pub created_at: u64,
    /// Set exactly once on activation; the authoritative origin for the
    /// contest clock.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<String>,
}

/// A user's membership record within a room. Leaving is a soft removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: String,
    /// Denormalized at join time for display.
    pub username: String,
    pub is_ready: bool,
    pub joined_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_at: Option<u64>,
}

impl Participant {
    pub fn new(identity: &Identity, joined_at: u64) -> Self {
        Self {
            user_id: identity.user_id.clone(),
            username: identity.username.clone(),
            is_ready: false,
            joined_at,
            left_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.left_at.is_none()
    }
}

/// Full room state as returned by every re-fetch: the room plus its active
/// participants. Applied by whole replacement, never merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room: Room,
    pub participants: Vec<Participant>,
}

impl RoomSnapshot {
    /// Start precondition: at least one participant and everyone ready.
    pub fn all_ready(&self) -> bool {
        !self.participants.is_empty() && self.participants.iter().all(|p| p.is_ready)
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p.user_id == user_id)
    }
}

/// Room info for discovery listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: String,
    pub status: RoomStatus,
    pub created_by: String,
    pub mode: ProblemMode,
    pub participant_count: usize,
    pub max_participants: usize,
    pub created_at: u64,
}

/// Push hints emitted by the store after each write. A hint identifies what
/// changed but is never applied as state; receivers re-fetch instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RoomEvent {
    RoomChanged { room_id: String },
    ParticipantChanged { room_id: String },
    StatusChanged { room_id: String, status: RoomStatus },
    RoomDeleted { room_id: String },
}

/// One chat message within a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub room_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl ChatMessage {
    /// Whether `other` is an echo of the same send: same sender name, same
    /// content, timestamps within `window` ms of each other.
    pub fn is_same_send(&self, other: &ChatMessage, window: u64) -> bool {
        self.sender_name == other.sender_name
            && self.content == other.content
            && self.timestamp.abs_diff(other.timestamp) < window
    }
}

/// Generate a room code (6 chars, A-Z0-9).
pub fn generate_room_code() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_CHARS[rng.gen_range(0..ROOM_CODE_CHARS.len())] as char)
        .collect()
}

/// Uppercase a user-entered room code, stripping anything that is not
/// alphanumeric. Returns `None` unless exactly 6 characters remain.
pub fn normalize_room_code(input: &str) -> Option<String> {
    let code: String = input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    (code.len() == ROOM_CODE_LEN).then_some(code)
}

/// Current time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}
