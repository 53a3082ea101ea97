//! Error types for battle-arena

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("Invalid room configuration: {0}")]
    InvalidConfig(String),

    #[error("Room not found")]
    RoomNotFound,

    #[error("Room is not open for joining")]
    RoomNotJoinable,

    #[error("Room is full")]
    RoomFull,

    #[error("Room expired")]
    RoomExpired,

    #[error("Not a participant of this room")]
    NotAParticipant,

    #[error("Not authorized: {0}")]
    Forbidden(String),

    #[error("Not all participants are ready")]
    NotReady,

    #[error("Room has already started")]
    AlreadyStarted,

    #[error("Room is not active")]
    NotActive,

    #[error("Room cannot be deleted")]
    RoomNotDeletable,

    #[error("Network unavailable")]
    NetworkUnavailable,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ArenaError>;
