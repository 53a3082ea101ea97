//! # battle-arena
//!
//! Real-time multiplayer coding battle rooms: lobby, start arbitration and
//! dual-channel sync.
//!
//! ## Features
//!
//! - **Rooms**: 6-character codes, capacity 1-4, public discovery or
//!   private join-by-code
//! - **Readiness + start arbitration**: the creator starts the contest
//!   exactly once, all participants ready
//! - **Dual-channel sync**: push events as re-fetch hints plus an
//!   unconditional poll, converging on the authoritative store
//! - **Contest clock**: `HH:MM:SS` derived from one start instant, no
//!   server tick
//! - **Room chat**: optimistic send with echo dedup and
//!   reconnect-with-backoff
//!
//! ## Example
//!
//! ```rust,ignore
//! use battle_arena::{
//!     ChatChannel, Identity, MemoryBackend, RoomConfig, RoomService,
//!     RoomSession, SessionConfig, SessionEvent, StaticCatalog,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = Arc::new(MemoryBackend::new());
//!     let catalog = Arc::new(StaticCatalog::new(problems()));
//!     let rooms = RoomService::new(backend.clone(), catalog);
//!
//!     let alice = Identity::new("alice-id", "alice");
//!     let lobby = rooms.create_room(&alice, RoomConfig::new().max_participants(2)).await?;
//!     println!("Share this code: {}", lobby.room.id);
//!
//!     let session = RoomSession::new(backend.clone(), SessionConfig::default());
//!     session.open(&lobby.room.id).await?;
//!
//!     while let Some(event) = session.recv().await {
//!         match event {
//!             SessionEvent::ParticipantJoined(p) => println!("{} joined", p.username),
//!             SessionEvent::AllReady => {
//!                 let problem = rooms.start_room(&lobby.room.id, &alice.user_id).await?;
//!                 println!("Contest on problem {}", problem);
//!             }
//!             SessionEvent::ContestStarted { problem_id, .. } => break,
//!             _ => {}
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod chat;
pub mod clock;
pub mod error;
pub mod rooms;
pub mod session;
pub mod store;
pub mod time;
pub mod types;


pub use catalog::{Difficulty, ProblemCatalog, ProblemInfo, StaticCatalog};
pub use chat::{ChatChannel, ChatEvent, ChatState};
pub use clock::{ContestClock, elapsed_ms, format_hms, spawn_ticker};
pub use error::{ArenaError, Result};
pub use rooms::RoomService;
pub use session::{RoomSession, SessionEvent};
pub use store::{ChatBroker, MemoryBackend, RoomStore};
pub use types::*;
