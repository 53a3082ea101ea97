//! Contest clock derived from the authoritative start instant
//!
//! Every client shows the same elapsed time without a shared tick: the
//! clock is a pure function of `started_at` and the local wall clock,
//! recomputed on a local interval. No network message is needed to keep it
//! advancing.

use crate::time::{interval, spawn, Duration};
use crate::types::now_ms;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Milliseconds elapsed since `started_at`, clamped to zero for clients
/// whose wall clock trails the server's.
pub fn elapsed_ms(started_at: u64, now: u64) -> u64 {
    now.saturating_sub(started_at)
}

/// Format elapsed milliseconds as `HH:MM:SS`.
pub fn format_hms(elapsed: u64) -> String {
    let total_secs = elapsed / 1000;
    format!(
        "{:02}:{:02}:{:02}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60
    )
}

/// Elapsed-time state for one contest. Live until frozen; freezing pins the
/// display at the contest's end.
#[derive(Debug, Clone)]
pub struct ContestClock {
    started_at: u64,
    frozen_elapsed: Option<u64>,
}

impl ContestClock {
    pub fn new(started_at: u64) -> Self {
        Self {
            started_at,
            frozen_elapsed: None,
        }
    }

    /// Current elapsed ms: wall-clock derived while live, pinned once
    /// frozen.
    pub fn elapsed(&self) -> u64 {
        self.frozen_elapsed
            .unwrap_or_else(|| elapsed_ms(self.started_at, now_ms()))
    }

    /// `HH:MM:SS` display value.
    pub fn display(&self) -> String {
        format_hms(self.elapsed())
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen_elapsed.is_some()
    }

    /// Stop the clock. Pins at the server-reported end instant when one is
    /// supplied, otherwise at the value derived right now. Freezing twice
    /// keeps the first pin.
    pub fn freeze(&mut self, ended_at: Option<u64>) {
        if self.frozen_elapsed.is_none() {
            self.frozen_elapsed = Some(match ended_at {
                Some(end) => elapsed_ms(self.started_at, end),
                None => self.elapsed(),
            });
        }
    }
}

/// Spawn a ticker that sends the formatted clock on every tick. The task
/// ends when the receiver is dropped or one frozen value has been sent.
pub fn spawn_ticker(clock: Arc<RwLock<ContestClock>>, tick: Duration) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(8);
    spawn(async move {
        let mut ticker = interval(tick);
        loop {
            ticker.tick().await;
            let (display, frozen) = {
                let clock = clock.read().await;
                (clock.display(), clock.is_frozen())
            };
            if tx.send(display).await.is_err() {
                break;
            }
            if frozen {
                break;
            }
        }
    });
    rx
}
