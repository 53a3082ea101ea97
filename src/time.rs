//! Cross-platform runtime helpers for native and WASM targets
//!
//! The sync and chat loops run as background tasks on both targets; these
//! shims keep the call sites identical.

use std::future::Future;

pub use std::time::Duration;

/// Sleep for a duration.
///
/// On native platforms, uses `tokio::time::sleep`.
/// On WASM, uses `gloo_timers::future::sleep`.
#[cfg(not(target_arch = "wasm32"))]
pub async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}

#[cfg(target_arch = "wasm32")]
pub async fn sleep(duration: Duration) {
    gloo_timers::future::sleep(duration).await;
}

/// Create an interval that ticks at the given duration.
#[cfg(not(target_arch = "wasm32"))]
pub fn interval(period: Duration) -> tokio::time::Interval {
    tokio::time::interval(period)
}

/// WASM-compatible interval
#[cfg(target_arch = "wasm32")]
pub struct Interval {
    period: Duration,
}

#[cfg(target_arch = "wasm32")]
impl Interval {
    pub async fn tick(&mut self) {
        gloo_timers::future::sleep(self.period).await;
    }
}

#[cfg(target_arch = "wasm32")]
pub fn interval(period: Duration) -> Interval {
    Interval { period }
}

/// Spawn a future to run in the background.
///
/// On native platforms, uses `tokio::spawn` (requires Send).
/// On WASM, uses `wasm_bindgen_futures::spawn_local` (no Send required).
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(future);
}

#[cfg(target_arch = "wasm32")]
pub fn spawn<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}
