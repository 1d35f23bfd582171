//! Inter-call pacing for the registry's requests-per-minute ceiling.
//!
//! The ceiling is shared across the whole system, so a single [`Pacer`]
//! is owned by the one [`RegistryClient`](crate::client::RegistryClient)
//! and spaces out call *starts*: no delay before the first call, at
//! least `ceil(60_000 / rpm)` milliseconds between consecutive ones.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Minimum delay between call starts, in milliseconds.
pub fn min_delay_ms(requests_per_minute: u32) -> u64 {
    let rpm = u64::from(requests_per_minute.max(1));
    60_000u64.div_ceil(rpm)
}

/// Serializes callers and enforces the minimum inter-call delay.
pub struct Pacer {
    min_delay: Duration,
    next_allowed: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn from_rate(requests_per_minute: u32) -> Self {
        Self {
            min_delay: Duration::from_millis(min_delay_ms(requests_per_minute)),
            next_allowed: Mutex::new(None),
        }
    }

    /// Wait until the next call may be issued, then reserve the slot.
    pub async fn wait_turn(&self) {
        let mut next_allowed = self.next_allowed.lock().await;
        if let Some(at) = *next_allowed {
            tokio::time::sleep_until(at).await;
        }
        *next_allowed = Some(Instant::now() + self.min_delay);
    }
}
