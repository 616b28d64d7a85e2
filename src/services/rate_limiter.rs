use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

/// Enforces a minimum spacing between admitted calls. Shared by every caller
/// of one provider; does not order callers, only spaces them.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_slot: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits for the next free slot and returns the instant it was admitted at.
    pub async fn acquire(&self) -> Instant {
        let slot = {
            let mut last = self.last_slot.lock();
            let now = Instant::now();
            let slot = match *last {
                Some(previous) => now.max(previous + self.min_interval),
                None => now,
            };
            *last = Some(slot);
            slot
        };

        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "rate limiting");
        }
        sleep_until(slot).await;
        slot
    }
}
