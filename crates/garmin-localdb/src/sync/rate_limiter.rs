//! Request pacing for sequential metric fetches

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Consecutive 429s after which a sync should stop issuing requests
const PAUSE_THRESHOLD: u32 = 5;

#[derive(Debug)]
struct State {
    last_request: Option<Instant>,
    backoff: Duration,
    consecutive_429s: u32,
}

/// Minimum-delay limiter with exponential backoff on rate limiting.
///
/// Shared by reference between the metric source and the activities iterator,
/// so both collaborators draw from one request budget.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum delay between requests
    min_delay: Duration,
    /// Maximum backoff delay
    max_backoff: Duration,
    state: Mutex<State>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        // 2000ms = ~30 req/min
        Self::new(Duration::from_millis(2000), Duration::from_secs(300))
    }
}

impl RateLimiter {
    pub fn new(min_delay: Duration, max_backoff: Duration) -> Self {
        Self {
            min_delay,
            max_backoff,
            state: Mutex::new(State {
                last_request: None,
                backoff: Duration::ZERO,
                consecutive_429s: 0,
            }),
        }
    }

    /// A limiter that never waits (for testing)
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wait until the next request may be sent
    pub async fn wait(&self) {
        let delay = {
            let mut state = self.state();
            let required = self.min_delay + state.backoff;
            let delay = state
                .last_request
                .map(|last| required.saturating_sub(last.elapsed()))
                .unwrap_or(Duration::ZERO);
            state.last_request = Some(Instant::now() + delay);
            delay
        };

        if !delay.is_zero() {
            tracing::trace!(delay_ms = delay.as_millis() as u64, "Rate limiter sleeping");
            tokio::time::sleep(delay).await;
        }
    }

    /// Handle a successful request
    pub fn on_success(&self) {
        let mut state = self.state();
        state.backoff = Duration::ZERO;
        state.consecutive_429s = 0;
    }

    /// Handle a rate limit (HTTP 429) response
    pub fn on_rate_limit(&self) {
        let mut state = self.state();
        state.consecutive_429s += 1;
        state.backoff = (state.backoff * 2)
            .max(Duration::from_secs(1))
            .min(self.max_backoff);
        tracing::warn!(
            backoff_secs = state.backoff.as_secs(),
            consecutive = state.consecutive_429s,
            "Rate limited by Garmin API"
        );
    }

    /// Check if we should stop due to repeated rate limits
    pub fn should_pause(&self) -> bool {
        self.state().consecutive_429s >= PAUSE_THRESHOLD
    }

    pub fn current_backoff(&self) -> Duration {
        self.state().backoff
    }
}
