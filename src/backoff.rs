//! Reconnect delay policy.
//!
//! The event stream worker never gives up on the daemon; it sleeps between
//! reconnect attempts according to a [`BackoffPolicy`], honoring the server's
//! SSE `retry:` hint when one was received.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Policy controlling exponential reconnect backoff.
#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    /// Delay used before the first reconnect attempt.
    pub initial: Duration,
    /// Upper bound for exponential delay growth.
    pub max: Duration,
    /// Maximum random jitter added to each delay.
    pub jitter: Duration,
}

impl BackoffPolicy {
    /// Returns a default tuned for a localhost daemon: fast first retry,
    /// bounded at two seconds.
    pub fn local_daemon() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(2),
            jitter: Duration::from_millis(25),
        }
    }

    /// Computes the base delay before the given reconnect attempt.
    ///
    /// `attempt` is 1-based and resets to 1 after every successful connect.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let mut delay = self.initial;
        for _ in 1..attempt {
            delay = std::cmp::min(delay.saturating_mul(2), self.max);
        }
        delay + jitter_duration(self.jitter, attempt)
    }

    /// Computes the reconnect delay, letting a server `retry:` hint replace
    /// the computed base delay when present.
    pub fn reconnect_delay(&self, attempt: usize, server_hint: Option<Duration>) -> Duration {
        match server_hint {
            Some(hint) => hint + jitter_duration(self.jitter, attempt),
            None => self.delay_for_attempt(attempt),
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::local_daemon()
    }
}

fn jitter_duration(max_jitter: Duration, attempt: usize) -> Duration {
    if max_jitter.is_zero() {
        return Duration::ZERO;
    }

    let limit_nanos = max_jitter.as_nanos().min(u64::MAX as u128) as u64;
    if limit_nanos == 0 {
        return Duration::ZERO;
    }

    let now_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    let mixed = now_nanos ^ ((attempt as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    Duration::from_nanos(mixed % (limit_nanos + 1))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::BackoffPolicy;

    fn no_jitter(initial_ms: u64, max_ms: u64) -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_millis(initial_ms),
            max: Duration::from_millis(max_ms),
            jitter: Duration::ZERO,
        }
    }

    #[test]
    fn delay_grows_exponentially_until_capped() {
        let policy = no_jitter(100, 400);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(400));
    }

    #[test]
    fn server_hint_replaces_computed_delay() {
        let policy = no_jitter(100, 400);
        let delay = policy.reconnect_delay(3, Some(Duration::from_millis(50)));
        assert_eq!(delay, Duration::from_millis(50));
    }

    #[test]
    fn missing_hint_falls_back_to_policy() {
        let policy = no_jitter(100, 400);
        assert_eq!(policy.reconnect_delay(2, None), Duration::from_millis(200));
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy = BackoffPolicy {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(10),
            jitter: Duration::from_millis(5),
        };
        for attempt in 1..=8 {
            let delay = policy.delay_for_attempt(attempt);
            assert!(delay >= Duration::from_millis(10));
            assert!(delay <= Duration::from_millis(15));
        }
    }
}
