//! Reconnect backoff (§4.4): exponential with jitter, reset after a stable
//! connection.

use rand::Rng;
use std::time::{Duration, Instant};

const INITIAL: Duration = Duration::from_secs(1);
const CAP: Duration = Duration::from_secs(600);
const JITTER: f64 = 0.2;
const STABLE_AFTER: Duration = Duration::from_secs(60);

/// Tracks the delay before the next reconnect attempt.
#[derive(Debug)]
pub struct Backoff {
    next: Duration,
    connected_at: Option<Instant>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            next: INITIAL,
            connected_at: None,
        }
    }
}

impl Backoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the connection as established; starts the stability timer.
    pub fn mark_connected(&mut self, now: Instant) {
        self.connected_at = Some(now);
    }

    /// Mark the connection as dropped. Resets the delay to the initial value
    /// if it had been connected for at least `STABLE_AFTER`; otherwise keeps
    /// doubling from where it left off.
    pub fn mark_disconnected(&mut self, now: Instant) {
        let was_stable = self
            .connected_at
            .is_some_and(|since| now.duration_since(since) >= STABLE_AFTER);
        self.connected_at = None;
        if was_stable {
            self.next = INITIAL;
        }
    }

    /// The delay to wait before the next dial attempt, with ±20% jitter.
    /// Advances the internal doubling counter for next time.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.next;
        self.next = (self.next * 2).min(CAP);

        let jitter_range = base.as_secs_f64() * JITTER;
        let offset = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
        let secs = (base.as_secs_f64() + offset).max(0.0);
        Duration::from_secs_f64(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_up_to_cap() {
        let mut backoff = Backoff::new();
        let mut prev = Duration::ZERO;
        for _ in 0..20 {
            let delay = backoff.next_delay();
            assert!(delay <= CAP + Duration::from_secs(1));
            prev = delay;
        }
        assert!(prev >= CAP - Duration::from_secs((CAP.as_secs() as f64 * JITTER) as u64 + 1));
    }

    #[test]
    fn jitter_stays_within_twenty_percent() {
        let mut backoff = Backoff::new();
        for _ in 0..10 {
            backoff.next = Duration::from_secs(10);
            let delay = backoff.next_delay();
            assert!(delay.as_secs_f64() >= 8.0 && delay.as_secs_f64() <= 12.0);
        }
    }

    #[test]
    fn resets_after_stable_connection() {
        let mut backoff = Backoff::new();
        let t0 = Instant::now();
        let _ = backoff.next_delay();
        let _ = backoff.next_delay();
        assert!(backoff.next > INITIAL);

        backoff.mark_connected(t0);
        let t1 = t0 + STABLE_AFTER;
        backoff.mark_disconnected(t1);
        assert_eq!(backoff.next, INITIAL);
    }

    #[test]
    fn does_not_reset_on_short_lived_connection() {
        let mut backoff = Backoff::new();
        let _ = backoff.next_delay();
        let bumped = backoff.next;
        let t0 = Instant::now();
        backoff.mark_connected(t0);
        backoff.mark_disconnected(t0 + Duration::from_secs(5));
        assert_eq!(backoff.next, bumped);
    }
}
