//! Three-state circuit breaker guarding downstream consumer delivery.
//!
//! Closed/open/half-open state machine built on `AtomicU32`/`AtomicU64`
//! counters for the failure count and trip timestamp: a single half-open
//! probe must succeed before the breaker fully recovers, rather than
//! returning to normal operation as soon as the cooldown elapses.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Gate around calls to the downstream log consumer.
///
/// - Closed: calls pass through. `failure_threshold` consecutive failures
///   trips it to Open.
/// - Open: calls are rejected outright until `open_duration` has elapsed
///   since the trip, at which point the next caller is let through as the
///   single half-open probe.
/// - HalfOpen: exactly one caller is in flight. Success closes the breaker
///   and resets the failure count; failure reopens it and restarts the
///   cooldown. Never more than one probe is in flight at a time.
pub struct CircuitBreaker {
    state: RwLock<BreakerState>,
    consecutive_failures: AtomicU32,
    tripped_at: AtomicU64,
    failure_threshold: u32,
    open_duration: Duration,
    enabled: bool,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        Self::new_with_enabled(failure_threshold, open_duration, true)
    }

    /// Build a breaker that, when `enabled` is false, always allows calls
    /// and never tracks outcomes — equivalent to a permanently closed
    /// breaker with delivery retries disabled.
    pub fn new_with_enabled(failure_threshold: u32, open_duration: Duration, enabled: bool) -> Self {
        Self {
            state: RwLock::new(BreakerState::Closed),
            consecutive_failures: AtomicU32::new(0),
            tripped_at: AtomicU64::new(0),
            failure_threshold,
            open_duration,
            enabled,
        }
    }

    pub fn default_thresholds() -> Self {
        Self::new(5, Duration::from_secs(60))
    }

    pub fn state(&self) -> BreakerState {
        *self.state.read()
    }

    /// Whether a call may proceed right now. If the breaker is Open but its
    /// cooldown has elapsed, this transitions it to HalfOpen and admits
    /// exactly the caller that observed the transition.
    pub fn allow(&self) -> bool {
        if !self.enabled {
            return true;
        }
        let current = *self.state.read();
        match current {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => false,
            BreakerState::Open => {
                let elapsed = now_unix().saturating_sub(self.tripped_at.load(Ordering::Acquire));
                if elapsed < self.open_duration.as_secs() {
                    return false;
                }
                let mut state = self.state.write();
                if *state == BreakerState::Open {
                    *state = BreakerState::HalfOpen;
                    true
                } else {
                    // Another caller already won the race to half-open.
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        if !self.enabled {
            return;
        }
        self.consecutive_failures.store(0, Ordering::Release);
        *self.state.write() = BreakerState::Closed;
    }

    pub fn record_failure(&self) {
        if !self.enabled {
            return;
        }
        let mut state = self.state.write();
        match *state {
            BreakerState::HalfOpen => {
                *state = BreakerState::Open;
                self.tripped_at.store(now_unix(), Ordering::Release);
            }
            BreakerState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.failure_threshold {
                    *state = BreakerState::Open;
                    self.tripped_at.store(now_unix(), Ordering::Release);
                }
            }
            BreakerState::Open => {
                // Already open; a failure here just means a stale caller
                // lost the half-open race. Nothing to do.
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_closed_and_allows_calls() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.allow());
    }

    #[test]
    fn trips_open_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow());
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn open_transitions_to_half_open_after_cooldown() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(0));
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(breaker.allow());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn half_open_rejects_a_second_concurrent_probe() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(0));
        breaker.record_failure();
        assert!(breaker.allow());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(!breaker.allow());
    }

    #[test]
    fn half_open_success_closes_breaker() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(0));
        breaker.record_failure();
        assert!(breaker.allow());
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.allow());
    }

    #[test]
    fn half_open_failure_reopens_breaker() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(0));
        breaker.record_failure();
        assert!(breaker.allow());
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn disabled_breaker_always_allows_and_ignores_outcomes() {
        let breaker = CircuitBreaker::new_with_enabled(1, Duration::from_secs(60), false);
        for _ in 0..10 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.allow());
    }
}
