//! Three-state circuit breaker: `Closed -> Open -> HalfOpen -> Closed`.
//!
//! Atomics carry the hot-path state; a mutex guards only the rare
//! last-failure timestamp update.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

impl From<CircuitState> for u8 {
    fn from(state: CircuitState) -> Self {
        match state {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

pub struct CircuitBreaker {
    threshold: u32,
    timeout: Duration,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    last_fail_time: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, timeout: Duration) -> Self {
        Self {
            threshold,
            timeout,
            state: AtomicU8::new(CircuitState::Closed.into()),
            consecutive_failures: AtomicU32::new(0),
            last_fail_time: Mutex::new(None),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state.load(Ordering::Acquire).into()
    }

    /// `ShouldAllow()`: transitions `Open -> HalfOpen` when the cooldown
    /// has elapsed, as a side effect of the check.
    pub fn should_allow(&self) -> bool {
        match self.state() {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = self.last_fail_time.lock().as_ref().map(|t| t.elapsed());
                if elapsed.map(|e| e > self.timeout).unwrap_or(false) {
                    self.state.store(CircuitState::HalfOpen.into(), Ordering::Release);
                    tracing::info!("circuit breaker cooldown elapsed, transitioning to half-open");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        if self.state() != CircuitState::Closed {
            tracing::info!("circuit breaker closed after success");
        }
        self.state.store(CircuitState::Closed.into(), Ordering::Release);
    }

    pub fn record_failure(&self) {
        match self.state() {
            CircuitState::HalfOpen => {
                self.trip();
            }
            CircuitState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.threshold {
                    self.trip();
                }
            }
            CircuitState::Open => {}
        }
    }

    fn trip(&self) {
        self.state.store(CircuitState::Open.into(), Ordering::Release);
        *self.last_fail_time.lock() = Some(Instant::now());
        tracing::warn!("circuit breaker tripped open");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_open_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_millis(50));
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.should_allow());
    }

    #[test]
    fn half_open_failure_reopens_and_restarts_timeout() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(20));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.should_allow());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn half_open_success_closes_and_resets_counter() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(15));
        assert!(breaker.should_allow());
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
