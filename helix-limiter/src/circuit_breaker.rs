//! Circuit breaker (§4.H): `closed → open → half-open` state machine
//! protecting one adapter from a sustained failure run.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, cooldown: Duration::from_secs(30) }
    }
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// True once the single half-open probe has been handed out, so a
    /// second concurrent caller doesn't also get waved through.
    half_open_probe_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            half_open_probe_in_flight: false,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Whether a call is allowed to proceed right now. Transitions
    /// `open → half-open` on cooldown expiry as a side effect.
    pub fn allow(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = self.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.config.cooldown {
                    self.state = CircuitState::HalfOpen;
                    self.half_open_probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if self.half_open_probe_in_flight {
                    false
                } else {
                    self.half_open_probe_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn on_success(&mut self) {
        self.consecutive_failures = 0;
        self.state = CircuitState::Closed;
        self.opened_at = None;
        self.half_open_probe_in_flight = false;
    }

    pub fn on_failure(&mut self) {
        self.half_open_probe_in_flight = false;
        if self.state == CircuitState::HalfOpen {
            self.trip();
            return;
        }
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.config.failure_threshold {
            self.trip();
        }
    }

    fn trip(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_then_half_opens_after_cooldown() {
        let mut cb = CircuitBreaker::new(CircuitBreakerConfig { failure_threshold: 2, cooldown: Duration::from_millis(10) });
        assert!(cb.allow());
        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow());

        std::thread::sleep(Duration::from_millis(15));
        assert!(cb.allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(!cb.allow()); // second concurrent caller gets refused
    }

    #[test]
    fn half_open_success_closes_circuit() {
        let mut cb = CircuitBreaker::new(CircuitBreakerConfig { failure_threshold: 1, cooldown: Duration::from_millis(1) });
        cb.on_failure();
        std::thread::sleep(Duration::from_millis(5));
        assert!(cb.allow());
        cb.on_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let mut cb = CircuitBreaker::new(CircuitBreakerConfig { failure_threshold: 1, cooldown: Duration::from_millis(1) });
        cb.on_failure();
        std::thread::sleep(Duration::from_millis(5));
        assert!(cb.allow());
        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
