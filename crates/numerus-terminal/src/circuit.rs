// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! Spawn circuit breaker (`spec.md` §4.3 "Circuit breaker": repeated spawn
//! failures (≥K within T seconds) open the breaker for a cool-down
//! interval, during which `spawn` fails fast with `ErrSpawnCircuitOpen`).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use numerus_core::Clock;
use parking_lot::Mutex;

/// Failures within this window open the breaker.
pub const DEFAULT_FAILURE_THRESHOLD: usize = 3;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

struct State {
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
}

/// Tracks recent spawn failures and opens a cool-down window once the
/// threshold is exceeded. Generic over [`Clock`] so tests can drive time
/// deterministically with [`numerus_core::FakeClock`].
pub struct CircuitBreaker<C: Clock> {
    clock: C,
    threshold: usize,
    window: Duration,
    cooldown: Duration,
    state: Mutex<State>,
}

impl<C: Clock> CircuitBreaker<C> {
    pub fn new(clock: C, threshold: usize, window: Duration, cooldown: Duration) -> Self {
        Self { clock, threshold, window, cooldown, state: Mutex::new(State { failures: VecDeque::new(), opened_at: None }) }
    }

    pub fn with_defaults(clock: C) -> Self {
        Self::new(clock, DEFAULT_FAILURE_THRESHOLD, DEFAULT_WINDOW, DEFAULT_COOLDOWN)
    }

    /// Whether the breaker currently rejects spawns. Clears the open state
    /// once the cooldown has elapsed.
    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock();
        if let Some(opened_at) = state.opened_at {
            if self.clock.now().duration_since(opened_at) >= self.cooldown {
                state.opened_at = None;
                state.failures.clear();
                false
            } else {
                true
            }
        } else {
            false
        }
    }

    /// Record a spawn failure, opening the breaker if the threshold within
    /// the window is now exceeded.
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.failures.push_back(now);
        while let Some(&front) = state.failures.front() {
            if now.duration_since(front) > self.window {
                state.failures.pop_front();
            } else {
                break;
            }
        }
        if state.failures.len() >= self.threshold {
            state.opened_at = Some(now);
        }
    }

    /// Record a spawn success, resetting the failure history.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        state.failures.clear();
        state.opened_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use numerus_core::FakeClock;

    #[test]
    fn opens_after_threshold_failures_within_window() {
        let clock = FakeClock::new();
        let breaker = CircuitBreaker::new(clock.clone(), 3, Duration::from_secs(60), Duration::from_secs(30));
        assert!(!breaker.is_open());
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open());
        breaker.record_failure();
        assert!(breaker.is_open());
    }

    #[test]
    fn closes_after_cooldown_elapses() {
        let clock = FakeClock::new();
        let breaker = CircuitBreaker::new(clock.clone(), 2, Duration::from_secs(60), Duration::from_secs(30));
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.is_open());
        clock.advance(Duration::from_secs(31));
        assert!(!breaker.is_open());
    }

    #[test]
    fn failures_outside_the_window_do_not_count() {
        let clock = FakeClock::new();
        let breaker = CircuitBreaker::new(clock.clone(), 2, Duration::from_secs(10), Duration::from_secs(30));
        breaker.record_failure();
        clock.advance(Duration::from_secs(11));
        breaker.record_failure();
        assert!(!breaker.is_open(), "first failure should have aged out of the window");
    }

    #[test]
    fn success_resets_failure_history() {
        let clock = FakeClock::new();
        let breaker = CircuitBreaker::new(clock.clone(), 2, Duration::from_secs(60), Duration::from_secs(30));
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert!(!breaker.is_open());
    }
}
