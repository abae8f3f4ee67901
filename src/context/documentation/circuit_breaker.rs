//! Circuit breaker guarding calls to the documentation service

use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    /// Calls are rejected until the reset timeout elapses
    Open,
    /// One trial call is let through; the rest are rejected until it settles
    HalfOpen,
}

#[derive(Debug, Clone)]
struct Circuit {
    state: BreakerState,
    consecutive_failures: usize,
    opened_at: Option<Instant>,
    /// When the half-open trial call was admitted
    trial_started: Option<Instant>,
}

impl Default for Circuit {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            trial_started: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    pub failure_threshold: usize,
    pub reset_timeout: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Per-operation breaker. A zero threshold never opens.
pub struct CircuitBreaker {
    circuits: DashMap<String, Circuit>,
    settings: BreakerSettings,
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            circuits: DashMap::new(),
            settings,
        }
    }

    /// Whether calls for `operation` should be rejected right now.
    ///
    /// An open circuit past its reset timeout moves to half-open and admits
    /// the caller as its single trial. A trial that never reports back is
    /// replaced once another reset timeout has passed.
    pub fn is_open(&self, operation: &str) -> bool {
        let Some(mut circuit) = self.circuits.get_mut(operation) else {
            return false;
        };
        let reset_timeout = self.settings.reset_timeout;
        let elapsed = |at: Option<Instant>| at.map_or(true, |at| at.elapsed() >= reset_timeout);

        match circuit.state {
            BreakerState::Closed => false,
            BreakerState::HalfOpen => {
                if elapsed(circuit.trial_started) {
                    circuit.trial_started = Some(Instant::now());
                    false
                } else {
                    true
                }
            }
            BreakerState::Open => {
                if elapsed(circuit.opened_at) {
                    circuit.state = BreakerState::HalfOpen;
                    circuit.trial_started = Some(Instant::now());
                    false
                } else {
                    true
                }
            }
        }
    }

    pub fn mark_success(&self, operation: &str) {
        self.circuits.remove(operation);
    }

    pub fn mark_failure(&self, operation: &str) {
        if self.settings.failure_threshold == 0 {
            return;
        }
        let mut circuit = self.circuits.entry(operation.to_string()).or_default();
        circuit.consecutive_failures += 1;
        let trip = circuit.state == BreakerState::HalfOpen
            || circuit.consecutive_failures >= self.settings.failure_threshold;
        if trip {
            circuit.state = BreakerState::Open;
            circuit.opened_at = Some(Instant::now());
            circuit.trial_started = None;
        }
    }

    pub fn state(&self, operation: &str) -> BreakerState {
        self.circuits
            .get(operation)
            .map_or(BreakerState::Closed, |c| c.state)
    }

    pub fn failure_count(&self, operation: &str) -> usize {
        self.circuits
            .get(operation)
            .map_or(0, |c| c.consecutive_failures)
    }
}
