//! Circuit phases and the mutable state guarded by [`CircuitBreaker`](super::CircuitBreaker).

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::CircuitConfig;

/// Phase of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitPhase {
    /// Normal operation; every call is permitted.
    Closed,
    /// Failing; calls are rejected until `open_until`.
    Open,
    /// Trial period; calls are permitted and watched closely.
    HalfOpen,
}

impl CircuitPhase {
    pub fn as_label(&self) -> &'static str {
        match self {
            CircuitPhase::Closed => "closed",
            CircuitPhase::Open => "open",
            CircuitPhase::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Snapshot of one circuit.
///
/// ### Invariants
/// - `phase == Open` implies `open_until.is_some()`
/// - counters only change through the breaker's transition rules
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitState {
    pub phase: CircuitPhase,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub open_until: Option<Instant>,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_duration: Duration,
}

impl CircuitState {
    /// Initial Closed state. Thresholds below 1 are raised to 1.
    pub fn new(cfg: &CircuitConfig) -> Self {
        Self {
            phase: CircuitPhase::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            open_until: None,
            failure_threshold: cfg.failure_threshold.max(1),
            success_threshold: cfg.success_threshold.max(1),
            open_duration: cfg.open_duration,
        }
    }

    /// Moves to Open with a fresh window starting at `now`.
    pub(super) fn trip(&mut self, now: Instant) {
        self.phase = CircuitPhase::Open;
        self.consecutive_successes = 0;
        self.open_until = Some(now + self.open_duration);
    }

    pub(super) fn half_open(&mut self) {
        self.phase = CircuitPhase::HalfOpen;
        self.consecutive_successes = 0;
    }

    pub(super) fn close(&mut self) {
        self.phase = CircuitPhase::Closed;
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;
        self.open_until = None;
    }

    /// `true` once an Open circuit's window has elapsed at `now`.
    pub fn window_elapsed(&self, now: Instant) -> bool {
        match self.open_until {
            Some(until) => now >= until,
            None => true,
        }
    }
}
