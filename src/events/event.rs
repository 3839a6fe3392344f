//! # Runtime events emitted by the resilience components.
//!
//! The [`EventKind`] enum classifies event types across three groups:
//! - **Retry events**: attempts, scheduled backoffs, exhaustion
//! - **Circuit events**: phase transitions, rejections, recorded outcomes
//! - **Fallback / swarm events**: cache hits, fallback calls, subtask progress
//!
//! The [`Event`] struct carries metadata such as timestamps, the operation
//! name, attempt numbers, delays and categories.
//!
//! ## Ordering guarantees
//! Each event has a process-wide sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore order across receivers.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use resilvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RetryScheduled)
//!     .with_name("quotes")
//!     .with_attempt(2)
//!     .with_delay(Duration::from_millis(400));
//!
//! assert_eq!(ev.kind, EventKind::RetryScheduled);
//! assert_eq!(ev.name.as_deref(), Some("quotes"));
//! assert_eq!(ev.delay_ms, Some(400));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::circuit::CircuitPhase;
use crate::classify::ErrorCategory;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Retry events ===
    /// An attempt failed (transport or primary operation).
    ///
    /// Sets: `name`, `attempt`, `reason`, `category` (orchestrator), `status` (if any)
    AttemptFailed,

    /// Another attempt will run after `delay_ms`.
    ///
    /// Sets: `name`, `attempt` (the failed one), `delay_ms`, `reason`, `category`/`status`
    RetryScheduled,

    /// Every permitted attempt failed.
    ///
    /// Sets: `name`, `attempt` (total attempts), `reason` (last failure)
    RetriesExhausted,

    // === Circuit events ===
    /// Closed/HalfOpen → Open. Sets: `name`, `from`, `to`, `attempt` (consecutive failures)
    CircuitOpened,

    /// Open → HalfOpen after the open window elapsed. Sets: `name`, `from`, `to`
    CircuitHalfOpened,

    /// HalfOpen → Closed after enough trial successes. Sets: `name`, `from`, `to`
    CircuitClosed,

    /// A call was refused because the circuit is open. Sets: `name`
    CircuitRejected,

    /// `record_success` was called. Sets: `name`
    SuccessRecorded,

    /// `record_failure` was called. Sets: `name`, `attempt` (consecutive failures)
    FailureRecorded,

    // === Fallback events ===
    /// The fallback operation is being invoked. Sets: `name` (fallback)
    FallbackInvoked,

    /// A cached fallback value was returned. Sets: `name` (fallback)
    FallbackCacheHit,

    /// The fallback failed too. Sets: `name`, `reason`
    FallbackFailed,

    // === Swarm events ===
    /// A subtask acquired a worker slot. Sets: `name` (subtask id)
    SubtaskStarting,

    /// A subtask finished successfully. Sets: `name` (subtask id)
    SubtaskCompleted,

    /// A subtask failed. Sets: `name` (subtask id), `reason`
    SubtaskFailed,

    /// Every subtask of a swarm task is terminal. Sets: `name` (task id), `reason` (summary)
    SwarmCompleted,
}

/// Runtime event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: DateTime<Utc>,
    /// Event classification.
    pub kind: EventKind,

    /// Operation, circuit, subtask or swarm task name.
    pub name: Option<Arc<str>>,
    /// Attempt number (1-based) or counter, depending on kind.
    pub attempt: Option<u32>,
    /// Delay before the next attempt in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Human-readable reason (errors, summaries).
    pub reason: Option<Arc<str>>,
    /// Failure category, when classified.
    pub category: Option<ErrorCategory>,
    /// HTTP status, when relevant.
    pub status: Option<u16>,
    /// Circuit phase before a transition.
    pub from: Option<CircuitPhase>,
    /// Circuit phase after a transition.
    pub to: Option<CircuitPhase>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: Utc::now(),
            kind,
            name: None,
            attempt: None,
            delay_ms: None,
            reason: None,
            category: None,
            status: None,
            from: None,
            to: None,
        }
    }

    #[inline]
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds, saturating at `u32::MAX`).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }

    #[inline]
    pub fn with_status(mut self, status: Option<u16>) -> Self {
        self.status = status;
        self
    }

    /// Attaches both sides of a circuit transition.
    #[inline]
    pub fn with_transition(mut self, from: CircuitPhase, to: CircuitPhase) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    #[inline]
    pub fn is_circuit_transition(&self) -> bool {
        matches!(
            self.kind,
            EventKind::CircuitOpened | EventKind::CircuitHalfOpened | EventKind::CircuitClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new(EventKind::AttemptFailed);
        let b = Event::new(EventKind::AttemptFailed);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn delay_saturates() {
        let ev = Event::new(EventKind::RetryScheduled).with_delay(Duration::from_secs(u64::MAX));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }

    #[test]
    fn transition_helper() {
        let ev = Event::new(EventKind::CircuitOpened)
            .with_transition(CircuitPhase::Closed, CircuitPhase::Open);
        assert!(ev.is_circuit_transition());
        assert_eq!(ev.from, Some(CircuitPhase::Closed));
        assert_eq!(ev.to, Some(CircuitPhase::Open));
    }
}
