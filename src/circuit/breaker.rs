//! # CircuitBreaker: three-state fault isolation for one logical operation.
//!
//! ## Transitions
//! ```text
//!            failures >= failure_threshold
//!   Closed ─────────────────────────────────► Open { open_until = now + open_duration }
//!     ▲                                         │
//!     │ successes >= success_threshold          │ can_execute() with now >= open_until
//!     │                                         ▼
//!     └──────────────────────────────────── HalfOpen
//!                                               │ any failure
//!                                               └──────────► Open (fresh window)
//! ```
//!
//! ## Rules
//! - Open → HalfOpen happens **on inspection** (`can_execute`), never on a timer.
//! - Every read-modify-write happens under one mutex; concurrent reporters
//!   cannot lose a transition.
//! - Each transition is logged and published with its `from`/`to` phases.
//! - A success while Closed resets the consecutive-failure counter.
//! - Outcomes reported while Open (calls admitted before the trip) do not
//!   move the circuit; failures still count.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::circuit::state::{CircuitPhase, CircuitState};
use crate::config::CircuitConfig;
use crate::events::{Bus, Event, EventKind};

/// Circuit breaker shared by every caller of one logical operation.
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use resilvisor::{CircuitBreaker, CircuitConfig, CircuitPhase};
///
/// let breaker = CircuitBreaker::new("quotes", CircuitConfig {
///     failure_threshold: 2,
///     success_threshold: 1,
///     open_duration: Duration::from_secs(30),
/// });
///
/// breaker.record_failure();
/// assert!(breaker.can_execute());
/// breaker.record_failure();
/// assert_eq!(breaker.phase(), CircuitPhase::Open);
/// assert!(!breaker.can_execute());
/// ```
pub struct CircuitBreaker {
    name: Arc<str>,
    state: Mutex<CircuitState>,
    bus: Bus,
}

impl CircuitBreaker {
    /// Creates a Closed breaker publishing to a private bus.
    pub fn new(name: impl Into<Arc<str>>, cfg: CircuitConfig) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(CircuitState::new(&cfg)),
            bus: Bus::default(),
        }
    }

    /// Publishes events to `bus` instead of the private one.
    #[must_use]
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = bus;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Current phase as stored (an elapsed Open window still reads `Open`
    /// until the next [`can_execute`](Self::can_execute)).
    pub fn phase(&self) -> CircuitPhase {
        self.state.lock().phase
    }

    /// Copy of the full state.
    pub fn snapshot(&self) -> CircuitState {
        self.state.lock().clone()
    }

    /// Whether a call may run now.
    ///
    /// An Open circuit whose window has elapsed moves to HalfOpen and answers `true`.
    pub fn can_execute(&self) -> bool {
        let now = Instant::now();
        let mut st = self.state.lock();
        let phase = st.phase;
        match phase {
            CircuitPhase::Closed | CircuitPhase::HalfOpen => true,
            CircuitPhase::Open if st.window_elapsed(now) => {
                st.half_open();
                drop(st);
                self.transition(CircuitPhase::Open, CircuitPhase::HalfOpen, 0);
                true
            }
            CircuitPhase::Open => {
                drop(st);
                self.bus
                    .publish(Event::new(EventKind::CircuitRejected).with_name(self.name.clone()));
                false
            }
        }
    }

    /// Reports a successful call.
    pub fn record_success(&self) {
        let closed = {
            let mut st = self.state.lock();
            match st.phase {
                CircuitPhase::Closed => {
                    st.consecutive_failures = 0;
                    false
                }
                CircuitPhase::HalfOpen => {
                    st.consecutive_successes += 1;
                    if st.consecutive_successes >= st.success_threshold {
                        st.close();
                        true
                    } else {
                        false
                    }
                }
                CircuitPhase::Open => false,
            }
        };

        self.bus
            .publish(Event::new(EventKind::SuccessRecorded).with_name(self.name.clone()));
        if closed {
            self.transition(CircuitPhase::HalfOpen, CircuitPhase::Closed, 0);
        }
    }

    /// Reports a failed call.
    pub fn record_failure(&self) {
        let now = Instant::now();
        let (tripped_from, failures) = {
            let mut st = self.state.lock();
            st.consecutive_failures = st.consecutive_failures.saturating_add(1);
            st.consecutive_successes = 0;
            let from = match st.phase {
                CircuitPhase::HalfOpen => {
                    st.trip(now);
                    Some(CircuitPhase::HalfOpen)
                }
                CircuitPhase::Closed if st.consecutive_failures >= st.failure_threshold => {
                    st.trip(now);
                    Some(CircuitPhase::Closed)
                }
                _ => None,
            };
            (from, st.consecutive_failures)
        };

        self.bus.publish(
            Event::new(EventKind::FailureRecorded)
                .with_name(self.name.clone())
                .with_attempt(failures),
        );
        if let Some(from) = tripped_from {
            self.transition(from, CircuitPhase::Open, failures);
        }
    }

    fn transition(&self, from: CircuitPhase, to: CircuitPhase, failures: u32) {
        let kind = match to {
            CircuitPhase::Open => {
                tracing::warn!(circuit = %self.name, %from, %to, failures, "circuit opened");
                EventKind::CircuitOpened
            }
            CircuitPhase::HalfOpen => {
                tracing::info!(circuit = %self.name, %from, %to, "circuit half-open, allowing trial calls");
                EventKind::CircuitHalfOpened
            }
            CircuitPhase::Closed => {
                tracing::info!(circuit = %self.name, %from, %to, "circuit closed (recovered)");
                EventKind::CircuitClosed
            }
        };

        let mut ev = Event::new(kind)
            .with_name(self.name.clone())
            .with_transition(from, to);
        if failures > 0 {
            ev = ev.with_attempt(failures);
        }
        self.bus.publish(ev);
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        CircuitBreaker::new("default", CircuitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn breaker(failures: u32, successes: u32, open_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitConfig {
                failure_threshold: failures,
                success_threshold: successes,
                open_duration: Duration::from_secs(open_secs),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn three_failures_open_the_circuit() {
        let cb = breaker(3, 2, 10);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.phase(), CircuitPhase::Closed);
        cb.record_failure();

        let st = cb.snapshot();
        assert_eq!(st.phase, CircuitPhase::Open);
        assert!(st.open_until.is_some());
        assert!(!cb.can_execute());
    }

    #[tokio::test(start_paused = true)]
    async fn open_moves_to_half_open_on_inspection_after_window() {
        let cb = breaker(3, 2, 10);
        for _ in 0..3 {
            cb.record_failure();
        }
        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!cb.can_execute());
        assert_eq!(cb.phase(), CircuitPhase::Open);

        tokio::time::advance(Duration::from_secs(1)).await;
        // Still Open until someone looks.
        assert_eq!(cb.phase(), CircuitPhase::Open);
        assert!(cb.can_execute());
        let st = cb.snapshot();
        assert_eq!(st.phase, CircuitPhase::HalfOpen);
        assert_eq!(st.consecutive_successes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_closes_after_success_threshold() {
        let cb = breaker(3, 2, 10);
        for _ in 0..3 {
            cb.record_failure();
        }
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(cb.can_execute());

        cb.record_success();
        assert_eq!(cb.phase(), CircuitPhase::HalfOpen);
        cb.record_success();

        let st = cb.snapshot();
        assert_eq!(st.phase, CircuitPhase::Closed);
        assert_eq!(st.consecutive_failures, 0);
        assert_eq!(st.open_until, None);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_in_half_open_reopens_with_fresh_window() {
        let cb = breaker(3, 2, 10);
        for _ in 0..3 {
            cb.record_failure();
        }
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(cb.can_execute());
        cb.record_success();

        let before = Instant::now();
        cb.record_failure();
        let st = cb.snapshot();
        assert_eq!(st.phase, CircuitPhase::Open);
        assert_eq!(st.open_until, Some(before + Duration::from_secs(10)));
        assert!(!cb.can_execute());
    }

    #[tokio::test(start_paused = true)]
    async fn success_while_closed_resets_failures() {
        let cb = breaker(3, 1, 10);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.phase(), CircuitPhase::Closed);
        assert_eq!(cb.snapshot().consecutive_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transitions_are_published() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let cb = breaker(1, 1, 5).with_bus(bus);

        cb.record_failure();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(cb.can_execute());
        cb.record_success();

        let mut transitions = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if ev.is_circuit_transition() {
                transitions.push((ev.from.unwrap(), ev.to.unwrap()));
            }
        }
        assert_eq!(
            transitions,
            vec![
                (CircuitPhase::Closed, CircuitPhase::Open),
                (CircuitPhase::Open, CircuitPhase::HalfOpen),
                (CircuitPhase::HalfOpen, CircuitPhase::Closed),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_failures_trip_exactly_once() {
        let bus = Bus::new(256);
        let mut rx = bus.subscribe();
        let cb = Arc::new(breaker(5, 1, 60).with_bus(bus));

        let mut set = tokio::task::JoinSet::new();
        for _ in 0..20 {
            let cb = Arc::clone(&cb);
            set.spawn(async move { cb.record_failure() });
        }
        while set.join_next().await.is_some() {}

        let mut opened = 0;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::CircuitOpened {
                opened += 1;
            }
        }
        assert_eq!(opened, 1);
        assert_eq!(cb.snapshot().consecutive_failures, 20);
    }
}
