//! Circuit breaking.
//!
//! - [`CircuitBreaker`] the lock-guarded three-state machine
//! - [`CircuitState`], [`CircuitPhase`] its observable state
//!
//! One breaker guards one logical operation and is shared (usually via
//! `Arc`) by every caller of that operation.

mod breaker;
mod state;

pub use breaker::CircuitBreaker;
pub use state::{CircuitPhase, CircuitState};
