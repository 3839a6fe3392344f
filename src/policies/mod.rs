//! Retry and backoff policies.
//!
//! This module groups the knobs that control **how often** an operation is
//! retried and **how long** to wait between attempts.
//!
//! ## Contents
//! - [`RetryPolicy`]   bounded retries for the transport (count / status codes / timeout)
//! - [`BackoffPolicy`] how retry delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid retry storms
//!
//! ## Quick wiring
//! ```text
//! RetryPolicy ──► RetryingTransport   (backoff() with Symmetric jitter)
//! RecoveryConfig ──► RecoveryOrchestrator (backoff() with Additive{0.3} jitter)
//! ```

mod backoff;
mod jitter;
mod retry;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use retry::{RetryPolicy, DEFAULT_RETRYABLE_STATUS};
