//! # resilvisor
//!
//! **Resilvisor** is a small resilience toolkit for async Rust services.
//!
//! It bundles four cooperating pieces: an HTTP transport with bounded retries,
//! an error classifier with a circuit breaker, a recovery orchestrator that
//! combines them with a cached fallback, and a swarm processor that fans a
//! composite task out to a caller-supplied executor.
//!
//! ## Architecture
//! ```text
//!        caller
//!          │
//!          ├──────────────────────────────┐
//!          ▼                              ▼
//! ┌─────────────────────┐      ┌──────────────────────┐
//! │ SwarmTaskProcessor  │─────►│ RecoveryOrchestrator │ (optional, per subtask)
//! │ decompose, fan-out, │      │ retry loop + fallback│
//! │ aggregate, weigh    │      └───┬──────────┬───────┘
//! └─────────┬───────────┘          │          │
//!           ▼                      ▼          ▼
//!       Executor           CircuitBreaker  ErrorClassifier
//!                                  │
//!                                  ▼
//!                   Operation (e.g. FetchOperation)
//!                                  │
//!                                  ▼
//!                   RetryingTransport ──► ConnectionPool (reqwest)
//!
//! Every component publishes to a Bus (broadcast) and logs through `tracing`.
//! ```
//!
//! ## Features
//! | Area           | Description                                               | Key types                                   |
//! |----------------|-----------------------------------------------------------|---------------------------------------------|
//! | **Transport**  | HTTP with backoff, jitter, per-attempt timeout, pooling   | [`RetryingTransport`], [`ConnectionPool`]   |
//! | **Classify**   | Map failures to categories and retry hints                | [`ErrorClassifier`], [`ErrorCategory`]      |
//! | **Circuit**    | Closed / Open / HalfOpen fault isolation                  | [`CircuitBreaker`], [`CircuitPhase`]        |
//! | **Recovery**   | Retries, circuit gating, TTL-cached fallback              | [`RecoveryOrchestrator`], [`Operation`]     |
//! | **Swarm**      | Decompose, bounded parallel execution, contributions      | [`SwarmTaskProcessor`], [`Executor`]        |
//! | **Events**     | Structured runtime events                                 | [`Bus`], [`Event`], [`EventKind`]           |
//! | **Policies**   | Retry and backoff shapes                                  | [`RetryPolicy`], [`BackoffPolicy`]          |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use resilvisor::{
//!     CircuitBreaker, CircuitConfig, OpError, OpFn, RecoveryConfig, RecoveryOrchestrator,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let breaker = Arc::new(CircuitBreaker::new("quotes", CircuitConfig::default()));
//!     let recovery = RecoveryOrchestrator::new(
//!         RecoveryConfig { max_retries: 1, base_delay: Duration::from_millis(1), ..RecoveryConfig::default() },
//!         breaker,
//!     );
//!
//!     let primary = OpFn::new("quotes", |_symbol: String| async {
//!         Err::<f64, _>(OpError::new("connection refused"))
//!     });
//!     let cached = OpFn::new("quotes-snapshot", |_symbol: String| async { Ok::<_, OpError>(41.5) });
//!
//!     let price = recovery.execute(&primary, Some(&cached), &"ACME".to_string()).await;
//!     assert_eq!(price, Some(41.5));
//! }
//! ```
mod circuit;
mod classify;
mod config;
mod error;
mod events;
mod policies;
mod recovery;
mod swarm;
mod transport;

// ---- Public re-exports ----

pub use circuit::{CircuitBreaker, CircuitPhase, CircuitState};
pub use classify::{ErrorCategory, ErrorClassifier, ErrorContext};
pub use config::{CircuitConfig, PoolConfig, RecoveryConfig, SwarmConfig};
pub use error::{OpError, TransportError};
pub use events::{Bus, Event, EventKind, DEFAULT_BUS_CAPACITY};
pub use policies::{BackoffPolicy, JitterPolicy, RetryPolicy, DEFAULT_RETRYABLE_STATUS};
pub use recovery::{CacheEntry, FallbackCache, OpFn, Operation, RecoveryOrchestrator};
pub use swarm::{
    process_swarm_task, Aggregate, Contribution, Executor, ExecutorFn, HistoryEntry, Subtask,
    SubtaskKind, SubtaskStatus, SubtaskSummary, SwarmReport, SwarmStatus, SwarmTask,
    SwarmTaskProcessor, TaskDecomposer,
};
pub use transport::{
    ConnectionPool, FetchOperation, FetchOptions, FetchRequest, FetchedBody, Method, PoolPermit,
    Response, RetryingTransport,
};
