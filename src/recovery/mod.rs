//! Recovery orchestration.
//!
//! - [`Operation`], [`OpFn`] the caller-supplied primary/fallback interface
//! - [`FallbackCache`], [`CacheEntry`] TTL + LRU store for fallback values
//! - [`RecoveryOrchestrator`] retry + classify + circuit gate + fallback

mod cache;
mod operation;
mod orchestrator;

pub use cache::{CacheEntry, FallbackCache};
pub use operation::{OpFn, Operation};
pub use orchestrator::RecoveryOrchestrator;
