//! # Component configuration.
//!
//! Plain in-process settings for every component except the transport's
//! [`RetryPolicy`](crate::RetryPolicy), which lives with the other policies.
//!
//! - [`PoolConfig`]     shared connection pool of the transport
//! - [`CircuitConfig`]  circuit breaker thresholds and open window
//! - [`RecoveryConfig`] orchestrator retries, fallback and cache
//! - [`SwarmConfig`]    swarm parallelism, timeouts and reporting
//!
//! ## Sentinel values
//! - `PoolConfig::max_connections = 0` / `max_per_host = 0` → unlimited
//! - `PoolConfig::dns_refresh = 0s` → never rotate the client
//! - `RecoveryConfig::cache_capacity = 0` → TTL-only cache (no LRU bound)
//! - `RecoveryConfig::attempt_timeout = 0s` → no per-attempt timeout
//! - `SwarmConfig::max_parallel = 0` → unlimited
//! - `SwarmConfig::subtask_timeout = 0s` → no timeout
//! - `SwarmConfig::history_limit = 0` → history disabled

use std::num::NonZeroUsize;
use std::time::Duration;

use crate::policies::{BackoffPolicy, JitterPolicy};

#[inline]
fn non_zero(d: Duration) -> Option<Duration> {
    if d == Duration::ZERO {
        None
    } else {
        Some(d)
    }
}

#[inline]
fn limit(n: usize) -> Option<usize> {
    if n == 0 {
        None
    } else {
        Some(n)
    }
}

/// Connection pool settings for [`RetryingTransport`](crate::RetryingTransport).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Requests in flight across all destinations.
    pub max_connections: usize,
    /// Requests in flight per destination (`scheme://host:port`).
    pub max_per_host: usize,
    /// Lifetime of one client generation; after it, a fresh client is built so
    /// new connections re-resolve DNS.
    pub dns_refresh: Duration,
    /// How long idle keep-alive connections are kept.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    /// `max_connections = 100`, `max_per_host = 10`, `dns_refresh = 300s`, `idle_timeout = 30s`.
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_per_host: 10,
            dns_refresh: Duration::from_secs(300),
            idle_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    #[inline]
    pub fn total_limit(&self) -> Option<usize> {
        limit(self.max_connections)
    }

    #[inline]
    pub fn per_host_limit(&self) -> Option<usize> {
        limit(self.max_per_host)
    }

    #[inline]
    pub fn refresh_after(&self) -> Option<Duration> {
        non_zero(self.dns_refresh)
    }
}

/// Circuit breaker thresholds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CircuitConfig {
    /// Consecutive failures (while Closed) that trip the circuit.
    pub failure_threshold: u32,
    /// Consecutive trial successes (while HalfOpen) that close it again.
    pub success_threshold: u32,
    /// How long the circuit stays Open before allowing a trial.
    pub open_duration: Duration,
}

impl Default for CircuitConfig {
    /// `failure_threshold = 5`, `success_threshold = 2`, `open_duration = 60s`.
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_duration: Duration::from_secs(60),
        }
    }
}

/// Recovery orchestrator settings.
#[derive(Clone, Debug, PartialEq)]
pub struct RecoveryConfig {
    /// Retries after the first primary attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the exponential delay added as jitter (`0.3` = up to 30%).
    pub jitter_ratio: f64,
    /// Whether a fallback is consulted once retries are exhausted.
    pub fallback_enabled: bool,
    /// Lifetime of a cached fallback value.
    pub cache_ttl: Duration,
    /// Maximum cached fallback values (least recently used evicted first).
    pub cache_capacity: usize,
    /// Hard bound on one primary or fallback call.
    pub attempt_timeout: Duration,
    /// Keep retrying failures classified as `Unknown`.
    pub retry_unknown: bool,
}

impl Default for RecoveryConfig {
    /// Default configuration:
    ///
    /// - `max_retries = 3`, `base_delay = 1s`, `max_delay = 60s`, `jitter_ratio = 0.3`
    /// - `fallback_enabled = true`, `cache_ttl = 300s`, `cache_capacity = 1024`
    /// - `attempt_timeout = 0s` (none), `retry_unknown = false`
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter_ratio: 0.3,
            fallback_enabled: true,
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 1024,
            attempt_timeout: Duration::ZERO,
            retry_unknown: false,
        }
    }
}

impl RecoveryConfig {
    /// Exponential backoff (factor 2) with additive jitter, capped at `max_delay`.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            first: self.base_delay,
            max: self.max_delay,
            factor: 2.0,
            jitter: JitterPolicy::Additive {
                ratio: self.jitter_ratio,
            },
        }
    }

    #[inline]
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    #[inline]
    pub fn cache_limit(&self) -> Option<NonZeroUsize> {
        NonZeroUsize::new(self.cache_capacity)
    }

    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        non_zero(self.attempt_timeout)
    }
}

/// Swarm task processor settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwarmConfig {
    /// Subtasks executing at the same time.
    pub max_parallel: usize,
    /// Hard bound on one executor call; the subtask's token is cancelled on expiry.
    pub subtask_timeout: Duration,
    /// Characters kept from each result in the aggregate preview.
    pub preview_len: usize,
    /// Processed tasks remembered by [`SwarmTaskProcessor::history`](crate::SwarmTaskProcessor::history).
    pub history_limit: usize,
}

impl Default for SwarmConfig {
    /// `max_parallel = 5`, `subtask_timeout = 0s` (none), `preview_len = 200`, `history_limit = 100`.
    fn default() -> Self {
        Self {
            max_parallel: 5,
            subtask_timeout: Duration::ZERO,
            preview_len: 200,
            history_limit: 100,
        }
    }
}

impl SwarmConfig {
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        limit(self.max_parallel)
    }

    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        non_zero(self.subtask_timeout)
    }
}
