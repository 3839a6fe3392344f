//! # RecoveryOrchestrator: retry, circuit gating and cached fallback in one call.
//!
//! ## Flow
//! ```text
//! execute(primary, fallback?, args)
//!   ├─► breaker.can_execute()? ── no ──► fallback (cached) or None
//!   │
//!   ├─► for attempt in 1..=max_retries+1:
//!   │     ├─ primary.call(args) (optional per-attempt timeout)
//!   │     ├─ Ok  ──► breaker.record_success() ──► return Some(value)
//!   │     └─ Err ──► classify ──► publish AttemptFailed
//!   │                 ├─ non-transient (and !retry_unknown) ─► stop
//!   │                 ├─ last attempt                       ─► stop
//!   │                 └─ delay = retry_after hint (capped) or backoff(attempt)
//!   │                    publish RetryScheduled, sleep(delay)
//!   │
//!   ├─► breaker.record_failure(); publish RetriesExhausted if retries ran out
//!   └─► fallback enabled and present?
//!         ├─ cache hit (within TTL) ─► Some(cached)
//!         ├─ fallback Ok           ─► cache, Some(value)
//!         └─ fallback Err          ─► None
//! ```
//!
//! ## Rules
//! - Attempts for one call are strictly sequential.
//! - The breaker records the **final** outcome of a call once, never per attempt.
//! - Expected failures never surface as panics or errors: the caller gets `None`.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::circuit::CircuitBreaker;
use crate::classify::{ErrorCategory, ErrorClassifier, ErrorContext};
use crate::config::{CircuitConfig, RecoveryConfig};
use crate::error::OpError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::BackoffPolicy;
use crate::recovery::cache::FallbackCache;
use crate::recovery::operation::Operation;

/// Orchestrates recovery for one logical operation producing `T`.
///
/// # Example
/// ```rust
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
/// use resilvisor::{OpError, OpFn, RecoveryConfig, RecoveryOrchestrator};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let calls = Arc::new(AtomicU32::new(0));
/// let counter = Arc::clone(&calls);
/// let flaky = OpFn::new("flaky", move |n: u32| {
///     let counter = Arc::clone(&counter);
///     async move {
///         if counter.fetch_add(1, Ordering::SeqCst) == 0 {
///             Err(OpError::new("connection reset by peer"))
///         } else {
///             Ok(n + 1)
///         }
///     }
/// });
///
/// let cfg = RecoveryConfig { base_delay: Duration::from_millis(1), ..RecoveryConfig::default() };
/// let recovery = RecoveryOrchestrator::named("flaky", cfg);
/// assert_eq!(recovery.execute(&flaky, None, &41).await, Some(42));
/// assert_eq!(calls.load(Ordering::SeqCst), 2);
/// # }
/// ```
pub struct RecoveryOrchestrator<T> {
    cfg: RecoveryConfig,
    backoff: BackoffPolicy,
    breaker: Arc<CircuitBreaker>,
    cache: FallbackCache<T>,
    bus: Bus,
}

impl<T: Clone + Send + Sync + 'static> RecoveryOrchestrator<T> {
    /// Creates an orchestrator around an existing (possibly shared) breaker.
    ///
    /// Events go to the breaker's bus unless [`with_bus`](Self::with_bus) is used.
    pub fn new(cfg: RecoveryConfig, breaker: Arc<CircuitBreaker>) -> Self {
        let cache = FallbackCache::new(cfg.cache_ttl, cfg.cache_limit());
        Self {
            backoff: cfg.backoff(),
            bus: breaker.bus().clone(),
            breaker,
            cache,
            cfg,
        }
    }

    /// Creates an orchestrator with its own breaker using [`CircuitConfig::default`].
    pub fn named(name: impl Into<Arc<str>>, cfg: RecoveryConfig) -> Self {
        Self::new(cfg, Arc::new(CircuitBreaker::new(name, CircuitConfig::default())))
    }

    /// Publishes orchestrator events to `bus` (the breaker keeps its own).
    #[must_use]
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = bus;
        self
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn cache(&self) -> &FallbackCache<T> {
        &self.cache
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.cfg
    }

    /// Runs `primary` with retries; on exhaustion (or an open circuit) consults
    /// `fallback` through the cache. Returns `None` when nothing produced a value.
    pub async fn execute<A, P>(
        &self,
        primary: &P,
        fallback: Option<&dyn Operation<A, T>>,
        args: &A,
    ) -> Option<T>
    where
        A: Hash + Sync + ?Sized,
        P: Operation<A, T> + ?Sized,
    {
        if !self.breaker.can_execute() {
            tracing::warn!(
                circuit = %self.breaker.name(),
                operation = primary.name(),
                "circuit is open, skipping primary"
            );
            return self.fallback(fallback, args).await;
        }

        let last = match self.retry_primary(primary, args).await {
            Ok(value) => {
                self.breaker.record_success();
                return Some(value);
            }
            Err(last) => last,
        };

        self.breaker.record_failure();
        if self.is_retryable(last.category) {
            tracing::error!(
                operation = primary.name(),
                attempts = last.attempt,
                category = last.category.as_label(),
                error = %last.message,
                "all retries failed"
            );
            self.bus.publish(
                Event::new(EventKind::RetriesExhausted)
                    .with_name(primary.name())
                    .with_attempt(last.attempt)
                    .with_category(last.category)
                    .with_reason(last.message.as_str()),
            );
        } else {
            tracing::error!(
                operation = primary.name(),
                attempts = last.attempt,
                category = last.category.as_label(),
                error = %last.message,
                "primary failed"
            );
        }

        self.fallback(fallback, args).await
    }

    /// Sequential attempts of `primary`; returns the value or the last classified failure.
    async fn retry_primary<A, P>(&self, primary: &P, args: &A) -> Result<T, ErrorContext>
    where
        A: Sync + ?Sized,
        P: Operation<A, T> + ?Sized,
    {
        let total = self.cfg.total_attempts();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let err = match self.guarded(primary, args).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let ctx = ErrorClassifier::classify(&err, attempt);
            self.bus.publish(
                Event::new(EventKind::AttemptFailed)
                    .with_name(primary.name())
                    .with_attempt(attempt)
                    .with_category(ctx.category)
                    .with_status(ctx.status_code)
                    .with_reason(ctx.message.as_str()),
            );

            if !self.is_retryable(ctx.category) {
                tracing::warn!(
                    operation = primary.name(),
                    attempt,
                    category = ctx.category.as_label(),
                    error = %ctx.message,
                    "non-transient failure, not retrying"
                );
                return Err(ctx);
            }
            if attempt >= total {
                return Err(ctx);
            }

            let delay = self.delay_for(attempt - 1, &ctx);
            tracing::warn!(
                operation = primary.name(),
                attempt,
                max_attempts = total,
                category = ctx.category.as_label(),
                delay_ms = delay.as_millis() as u64,
                "attempt failed, retrying"
            );
            self.bus.publish(
                Event::new(EventKind::RetryScheduled)
                    .with_name(primary.name())
                    .with_attempt(attempt)
                    .with_delay(delay)
                    .with_category(ctx.category)
                    .with_status(ctx.status_code)
                    .with_reason(ctx.message.as_str()),
            );
            if delay > Duration::ZERO {
                tokio::time::sleep(delay).await;
            }
        }
    }

    fn is_retryable(&self, category: ErrorCategory) -> bool {
        category.is_transient() || self.cfg.retry_unknown
    }

    /// Server hint first (capped at `max_delay`), else exponential backoff with jitter.
    fn delay_for(&self, retry_index: u32, ctx: &ErrorContext) -> Duration {
        match ctx.retry_after_hint {
            Some(hint) if hint > Duration::ZERO => hint.min(self.cfg.max_delay),
            _ => self.backoff.next(retry_index),
        }
    }

    async fn fallback<A>(&self, fallback: Option<&dyn Operation<A, T>>, args: &A) -> Option<T>
    where
        A: Hash + Sync + ?Sized,
    {
        let fallback = fallback.filter(|_| self.cfg.fallback_enabled)?;
        let key = FallbackCache::<T>::key_for(fallback.name(), args);

        if let Some(value) = self.cache.get(&key) {
            tracing::debug!(operation = fallback.name(), "using cached fallback result");
            self.bus
                .publish(Event::new(EventKind::FallbackCacheHit).with_name(fallback.name()));
            return Some(value);
        }

        self.bus
            .publish(Event::new(EventKind::FallbackInvoked).with_name(fallback.name()));
        match self.guarded(fallback, args).await {
            Ok(value) => {
                self.cache.insert(key, value.clone());
                Some(value)
            }
            Err(err) => {
                tracing::error!(operation = fallback.name(), error = %err, "fallback also failed");
                self.bus.publish(
                    Event::new(EventKind::FallbackFailed)
                        .with_name(fallback.name())
                        .with_reason(err.message.as_str()),
                );
                None
            }
        }
    }

    /// One call bounded by `attempt_timeout`, if configured.
    async fn guarded<A, O>(&self, op: &O, args: &A) -> Result<T, OpError>
    where
        A: Sync + ?Sized,
        O: Operation<A, T> + ?Sized,
    {
        match self.cfg.timeout() {
            Some(dur) => match tokio::time::timeout(dur, op.call(args)).await {
                Ok(res) => res,
                Err(_elapsed) => Err(OpError::new(format!(
                    "{} timed out after {dur:?}",
                    op.name()
                ))
                .with_category(ErrorCategory::Timeout)),
            },
            None => op.call(args).await,
        }
    }
}
