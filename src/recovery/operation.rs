//! # Operations guarded by the recovery orchestrator.
//!
//! [`Operation`] is the one functional interface the orchestrator calls: a
//! stable name (used for cache keys and logs) and an async `call`.
//! [`OpFn`] wraps a closure `Fn(A) -> Fut`, producing a fresh future per call.
//!
//! ## Example
//! ```rust
//! use resilvisor::{OpError, OpFn, Operation};
//!
//! let double = OpFn::new("double", |n: u32| async move { Ok::<_, OpError>(n * 2) });
//! assert_eq!(Operation::<u32, u32>::name(&double), "double");
//! ```

use std::borrow::Cow;
use std::future::Future;

use async_trait::async_trait;

use crate::error::OpError;

/// Asynchronous operation taking `&A` and producing `T`.
#[async_trait]
pub trait Operation<A: Sync + ?Sized, T>: Send + Sync {
    /// Stable, human-readable name. Two operations with the same name share
    /// fallback cache entries.
    fn name(&self) -> &str;

    /// Performs one attempt.
    async fn call(&self, args: &A) -> Result<T, OpError>;
}

/// Closure-backed operation. Arguments are cloned into each call.
#[derive(Debug)]
pub struct OpFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> OpFn<F> {
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<A, T, F, Fut> Operation<A, T> for OpFn<F>
where
    A: Clone + Send + Sync + 'static,
    T: Send + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, OpError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, args: &A) -> Result<T, OpError> {
        (self.f)(args.clone()).await
    }
}
