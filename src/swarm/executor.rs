//! # Subtask executors.
//!
//! [`Executor`] is the caller-supplied unit of work for one subtask. It
//! receives a [`CancellationToken`] that fires when the subtask times out or
//! the whole swarm call is cancelled, and should return promptly once it does.
//!
//! [`ExecutorFn`] wraps a closure `Fn(CancellationToken, String, String) -> Fut`
//! (token, subtask id, description), producing a fresh future per subtask.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//! use resilvisor::{Executor, ExecutorFn, OpError};
//!
//! let exec: Arc<dyn Executor> = ExecutorFn::arc("echo", |_ctx: CancellationToken, id: String, desc: String| async move {
//!     Ok::<_, OpError>(json!({ "id": id, "output": desc }))
//! });
//! assert_eq!(exec.name(), "echo");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::OpError;
use crate::recovery::Operation;

/// Executes one subtask.
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    /// Stable name, used in logs and as the recovery operation name.
    fn name(&self) -> &str {
        "executor"
    }

    async fn execute(
        &self,
        ctx: CancellationToken,
        subtask_id: &str,
        description: &str,
    ) -> Result<Value, OpError>;
}

/// Closure-backed executor.
#[derive(Debug)]
pub struct ExecutorFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> ExecutorFn<F> {
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the executor as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Executor for ExecutorFn<F>
where
    F: Fn(CancellationToken, String, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, OpError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        ctx: CancellationToken,
        subtask_id: &str,
        description: &str,
    ) -> Result<Value, OpError> {
        (self.f)(ctx, subtask_id.to_string(), description.to_string()).await
    }
}

/// Arguments of one subtask routed through a recovery orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct SubtaskCall {
    pub id: String,
    pub description: String,
}

/// Presents an [`Executor`] bound to one subtask's token as an [`Operation`].
pub(crate) struct ExecutorOperation {
    pub executor: Arc<dyn Executor>,
    pub ctx: CancellationToken,
}

#[async_trait]
impl Operation<SubtaskCall, Value> for ExecutorOperation {
    fn name(&self) -> &str {
        self.executor.name()
    }

    async fn call(&self, args: &SubtaskCall) -> Result<Value, OpError> {
        if self.ctx.is_cancelled() {
            return Err(OpError::new("subtask cancelled"));
        }
        self.executor
            .execute(self.ctx.clone(), &args.id, &args.description)
            .await
    }
}
