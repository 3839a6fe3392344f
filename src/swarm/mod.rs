//! Swarm task processing.
//!
//! - [`TaskDecomposer`] splits a description into typed [`Subtask`]s
//! - [`Executor`], [`ExecutorFn`] the caller-supplied work for one subtask
//! - [`SwarmTaskProcessor`] bounded fan-out, fan-in and contribution weighting
//! - [`SwarmReport`] serializable aggregate of one processed task

mod decompose;
mod executor;
mod processor;
mod report;
mod subtask;

pub use decompose::TaskDecomposer;
pub use executor::{Executor, ExecutorFn};
pub use processor::{process_swarm_task, SwarmTaskProcessor};
pub use report::{Aggregate, Contribution, HistoryEntry, SubtaskSummary, SwarmReport};
pub use subtask::{Subtask, SubtaskKind, SubtaskStatus, SwarmStatus, SwarmTask};
