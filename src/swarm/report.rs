//! Aggregated view of a processed [`SwarmTask`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::swarm::subtask::{SubtaskKind, SubtaskStatus, SwarmStatus, SwarmTask};

/// Per-subtask line of the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtaskSummary {
    pub id: String,
    pub kind: SubtaskKind,
    pub status: SubtaskStatus,
    pub result_preview: Option<String>,
    pub error: Option<String>,
}

/// `completed/total` summary plus per-subtask previews.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregate {
    pub summary: String,
    pub subtask_results: Vec<SubtaskSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contribution {
    pub kind: SubtaskKind,
    pub contribution: f64,
    pub status: SubtaskStatus,
}

/// Outcome of [`SwarmTaskProcessor::process`](crate::SwarmTaskProcessor::process).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwarmReport {
    pub task_id: String,
    pub status: SwarmStatus,
    pub subtasks_count: usize,
    pub completed_count: usize,
    pub results: Aggregate,
    pub contributions: BTreeMap<String, Contribution>,
    /// The processed task itself.
    #[serde(skip)]
    pub task: SwarmTask,
}

impl SwarmReport {
    pub(crate) fn from_task(task: SwarmTask, preview_len: usize) -> Self {
        let completed = task.completed_count();
        let total = task.subtasks.len();

        let subtask_results = task
            .subtasks
            .iter()
            .map(|st| SubtaskSummary {
                id: st.id.clone(),
                kind: st.kind,
                status: st.status,
                result_preview: st.result.as_ref().map(|v| preview(v, preview_len)),
                error: st.error.clone(),
            })
            .collect();

        let contributions = task
            .subtasks
            .iter()
            .map(|st| {
                (
                    st.id.clone(),
                    Contribution {
                        kind: st.kind,
                        contribution: st.contribution_ratio,
                        status: st.status,
                    },
                )
            })
            .collect();

        Self {
            task_id: task.id.clone(),
            status: task.status,
            subtasks_count: total,
            completed_count: completed,
            results: Aggregate {
                summary: format!("Completed {completed}/{total} subtasks"),
                subtask_results,
            },
            contributions,
            task,
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Entry of [`SwarmTaskProcessor::history`](crate::SwarmTaskProcessor::history).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub task_id: String,
    pub status: SwarmStatus,
    pub subtasks: usize,
    pub completed: usize,
    pub created: DateTime<Utc>,
}

impl From<&SwarmTask> for HistoryEntry {
    fn from(task: &SwarmTask) -> Self {
        Self {
            task_id: task.id.clone(),
            status: task.status,
            subtasks: task.subtasks.len(),
            completed: task.completed_count(),
            created: task.created_at,
        }
    }
}

/// First `max_chars` characters of the result; strings are shown without quotes.
fn preview(value: &Value, max_chars: usize) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text,
    }
}
