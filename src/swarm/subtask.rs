//! Swarm data model: [`Subtask`], [`SwarmTask`] and their states.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Kind of work a subtask describes; drives its contribution weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtaskKind {
    Research,
    Development,
    Analysis,
    Generic,
}

impl SubtaskKind {
    /// Contribution weight among completed subtasks.
    pub fn weight(&self) -> f64 {
        match self {
            SubtaskKind::Development => 1.5,
            SubtaskKind::Analysis => 1.2,
            SubtaskKind::Research | SubtaskKind::Generic => 1.0,
        }
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            SubtaskKind::Research => "research",
            SubtaskKind::Development => "development",
            SubtaskKind::Analysis => "analysis",
            SubtaskKind::Generic => "generic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SubtaskStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubtaskStatus::Completed | SubtaskStatus::Failed)
    }
}

/// One independently executable piece of a [`SwarmTask`].
///
/// `contribution_ratio` stays `0.0` unless the subtask is `Completed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subtask {
    pub id: String,
    pub kind: SubtaskKind,
    pub description: String,
    pub status: SubtaskStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub contribution_ratio: f64,
}

impl Subtask {
    pub fn new(id: impl Into<String>, kind: SubtaskKind, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            description: description.into(),
            status: SubtaskStatus::Pending,
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
            contribution_ratio: 0.0,
        }
    }

    pub(crate) fn complete(&mut self, value: Value) {
        self.status = SubtaskStatus::Completed;
        self.result = Some(value);
        self.error = None;
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self, error: impl Into<String>) {
        self.status = SubtaskStatus::Failed;
        self.result = None;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        self.contribution_ratio = 0.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SwarmStatus {
    Pending,
    Completed,
}

/// A composite task and the subtasks it owns, in decomposition order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwarmTask {
    pub id: String,
    pub description: String,
    pub subtasks: Vec<Subtask>,
    pub status: SwarmStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_contribution: f64,
}

impl SwarmTask {
    pub fn new(id: impl Into<String>, description: impl Into<String>, subtasks: Vec<Subtask>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            subtasks,
            status: SwarmStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            total_contribution: 0.0,
        }
    }

    pub fn completed_count(&self) -> usize {
        self.subtasks
            .iter()
            .filter(|s| s.status == SubtaskStatus::Completed)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.subtasks
            .iter()
            .filter(|s| s.status == SubtaskStatus::Failed)
            .count()
    }

    /// Assigns weighted, normalized ratios over completed subtasks and
    /// updates `total_contribution`.
    pub fn assign_contributions(&mut self) {
        let total: f64 = self
            .subtasks
            .iter()
            .filter(|s| s.status == SubtaskStatus::Completed)
            .map(|s| s.kind.weight())
            .sum();

        for st in &mut self.subtasks {
            st.contribution_ratio = if st.status == SubtaskStatus::Completed && total > 0.0 {
                st.kind.weight() / total
            } else {
                0.0
            };
        }
        self.total_contribution = self.subtasks.iter().map(|s| s.contribution_ratio).sum();
    }
}
