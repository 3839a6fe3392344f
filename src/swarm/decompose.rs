//! # Task decomposition.
//!
//! A description is split into clauses on sentence boundaries:
//! a `.` followed by whitespace or the end of text, `。`, `;`, `；` and line breaks.
//! Leading list markers (`1.`, `2)`, `3、`, `-`, `*`, `•`) are stripped and
//! segments left empty (or holding only a marker) are dropped.
//!
//! Each clause gets a [`SubtaskKind`] from the first keyword set it matches,
//! checked in the order Research, Development, Analysis; otherwise Generic.
//! Matching is a substring test on the lower-cased clause.

use std::sync::LazyLock;

use regex::Regex;

use crate::swarm::subtask::{Subtask, SubtaskKind};

static BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.(?:\s+|$)|[。;；\r\n]").expect("boundary pattern is valid")
});

static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d+[.)、]\s*|[-*•]\s+)").expect("list marker pattern is valid")
});

static MARKER_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d+[.)、]?|[-*•])$").expect("marker pattern is valid")
});

const RESEARCH: &[&str] = &[
    "研究", "调研", "调查", "搜索", "查找", "了解", "review", "research", "investigate", "search",
];

const DEVELOPMENT: &[&str] = &[
    "开发", "编写", "实现", "创建", "构建", "代码", "write", "develop", "implement", "create",
    "build", "code",
];

const ANALYSIS: &[&str] = &[
    "分析", "统计", "计算", "评估", "预测", "analyze", "analyse", "analysis", "calculate",
    "evaluate", "predict", "statistics",
];

/// Splits composite descriptions into typed subtasks.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskDecomposer;

impl TaskDecomposer {
    /// Subtasks for `description`, ids `"{task_id}-{index}"`, all `Pending`.
    ///
    /// # Example
    /// ```
    /// use resilvisor::{SubtaskKind, TaskDecomposer};
    ///
    /// let subtasks = TaskDecomposer::decompose("t", "1. Research AI agents. 2. Develop a test harness.");
    /// let kinds: Vec<_> = subtasks.iter().map(|s| s.kind).collect();
    /// assert_eq!(kinds, [SubtaskKind::Research, SubtaskKind::Development]);
    /// assert_eq!(subtasks[1].id, "t-1");
    /// ```
    pub fn decompose(task_id: &str, description: &str) -> Vec<Subtask> {
        let subtasks: Vec<Subtask> = Self::segments(description)
            .into_iter()
            .enumerate()
            .map(|(i, segment)| {
                let kind = Self::detect_kind(&segment);
                Subtask::new(format!("{task_id}-{i}"), kind, segment)
            })
            .collect();

        tracing::info!(task = task_id, subtasks = subtasks.len(), "task decomposed");
        subtasks
    }

    /// Cleaned clauses of `description`, in order.
    pub fn segments(description: &str) -> Vec<String> {
        BOUNDARY
            .split(description)
            .map(str::trim)
            .filter(|s| !s.is_empty() && !MARKER_ONLY.is_match(s))
            .map(|s| LIST_MARKER.replace(s, "").trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn detect_kind(segment: &str) -> SubtaskKind {
        let lower = segment.to_lowercase();
        let sets = [
            (SubtaskKind::Research, RESEARCH),
            (SubtaskKind::Development, DEVELOPMENT),
            (SubtaskKind::Analysis, ANALYSIS),
        ];
        sets.into_iter()
            .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
            .map_or(SubtaskKind::Generic, |(kind, _)| kind)
    }
}
