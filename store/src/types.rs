//! Task document types shared by the store and the sync service.
//!
//! These mirror the on-disk JSON layout of a task store document:
//!
//! ```json
//! {
//!   "tasks": [
//!     {
//!       "id": 1,
//!       "title": "Set up project",
//!       "description": "Initialise the repository",
//!       "details": "",
//!       "testStrategy": "",
//!       "status": "in-progress",
//!       "priority": "high",
//!       "dependencies": [],
//!       "subtasks": []
//!     }
//!   ]
//! }
//! ```
//!
//! Keys the model does not know about are kept in `extra` maps so that a
//! rewrite by this crate never drops data written by another tool.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Status of a task or subtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Done,
    Deferred,
    Cancelled,
    Review,
}

impl TaskStatus {
    /// Returns the on-disk spelling of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Done => "done",
            Self::Deferred => "deferred",
            Self::Cancelled => "cancelled",
            Self::Review => "review",
        }
    }

    /// Parses the on-disk spelling of a status.
    ///
    /// # Example
    ///
    /// ```
    /// use taskboard_store::TaskStatus;
    ///
    /// assert_eq!(TaskStatus::parse("in-progress"), Some(TaskStatus::InProgress));
    /// assert_eq!(TaskStatus::parse("blocked"), None);
    /// ```
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in-progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            "deferred" => Some(Self::Deferred),
            "cancelled" => Some(Self::Cancelled),
            "review" => Some(Self::Review),
            _ => None,
        }
    }

    /// Returns true for statuses that still need work.
    #[must_use]
    pub fn is_actionable(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Ordering weight, higher is more urgent.
    #[must_use]
    pub fn weight(self) -> u8 {
        match self {
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// A subtask, addressed as `parentId.id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    /// Unique within the parent task only.
    pub id: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub test_strategy: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Sibling subtask ids.
    #[serde(default)]
    pub dependencies: Vec<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A top-level task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub test_strategy: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub dependencies: Vec<u32>,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    /// Creates a pending, medium-priority task with empty text fields.
    #[must_use]
    pub fn new(id: u32, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            details: String::new(),
            test_strategy: String::new(),
            status: TaskStatus::Pending,
            priority: Priority::Medium,
            dependencies: Vec::new(),
            subtasks: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Builder-style status setter, mostly for fixtures.
    #[must_use]
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn subtask(&self, id: u32) -> Option<&Subtask> {
        self.subtasks.iter().find(|s| s.id == id)
    }

    pub fn subtask_mut(&mut self, id: u32) -> Option<&mut Subtask> {
        self.subtasks.iter_mut().find(|s| s.id == id)
    }

    /// Next free subtask id within this task.
    #[must_use]
    pub fn next_subtask_id(&self) -> u32 {
        self.subtasks.iter().map(|s| s.id).max().unwrap_or(0) + 1
    }
}

/// The whole task store document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TaskDocument {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskDocument {
    #[must_use]
    pub fn task(&self, id: u32) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: u32) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Next free top-level task id.
    #[must_use]
    pub fn next_task_id(&self) -> u32 {
        self.tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1
    }
}

/// Errors produced when parsing a [`TaskRef`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskRefError {
    /// The address was empty.
    #[error("task reference is empty")]
    Empty,

    /// A component was not a positive integer.
    #[error("invalid task reference '{0}': expected <id> or <parent>.<subtask>")]
    Invalid(String),
}

/// Address of a task (`"3"`) or subtask (`"3.2"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskRef {
    Task(u32),
    Subtask { parent: u32, id: u32 },
}

impl TaskRef {
    /// The top-level task this reference lives under.
    #[must_use]
    pub fn root(self) -> u32 {
        match self {
            Self::Task(id) => id,
            Self::Subtask { parent, .. } => parent,
        }
    }
}

impl FromStr for TaskRef {
    type Err = TaskRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TaskRefError::Empty);
        }

        let invalid = || TaskRefError::Invalid(s.to_string());
        let mut parts = s.split('.');
        let first = parts.next().ok_or_else(invalid)?;
        let parent = first.parse::<u32>().map_err(|_| invalid())?;

        match (parts.next(), parts.next()) {
            (None, _) => Ok(Self::Task(parent)),
            (Some(sub), None) => {
                let id = sub.parse::<u32>().map_err(|_| invalid())?;
                Ok(Self::Subtask { parent, id })
            }
            (Some(_), Some(_)) => Err(invalid()),
        }
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Task(id) => write!(f, "{id}"),
            Self::Subtask { parent, id } => write!(f, "{parent}.{id}"),
        }
    }
}

impl From<u32> for TaskRef {
    fn from(id: u32) -> Self {
        Self::Task(id)
    }
}

/// Header block of a complexity report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityReportMeta {
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub project_name: String,
    pub tasks_analyzed: u32,
    #[serde(default)]
    pub total_tasks: u32,
    pub threshold_score: u8,
    #[serde(default)]
    pub used_research: bool,
}

/// Per-task entry of a complexity report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityAnalysis {
    pub task_id: u32,
    pub task_title: String,
    /// 0 to 10.
    pub complexity_score: u8,
    pub recommended_subtasks: u32,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub expansion_prompt: String,
}

/// Complexity report document written by complexity analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityReport {
    pub meta: ComplexityReportMeta,
    #[serde(default)]
    pub complexity_analysis: Vec<ComplexityAnalysis>,
}

impl ComplexityReport {
    /// Looks up the analysis entry for a task.
    #[must_use]
    pub fn for_task(&self, task_id: u32) -> Option<&ComplexityAnalysis> {
        self.complexity_analysis
            .iter()
            .find(|a| a.task_id == task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_kebab_case() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");

        let parsed: TaskStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(parsed, TaskStatus::Cancelled);
    }

    #[test]
    fn status_parse_matches_serde_spelling() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Done,
            TaskStatus::Deferred,
            TaskStatus::Cancelled,
            TaskStatus::Review,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("in_progress"), None);
    }

    #[test]
    fn task_defaults_fill_missing_fields() {
        let task: Task = serde_json::from_str(r#"{"id": 7, "title": "Bare"}"#).unwrap();

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, Priority::Medium);
        assert!(task.dependencies.is_empty());
        assert!(task.subtasks.is_empty());
    }

    #[test]
    fn task_uses_camel_case_keys() {
        let mut task = Task::new(1, "Write tests");
        task.test_strategy = "unit".to_string();

        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["testStrategy"], "unit");
        assert!(value.get("test_strategy").is_none());
    }

    #[test]
    fn unknown_keys_survive_round_trip() {
        let json = r#"{
            "tasks": [{"id": 1, "title": "A", "complexity": 5}],
            "metadata": {"projectName": "demo"}
        }"#;

        let doc: TaskDocument = serde_json::from_str(json).unwrap();
        let back = serde_json::to_value(&doc).unwrap();

        assert_eq!(back["tasks"][0]["complexity"], 5);
        assert_eq!(back["metadata"]["projectName"], "demo");
    }

    #[test]
    fn next_ids_start_at_one() {
        let doc = TaskDocument::default();
        assert_eq!(doc.next_task_id(), 1);

        let task = Task::new(4, "Parent");
        assert_eq!(task.next_subtask_id(), 1);
    }

    #[test]
    fn task_ref_parses_task_and_subtask() {
        assert_eq!("3".parse::<TaskRef>(), Ok(TaskRef::Task(3)));
        assert_eq!(
            " 3.2 ".parse::<TaskRef>(),
            Ok(TaskRef::Subtask { parent: 3, id: 2 })
        );
    }

    #[test]
    fn task_ref_rejects_bad_input() {
        assert_eq!("".parse::<TaskRef>(), Err(TaskRefError::Empty));
        assert!(matches!(
            "1.2.3".parse::<TaskRef>(),
            Err(TaskRefError::Invalid(_))
        ));
        assert!(matches!("abc".parse::<TaskRef>(), Err(TaskRefError::Invalid(_))));
        assert!(matches!("1.x".parse::<TaskRef>(), Err(TaskRefError::Invalid(_))));
    }

    #[test]
    fn task_ref_display_matches_parse() {
        let r = TaskRef::Subtask { parent: 12, id: 4 };
        assert_eq!(r.to_string(), "12.4");
        assert_eq!(r.root(), 12);
    }

    #[test]
    fn complexity_report_parses_camel_case() {
        let json = r#"{
            "meta": {
                "generatedAt": "2025-01-01T00:00:00Z",
                "projectName": "demo",
                "tasksAnalyzed": 1,
                "totalTasks": 1,
                "thresholdScore": 5,
                "usedResearch": false
            },
            "complexityAnalysis": [{
                "taskId": 2,
                "taskTitle": "Parser",
                "complexityScore": 8,
                "recommendedSubtasks": 5,
                "reasoning": "many edge cases",
                "expansionPrompt": "split by grammar rule"
            }]
        }"#;

        let report: ComplexityReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.meta.threshold_score, 5);
        assert_eq!(report.for_task(2).map(|a| a.complexity_score), Some(8));
        assert!(report.for_task(3).is_none());
    }
}
