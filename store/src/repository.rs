//! The task repository capability.
//!
//! [`TaskRepository`] is the single seam between the sync service and
//! whatever actually owns the task store (the bundled
//! [`JsonTaskRepository`](crate::JsonTaskRepository), a wrapper around an
//! external CLI, or a test double). It is resolved once at construction and
//! shared as `Arc<dyn TaskRepository>`.
//!
//! Every method receives the path it operates on so one repository instance
//! can serve several projects.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Priority, Task, TaskRef, TaskStatus};

/// Fields for a new top-level task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub test_strategy: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub dependencies: Vec<u32>,
}

/// Fields for a new subtask.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubtask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    /// Sibling subtask ids.
    #[serde(default)]
    pub dependencies: Vec<u32>,
}

/// Partial update applied to a task or subtask. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub details: Option<String>,
    pub test_strategy: Option<String>,
    pub priority: Option<Priority>,
    /// Text appended to `details` on a new line.
    pub append_details: Option<String>,
}

impl TaskUpdate {
    /// Returns true when applying the update would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.details.is_none()
            && self.test_strategy.is_none()
            && self.priority.is_none()
            && self.append_details.is_none()
    }
}

/// Why a dependency edge is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    /// The dependency target does not exist.
    Missing,
    /// A task depends on itself.
    SelfReference,
    /// The edge closes a cycle.
    Circular,
}

/// A single invalid dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyIssue {
    /// Address of the task owning the edge, e.g. `"4"` or `"4.2"`.
    pub task: String,
    /// Address of the dependency target.
    pub dependency: String,
    pub kind: IssueKind,
}

/// Result of validating the dependency graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<DependencyIssue>,
}

impl ValidationReport {
    #[must_use]
    pub fn from_issues(issues: Vec<DependencyIssue>) -> Self {
        Self {
            valid: issues.is_empty(),
            issues,
        }
    }
}

/// Options for expanding a task into subtasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandOptions {
    pub num_subtasks: Option<u32>,
    pub use_research: bool,
    /// Extra context handed to the generator.
    pub prompt: Option<String>,
    /// Replace existing subtasks instead of appending.
    pub force: bool,
}

/// Options for expanding every eligible task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandAllOptions {
    /// Only expand tasks whose complexity score is at least this value.
    pub threshold: Option<u8>,
    #[serde(flatten)]
    pub expand: ExpandOptions,
}

/// Options for complexity analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityOptions {
    pub tasks_path: PathBuf,
    pub output_path: PathBuf,
    /// Score from which expansion is recommended (1 to 10).
    pub threshold: u8,
    pub use_research: bool,
}

/// Options for generating tasks from a PRD document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsePrdOptions {
    pub num_tasks: Option<u32>,
    /// Overwrite an existing task store.
    pub force: bool,
    /// Append to an existing task store instead of replacing it.
    pub append: bool,
    pub use_research: bool,
}

/// Options for syncing the task table into the project README.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadmeOptions {
    pub tasks_path: PathBuf,
    pub with_subtasks: bool,
    pub status: Option<TaskStatus>,
}

/// Capability interface over a task store.
///
/// Implementations own all business rules; callers only observe success,
/// failure and the resulting file on disk.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Lists tasks, optionally filtered by status. Subtasks are stripped
    /// unless `with_subtasks` is set.
    async fn list_tasks(
        &self,
        path: &Path,
        status: Option<TaskStatus>,
        with_subtasks: bool,
    ) -> Result<Vec<Task>>;

    /// Finds a task by id. A subtask reference returns its parent task.
    async fn find_task(&self, path: &Path, task: TaskRef) -> Result<Option<Task>>;

    /// Returns the next task eligible to be worked on.
    async fn next_task(&self, path: &Path) -> Result<Option<Task>>;

    async fn set_task_status(&self, path: &Path, task: TaskRef, status: TaskStatus)
        -> Result<()>;

    /// Adds a task and returns its id.
    async fn add_task(&self, path: &Path, task: NewTask) -> Result<u32>;

    async fn remove_task(&self, path: &Path, task: TaskRef) -> Result<()>;

    async fn update_task(&self, path: &Path, task: u32, update: TaskUpdate) -> Result<()>;

    /// Adds a subtask under `parent` and returns its id.
    async fn add_subtask(&self, path: &Path, parent: u32, subtask: NewSubtask) -> Result<u32>;

    async fn remove_subtask(&self, path: &Path, subtask: TaskRef) -> Result<()>;

    async fn update_subtask(&self, path: &Path, subtask: TaskRef, update: TaskUpdate)
        -> Result<()>;

    /// Removes all subtasks of the tasks named in a comma-joined id list.
    async fn clear_subtasks(&self, path: &Path, task_ids: &str) -> Result<()>;

    async fn add_dependency(&self, path: &Path, task: TaskRef, depends_on: TaskRef)
        -> Result<()>;

    async fn remove_dependency(
        &self,
        path: &Path,
        task: TaskRef,
        depends_on: TaskRef,
    ) -> Result<()>;

    async fn validate_dependencies(&self, path: &Path) -> Result<ValidationReport>;

    /// Removes invalid dependency edges and returns how many were dropped.
    async fn fix_dependencies(&self, path: &Path) -> Result<usize>;

    async fn expand_task(&self, path: &Path, task: u32, options: ExpandOptions) -> Result<()>;

    async fn expand_all(&self, path: &Path, options: ExpandAllOptions) -> Result<()>;

    async fn analyze_complexity(&self, options: ComplexityOptions) -> Result<()>;

    async fn parse_prd(&self, input: &Path, output: &Path, options: ParsePrdOptions)
        -> Result<()>;

    /// Writes one text file per task into `output_dir`, returning the count.
    async fn generate_task_files(&self, path: &Path, output_dir: &Path) -> Result<usize>;

    async fn sync_readme(&self, project_root: &Path, options: ReadmeOptions) -> Result<()>;
}
