//! Read model construction.
//!
//! The read model is the snapshot handed to the UI: the full task list
//! (subtasks included) plus a few aggregate counters. Building one never
//! fails. An absent task file or a repository error both yield the empty
//! model, so a broken store shows up as an empty board instead of an error
//! somewhere up the stack.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskboard_store::{Task, TaskRepository, TaskStatus};
use tracing::{debug, warn};

/// Aggregate counters over the top-level tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadModelMetadata {
    pub total_tasks: usize,
    pub pending_tasks: usize,
    pub completed_tasks: usize,
    pub in_progress_tasks: usize,
    /// When this snapshot was built, not when the file was modified.
    pub last_updated: DateTime<Utc>,
}

/// Snapshot of the task store served to the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadModel {
    pub tasks: Vec<Task>,
    pub metadata: ReadModelMetadata,
}

impl ReadModel {
    /// The zero-value model: no tasks, all counters 0.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_tasks(Vec::new())
    }

    /// Computes metadata for `tasks` in one pass. Subtasks are not counted,
    /// and statuses other than pending, in-progress and done only count
    /// towards the total.
    #[must_use]
    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        let mut metadata = ReadModelMetadata {
            total_tasks: tasks.len(),
            pending_tasks: 0,
            completed_tasks: 0,
            in_progress_tasks: 0,
            last_updated: Utc::now(),
        };

        for task in &tasks {
            match task.status {
                TaskStatus::Pending => metadata.pending_tasks += 1,
                TaskStatus::InProgress => metadata.in_progress_tasks += 1,
                TaskStatus::Done => metadata.completed_tasks += 1,
                TaskStatus::Deferred | TaskStatus::Cancelled | TaskStatus::Review => {}
            }
        }

        Self { tasks, metadata }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Builds read models from the task repository.
#[derive(Clone)]
pub struct ReadModelBuilder {
    repository: Arc<dyn TaskRepository>,
    tasks_path: PathBuf,
}

impl std::fmt::Debug for ReadModelBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadModelBuilder")
            .field("tasks_path", &self.tasks_path)
            .finish_non_exhaustive()
    }
}

impl ReadModelBuilder {
    #[must_use]
    pub fn new(repository: Arc<dyn TaskRepository>, tasks_path: impl Into<PathBuf>) -> Self {
        Self {
            repository,
            tasks_path: tasks_path.into(),
        }
    }

    /// Loads the task list and builds a snapshot. Never fails.
    pub async fn build(&self) -> ReadModel {
        match tokio::fs::try_exists(&self.tasks_path).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(path = %self.tasks_path.display(), "Task file absent, serving empty model");
                return ReadModel::empty();
            }
            Err(e) => {
                warn!(path = %self.tasks_path.display(), error = %e, "Failed to check for task file");
                return ReadModel::empty();
            }
        }

        match self.repository.list_tasks(&self.tasks_path, None, true).await {
            Ok(tasks) => ReadModel::from_tasks(tasks),
            Err(e) => {
                warn!(path = %self.tasks_path.display(), error = %e, "Failed to load tasks");
                ReadModel::empty()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskboard_store::{JsonTaskRepository, Subtask};

    fn builder_for(path: impl Into<PathBuf>) -> ReadModelBuilder {
        ReadModelBuilder::new(Arc::new(JsonTaskRepository::new()), path)
    }

    #[test]
    fn counts_partition_top_level_tasks() {
        let model = ReadModel::from_tasks(vec![
            Task::new(1, "a").with_status(TaskStatus::Pending),
            Task::new(2, "b").with_status(TaskStatus::InProgress),
            Task::new(3, "c").with_status(TaskStatus::Done),
        ]);

        assert_eq!(model.metadata.total_tasks, 3);
        assert_eq!(model.metadata.pending_tasks, 1);
        assert_eq!(model.metadata.in_progress_tasks, 1);
        assert_eq!(model.metadata.completed_tasks, 1);
    }

    #[test]
    fn other_statuses_only_count_towards_total() {
        let mut parent = Task::new(1, "parent").with_status(TaskStatus::Deferred);
        parent.subtasks.push(Subtask {
            id: 1,
            title: "child".to_string(),
            description: String::new(),
            details: String::new(),
            test_strategy: String::new(),
            status: TaskStatus::Done,
            priority: None,
            dependencies: Vec::new(),
            extra: serde_json::Map::new(),
        });

        let model = ReadModel::from_tasks(vec![
            parent,
            Task::new(2, "b").with_status(TaskStatus::Cancelled),
            Task::new(3, "c").with_status(TaskStatus::Review),
        ]);

        assert_eq!(model.metadata.total_tasks, 3);
        assert_eq!(model.metadata.pending_tasks, 0);
        assert_eq!(model.metadata.in_progress_tasks, 0);
        assert_eq!(model.metadata.completed_tasks, 0);
    }

    #[test]
    fn metadata_serializes_camel_case() {
        let value = serde_json::to_value(ReadModel::empty()).unwrap();

        assert_eq!(value["tasks"], serde_json::json!([]));
        assert_eq!(value["metadata"]["totalTasks"], 0);
        assert_eq!(value["metadata"]["inProgressTasks"], 0);
        assert!(value["metadata"]["lastUpdated"].is_string());
    }

    #[tokio::test]
    async fn missing_file_builds_empty_model() {
        let dir = tempfile::tempdir().unwrap();
        let model = builder_for(dir.path().join("tasks.json")).build().await;

        assert!(model.is_empty());
        assert_eq!(model.metadata.total_tasks, 0);
        assert_eq!(model.metadata.pending_tasks, 0);
        assert_eq!(model.metadata.completed_tasks, 0);
        assert_eq!(model.metadata.in_progress_tasks, 0);
    }

    #[tokio::test]
    async fn corrupt_file_builds_empty_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(&path, "{ broken").unwrap();

        let model = builder_for(&path).build().await;
        assert!(model.is_empty());
    }

    #[tokio::test]
    async fn builds_from_store_with_subtasks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(
            &path,
            r#"{"tasks": [
                {"id": 1, "title": "A", "status": "pending"},
                {"id": 2, "title": "B", "status": "in-progress",
                 "subtasks": [{"id": 1, "title": "B1", "status": "done"}]},
                {"id": 3, "title": "C", "status": "done"}
            ]}"#,
        )
        .unwrap();

        let before = Utc::now();
        let model = builder_for(&path).build().await;

        assert_eq!(model.metadata.total_tasks, 3);
        assert_eq!(model.metadata.pending_tasks, 1);
        assert_eq!(model.metadata.in_progress_tasks, 1);
        assert_eq!(model.metadata.completed_tasks, 1);
        assert_eq!(model.tasks[1].subtasks.len(), 1);
        assert!(model.metadata.last_updated >= before);
    }
}
