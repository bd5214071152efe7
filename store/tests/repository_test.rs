//! Integration tests for the file-backed task repository.
//!
//! These tests drive `JsonTaskRepository` through the `TaskRepository` trait
//! object, the way the sync service consumes it.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use taskboard_store::{
    IssueKind, JsonTaskRepository, NewTask, Priority, TaskRef, TaskRepository, TaskStatus,
};
use tempfile::TempDir;
use tokio_test::assert_ok;

// ============================================================================
// Helper Functions
// ============================================================================

fn repository() -> Arc<dyn TaskRepository> {
    Arc::new(JsonTaskRepository::new())
}

fn new_task(title: &str, priority: Priority, dependencies: Vec<u32>) -> NewTask {
    NewTask {
        title: title.to_string(),
        priority: Some(priority),
        dependencies,
        ..NewTask::default()
    }
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ============================================================================
// Workflow
// ============================================================================

#[tokio::test]
async fn next_task_follows_completion_order() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("tasks").join("tasks.json");
    let repo = repository();

    let design = assert_ok!(repo.add_task(&path, new_task("Design", Priority::High, vec![])).await);
    let build = assert_ok!(
        repo.add_task(&path, new_task("Build", Priority::Medium, vec![design]))
            .await
    );
    let polish = assert_ok!(repo.add_task(&path, new_task("Polish", Priority::Low, vec![])).await);
    assert_eq!((design, build, polish), (1, 2, 3));

    let mut order = Vec::new();
    while let Some(task) = assert_ok!(repo.next_task(&path).await) {
        order.push(task.id);
        assert_ok!(
            repo.set_task_status(&path, TaskRef::Task(task.id), TaskStatus::Done)
                .await
        );
    }

    assert_eq!(order, vec![1, 2, 3]);
    assert_eq!(file_names(path.parent().unwrap()), vec!["tasks.json"]);
}

#[tokio::test]
async fn rewrites_preserve_unknown_fields() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("tasks.json");
    fs::write(
        &path,
        r#"{
  "tasks": [{"id": 1, "title": "A", "status": "pending", "estimate": 3}],
  "metadata": {"projectName": "demo", "version": "1.0"}
}"#,
    )
    .unwrap();

    assert_ok!(
        repository()
            .set_task_status(&path, TaskRef::Task(1), TaskStatus::InProgress)
            .await
    );

    let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["tasks"][0]["status"], "in-progress");
    assert_eq!(raw["tasks"][0]["estimate"], 3);
    assert_eq!(raw["metadata"]["projectName"], "demo");
    assert_eq!(raw["metadata"]["version"], "1.0");
}

// ============================================================================
// Dependency repair
// ============================================================================

#[tokio::test]
async fn hand_edited_graph_is_reported_and_repaired() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("tasks.json");
    fs::write(
        &path,
        r#"{"tasks": [
            {"id": 1, "title": "A", "dependencies": [1, 9]},
            {"id": 2, "title": "B", "dependencies": [3]},
            {"id": 3, "title": "C", "dependencies": [2]}
        ]}"#,
    )
    .unwrap();
    let repo = repository();

    let report = assert_ok!(repo.validate_dependencies(&path).await);
    assert!(!report.valid);
    let kinds: Vec<IssueKind> = report.issues.iter().map(|i| i.kind).collect();
    assert!(kinds.contains(&IssueKind::SelfReference));
    assert!(kinds.contains(&IssueKind::Missing));
    assert!(kinds.contains(&IssueKind::Circular));

    assert_eq!(assert_ok!(repo.fix_dependencies(&path).await), 3);

    let report = assert_ok!(repo.validate_dependencies(&path).await);
    assert!(report.valid, "Unexpected issues: {:?}", report.issues);
    assert_eq!(assert_ok!(repo.fix_dependencies(&path).await), 0);
}
