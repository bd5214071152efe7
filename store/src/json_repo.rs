//! File-backed [`TaskRepository`] over a JSON task store.
//!
//! Every mutation is a read-modify-write of the whole document. Writes go to
//! a hidden sibling temp file which is then renamed over the target, so a
//! concurrent reader sees either the old or the new document, never a
//! partial one.
//!
//! AI-backed capabilities (expansion, complexity analysis, PRD parsing) are
//! not available here and report [`RepoError::Unsupported`].
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use taskboard_store::{JsonTaskRepository, NewTask, TaskRepository};
//!
//! # async fn example() -> taskboard_store::Result<()> {
//! let repo = JsonTaskRepository::new();
//! let path = Path::new(".taskmaster/tasks/tasks.json");
//!
//! let id = repo
//!     .add_task(path, NewTask { title: "Write docs".to_string(), ..NewTask::default() })
//!     .await?;
//! println!("created task {id}");
//! # Ok(())
//! # }
//! ```

use std::cmp::Reverse;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::dependencies;
use crate::error::{RepoError, Result};
use crate::export::{render_readme_section, render_task_file, splice_readme, task_file_name};
use crate::repository::{
    ComplexityOptions, ExpandAllOptions, ExpandOptions, NewSubtask, NewTask, ParsePrdOptions,
    ReadmeOptions, TaskRepository, TaskUpdate, ValidationReport,
};
use crate::types::{Subtask, Task, TaskDocument, TaskRef, TaskStatus};

/// README file name used by [`TaskRepository::sync_readme`].
const README_FILE: &str = "README.md";

/// Task repository reading and writing a JSON document on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTaskRepository;

impl JsonTaskRepository {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Loads the document. A missing or blank file is an empty store.
    pub async fn load(&self, path: &Path) -> Result<TaskDocument> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(TaskDocument::default()),
            Err(e) => return Err(RepoError::io(path, e)),
        };

        if content.trim().is_empty() {
            return Ok(TaskDocument::default());
        }

        serde_json::from_str(&content).map_err(|e| RepoError::corrupt(path, e))
    }

    /// Writes the document atomically (temp file + rename).
    pub async fn save(&self, path: &Path, doc: &TaskDocument) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RepoError::io(parent, e))?;
        }

        let mut body = serde_json::to_string_pretty(doc).map_err(|e| RepoError::corrupt(path, e))?;
        body.push('\n');

        let tmp = temp_path(path);
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| RepoError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| RepoError::io(path, e))?;

        debug!(path = %path.display(), tasks = doc.tasks.len(), "Wrote task store");
        Ok(())
    }

    /// Loads, applies `f`, and saves only if `f` succeeded and changed the
    /// document.
    async fn modify<T>(
        &self,
        path: &Path,
        f: impl FnOnce(&mut TaskDocument) -> Result<T> + Send,
    ) -> Result<T> {
        let mut doc = self.load(path).await?;
        let before = doc.clone();
        let value = f(&mut doc)?;

        if doc == before {
            debug!(path = %path.display(), "Task store unchanged, skipping write");
        } else {
            self.save(path, &doc).await?;
        }
        Ok(value)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tasks.json".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn require_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(RepoError::Validation("title cannot be empty".to_string()));
    }
    Ok(())
}

fn apply_update(
    update: TaskUpdate,
    title: &mut String,
    description: &mut String,
    details: &mut String,
    test_strategy: &mut String,
) {
    if let Some(v) = update.title {
        *title = v;
    }
    if let Some(v) = update.description {
        *description = v;
    }
    if let Some(v) = update.details {
        *details = v;
    }
    if let Some(v) = update.test_strategy {
        *test_strategy = v;
    }
    if let Some(extra) = update.append_details {
        if !details.is_empty() {
            details.push('\n');
        }
        details.push_str(&extra);
    }
}

fn find_subtask_mut(doc: &mut TaskDocument, r: TaskRef) -> Result<&mut Subtask> {
    let TaskRef::Subtask { parent, id } = r else {
        return Err(RepoError::Validation(format!(
            "{r} is a task, expected a subtask reference"
        )));
    };
    doc.task_mut(parent)
        .and_then(|t| t.subtask_mut(id))
        .ok_or(RepoError::NotFound(r))
}

fn remove_subtask_from(doc: &mut TaskDocument, r: TaskRef) -> Result<()> {
    let TaskRef::Subtask { parent, id } = r else {
        return Err(RepoError::Validation(format!(
            "{r} is a task, expected a subtask reference"
        )));
    };
    let task = doc.task_mut(parent).ok_or(RepoError::NotFound(r))?;
    let before = task.subtasks.len();
    task.subtasks.retain(|s| s.id != id);
    if task.subtasks.len() == before {
        return Err(RepoError::NotFound(r));
    }
    for sub in &mut task.subtasks {
        sub.dependencies.retain(|d| *d != id);
    }
    Ok(())
}

/// Resolves a dependency edge to `(graph, from, to)` where `graph` is `None`
/// for the top-level graph and `Some(parent)` for a subtask graph.
fn edge_scope(task: TaskRef, depends_on: TaskRef) -> Result<(Option<u32>, u32, u32)> {
    match (task, depends_on) {
        (TaskRef::Task(from), TaskRef::Task(to)) => Ok((None, from, to)),
        (
            TaskRef::Subtask { parent, id: from },
            TaskRef::Subtask {
                parent: other,
                id: to,
            },
        ) if parent == other => Ok((Some(parent), from, to)),
        // Subtasks depend on siblings only, never on their own parent.
        _ => Err(RepoError::Validation(format!(
            "{task} cannot depend on {depends_on}: only task to task and sibling subtask edges are allowed"
        ))),
    }
}

fn dependency_list<'a>(
    doc: &'a mut TaskDocument,
    scope: Option<u32>,
    from: u32,
    task: TaskRef,
) -> Result<&'a mut Vec<u32>> {
    match scope {
        None => doc
            .task_mut(from)
            .map(|t| &mut t.dependencies)
            .ok_or(RepoError::NotFound(task)),
        Some(parent) => doc
            .task_mut(parent)
            .and_then(|t| t.subtask_mut(from))
            .map(|s| &mut s.dependencies)
            .ok_or(RepoError::NotFound(task)),
    }
}

fn node_exists(doc: &TaskDocument, scope: Option<u32>, id: u32) -> bool {
    match scope {
        None => doc.task(id).is_some(),
        Some(parent) => doc.task(parent).and_then(|t| t.subtask(id)).is_some(),
    }
}

fn would_cycle(doc: &TaskDocument, scope: Option<u32>, from: u32, to: u32) -> bool {
    match scope {
        None => {
            let edges: Vec<(u32, &[u32])> = doc
                .tasks
                .iter()
                .map(|t| (t.id, t.dependencies.as_slice()))
                .collect();
            dependencies::creates_cycle(&edges, from, to)
        }
        Some(parent) => doc.task(parent).is_some_and(|t| {
            let edges: Vec<(u32, &[u32])> = t
                .subtasks
                .iter()
                .map(|s| (s.id, s.dependencies.as_slice()))
                .collect();
            dependencies::creates_cycle(&edges, from, to)
        }),
    }
}

fn unsupported(capability: &str) -> RepoError {
    RepoError::Unsupported(format!("{capability} requires an AI-backed task repository"))
}

#[async_trait]
impl TaskRepository for JsonTaskRepository {
    async fn list_tasks(
        &self,
        path: &Path,
        status: Option<TaskStatus>,
        with_subtasks: bool,
    ) -> Result<Vec<Task>> {
        let doc = self.load(path).await?;

        Ok(doc
            .tasks
            .into_iter()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .map(|mut t| {
                if !with_subtasks {
                    t.subtasks.clear();
                }
                t
            })
            .collect())
    }

    async fn find_task(&self, path: &Path, task: TaskRef) -> Result<Option<Task>> {
        let doc = self.load(path).await?;
        let found = doc.task(task.root()).filter(|t| match task {
            TaskRef::Task(_) => true,
            TaskRef::Subtask { id, .. } => t.subtask(id).is_some(),
        });
        Ok(found.cloned())
    }

    async fn next_task(&self, path: &Path) -> Result<Option<Task>> {
        let doc = self.load(path).await?;
        let done: HashSet<u32> = doc
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Done)
            .map(|t| t.id)
            .collect();

        Ok(doc
            .tasks
            .iter()
            .filter(|t| t.status.is_actionable())
            .filter(|t| t.dependencies.iter().all(|d| done.contains(d)))
            .min_by_key(|t| (Reverse(t.priority.weight()), t.id))
            .cloned())
    }

    async fn set_task_status(
        &self,
        path: &Path,
        task: TaskRef,
        status: TaskStatus,
    ) -> Result<()> {
        self.modify(path, |doc| {
            match task {
                TaskRef::Task(id) => {
                    let t = doc.task_mut(id).ok_or(RepoError::NotFound(task))?;
                    t.status = status;
                    if status == TaskStatus::Done {
                        for sub in &mut t.subtasks {
                            sub.status = TaskStatus::Done;
                        }
                    }
                }
                TaskRef::Subtask { .. } => {
                    find_subtask_mut(doc, task)?.status = status;
                }
            }
            Ok(())
        })
        .await?;

        info!(task = %task, status = %status, "Updated task status");
        Ok(())
    }

    async fn add_task(&self, path: &Path, task: NewTask) -> Result<u32> {
        require_title(&task.title)?;

        let id = self
            .modify(path, |doc| {
                if let Some(missing) = task.dependencies.iter().find(|d| doc.task(**d).is_none()) {
                    return Err(RepoError::Validation(format!(
                        "dependency {missing} does not exist"
                    )));
                }

                let id = doc.next_task_id();
                let mut new = Task::new(id, task.title);
                new.description = task.description;
                new.details = task.details;
                new.test_strategy = task.test_strategy;
                new.priority = task.priority.unwrap_or_default();
                new.dependencies = task.dependencies;
                doc.tasks.push(new);
                Ok(id)
            })
            .await?;

        info!(task = id, "Added task");
        Ok(id)
    }

    async fn remove_task(&self, path: &Path, task: TaskRef) -> Result<()> {
        self.modify(path, |doc| match task {
            TaskRef::Task(id) => {
                let before = doc.tasks.len();
                doc.tasks.retain(|t| t.id != id);
                if doc.tasks.len() == before {
                    return Err(RepoError::NotFound(task));
                }
                for t in &mut doc.tasks {
                    t.dependencies.retain(|d| *d != id);
                }
                Ok(())
            }
            TaskRef::Subtask { .. } => remove_subtask_from(doc, task),
        })
        .await?;

        info!(task = %task, "Removed task");
        Ok(())
    }

    async fn update_task(&self, path: &Path, task: u32, update: TaskUpdate) -> Result<()> {
        if update.is_empty() {
            return Err(RepoError::Validation("no fields to update".to_string()));
        }

        self.modify(path, |doc| {
            let t = doc
                .task_mut(task)
                .ok_or(RepoError::NotFound(TaskRef::Task(task)))?;
            if let Some(priority) = update.priority {
                t.priority = priority;
            }
            apply_update(
                update,
                &mut t.title,
                &mut t.description,
                &mut t.details,
                &mut t.test_strategy,
            );
            require_title(&t.title)
        })
        .await
    }

    async fn add_subtask(&self, path: &Path, parent: u32, subtask: NewSubtask) -> Result<u32> {
        require_title(&subtask.title)?;

        self.modify(path, |doc| {
            let t = doc
                .task_mut(parent)
                .ok_or(RepoError::NotFound(TaskRef::Task(parent)))?;

            if let Some(missing) = subtask.dependencies.iter().find(|d| t.subtask(**d).is_none()) {
                return Err(RepoError::Validation(format!(
                    "subtask dependency {parent}.{missing} does not exist"
                )));
            }

            let id = t.next_subtask_id();
            t.subtasks.push(Subtask {
                id,
                title: subtask.title,
                description: subtask.description,
                details: subtask.details,
                test_strategy: String::new(),
                status: subtask.status.unwrap_or_default(),
                priority: None,
                dependencies: subtask.dependencies,
                extra: serde_json::Map::new(),
            });
            Ok(id)
        })
        .await
    }

    async fn remove_subtask(&self, path: &Path, subtask: TaskRef) -> Result<()> {
        self.modify(path, |doc| remove_subtask_from(doc, subtask))
            .await
    }

    async fn update_subtask(
        &self,
        path: &Path,
        subtask: TaskRef,
        update: TaskUpdate,
    ) -> Result<()> {
        if update.is_empty() {
            return Err(RepoError::Validation("no fields to update".to_string()));
        }

        self.modify(path, |doc| {
            let sub = find_subtask_mut(doc, subtask)?;
            if let Some(priority) = update.priority {
                sub.priority = Some(priority);
            }
            apply_update(
                update,
                &mut sub.title,
                &mut sub.description,
                &mut sub.details,
                &mut sub.test_strategy,
            );
            require_title(&sub.title)
        })
        .await
    }

    async fn clear_subtasks(&self, path: &Path, task_ids: &str) -> Result<()> {
        let ids = task_ids
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| match s.parse::<TaskRef>()? {
                TaskRef::Task(id) => Ok(id),
                sub @ TaskRef::Subtask { .. } => Err(RepoError::Validation(format!(
                    "{sub} is a subtask, expected a task id"
                ))),
            })
            .collect::<Result<Vec<u32>>>()?;

        if ids.is_empty() {
            return Err(RepoError::Validation("no task ids given".to_string()));
        }

        self.modify(path, |doc| {
            if let Some(missing) = ids.iter().find(|id| doc.task(**id).is_none()) {
                return Err(RepoError::NotFound(TaskRef::Task(*missing)));
            }
            for id in &ids {
                if let Some(t) = doc.task_mut(*id) {
                    t.subtasks.clear();
                }
            }
            Ok(())
        })
        .await?;

        info!(tasks = %task_ids, "Cleared subtasks");
        Ok(())
    }

    async fn add_dependency(
        &self,
        path: &Path,
        task: TaskRef,
        depends_on: TaskRef,
    ) -> Result<()> {
        let (scope, from, to) = edge_scope(task, depends_on)?;
        if from == to {
            return Err(RepoError::Validation(format!("{task} cannot depend on itself")));
        }

        self.modify(path, |doc| {
            if !node_exists(doc, scope, to) {
                return Err(RepoError::NotFound(depends_on));
            }
            if !node_exists(doc, scope, from) {
                return Err(RepoError::NotFound(task));
            }
            if would_cycle(doc, scope, from, to) {
                return Err(RepoError::Validation(format!(
                    "adding {task} -> {depends_on} would create a circular dependency"
                )));
            }

            let deps = dependency_list(doc, scope, from, task)?;
            if !deps.contains(&to) {
                deps.push(to);
                deps.sort_unstable();
            }
            Ok(())
        })
        .await
    }

    async fn remove_dependency(
        &self,
        path: &Path,
        task: TaskRef,
        depends_on: TaskRef,
    ) -> Result<()> {
        let (scope, from, to) = edge_scope(task, depends_on)?;

        self.modify(path, |doc| {
            let deps = dependency_list(doc, scope, from, task)?;
            deps.retain(|d| *d != to);
            Ok(())
        })
        .await
    }

    async fn validate_dependencies(&self, path: &Path) -> Result<ValidationReport> {
        let doc = self.load(path).await?;
        Ok(dependencies::validate(&doc))
    }

    async fn fix_dependencies(&self, path: &Path) -> Result<usize> {
        let mut doc = self.load(path).await?;
        let removed = dependencies::fix(&mut doc);

        if removed > 0 {
            self.save(path, &doc).await?;
            info!(removed, "Removed invalid dependencies");
        }
        Ok(removed)
    }

    async fn expand_task(&self, _path: &Path, _task: u32, _options: ExpandOptions) -> Result<()> {
        Err(unsupported("task expansion"))
    }

    async fn expand_all(&self, _path: &Path, _options: ExpandAllOptions) -> Result<()> {
        Err(unsupported("task expansion"))
    }

    async fn analyze_complexity(&self, _options: ComplexityOptions) -> Result<()> {
        Err(unsupported("complexity analysis"))
    }

    async fn parse_prd(
        &self,
        _input: &Path,
        _output: &Path,
        _options: ParsePrdOptions,
    ) -> Result<()> {
        Err(unsupported("PRD parsing"))
    }

    async fn generate_task_files(&self, path: &Path, output_dir: &Path) -> Result<usize> {
        let doc = self.load(path).await?;
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| RepoError::io(output_dir, e))?;

        for task in &doc.tasks {
            let file = output_dir.join(task_file_name(task.id));
            tokio::fs::write(&file, render_task_file(task))
                .await
                .map_err(|e| RepoError::io(&file, e))?;
        }

        info!(
            count = doc.tasks.len(),
            dir = %output_dir.display(),
            "Generated task files"
        );
        Ok(doc.tasks.len())
    }

    async fn sync_readme(&self, project_root: &Path, options: ReadmeOptions) -> Result<()> {
        let tasks_path = resolve(project_root, &options.tasks_path);
        let doc = self.load(&tasks_path).await?;
        let section = render_readme_section(&doc.tasks, options.status, options.with_subtasks);

        let readme_path = project_root.join(README_FILE);
        let existing = match tokio::fs::read_to_string(&readme_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(RepoError::io(&readme_path, e)),
        };

        tokio::fs::write(&readme_path, splice_readme(&existing, &section))
            .await
            .map_err(|e| RepoError::io(&readme_path, e))?;

        info!(path = %readme_path.display(), "Synced README task table");
        Ok(())
    }
}
