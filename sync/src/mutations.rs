//! Mutation façade over the task repository.
//!
//! Every public operation here forwards its inputs unchanged to the
//! [`TaskRepository`] and converts the outcome into a [`MutationResult`].
//! Writing operations additionally:
//!
//! 1. wait for their turn on a FIFO write queue (one repository write at a
//!    time, in call order),
//! 2. raise self-change suppression for the duration of the write,
//! 3. refresh the shared fingerprint to the file as written, whether the
//!    write succeeded or not.
//!
//! Together these keep the change detector from reporting the service's
//! own writes, and keep concurrent callers from interleaving partial writes.
//!
//! After [`MutationFacade::dispose`] every call fails with
//! [`FailureKind::Disposed`]. A repository call already running completes,
//! but its fingerprint refresh is skipped.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use taskboard_store::{
    ComplexityOptions, ComplexityReport, ExpandAllOptions, ExpandOptions, NewSubtask, NewTask,
    ParsePrdOptions, ReadmeOptions, Task, TaskRef, TaskRepository, TaskStatus, TaskUpdate,
    ValidationReport,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{FailureKind, MutationError, MutationResult};
use crate::fingerprint::FingerprintStore;
use crate::suppressor::Suppressor;

/// Public mutation operations of the sync service.
pub struct MutationFacade {
    repository: Arc<dyn TaskRepository>,
    project_root: PathBuf,
    tasks_path: PathBuf,
    report_path: PathBuf,
    fingerprints: Arc<FingerprintStore>,
    suppressor: Arc<Suppressor>,
    write_queue: Mutex<()>,
    disposed: AtomicBool,
}

impl std::fmt::Debug for MutationFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationFacade")
            .field("tasks_path", &self.tasks_path)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

impl MutationFacade {
    #[must_use]
    pub fn new(
        config: &SyncConfig,
        repository: Arc<dyn TaskRepository>,
        fingerprints: Arc<FingerprintStore>,
        suppressor: Arc<Suppressor>,
    ) -> Self {
        Self {
            repository,
            project_root: config.project_root.clone(),
            tasks_path: config.tasks_path.clone(),
            report_path: config.report_path.clone(),
            fingerprints,
            suppressor,
            write_queue: Mutex::new(()),
            disposed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn tasks_path(&self) -> &Path {
        &self.tasks_path
    }

    /// Makes every later call fail with `FailureKind::Disposed`.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> MutationResult<()> {
        if self.is_disposed() {
            return Err(MutationError::disposed());
        }
        Ok(())
    }

    /// Runs one repository write inside the write queue and a suppression
    /// window, then refreshes the fingerprint.
    async fn write<T, F, Fut>(&self, op: &'static str, call: F) -> MutationResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = taskboard_store::Result<T>>,
    {
        self.ensure_live()?;
        let _turn = self.write_queue.lock().await;
        self.ensure_live()?;

        let result = {
            let _suppressed = self.suppressor.begin();
            let result = call().await;
            if !self.is_disposed() {
                self.fingerprints.refresh(&self.tasks_path);
            }
            result
        };

        self.finish(op, result)
    }

    /// Runs one repository read. Reads bypass the write queue.
    async fn read<T, Fut>(&self, op: &'static str, call: Fut) -> MutationResult<T>
    where
        Fut: Future<Output = taskboard_store::Result<T>>,
    {
        self.ensure_live()?;
        let result = call.await;
        self.finish(op, result)
    }

    fn finish<T>(&self, op: &'static str, result: taskboard_store::Result<T>) -> MutationResult<T> {
        match result {
            Ok(value) => {
                debug!(op, "Task store operation succeeded");
                Ok(value)
            }
            Err(e) => {
                warn!(op, error = %e, "Task store operation failed");
                Err(e.into())
            }
        }
    }

    // =========================================================================
    // Tasks
    // =========================================================================

    pub async fn update_task_status(&self, task: TaskRef, status: TaskStatus) -> MutationResult<()> {
        self.write("update_task_status", || {
            self.repository
                .set_task_status(&self.tasks_path, task, status)
        })
        .await
    }

    /// Adds a task and returns its id.
    pub async fn add_task(&self, task: NewTask) -> MutationResult<u32> {
        self.write("add_task", || self.repository.add_task(&self.tasks_path, task))
            .await
    }

    pub async fn remove_task(&self, task: TaskRef) -> MutationResult<()> {
        self.write("remove_task", || {
            self.repository.remove_task(&self.tasks_path, task)
        })
        .await
    }

    pub async fn update_task(&self, task: u32, update: TaskUpdate) -> MutationResult<()> {
        self.write("update_task", || {
            self.repository.update_task(&self.tasks_path, task, update)
        })
        .await
    }

    // =========================================================================
    // Subtasks
    // =========================================================================

    /// Adds a subtask under `parent` and returns its id.
    pub async fn add_subtask(&self, parent: u32, subtask: NewSubtask) -> MutationResult<u32> {
        self.write("add_subtask", || {
            self.repository
                .add_subtask(&self.tasks_path, parent, subtask)
        })
        .await
    }

    pub async fn remove_subtask(&self, subtask: TaskRef) -> MutationResult<()> {
        self.write("remove_subtask", || {
            self.repository.remove_subtask(&self.tasks_path, subtask)
        })
        .await
    }

    pub async fn update_subtask(&self, subtask: TaskRef, update: TaskUpdate) -> MutationResult<()> {
        self.write("update_subtask", || {
            self.repository
                .update_subtask(&self.tasks_path, subtask, update)
        })
        .await
    }

    /// Removes the subtasks of every task that has any, returning how many
    /// tasks were cleared.
    ///
    /// Only the `all` form exists; `all == false` fails with
    /// `FailureKind::NotImplemented`.
    pub async fn clear_subtasks(&self, all: bool) -> MutationResult<usize> {
        if !all {
            return Err(MutationError::new(
                FailureKind::NotImplemented,
                "selective subtask clearing is not implemented",
            ));
        }

        self.write("clear_subtasks", || self.clear_all_subtasks())
            .await
    }

    async fn clear_all_subtasks(&self) -> taskboard_store::Result<usize> {
        let tasks = self
            .repository
            .list_tasks(&self.tasks_path, None, true)
            .await?;
        let ids: Vec<String> = tasks
            .iter()
            .filter(|t| !t.subtasks.is_empty())
            .map(|t| t.id.to_string())
            .collect();

        if ids.is_empty() {
            return Ok(0);
        }

        let joined = ids.join(",");
        self.repository
            .clear_subtasks(&self.tasks_path, &joined)
            .await?;
        info!(tasks = %joined, "Cleared all subtasks");
        Ok(ids.len())
    }

    // =========================================================================
    // Dependencies
    // =========================================================================

    pub async fn add_dependency(&self, task: TaskRef, depends_on: TaskRef) -> MutationResult<()> {
        self.write("add_dependency", || {
            self.repository
                .add_dependency(&self.tasks_path, task, depends_on)
        })
        .await
    }

    pub async fn remove_dependency(
        &self,
        task: TaskRef,
        depends_on: TaskRef,
    ) -> MutationResult<()> {
        self.write("remove_dependency", || {
            self.repository
                .remove_dependency(&self.tasks_path, task, depends_on)
        })
        .await
    }

    pub async fn validate_dependencies(&self) -> MutationResult<ValidationReport> {
        self.read(
            "validate_dependencies",
            self.repository.validate_dependencies(&self.tasks_path),
        )
        .await
    }

    /// Removes invalid dependency edges, returning how many were dropped.
    pub async fn fix_dependencies(&self) -> MutationResult<usize> {
        self.write("fix_dependencies", || {
            self.repository.fix_dependencies(&self.tasks_path)
        })
        .await
    }

    // =========================================================================
    // Generation and reports
    // =========================================================================

    pub async fn expand_task(&self, task: u32, options: ExpandOptions) -> MutationResult<()> {
        self.write("expand_task", || {
            self.repository
                .expand_task(&self.tasks_path, task, options)
        })
        .await
    }

    pub async fn expand_all(&self, options: ExpandAllOptions) -> MutationResult<()> {
        self.write("expand_all", || {
            self.repository.expand_all(&self.tasks_path, options)
        })
        .await
    }

    /// Analyzes task complexity into the configured report file.
    pub async fn analyze_complexity(&self, threshold: u8, use_research: bool) -> MutationResult<()> {
        let options = ComplexityOptions {
            tasks_path: self.tasks_path.clone(),
            output_path: self.report_path.clone(),
            threshold,
            use_research,
        };

        self.write("analyze_complexity", || {
            self.repository.analyze_complexity(options)
        })
        .await
    }

    /// Generates tasks from a PRD document into the task store.
    pub async fn parse_prd(&self, input: &Path, options: ParsePrdOptions) -> MutationResult<()> {
        self.write("parse_prd", || {
            self.repository
                .parse_prd(input, &self.tasks_path, options)
        })
        .await
    }

    /// Writes one text file per task into `output_dir`.
    pub async fn generate_task_files(&self, output_dir: &Path) -> MutationResult<usize> {
        self.write("generate_task_files", || {
            self.repository
                .generate_task_files(&self.tasks_path, output_dir)
        })
        .await
    }

    /// Rewrites the task table in the project README.
    pub async fn sync_readme(
        &self,
        with_subtasks: bool,
        status: Option<TaskStatus>,
    ) -> MutationResult<()> {
        let options = ReadmeOptions {
            tasks_path: self.tasks_path.clone(),
            with_subtasks,
            status,
        };

        self.write("sync_readme", || {
            self.repository.sync_readme(&self.project_root, options)
        })
        .await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn find_task(&self, task: TaskRef) -> MutationResult<Option<Task>> {
        self.read(
            "find_task",
            self.repository.find_task(&self.tasks_path, task),
        )
        .await
    }

    /// The next task eligible to be worked on.
    pub async fn next_task(&self) -> MutationResult<Option<Task>> {
        self.read("next_task", self.repository.next_task(&self.tasks_path))
            .await
    }

    /// Loads the complexity report, or `None` if none was generated yet.
    pub async fn complexity_report(&self) -> MutationResult<Option<ComplexityReport>> {
        self.ensure_live()?;

        let content = match tokio::fs::read_to_string(&self.report_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!(path = %self.report_path.display(), error = %e, "Failed to read complexity report");
                return Err(MutationError::new(FailureKind::Io, e.to_string()));
            }
        };

        serde_json::from_str(&content).map(Some).map_err(|e| {
            warn!(path = %self.report_path.display(), error = %e, "Corrupt complexity report");
            MutationError::new(FailureKind::Corrupt, e.to_string())
        })
    }
}
