//! The sync service composition root.
//!
//! [`SyncService`] owns one instance of every synchronization component for
//! a single project: the shared fingerprint store and suppressor, the
//! mutation façade, the read model builder and, once started, the poller.
//! Nothing is global, so several services (or tests) can run side by side.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use taskboard_store::{JsonTaskRepository, TaskRef, TaskStatus};
//! use taskboard_sync::{SyncConfig, SyncService};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = SyncService::new(
//!         SyncConfig::for_project("."),
//!         Arc::new(JsonTaskRepository::new()),
//!     );
//!
//!     let (tx, mut rx) = mpsc::channel(16);
//!     service.start(tx)?;
//!
//!     service
//!         .mutations()
//!         .update_task_status(TaskRef::Task(1), TaskStatus::Done)
//!         .await?;
//!
//!     while let Some(model) = rx.recv().await {
//!         println!("{} tasks", model.metadata.total_tasks);
//!     }
//!
//!     service.dispose();
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use taskboard_store::TaskRepository;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{SyncConfig, WatchBackend};
use crate::detector::{ChangeDetector, PollingDetector};
use crate::error::{Result, SyncError};
use crate::fingerprint::FingerprintStore;
use crate::mutations::MutationFacade;
use crate::poller::Poller;
use crate::read_model::{ReadModel, ReadModelBuilder};
use crate::suppressor::Suppressor;
use crate::watch::NotifyDetector;

/// Task store synchronization for one project.
#[derive(Debug)]
pub struct SyncService {
    config: SyncConfig,
    fingerprints: Arc<FingerprintStore>,
    suppressor: Arc<Suppressor>,
    builder: ReadModelBuilder,
    mutations: Arc<MutationFacade>,
    poller: Mutex<Option<Poller>>,
    disposed: AtomicBool,
}

impl SyncService {
    /// Wires the components for `config` around `repository`. Nothing runs
    /// until [`start`](Self::start).
    #[must_use]
    pub fn new(config: SyncConfig, repository: Arc<dyn TaskRepository>) -> Self {
        let fingerprints = Arc::new(FingerprintStore::new());
        let suppressor = Arc::new(Suppressor::new(config.timings.grace_delay));
        let builder = ReadModelBuilder::new(repository.clone(), config.tasks_path.clone());
        let mutations = Arc::new(MutationFacade::new(
            &config,
            repository,
            fingerprints.clone(),
            suppressor.clone(),
        ));

        Self {
            config,
            fingerprints,
            suppressor,
            builder,
            mutations,
            poller: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The mutation façade, shareable across tasks.
    #[must_use]
    pub fn mutations(&self) -> Arc<MutationFacade> {
        self.mutations.clone()
    }

    /// Builds a read model on demand, outside the polling schedule.
    pub async fn read_model(&self) -> ReadModel {
        self.builder.build().await
    }

    /// Creates a change detector for the configured backend, sharing this
    /// service's fingerprint store and suppressor.
    ///
    /// A notify backend that cannot start (for example because the task
    /// directory does not exist yet) falls back to polling.
    #[must_use]
    pub fn detector(&self) -> Box<dyn ChangeDetector> {
        let polling = || {
            PollingDetector::new(
                &self.config.tasks_path,
                self.fingerprints.clone(),
                self.suppressor.clone(),
                &self.config.timings,
            )
        };

        match self.config.backend {
            WatchBackend::Poll => Box::new(polling()),
            WatchBackend::Notify => match NotifyDetector::new(polling()) {
                Ok(detector) => Box::new(detector),
                Err(e) => {
                    warn!(error = %e, "Notify backend unavailable, falling back to polling");
                    Box::new(polling())
                }
            },
        }
    }

    /// Starts the poller. Read models are sent on `updates`, the first one
    /// right after startup.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::AlreadyStarted` if the poller is running and
    /// `SyncError::Disposed` after [`dispose`](Self::dispose).
    pub fn start(&self, updates: mpsc::Sender<ReadModel>) -> Result<()> {
        if self.is_disposed() {
            return Err(SyncError::Disposed);
        }

        let mut poller = self.poller.lock();
        if poller.as_ref().is_some_and(Poller::is_running) {
            return Err(SyncError::AlreadyStarted);
        }

        *poller = Some(Poller::spawn(
            self.detector(),
            self.builder.clone(),
            self.config.timings,
            updates,
        ));

        info!(
            path = %self.config.tasks_path.display(),
            backend = %self.config.backend,
            "Sync service started"
        );
        Ok(())
    }

    /// Returns true while the poller is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.poller.lock().as_ref().is_some_and(Poller::is_running)
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Stops the poller and disposes the mutation façade. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(poller) = self.poller.lock().take() {
            poller.dispose();
        }
        self.mutations.dispose();
        self.fingerprints.clear();

        debug!(path = %self.config.tasks_path.display(), "Sync service disposed");
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncTimings;
    use crate::error::FailureKind;
    use std::time::Duration;
    use taskboard_store::{JsonTaskRepository, TaskRef, TaskStatus};
    use tempfile::TempDir;
    use tokio::time::timeout;

    fn service(backend: WatchBackend) -> (TempDir, SyncService) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = SyncConfig::for_project(dir.path())
            .with_timings(SyncTimings {
                poll_interval: Duration::from_millis(1000),
                ..SyncTimings::default()
            })
            .with_backend(backend);
        std::fs::create_dir_all(config.tasks_path.parent().unwrap()).unwrap();
        std::fs::write(
            &config.tasks_path,
            r#"{"tasks": [{"id": 1, "title": "A"}, {"id": 2, "title": "B", "status": "done"}]}"#,
        )
        .unwrap();

        let service = SyncService::new(config, Arc::new(JsonTaskRepository::new()));
        (dir, service)
    }

    #[tokio::test(start_paused = true)]
    async fn start_delivers_initial_model() {
        let (_dir, service) = service(WatchBackend::Poll);
        let (tx, mut rx) = mpsc::channel(4);

        service.start(tx).unwrap();
        assert!(service.is_running());

        let model = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("Should deliver the initial model")
            .unwrap();
        assert_eq!(model.metadata.total_tasks, 2);
        assert_eq!(model.metadata.completed_tasks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_is_rejected() {
        let (_dir, service) = service(WatchBackend::Poll);
        let (tx, _rx) = mpsc::channel(4);

        service.start(tx.clone()).unwrap();
        assert!(matches!(service.start(tx), Err(SyncError::AlreadyStarted)));
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_stops_everything() {
        let (_dir, service) = service(WatchBackend::Poll);
        let (tx, mut rx) = mpsc::channel(4);
        service.start(tx).unwrap();
        rx.recv().await.unwrap();

        service.dispose();
        service.dispose();

        assert!(service.is_disposed());
        assert!(!service.is_running());
        assert!(rx.recv().await.is_none());

        let (tx, _rx) = mpsc::channel(4);
        assert!(matches!(service.start(tx), Err(SyncError::Disposed)));

        let err = service
            .mutations()
            .update_task_status(TaskRef::Task(1), TaskStatus::Done)
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Disposed);
    }

    #[tokio::test]
    async fn notify_backend_falls_back_when_directory_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = SyncConfig::for_project(dir.path().join("not-yet-created"))
            .with_backend(WatchBackend::Notify);
        let service = SyncService::new(config, Arc::new(JsonTaskRepository::new()));

        let mut detector = service.detector();
        assert!(!detector.has_changed());
    }

    #[tokio::test]
    async fn read_model_on_demand() {
        let (_dir, service) = service(WatchBackend::Notify);

        let model = service.read_model().await;
        assert_eq!(model.metadata.total_tasks, 2);
        assert_eq!(model.metadata.pending_tasks, 1);
    }
}
