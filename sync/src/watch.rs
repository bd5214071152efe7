//! Event-driven change detection backed by [`notify`].
//!
//! [`NotifyDetector`] watches the task file's parent directory and only
//! performs the stat comparison after the OS reported activity on the task
//! file. Rate limiting, suppression and the initial-load rule are inherited
//! from the wrapped [`PollingDetector`], so both backends behave the same
//! towards the poller.
//!
//! The notify callback runs on notify's own thread and does nothing but
//! raise a flag.

use std::ffi::OsString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, trace, warn};

use crate::detector::{ChangeDetector, CheckOutcome, PollingDetector};
use crate::error::{Result, SyncError};

/// Change detector that stats only after a file system event.
pub struct NotifyDetector {
    inner: PollingDetector,
    dirty: Arc<AtomicBool>,
    primed: bool,
    _watcher: RecommendedWatcher,
}

impl std::fmt::Debug for NotifyDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyDetector")
            .field("inner", &self.inner)
            .field("dirty", &self.dirty.load(Ordering::Relaxed))
            .field("primed", &self.primed)
            .finish_non_exhaustive()
    }
}

impl NotifyDetector {
    /// Starts watching the directory containing `inner`'s task file.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Watch` if the parent directory does not exist or
    /// the platform watcher cannot be created.
    pub fn new(inner: PollingDetector) -> Result<Self> {
        let path = inner.path().to_path_buf();
        let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
            return Err(SyncError::Watch(
                notify::Error::path_not_found().add_path(path.clone()),
            ));
        };

        let dirty = Arc::new(AtomicBool::new(false));
        let flag = dirty.clone();
        let name: OsString = name.to_os_string();

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                handle_notify_event(res, &name, &flag);
            },
            Config::default(),
        )?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        debug!(dir = %dir.display(), "Started task file watch");

        Ok(Self {
            inner,
            dirty,
            primed: false,
            _watcher: watcher,
        })
    }

    /// Returns true if an event arrived since the last comparison.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }
}

fn handle_notify_event(
    res: std::result::Result<Event, notify::Error>,
    name: &OsString,
    dirty: &AtomicBool,
) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "File watch error");
            // Fall back to a comparison on the next check.
            dirty.store(true, Ordering::Release);
            return;
        }
    };

    trace!(kind = ?event.kind, paths = ?event.paths, "Received notify event");

    if event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(name.as_os_str()))
    {
        dirty.store(true, Ordering::Release);
    }
}

impl ChangeDetector for NotifyDetector {
    fn check(&mut self) -> CheckOutcome {
        let was_dirty = self.dirty.swap(false, Ordering::AcqRel);
        if self.primed && !was_dirty {
            return CheckOutcome::Unchanged;
        }

        let outcome = self.inner.check();
        match outcome {
            // No comparison ran, or it must be repeated later.
            CheckOutcome::RateLimited
            | CheckOutcome::StatFailed
            | CheckOutcome::Suppressed
            | CheckOutcome::Spurious => {
                self.dirty.store(true, Ordering::Release);
            }
            CheckOutcome::Missing
            | CheckOutcome::Initial
            | CheckOutcome::Unchanged
            | CheckOutcome::Changed => {}
        }

        self.primed = true;
        outcome
    }

    fn mark_seen(&mut self) {
        self.inner.mark_seen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncTimings;
    use crate::fingerprint::FingerprintStore;
    use crate::suppressor::Suppressor;
    use std::path::Path;
    use std::time::Duration;

    fn timings() -> SyncTimings {
        SyncTimings {
            check_interval: Duration::from_millis(1),
            ..SyncTimings::default()
        }
    }

    fn detector(path: &Path) -> NotifyDetector {
        let inner = PollingDetector::new(
            path,
            Arc::new(FingerprintStore::new()),
            Arc::new(Suppressor::new(Duration::from_millis(500))),
            &timings(),
        );
        NotifyDetector::new(inner).expect("Should create watcher")
    }

    /// Waits until the watcher raised its flag, or gives up.
    async fn wait_dirty(detector: &NotifyDetector) -> bool {
        for _ in 0..100 {
            if detector.is_dirty() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn missing_directory_is_a_watch_error() {
        let inner = PollingDetector::new(
            "/nonexistent/dir/tasks.json",
            Arc::new(FingerprintStore::new()),
            Arc::new(Suppressor::new(Duration::from_millis(500))),
            &timings(),
        );

        let err = NotifyDetector::new(inner).unwrap_err();
        assert!(matches!(err, SyncError::Watch(_)));
    }

    #[tokio::test]
    async fn first_check_runs_without_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(&path, "{}").unwrap();

        let mut detector = detector(&path);
        assert_eq!(detector.check(), CheckOutcome::Initial);

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(detector.check(), CheckOutcome::Unchanged);
    }

    #[tokio::test]
    async fn write_to_task_file_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(&path, "{}").unwrap();

        let mut detector = detector(&path);
        detector.check();
        tokio::time::sleep(Duration::from_millis(5)).await;

        std::fs::write(&path, r#"{"tasks":[]}"#).unwrap();
        assert!(wait_dirty(&detector).await, "Should receive a notify event");

        assert_eq!(detector.check(), CheckOutcome::Changed);
    }

    #[tokio::test]
    async fn sibling_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(&path, "{}").unwrap();

        let mut detector = detector(&path);
        detector.check();

        std::fs::write(dir.path().join("other.json"), "{}").unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!detector.is_dirty());
        assert_eq!(detector.check(), CheckOutcome::Unchanged);
    }
}
