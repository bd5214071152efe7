//! Change detection for the task file.
//!
//! A [`ChangeDetector`] answers one question on every poll tick: did the task
//! file change since the last time a change was reported? The answer is
//! shaped by three rules:
//!
//! 1. Calls closer together than the check interval are rate limited and
//!    never touch the file system.
//! 2. The first successful stat of every detector reports a change, so
//!    the service performs its initial load. This holds even when the
//!    shared fingerprint store was already filled by an earlier write.
//! 3. While the [`Suppressor`] is active, nothing is reported. The
//!    service's own writes are not external changes.
//!
//! [`PollingDetector`] stats the file on every unthrottled call. The
//! event-driven backend in [`crate::watch`] wraps it and only stats after
//! the OS reported activity on the file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::SyncTimings;
use crate::fingerprint::{Fingerprint, FingerprintStore};
use crate::suppressor::Suppressor;

/// Why a check did or did not report a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Called again within the check interval.
    RateLimited,
    /// The task file does not exist.
    Missing,
    /// The stat call failed for a reason other than absence.
    StatFailed,
    /// First observation of the file.
    Initial,
    /// A self-change suppression window is active.
    Suppressed,
    Unchanged,
    /// Only the mtime moved, too soon after the previous change.
    Spurious,
    Changed,
}

impl CheckOutcome {
    /// Returns true for outcomes that should trigger a rebuild.
    #[must_use]
    pub fn is_change(self) -> bool {
        matches!(self, Self::Initial | Self::Changed)
    }
}

/// Decides whether the task file changed.
pub trait ChangeDetector: Send {
    /// Runs one check and explains the result.
    fn check(&mut self) -> CheckOutcome;

    /// Refreshes the stored fingerprint to the file's current state.
    fn mark_seen(&mut self);

    fn has_changed(&mut self) -> bool {
        self.check().is_change()
    }
}

/// Stat-polling change detector.
#[derive(Debug)]
pub struct PollingDetector {
    path: PathBuf,
    store: Arc<FingerprintStore>,
    suppressor: Arc<Suppressor>,
    check_interval: Duration,
    min_change_spacing: Duration,
    last_check: Option<Instant>,
    last_change: Option<Instant>,
    reported_initial: bool,
}

impl PollingDetector {
    #[must_use]
    pub fn new(
        path: impl Into<PathBuf>,
        store: Arc<FingerprintStore>,
        suppressor: Arc<Suppressor>,
        timings: &SyncTimings,
    ) -> Self {
        Self {
            path: path.into(),
            store,
            suppressor,
            check_interval: timings.check_interval,
            min_change_spacing: timings.min_change_spacing,
            last_check: None,
            last_change: None,
            reported_initial: false,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The comparison behind [`ChangeDetector::check`], minus rate limiting.
    fn compare(&mut self, now: Instant) -> CheckOutcome {
        let current = match Fingerprint::stat(&self.path) {
            Ok(fp) => fp,
            Err(e) if e.kind() == ErrorKind::NotFound => return CheckOutcome::Missing,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Failed to stat task file");
                return CheckOutcome::StatFailed;
            }
        };

        if !self.reported_initial {
            self.reported_initial = true;
            self.record_change(current, now);
            return CheckOutcome::Initial;
        }

        if self.suppressor.is_active() {
            return CheckOutcome::Suppressed;
        }

        // Cleared by someone else since the last report.
        let Some(previous) = self.store.get() else {
            self.record_change(current, now);
            return CheckOutcome::Changed;
        };

        if current == previous {
            return CheckOutcome::Unchanged;
        }

        let too_soon = self
            .last_change
            .is_some_and(|t| now.duration_since(t) < self.min_change_spacing);
        if current.size == previous.size && too_soon {
            trace!(path = %self.path.display(), "Ignoring mtime-only change");
            return CheckOutcome::Spurious;
        }

        self.record_change(current, now);
        CheckOutcome::Changed
    }

    fn record_change(&mut self, fingerprint: Fingerprint, now: Instant) {
        self.store.set(fingerprint);
        self.last_change = Some(now);
        debug!(
            path = %self.path.display(),
            mtime = fingerprint.mtime,
            size = fingerprint.size,
            "Task file changed"
        );
    }
}

impl ChangeDetector for PollingDetector {
    fn check(&mut self) -> CheckOutcome {
        let now = Instant::now();
        if self
            .last_check
            .is_some_and(|t| now.duration_since(t) < self.check_interval)
        {
            return CheckOutcome::RateLimited;
        }
        self.last_check = Some(now);

        self.compare(now)
    }

    fn mark_seen(&mut self) {
        self.store.refresh(&self.path);
    }
}
