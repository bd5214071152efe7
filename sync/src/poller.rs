//! Debounced polling loop.
//!
//! The poller drives a [`ChangeDetector`] on a fixed tick and turns positive
//! detections into read-model dispatches:
//!
//! ```text
//!   tick ──> check ──(no change)──> idle
//!              │
//!           (change)
//!              v
//!         batch pending ──(batch window elapsed)──> rebuild ──> dispatch
//! ```
//!
//! - Detections within the batch window collapse into one rebuild; each
//!   detection restarts the window.
//! - A rebuild is skipped while the post-dispatch cooldown runs or when the
//!   previous dispatch is more recent than the minimum update interval. The
//!   pending batch is kept and re-armed on the next tick, so a skipped
//!   change is delivered late rather than lost.
//! - Every rebuild is sent exactly once on the update channel. The loop ends
//!   when the receiver is dropped or the [`Poller`] handle is disposed.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use taskboard_store::JsonTaskRepository;
//! use taskboard_sync::config::SyncTimings;
//! use taskboard_sync::detector::PollingDetector;
//! use taskboard_sync::fingerprint::FingerprintStore;
//! use taskboard_sync::poller::Poller;
//! use taskboard_sync::read_model::ReadModelBuilder;
//! use taskboard_sync::suppressor::Suppressor;
//! use tokio::sync::mpsc;
//!
//! # async fn example() {
//! let timings = SyncTimings::default();
//! let path = "tasks.json";
//! let detector = PollingDetector::new(
//!     path,
//!     Arc::new(FingerprintStore::new()),
//!     Arc::new(Suppressor::new(timings.grace_delay)),
//!     &timings,
//! );
//! let builder = ReadModelBuilder::new(Arc::new(JsonTaskRepository::new()), path);
//!
//! let (tx, mut rx) = mpsc::channel(16);
//! let poller = Poller::spawn(Box::new(detector), builder, timings, tx);
//!
//! if let Some(model) = rx.recv().await {
//!     println!("{} tasks", model.metadata.total_tasks);
//! }
//! poller.dispose();
//! # }
//! ```

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::config::SyncTimings;
use crate::detector::ChangeDetector;
use crate::read_model::{ReadModel, ReadModelBuilder};

/// Handle to a running poll loop. Dropping it stops the loop.
#[derive(Debug)]
pub struct Poller {
    task: JoinHandle<()>,
}

impl Poller {
    /// Spawns the poll loop on the current tokio runtime. The first tick
    /// fires immediately.
    #[must_use]
    pub fn spawn(
        detector: Box<dyn ChangeDetector>,
        builder: ReadModelBuilder,
        timings: SyncTimings,
        updates: mpsc::Sender<ReadModel>,
    ) -> Self {
        let task = tokio::spawn(run_poll_loop(detector, builder, timings, updates));
        Self { task }
    }

    /// Stops the loop, dropping any pending batch. Idempotent.
    pub fn dispose(&self) {
        if !self.task.is_finished() {
            debug!("Disposing poller");
        }
        self.task.abort();
    }

    /// Returns true until the loop has exited.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Sleeps until `deadline`, or forever when there is none.
async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run_poll_loop(
    mut detector: Box<dyn ChangeDetector>,
    builder: ReadModelBuilder,
    timings: SyncTimings,
    updates: mpsc::Sender<ReadModel>,
) {
    let mut ticker = interval(timings.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut pending = false;
    let mut batch_deadline: Option<Instant> = None;
    let mut last_dispatch: Option<Instant> = None;
    let mut cooldown_until: Option<Instant> = None;

    debug!(
        poll_ms = timings.poll_interval.as_millis(),
        batch_ms = timings.batch_window.as_millis(),
        "Starting poll loop"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if updates.is_closed() {
                    debug!("Update receiver dropped, stopping poll loop");
                    break;
                }

                let changed = detector.has_changed();
                if changed || (pending && batch_deadline.is_none()) {
                    trace!(changed, "Arming batch window");
                    pending = true;
                    batch_deadline = Some(Instant::now() + timings.batch_window);
                }
            }

            _ = wait_for(batch_deadline) => {
                batch_deadline = None;
                let now = Instant::now();

                if cooldown_until.is_some_and(|t| now < t) {
                    debug!("Skipping rebuild during cooldown");
                    continue;
                }
                if last_dispatch.is_some_and(|t| now.duration_since(t) < timings.min_update_interval) {
                    debug!("Skipping rebuild, previous update too recent");
                    continue;
                }

                let model = builder.build().await;
                pending = false;
                let total = model.metadata.total_tasks;

                if updates.send(model).await.is_err() {
                    debug!("Update receiver dropped, stopping poll loop");
                    break;
                }

                let dispatched_at = Instant::now();
                last_dispatch = Some(dispatched_at);
                cooldown_until = Some(dispatched_at + timings.cooldown);
                info!(tasks = total, "Dispatched read model update");
            }
        }
    }

    debug!("Poll loop terminated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::CheckOutcome;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use taskboard_store::JsonTaskRepository;
    use tempfile::TempDir;
    use tokio::time::timeout;

    /// Detector answering from a script, then "unchanged" forever.
    struct ScriptedDetector {
        answers: Arc<Mutex<VecDeque<bool>>>,
        calls: Arc<AtomicUsize>,
    }

    impl ChangeDetector for ScriptedDetector {
        fn check(&mut self) -> CheckOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.answers.lock().pop_front().unwrap_or(false) {
                CheckOutcome::Changed
            } else {
                CheckOutcome::Unchanged
            }
        }

        fn mark_seen(&mut self) {}
    }

    /// Detector that reports a change on every call.
    struct AlwaysChanged;

    impl ChangeDetector for AlwaysChanged {
        fn check(&mut self) -> CheckOutcome {
            CheckOutcome::Changed
        }

        fn mark_seen(&mut self) {}
    }

    fn timings() -> SyncTimings {
        SyncTimings {
            poll_interval: Duration::from_millis(1000),
            batch_window: Duration::from_millis(300),
            min_update_interval: Duration::from_millis(2000),
            cooldown: Duration::from_millis(500),
            ..SyncTimings::default()
        }
    }

    fn store() -> (TempDir, ReadModelBuilder) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("tasks.json");
        std::fs::write(
            &path,
            r#"{"tasks": [{"id": 1, "title": "A", "status": "pending"}]}"#,
        )
        .unwrap();
        let builder = ReadModelBuilder::new(Arc::new(JsonTaskRepository::new()), path);
        (dir, builder)
    }

    fn scripted(answers: &[bool]) -> (Box<dyn ChangeDetector>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let detector = ScriptedDetector {
            answers: Arc::new(Mutex::new(answers.iter().copied().collect())),
            calls: calls.clone(),
        };
        (Box::new(detector), calls)
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn first_change_dispatches_after_batch_window() {
        let (_dir, builder) = store();
        let (detector, _) = scripted(&[true]);
        let (tx, mut rx) = mpsc::channel(8);

        let start = Instant::now();
        let _poller = Poller::spawn(detector, builder, timings(), tx);

        let model = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("Should dispatch within a second")
            .expect("Channel should stay open");

        assert_eq!(model.metadata.total_tasks, 1);
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn no_change_no_dispatch() {
        let (_dir, builder) = store();
        let (detector, calls) = scripted(&[]);
        let (tx, mut rx) = mpsc::channel(8);

        let _poller = Poller::spawn(detector, builder, timings(), tx);

        let result = timeout(Duration::from_millis(5500), rx.recv()).await;
        assert!(result.is_err(), "Should not dispatch without a change");
        assert!(calls.load(Ordering::SeqCst) >= 5);
    }

    // =========================================================================
    // Rate floor and retention
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn dispatches_respect_min_update_interval() {
        let (_dir, builder) = store();
        let (tx, mut rx) = mpsc::channel(8);

        let _poller = Poller::spawn(Box::new(AlwaysChanged), builder, timings(), tx);

        let mut stamps = Vec::new();
        for _ in 0..3 {
            timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("Should keep dispatching")
                .expect("Channel should stay open");
            stamps.push(Instant::now());
        }

        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(2000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn skipped_batch_is_delivered_later() {
        let (_dir, builder) = store();
        // Changes at t=0 and t=1000; the second batch fires at t=1300,
        // too soon after the t=300 dispatch.
        let (detector, _) = scripted(&[true, true]);
        let (tx, mut rx) = mpsc::channel(8);

        let start = Instant::now();
        let _poller = Poller::spawn(detector, builder, timings(), tx);

        rx.recv().await.expect("first dispatch");
        let first = start.elapsed();

        rx.recv().await.expect("retained batch dispatch");
        let second = start.elapsed();

        assert!(second - first >= Duration::from_millis(2000));

        let third = timeout(Duration::from_secs(10), rx.recv()).await;
        assert!(third.is_err(), "Retained batch must dispatch only once");
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn dispose_stops_loop_and_drops_sender() {
        let (_dir, builder) = store();
        let (tx, mut rx) = mpsc::channel(8);

        let poller = Poller::spawn(Box::new(AlwaysChanged), builder, timings(), tx);
        rx.recv().await.expect("first dispatch");

        poller.dispose();
        poller.dispose();

        assert!(rx.recv().await.is_none());
        assert!(!poller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_receiver_ends_loop() {
        let (_dir, builder) = store();
        let (detector, _) = scripted(&[]);
        let (tx, rx) = mpsc::channel(8);

        let poller = Poller::spawn(detector, builder, timings(), tx);
        drop(rx);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!poller.is_running());
    }
}
