//! Self-change suppression.
//!
//! Every write performed by the mutation façade is bracketed by a
//! [`SuppressionGuard`]. While any guard is alive, and for a grace delay
//! after the last one is released, [`Suppressor::is_active`] returns true and
//! the change detector reports no change. This keeps the service from
//! treating its own writes as external edits while file system metadata
//! settles.
//!
//! Overlapping writes are handled with an in-flight counter and an expiry
//! that only ever moves forward: releasing an early guard can never end the
//! window opened by a later one.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use taskboard_sync::suppressor::Suppressor;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let suppressor = Suppressor::new(Duration::from_millis(1000));
//! {
//!     let _guard = suppressor.begin();
//!     assert!(suppressor.is_active());
//! }
//! // Still active during the grace delay.
//! assert!(suppressor.is_active());
//! # }
//! ```

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug, Default)]
struct Window {
    in_flight: usize,
    expires_at: Option<Instant>,
}

/// Time-boxed suppression window shared by the façade and the detector.
#[derive(Debug)]
pub struct Suppressor {
    grace: Duration,
    window: Mutex<Window>,
}

impl Suppressor {
    #[must_use]
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            window: Mutex::new(Window::default()),
        }
    }

    /// Raises suppression until the returned guard is dropped, plus the
    /// grace delay.
    pub fn begin(&self) -> SuppressionGuard<'_> {
        let mut window = self.window.lock();
        window.in_flight += 1;
        trace!(in_flight = window.in_flight, "Suppression raised");
        SuppressionGuard { suppressor: self }
    }

    /// Returns true while a write is in flight or its grace delay runs.
    #[must_use]
    pub fn is_active(&self) -> bool {
        let window = self.window.lock();
        window.in_flight > 0 || window.expires_at.is_some_and(|t| Instant::now() < t)
    }

    fn release(&self) {
        let mut window = self.window.lock();
        window.in_flight = window.in_flight.saturating_sub(1);

        let expires_at = Instant::now() + self.grace;
        window.expires_at = Some(match window.expires_at {
            Some(existing) if existing > expires_at => existing,
            _ => expires_at,
        });
        trace!(in_flight = window.in_flight, "Suppression released");
    }
}

/// Keeps suppression raised while alive.
#[must_use = "suppression ends as soon as the guard is dropped"]
#[derive(Debug)]
pub struct SuppressionGuard<'a> {
    suppressor: &'a Suppressor,
}

impl Drop for SuppressionGuard<'_> {
    fn drop(&mut self) {
        self.suppressor.release();
    }
}
