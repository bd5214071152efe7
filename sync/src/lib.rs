//! Taskboard Sync - keeps an in-memory view of a JSON task store current.
//!
//! This crate watches a project's task file, turns external edits into
//! debounced read-model updates and funnels the application's own edits
//! through a single-writer mutation façade that suppresses the resulting
//! file events.
//!
//! # Overview
//!
//! ```text
//!   UI ──> MutationFacade ──> TaskRepository ──> tasks.json
//!              │ (suppress + refresh fingerprint)     │
//!              v                                      v
//!   UI <── ReadModel <── Poller <── ChangeDetector <── stat / notify
//! ```
//!
//! [`SyncService`] wires these pieces together for one project.
//!
//! # Modules
//!
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types and mutation failure classification
//! - [`fingerprint`]: File fingerprints and the shared fingerprint store
//! - [`suppressor`]: Self-change suppression window
//! - [`detector`]: Stat-polling change detection
//! - [`watch`]: Event-driven change detection via `notify`
//! - [`read_model`]: Read model snapshot and builder
//! - [`poller`]: Debounced polling loop
//! - [`mutations`]: Serialized mutation façade
//! - [`service`]: Composition root

pub mod config;
pub mod detector;
pub mod error;
pub mod fingerprint;
pub mod mutations;
pub mod poller;
pub mod read_model;
pub mod service;
pub mod suppressor;
pub mod watch;

pub use config::{ConfigError, SyncConfig, SyncTimings, WatchBackend};
pub use detector::{ChangeDetector, CheckOutcome, PollingDetector};
pub use error::{FailureKind, MutationError, MutationResult, Result, SyncError};
pub use fingerprint::{Fingerprint, FingerprintStore};
pub use mutations::MutationFacade;
pub use poller::Poller;
pub use read_model::{ReadModel, ReadModelBuilder, ReadModelMetadata};
pub use service::SyncService;
pub use suppressor::{SuppressionGuard, Suppressor};
pub use watch::NotifyDetector;
