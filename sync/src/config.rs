//! Configuration for the task store sync service.
//!
//! Configuration comes either from environment variables via
//! [`SyncConfig::from_env`] or programmatically via
//! [`SyncConfig::for_project`].
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `TASKBOARD_PROJECT_ROOT` | No | current dir | Project root directory |
//! | `TASKBOARD_TASKS_FILE` | No | `.taskmaster/tasks/tasks.json` | Task store, relative to the root |
//! | `TASKBOARD_REPORT_FILE` | No | `.taskmaster/reports/task-complexity-report.json` | Complexity report, relative to the root |
//! | `TASKBOARD_POLL_INTERVAL_MS` | No | 2000 | Poll tick period (minimum 1000) |
//! | `TASKBOARD_CHECK_INTERVAL_MS` | No | 500 | Detector rate limit (greater than 0) |
//! | `TASKBOARD_BATCH_WINDOW_MS` | No | 300 | Coalescing window before a rebuild |
//! | `TASKBOARD_MIN_UPDATE_INTERVAL_MS` | No | 2000 | Minimum spacing between dispatched updates |
//! | `TASKBOARD_GRACE_DELAY_MS` | No | 1000 | Self-change suppression grace (minimum 500) |
//! | `TASKBOARD_WATCH_BACKEND` | No | `poll` | `poll` or `notify` |
//!
//! # Example
//!
//! ```no_run
//! use taskboard_sync::config::SyncConfig;
//!
//! let config = SyncConfig::from_env().expect("Failed to load configuration");
//! println!("Watching {}", config.tasks_path.display());
//! ```

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Default task store location relative to the project root.
pub const DEFAULT_TASKS_FILE: &str = ".taskmaster/tasks/tasks.json";

/// Default complexity report location relative to the project root.
pub const DEFAULT_REPORT_FILE: &str = ".taskmaster/reports/task-complexity-report.json";

const DEFAULT_CHECK_INTERVAL_MS: u64 = 500;
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
const DEFAULT_BATCH_WINDOW_MS: u64 = 300;
const DEFAULT_MIN_UPDATE_INTERVAL_MS: u64 = 2000;
const DEFAULT_COOLDOWN_MS: u64 = 500;
const DEFAULT_GRACE_DELAY_MS: u64 = 1000;
const DEFAULT_MIN_CHANGE_SPACING_MS: u64 = 100;

/// Lowest poll interval accepted from the environment.
const MIN_POLL_INTERVAL_MS: u64 = 1000;

/// Lowest grace delay accepted from the environment.
const MIN_GRACE_DELAY_MS: u64 = 500;

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// The project root was not given and the current directory is unknown.
    #[error("failed to determine working directory")]
    NoWorkingDirectory,
}

/// Which change detector backend the poller drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchBackend {
    /// Stat the task file on every poll tick.
    #[default]
    Poll,
    /// Stat only after the OS reported an event for the task file.
    Notify,
}

impl FromStr for WatchBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "poll" => Ok(Self::Poll),
            "notify" => Ok(Self::Notify),
            other => Err(format!("expected 'poll' or 'notify', got '{other}'")),
        }
    }
}

impl fmt::Display for WatchBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Poll => f.write_str("poll"),
            Self::Notify => f.write_str("notify"),
        }
    }
}

/// Timing knobs for detection, batching and suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTimings {
    /// Calls to the detector closer together than this are rate limited.
    pub check_interval: Duration,
    /// Period of the poller's recurring tick.
    pub poll_interval: Duration,
    /// Delay between a detected change and the rebuild it triggers.
    pub batch_window: Duration,
    /// Minimum spacing between two dispatched read models.
    pub min_update_interval: Duration,
    /// How long the poller stays busy after a dispatch.
    pub cooldown: Duration,
    /// How long suppression outlives the last completed write.
    pub grace_delay: Duration,
    /// An mtime-only change this soon after the previous change is ignored.
    pub min_change_spacing: Duration,
}

impl Default for SyncTimings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_millis(DEFAULT_CHECK_INTERVAL_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            batch_window: Duration::from_millis(DEFAULT_BATCH_WINDOW_MS),
            min_update_interval: Duration::from_millis(DEFAULT_MIN_UPDATE_INTERVAL_MS),
            cooldown: Duration::from_millis(DEFAULT_COOLDOWN_MS),
            grace_delay: Duration::from_millis(DEFAULT_GRACE_DELAY_MS),
            min_change_spacing: Duration::from_millis(DEFAULT_MIN_CHANGE_SPACING_MS),
        }
    }
}

/// Configuration for one synchronized project.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Project root; relative files below are resolved against it.
    pub project_root: PathBuf,

    /// Absolute path of the task store document.
    pub tasks_path: PathBuf,

    /// Absolute path of the complexity report.
    pub report_path: PathBuf,

    pub timings: SyncTimings,

    pub backend: WatchBackend,
}

impl SyncConfig {
    /// Creates a configuration with default paths and timings for `root`.
    #[must_use]
    pub fn for_project(root: impl Into<PathBuf>) -> Self {
        let project_root = root.into();
        Self {
            tasks_path: project_root.join(DEFAULT_TASKS_FILE),
            report_path: project_root.join(DEFAULT_REPORT_FILE),
            project_root,
            timings: SyncTimings::default(),
            backend: WatchBackend::default(),
        }
    }

    /// Builder-style timings override.
    #[must_use]
    pub fn with_timings(mut self, timings: SyncTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Builder-style backend override.
    #[must_use]
    pub fn with_backend(mut self, backend: WatchBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Creates a new `SyncConfig` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - a duration variable is not a non-negative integer
    /// - `TASKBOARD_POLL_INTERVAL_MS` is below 1000
    /// - `TASKBOARD_GRACE_DELAY_MS` is below 500
    /// - `TASKBOARD_CHECK_INTERVAL_MS` is 0
    /// - `TASKBOARD_WATCH_BACKEND` is neither `poll` nor `notify`
    /// - no project root is set and the current directory is unavailable
    pub fn from_env() -> Result<Self, ConfigError> {
        let project_root = match env::var("TASKBOARD_PROJECT_ROOT") {
            Ok(root) => PathBuf::from(root),
            Err(_) => env::current_dir().map_err(|_| ConfigError::NoWorkingDirectory)?,
        };

        let tasks_path = project_root.join(
            env::var("TASKBOARD_TASKS_FILE").unwrap_or_else(|_| DEFAULT_TASKS_FILE.to_string()),
        );
        let report_path = project_root.join(
            env::var("TASKBOARD_REPORT_FILE").unwrap_or_else(|_| DEFAULT_REPORT_FILE.to_string()),
        );

        let defaults = SyncTimings::default();
        let timings = SyncTimings {
            check_interval: millis_from_env(
                "TASKBOARD_CHECK_INTERVAL_MS",
                DEFAULT_CHECK_INTERVAL_MS,
                1,
            )?,
            poll_interval: millis_from_env(
                "TASKBOARD_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
                MIN_POLL_INTERVAL_MS,
            )?,
            batch_window: millis_from_env("TASKBOARD_BATCH_WINDOW_MS", DEFAULT_BATCH_WINDOW_MS, 0)?,
            min_update_interval: millis_from_env(
                "TASKBOARD_MIN_UPDATE_INTERVAL_MS",
                DEFAULT_MIN_UPDATE_INTERVAL_MS,
                0,
            )?,
            grace_delay: millis_from_env(
                "TASKBOARD_GRACE_DELAY_MS",
                DEFAULT_GRACE_DELAY_MS,
                MIN_GRACE_DELAY_MS,
            )?,
            ..defaults
        };

        let backend = match env::var("TASKBOARD_WATCH_BACKEND") {
            Ok(val) => val
                .parse::<WatchBackend>()
                .map_err(|message| ConfigError::InvalidValue {
                    key: "TASKBOARD_WATCH_BACKEND".to_string(),
                    message,
                })?,
            Err(_) => WatchBackend::default(),
        };

        Ok(Self {
            project_root,
            tasks_path,
            report_path,
            timings,
            backend,
        })
    }
}

/// Reads a millisecond duration, enforcing a lower bound.
fn millis_from_env(key: &str, default: u64, min: u64) -> Result<Duration, ConfigError> {
    let ms = match env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected milliseconds, got '{val}'"),
            })?,
        Err(_) => default,
    };

    if ms < min {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be at least {min}ms, got {ms}ms"),
        });
    }

    Ok(Duration::from_millis(ms))
}
