//! File fingerprints and the shared store holding the last one observed.
//!
//! A [`Fingerprint`] is the `(mtime, size)` pair of the task file, used as a
//! proxy for "the contents changed" without reading the file. The
//! [`FingerprintStore`] is shared between the change detector, which updates
//! it when it reports a change, and the mutation façade, which refreshes it
//! after every write so the service's own writes are not re-detected.

use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Modification time and size of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Fingerprint {
    /// Milliseconds since the Unix epoch.
    pub mtime: i64,
    /// Length in bytes.
    pub size: u64,
}

impl Fingerprint {
    /// Builds a fingerprint from file metadata. A platform without
    /// modification times yields `mtime == 0`.
    #[must_use]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        let mtime = meta
            .modified()
            .map(|t| DateTime::<Utc>::from(t).timestamp_millis())
            .unwrap_or(0);

        Self {
            mtime,
            size: meta.len(),
        }
    }

    /// Stats `path`. Blocking, but a single `stat` call.
    pub fn stat(path: &Path) -> io::Result<Self> {
        std::fs::metadata(path).map(|meta| Self::from_metadata(&meta))
    }
}

/// Last observed fingerprint of the task file.
#[derive(Debug, Default)]
pub struct FingerprintStore {
    current: Mutex<Option<Fingerprint>>,
}

impl FingerprintStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self) -> Option<Fingerprint> {
        *self.current.lock()
    }

    pub fn set(&self, fingerprint: Fingerprint) {
        *self.current.lock() = Some(fingerprint);
    }

    pub fn clear(&self) {
        *self.current.lock() = None;
    }

    /// Re-stats `path` and stores the result. A failed stat leaves the
    /// stored fingerprint as it was and returns `None`.
    pub fn refresh(&self, path: &Path) -> Option<Fingerprint> {
        let fingerprint = Fingerprint::stat(path).ok()?;
        self.set(fingerprint);
        Some(fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_reports_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(&path, "12345").unwrap();

        let fp = Fingerprint::stat(&path).unwrap();
        assert_eq!(fp.size, 5);
        assert!(fp.mtime > 0);
    }

    #[test]
    fn stat_missing_file_is_not_found() {
        let err = Fingerprint::stat(Path::new("/definitely/not/here.json")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn store_starts_empty() {
        let store = FingerprintStore::new();
        assert!(store.get().is_none());

        store.set(Fingerprint { mtime: 1, size: 2 });
        assert_eq!(store.get(), Some(Fingerprint { mtime: 1, size: 2 }));

        store.clear();
        assert!(store.get().is_none());
    }

    #[test]
    fn failed_refresh_keeps_previous_value() {
        let store = FingerprintStore::new();
        let previous = Fingerprint { mtime: 10, size: 20 };
        store.set(previous);

        assert!(store.refresh(Path::new("/definitely/not/here.json")).is_none());
        assert_eq!(store.get(), Some(previous));
    }

    #[test]
    fn refresh_tracks_rewrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(&path, "a").unwrap();

        let store = FingerprintStore::new();
        let first = store.refresh(&path).unwrap();

        std::fs::write(&path, "abc").unwrap();
        let second = store.refresh(&path).unwrap();

        assert_ne!(first, second);
        assert_eq!(store.get(), Some(second));
    }
}
