// src/watch/cache.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::debug;

/// What the detector last knew about one path.
#[derive(Debug, Clone, Default)]
pub struct Fingerprint {
    /// Content hash from the last successful read.
    pub hash: Option<String>,
    /// When the last event for this path passed the debounce step.
    pub last_event: Option<Instant>,
}

/// Per-group fingerprint cache.
///
/// Owned by a single group's event handler; entries are never evicted
/// for the lifetime of the process.
#[derive(Debug, Default)]
pub struct FingerprintCache {
    entries: HashMap<PathBuf, Fingerprint>,
}

impl FingerprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<&Fingerprint> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sliding-window debounce.
    ///
    /// Returns false if the previous accepted event for `path` lies less
    /// than `window` before `now`. Accepted events restart the window.
    pub fn debounce(&mut self, path: &Path, now: Instant, window: Duration) -> bool {
        let entry = self.entries.entry(path.to_path_buf()).or_default();
        if let Some(last) = entry.last_event {
            if now.saturating_duration_since(last) < window {
                debug!(?path, "debounced repeat event");
                return false;
            }
        }
        entry.last_event = Some(now);
        true
    }

    /// Record the current content hash and report whether it differs from
    /// the previous one.
    ///
    /// An unknown path or an unreadable file (`None`) counts as changed.
    pub fn record_hash(&mut self, path: &Path, hash: Option<String>) -> bool {
        let entry = self.entries.entry(path.to_path_buf()).or_default();
        match hash {
            Some(new) => {
                let changed = entry.hash.as_deref() != Some(new.as_str());
                entry.hash = Some(new);
                changed
            }
            None => {
                entry.hash = None;
                true
            }
        }
    }

    /// Drop the cached hash (e.g. after a delete) but keep the debounce clock.
    pub fn forget_hash(&mut self, path: &Path) {
        if let Some(entry) = self.entries.get_mut(path) {
            if entry.hash.take().is_some() {
                debug!(?path, "forgot cached hash");
            }
        }
    }
}
