// src/watch/event_handler.rs

//! Per-group processing of raw filesystem events.
//!
//! Every raw event goes through the same pipeline:
//! 1. drop directory and access events, normalise the path
//! 2. include/ignore pattern filter
//! 3. sliding-window debounce per path
//! 4. content-hash dedup (modified events only)
//! 5. non-blocking handoff to the engine's event channel

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::config::WatchGroup;
use crate::fs::FileSystem;
use crate::watch::cache::FingerprintCache;
use crate::watch::hash::compute_file_hash;
use crate::watch::path_utils::display_path;
use crate::watch::patterns::GroupFilter;

/// Channel the detector forwards notifications into.
pub type EventSink = mpsc::Sender<ChangeNotification>;

/// How long the watch thread keeps retrying a full channel before dropping
/// the notification.
pub const HANDOFF_TIMEOUT: Duration = Duration::from_millis(250);
const HANDOFF_RETRY: Duration = Duration::from_millis(5);

/// Logical category of a filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    Moved,
    Unknown,
}

impl ChangeKind {
    /// Map a native notify kind; `None` for kinds that are not file changes.
    pub fn classify(kind: &EventKind) -> Option<ChangeKind> {
        match kind {
            EventKind::Create(CreateKind::Folder) => None,
            EventKind::Create(_) => Some(ChangeKind::Created),
            EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeKind::Moved),
            EventKind::Modify(_) => Some(ChangeKind::Modified),
            EventKind::Remove(RemoveKind::Folder) => None,
            EventKind::Remove(_) => Some(ChangeKind::Deleted),
            EventKind::Access(_) => None,
            EventKind::Any | EventKind::Other => Some(ChangeKind::Unknown),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Moved => "moved",
            ChangeKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deduplicated change, tagged with the group that observed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    pub kind: ChangeKind,
    pub paths: Vec<String>,
    pub group: String,
}

/// Stateful handler owned by one group's native watcher callback.
///
/// The fingerprint cache is only ever touched from here.
pub struct GroupEventHandler {
    group: String,
    filter: GroupFilter,
    debounce: Duration,
    cache: FingerprintCache,
    fs: Arc<dyn FileSystem>,
    active: Arc<AtomicBool>,
    sink: EventSink,
}

impl fmt::Debug for GroupEventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupEventHandler")
            .field("group", &self.group)
            .field("debounce", &self.debounce)
            .finish_non_exhaustive()
    }
}

impl GroupEventHandler {
    pub fn new(
        group: &WatchGroup,
        fs: Arc<dyn FileSystem>,
        active: Arc<AtomicBool>,
        sink: EventSink,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            group: group.name.clone(),
            filter: GroupFilter::new(&group.include, &group.ignore)?,
            debounce: group.debounce,
            cache: FingerprintCache::new(),
            fs,
            active,
            sink,
        })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn cache(&self) -> &FingerprintCache {
        &self.cache
    }

    /// Entry point for the native watcher callback.
    pub fn handle(&mut self, res: notify::Result<Event>) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }
        match res {
            Ok(event) => {
                for notification in self.process(&event, Instant::now()) {
                    self.forward(notification);
                }
            }
            Err(err) => warn!(group = %self.group, error = %err, "file watch error"),
        }
    }

    /// Run the filter/debounce/dedup pipeline for one raw event observed at
    /// `now`, returning what survives.
    pub fn process(&mut self, event: &Event, now: Instant) -> Vec<ChangeNotification> {
        let kind = match ChangeKind::classify(&event.kind) {
            Some(kind) => kind,
            None => return Vec::new(),
        };

        let mut out = Vec::new();
        for path in event.paths.iter() {
            if self.accept(kind, path, now) {
                debug!(group = %self.group, kind = %kind, ?path, "accepted file event");
                out.push(ChangeNotification {
                    kind,
                    paths: vec![display_path(path)],
                    group: self.group.clone(),
                });
            }
        }
        out
    }

    fn accept(&mut self, kind: ChangeKind, path: &PathBuf, now: Instant) -> bool {
        if self.fs.is_dir(path) {
            return false;
        }
        if !self.filter.accepts(path) {
            return false;
        }
        if !self.cache.debounce(path, now, self.debounce) {
            return false;
        }

        match kind {
            ChangeKind::Modified => {
                let hash = self.current_hash(path);
                if !self.cache.record_hash(path, hash) {
                    debug!(group = %self.group, ?path, "content unchanged; dropping event");
                    return false;
                }
            }
            ChangeKind::Created => {
                let hash = self.current_hash(path);
                self.cache.record_hash(path, hash);
            }
            ChangeKind::Deleted => self.cache.forget_hash(path),
            ChangeKind::Moved | ChangeKind::Unknown => {}
        }
        true
    }

    fn current_hash(&self, path: &PathBuf) -> Option<String> {
        match compute_file_hash(self.fs.as_ref(), path) {
            Ok(hash) => Some(hash),
            Err(err) => {
                debug!(?path, error = %err, "could not hash file; treating as changed");
                None
            }
        }
    }

    /// Hand a notification to the engine without blocking on its
    /// processing: retry a full buffer for up to [`HANDOFF_TIMEOUT`], then
    /// drop the notification.
    fn forward(&self, notification: ChangeNotification) {
        let deadline = Instant::now() + HANDOFF_TIMEOUT;
        let mut pending = notification;
        loop {
            match self.sink.try_send(pending) {
                Ok(()) => return,
                Err(TrySendError::Closed(_)) => {
                    debug!(group = %self.group, "event channel closed; dropping notification");
                    return;
                }
                Err(TrySendError::Full(back)) => {
                    if Instant::now() >= deadline {
                        warn!(
                            group = %self.group,
                            paths = ?back.paths,
                            "event channel full; dropping notification"
                        );
                        return;
                    }
                    pending = back;
                    std::thread::sleep(HANDOFF_RETRY);
                }
            }
        }
    }
}
