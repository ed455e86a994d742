// src/watch/watcher.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::config::WatchGroup;
use crate::errors::{Result, WatchflowError};
use crate::fs::FileSystem;
use crate::watch::event_handler::{EventSink, GroupEventHandler};
use crate::watch::path_utils::resolve;

/// Native watcher plus the paths it attached, for one group.
struct GroupWatch {
    group: String,
    paths: Vec<PathBuf>,
    _inner: RecommendedWatcher,
}

/// Turns native filesystem events into deduplicated, group-tagged
/// [`ChangeNotification`](crate::watch::ChangeNotification)s.
///
/// Each registered group gets its own native watcher whose callback owns a
/// [`GroupEventHandler`]; nothing is forwarded until [`start`](Self::start)
/// is called.
pub struct ChangeDetector {
    project_root: PathBuf,
    fs: Arc<dyn FileSystem>,
    active: Arc<AtomicBool>,
    groups: Vec<GroupWatch>,
}

impl std::fmt::Debug for ChangeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeDetector")
            .field("project_root", &self.project_root)
            .field("groups", &self.groups.iter().map(|g| &g.group).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ChangeDetector {
    pub fn new(project_root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            project_root: project_root.into(),
            fs,
            active: Arc::new(AtomicBool::new(false)),
            groups: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Paths attached for `group`, if it was registered.
    pub fn watched_paths(&self, group: &str) -> Option<&[PathBuf]> {
        self.groups
            .iter()
            .find(|g| g.group == group)
            .map(|g| g.paths.as_slice())
    }

    /// Attach watches for every existing path of `group`.
    ///
    /// Missing or unattachable paths are logged and skipped; the call only
    /// fails when none of the group's paths could be attached.
    pub fn register(&mut self, group: &WatchGroup, sink: EventSink) -> Result<usize> {
        let mut handler =
            GroupEventHandler::new(group, Arc::clone(&self.fs), Arc::clone(&self.active), sink)
                .map_err(|e| {
                    WatchflowError::ConfigError(format!("watcher '{}': {e:#}", group.name))
                })?;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| handler.handle(res),
            Config::default(),
        )?;

        let mode = if group.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        let mut attached = Vec::new();
        for configured in group.paths.iter() {
            let path = resolve(&self.project_root, configured);
            if !self.fs.exists(&path) {
                warn!(group = %group.name, ?path, "watch path not found; skipping");
                continue;
            }
            let path = path.canonicalize().unwrap_or(path);
            match watcher.watch(&path, mode) {
                Ok(()) => {
                    debug!(group = %group.name, ?path, recursive = group.recursive, "watch attached");
                    attached.push(path);
                }
                Err(err) => {
                    warn!(group = %group.name, ?path, error = %err, "failed to attach watch; skipping");
                }
            }
        }

        if attached.is_empty() {
            return Err(WatchflowError::WatchPath {
                group: group.name.clone(),
                reason: format!("none of {:?} could be watched", group.paths),
            });
        }

        let count = attached.len();
        info!(group = %group.name, paths = count, "watch group registered");
        self.groups.push(GroupWatch {
            group: group.name.clone(),
            paths: attached,
            _inner: watcher,
        });
        Ok(count)
    }

    /// Begin forwarding events.
    pub fn start(&self) {
        self.active.store(true, Ordering::Release);
        info!(groups = self.groups.len(), "change detector started");
    }

    /// Stop forwarding events and tear down the native watchers, waiting at
    /// most `timeout` for their threads to shut down. Idempotent.
    pub async fn stop(&mut self, timeout: Duration) {
        let was_active = self.active.swap(false, Ordering::AcqRel);
        let groups = std::mem::take(&mut self.groups);
        if groups.is_empty() {
            if was_active {
                info!("change detector stopped");
            }
            return;
        }

        let teardown = tokio::task::spawn_blocking(move || drop(groups));
        match tokio::time::timeout(timeout, teardown).await {
            Ok(Ok(())) => info!("change detector stopped"),
            Ok(Err(err)) => warn!(error = %err, "watcher teardown panicked"),
            Err(_) => warn!(?timeout, "watcher threads did not stop in time; detaching"),
        }
    }
}
