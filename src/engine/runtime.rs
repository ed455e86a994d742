// src/engine/runtime.rs

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ConfigSource};
use crate::errors::{EngineError, Result};
use crate::exec::{CommandExecutor, ExecutorOptions, ProcessBackend, RealProcessBackend};
use crate::fs::{FileSystem, RealFileSystem};
use crate::template::EventContext;
use crate::types::EngineState;
use crate::watch::{ChangeDetector, ChangeNotification};

use super::event_handlers::run_group;
use super::reload::ReloadState;
use super::{EngineOptions, Notification, NotificationSink};

/// Configuration plus the executor derived from it. Swapped as a unit.
#[derive(Debug)]
pub(crate) struct ActiveConfig {
    pub(crate) config: Config,
    pub(crate) executor: CommandExecutor,
}

/// Detector and loop handle owned while the engine is running.
struct Lifecycle {
    detector: ChangeDetector,
    event_loop: JoinHandle<()>,
}

pub(crate) struct Shared {
    pub(crate) project_root: PathBuf,
    pub(crate) options: EngineOptions,
    pub(crate) sink: Arc<dyn NotificationSink>,
    pub(crate) source: Option<Arc<dyn ConfigSource>>,
    pub(crate) fs: Arc<dyn FileSystem>,
    pub(crate) backend: Arc<dyn ProcessBackend>,
    state: watch::Sender<EngineState>,
    active: RwLock<Arc<ActiveConfig>>,
    lifecycle: Mutex<Option<Lifecycle>>,
    pub(crate) reload: Mutex<ReloadState>,
}

impl Shared {
    pub(crate) fn active(&self) -> Arc<ActiveConfig> {
        Arc::clone(&self.active.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn swap_active(&self, next: ActiveConfig) {
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }

    pub(crate) fn build_executor(&self, config: &Config) -> CommandExecutor {
        build_executor(&self.project_root, &self.options, &self.fs, &self.backend, config)
    }
}

fn build_executor(
    project_root: &Path,
    options: &EngineOptions,
    fs: &Arc<dyn FileSystem>,
    backend: &Arc<dyn ProcessBackend>,
    config: &Config,
) -> CommandExecutor {
    CommandExecutor::with_parts(
        project_root,
        ExecutorOptions {
            max_parallel: config.global.max_parallel_commands,
            validate_commands: options.validate_commands,
            skip_policy: options.skip_policy.clone(),
        },
        Arc::clone(fs),
        Arc::clone(backend),
    )
}

/// Owns the engine lifecycle and drives command groups in response to
/// change notifications.
///
/// State machine: `Stopped -> Running -> Stopping -> Stopped`. The handle
/// is cheap to clone; all clones control the same engine.
#[derive(Clone)]
pub struct Engine {
    pub(crate) inner: Arc<Shared>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("project_root", &self.inner.project_root)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Engine over a fixed configuration (no hot-reload source).
    pub fn new(
        config: Config,
        project_root: impl Into<PathBuf>,
        sink: Arc<dyn NotificationSink>,
        options: EngineOptions,
    ) -> Self {
        Self::with_parts(
            config,
            None,
            project_root,
            sink,
            options,
            Arc::new(RealFileSystem),
            Arc::new(RealProcessBackend),
        )
    }

    /// Load the initial configuration from `source` and keep it for
    /// hot-reload.
    pub fn with_source(
        source: Arc<dyn ConfigSource>,
        project_root: impl Into<PathBuf>,
        sink: Arc<dyn NotificationSink>,
        options: EngineOptions,
    ) -> Result<Self> {
        let config = source.load()?;
        Ok(Self::with_parts(
            config,
            Some(source),
            project_root,
            sink,
            options,
            Arc::new(RealFileSystem),
            Arc::new(RealProcessBackend),
        ))
    }

    /// Fully explicit constructor; tests use it to inject a fake process
    /// backend.
    pub fn with_parts(
        config: Config,
        source: Option<Arc<dyn ConfigSource>>,
        project_root: impl Into<PathBuf>,
        sink: Arc<dyn NotificationSink>,
        options: EngineOptions,
        fs: Arc<dyn FileSystem>,
        backend: Arc<dyn ProcessBackend>,
    ) -> Self {
        let project_root = project_root.into();
        let executor = build_executor(&project_root, &options, &fs, &backend, &config);
        let (state, _) = watch::channel(EngineState::Stopped);
        Self {
            inner: Arc::new(Shared {
                project_root,
                options,
                sink,
                source,
                fs,
                backend,
                state,
                active: RwLock::new(Arc::new(ActiveConfig { config, executor })),
                lifecycle: Mutex::new(None),
                reload: Mutex::new(ReloadState::default()),
            }),
        }
    }

    pub fn state(&self) -> EngineState {
        *self.inner.state.borrow()
    }

    pub fn project_root(&self) -> &Path {
        &self.inner.project_root
    }

    /// Snapshot of the configuration currently in effect.
    pub fn config(&self) -> Config {
        self.inner.active().config.clone()
    }

    /// Concurrency cap of the current executor.
    pub fn max_parallel(&self) -> usize {
        self.inner.active().executor.max_parallel()
    }

    /// Attach watches for every group and start the event loop.
    ///
    /// Only valid from `Stopped`. If any group has no attachable path the
    /// engine returns to `Stopped` and the error is returned.
    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        let state = self.state();
        if state != EngineState::Stopped {
            return Err(EngineError::InvalidTransition {
                action: "start",
                state,
            }
            .into());
        }

        self.inner.state.send_replace(EngineState::Running);
        match self.launch().await {
            Ok(running) => {
                *lifecycle = Some(running);
                Ok(())
            }
            Err(err) => {
                self.inner.state.send_replace(EngineState::Stopped);
                error!(error = %err, "engine failed to start");
                Err(err)
            }
        }
    }

    async fn launch(&self) -> Result<Lifecycle> {
        let shared = &self.inner;
        let active = shared.active();
        let (tx, rx) = mpsc::channel::<ChangeNotification>(shared.options.event_capacity.max(1));

        let mut detector = ChangeDetector::new(shared.project_root.clone(), Arc::clone(&shared.fs));
        for group in active.config.groups.iter() {
            if let Err(err) = detector.register(group, tx.clone()) {
                detector.stop(shared.options.stop_timeout).await;
                return Err(err);
            }
        }
        drop(tx);

        if shared.options.hot_reload {
            if let Some(source) = &shared.source {
                let mut reload = shared.reload.lock().await;
                *reload = ReloadState::applied(source.fingerprint().ok());
            }
        }

        detector.start();
        shared.sink.notify(Notification::WatchingStarted {
            groups: active.config.groups.iter().map(|g| g.name.clone()).collect(),
        });
        info!(root = ?shared.project_root, "engine running");

        let event_loop = tokio::spawn(self.clone().event_loop(rx, shared.state.subscribe()));
        Ok(Lifecycle {
            detector,
            event_loop,
        })
    }

    /// Stop watching, drain in-flight groups and return to `Stopped`.
    ///
    /// A no-op when already stopped. Commands that are still running after
    /// the drain timeout are left to finish on their own.
    pub async fn stop(&self) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        let Some(Lifecycle {
            mut detector,
            event_loop,
        }) = lifecycle.take()
        else {
            debug!("stop requested while already stopped");
            return;
        };

        self.inner.state.send_replace(EngineState::Stopping);
        self.inner.sink.notify(Notification::ShutdownInitiated);
        info!("engine stopping");

        detector.stop(self.inner.options.stop_timeout).await;
        if let Err(err) = event_loop.await {
            warn!(error = %err, "event loop ended abnormally");
        }

        self.inner.state.send_replace(EngineState::Stopped);
        self.inner.sink.notify(Notification::Stopped);
        info!("engine stopped");
    }

    /// Request a stop from inside the engine's own tasks without waiting
    /// for it.
    pub(crate) fn request_stop(&self) {
        let engine = self.clone();
        tokio::spawn(async move { engine.stop().await });
    }

    /// Resolves once the engine is `Stopped`.
    pub async fn wait_stopped(&self) {
        let mut rx = self.inner.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|state| *state == EngineState::Stopped).await;
    }

    async fn event_loop(
        self,
        mut events: mpsc::Receiver<ChangeNotification>,
        mut state: watch::Receiver<EngineState>,
    ) {
        let options = &self.inner.options;
        let reloading = options.hot_reload && self.inner.source.is_some();
        let mut reload_tick = tokio::time::interval(options.reload_interval);
        reload_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight = JoinSet::new();

        debug!(reloading, "event loop started");
        loop {
            tokio::select! {
                biased;

                changed = state.changed() => {
                    if changed.is_err() || *state.borrow_and_update() != EngineState::Running {
                        break;
                    }
                }
                maybe = events.recv() => match maybe {
                    Some(notification) => self.dispatch(notification, &mut in_flight),
                    None => {
                        debug!("event channel closed");
                        break;
                    }
                },
                _ = reload_tick.tick(), if reloading => {
                    self.reload_if_changed().await;
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(err) = joined {
                        warn!(error = %err, "command group task failed");
                    }
                }
            }
        }

        self.drain(in_flight).await;
        debug!("event loop exited");
    }

    /// Look up the owning group and run it in the background.
    fn dispatch(&self, notification: ChangeNotification, in_flight: &mut JoinSet<()>) {
        if self.state() != EngineState::Running {
            debug!(group = %notification.group, "not running; dropping notification");
            return;
        }

        let active = self.inner.active();
        let Some(group) = active.config.group(&notification.group).cloned() else {
            error!(group = %notification.group, "notification for unknown group; dropping");
            return;
        };

        let ChangeNotification { kind, paths, .. } = notification;
        self.inner.sink.notify(Notification::FileEvent {
            kind,
            path: paths.first().cloned().unwrap_or_else(|| "unknown".to_string()),
            group: group.name.clone(),
        });

        let ctx = EventContext::new(kind.as_str(), paths, group.name.as_str());
        in_flight.spawn(run_group(self.clone(), active, group, ctx));
    }

    async fn drain(&self, mut in_flight: JoinSet<()>) {
        if in_flight.is_empty() {
            return;
        }
        let pending = in_flight.len();
        debug!(pending, "waiting for in-flight groups");

        let drained = tokio::time::timeout(self.inner.options.drain_timeout, async {
            while let Some(joined) = in_flight.join_next().await {
                if let Err(err) = joined {
                    warn!(error = %err, "command group task failed");
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = in_flight.len(),
                "in-flight groups did not finish in time; detaching"
            );
            in_flight.detach_all();
        }
    }
}
