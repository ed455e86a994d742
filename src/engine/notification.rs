// src/engine/notification.rs

//! One-way notifications from the engine to a presentation layer.

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::exec::ExecutionResult;
use crate::watch::ChangeKind;

/// Something the engine wants a user to know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Watches are attached and events are being forwarded.
    WatchingStarted { groups: Vec<String> },
    FileEvent {
        kind: ChangeKind,
        path: String,
        group: String,
    },
    CommandStarted { name: String },
    CommandSucceeded { name: String, duration: Duration },
    CommandFailed {
        name: String,
        duration: Duration,
        /// First line of the captured output, truncated for display.
        error: Option<String>,
    },
    CommandSkipped {
        name: String,
        duration: Duration,
        reason: String,
    },
    /// Every result of one trigger, in declared order.
    GroupCompleted {
        group: String,
        results: Vec<ExecutionResult>,
    },
    FailFastTriggered { command: String },
    ConfigReloaded,
    ConfigReloadFailed { error: String },
    ShutdownInitiated,
    Stopped,
}

impl Notification {
    /// Per-command notification for a finished result.
    pub fn for_result(result: &ExecutionResult) -> Self {
        let name = result.command_name.clone();
        let duration = result.duration;
        if result.is_skipped() {
            Notification::CommandSkipped {
                name,
                duration,
                reason: result.skip_reason.clone().unwrap_or_else(|| "unknown".to_string()),
            }
        } else if result.is_success() {
            Notification::CommandSucceeded { name, duration }
        } else {
            Notification::CommandFailed {
                name,
                duration,
                error: result.error_excerpt(),
            }
        }
    }
}

/// Receiver of engine notifications.
///
/// Called from the engine's tasks; implementations must not block.
pub trait NotificationSink: Send + Sync + fmt::Debug {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notification: Notification) {
        match notification {
            Notification::WatchingStarted { groups } => {
                info!(?groups, "watching for changes");
            }
            Notification::FileEvent { kind, path, group } => {
                info!(%group, %kind, %path, "file event");
            }
            Notification::CommandStarted { name } => info!(command = %name, "running"),
            Notification::CommandSucceeded { name, duration } => {
                info!(command = %name, ?duration, "command succeeded");
            }
            Notification::CommandFailed {
                name,
                duration,
                error,
            } => {
                error!(
                    command = %name,
                    ?duration,
                    error = error.as_deref().unwrap_or(""),
                    "command failed"
                );
            }
            Notification::CommandSkipped {
                name,
                duration,
                reason,
            } => {
                info!(command = %name, ?duration, %reason, "command skipped");
            }
            Notification::GroupCompleted { group, results } => {
                let failed = results.iter().filter(|r| r.is_failure()).count();
                info!(%group, commands = results.len(), failed, "group completed");
            }
            Notification::FailFastTriggered { command } => {
                error!(%command, "fail-fast triggered; stopping");
            }
            Notification::ConfigReloaded => info!("configuration reloaded"),
            Notification::ConfigReloadFailed { error } => {
                warn!(%error, "failed to reload configuration; keeping previous");
            }
            Notification::ShutdownInitiated => info!("shutting down"),
            Notification::Stopped => info!("stopped"),
        }
    }
}

/// Forwards notifications into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: Notification) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.tx.send(notification);
    }
}
