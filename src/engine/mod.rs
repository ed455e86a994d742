// src/engine/mod.rs

//! Orchestration engine for watchflow.
//!
//! This module ties together:
//! - the change detector (one native watcher per group)
//! - the command executor (shared semaphore, retries, skips)
//! - the event loop that reacts to:
//!   - group-tagged change notifications
//!   - the hot-reload poll tick
//!   - lifecycle transitions (stop requests, fail-fast)
//!
//! Lifecycle and the loop live in [`runtime`]; per-trigger group execution
//! and result reporting in [`event_handlers`]; configuration hot-reload in
//! [`reload`]. Everything user-visible leaves through a [`NotificationSink`].

use std::time::Duration;

use crate::exec::SkipPolicy;

pub mod event_handlers;
pub mod notification;
pub mod reload;
pub mod runtime;

pub use notification::{ChannelSink, Notification, NotificationSink, TracingSink};
pub use runtime::Engine;
pub use crate::types::EngineState;

/// Runtime knobs that are not part of the user configuration file.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Poll the configuration source and apply changes while running.
    pub hot_reload: bool,
    pub reload_interval: Duration,
    /// Upper bound for tearing down the native watchers on stop.
    pub stop_timeout: Duration,
    /// How long stop waits for in-flight groups before detaching them.
    pub drain_timeout: Duration,
    /// Capacity of the detector -> loop channel.
    pub event_capacity: usize,
    pub validate_commands: bool,
    pub skip_policy: SkipPolicy,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            hot_reload: true,
            reload_interval: Duration::from_millis(500),
            stop_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(30),
            event_capacity: 256,
            validate_commands: true,
            skip_policy: SkipPolicy::default(),
        }
    }
}
