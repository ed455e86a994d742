// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Compiling include/ignore patterns per watch group.
//! - Wiring up a cross-platform filesystem watcher (`notify`) per group.
//! - Debouncing and content-hash dedup so editors that save twice or only
//!   touch mtime do not re-run commands.
//!
//! It does **not** know about commands; it only turns filesystem changes
//! into group-tagged notifications.

pub mod cache;
pub mod event_handler;
pub mod hash;
pub mod path_utils;
pub mod patterns;
pub mod watcher;

pub use cache::{Fingerprint, FingerprintCache};
pub use event_handler::{
    ChangeKind, ChangeNotification, EventSink, GroupEventHandler, HANDOFF_TIMEOUT,
};
pub use hash::compute_file_hash;
pub use patterns::GroupFilter;
pub use watcher::ChangeDetector;
