// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Per-command failures are deliberately absent here: they are reported as
//! [`ExecutionResult`](crate::exec::ExecutionResult) values and never cross
//! the executor boundary as errors.

use thiserror::Error;

use crate::types::EngineState;

#[derive(Error, Debug)]
pub enum WatchflowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// None of a watch group's paths could be attached.
    #[error("no watchable paths for group '{group}': {reason}")]
    WatchPath { group: String, reason: String },

    #[error("file watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Lifecycle misuse of the orchestrator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("cannot {action} engine while it is {state}")]
    InvalidTransition {
        action: &'static str,
        state: EngineState,
    },
}

pub type Result<T> = std::result::Result<T, WatchflowError>;
