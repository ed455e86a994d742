// src/exec/backend.rs

//! Pluggable process backend.
//!
//! The executor talks to a `ProcessBackend` for every attempt instead of
//! spawning processes itself. Production code uses
//! [`RealProcessBackend`](super::process::RealProcessBackend); tests can
//! provide a backend that scripts exit codes and records invocations.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

/// One attempt of one command, fully rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Command name (for logging).
    pub command: String,
    pub argv: Vec<String>,
    pub working_dir: PathBuf,
    pub timeout: Option<Duration>,
    /// Zero-indexed attempt number.
    pub attempt: u32,
}

/// What happened to a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The process exited on its own.
    Exited {
        code: i32,
        stdout: String,
        stderr: String,
    },
    /// The timeout elapsed; the process was killed and reaped.
    TimedOut,
    /// The process could not be started.
    SpawnFailed(String),
}

/// Trait abstracting how a single attempt is executed.
pub trait ProcessBackend: Send + Sync {
    fn run<'a>(
        &'a self,
        invocation: &'a Invocation,
    ) -> Pin<Box<dyn Future<Output = AttemptOutcome> + Send + 'a>>;
}
