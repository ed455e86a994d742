// src/exec/mod.rs

//! Command execution layer.
//!
//! This module is responsible for actually running the commands declared in
//! a watch group and reporting a uniform [`ExecutionResult`] for each one,
//! whatever happened (success, failure, timeout, skip).
//!
//! - [`executor`] owns the concurrency cap, retry loop and group modes.
//! - [`process`] spawns real child processes with `tokio::process`.
//! - [`backend`] provides the `ProcessBackend` seam, which tests replace
//!   with a scripted fake.
//! - [`skip`] decides whether a command should be skipped for a trigger.
//! - [`lookup`] resolves the program before anything is spawned.

pub mod backend;
pub mod executor;
pub mod lookup;
pub mod process;
pub mod result;
pub mod skip;

pub use backend::{AttemptOutcome, Invocation, ProcessBackend};
pub use executor::{
    CommandExecutor, ExecutorOptions, GroupControl, GroupObserver, NoopObserver,
};
pub use process::RealProcessBackend;
pub use result::{ExecutionResult, FailureKind, Outcome};
pub use skip::SkipPolicy;
