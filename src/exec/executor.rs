// src/exec/executor.rs

//! Bounded-concurrency command execution with retries, timeouts and skip
//! evaluation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::CommandSpec;
use crate::fs::{FileSystem, RealFileSystem};
use crate::template::{render_argv, EventContext};
use crate::types::ExecutionMode;
use crate::watch::path_utils::resolve;

use super::backend::{AttemptOutcome, Invocation, ProcessBackend};
use super::lookup::{lookup_supported, resolve_program};
use super::process::RealProcessBackend;
use super::result::{ExecutionResult, FailureKind};
use super::skip::SkipPolicy;

/// What a group run should do after a command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupControl {
    Continue,
    /// Do not start any further command of this group (sequential only).
    Halt,
}

/// Hooks into a group run.
///
/// `command_finished` is called in declared order. In parallel mode every
/// command has already run by then, so `Halt` has no effect.
pub trait GroupObserver: Send + Sync {
    /// A command passed its skip and lookup checks and is about to spawn.
    fn command_started(&self, _spec: &CommandSpec) {}

    fn command_finished(&self, _result: &ExecutionResult) -> GroupControl {
        GroupControl::Continue
    }
}

/// Observer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl GroupObserver for NoopObserver {}

/// Construction options for [`CommandExecutor`].
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Process-wide cap on concurrently executing commands.
    pub max_parallel: usize,
    /// Resolve the program before spawning (ignored where unsupported).
    pub validate_commands: bool,
    pub skip_policy: SkipPolicy,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            validate_commands: true,
            skip_policy: SkipPolicy::default(),
        }
    }
}

struct ExecutorInner {
    semaphore: Semaphore,
    max_parallel: usize,
    project_root: PathBuf,
    validate_commands: bool,
    skip_policy: SkipPolicy,
    fs: Arc<dyn FileSystem>,
    backend: Arc<dyn ProcessBackend>,
}

/// Runs [`CommandSpec`]s and always answers with an [`ExecutionResult`].
///
/// Cheap to clone; clones share the same semaphore, so the concurrency cap
/// applies across every group using this executor.
#[derive(Clone)]
pub struct CommandExecutor {
    inner: Arc<ExecutorInner>,
}

impl std::fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("max_parallel", &self.inner.max_parallel)
            .field("project_root", &self.inner.project_root)
            .finish_non_exhaustive()
    }
}

impl CommandExecutor {
    /// Executor backed by real processes and the real filesystem.
    pub fn new(project_root: impl Into<PathBuf>, options: ExecutorOptions) -> Self {
        Self::with_parts(
            project_root,
            options,
            Arc::new(RealFileSystem),
            Arc::new(RealProcessBackend),
        )
    }

    pub fn with_parts(
        project_root: impl Into<PathBuf>,
        options: ExecutorOptions,
        fs: Arc<dyn FileSystem>,
        backend: Arc<dyn ProcessBackend>,
    ) -> Self {
        let max_parallel = options.max_parallel.max(1);
        Self {
            inner: Arc::new(ExecutorInner {
                semaphore: Semaphore::new(max_parallel),
                max_parallel,
                project_root: project_root.into(),
                validate_commands: options.validate_commands,
                skip_policy: options.skip_policy,
                fs,
                backend,
            }),
        }
    }

    pub fn max_parallel(&self) -> usize {
        self.inner.max_parallel
    }

    /// Run a single command.
    pub async fn execute(&self, spec: &CommandSpec, ctx: &EventContext) -> ExecutionResult {
        self.run_spec(spec, ctx, &NoopObserver).await
    }

    /// Run a group of commands for one trigger.
    pub async fn execute_group(
        &self,
        specs: &[CommandSpec],
        ctx: &EventContext,
        mode: ExecutionMode,
    ) -> Vec<ExecutionResult> {
        self.execute_group_observed(specs, ctx, mode, Arc::new(NoopObserver))
            .await
    }

    /// Run a group of commands, reporting progress to `observer`.
    ///
    /// - Sequential: declared order; the observer sees each result as soon
    ///   as it is available and may halt the remainder.
    /// - Parallel: every command is spawned at once (each still waits for a
    ///   semaphore permit); results come back in declared order.
    pub async fn execute_group_observed(
        &self,
        specs: &[CommandSpec],
        ctx: &EventContext,
        mode: ExecutionMode,
        observer: Arc<dyn GroupObserver>,
    ) -> Vec<ExecutionResult> {
        match mode {
            ExecutionMode::Sequential => {
                let mut results = Vec::with_capacity(specs.len());
                for spec in specs {
                    let result = self.run_spec(spec, ctx, observer.as_ref()).await;
                    let control = observer.command_finished(&result);
                    results.push(result);
                    if control == GroupControl::Halt {
                        debug!(command = %spec.name, "group halted by observer");
                        break;
                    }
                }
                results
            }
            ExecutionMode::Parallel => {
                let handles: Vec<_> = specs
                    .iter()
                    .map(|spec| {
                        let executor = self.clone();
                        let spec = spec.clone();
                        let ctx = ctx.clone();
                        let observer = Arc::clone(&observer);
                        tokio::spawn(async move {
                            executor.run_spec(&spec, &ctx, observer.as_ref()).await
                        })
                    })
                    .collect();

                let mut results = Vec::with_capacity(handles.len());
                for (spec, handle) in specs.iter().zip(handles) {
                    let result = handle.await.unwrap_or_else(|err| {
                        warn!(command = %spec.name, error = %err, "command task failed");
                        ExecutionResult::failure(
                            &spec.name,
                            FailureKind::SpawnFailed,
                            Default::default(),
                            None,
                            String::new(),
                            format!("command task failed: {err}"),
                            0,
                        )
                    });
                    observer.command_finished(&result);
                    results.push(result);
                }
                results
            }
        }
    }

    /// Skip checks touch the filesystem (the test heuristic walks the
    /// project tree), so they run on the blocking pool.
    async fn skip_reason(&self, spec: &CommandSpec, ctx: &EventContext) -> Option<String> {
        let inner = Arc::clone(&self.inner);
        let spec = spec.clone();
        let ctx = ctx.clone();
        let evaluated = tokio::task::spawn_blocking(move || {
            inner
                .skip_policy
                .evaluate(inner.fs.as_ref(), &inner.project_root, &spec, &ctx)
        })
        .await;

        match evaluated {
            Ok(reason) => reason,
            Err(err) => {
                warn!(error = %err, "skip evaluation failed; running command");
                None
            }
        }
    }

    async fn run_spec(
        &self,
        spec: &CommandSpec,
        ctx: &EventContext,
        observer: &dyn GroupObserver,
    ) -> ExecutionResult {
        let inner = &self.inner;
        let started = Instant::now();

        let _permit = match inner.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return ExecutionResult::failure(
                    &spec.name,
                    FailureKind::SpawnFailed,
                    started.elapsed(),
                    None,
                    String::new(),
                    "executor is shut down".to_string(),
                    0,
                );
            }
        };

        if let Some(reason) = self.skip_reason(spec, ctx).await {
            info!(command = %spec.name, reason = %reason, "command skipped");
            return ExecutionResult::skipped(&spec.name, reason, started.elapsed());
        }

        let argv = render_argv(&spec.argv, ctx);
        let working_dir = match &spec.working_dir {
            Some(dir) => resolve(&inner.project_root, dir),
            None => inner.project_root.clone(),
        };

        let program = argv.first().map(String::as_str).unwrap_or_default();
        if program.is_empty() || (inner.validate_commands && lookup_supported()) {
            if let Err(msg) = resolve_program(inner.fs.as_ref(), program, &working_dir) {
                warn!(command = %spec.name, error = %msg, "command not found");
                return ExecutionResult::failure(
                    &spec.name,
                    FailureKind::CommandNotFound,
                    started.elapsed(),
                    None,
                    String::new(),
                    msg,
                    0,
                );
            }
        }

        observer.command_started(spec);

        let mut attempt: u32 = 0;
        loop {
            let invocation = Invocation {
                command: spec.name.clone(),
                argv: argv.clone(),
                working_dir: working_dir.clone(),
                timeout: spec.timeout,
                attempt,
            };

            match inner.backend.run(&invocation).await {
                AttemptOutcome::Exited { code: 0, stdout, stderr } => {
                    debug!(command = %spec.name, attempt = attempt + 1, "command succeeded");
                    return ExecutionResult::success(
                        &spec.name,
                        started.elapsed(),
                        stdout,
                        stderr,
                        attempt + 1,
                    );
                }
                AttemptOutcome::Exited { code, .. } if attempt < spec.retries => {
                    let delay = spec.retry_strategy.delay(attempt);
                    debug!(
                        command = %spec.name,
                        attempt = attempt + 1,
                        exit_code = code,
                        ?delay,
                        "command failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                AttemptOutcome::Exited { code, stdout, stderr } => {
                    debug!(command = %spec.name, exit_code = code, "command failed");
                    return ExecutionResult::failure(
                        &spec.name,
                        FailureKind::NonZeroExit,
                        started.elapsed(),
                        Some(code),
                        stdout,
                        stderr,
                        attempt + 1,
                    );
                }
                AttemptOutcome::TimedOut => {
                    let secs = spec.timeout.map(|t| t.as_secs()).unwrap_or_default();
                    return ExecutionResult::failure(
                        &spec.name,
                        FailureKind::TimedOut,
                        started.elapsed(),
                        None,
                        String::new(),
                        format!("command timed out after {secs}s"),
                        attempt + 1,
                    );
                }
                AttemptOutcome::SpawnFailed(msg) => {
                    return ExecutionResult::failure(
                        &spec.name,
                        FailureKind::SpawnFailed,
                        started.elapsed(),
                        None,
                        String::new(),
                        msg,
                        attempt + 1,
                    );
                }
            }
        }
    }
}
