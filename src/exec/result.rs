// src/exec/result.rs

use std::time::Duration;

/// Maximum length of the one-line error excerpt shown to users.
pub const EXCERPT_MAX_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    Skipped,
}

/// Why a command ended in [`Outcome::Failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The program could not be resolved; nothing was spawned.
    CommandNotFound,
    /// The OS refused to start the process.
    SpawnFailed,
    /// An attempt overran its timeout and was killed.
    TimedOut,
    /// The final attempt exited with a non-zero code.
    NonZeroExit,
}

/// Outcome of running one [`CommandSpec`](crate::config::CommandSpec) for
/// one trigger. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub command_name: String,
    pub outcome: Outcome,
    pub failure: Option<FailureKind>,
    pub duration: Duration,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub skip_reason: Option<String>,
    /// Number of processes spawned (0 for skips and lookup failures).
    pub attempts: u32,
}

impl ExecutionResult {
    pub(crate) fn success(
        name: &str,
        duration: Duration,
        stdout: String,
        stderr: String,
        attempts: u32,
    ) -> Self {
        Self {
            command_name: name.to_string(),
            outcome: Outcome::Success,
            failure: None,
            duration,
            exit_code: Some(0),
            stdout: tidy(stdout),
            stderr: tidy(stderr),
            skip_reason: None,
            attempts,
        }
    }

    pub(crate) fn failure(
        name: &str,
        kind: FailureKind,
        duration: Duration,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
        attempts: u32,
    ) -> Self {
        Self {
            command_name: name.to_string(),
            outcome: Outcome::Failure,
            failure: Some(kind),
            duration,
            exit_code,
            stdout: tidy(stdout),
            stderr: tidy(stderr),
            skip_reason: None,
            attempts,
        }
    }

    pub(crate) fn skipped(name: &str, reason: String, duration: Duration) -> Self {
        Self {
            command_name: name.to_string(),
            outcome: Outcome::Skipped,
            failure: None,
            duration,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            skip_reason: Some(reason),
            attempts: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    pub fn is_failure(&self) -> bool {
        self.outcome == Outcome::Failure
    }

    pub fn is_skipped(&self) -> bool {
        self.outcome == Outcome::Skipped
    }

    /// First non-empty line of stderr (falling back to stdout), truncated
    /// to [`EXCERPT_MAX_CHARS`].
    pub fn error_excerpt(&self) -> Option<String> {
        let source = if !self.stderr.trim().is_empty() {
            &self.stderr
        } else if !self.stdout.trim().is_empty() {
            &self.stdout
        } else {
            return None;
        };
        let line = source.trim().lines().next().unwrap_or_default();
        Some(truncate(line, EXCERPT_MAX_CHARS))
    }
}

fn tidy(s: String) -> String {
    let trimmed = s.trim_end();
    if trimmed.len() == s.len() {
        s
    } else {
        trimmed.to_string()
    }
}

fn truncate(line: &str, max: usize) -> String {
    if line.chars().count() <= max {
        return line.to_string();
    }
    let mut out: String = line.chars().take(max - 3).collect();
    out.push_str("...");
    out
}
