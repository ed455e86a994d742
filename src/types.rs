use std::fmt;
use std::time::Duration;

use serde::Deserialize;

/// Upper bound for exponential back-off between retries, in seconds.
pub const MAX_RETRY_DELAY_SECS: u64 = 60;

/// How the commands of one watch group are run for a single trigger.
///
/// - `Sequential`: commands run strictly in declared order and a failure can
///   halt the remainder (fail-fast).
/// - `Parallel`: all commands are launched at once; results are still
///   reported in declared order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Sequential,
    Parallel,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Sequential
    }
}

/// Delay policy between attempts of a failing command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    /// Always wait one second.
    Fixed,
    /// Wait `2^attempt` seconds, capped at [`MAX_RETRY_DELAY_SECS`].
    Exponential,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        RetryStrategy::Fixed
    }
}

impl RetryStrategy {
    /// Delay to sleep after the zero-indexed `attempt` failed.
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            RetryStrategy::Fixed => Duration::from_secs(1),
            RetryStrategy::Exponential => {
                let secs = 2u64
                    .checked_pow(attempt)
                    .unwrap_or(u64::MAX)
                    .min(MAX_RETRY_DELAY_SECS);
                Duration::from_secs(secs)
            }
        }
    }
}

/// Lifecycle state of an [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Running,
    Stopping,
}

impl Default for EngineState {
    fn default() -> Self {
        EngineState::Stopped
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineState::Stopped => "stopped",
            EngineState::Running => "running",
            EngineState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}
