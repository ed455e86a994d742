// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::{ExecutionMode, RetryStrategy};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [global]
/// fail_fast = false
/// max_parallel_commands = 4
///
/// [[watcher]]
/// name = "py"
/// paths = ["src"]
/// patterns = ["*.py"]
/// ignore_patterns = ["__pycache__"]
/// debounce = 100
///
/// [[watcher.command]]
/// name = "fmt"
/// cmd = ["black", "{{path}}"]
/// timeout = 30
/// ```
///
/// Only the shape is checked here; semantic validation happens when
/// converting into [`Config`] (see `validate.rs`).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfig {
    /// Global behaviour from `[global]`.
    #[serde(default)]
    pub global: RawGlobal,

    /// All groups from `[[watcher]]`.
    #[serde(default, rename = "watcher")]
    pub watchers: Vec<RawWatchGroup>,
}

/// `[global]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawGlobal {
    /// Stop the whole engine on the first failing command.
    #[serde(default)]
    pub fail_fast: bool,

    /// Process-wide cap on concurrently running commands (1-32).
    #[serde(default = "default_max_parallel_commands")]
    pub max_parallel_commands: usize,

    /// Log level used by the binary when `--log-level` is absent.
    #[serde(default)]
    pub log_level: Option<String>,
}

fn default_max_parallel_commands() -> usize {
    4
}

impl Default for RawGlobal {
    fn default() -> Self {
        Self {
            fail_fast: false,
            max_parallel_commands: default_max_parallel_commands(),
            log_level: None,
        }
    }
}

/// `[[watcher]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RawWatchGroup {
    pub name: String,

    /// Roots to watch, relative to the project root unless absolute.
    pub paths: Vec<String>,

    #[serde(default = "default_recursive")]
    pub recursive: bool,

    /// File-name globs; empty means "every file that is not ignored".
    #[serde(default)]
    pub patterns: Vec<String>,

    /// File-name globs or plain substrings of the full path.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Debounce window in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce: u64,

    #[serde(default)]
    pub mode: ExecutionMode,

    #[serde(default, rename = "command")]
    pub commands: Vec<RawCommand>,
}

fn default_recursive() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    100
}

/// `[[watcher.command]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCommand {
    pub name: String,

    /// argv template; tokens may contain `{{variable}}` placeholders.
    pub cmd: Vec<String>,

    /// Timeout in seconds.
    #[serde(default)]
    pub timeout: Option<u64>,

    #[serde(default)]
    pub retries: u32,

    #[serde(default)]
    pub retry_strategy: RetryStrategy,

    #[serde(default)]
    pub working_dir: Option<String>,

    #[serde(default)]
    pub skip_until_exists: Option<String>,

    #[serde(default)]
    pub only_if_changed: Vec<String>,
}

/// Validated configuration consumed by the engine.
#[derive(Debug, Clone)]
pub struct Config {
    pub global: GlobalSettings,
    pub groups: Vec<WatchGroup>,
}

impl Config {
    /// Look up a watch group by name.
    pub fn group(&self, name: &str) -> Option<&WatchGroup> {
        self.groups.iter().find(|g| g.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalSettings {
    pub fail_fast: bool,
    pub max_parallel_commands: usize,
    pub log_level: Option<String>,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            fail_fast: false,
            max_parallel_commands: default_max_parallel_commands(),
            log_level: None,
        }
    }
}

/// A named bundle of paths, patterns and commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchGroup {
    pub name: String,
    pub paths: Vec<PathBuf>,
    pub recursive: bool,
    pub include: Vec<String>,
    pub ignore: Vec<String>,
    pub debounce: Duration,
    pub mode: ExecutionMode,
    pub commands: Vec<CommandSpec>,
}

/// One command of a watch group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: String,
    pub argv: Vec<String>,
    pub timeout: Option<Duration>,
    pub retries: u32,
    pub retry_strategy: RetryStrategy,
    pub working_dir: Option<PathBuf>,
    pub skip_until_exists: Option<PathBuf>,
    pub only_if_changed: Vec<String>,
}
