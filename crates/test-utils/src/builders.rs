#![allow(dead_code)]

use watchflow::config::{
    CommandSpec, Config, RawCommand, RawConfig, RawGlobal, RawWatchGroup, WatchGroup,
};
use watchflow::types::{ExecutionMode, RetryStrategy};

/// Builder for `Config` to simplify test setup.
///
/// Goes through the same validation as a config file.
pub struct ConfigBuilder {
    config: RawConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfig {
                global: RawGlobal::default(),
                watchers: Vec::new(),
            },
        }
    }

    pub fn fail_fast(mut self, val: bool) -> Self {
        self.config.global.fail_fast = val;
        self
    }

    pub fn max_parallel(mut self, n: usize) -> Self {
        self.config.global.max_parallel_commands = n;
        self
    }

    pub fn with_group(mut self, group: GroupBuilder) -> Self {
        self.config.watchers.push(group.raw());
        self
    }

    pub fn raw(self) -> RawConfig {
        self.config
    }

    pub fn build(self) -> Config {
        Config::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a `[[watcher]]` group.
pub struct GroupBuilder {
    group: RawWatchGroup,
}

impl GroupBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            group: RawWatchGroup {
                name: name.to_string(),
                paths: Vec::new(),
                recursive: true,
                patterns: Vec::new(),
                ignore_patterns: Vec::new(),
                debounce: 100,
                mode: ExecutionMode::Sequential,
                commands: Vec::new(),
            },
        }
    }

    pub fn path(mut self, path: impl AsRef<std::path::Path>) -> Self {
        self.group
            .paths
            .push(path.as_ref().to_string_lossy().into_owned());
        self
    }

    pub fn pattern(mut self, pattern: &str) -> Self {
        self.group.patterns.push(pattern.to_string());
        self
    }

    pub fn ignore(mut self, pattern: &str) -> Self {
        self.group.ignore_patterns.push(pattern.to_string());
        self
    }

    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.group.debounce = ms;
        self
    }

    pub fn recursive(mut self, val: bool) -> Self {
        self.group.recursive = val;
        self
    }

    pub fn parallel(mut self) -> Self {
        self.group.mode = ExecutionMode::Parallel;
        self
    }

    pub fn command(mut self, cmd: CommandBuilder) -> Self {
        self.group.commands.push(cmd.raw());
        self
    }

    pub fn raw(self) -> RawWatchGroup {
        self.group
    }

    pub fn build(self) -> WatchGroup {
        WatchGroup::try_from(self.group).expect("Failed to build valid group from builder")
    }
}

/// Builder for a `[[watcher.command]]` entry.
pub struct CommandBuilder {
    cmd: RawCommand,
}

impl CommandBuilder {
    pub fn new(name: &str, argv: &[&str]) -> Self {
        Self {
            cmd: RawCommand {
                name: name.to_string(),
                cmd: argv.iter().map(|s| s.to_string()).collect(),
                timeout: None,
                retries: 0,
                retry_strategy: RetryStrategy::Fixed,
                working_dir: None,
                skip_until_exists: None,
                only_if_changed: Vec::new(),
            },
        }
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.cmd.timeout = Some(secs);
        self
    }

    pub fn retries(mut self, n: u32) -> Self {
        self.cmd.retries = n;
        self
    }

    pub fn exponential(mut self) -> Self {
        self.cmd.retry_strategy = RetryStrategy::Exponential;
        self
    }

    pub fn working_dir(mut self, dir: &str) -> Self {
        self.cmd.working_dir = Some(dir.to_string());
        self
    }

    pub fn skip_until_exists(mut self, path: &str) -> Self {
        self.cmd.skip_until_exists = Some(path.to_string());
        self
    }

    pub fn only_if_changed(mut self, pattern: &str) -> Self {
        self.cmd.only_if_changed.push(pattern.to_string());
        self
    }

    pub fn raw(self) -> RawCommand {
        self.cmd
    }

    pub fn build(self) -> CommandSpec {
        CommandSpec::try_from(self.cmd).expect("Failed to build valid command from builder")
    }
}
