// src/config/validate.rs

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::model::{
    CommandSpec, Config, GlobalSettings, RawCommand, RawConfig, RawGlobal, RawWatchGroup,
    WatchGroup,
};
use crate::errors::{Result, WatchflowError};
use crate::watch::patterns::build_globset;

pub const MAX_PARALLEL_COMMANDS: usize = 32;
pub const MAX_RETRIES: u32 = 10;
pub const MAX_DEBOUNCE_MS: u64 = 60_000;

impl TryFrom<RawConfig> for Config {
    type Error = WatchflowError;

    fn try_from(raw: RawConfig) -> std::result::Result<Self, Self::Error> {
        ensure_has_groups(&raw)?;
        ensure_unique_group_names(&raw)?;
        let global = GlobalSettings::try_from(raw.global)?;

        let groups = raw
            .watchers
            .into_iter()
            .map(WatchGroup::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Config { global, groups })
    }
}

impl TryFrom<RawGlobal> for GlobalSettings {
    type Error = WatchflowError;

    fn try_from(raw: RawGlobal) -> std::result::Result<Self, Self::Error> {
        if !(1..=MAX_PARALLEL_COMMANDS).contains(&raw.max_parallel_commands) {
            return Err(config_error(format!(
                "[global].max_parallel_commands must be between 1 and {} (got {})",
                MAX_PARALLEL_COMMANDS, raw.max_parallel_commands
            )));
        }

        Ok(GlobalSettings {
            fail_fast: raw.fail_fast,
            max_parallel_commands: raw.max_parallel_commands,
            log_level: raw.log_level,
        })
    }
}

impl TryFrom<RawWatchGroup> for WatchGroup {
    type Error = WatchflowError;

    fn try_from(raw: RawWatchGroup) -> std::result::Result<Self, Self::Error> {
        if raw.name.trim().is_empty() {
            return Err(config_error("watcher name must not be empty".to_string()));
        }
        if raw.paths.is_empty() {
            return Err(config_error(format!(
                "watcher '{}' must declare at least one path",
                raw.name
            )));
        }
        if raw.commands.is_empty() {
            return Err(config_error(format!(
                "watcher '{}' must declare at least one [[watcher.command]]",
                raw.name
            )));
        }
        if raw.debounce > MAX_DEBOUNCE_MS {
            return Err(config_error(format!(
                "watcher '{}': debounce must be <= {} ms (got {})",
                raw.name, MAX_DEBOUNCE_MS, raw.debounce
            )));
        }

        ensure_globs(&raw.name, "patterns", &raw.patterns)?;
        ensure_globs(&raw.name, "ignore_patterns", &raw.ignore_patterns)?;

        let mut seen = HashSet::new();
        for cmd in raw.commands.iter() {
            if !seen.insert(cmd.name.as_str()) {
                return Err(config_error(format!(
                    "watcher '{}' declares command '{}' more than once",
                    raw.name, cmd.name
                )));
            }
        }

        let group_name = raw.name.clone();
        let commands = raw
            .commands
            .into_iter()
            .map(|c| {
                CommandSpec::try_from(c).map_err(|e| match e {
                    WatchflowError::ConfigError(msg) => {
                        config_error(format!("watcher '{}': {}", group_name, msg))
                    }
                    other => other,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(WatchGroup {
            name: raw.name,
            paths: raw.paths.into_iter().map(PathBuf::from).collect(),
            recursive: raw.recursive,
            include: raw.patterns,
            ignore: raw.ignore_patterns,
            debounce: Duration::from_millis(raw.debounce),
            mode: raw.mode,
            commands,
        })
    }
}

impl TryFrom<RawCommand> for CommandSpec {
    type Error = WatchflowError;

    fn try_from(raw: RawCommand) -> std::result::Result<Self, Self::Error> {
        if raw.name.trim().is_empty() {
            return Err(config_error("command name must not be empty".to_string()));
        }
        match raw.cmd.first() {
            Some(program) if !program.trim().is_empty() => {}
            _ => {
                return Err(config_error(format!(
                    "command '{}' has an empty cmd",
                    raw.name
                )));
            }
        }
        if raw.retries > MAX_RETRIES {
            return Err(config_error(format!(
                "command '{}': retries must be between 0 and {} (got {})",
                raw.name, MAX_RETRIES, raw.retries
            )));
        }
        ensure_globs(&raw.name, "only_if_changed", &raw.only_if_changed)?;
        if raw.timeout == Some(0) {
            return Err(config_error(format!(
                "command '{}': timeout must be >= 1 second",
                raw.name
            )));
        }

        Ok(CommandSpec {
            name: raw.name,
            argv: raw.cmd,
            timeout: raw.timeout.map(Duration::from_secs),
            retries: raw.retries,
            retry_strategy: raw.retry_strategy,
            working_dir: raw.working_dir.map(PathBuf::from),
            skip_until_exists: raw.skip_until_exists.map(PathBuf::from),
            only_if_changed: raw.only_if_changed,
        })
    }
}

fn ensure_has_groups(cfg: &RawConfig) -> Result<()> {
    if cfg.watchers.is_empty() {
        return Err(config_error(
            "config must contain at least one [[watcher]] section".to_string(),
        ));
    }
    Ok(())
}

fn ensure_unique_group_names(cfg: &RawConfig) -> Result<()> {
    let mut seen = HashSet::new();
    for group in cfg.watchers.iter() {
        if !seen.insert(group.name.as_str()) {
            return Err(config_error(format!(
                "watcher '{}' is declared more than once",
                group.name
            )));
        }
    }
    Ok(())
}

fn ensure_globs(owner: &str, field: &str, patterns: &[String]) -> Result<()> {
    build_globset(patterns)
        .map(|_| ())
        .map_err(|e| config_error(format!("'{}': invalid {}: {:#}", owner, field, e)))
}

fn config_error(msg: String) -> WatchflowError {
    WatchflowError::ConfigError(msg)
}
