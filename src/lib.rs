// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod template;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{Config, ConfigSource, FileConfigSource};
use crate::engine::{Engine, EngineOptions, TracingSink};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - logging (the config may choose the level)
/// - the engine (detector + executor + hot-reload)
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let source = Arc::new(FileConfigSource::new(&config_path));
    let config = source.load()?;

    logging::init_logging(args.log_level, config.global.log_level.as_deref())?;

    if args.dry_run {
        print_dry_run(&config);
        return Ok(());
    }

    let options = EngineOptions {
        hot_reload: !args.no_hot_reload,
        validate_commands: !args.no_validate,
        ..EngineOptions::default()
    };
    let root_dir = config_root_dir(&config_path);
    info!(config = ?config_path, root = ?root_dir, "starting watchflow");

    let engine = Engine::with_source(source, root_dir, Arc::new(TracingSink), options)?;
    engine.start().await?;

    // Ctrl-C -> graceful shutdown.
    {
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            engine.stop().await;
        });
    }

    engine.wait_stopped().await;
    Ok(())
}

/// Figure out a sensible project root for watching.
///
/// - If the config path has a non-empty parent (e.g. "ci/watchflow.toml"),
///   we use that directory.
/// - If it's just a bare filename like "watchflow.toml" (parent = ""),
///   we fall back to the current working directory "."
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Simple dry-run output: print groups and their commands.
fn print_dry_run(cfg: &Config) {
    println!("watchflow dry-run");
    println!("  global.fail_fast = {}", cfg.global.fail_fast);
    println!(
        "  global.max_parallel_commands = {}",
        cfg.global.max_parallel_commands
    );
    println!();

    println!("watchers ({}):", cfg.groups.len());
    for group in cfg.groups.iter() {
        println!("  - {} ({:?}, debounce {:?})", group.name, group.mode, group.debounce);
        println!("      paths: {:?}", group.paths);
        if !group.include.is_empty() {
            println!("      patterns: {:?}", group.include);
        }
        if !group.ignore.is_empty() {
            println!("      ignore: {:?}", group.ignore);
        }
        for cmd in group.commands.iter() {
            println!("      * {}: {}", cmd.name, cmd.argv.join(" "));
            if let Some(timeout) = cmd.timeout {
                println!("          timeout: {timeout:?}");
            }
            if cmd.retries > 0 {
                println!(
                    "          retries: {} ({:?})",
                    cmd.retries, cmd.retry_strategy
                );
            }
            if let Some(ref dir) = cmd.working_dir {
                println!("          working_dir: {}", dir.display());
            }
            if let Some(ref path) = cmd.skip_until_exists {
                println!("          skip_until_exists: {}", path.display());
            }
            if !cmd.only_if_changed.is_empty() {
                println!("          only_if_changed: {:?}", cmd.only_if_changed);
            }
        }
    }

    debug!("dry-run complete (no execution)");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_config_name_uses_cwd() {
        let root = config_root_dir(Path::new("watchflow.toml"));
        assert_eq!(root, std::env::current_dir().unwrap());
    }

    #[test]
    fn nested_config_uses_parent() {
        let root = config_root_dir(Path::new("ci/watchflow.toml"));
        assert_eq!(root, PathBuf::from("ci"));
    }
}
