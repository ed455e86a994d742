// src/config/loader.rs

use std::path::Path;

use crate::config::model::{Config, RawConfig};
use crate::errors::Result;
use crate::fs::{FileSystem, RealFileSystem};

/// Name of the configuration file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "watchflow.toml";

/// Parse TOML text into a `RawConfig`.
///
/// This only performs deserialization; it does **not** perform semantic
/// validation. Use [`parse_and_validate`] for that.
pub fn parse_str(contents: &str) -> Result<RawConfig> {
    let config: RawConfig = toml::from_str(contents)?;
    Ok(config)
}

/// Parse and validate TOML text.
pub fn parse_and_validate(contents: &str) -> Result<Config> {
    Config::try_from(parse_str(contents)?)
}

/// Load a configuration file through `fs` and return the raw `RawConfig`.
pub fn load_from_path(fs: &dyn FileSystem, path: impl AsRef<Path>) -> Result<RawConfig> {
    let contents = fs.read_to_string(path.as_ref())?;
    parse_str(&contents)
}

/// Load a configuration file from disk and run validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` default functions).
/// - Checks group/command invariants and global limits.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Config> {
    let raw = load_from_path(&RealFileSystem, path)?;
    Config::try_from(raw)
}
