// src/config/mod.rs

//! Configuration model, loading and validation for watchflow.
//!
//! Responsibilities:
//! - Define the TOML-backed raw model and the validated model (`model.rs`).
//! - Load a config file (`loader.rs`).
//! - Validate group/command invariants (`validate.rs`).
//! - Provide a fingerprinted source for hot-reload (`source.rs`).

pub mod loader;
pub mod model;
pub mod source;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, parse_and_validate, parse_str};
pub use model::{
    CommandSpec, Config, GlobalSettings, RawCommand, RawConfig, RawGlobal, RawWatchGroup,
    WatchGroup,
};
pub use source::{ConfigSource, FileConfigSource};
