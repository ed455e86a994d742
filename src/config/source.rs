// src/config/source.rs

//! Where the engine gets its configuration from when hot-reload is enabled.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::loader::load_from_path;
use crate::config::model::Config;
use crate::errors::Result;
use crate::fs::{FileSystem, RealFileSystem};
use crate::watch::hash::compute_file_hash;

/// A configuration origin that can be fingerprinted and re-loaded.
///
/// The engine polls [`fingerprint`](ConfigSource::fingerprint) and only calls
/// [`load`](ConfigSource::load) when the fingerprint changed.
pub trait ConfigSource: Send + Sync + fmt::Debug {
    /// Stable digest of the current source contents.
    fn fingerprint(&self) -> Result<String>;

    /// Load and validate the current contents.
    fn load(&self) -> Result<Config>;
}

/// TOML file on a [`FileSystem`], fingerprinted with blake3.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_fs(path, Arc::new(RealFileSystem))
    }

    pub fn with_fs(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            path: path.into(),
            fs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for FileConfigSource {
    fn fingerprint(&self) -> Result<String> {
        Ok(compute_file_hash(self.fs.as_ref(), &self.path)?)
    }

    fn load(&self) -> Result<Config> {
        let raw = load_from_path(self.fs.as_ref(), &self.path)?;
        Config::try_from(raw)
    }
}
