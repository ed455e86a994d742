// src/exec/lookup.rs

//! Pre-flight check that a command's program can actually be found.

use std::path::{Path, PathBuf};

use crate::fs::FileSystem;
use crate::watch::path_utils::resolve;

/// Whether existence checks make sense on this host.
///
/// On Windows commands run through `cmd /C`, which resolves built-ins that
/// no PATH lookup would find.
pub fn lookup_supported() -> bool {
    !cfg!(windows)
}

/// Resolve the first argv token.
///
/// Tokens containing a path separator are checked as paths relative to
/// `working_dir`; bare names are looked up on `PATH`.
pub fn resolve_program(
    fs: &dyn FileSystem,
    program: &str,
    working_dir: &Path,
) -> Result<PathBuf, String> {
    if program.trim().is_empty() {
        return Err("empty command".to_string());
    }

    if program.contains('/') || program.contains('\\') {
        let path = resolve(working_dir, Path::new(program));
        if fs.exists(&path) {
            return Ok(path);
        }
        return Err(format!("command path not found: {program}"));
    }

    which::which(program).map_err(|_| format!("command not found in PATH: {program}"))
}
