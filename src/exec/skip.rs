// src/exec/skip.rs

//! Declarative guards evaluated before a command is spawned.

use std::path::Path;

use tracing::{debug, warn};

use crate::config::CommandSpec;
use crate::fs::FileSystem;
use crate::template::EventContext;
use crate::watch::path_utils::resolve;
use crate::watch::patterns::{any_path_matches, build_globset};

pub const NO_TESTS_REASON: &str = "no test files or directories found";
pub const NO_MATCHING_CHANGES_REASON: &str = "no changes matching only_if_changed";

/// Heuristic that skips commands whose name mentions "test" in projects
/// that have no tests yet.
///
/// The default lists cover the usual conventions; projects with other
/// layouts can supply their own or disable the heuristic entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipPolicy {
    pub enabled: bool,
    /// Directory names checked directly under the project root.
    pub test_dirs: Vec<String>,
    /// File-name globs searched recursively under the project root.
    pub test_file_patterns: Vec<String>,
    /// Directory names the test-file search never descends into. Hidden
    /// directories and symlinked directories are always skipped.
    pub prune_dirs: Vec<String>,
}

impl Default for SkipPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            test_dirs: ["tests", "test", "spec", "__tests__"]
                .map(String::from)
                .to_vec(),
            test_file_patterns: ["*_test.py", "test_*.py", "*_test.go", "*_spec.rb", "*.test.js"]
                .map(String::from)
                .to_vec(),
            prune_dirs: ["node_modules", "target", "__pycache__", "venv", "dist", "build"]
                .map(String::from)
                .to_vec(),
        }
    }
}

impl SkipPolicy {
    /// Never skip on the test heuristic.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Return the skip reason for `spec`, if any.
    ///
    /// Checks, in order: `skip_until_exists`, the test heuristic, and
    /// `only_if_changed`. Evaluated fresh on every call.
    pub fn evaluate(
        &self,
        fs: &dyn FileSystem,
        project_root: &Path,
        spec: &CommandSpec,
        ctx: &EventContext,
    ) -> Option<String> {
        if let Some(target) = &spec.skip_until_exists {
            if !fs.exists(&resolve(project_root, target)) {
                return Some(format!("waiting for {}", target.display()));
            }
        }

        if self.enabled
            && spec.name.to_lowercase().contains("test")
            && !self.has_tests(fs, project_root)
        {
            return Some(NO_TESTS_REASON.to_string());
        }

        if !spec.only_if_changed.is_empty() {
            match build_globset(&spec.only_if_changed) {
                Ok(set) => {
                    if !any_path_matches(&set, project_root, &ctx.paths) {
                        return Some(NO_MATCHING_CHANGES_REASON.to_string());
                    }
                }
                Err(err) => {
                    warn!(command = %spec.name, error = %err, "invalid only_if_changed; not skipping");
                }
            }
        }

        None
    }

    /// True if the project has a conventional test directory or any file
    /// matching a test-file pattern.
    pub fn has_tests(&self, fs: &dyn FileSystem, project_root: &Path) -> bool {
        if self
            .test_dirs
            .iter()
            .any(|dir| fs.exists(&project_root.join(dir)))
        {
            return true;
        }

        let patterns = match build_globset(&self.test_file_patterns) {
            Ok(set) => set,
            Err(err) => {
                warn!(error = %err, "invalid test file pattern");
                return false;
            }
        };
        if patterns.is_empty() {
            return false;
        }

        let mut stack = vec![project_root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let entries = match fs.read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) => {
                    debug!(?dir, error = %err, "skipping unreadable directory");
                    continue;
                }
            };
            for path in entries {
                if fs.is_dir(&path) {
                    if self.descends_into(fs, &path) {
                        stack.push(path);
                    }
                } else if path
                    .file_name()
                    .is_some_and(|name| patterns.is_match(name.to_string_lossy().as_ref()))
                {
                    return true;
                }
            }
        }

        false
    }

    fn descends_into(&self, fs: &dyn FileSystem, dir: &Path) -> bool {
        let Some(name) = dir.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };
        !(name.starts_with('.')
            || self.prune_dirs.iter().any(|p| *p == name)
            || fs.is_symlink(dir))
    }
}
