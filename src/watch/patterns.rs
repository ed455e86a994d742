// src/watch/patterns.rs

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Compiled include/ignore patterns for one watch group.
///
/// Matching rules:
/// - an ignore pattern rejects a path when it glob-matches the file name or
///   appears verbatim anywhere in the full path (so `"node_modules"` or
///   `".git"` prune whole subtrees);
/// - with include patterns declared, the file name must match one of them;
/// - with no include patterns, every non-ignored file is accepted.
#[derive(Clone)]
pub struct GroupFilter {
    include: Option<GlobSet>,
    ignore: GlobSet,
    ignore_literals: Vec<String>,
}

impl fmt::Debug for GroupFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupFilter")
            .field("ignore_literals", &self.ignore_literals)
            .finish_non_exhaustive()
    }
}

impl GroupFilter {
    pub fn new(include: &[String], ignore: &[String]) -> Result<Self> {
        let include = if include.is_empty() {
            None
        } else {
            Some(build_globset(include).context("building include globset")?)
        };
        let ignore_set = build_globset(ignore).context("building ignore globset")?;

        Ok(Self {
            include,
            ignore: ignore_set,
            ignore_literals: ignore.to_vec(),
        })
    }

    /// Returns true if `path` passes the ignore and include rules.
    pub fn accepts(&self, path: &Path) -> bool {
        let file_name = match path.file_name() {
            Some(name) => name.to_string_lossy(),
            None => return false,
        };
        let full = path.to_string_lossy();

        if self.ignore.is_match(file_name.as_ref())
            || self
                .ignore_literals
                .iter()
                .any(|p| full.contains(p.as_str()))
        {
            return false;
        }

        match &self.include {
            Some(set) => set.is_match(file_name.as_ref()),
            None => true,
        }
    }
}

/// Build a GlobSet from simple string patterns.
pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// True if any of `paths` matches `set` by file name or by its path
/// relative to `root`.
pub fn any_path_matches(set: &GlobSet, root: &Path, paths: &[String]) -> bool {
    paths.iter().any(|p| {
        let path = Path::new(p);
        let by_name = path
            .file_name()
            .is_some_and(|name| set.is_match(name.to_string_lossy().as_ref()));
        by_name
            || crate::watch::path_utils::relative_str(root, path)
                .is_some_and(|rel| set.is_match(rel.as_str()))
    })
}
