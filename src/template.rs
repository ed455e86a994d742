// src/template.rs

//! `{{variable}}` substitution for command argv templates.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::Local;
use regex::{Captures, Regex};

static VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("static template regex"));

/// Per-trigger variables available to command templates.
///
/// Built once per dispatched event and dropped after substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    /// Primary changed path.
    pub path: String,
    /// Every changed path of the trigger.
    pub paths: Vec<String>,
    /// Event kind (`created`, `modified`, ...).
    pub event: String,
    /// Name of the watch group that fired.
    pub group: String,
    /// RFC 3339 timestamp of the dispatch.
    pub timestamp: String,
}

impl EventContext {
    pub fn new(event: impl Into<String>, paths: Vec<String>, group: impl Into<String>) -> Self {
        Self {
            path: paths.first().cloned().unwrap_or_default(),
            paths,
            event: event.into(),
            group: group.into(),
            timestamp: Local::now().to_rfc3339(),
        }
    }

    /// Flatten into the variable map seen by templates.
    pub fn variables(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("path", self.path.clone()),
            ("paths", self.paths.join(" ")),
            ("event", self.event.clone()),
            ("watcher", self.group.clone()),
            ("timestamp", self.timestamp.clone()),
        ])
    }
}

/// Replace every known `{{name}}`; unknown placeholders are kept verbatim.
pub fn substitute(template: &str, vars: &BTreeMap<&'static str, String>) -> String {
    VARIABLE
        .replace_all(template, |caps: &Captures<'_>| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Render a whole argv template against `ctx`.
pub fn render_argv(argv: &[String], ctx: &EventContext) -> Vec<String> {
    let vars = ctx.variables();
    argv.iter().map(|token| substitute(token, &vars)).collect()
}
