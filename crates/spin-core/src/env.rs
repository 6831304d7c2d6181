//! Process environment seen by the commands spin starts.
//!
//! Nothing here mutates the real process environment. Variables exported by
//! plugins are tracked so they can be written into the activation scripts;
//! the variables of an activated virtual environment are kept apart and are
//! never written anywhere.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::debug;

pub struct EnvContext {
    exports: IndexMap<String, Option<String>>,
    activation: IndexMap<String, Option<String>>,
    activated: Option<PathBuf>,
}

impl Default for EnvContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvContext {
    /// A context that has not activated any virtual environment yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            exports: IndexMap::new(),
            activation: IndexMap::new(),
            activated: None,
        }
    }

    /// Current value as a child process would see it.
    pub fn get(&self, name: &str) -> Option<String> {
        if let Some(value) = self.exports.get(name) {
            return value.clone();
        }
        if let Some(value) = self.activation.get(name) {
            return value.clone();
        }
        std::env::var(name).ok()
    }

    /// Exports `name` to every later command; `None` unsets it.
    pub fn export(&mut self, name: &str, value: Option<String>) {
        debug!(
            variable = name,
            value = value.as_deref().unwrap_or("<unset>"),
            "setenv"
        );
        self.exports.insert(name.to_string(), value);
    }

    /// Exported variables in export order.
    pub fn exports(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.exports
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }

    pub fn is_activated(&self) -> bool {
        self.activated.is_some()
    }

    pub fn activated_venv(&self) -> Option<&Path> {
        self.activated.as_deref()
    }

    /// Activates `venv` once; later calls are no-ops and return `false`.
    ///
    /// Mirrors what the generated activation scripts do: `VIRTUAL_ENV` is
    /// set, the script directory goes in front of `PATH`, `PYTHONHOME` is
    /// removed, and the `os.environ[...]` assignments found in
    /// `activate_this.py` are applied.
    pub fn activate(&mut self, venv: &Path, scriptdir: &Path, separator: char) -> bool {
        if self.activated.is_some() {
            return false;
        }
        self.activated = Some(venv.to_path_buf());
        if std::env::var_os("VIRTUAL_ENV").is_some_and(|current| Path::new(&current) == venv) {
            debug!(venv = %venv.display(), "already active in the calling shell");
            return false;
        }
        let path = match self.get("PATH") {
            Some(current) if !current.is_empty() => {
                format!("{}{separator}{current}", scriptdir.display())
            }
            _ => scriptdir.display().to_string(),
        };
        self.activation
            .insert("VIRTUAL_ENV".into(), Some(venv.display().to_string()));
        self.activation.insert("PATH".into(), Some(path));
        self.activation.insert("PYTHONHOME".into(), None);

        let activate_this = scriptdir.join("activate_this.py");
        if let Ok(text) = fs::read_to_string(&activate_this) {
            for (name, value) in parse_environ_assignments(&text) {
                self.activation.insert(name, Some(value));
            }
        }
        true
    }

    /// Overrides for a child process: activation first, exports on top.
    pub fn child_env(&self) -> Vec<(String, Option<String>)> {
        let mut merged: IndexMap<&str, Option<&str>> = IndexMap::new();
        for (name, value) in self.activation.iter().chain(self.exports.iter()) {
            merged.insert(name.as_str(), value.as_deref());
        }
        merged
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.map(ToOwned::to_owned)))
            .collect()
    }
}

/// Extracts `os.environ["NAME"] = r"value"` lines.
fn parse_environ_assignments(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("os.environ[\"")?;
            let (name, rest) = rest.split_once("\"]")?;
            let rest = rest.trim_start().strip_prefix('=')?.trim_start();
            let rest = rest.strip_prefix('r').unwrap_or(rest);
            let value = rest.strip_prefix('"')?.strip_suffix('"')?;
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}
