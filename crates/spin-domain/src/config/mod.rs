//! Layered configuration tree with deferred `{dotted.path}` interpolation.
//!
//! Values are stored raw and expanded on read, so a later override of
//! `spin.cache` is visible through every option that refers to it.

mod interpolate;
mod spinfile;

use indexmap::IndexMap;
use serde::Serialize;

pub use spinfile::{load_spinfile, parse_spinfile};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required option `{0}`")]
    Missing(String),
    #[error("option `{path}` must be {expected}")]
    WrongType {
        path: String,
        expected: &'static str,
    },
    #[error("unknown reference `{{{reference}}}` in `{value}`")]
    UnknownReference { reference: String, value: String },
    #[error("`{0}` refers to itself during interpolation")]
    Cycle(String),
    #[error("unbalanced braces in `{0}`")]
    Unbalanced(String),
    #[error("invalid property `{0}`; expected KEY=VALUE")]
    InvalidProperty(String),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Str(String),
    List(Vec<String>),
    Table(ConfigTree),
}

impl ConfigValue {
    pub fn list<S: AsRef<str>>(items: &[S]) -> Self {
        Self::List(items.iter().map(|item| item.as_ref().to_string()).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<String>> for ConfigValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<ConfigTree> for ConfigValue {
    fn from(value: ConfigTree) -> Self {
        Self::Table(value)
    }
}

impl<T: Into<ConfigValue>> From<Option<T>> for ConfigValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ConfigTree {
    entries: IndexMap<String, ConfigValue>,
}

impl ConfigTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`ConfigTree::set`], used for plugin defaults.
    #[must_use]
    pub fn with(mut self, path: &str, value: impl Into<ConfigValue>) -> Self {
        self.set(path, value);
        self
    }

    pub fn get(&self, path: &str) -> Option<&ConfigValue> {
        let mut parts = path.split('.');
        let mut current = self.entries.get(parts.next()?)?;
        for part in parts {
            match current {
                ConfigValue::Table(table) => current = table.entries.get(part)?,
                _ => return None,
            }
        }
        Some(current)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn table(&self, path: &str) -> Option<&ConfigTree> {
        match self.get(path)? {
            ConfigValue::Table(table) => Some(table),
            _ => None,
        }
    }

    /// Sets `path`, creating intermediate tables and replacing scalars that
    /// stand in the way.
    pub fn set(&mut self, path: &str, value: impl Into<ConfigValue>) {
        let value = value.into();
        match path.split_once('.') {
            None => {
                self.entries.insert(path.to_string(), value);
            }
            Some((head, rest)) => {
                let entry = self
                    .entries
                    .entry(head.to_string())
                    .or_insert_with(|| ConfigValue::Table(ConfigTree::new()));
                if !matches!(entry, ConfigValue::Table(_)) {
                    *entry = ConfigValue::Table(ConfigTree::new());
                }
                if let ConfigValue::Table(table) = entry {
                    table.set(rest, value);
                }
            }
        }
    }

    /// Appends `item` to the list at `path`, creating the list when absent.
    pub fn push(&mut self, path: &str, item: &str) {
        let mut items = match self.get(path) {
            Some(ConfigValue::List(items)) => items.clone(),
            Some(ConfigValue::Str(single)) if !single.is_empty() => vec![single.clone()],
            _ => Vec::new(),
        };
        items.push(item.to_string());
        self.set(path, items);
    }

    /// Deep-merges `other` into `self`; tables merge key by key, every other
    /// value is replaced.
    pub fn merge(&mut self, other: ConfigTree) {
        for (key, value) in other.entries {
            if let ConfigValue::Table(theirs) = value {
                if let Some(ConfigValue::Table(mine)) = self.entries.get_mut(&key) {
                    mine.merge(theirs);
                    continue;
                }
                self.entries.insert(key, ConfigValue::Table(theirs));
            } else {
                self.entries.insert(key, value);
            }
        }
    }

    /// Applies a `KEY=VALUE` override from the command line. The new value
    /// takes the shape of the value it replaces: lists split on commas and
    /// flags parse as booleans.
    pub fn apply_property(&mut self, assignment: &str) -> Result<(), ConfigError> {
        let (key, raw) = assignment
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidProperty(assignment.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::InvalidProperty(assignment.to_string()));
        }
        let value = match self.get(key) {
            Some(ConfigValue::List(_)) => ConfigValue::List(
                raw.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(ToOwned::to_owned)
                    .collect(),
            ),
            Some(ConfigValue::Bool(_)) => ConfigValue::Bool(parse_flag(raw)),
            _ => ConfigValue::Str(raw.to_string()),
        };
        self.set(key, value);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
