use std::env;

use super::{parse_flag, ConfigError, ConfigTree, ConfigValue};

impl ConfigTree {
    /// Expands `{dotted.path}` references against this tree. Single-segment
    /// references that are not options fall back to the process environment.
    pub fn interpolate(&self, text: &str) -> Result<String, ConfigError> {
        self.interpolate_with(text, &|name| env::var(name).ok())
    }

    /// Like [`ConfigTree::interpolate`] but with a caller-provided lookup for
    /// environment variables.
    pub fn interpolate_with(
        &self,
        text: &str,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<String, ConfigError> {
        let mut stack = Vec::new();
        self.expand(text, env, &mut stack)
    }

    /// Interpolated string option; absent and null values are errors.
    pub fn string(&self, path: &str) -> Result<String, ConfigError> {
        self.opt_string(path)?
            .ok_or_else(|| ConfigError::Missing(path.to_string()))
    }

    /// Interpolated string option; absent, null and empty values are `None`.
    pub fn opt_string(&self, path: &str) -> Result<Option<String>, ConfigError> {
        match self.get(path) {
            None | Some(ConfigValue::Null) => Ok(None),
            Some(ConfigValue::Str(raw)) => {
                let value = self.interpolate(raw)?;
                Ok((!value.is_empty()).then_some(value))
            }
            Some(ConfigValue::Bool(flag)) => Ok(Some(flag.to_string())),
            Some(_) => Err(ConfigError::WrongType {
                path: path.to_string(),
                expected: "a string",
            }),
        }
    }

    /// Interpolated list option; a plain string counts as a one-item list.
    pub fn list(&self, path: &str) -> Result<Vec<String>, ConfigError> {
        match self.get(path) {
            None | Some(ConfigValue::Null) => Ok(Vec::new()),
            Some(ConfigValue::Str(raw)) => {
                let value = self.interpolate(raw)?;
                Ok(if value.is_empty() { Vec::new() } else { vec![value] })
            }
            Some(ConfigValue::List(items)) => items
                .iter()
                .map(|item| self.interpolate(item))
                .collect(),
            Some(_) => Err(ConfigError::WrongType {
                path: path.to_string(),
                expected: "a list",
            }),
        }
    }

    pub fn flag(&self, path: &str) -> bool {
        match self.get(path) {
            Some(ConfigValue::Bool(flag)) => *flag,
            Some(ConfigValue::Str(raw)) => parse_flag(raw),
            _ => false,
        }
    }

    fn expand(
        &self,
        text: &str,
        env: &dyn Fn(&str) -> Option<String>,
        stack: &mut Vec<String>,
    ) -> Result<String, ConfigError> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(pos) = rest.find(['{', '}']) {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if tail.starts_with("{{") || tail.starts_with("}}") {
                out.push_str(&tail[..1]);
                rest = &tail[2..];
                continue;
            }
            if tail.starts_with('}') {
                out.push('}');
                rest = &tail[1..];
                continue;
            }
            let Some(end) = tail.find('}') else {
                return Err(ConfigError::Unbalanced(text.to_string()));
            };
            let reference = &tail[1..end];
            if is_reference(reference) {
                out.push_str(&self.resolve(reference, text, env, stack)?);
                rest = &tail[end + 1..];
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        Ok(out)
    }

    fn resolve(
        &self,
        reference: &str,
        text: &str,
        env: &dyn Fn(&str) -> Option<String>,
        stack: &mut Vec<String>,
    ) -> Result<String, ConfigError> {
        if stack.iter().any(|seen| seen == reference) {
            return Err(ConfigError::Cycle(reference.to_string()));
        }
        let Some(value) = self.get(reference) else {
            if reference.contains('.') {
                return Err(ConfigError::UnknownReference {
                    reference: reference.to_string(),
                    value: text.to_string(),
                });
            }
            return Ok(env(reference).unwrap_or_default());
        };
        stack.push(reference.to_string());
        let expanded = match value {
            ConfigValue::Null => Ok(String::new()),
            ConfigValue::Bool(flag) => Ok(flag.to_string()),
            ConfigValue::Str(raw) => self.expand(raw, env, stack),
            ConfigValue::List(items) => items
                .iter()
                .map(|item| self.expand(item, env, stack))
                .collect::<Result<Vec<_>, _>>()
                .map(|items| items.join(" ")),
            ConfigValue::Table(_) => Err(ConfigError::WrongType {
                path: reference.to_string(),
                expected: "a scalar to be interpolated",
            }),
        };
        stack.pop();
        expanded
    }
}

fn is_reference(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-'))
}
