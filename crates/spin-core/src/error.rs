use serde_json::{json, Value};

use crate::outcome::ExecutionOutcome;

/// A problem the user can fix: missing options, unprovisioned
/// environments, bad arguments.
#[derive(thiserror::Error, Debug)]
#[error("{message}")]
pub struct UserError {
    pub(crate) message: String,
    pub(crate) details: Value,
}

impl UserError {
    pub fn new(message: impl Into<String>, details: Value) -> Self {
        Self {
            message: message.into(),
            details,
        }
    }

    pub fn hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::new(message, json!({ "hint": hint.into() }))
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn details(&self) -> &Value {
        &self.details
    }
}

/// An external command exited non-zero where success was required.
#[derive(thiserror::Error, Debug)]
#[error("`{command}` failed with exit code {code}")]
pub struct CommandFailed {
    pub command: String,
    pub code: i32,
    pub output: String,
}

/// Installed packages have incompatible requirements.
#[derive(thiserror::Error, Debug)]
#[error("installed packages are inconsistent:\n{report}")]
pub struct ConsistencyError {
    pub report: String,
}

/// Maps an error raised anywhere below `execute` onto an outcome.
pub(crate) fn outcome_from_error(err: anyhow::Error) -> ExecutionOutcome {
    if let Some(user) = err.downcast_ref::<UserError>() {
        return ExecutionOutcome::user_error(user.message.clone(), user.details.clone());
    }
    if let Some(config) = err.downcast_ref::<spin_domain::ConfigError>() {
        return ExecutionOutcome::user_error(
            config.to_string(),
            json!({ "hint": "check spinfile.toml and -p overrides" }),
        );
    }
    if let Some(failed) = err.downcast_ref::<CommandFailed>() {
        return ExecutionOutcome::failure(
            failed.to_string(),
            json!({
                "command": failed.command,
                "code": failed.code,
                "output": failed.output,
            }),
        );
    }
    if let Some(conflict) = err.downcast_ref::<ConsistencyError>() {
        return ExecutionOutcome::failure(
            "dependency check failed after install",
            json!({ "output": conflict.report }),
        );
    }
    ExecutionOutcome::failure(format!("{err:#}"), Value::Null)
}
