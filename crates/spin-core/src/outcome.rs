use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: CommandStatus,
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

impl ExecutionOutcome {
    pub fn success(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Ok,
            message: message.into(),
            details,
        }
    }

    pub fn failure(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Failure,
            message: message.into(),
            details,
        }
    }

    pub fn user_error(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::UserError,
            message: message.into(),
            details,
        }
    }

    /// Outcome of a tool whose output already reached the terminal; its exit
    /// code becomes the task's exit code.
    pub fn streamed(tool: &str, code: i32) -> Self {
        let details = json!({ "streamed": true, "tool": tool, "code": code });
        if code == 0 {
            Self::success(format!("{tool} finished"), details)
        } else {
            Self::failure(format!("{tool} exited with code {code}"), details)
        }
    }

    /// Text meant for stdout as-is, e.g. for `eval "$(spin env)"`.
    pub fn printed(text: impl Into<String>, mut details: Value) -> Self {
        match details.as_object_mut() {
            Some(map) => {
                map.insert("passthrough".into(), Value::Bool(true));
            }
            None => details = json!({ "passthrough": true }),
        }
        Self::success(text, details)
    }

    /// Process exit code: a streamed tool's own code wins over the status.
    pub fn exit_code(&self) -> i32 {
        let fallback = match self.status {
            CommandStatus::Ok => 0,
            CommandStatus::UserError => 1,
            CommandStatus::Failure => 2,
        };
        if !self.is_streamed() {
            return fallback;
        }
        self.details
            .get("code")
            .and_then(Value::as_i64)
            .and_then(|code| i32::try_from(code).ok())
            .unwrap_or(fallback)
    }

    pub fn is_passthrough(&self) -> bool {
        flag(&self.details, "passthrough")
    }

    pub fn is_streamed(&self) -> bool {
        flag(&self.details, "streamed")
    }

    pub fn hint(&self) -> Option<&str> {
        self.details.get("hint").and_then(Value::as_str)
    }
}

fn flag(details: &Value, key: &str) -> bool {
    details.get(key).and_then(Value::as_bool).unwrap_or(false)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CommandStatus {
    Ok,
    UserError,
    Failure,
}

impl CommandStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::UserError => "user-error",
            Self::Failure => "failure",
        }
    }
}

pub fn to_json_response(task: &str, outcome: &ExecutionOutcome, code: i32) -> Value {
    json!({
        "task": task,
        "status": outcome.status.as_str(),
        "code": code,
        "message": outcome.message,
        "details": outcome.details,
    })
}
