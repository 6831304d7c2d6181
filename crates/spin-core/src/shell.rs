use anyhow::Result;
use tracing::{debug, info};

use crate::context::CommandContext;
use crate::error::CommandFailed;
use crate::process::{EnvPairs, RunOutput};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Capture,
    Passthrough,
}

impl CommandContext {
    /// Runs a command attached to the terminal; a non-zero exit is fatal.
    pub fn sh(&self, program: &str, args: &[String]) -> Result<()> {
        self.sh_env(program, args, &[])
    }

    /// Like [`CommandContext::sh`] with extra variables for this command
    /// only.
    pub fn sh_env(&self, program: &str, args: &[String], extra: &EnvPairs) -> Result<()> {
        let output = self.spawn(Mode::Passthrough, program, args, extra)?;
        ensure_success(program, args, output).map(|_| ())
    }

    /// Runs a command attached to the terminal and hands back its exit code.
    pub fn sh_status(&self, program: &str, args: &[String]) -> Result<i32> {
        Ok(self.spawn(Mode::Passthrough, program, args, &[])?.code)
    }

    /// Best-effort command: failures are logged and otherwise ignored.
    pub fn sh_may_fail(&self, program: &str, args: &[String]) {
        match self.spawn(Mode::Passthrough, program, args, &[]) {
            Ok(output) if output.success() => {}
            Ok(output) => debug!(
                command = %command_line(program, args),
                code = output.code,
                "ignoring failure"
            ),
            Err(err) => debug!(command = %command_line(program, args), %err, "ignoring failure"),
        }
    }

    /// Runs a command quietly and returns whatever it produced.
    pub fn capture(&self, program: &str, args: &[String]) -> Result<RunOutput> {
        self.spawn(Mode::Capture, program, args, &[])
    }

    /// Runs a command quietly and returns its trimmed stdout; a non-zero
    /// exit is fatal and carries the captured output.
    pub fn backtick(&self, program: &str, args: &[String]) -> Result<String> {
        let output = self.spawn(Mode::Capture, program, args, &[])?;
        let output = ensure_success(program, args, output)?;
        Ok(output.stdout.trim().to_string())
    }

    fn spawn(
        &self,
        mode: Mode,
        program: &str,
        args: &[String],
        extra: &EnvPairs,
    ) -> Result<RunOutput> {
        let mut env = self.env.child_env();
        env.extend(extra.iter().cloned());
        let cwd = self.project_root()?;
        let line = command_line(program, args);
        match mode {
            Mode::Passthrough => {
                info!("{line}");
                self.runner().passthrough(program, args, &env, &cwd)
            }
            Mode::Capture => {
                debug!(command = %line, "capture");
                self.runner().capture(program, args, &env, &cwd)
            }
        }
    }
}

fn ensure_success(program: &str, args: &[String], output: RunOutput) -> Result<RunOutput> {
    if output.success() {
        return Ok(output);
    }
    Err(CommandFailed {
        command: command_line(program, args),
        code: output.code,
        output: output.combined(),
    }
    .into())
}

pub(crate) fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(|part| {
            if part.is_empty() || part.contains(char::is_whitespace) {
                format!("'{part}'")
            } else {
                part.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Builds an argument vector from string-ish parts.
#[macro_export]
macro_rules! args {
    ($($part:expr),* $(,)?) => {
        vec![$(::std::string::ToString::to_string(&$part)),*]
    };
}
