use std::{
    ffi::OsString,
    io::Read,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    thread,
};

use anyhow::{Context, Result};

const DEFAULT_MAX_CAPTURE_BYTES: usize = 1024 * 1024;

fn max_capture_bytes() -> usize {
    std::env::var("SPIN_MAX_CAPTURE_BYTES")
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_CAPTURE_BYTES)
}

/// Environment overrides for a child process; `None` removes the variable.
pub type EnvPairs = [(String, Option<String>)];

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// stdout followed by stderr, for diagnostics.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        text
    }
}

/// Execute a program and capture stdout/stderr.
///
/// # Errors
///
/// Returns an error when the program cannot be spawned or the I/O streams cannot
/// be read entirely.
pub fn run_command(
    program: &str,
    args: &[String],
    envs: &EnvPairs,
    cwd: &Path,
) -> Result<RunOutput> {
    let mut command = configured_command(program, args, envs, cwd);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to start {program}"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("stdout missing for {program}"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("stderr missing for {program}"))?;
    let limit = max_capture_bytes();
    let stdout_handle = thread::spawn(move || read_to_string_limited(stdout, limit));
    let stderr_handle = thread::spawn(move || read_to_string_limited(stderr, limit));

    let status = child
        .wait()
        .with_context(|| format!("failed to wait for {program}"))?;
    let code = status.code().unwrap_or(-1);
    let (mut stdout, stdout_truncated) = stdout_handle
        .join()
        .map_err(|_| anyhow::anyhow!("stdout thread panicked"))??;
    let (mut stderr, stderr_truncated) = stderr_handle
        .join()
        .map_err(|_| anyhow::anyhow!("stderr thread panicked"))??;
    if stdout_truncated {
        stdout.push_str("\n[...truncated...]\n");
    }
    if stderr_truncated {
        stderr.push_str("\n[...truncated...]\n");
    }
    Ok(RunOutput {
        code,
        stdout,
        stderr,
    })
}

/// Execute a program with inherited stdio, so the tool talks to the user
/// directly.
///
/// # Errors
///
/// Returns an error when the program cannot be spawned.
pub fn run_command_passthrough(
    program: &str,
    args: &[String],
    envs: &EnvPairs,
    cwd: &Path,
) -> Result<RunOutput> {
    let mut command = configured_command(program, args, envs, cwd);
    command.stdin(Stdio::inherit());
    command.stdout(Stdio::inherit());
    command.stderr(Stdio::inherit());

    let status = command
        .status()
        .with_context(|| format!("failed to start {program}"))?;
    let code = status.code().unwrap_or(-1);
    Ok(RunOutput {
        code,
        stdout: String::new(),
        stderr: String::new(),
    })
}

fn configured_command(program: &str, args: &[String], envs: &EnvPairs, cwd: &Path) -> Command {
    let mut command = Command::new(resolve_program(program, envs, cwd));
    command.args(args);
    for (key, value) in envs {
        match value {
            Some(value) => command.env(key, value),
            None => command.env_remove(key),
        };
    }
    command.current_dir(cwd);
    command
}

/// Bare program names are looked up on the child's PATH, which may point
/// into a virtual environment the parent never activated.
fn resolve_program(program: &str, envs: &EnvPairs, cwd: &Path) -> PathBuf {
    let bare = Path::new(program).components().count() == 1;
    let path_override = envs
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("PATH"))
        .and_then(|(_, value)| value.clone());
    match (bare, path_override) {
        (true, Some(search)) => which::which_in(program, Some(OsString::from(search)), cwd)
            .unwrap_or_else(|_| PathBuf::from(program)),
        _ => PathBuf::from(program),
    }
}

fn read_to_string_limited(mut reader: impl Read, limit: usize) -> Result<(String, bool)> {
    let mut buffer = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        append_limited(&mut buffer, &chunk[..read], limit, &mut truncated);
    }
    Ok((String::from_utf8_lossy(&buffer).to_string(), truncated))
}

// Keeps the tail of the stream; tool diagnostics usually end up there.
fn append_limited(buffer: &mut Vec<u8>, chunk: &[u8], limit: usize, truncated: &mut bool) {
    if limit == 0 {
        return;
    }
    if buffer.len().saturating_add(chunk.len()) <= limit {
        buffer.extend_from_slice(chunk);
        return;
    }
    *truncated = true;
    let old_len = buffer.len();
    let excess = old_len.saturating_add(chunk.len()).saturating_sub(limit);
    if excess >= old_len {
        buffer.clear();
        let drop_from_chunk = excess.saturating_sub(old_len).min(chunk.len());
        buffer.extend_from_slice(&chunk[drop_from_chunk..]);
    } else {
        buffer.drain(0..excess);
        buffer.extend_from_slice(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[cfg(unix)]
    #[test]
    fn run_command_captures_output_and_status_unix() -> Result<()> {
        let output = run_command(
            "/bin/sh",
            &[
                "-c".to_string(),
                "printf out && printf err >&2; exit 7".to_string(),
            ],
            &[],
            Path::new("."),
        )?;
        assert_eq!(output.code, 7);
        assert_eq!(output.stdout, "out");
        assert_eq!(output.stderr, "err");
        assert_eq!(output.combined(), "out\nerr");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn run_command_applies_and_removes_env_unix() -> Result<()> {
        let script = r#"if [ -z "${SPIN_GONE+x}" ]; then echo "$SPIN_SET missing"; else echo present; fi"#;
        let output = run_command(
            "/bin/sh",
            &["-c".to_string(), script.to_string()],
            &[
                ("SPIN_SET".into(), Some("value".into())),
                ("SPIN_GONE".into(), None),
            ],
            Path::new("."),
        )?;
        assert_eq!(output.stdout.trim(), "value missing");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn bare_programs_resolve_on_overridden_path_unix() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir()?;
        let tool = temp.path().join("spin-fake-tool");
        std::fs::write(&tool, "#!/bin/sh\necho from-venv\n")?;
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755))?;
        let path = format!("{}:/usr/bin:/bin", temp.path().display());
        let output = run_command(
            "spin-fake-tool",
            &[],
            &[("PATH".into(), Some(path))],
            Path::new("."),
        )?;
        assert_eq!(output.stdout.trim(), "from-venv");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn run_command_truncates_large_output_unix() -> Result<()> {
        let bytes = DEFAULT_MAX_CAPTURE_BYTES + 1024;
        let output = run_command(
            "/bin/sh",
            &[
                "-c".to_string(),
                format!("head -c {bytes} /dev/zero | tr '\\\\0' a"),
            ],
            &[],
            Path::new("."),
        )?;
        assert!(output.stdout.contains("[...truncated...]"));
        assert!(output.stdout.len() <= DEFAULT_MAX_CAPTURE_BYTES + 64);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn run_command_passthrough_returns_status_unix() -> Result<()> {
        let output = run_command_passthrough(
            "/bin/sh",
            &["-c".to_string(), "exit 3".to_string()],
            &[],
            Path::new("."),
        )?;
        assert_eq!(output.code, 3);
        assert!(output.stdout.is_empty());
        Ok(())
    }

    #[cfg(windows)]
    #[test]
    fn run_command_captures_output_and_status_windows() -> Result<()> {
        let output = run_command(
            "cmd",
            &[
                "/C".to_string(),
                "@echo off & echo out & echo err 1>&2 & exit /B 7".to_string(),
            ],
            &[],
            Path::new("."),
        )?;
        assert_eq!(output.code, 7);
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        Ok(())
    }
}
