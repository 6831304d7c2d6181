use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use crate::process::{run_command, run_command_passthrough, EnvPairs, RunOutput};

const USER_AGENT: &str = concat!("spin/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

pub trait CommandRunner: Send + Sync {
    /// Runs a program and captures its output.
    fn capture(
        &self,
        program: &str,
        args: &[String],
        env: &EnvPairs,
        cwd: &Path,
    ) -> Result<RunOutput>;

    /// Runs a program attached to the terminal; the returned output is empty.
    fn passthrough(
        &self,
        program: &str,
        args: &[String],
        env: &EnvPairs,
        cwd: &Path,
    ) -> Result<RunOutput>;
}

pub trait Downloader: Send + Sync {
    fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

pub trait GitClient: Send + Sync {
    /// Files with uncommitted changes, relative to `root`; `None` outside a
    /// repository.
    fn modified_files(&self, root: &Path) -> Result<Option<Vec<String>>>;
}

pub trait Effects: Send + Sync {
    fn runner(&self) -> &dyn CommandRunner;
    fn http(&self) -> &dyn Downloader;
    fn git(&self) -> &dyn GitClient;
}

pub type SharedEffects = Arc<dyn Effects>;

pub struct SystemEffects {
    runner: Arc<SystemRunner>,
    http: Arc<SystemDownloader>,
    git: Arc<SystemGit>,
}

impl SystemEffects {
    #[must_use]
    pub fn new() -> Self {
        Self {
            runner: Arc::new(SystemRunner),
            http: Arc::new(SystemDownloader),
            git: Arc::new(SystemGit),
        }
    }
}

impl Default for SystemEffects {
    fn default() -> Self {
        Self::new()
    }
}

impl Effects for SystemEffects {
    fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    fn http(&self) -> &dyn Downloader {
        self.http.as_ref()
    }

    fn git(&self) -> &dyn GitClient {
        self.git.as_ref()
    }
}

struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn capture(
        &self,
        program: &str,
        args: &[String],
        env: &EnvPairs,
        cwd: &Path,
    ) -> Result<RunOutput> {
        run_command(program, args, env, cwd)
    }

    fn passthrough(
        &self,
        program: &str,
        args: &[String],
        env: &EnvPairs,
        cwd: &Path,
    ) -> Result<RunOutput> {
        run_command_passthrough(program, args, env, cwd)
    }
}

struct SystemDownloader;

impl Downloader for SystemDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed to build http client")?;
        let response = client
            .get(url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .with_context(|| format!("failed to download {url}"))?;
        let bytes = response
            .bytes()
            .with_context(|| format!("failed to read response from {url}"))?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        // Renamed into place once complete.
        let partial = dest.with_extension("part");
        let mut file = fs::File::create(&partial)
            .with_context(|| format!("writing {}", partial.display()))?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&partial, dest)
            .with_context(|| format!("moving download to {}", dest.display()))?;
        Ok(())
    }
}

struct SystemGit;

impl GitClient for SystemGit {
    fn modified_files(&self, root: &Path) -> Result<Option<Vec<String>>> {
        // Porcelain paths are relative to the top of the repository.
        let Some(prefix) = git_stdout(root, &["rev-parse", "--show-prefix"]) else {
            return Ok(None);
        };
        let Some(status) = git_stdout(root, &["status", "--porcelain", "--untracked-files=all"])
        else {
            return Ok(None);
        };
        Ok(Some(parse_porcelain(&status, prefix.trim())))
    }
}

fn git_stdout(root: &Path, args: &[&str]) -> Option<String> {
    let output = std::process::Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .ok()?;
    if !output.status.success() {
        debug!(?args, status = %output.status, "git failed");
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Changed paths below `prefix`, made relative to it.
fn parse_porcelain(text: &str, prefix: &str) -> Vec<String> {
    text.lines()
        .filter(|line| line.len() > 3)
        .filter(|line| !line.starts_with(" D") && !line.starts_with("D "))
        .filter_map(|line| {
            let path = &line[3..];
            // Renames are reported as `old -> new`.
            let path = path
                .rsplit_once(" -> ")
                .map_or(path, |(_, new)| new)
                .trim_matches('"');
            path.strip_prefix(prefix).map(ToOwned::to_owned)
        })
        .collect()
}
