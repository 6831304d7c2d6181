//! One `spin` invocation: read the spinfile, load the plugins, layer the
//! configuration, run the lifecycle hooks and finally the task.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use spin_domain::{load_spinfile, ConfigTree, Platform};
use tracing::debug;

use crate::context::{CommandContext, GlobalOptions};
use crate::effects::{SharedEffects, SystemEffects};
use crate::error::{outcome_from_error, UserError};
use crate::outcome::ExecutionOutcome;
use crate::plugins::{
    env_command, python_upgrade, python_wheelhouse, run_behave, run_devpi, run_playwright,
    run_pytest, run_python, run_radon, system_provision, upload, wheel, BehaveRequest,
    PlaywrightRequest, PluginRegistry, PytestRequest,
};

pub const SPINFILE: &str = "spinfile.toml";

/// The `spin.*` and `platform.*` options every plugin can refer to.
pub fn builtin_config(root: &Path, data: &Path) -> ConfigTree {
    let platform = Platform::current();
    let name = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    ConfigTree::new()
        .with("spin.project_root", root.display().to_string())
        .with("spin.project_name", name)
        .with("spin.spin_dir", "{spin.project_root}/.spin")
        .with("spin.data", data.display().to_string())
        .with("spin.cache", "{spin.data}/cache")
        .with("platform.exe", platform.exe)
        .with("platform.kind", platform.kind)
}

/// `~/.spin`, shared by all projects of the user.
pub fn default_data_dir() -> Result<PathBuf> {
    dirs_next::home_dir()
        .map(|home| home.join(".spin"))
        .context("cannot determine the home directory for spin's data")
}

#[derive(Clone, Debug)]
pub enum TaskRequest {
    Python { args: Vec<String> },
    Wheel,
    Env,
    Upgrade { packages: Vec<String> },
    Wheelhouse,
    Pytest(PytestRequest),
    Behave(BehaveRequest),
    Playwright(PlaywrightRequest),
    Radon { all: bool, files: Vec<String> },
    Devpi { args: Vec<String> },
    DevpiUpload,
    SystemProvision { distro: String, version: Option<String> },
    Provision,
    Cleanup,
}

impl TaskRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Python { .. } => "python",
            Self::Wheel => "python:wheel",
            Self::Env => "env",
            Self::Upgrade { .. } => "python:upgrade",
            Self::Wheelhouse => "python:wheelhouse",
            Self::Pytest(_) => "pytest",
            Self::Behave(_) => "behave",
            Self::Playwright(_) => "playwright",
            Self::Radon { .. } => "radon",
            Self::Devpi { .. } => "devpi",
            Self::DevpiUpload => "devpi:upload",
            Self::SystemProvision { .. } => "system-provision",
            Self::Provision => "provision",
            Self::Cleanup => "cleanup",
        }
    }

    /// Plugin loaded on demand for the task. The piptools tasks are left
    /// out: loading piptools changes how the environment is provisioned.
    fn plugin(&self) -> Option<&'static str> {
        match self {
            Self::Pytest(_) => Some("pytest"),
            Self::Behave(_) => Some("behave"),
            Self::Playwright(_) => Some("playwright"),
            Self::Radon { .. } => Some("radon"),
            Self::Devpi { .. } | Self::DevpiUpload => Some("devpi"),
            _ => None,
        }
    }

    fn needs_init(&self) -> bool {
        !matches!(self, Self::Provision | Self::Cleanup)
    }
}

#[derive(Clone, Debug)]
pub struct Invocation {
    /// Project directory (`-C`).
    pub directory: PathBuf,
    /// Explicit spinfile (`-f`); its directory becomes the project root.
    pub spinfile: Option<PathBuf>,
    /// `KEY=VALUE` overrides (`-p`), applied last.
    pub properties: Vec<String>,
    /// Overrides `spin.data`; `~/.spin` otherwise.
    pub data_dir: Option<PathBuf>,
    pub task: TaskRequest,
}

impl Invocation {
    pub fn new(directory: impl Into<PathBuf>, task: TaskRequest) -> Self {
        Self {
            directory: directory.into(),
            spinfile: None,
            properties: Vec::new(),
            data_dir: None,
            task,
        }
    }
}

pub fn execute(global: &GlobalOptions, invocation: &Invocation) -> ExecutionOutcome {
    execute_with_effects(global, invocation, Arc::new(SystemEffects::new()))
}

pub fn execute_with_effects(
    global: &GlobalOptions,
    invocation: &Invocation,
    effects: SharedEffects,
) -> ExecutionOutcome {
    match run(global, invocation, effects) {
        Ok(outcome) => outcome,
        Err(err) => {
            debug!(task = invocation.task.name(), "{err:#}");
            outcome_from_error(err)
        }
    }
}

fn run(
    global: &GlobalOptions,
    invocation: &Invocation,
    effects: SharedEffects,
) -> Result<ExecutionOutcome> {
    // needs no project at all
    if let TaskRequest::SystemProvision { distro, version } = &invocation.task {
        return system_provision(distro, version.as_deref());
    }

    let mut ctx = prepare(global, invocation, effects)?;
    let registry = ctx.registry();

    for plugin in registry.iter() {
        debug!(plugin = plugin.name(), "configure");
        plugin.configure(&mut ctx)?;
    }
    if ctx.global.cleanup {
        for plugin in registry.iter().rev() {
            debug!(plugin = plugin.name(), "cleanup");
            plugin.cleanup(&mut ctx)?;
        }
    }
    if ctx.global.provision {
        for plugin in registry.iter() {
            debug!(plugin = plugin.name(), "provision");
            plugin.provision(&mut ctx)?;
        }
        for plugin in registry.iter() {
            debug!(plugin = plugin.name(), "finalize_provision");
            plugin.finalize_provision(&mut ctx)?;
        }
    }
    if invocation.task.needs_init() {
        for plugin in registry.iter() {
            debug!(plugin = plugin.name(), "init");
            plugin.init(&mut ctx)?;
        }
    }
    run_task(&mut ctx, &invocation.task)
}

/// Builds the context: built-in options, plugin defaults, the spinfile and
/// the command line properties, in increasing precedence.
pub fn prepare(
    global: &GlobalOptions,
    invocation: &Invocation,
    effects: SharedEffects,
) -> Result<CommandContext> {
    let (root, spinfile) = locate_project(invocation)?;
    let layer = match &spinfile {
        Some(path) => load_spinfile(path)?,
        None => {
            debug!(root = %root.display(), "no {SPINFILE}, using defaults");
            ConfigTree::new()
        }
    };

    let mut names = layer.list("plugins")?;
    if let Some(plugin) = invocation.task.plugin() {
        if !names.iter().any(|name| name == plugin) {
            names.push(plugin.to_string());
        }
    }
    let registry = PluginRegistry::load(&names)?;
    debug!(plugins = ?registry.names(), "plugins loaded");

    let data = match &invocation.data_dir {
        Some(dir) => dir.clone(),
        None => default_data_dir()?,
    };
    let mut config = builtin_config(&root, &data);
    config.merge(registry.defaults());
    config.merge(layer);
    for property in &invocation.properties {
        config.apply_property(property)?;
    }

    let mut global = global.clone();
    match invocation.task {
        TaskRequest::Provision => global.provision = true,
        TaskRequest::Cleanup => global.cleanup = true,
        _ => {}
    }
    Ok(CommandContext::new(global, config, Arc::new(registry), effects))
}

fn locate_project(invocation: &Invocation) -> Result<(PathBuf, Option<PathBuf>)> {
    let directory = fs::canonicalize(&invocation.directory).map_err(|err| {
        UserError::new(
            format!("cannot enter {}: {err}", invocation.directory.display()),
            json!({ "directory": invocation.directory.display().to_string() }),
        )
    })?;
    let Some(explicit) = &invocation.spinfile else {
        let default = directory.join(SPINFILE);
        return Ok((directory, default.is_file().then_some(default)));
    };
    let path = directory.join(explicit);
    if !path.is_file() {
        return Err(UserError::new(
            format!("spinfile {} not found", path.display()),
            json!({ "spinfile": path.display().to_string() }),
        )
        .into());
    }
    let root = path
        .parent()
        .map_or_else(|| directory.clone(), Path::to_path_buf);
    Ok((root, Some(path)))
}

fn run_task(ctx: &mut CommandContext, task: &TaskRequest) -> Result<ExecutionOutcome> {
    debug!(task = task.name(), "running");
    match task {
        TaskRequest::Python { args } => run_python(ctx, args),
        TaskRequest::Wheel => wheel(ctx),
        TaskRequest::Env => env_command(ctx),
        TaskRequest::Upgrade { packages } => python_upgrade(ctx, packages),
        TaskRequest::Wheelhouse => python_wheelhouse(ctx),
        TaskRequest::Pytest(request) => run_pytest(ctx, request),
        TaskRequest::Behave(request) => run_behave(ctx, request),
        TaskRequest::Playwright(request) => run_playwright(ctx, request),
        TaskRequest::Radon { all, files } => run_radon(ctx, *all, files),
        TaskRequest::Devpi { args } => run_devpi(ctx, args),
        TaskRequest::DevpiUpload => upload(ctx),
        TaskRequest::SystemProvision { distro, version } => {
            system_provision(distro, version.as_deref())
        }
        TaskRequest::Provision => Ok(ExecutionOutcome::success(
            "environment provisioned",
            json!({
                "venv": ctx.path("python.venv")?.display().to_string(),
                "provisioner": ctx.provisioner_name().unwrap_or("pip"),
            }),
        )),
        TaskRequest::Cleanup => Ok(ExecutionOutcome::success(
            "environment removed",
            json!({ "venv": ctx.path("python.venv")?.display().to_string() }),
        )),
    }
}
