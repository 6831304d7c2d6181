//! Provisions the requested Python version and the project's virtual
//! environment.
//!
//! On Linux and macOS the interpreter is compiled from source with pyenv's
//! `python-build` (so Python's build requirements must be installed, see
//! `spin system-provision`). On Windows pre-built binaries come from nuget.
//! `python.use` skips all of that and takes an existing interpreter, which
//! spin then installs packages into.

mod interpreter;
mod system;
mod venv;

use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use serde_json::json;
use spin_domain::{ConfigTree, ConfigValue, PythonVersion, DEFAULT_INDEX_URL};
use tracing::{debug, info, warn};

use crate::context::CommandContext;
use crate::error::UserError;
use crate::outcome::ExecutionOutcome;

use super::Plugin;

pub use system::system_provision;
pub(crate) use venv::{purelib, venv_init};

pub struct PythonPlugin;

impl Plugin for PythonPlugin {
    fn name(&self) -> &'static str {
        "python"
    }

    fn requires(&self) -> &'static [&'static str] {
        &[]
    }

    fn defaults(&self) -> ConfigTree {
        let windows = cfg!(windows);
        let pick = |win: &'static str, other: &'static str| if windows { win } else { other };
        ConfigTree::new()
            .with("version", ConfigValue::Null)
            .with("use", ConfigValue::Null)
            .with("user_pyenv", false)
            .with("pyenv.url", "https://github.com/pyenv/pyenv.git")
            .with("pyenv.path", "{spin.cache}/pyenv")
            .with("pyenv.cache", "{spin.cache}/pyenv_cache")
            .with(
                "pyenv.python_build",
                "{python.pyenv.path}/plugins/python-build/bin/python-build",
            )
            .with("pyenv.cflags", "-DOPENSSL_NO_COMP")
            .with(
                "nuget.url",
                "https://dist.nuget.org/win-x86-commandline/latest/nuget.exe",
            )
            .with("nuget.exe", "{spin.cache}/nuget.exe")
            .with("nuget.source", "https://api.nuget.org/v3/index.json")
            .with(
                "inst_dir",
                pick(
                    "{spin.cache}/python/python.{python.version}/tools",
                    "{spin.cache}/python/{python.version}",
                ),
            )
            .with(
                "interpreter",
                pick(
                    "{python.inst_dir}/python{platform.exe}",
                    "{python.inst_dir}/bin/python{platform.exe}",
                ),
            )
            .with("venv", "{spin.spin_dir}/venv")
            .with("memo", "{python.venv}/spininfo.memo")
            .with("bindir", pick("{python.venv}", "{python.venv}/bin"))
            .with("scriptdir", pick("{python.venv}/Scripts", "{python.venv}/bin"))
            .with("python", "{python.scriptdir}/python{platform.exe}")
            .with("wheelhouse", "{spin.spin_dir}/wheelhouse")
            .with("index_url", DEFAULT_INDEX_URL)
            .with("pipconf", "")
            .with("requirements", ConfigValue::List(Vec::new()))
            .with("devpackages", ConfigValue::List(Vec::new()))
            .with("current_package.install", true)
            .with("current_package.extras", ConfigValue::List(Vec::new()))
    }

    fn configure(&self, ctx: &mut CommandContext) -> Result<()> {
        let version = ctx.config.opt_string("python.version")?;
        if let Some(interpreter) = ctx.config.opt_string("python.use")? {
            if version.is_some() {
                warn!("python.version will be ignored, using '{interpreter}' instead");
            }
            ctx.set_option("python.interpreter", interpreter);
            return Ok(());
        }
        let Some(version) = version else {
            return Err(UserError::hint(
                "no Python interpreter selected",
                "set python.version in spinfile.toml or pass -p python.use=<interpreter>",
            )
            .into());
        };
        if let Err(err) = PythonVersion::parse(&version) {
            return Err(UserError::new(
                format!("invalid python.version: {err}"),
                json!({ "version": version, "hint": "use a version such as 3.11 or 3.9.18" }),
            )
            .into());
        }
        if ctx.config.flag("python.user_pyenv") {
            ctx.setenv("PYENV_VERSION", Some(&version))?;
            match ctx.backtick("pyenv", &crate::args!["which", "python", "--nosystem"]) {
                Ok(path) if !path.is_empty() => ctx.set_option("python.interpreter", path),
                Ok(_) => warn!("pyenv reported no interpreter for Python {version}"),
                Err(err) => warn!("pyenv does not provide Python {version} yet: {err:#}"),
            }
        }
        Ok(())
    }

    fn provision(&self, ctx: &mut CommandContext) -> Result<()> {
        interpreter::ensure_interpreter(ctx)?;
        venv::venv_provision(ctx)
    }

    fn finalize_provision(&self, ctx: &mut CommandContext) -> Result<()> {
        venv::finalize_provision(ctx)
    }

    fn init(&self, ctx: &mut CommandContext) -> Result<()> {
        if ctx.config.opt_string("python.use")?.is_none() {
            let interpreter = ctx.path("python.interpreter")?;
            debug!(interpreter = %interpreter.display(), "checking interpreter");
            if !interpreter.exists() {
                let version = ctx.config.string("python.version")?;
                return Err(UserError::new(
                    format!("Python {version} has not been provisioned for this project"),
                    json!({
                        "interpreter": interpreter.display().to_string(),
                        "hint": "run spin with the '--provision' flag",
                    }),
                )
                .into());
            }
        }
        venv_init(ctx)
    }

    fn cleanup(&self, ctx: &mut CommandContext) -> Result<()> {
        let venv = ctx.path("python.venv")?;
        if !venv.exists() {
            return Ok(());
        }
        info!("Removing {}", venv.display());
        if let Err(err) = fs::remove_dir_all(&venv) {
            warn!("cleanup: could not remove {}: {err}", venv.display());
        }
        Ok(())
    }
}

/// `spin python [args]`: the project's interpreter.
pub fn run_python(ctx: &mut CommandContext, args: &[String]) -> Result<ExecutionOutcome> {
    let python = ctx.config.string("python.python")?;
    let code = ctx.sh_status(&python, args)?;
    Ok(ExecutionOutcome::streamed("python", code))
}

/// `spin python:wheel`: PEP 517 build, falling back to `setup.py`.
pub fn wheel(ctx: &mut CommandContext) -> Result<ExecutionOutcome> {
    let python = ctx.config.string("python.python")?;
    info!("Building PEP 517 wheel");
    if ctx.sh_status(&python, &crate::args!["-m", "build", "-w"])? == 0 {
        return Ok(ExecutionOutcome::success("built wheel", json!({ "backend": "build" })));
    }
    info!("Building does not seem to work, using legacy setup.py style");
    let spin_dir = ctx.path("spin.spin_dir")?;
    let mut args = crate::args!["setup.py"];
    args.extend(ctx.quiet_flag());
    args.extend(crate::args![
        "build",
        "-b",
        spin_dir.join("build").display(),
        "bdist_wheel",
        "-d",
        spin_dir.join("dist").display()
    ]);
    ctx.sh(&python, &args)?;
    Ok(ExecutionOutcome::success(
        "built wheel",
        json!({ "backend": "setup.py", "dist": spin_dir.join("dist").display().to_string() }),
    ))
}

/// `spin env`: the command that activates the environment in a shell.
pub fn env_command(ctx: &CommandContext) -> Result<ExecutionOutcome> {
    let scriptdir: PathBuf = ctx.path("python.scriptdir")?;
    let (line, shell) = if ctx.platform().windows {
        (scriptdir.join("activate.ps1").display().to_string(), "powershell")
    } else {
        (
            format!(". {}", scriptdir.join("activate").display()),
            "posix",
        )
    };
    Ok(ExecutionOutcome::printed(
        line,
        json!({ "shell": shell, "scriptdir": scriptdir.display().to_string() }),
    ))
}
