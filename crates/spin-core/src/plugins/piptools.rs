use anyhow::Result;
use serde_json::json;
use spin_domain::{ConfigTree, ConfigValue};

use crate::context::CommandContext;
use crate::outcome::ExecutionOutcome;
use crate::provision::PiptoolsProvisioner;

use super::{requires_python, Plugin};

/// Swaps the python plugin's direct pip installs for pip-tools lock files.
pub struct PiptoolsPlugin;

impl Plugin for PiptoolsPlugin {
    fn name(&self) -> &'static str {
        "piptools"
    }

    fn defaults(&self) -> ConfigTree {
        let warnings = "ignore:setuptools";
        ConfigTree::new()
            .with("requires", requires_python(&["setuptools", "pip-tools"]))
            .with("hashes", false)
            .with("requirements", "requirements-{platform.kind}.txt")
            .with(
                "requirements_sources",
                ConfigValue::list(&["setup.py", "setup.cfg", "pyproject.toml"]),
            )
            .with("spinreqs", "spin-reqs-{platform.kind}.txt")
            .with("spinreqs_in", "{piptools.spinreqs}.in")
            .with("extras", ConfigValue::List(Vec::new()))
            .with(
                "editable_options",
                ConfigValue::list(&["--no-deps", "--no-build-isolation"]),
            )
            .with("pip_compile.cmd", "compile")
            .with(
                "pip_compile.options_hash",
                ConfigValue::list(&["--generate-hashes", "--reuse-hashes"]),
            )
            .with(
                "pip_compile.options",
                ConfigValue::list(&[
                    "--allow-unsafe",
                    "--header",
                    "--annotate",
                    "--no-emit-options",
                    "--resolver=backtracking",
                ]),
            )
            .with("pip_compile.env.CUSTOM_COMPILE_COMMAND", "spin --provision")
            .with("pip_compile.env.PYTHONWARNINGS", warnings)
            .with("pip_sync.cmd", "sync")
            .with("pip_sync.options", ConfigValue::List(Vec::new()))
            .with("pip_sync.env.PYTHONWARNINGS", warnings)
            .with("prerequisites", ConfigValue::list(&["pip-tools"]))
    }

    fn configure(&self, ctx: &mut CommandContext) -> Result<()> {
        let hashes = ctx.config.flag("piptools.hashes");
        ctx.set_provisioner(Box::new(PiptoolsProvisioner::new(hashes)));
        Ok(())
    }
}

/// `spin python:upgrade [packages]`: recompiles both lock files, upgrading
/// the named packages or, without names, everything. Run `--provision`
/// afterwards to install the result.
pub fn python_upgrade(ctx: &mut CommandContext, packages: &[String]) -> Result<ExecutionOutcome> {
    ctx.with_provisioner(|provisioner, ctx| provisioner.upgrade(ctx, packages))?;
    let message = if packages.is_empty() {
        "upgraded all locked packages".to_string()
    } else {
        format!("upgraded {}", packages.join(", "))
    };
    Ok(ExecutionOutcome::success(
        message,
        json!({ "packages": packages, "hint": "run spin --provision to install the upgrades" }),
    ))
}

/// `spin python:wheelhouse`: downloads the locked versions into the
/// project's wheelhouse so later provisioning can run offline.
pub fn python_wheelhouse(ctx: &mut CommandContext) -> Result<ExecutionOutcome> {
    ctx.with_provisioner(|provisioner, ctx| provisioner.wheelhouse(ctx))?;
    let wheelhouse = ctx.path("python.wheelhouse")?;
    Ok(ExecutionOutcome::success(
        "wheelhouse updated",
        json!({ "wheelhouse": wheelhouse.display().to_string() }),
    ))
}
