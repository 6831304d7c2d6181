use std::path::PathBuf;

use anyhow::Result;
use serde_json::json;
use spin_domain::{ConfigTree, ConfigValue};

use crate::context::CommandContext;
use crate::error::UserError;
use crate::outcome::ExecutionOutcome;

use super::{requires_python, Plugin};

pub struct PytestPlugin;

impl Plugin for PytestPlugin {
    fn name(&self) -> &'static str {
        "pytest"
    }

    fn defaults(&self) -> ConfigTree {
        ConfigTree::new()
            .with("requires", requires_python(&["pytest", "pytest-cov", "psutil"]))
            .with("coverage", false)
            .with("opts", ConfigValue::List(Vec::new()))
            .with(
                "coverage_opts",
                ConfigValue::list(&[
                    "--cov-reset",
                    "--cov",
                    "--cov-report=term",
                    "--cov-report=html",
                    "--cov-report=xml",
                ]),
            )
            .with("tests", ConfigValue::list(&["cs", "tests"]))
    }
}

#[derive(Clone, Debug, Default)]
pub struct PytestRequest {
    pub instance: Option<PathBuf>,
    pub coverage: bool,
    pub args: Vec<String>,
}

/// `spin pytest`.
pub fn run_pytest(ctx: &mut CommandContext, request: &PytestRequest) -> Result<ExecutionOutcome> {
    let mut opts = ctx.config.list("pytest.opts")?;
    if request.coverage || ctx.config.flag("pytest.coverage") {
        opts.extend(ctx.config.list("pytest.coverage_opts")?);
    }
    opts.extend(request.args.iter().cloned());
    opts.extend(ctx.config.list("pytest.tests")?);
    with_instance(ctx, request.instance.as_ref(), |ctx| {
        let code = ctx.sh_status("pytest", &opts)?;
        Ok(ExecutionOutcome::streamed("pytest", code))
    })
}

/// Points `CADDOK_BASE` at `instance` while `action` runs.
pub(super) fn with_instance<T>(
    ctx: &mut CommandContext,
    instance: Option<&PathBuf>,
    action: impl FnOnce(&mut CommandContext) -> Result<T>,
) -> Result<T> {
    let Some(instance) = instance else {
        return action(ctx);
    };
    let instance = ctx.absolute(instance)?;
    if !instance.is_dir() {
        return Err(UserError::new(
            format!("cannot find the instance '{}'", instance.display()),
            json!({ "instance": instance.display().to_string() }),
        )
        .into());
    }
    ctx.env
        .export("CADDOK_BASE", Some(instance.display().to_string()));
    let result = action(ctx);
    ctx.env.export("CADDOK_BASE", None);
    result
}
