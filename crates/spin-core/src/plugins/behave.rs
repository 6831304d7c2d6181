use std::path::PathBuf;

use anyhow::Result;
use spin_domain::{ConfigTree, ConfigValue};

use crate::context::CommandContext;
use crate::outcome::ExecutionOutcome;

use super::coverage::with_coverage;
use super::pytest::with_instance;
use super::{requires_python, Plugin};

pub struct BehavePlugin;

impl Plugin for BehavePlugin {
    fn name(&self) -> &'static str {
        "behave"
    }

    fn defaults(&self) -> ConfigTree {
        ConfigTree::new()
            .with("requires", requires_python(&["behave", "coverage"]))
            .with("exe", "python")
            // flaky scenarios stay excluded unless asked for
            .with("flaky", false)
            .with("coverage", false)
            .with("cov_report", "python-at-coverage.xml")
            .with("cov_config", "setup.cfg")
            .with("opts", ConfigValue::list(&["--format=pretty", "--no-source"]))
            .with("tests", ConfigValue::list(&["tests/accepttests"]))
    }

    fn configure(&self, ctx: &mut CommandContext) -> Result<()> {
        let tag = if ctx.platform().windows {
            "--tags=~linux"
        } else {
            "--tags=~windows"
        };
        ctx.config.push("behave.opts", tag);
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct BehaveRequest {
    pub instance: Option<PathBuf>,
    pub coverage: bool,
    pub args: Vec<String>,
}

/// `spin behave`.
pub fn run_behave(ctx: &mut CommandContext, request: &BehaveRequest) -> Result<ExecutionOutcome> {
    let exe = ctx.config.string("behave.exe")?;
    let mut args = crate::args!["-m", "behave"];
    args.extend(ctx.config.list("behave.opts")?);
    if !ctx.config.flag("behave.flaky") {
        args.push("--tags=~flaky".to_string());
    }
    args.extend(request.args.iter().cloned());
    args.extend(ctx.config.list("behave.tests")?);

    let run = |ctx: &mut CommandContext| -> Result<ExecutionOutcome> {
        let code = ctx.sh_status(&exe, &args)?;
        Ok(ExecutionOutcome::streamed("behave", code))
    };
    with_instance(ctx, request.instance.as_ref(), |ctx| {
        if request.coverage || ctx.config.flag("behave.coverage") {
            let cov_config = ctx.config.string("behave.cov_config")?;
            let cov_report = ctx.config.string("behave.cov_report")?;
            with_coverage(ctx, &cov_config, &cov_report, run)
        } else {
            run(ctx)
        }
    })
}
