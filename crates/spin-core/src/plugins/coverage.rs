//! Subprocess coverage for tools that spawn Python processes of their own.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::args;
use crate::context::CommandContext;

use super::python::purelib;

const COVERAGE_PTH: &str = "coverage.pth";

/// Runs `action` with coverage measurement switched on for every Python
/// process it starts, then combines and reports the data.
///
/// The reports are produced and the `.pth` hook removed even when `action`
/// fails.
pub(crate) fn with_coverage<T>(
    ctx: &mut CommandContext,
    cov_config: &str,
    cov_report: &str,
    action: impl FnOnce(&mut CommandContext) -> Result<T>,
) -> Result<T> {
    ctx.sh_may_fail("coverage", &args!["erase"]);
    let mut pth = None;
    let result = start(ctx, cov_config, &mut pth).and_then(|()| action(ctx));
    finish(ctx, pth.as_deref(), cov_report);
    result
}

fn start(ctx: &mut CommandContext, cov_config: &str, pth: &mut Option<PathBuf>) -> Result<()> {
    ctx.setenv("COVERAGE_PROCESS_START", Some(cov_config))?;
    let path = purelib(ctx)?.join(COVERAGE_PTH);
    info!("Create {}", path.display());
    fs::write(&path, "import coverage; coverage.process_startup()")
        .with_context(|| format!("writing {}", path.display()))?;
    *pth = Some(path);
    Ok(())
}

fn finish(ctx: &mut CommandContext, pth: Option<&Path>, cov_report: &str) {
    if let Err(err) = ctx.setenv("COVERAGE_PROCESS_START", None) {
        warn!("{err:#}");
    }
    if let Some(pth) = pth.filter(|pth| pth.exists()) {
        if let Err(err) = fs::remove_file(pth) {
            warn!("could not remove {}: {err}", pth.display());
        }
    }
    ctx.sh_may_fail("coverage", &args!["combine"]);
    ctx.sh_may_fail("coverage", &args!["report"]);
    ctx.sh_may_fail("coverage", &args!["xml", "-o", cov_report]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, FakeEffects};
    use spin_domain::ConfigTree;

    #[test]
    fn coverage_hook_lives_only_for_the_action() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let site = temp.path().join("site-packages");
        fs::create_dir_all(&site)?;
        let fake = FakeEffects::new();
        fake.respond("sysconfig", 0, &site.display().to_string());
        fake.respond("coverage report", 2, "");
        let config = ConfigTree::new().with("python.python", "python");
        let mut ctx = context(temp.path(), config, &fake);

        let seen = with_coverage(&mut ctx, "setup.cfg", "cov.xml", |ctx| {
            assert!(site.join(COVERAGE_PTH).exists());
            Ok(ctx.env.get("COVERAGE_PROCESS_START"))
        })?;

        assert_eq!(seen.as_deref(), Some("setup.cfg"));
        assert!(!site.join(COVERAGE_PTH).exists());
        assert!(ctx.env.get("COVERAGE_PROCESS_START").is_none());
        let lines = fake.lines();
        assert_eq!(lines[0], "coverage erase");
        assert_eq!(
            &lines[2..],
            ["coverage combine", "coverage report", "coverage xml -o cov.xml"]
        );
        Ok(())
    }

    #[test]
    fn reports_run_after_a_failing_action() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let fake = FakeEffects::new();
        fake.respond("sysconfig", 0, &temp.path().display().to_string());
        let config = ConfigTree::new().with("python.python", "python");
        let mut ctx = context(temp.path(), config, &fake);

        let result: Result<()> =
            with_coverage(&mut ctx, "setup.cfg", "cov.xml", |_| anyhow::bail!("tests failed"));

        assert!(result.is_err());
        assert!(!temp.path().join(COVERAGE_PTH).exists());
        assert!(fake
            .lines()
            .last()
            .is_some_and(|line| line == "coverage xml -o cov.xml"));
        Ok(())
    }
}
