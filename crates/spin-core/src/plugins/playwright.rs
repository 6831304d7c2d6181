use std::path::PathBuf;

use anyhow::Result;
use spin_domain::{ConfigTree, ConfigValue};

use crate::context::CommandContext;
use crate::outcome::ExecutionOutcome;

use super::pytest::with_instance;
use super::{requires_python, Plugin};

pub struct PlaywrightPlugin;

impl Plugin for PlaywrightPlugin {
    fn name(&self) -> &'static str {
        "playwright"
    }

    fn requires(&self) -> &'static [&'static str] {
        &["python", "debugpy", "pytest"]
    }

    fn defaults(&self) -> ConfigTree {
        ConfigTree::new()
            .with("browsers_path", "{spin.data}/playwright_browsers")
            .with("browsers", ConfigValue::list(&["chromium"]))
            .with("coverage", false)
            .with(
                "coverage_opts",
                ConfigValue::list(&[
                    "--cov-reset",
                    "--cov",
                    "--cov-report=term",
                    "--cov-report=html",
                    "--cov-report=xml:{playwright.coverage_report}",
                ]),
            )
            .with("coverage_report", "python-playwright-coverage.xml")
            .with("opts", ConfigValue::list(&["-m", "e2e"]))
            .with("tests", ConfigValue::list(&["cs", "tests"]))
            .with("test_report", "playwright.xml")
            .with(
                "requires",
                requires_python(&["pytest-base-url", "pytest-playwright"]),
            )
    }

    fn provision(&self, ctx: &mut CommandContext) -> Result<()> {
        install_browsers(ctx)
    }
}

#[derive(Clone, Debug, Default)]
pub struct PlaywrightRequest {
    pub instance: Option<PathBuf>,
    pub coverage: bool,
    pub debug: bool,
    pub with_test_report: bool,
    pub args: Vec<String>,
}

/// `spin playwright`: the end-to-end suite through pytest.
pub fn run_playwright(
    ctx: &mut CommandContext,
    request: &PlaywrightRequest,
) -> Result<ExecutionOutcome> {
    ctx.setenv("PLAYWRIGHT_BROWSERS_PATH", Some("{playwright.browsers_path}"))?;
    ctx.setenv("PACKAGE_NAME", Some("{spin.project_name}"))?;

    let mut opts = ctx.config.list("playwright.opts")?;
    opts.extend(ctx.quiet_flag());
    if request.with_test_report {
        if let Some(report) = ctx.config.opt_string("playwright.test_report")? {
            opts.push(format!("--junitxml={report}"));
        }
    }
    if request.coverage || ctx.config.flag("playwright.coverage") {
        opts.extend(ctx.config.list("playwright.coverage_opts")?);
        ctx.setenv("PLAYWRIGHT_COVERAGE", Some("1"))?;
    }
    for browser in ctx.config.list("playwright.browsers")? {
        opts.extend(crate::args!["--browser", browser]);
    }

    let (program, mut args) = if request.debug {
        let mut args: Vec<String> = ctx
            .config
            .list("debugpy.opts")?
            .iter()
            .flat_map(|opt| opt.split_whitespace().map(ToOwned::to_owned))
            .collect();
        args.extend(crate::args!["-m", "pytest"]);
        ("debugpy", args)
    } else {
        ("pytest", Vec::new())
    };
    args.extend(opts);
    args.extend(request.args.iter().cloned());
    args.extend(ctx.config.list("playwright.tests")?);

    // browsers listed since the last provision get fetched here
    install_browsers(ctx)?;

    with_instance(ctx, request.instance.as_ref(), |ctx| {
        let code = ctx.sh_status(program, &args)?;
        Ok(ExecutionOutcome::streamed("playwright", code))
    })
}

fn install_browsers(ctx: &mut CommandContext) -> Result<()> {
    let mut args = crate::args!["install"];
    args.extend(ctx.config.list("playwright.browsers")?);
    let browsers_path = ctx.path("playwright.browsers_path")?;
    ctx.sh_env(
        "playwright",
        &args,
        &[(
            "PLAYWRIGHT_BROWSERS_PATH".to_string(),
            Some(browsers_path.display().to_string()),
        )],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{DebugpyPlugin, PluginRegistry, PytestPlugin};
    use crate::testing::{context_with, FakeEffects};

    fn registry() -> PluginRegistry {
        PluginRegistry::from_plugins(vec![
            Box::new(DebugpyPlugin) as Box<dyn Plugin>,
            Box::new(PytestPlugin),
            Box::new(PlaywrightPlugin),
        ])
    }

    #[test]
    fn debug_runs_pytest_under_debugpy() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let fake = FakeEffects::new();
        let config = ConfigTree::new()
            .with("playwright.browsers", ConfigValue::list(&["firefox", "webkit"]));
        let mut ctx = context_with(temp.path(), config, &fake, registry());
        ctx.global.quiet = true;
        let request = PlaywrightRequest {
            debug: true,
            with_test_report: true,
            coverage: true,
            ..PlaywrightRequest::default()
        };
        run_playwright(&mut ctx, &request)?;

        let calls = fake.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].line(), "playwright install firefox webkit");
        assert!(calls[0]
            .env_value("PLAYWRIGHT_BROWSERS_PATH")
            .is_some_and(|path| path.ends_with("playwright_browsers")));

        let run = &calls[1];
        assert_eq!(run.program, "debugpy");
        let line = run.line();
        assert!(line.starts_with(
            "debugpy --listen localhost:5678 --wait-for-client -m pytest -m e2e -q \
             --junitxml=playwright.xml --cov-reset"
        ));
        assert!(line.contains("--cov-report=xml:python-playwright-coverage.xml"));
        assert!(line.ends_with("--browser firefox --browser webkit cs tests"));
        assert_eq!(run.env_value("PLAYWRIGHT_COVERAGE").as_deref(), Some("1"));
        let project = temp.path().file_name().map(|name| name.to_string_lossy().into_owned());
        assert_eq!(run.env_value("PACKAGE_NAME"), project);
        Ok(())
    }

    #[test]
    fn plain_run_uses_pytest() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let fake = FakeEffects::new();
        let mut ctx = context_with(temp.path(), ConfigTree::new(), &fake, registry());
        let request = PlaywrightRequest {
            args: vec!["-k".into(), "login".into()],
            ..PlaywrightRequest::default()
        };
        run_playwright(&mut ctx, &request)?;
        assert_eq!(
            fake.lines(),
            [
                "playwright install chromium",
                "pytest -m e2e --browser chromium -k login cs tests",
            ]
        );
        Ok(())
    }

    #[test]
    fn provision_fetches_browsers() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let fake = FakeEffects::new();
        let mut ctx = context_with(temp.path(), ConfigTree::new(), &fake, registry());
        PlaywrightPlugin.provision(&mut ctx)?;
        assert_eq!(fake.lines(), ["playwright install chromium"]);
        Ok(())
    }
}
