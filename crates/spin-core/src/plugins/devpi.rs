use std::fs;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use spin_domain::{ConfigTree, ConfigValue};
use tracing::debug;

use crate::args;
use crate::context::CommandContext;
use crate::error::UserError;
use crate::outcome::ExecutionOutcome;

use super::{requires_python, Plugin};

pub struct DevpiPlugin;

impl Plugin for DevpiPlugin {
    fn name(&self) -> &'static str {
        "devpi"
    }

    fn defaults(&self) -> ConfigTree {
        ConfigTree::new()
            .with("formats", ConfigValue::list(&["bdist_wheel"]))
            .with("url", ConfigValue::Null)
            .with("user", ConfigValue::Null)
            .with("requires", requires_python(&["devpi-client", "keyring"]))
    }

    fn init(&self, ctx: &mut CommandContext) -> Result<()> {
        ctx.setenv("DEVPI_VENV", Some("{python.venv}"))?;
        ctx.setenv("DEVPI_CLIENTDIR", Some("{spin.spin_dir}/devpi"))
    }
}

/// The part of devpi-client's `current.json` that matters here.
#[derive(Debug, Default, Deserialize)]
struct ClientState {
    index: Option<String>,
}

fn client_state(ctx: &CommandContext) -> Result<ClientState> {
    let path = ctx.path("spin.spin_dir")?.join("devpi").join("current.json");
    if !path.exists() {
        return Ok(ClientState::default());
    }
    let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// `spin devpi:upload`: builds and uploads the project's wheels.
pub fn upload(ctx: &mut CommandContext) -> Result<ExecutionOutcome> {
    let Some(user) = ctx.config.opt_string("devpi.user")? else {
        return Err(UserError::hint(
            "devpi.user is required",
            "set devpi.user in spinfile.toml or pass -p devpi.user=<name>",
        )
        .into());
    };
    let url = ctx.config.opt_string("devpi.url")?;
    let current = client_state(ctx)?.index;
    debug!(?current, ?url, "devpi index");
    if current != url {
        let Some(url) = url.as_deref() else {
            return Err(UserError::hint(
                "devpi.url not provided",
                "set devpi.url to the index to upload to",
            )
            .into());
        };
        ctx.sh("devpi", &args!["use", "-t", "yes", url])?;
    }
    ctx.sh("devpi", &args!["login", user])?;
    let python = ctx.config.string("python.python")?;
    let formats = ctx.config.list("devpi.formats")?.join(",");
    ctx.sh(
        "devpi",
        &args!["upload", "-p", python, "--no-vcs", format!("--wheel={formats}")],
    )?;
    Ok(ExecutionOutcome::success(
        "uploaded",
        json!({ "user": user, "index": url, "formats": formats }),
    ))
}

/// `spin devpi [args]`: devpi-client inside the project's environment.
pub fn run_devpi(ctx: &mut CommandContext, args: &[String]) -> Result<ExecutionOutcome> {
    if let Some(url) = ctx.config.opt_string("devpi.url")? {
        ctx.sh("devpi", &args!["use", url])?;
    }
    if let Some(user) = ctx.config.opt_string("devpi.user")? {
        ctx.sh("devpi", &args!["login", user])?;
    }
    let code = ctx.sh_status("devpi", args)?;
    Ok(ExecutionOutcome::streamed("devpi", code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{PluginRegistry, PythonPlugin};
    use crate::testing::{context_with, FakeEffects};

    fn context(
        temp: &tempfile::TempDir,
        config: ConfigTree,
        fake: &std::sync::Arc<FakeEffects>,
    ) -> CommandContext {
        let registry = PluginRegistry::from_plugins(vec![
            Box::new(PythonPlugin) as Box<dyn Plugin>,
            Box::new(DevpiPlugin),
        ]);
        context_with(
            temp.path(),
            config.with("python.python", "python"),
            fake,
            registry,
        )
    }

    #[test]
    fn upload_requires_a_user() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let fake = FakeEffects::new();
        let mut ctx = context(&temp, ConfigTree::new(), &fake);
        let err = upload(&mut ctx).unwrap_err();
        assert!(err.downcast_ref::<UserError>().is_some());
        Ok(())
    }

    #[test]
    fn upload_switches_index_when_it_differs() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let state = temp.path().join(".spin").join("devpi");
        fs::create_dir_all(&state)?;
        fs::write(
            state.join("current.json"),
            r#"{"index": "https://old.example/team/dev", "login": "x"}"#,
        )?;
        let fake = FakeEffects::new();
        let config = ConfigTree::new()
            .with("devpi.user", "alice")
            .with("devpi.url", "https://devpi.example/team/dev")
            .with("devpi.formats", ConfigValue::list(&["bdist_wheel", "sdist"]));
        let mut ctx = context(&temp, config, &fake);
        upload(&mut ctx)?;
        assert_eq!(
            fake.lines(),
            [
                "devpi use -t yes https://devpi.example/team/dev",
                "devpi login alice",
                "devpi upload -p python --no-vcs --wheel=bdist_wheel,sdist",
            ]
        );
        Ok(())
    }

    #[test]
    fn missing_url_only_matters_when_the_index_differs() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let fake = FakeEffects::new();
        let config = ConfigTree::new().with("devpi.user", "alice");
        let mut ctx = context(&temp, config, &fake);
        assert!(upload(&mut ctx).is_ok());
        let state = temp.path().join(".spin").join("devpi");
        fs::create_dir_all(&state)?;
        fs::write(state.join("current.json"), r#"{"index": "https://x/y"}"#)?;
        let err = upload(&mut ctx).unwrap_err();
        assert!(err.downcast_ref::<UserError>().is_some());
        Ok(())
    }

    #[test]
    fn devpi_task_logs_in_before_passing_through() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let fake = FakeEffects::new();
        let config = ConfigTree::new().with("devpi.user", "bob");
        let mut ctx = context(&temp, config, &fake);
        DevpiPlugin.init(&mut ctx)?;
        run_devpi(&mut ctx, &args!["list"])?;
        let calls = fake.calls();
        assert_eq!(calls[0].line(), "devpi login bob");
        assert_eq!(calls[1].line(), "devpi list");
        assert!(calls[1]
            .env_value("DEVPI_CLIENTDIR")
            .is_some_and(|dir| dir.ends_with("devpi")));
        Ok(())
    }
}
