use std::fs;

use anyhow::{Context, Result};
use serde_json::json;
use spin_domain::reported_version_matches;
use tracing::{debug, info, warn};

use crate::args;
use crate::context::CommandContext;
use crate::error::UserError;

/// Makes sure `python.interpreter` exists, building or downloading the
/// requested version when it does not.
pub(super) fn ensure_interpreter(ctx: &mut CommandContext) -> Result<()> {
    let interpreter = ctx.config.string("python.interpreter")?;
    if which::which(&interpreter).is_ok() {
        debug!(%interpreter, "interpreter available");
        return Ok(());
    }
    if ctx.config.opt_string("python.use")?.is_some() {
        return Err(UserError::new(
            format!("interpreter '{interpreter}' not found"),
            json!({
                "interpreter": interpreter,
                "hint": "point python.use at an installed interpreter",
            }),
        )
        .into());
    }
    let version = ctx.config.string("python.version")?;
    if ctx.platform().windows {
        nuget_install(ctx, &version)?;
    } else {
        pyenv_install(ctx, &version)?;
    }
    check_reported_version(ctx, &version);
    Ok(())
}

fn pyenv_install(ctx: &mut CommandContext, version: &str) -> Result<()> {
    info!("Installing Python {version}");
    if ctx.config.flag("python.user_pyenv") {
        ctx.sh("pyenv", &args!["install", "--skip-existing", version])?;
        let interpreter = ctx.backtick("pyenv", &args!["which", "python", "--nosystem"])?;
        ctx.set_option("python.interpreter", interpreter);
        return Ok(());
    }

    let pyenv = ctx.path("python.pyenv.path")?;
    if pyenv.exists() {
        ctx.sh("git", &args!["-C", pyenv.display(), "pull", "-q"])?;
    } else {
        let url = ctx.config.string("python.pyenv.url")?;
        let mut clone = args!["clone"];
        clone.extend(ctx.quiet_flag());
        clone.extend(args![url, pyenv.display()]);
        ctx.sh("git", &clone)?;
    }

    let cache = ctx.path("python.pyenv.cache")?;
    fs::create_dir_all(&cache).with_context(|| format!("creating {}", cache.display()))?;
    let build_env = vec![
        (
            "PYTHON_BUILD_CACHE_PATH".to_string(),
            Some(cache.display().to_string()),
        ),
        (
            "PYTHON_CFLAGS".to_string(),
            ctx.config.opt_string("python.pyenv.cflags")?,
        ),
    ];
    let python_build = ctx.config.string("python.pyenv.python_build")?;
    let inst_dir = ctx.path("python.inst_dir")?;
    if let Err(err) = ctx.sh_env(&python_build, &args![version, inst_dir.display()], &build_env) {
        if inst_dir.exists() {
            if let Err(cleanup) = fs::remove_dir_all(&inst_dir) {
                warn!("could not remove {}: {cleanup}", inst_dir.display());
            }
        }
        return Err(err.context(format!("building Python {version} failed")));
    }
    Ok(())
}

pub(super) fn nuget_install(ctx: &mut CommandContext, version: &str) -> Result<()> {
    let nuget = ctx.path("python.nuget.exe")?;
    if !nuget.exists() {
        let url = ctx.config.string("python.nuget.url")?;
        info!("Downloading {url}");
        ctx.effects().http().download(&url, &nuget)?;
    }
    info!("Installing Python {version}");
    let cache = ctx.path("spin.cache")?;
    let source = ctx.config.string("python.nuget.source")?;
    ctx.sh_env(
        &nuget.display().to_string(),
        &args![
            "install",
            "-verbosity",
            "quiet",
            "-o",
            cache.join("python").display(),
            "python",
            "-version",
            version,
            "-source",
            source
        ],
        &[(
            "NUGET_HTTP_CACHE_PATH".to_string(),
            Some(cache.join("nugetcache").display().to_string()),
        )],
    )?;

    let interpreter = ctx.config.string("python.interpreter")?;
    ctx.sh(&interpreter, &args!["-m", "ensurepip", "--upgrade"])?;
    let mut upgrade = args!["-mpip", "install"];
    upgrade.extend(ctx.quiet_flag());
    upgrade.extend(args!["-U", "pip", "wheel", "packaging"]);
    ctx.sh(&interpreter, &upgrade)
}

fn check_reported_version(ctx: &CommandContext, version: &str) {
    let Ok(interpreter) = ctx.config.string("python.interpreter") else {
        return;
    };
    match ctx.capture(&interpreter, &args!["--version"]) {
        Ok(output) if reported_version_matches(version, &output.combined()) => {}
        Ok(output) => warn!(
            "{interpreter} reports '{}', expected Python {version}",
            output.combined().trim()
        ),
        Err(err) => warn!("could not query {interpreter}: {err:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{Plugin, PluginRegistry, PythonPlugin};
    use crate::process::RunOutput;
    use crate::testing::{context_with, FakeEffects};
    use spin_domain::ConfigTree;

    fn registry() -> PluginRegistry {
        PluginRegistry::from_plugins(vec![Box::new(PythonPlugin) as Box<dyn Plugin>])
    }

    fn config() -> ConfigTree {
        ConfigTree::new().with("python.version", "3.9")
    }

    #[cfg(unix)]
    #[test]
    fn pyenv_checkout_builds_the_requested_version() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let fake = FakeEffects::new();
        let mut ctx = context_with(temp.path(), config(), &fake, registry());
        ensure_interpreter(&mut ctx)?;

        let calls = fake.calls();
        let pyenv = temp.path().join(".spin-data/cache/pyenv");
        assert_eq!(
            calls[0].line(),
            format!(
                "git clone https://github.com/pyenv/pyenv.git {}",
                pyenv.display()
            )
        );
        let build = &calls[1];
        assert!(build
            .program
            .ends_with("pyenv/plugins/python-build/bin/python-build"));
        assert_eq!(build.args[0], "3.9");
        assert!(build.args[1].ends_with("cache/python/3.9"));
        assert_eq!(
            build.env_value("PYTHON_CFLAGS").as_deref(),
            Some("-DOPENSSL_NO_COMP")
        );
        assert!(ctx.env.exports().all(|(name, _)| name != "PYTHON_CFLAGS"));
        assert!(calls[2].line().ends_with("python --version"));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn failed_build_removes_the_partial_install() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let inst_dir = temp.path().join(".spin-data/cache/python/3.9");
        let fake = FakeEffects::new();
        let partial = inst_dir.clone();
        fake.on(move |call| {
            if !call.program.ends_with("python-build") {
                return None;
            }
            fs::create_dir_all(partial.join("bin")).ok()?;
            Some(RunOutput {
                code: 1,
                stdout: String::new(),
                stderr: "BUILD FAILED".to_string(),
            })
        });
        let mut ctx = context_with(temp.path(), config(), &fake, registry());
        let err = ensure_interpreter(&mut ctx).unwrap_err();
        assert!(format!("{err:#}").contains("building Python 3.9 failed"));
        assert!(!inst_dir.exists());
        Ok(())
    }

    #[test]
    fn missing_python_use_interpreter_is_a_user_error() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let fake = FakeEffects::new();
        let config = ConfigTree::new()
            .with("python.use", "/nonexistent/python3")
            .with("python.interpreter", "/nonexistent/python3");
        let mut ctx = context_with(temp.path(), config, &fake, registry());
        let err = ensure_interpreter(&mut ctx).unwrap_err();
        assert!(err.downcast_ref::<UserError>().is_some());
        assert!(fake.calls().is_empty());
        Ok(())
    }

    #[test]
    fn nuget_is_downloaded_once_and_bootstraps_pip() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let fake = FakeEffects::new();
        let config = config().with("python.interpreter", "py");
        let mut ctx = context_with(temp.path(), config, &fake, registry());
        nuget_install(&mut ctx, "3.9")?;
        nuget_install(&mut ctx, "3.9")?;

        let downloads = fake.downloads();
        assert_eq!(downloads.len(), 1);
        assert!(downloads[0].0.ends_with("nuget.exe"));
        let calls = fake.calls();
        assert!(calls[0].args.starts_with(&args!["install", "-verbosity", "quiet"]));
        assert!(calls[0]
            .env_value("NUGET_HTTP_CACHE_PATH")
            .is_some_and(|path| path.ends_with("nugetcache")));
        assert_eq!(calls[1].line(), "py -m ensurepip --upgrade");
        assert_eq!(calls[2].line(), "py -mpip install -U pip wheel packaging");
        Ok(())
    }
}
