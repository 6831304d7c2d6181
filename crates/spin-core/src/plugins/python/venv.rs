use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use spin_domain::{configure_pipconf, ConfigError, ConfigTree, ConfigValue, Requirement};
use tracing::{debug, info};

use crate::activate::patch_all;
use crate::args;
use crate::context::CommandContext;
use crate::error::UserError;

/// Creates (when needed), activates and fills the project's virtual
/// environment.
pub(super) fn venv_provision(ctx: &mut CommandContext) -> Result<()> {
    let venv = ctx.path("python.venv")?;
    let fresh = !venv.exists();
    if fresh {
        create_venv(ctx, &venv)?;
    }
    venv_init(ctx)?;
    write_pipconf(ctx, &venv)?;

    let registry = ctx.registry();
    ctx.with_provisioner(|provisioner, ctx| {
        debug!(provisioner = provisioner.name(), fresh, "provisioning");
        if fresh {
            provisioner.prerequisites(ctx)?;
        }
        for plugin in registry.iter() {
            debug!(plugin = plugin.name(), "venv hook");
            plugin.venv_hook(ctx)?;
        }
        provisioner.lock(ctx)?;

        for spec in ctx.config.list("python.requirements")? {
            provisioner.add(Requirement::new(spec), false)?;
        }
        for spec in ctx.config.list("python.devpackages")? {
            provisioner.add(Requirement::new(spec), true)?;
        }
        for plugin in registry.iter() {
            for spec in ctx.config.list(&format!("{}.requires.python", plugin.name()))? {
                provisioner.add(Requirement::new(spec), false)?;
            }
        }

        provisioner.lock_extras(ctx)?;
        provisioner.sync(ctx)?;
        provisioner.install(ctx)
    })
}

fn create_venv(ctx: &CommandContext, venv: &Path) -> Result<()> {
    let interpreter = ctx.config.string("python.interpreter")?;
    info!("Creating {}", venv.display());
    // Looked up on the PATH the child will run with.
    let search = ctx.env.get("PATH");
    if which::which_in("virtualenv", search, ctx.project_root()?).is_ok() {
        let mut args = args!["-p", interpreter, venv.display()];
        if ctx.global.quiet {
            args.insert(0, "-q".to_string());
        }
        ctx.sh("virtualenv", &args)
    } else {
        ctx.sh(&interpreter, &args!["-m", "venv", venv.display()])
    }
}

/// Activates the project's environment for every later command.
pub(crate) fn venv_init(ctx: &mut CommandContext) -> Result<()> {
    let venv = ctx.path("python.venv")?;
    if !venv.is_dir() {
        return Err(UserError::hint(
            format!("virtual environment {} does not exist", venv.display()),
            "run spin with the '--provision' flag",
        )
        .into());
    }
    let scriptdir = ctx.path("python.scriptdir")?;
    let separator = ctx.platform().path_separator();
    if ctx.env.activate(&venv, &scriptdir, separator) {
        debug!(venv = %venv.display(), "activated");
    }
    Ok(())
}

fn write_pipconf(ctx: &CommandContext, venv: &Path) -> Result<()> {
    let name = if ctx.platform().windows {
        "pip.ini"
    } else {
        "pip.conf"
    };
    let extra = match ctx.config.get("python.pipconf") {
        Some(ConfigValue::Table(sections)) => render_ini(ctx, sections)?,
        _ => ctx.config.opt_string("python.pipconf")?.unwrap_or_default(),
    };
    let index = ctx.config.string("python.index_url")?;
    let wheelhouse = ctx.path("python.wheelhouse")?;
    let find_links = wheelhouse
        .is_dir()
        .then(|| wheelhouse.display().to_string());
    let path = venv.join(name);
    debug!(path = %path.display(), "writing pip configuration");
    fs::write(&path, configure_pipconf(&extra, &index, find_links.as_deref()))
        .with_context(|| format!("writing {}", path.display()))
}

/// `python.pipconf` given as a table of INI sections.
fn render_ini(ctx: &CommandContext, sections: &ConfigTree) -> Result<String> {
    let mut out = String::new();
    for (section, keys) in sections.iter() {
        let ConfigValue::Table(keys) = keys else {
            return Err(ConfigError::WrongType {
                path: format!("python.pipconf.{section}"),
                expected: "a table",
            }
            .into());
        };
        writeln!(out, "[{section}]")?;
        for (key, value) in keys.iter() {
            let value = match value {
                ConfigValue::Null => continue,
                ConfigValue::Bool(flag) => flag.to_string(),
                ConfigValue::Str(raw) => ctx.interpolate(raw)?,
                ConfigValue::List(items) => items
                    .iter()
                    .map(|item| ctx.interpolate(item))
                    .collect::<Result<Vec<_>>>()?
                    .join(" "),
                ConfigValue::Table(_) => bail!("python.pipconf.{section}.{key} is nested too deep"),
            };
            writeln!(out, "{key} = {value}")?;
        }
    }
    Ok(out)
}

/// Runs after every plugin provisioned: the last install round, then the
/// exports collected so far are baked into the activation scripts and a
/// `.pth` hook.
pub(super) fn finalize_provision(ctx: &mut CommandContext) -> Result<()> {
    ctx.with_provisioner(|provisioner, ctx| provisioner.install(ctx))?;

    let scriptdir = ctx.path("python.scriptdir")?;
    let exports: Vec<(String, String)> = ctx
        .env
        .exports()
        .filter_map(|(name, value)| Some((name.to_string(), value?.to_string())))
        .collect();
    for outcome in patch_all(&scriptdir, &exports, ctx.platform().path_separator())? {
        debug!(?outcome, "activation script");
    }

    let site_packages = purelib(ctx)?;
    let bindir = ctx.path("python.bindir")?;
    let pth = site_packages.join("_set_env.pth");
    info!("Writing {}", pth.display());
    fs::write(&pth, set_env_pth(&bindir)).with_context(|| format!("writing {}", pth.display()))
}

fn set_env_pth(bindir: &Path) -> String {
    format!(
        "import os; bindir=r'{}'; os.environ['PATH'] = os.environ['PATH'] \
         if bindir in os.environ['PATH'] else os.pathsep.join((bindir, os.environ['PATH']))\n",
        bindir.display()
    )
}

/// The environment's `site-packages`.
pub(crate) fn purelib(ctx: &CommandContext) -> Result<PathBuf> {
    let python = ctx.config.string("python.python")?;
    let dir = ctx.backtick(
        &python,
        &args![
            "-c",
            "import sysconfig; print(sysconfig.get_path('purelib'))"
        ],
    )?;
    if dir.is_empty() {
        bail!("{python} did not report a site-packages directory");
    }
    Ok(PathBuf::from(dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{Plugin, PluginRegistry, PythonPlugin, RadonPlugin};
    use crate::testing::{context_with, FakeEffects};

    struct Fixture {
        temp: tempfile::TempDir,
        venv: PathBuf,
        site: PathBuf,
    }

    fn fixture() -> Result<Fixture> {
        let temp = tempfile::tempdir()?;
        let venv = temp.path().join(".spin").join("venv");
        let site = temp.path().join("site-packages");
        fs::create_dir_all(&site)?;
        Ok(Fixture { temp, venv, site })
    }

    fn registry() -> PluginRegistry {
        PluginRegistry::from_plugins(vec![
            Box::new(PythonPlugin) as Box<dyn Plugin>,
            Box::new(RadonPlugin),
        ])
    }

    fn config() -> ConfigTree {
        ConfigTree::new()
            .with("python.version", "3.9")
            .with("python.interpreter", "python3.9")
            .with("python.python", "python")
            .with("python.requirements", ConfigValue::list(&["requests"]))
            .with("python.devpackages", ConfigValue::list(&["ipython"]))
    }

    #[test]
    fn fresh_venv_is_created_configured_and_filled() -> Result<()> {
        let fx = fixture()?;
        let fake = FakeEffects::new();
        fake.creates_dir("venv", &fx.venv);
        let mut ctx = context_with(fx.temp.path(), config(), &fake, registry());
        venv_provision(&mut ctx)?;

        let lines = fake.lines();
        assert!(lines[0].ends_with(&format!("{}", fx.venv.display())));
        assert_eq!(
            &lines[1..],
            [
                "python -m pip install -U pip",
                "python -m pip install radon requests",
                "python -m pip install ipython",
                "python -m pip check",
            ]
        );
        let conf = fs::read_to_string(fx.venv.join("pip.conf"))?;
        assert!(conf.contains("index-url = https://pypi.org/simple"));
        assert!(ctx.env.is_activated());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn virtualenv_is_found_on_the_exported_path() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let fx = fixture()?;
        let bin = fx.temp.path().join("tools");
        fs::create_dir_all(&bin)?;
        let virtualenv = bin.join("virtualenv");
        fs::write(&virtualenv, "#!/bin/sh\n")?;
        fs::set_permissions(&virtualenv, fs::Permissions::from_mode(0o755))?;
        let empty = fx.temp.path().join("empty");
        fs::create_dir_all(&empty)?;

        let fake = FakeEffects::new();
        let mut ctx = context_with(fx.temp.path(), config(), &fake, registry());
        ctx.env.export("PATH", Some(empty.display().to_string()));
        create_venv(&ctx, &fx.venv)?;
        ctx.env.export("PATH", Some(bin.display().to_string()));
        create_venv(&ctx, &fx.venv)?;

        let lines = fake.lines();
        assert_eq!(
            lines[0],
            format!("python3.9 -m venv {}", fx.venv.display())
        );
        assert_eq!(
            lines[1],
            format!("virtualenv -p python3.9 {}", fx.venv.display())
        );
        Ok(())
    }

    #[test]
    fn existing_venv_skips_creation_and_prerequisites() -> Result<()> {
        let fx = fixture()?;
        fs::create_dir_all(&fx.venv)?;
        let fake = FakeEffects::new();
        let config = config()
            .with("python.requirements", ConfigValue::List(Vec::new()))
            .with("python.devpackages", ConfigValue::List(Vec::new()));
        let mut ctx = context_with(fx.temp.path(), config, &fake, registry());
        venv_provision(&mut ctx)?;
        assert_eq!(
            fake.lines(),
            ["python -m pip install radon", "python -m pip check"]
        );
        Ok(())
    }

    #[test]
    fn pipconf_table_and_wheelhouse_are_written() -> Result<()> {
        let fx = fixture()?;
        fs::create_dir_all(&fx.venv)?;
        let wheelhouse = fx.temp.path().join(".spin").join("wheelhouse");
        fs::create_dir_all(&wheelhouse)?;
        let fake = FakeEffects::new();
        let pipconf = ConfigTree::new()
            .with("global.timeout", "60")
            .with("install.index-url", "https://mirror.example/simple");
        let config = config().with("python.pipconf", pipconf);
        let ctx = context_with(fx.temp.path(), config, &fake, registry());
        write_pipconf(&ctx, &fx.venv)?;

        let conf = fs::read_to_string(fx.venv.join("pip.conf"))?;
        assert!(conf.contains("timeout = 60"));
        assert!(conf.contains("index-url = https://mirror.example/simple"));
        assert!(conf.contains(&wheelhouse.display().to_string()));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn finalize_patches_scripts_and_writes_pth() -> Result<()> {
        let fx = fixture()?;
        let bin = fx.venv.join("bin");
        fs::create_dir_all(&bin)?;
        fs::write(bin.join("activate"), "# activate\n")?;
        let fake = FakeEffects::new();
        fake.respond("sysconfig", 0, &format!("{}\n", fx.site.display()));
        let mut ctx = context_with(fx.temp.path(), config(), &fake, registry());
        ctx.setenv("PACKAGE_NAME", Some("demo"))?;
        ctx.setenv("UNSET_ME", None)?;
        finalize_provision(&mut ctx)?;

        let script = fs::read_to_string(bin.join("activate"))?;
        assert!(script.contains("PACKAGE_NAME"));
        assert!(!script.contains("UNSET_ME"));
        assert!(bin.join("activate.bak").exists());
        let pth = fs::read_to_string(fx.site.join("_set_env.pth"))?;
        assert!(pth.starts_with(&format!("import os; bindir=r'{}';", bin.display())));
        Ok(())
    }

    #[test]
    fn empty_purelib_is_an_error() -> Result<()> {
        let fx = fixture()?;
        let fake = FakeEffects::new();
        let ctx = context_with(fx.temp.path(), config(), &fake, registry());
        assert!(purelib(&ctx).is_err());
        Ok(())
    }
}
