use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use serde_json::json;
use spin_domain::Requirement;
use tracing::{debug, info};

use super::{has_project_metadata, pip_check, Provisioner};
use crate::context::CommandContext;
use crate::error::UserError;

/// Compiles pinned lock files with pip-tools and syncs the environment to
/// exactly their content, uninstalling anything else.
///
/// The primary lock comes from the project's own metadata, the secondary
/// one from requirements added by spin and its plugins.
#[derive(Debug)]
pub struct PiptoolsProvisioner {
    hashes: bool,
    spinreqs: BTreeSet<Requirement>,
    locks_updated: bool,
    project_installed: bool,
}

impl PiptoolsProvisioner {
    pub fn new(hashes: bool) -> Self {
        Self {
            hashes,
            spinreqs: BTreeSet::new(),
            locks_updated: false,
            project_installed: false,
        }
    }

    fn compile(&self, ctx: &CommandContext, args: Vec<String>) -> Result<()> {
        let mut options = ctx.config.list("piptools.pip_compile.options")?;
        if self.hashes {
            options.extend(ctx.config.list("piptools.pip_compile.options_hash")?);
        }
        options.extend(args);
        piptools(ctx, "piptools.pip_compile", options)
    }
}

/// `python -m piptools <cmd>` with the command's configured environment.
fn piptools(ctx: &CommandContext, section: &str, options: Vec<String>) -> Result<()> {
    let mut args = crate::args!["-m", "piptools", ctx.config.string(&format!("{section}.cmd"))?];
    args.extend(ctx.quiet_flag());
    args.extend(options);
    let mut env = Vec::new();
    if let Some(table) = ctx.config.table(&format!("{section}.env")) {
        for (name, _) in table.iter() {
            let value = ctx.config.opt_string(&format!("{section}.env.{name}"))?;
            env.push((name.to_string(), value));
        }
    }
    ctx.sh_env(&ctx.config.string("python.python")?, &args, &env)
}

/// Whether `target` exists and is not older than any existing source.
pub(crate) fn is_up_to_date(target: &Path, sources: &[PathBuf]) -> bool {
    let Some(target_time) = modified(target) else {
        return false;
    };
    sources
        .iter()
        .filter_map(|source| modified(source))
        .all(|source_time| source_time <= target_time)
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .map(|text| text.lines().map(ToOwned::to_owned).collect())
        .unwrap_or_default()
}

impl Provisioner for PiptoolsProvisioner {
    fn name(&self) -> &'static str {
        "piptools"
    }

    fn prerequisites(&mut self, ctx: &CommandContext) -> Result<()> {
        let mut args = crate::args!["-m", "pip", "install"];
        args.extend(ctx.quiet_flag());
        args.extend(ctx.config.list("piptools.prerequisites")?);
        ctx.sh(&ctx.config.string("python.python")?, &args)
    }

    fn lock(&mut self, ctx: &CommandContext) -> Result<()> {
        let lockfile = ctx.path("piptools.requirements")?;
        let sources = ctx
            .config
            .list("piptools.requirements_sources")?
            .into_iter()
            .map(|source| ctx.absolute(source))
            .collect::<Result<Vec<_>>>()?;
        if is_up_to_date(&lockfile, &sources) {
            debug!(lock = %lockfile.display(), "lock is up to date");
            return Ok(());
        }
        if !sources.iter().any(|source| source.exists()) {
            info!(
                "No project metadata found, writing empty {}",
                lockfile.display()
            );
            fs::write(&lockfile, "")
                .with_context(|| format!("writing {}", lockfile.display()))?;
            self.locks_updated = true;
            return Ok(());
        }
        let mut args = Vec::new();
        for option in ["python.current_package.extras", "piptools.extras"] {
            for extra in ctx.config.list(option)? {
                args.push(format!("--extra={extra}"));
            }
        }
        args.push("-o".into());
        args.push(lockfile.display().to_string());
        self.compile(ctx, args)?;
        self.locks_updated = true;
        Ok(())
    }

    fn add(&mut self, requirement: Requirement, _dev: bool) -> Result<()> {
        if self.hashes && requirement.is_editable_or_local() {
            return Err(UserError::new(
                format!("hashed dependencies are incompatible with `{requirement}`"),
                json!({
                    "requirement": requirement.as_str(),
                    "hint": "set piptools.hashes=false to allow editable or local requirements",
                }),
            )
            .into());
        }
        self.spinreqs.insert(requirement);
        Ok(())
    }

    fn lock_extras(&mut self, ctx: &CommandContext) -> Result<()> {
        let input = ctx.path("piptools.spinreqs_in")?;
        let lockfile = ctx.path("piptools.spinreqs")?;
        let new: Vec<String> = self
            .spinreqs
            .iter()
            .map(|requirement| requirement.as_str().to_string())
            .collect();
        let old = read_lines(&input);
        if new == old && lockfile.exists() {
            debug!(input = %input.display(), "extra requirements unchanged");
            return Ok(());
        }
        for line in old.iter().filter(|line| !new.contains(line)) {
            info!("- {line}");
        }
        for line in new.iter().filter(|line| !old.contains(line)) {
            info!("+ {line}");
        }
        let text: String = new.iter().map(|line| format!("{line}\n")).collect();
        fs::write(&input, text).with_context(|| format!("writing {}", input.display()))?;
        self.compile(
            ctx,
            crate::args![
                input.display(),
                "-o",
                lockfile.display()
            ],
        )?;
        self.locks_updated = true;
        Ok(())
    }

    fn sync(&mut self, ctx: &CommandContext) -> Result<()> {
        // Always reconciled: packages installed by hand are removed even
        // when both locks are unchanged.
        let wheelhouse = ctx.path("python.wheelhouse")?;
        if self.locks_updated && wheelhouse.exists() {
            info!("Updating the wheelhouse");
            self.wheelhouse(ctx)?;
        }
        let mut options = ctx.config.list("piptools.pip_sync.options")?;
        if wheelhouse.exists() {
            options.push("--no-index".into());
        }
        options.push(ctx.path("piptools.requirements")?.display().to_string());
        options.push(ctx.path("piptools.spinreqs")?.display().to_string());
        piptools(ctx, "piptools.pip_sync", options)
    }

    fn install(&mut self, ctx: &CommandContext) -> Result<()> {
        let python = ctx.config.string("python.python")?;
        if !self.project_installed
            && ctx.config.flag("python.current_package.install")
            && has_project_metadata(&ctx.project_root()?)
        {
            let mut args = crate::args!["-m", "pip", "install"];
            args.extend(ctx.quiet_flag());
            args.extend(ctx.config.list("piptools.editable_options")?);
            args.extend(crate::args!["-e", "."]);
            ctx.sh(&python, &args)?;
            self.project_installed = true;
        }
        pip_check(ctx, &python)
    }

    fn upgrade(&mut self, ctx: &CommandContext, packages: &[String]) -> Result<()> {
        let upgrade: Vec<String> = if packages.is_empty() {
            crate::args!["--upgrade"]
        } else {
            packages
                .iter()
                .flat_map(|package| ["--upgrade-package".to_string(), package.clone()])
                .collect()
        };
        let requirements = ctx.path("piptools.requirements")?.display().to_string();
        let mut args = crate::args!["-o", requirements];
        args.extend(upgrade.iter().cloned());
        self.compile(ctx, args)?;

        let mut args = crate::args![
            ctx.path("piptools.spinreqs_in")?.display(),
            "-o",
            ctx.path("piptools.spinreqs")?.display()
        ];
        args.extend(upgrade);
        self.compile(ctx, args)
    }

    fn wheelhouse(&mut self, ctx: &CommandContext) -> Result<()> {
        let args = crate::args![
            "-m",
            "pip",
            "--exists-action",
            "b",
            "download",
            "-d",
            ctx.path("python.wheelhouse")?.display(),
            "-r",
            ctx.path("piptools.requirements")?.display(),
            "-r",
            ctx.path("piptools.spinreqs")?.display()
        ];
        ctx.sh(&ctx.config.string("python.python")?, &args)
    }
}
