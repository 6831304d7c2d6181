use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Result;
use spin_domain::Requirement;
use tracing::debug;

use super::{has_project_metadata, pip_check, Provisioner};
use crate::context::CommandContext;
use crate::memo::Memoizer;

/// Feeds requirements straight to `pip install`. Packages that are no
/// longer required are never uninstalled.
#[derive(Debug)]
pub struct SimpleProvisioner {
    memo: Memoizer,
    requirements: BTreeSet<Requirement>,
    devpackages: BTreeSet<Requirement>,
    project_installed: bool,
}

impl SimpleProvisioner {
    pub fn new(memo: impl Into<PathBuf>) -> Self {
        Self {
            memo: Memoizer::load(memo),
            requirements: BTreeSet::new(),
            devpackages: BTreeSet::new(),
            project_installed: false,
        }
    }

    fn pip_install(ctx: &CommandContext, requirements: &BTreeSet<Requirement>) -> Result<()> {
        let mut args = crate::args!["-m", "pip", "install"];
        args.extend(ctx.quiet_flag());
        args.extend(requirements.iter().flat_map(Requirement::install_args));
        ctx.sh(&ctx.config.string("python.python")?, &args)
    }
}

impl Provisioner for SimpleProvisioner {
    fn name(&self) -> &'static str {
        "pip"
    }

    fn prerequisites(&mut self, ctx: &CommandContext) -> Result<()> {
        let mut args = crate::args!["-m", "pip"];
        args.extend(ctx.quiet_flag());
        args.extend(crate::args!["install", "-U", "pip"]);
        ctx.sh(&ctx.config.string("python.python")?, &args)
    }

    fn lock(&mut self, _ctx: &CommandContext) -> Result<()> {
        Ok(())
    }

    fn add(&mut self, requirement: Requirement, dev: bool) -> Result<()> {
        if self.memo.check(requirement.as_str()) {
            debug!(%requirement, "already installed");
            return Ok(());
        }
        self.memo.add(requirement.as_str());
        if dev {
            self.devpackages.insert(requirement);
        } else {
            self.requirements.insert(requirement);
        }
        Ok(())
    }

    fn lock_extras(&mut self, _ctx: &CommandContext) -> Result<()> {
        Ok(())
    }

    fn sync(&mut self, ctx: &CommandContext) -> Result<()> {
        if self.requirements.is_empty() {
            return Ok(());
        }
        Self::pip_install(ctx, &self.requirements)?;
        self.requirements.clear();
        self.memo.save()
    }

    fn install(&mut self, ctx: &CommandContext) -> Result<()> {
        if !self.devpackages.is_empty() {
            Self::pip_install(ctx, &self.devpackages)?;
            self.devpackages.clear();
            self.memo.save()?;
        }

        let python = ctx.config.string("python.python")?;
        if !self.project_installed
            && ctx.config.flag("python.current_package.install")
            && has_project_metadata(&ctx.project_root()?)
        {
            let extras = ctx.config.list("python.current_package.extras")?;
            let target = if extras.is_empty() {
                ".".to_string()
            } else {
                format!(".[{}]", extras.join(","))
            };
            let mut args = crate::args!["-m", "pip", "install"];
            args.extend(ctx.quiet_flag());
            args.extend(crate::args!["-e", target]);
            ctx.sh(&python, &args)?;
            self.project_installed = true;
        }

        pip_check(ctx, &python)
    }
}
