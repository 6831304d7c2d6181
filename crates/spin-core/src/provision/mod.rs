//! Strategies that bring a virtual environment's packages in line with the
//! project's requirements.

mod piptools;
mod simple;

use std::path::Path;

use anyhow::Result;
use spin_domain::Requirement;

use crate::context::CommandContext;
use crate::error::UserError;

pub use piptools::PiptoolsProvisioner;
pub use simple::SimpleProvisioner;

/// Called by the environment bootstrapper in this order: `prerequisites`
/// (fresh environments only), `lock`, `add` for every requirement,
/// `lock_extras`, `sync`, `install`.
pub trait Provisioner {
    fn name(&self) -> &'static str;

    /// Installs what the strategy itself needs, e.g. a recent pip.
    fn prerequisites(&mut self, ctx: &CommandContext) -> Result<()>;

    /// Regenerates the project lock when it is missing or stale.
    fn lock(&mut self, ctx: &CommandContext) -> Result<()>;

    /// Registers a requirement; adding the same one twice has no effect.
    fn add(&mut self, requirement: Requirement, dev: bool) -> Result<()>;

    /// Locks requirements added through [`Provisioner::add`].
    fn lock_extras(&mut self, ctx: &CommandContext) -> Result<()>;

    /// Makes the installed packages match what was locked or added.
    fn sync(&mut self, ctx: &CommandContext) -> Result<()>;

    /// Installs the project itself and checks the result for conflicts.
    fn install(&mut self, ctx: &CommandContext) -> Result<()>;

    fn upgrade(&mut self, _ctx: &CommandContext, _packages: &[String]) -> Result<()> {
        Err(self.unsupported("python:upgrade"))
    }

    fn wheelhouse(&mut self, _ctx: &CommandContext) -> Result<()> {
        Err(self.unsupported("python:wheelhouse"))
    }

    #[doc(hidden)]
    fn unsupported(&self, task: &str) -> anyhow::Error {
        UserError::hint(
            format!("{task} is not supported by the {} provisioner", self.name()),
            "add the `piptools` plugin to spinfile.toml",
        )
        .into()
    }
}

pub(crate) fn has_project_metadata(root: &Path) -> bool {
    ["setup.py", "setup.cfg", "pyproject.toml"]
        .iter()
        .any(|name| root.join(name).exists())
}

/// `pip check`; incompatibilities abort provisioning with pip's report.
pub(crate) fn pip_check(ctx: &CommandContext, python: &str) -> Result<()> {
    let output = ctx.capture(python, &crate::args!["-m", "pip", "check"])?;
    if output.success() {
        return Ok(());
    }
    Err(crate::error::ConsistencyError {
        report: output.combined().trim().to_string(),
    }
    .into())
}
