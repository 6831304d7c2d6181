use anyhow::Result;
use serde_json::json;
use spin_domain::{ConfigTree, ConfigValue};
use tracing::{debug, info};

use crate::context::CommandContext;
use crate::outcome::ExecutionOutcome;

use super::{requires_python, Plugin};

pub struct RadonPlugin;

impl Plugin for RadonPlugin {
    fn name(&self) -> &'static str {
        "radon"
    }

    fn defaults(&self) -> ConfigTree {
        ConfigTree::new()
            .with("exe", "radon")
            .with("opts", ConfigValue::list(&["-n", "{radon.mi_treshold}"]))
            .with("mi_treshold", "B")
            .with("requires", requires_python(&["radon"]))
    }
}

/// `spin radon [--all] [files]`: maintainability index of the given files,
/// of the files with uncommitted changes when none are given, or of
/// `src` and `tests` with `--all`.
pub fn run_radon(ctx: &mut CommandContext, all: bool, files: &[String]) -> Result<ExecutionOutcome> {
    let targets: Vec<String> = if all {
        let root = ctx.project_root()?;
        vec![
            root.join("src").display().to_string(),
            root.join("tests").display().to_string(),
        ]
    } else {
        let mut files = files.to_vec();
        if files.is_empty() {
            if let Some(modified) = ctx.git().modified_files(&ctx.project_root()?)? {
                info!("Found modified files.");
                files = modified;
            }
        }
        files.retain(|file| file.ends_with(".py"));
        files
    };
    if targets.is_empty() {
        return Ok(ExecutionOutcome::success(
            "no Python files to check",
            json!({ "files": [] }),
        ));
    }
    debug!(files = ?targets, "radon");
    let exe = ctx.config.string("radon.exe")?;
    let mut args = crate::args!["mi"];
    args.extend(ctx.config.list("radon.opts")?);
    args.extend(targets);
    let code = ctx.sh_status(&exe, &args)?;
    Ok(ExecutionOutcome::streamed("radon", code))
}
