use spin_domain::{ConfigTree, ConfigValue};

use super::{requires_python, Plugin};

/// Debugger options for tasks that can start under `debugpy`.
pub struct DebugpyPlugin;

impl Plugin for DebugpyPlugin {
    fn name(&self) -> &'static str {
        "debugpy"
    }

    fn defaults(&self) -> ConfigTree {
        ConfigTree::new()
            .with(
                "opts",
                ConfigValue::list(&["--listen localhost:5678", "--wait-for-client"]),
            )
            .with("requires", requires_python(&["debugpy"]))
    }
}
