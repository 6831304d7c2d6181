//! Plugins contribute option defaults and lifecycle hooks; the registry
//! orders them so that every plugin comes after the plugins it requires.

mod behave;
mod coverage;
mod debugpy;
mod devpi;
mod piptools;
mod playwright;
mod pytest;
pub(crate) mod python;
mod radon;

use std::collections::HashSet;

use anyhow::Result;
use serde_json::json;
use spin_domain::{ConfigTree, ConfigValue};

use crate::context::CommandContext;
use crate::error::UserError;

pub use behave::{run_behave, BehavePlugin, BehaveRequest};
pub use debugpy::DebugpyPlugin;
pub use devpi::{run_devpi, upload, DevpiPlugin};
pub use piptools::{python_upgrade, python_wheelhouse, PiptoolsPlugin};
pub use playwright::{run_playwright, PlaywrightPlugin, PlaywrightRequest};
pub use pytest::{run_pytest, PytestPlugin, PytestRequest};
pub use python::{env_command, run_python, system_provision, wheel, PythonPlugin};
pub use radon::{run_radon, RadonPlugin};

/// Hooks run in registry order, except `cleanup` which runs in reverse.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Plugins that must be loaded, and hooked, before this one.
    fn requires(&self) -> &'static [&'static str] {
        &["python"]
    }

    /// Defaults, placed under the plugin's name in the configuration.
    fn defaults(&self) -> ConfigTree;

    fn configure(&self, _ctx: &mut CommandContext) -> Result<()> {
        Ok(())
    }

    fn provision(&self, _ctx: &mut CommandContext) -> Result<()> {
        Ok(())
    }

    /// Runs after every plugin's `provision`.
    fn finalize_provision(&self, _ctx: &mut CommandContext) -> Result<()> {
        Ok(())
    }

    fn init(&self, _ctx: &mut CommandContext) -> Result<()> {
        Ok(())
    }

    fn cleanup(&self, _ctx: &mut CommandContext) -> Result<()> {
        Ok(())
    }

    /// Called while a virtual environment is provisioned, after pip is
    /// configured and before any requirement is installed.
    fn venv_hook(&self, _ctx: &mut CommandContext) -> Result<()> {
        Ok(())
    }
}

/// Python requirements a plugin declares, `requires.python` in its
/// defaults.
pub(crate) fn requires_python(packages: &[&str]) -> ConfigValue {
    ConfigTree::new()
        .with("python", ConfigValue::list(packages))
        .into()
}

pub fn builtin(name: &str) -> Option<Box<dyn Plugin>> {
    let plugin: Box<dyn Plugin> = match name {
        "python" => Box::new(PythonPlugin),
        "piptools" => Box::new(PiptoolsPlugin),
        "pytest" => Box::new(PytestPlugin),
        "behave" => Box::new(BehavePlugin),
        "playwright" => Box::new(PlaywrightPlugin),
        "debugpy" => Box::new(DebugpyPlugin),
        "radon" => Box::new(RadonPlugin),
        "devpi" => Box::new(DevpiPlugin),
        _ => return None,
    };
    Some(plugin)
}

pub const BUILTIN_PLUGINS: &[&str] = &[
    "python",
    "piptools",
    "pytest",
    "behave",
    "playwright",
    "debugpy",
    "radon",
    "devpi",
];

#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginRegistry {
    /// Loads `python`, the named plugins and everything they require,
    /// dependencies first.
    pub fn load<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut registry = Self::default();
        let mut visiting = Vec::new();
        let mut done = HashSet::new();
        registry.visit("python", &mut visiting, &mut done)?;
        for name in names {
            registry.visit(name.as_ref(), &mut visiting, &mut done)?;
        }
        Ok(registry)
    }

    /// A registry holding `plugins` in the given order.
    pub fn from_plugins(plugins: Vec<Box<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    fn visit(
        &mut self,
        name: &str,
        visiting: &mut Vec<&'static str>,
        done: &mut HashSet<&'static str>,
    ) -> Result<()> {
        let Some(plugin) = builtin(name) else {
            return Err(UserError::new(
                format!("unknown plugin `{name}`"),
                json!({
                    "plugin": name,
                    "hint": format!("available plugins: {}", BUILTIN_PLUGINS.join(", ")),
                }),
            )
            .into());
        };
        let name = plugin.name();
        if done.contains(name) {
            return Ok(());
        }
        if visiting.contains(&name) {
            return Err(anyhow::anyhow!(
                "plugin dependency cycle: {} -> {name}",
                visiting.join(" -> ")
            ));
        }
        visiting.push(name);
        for dependency in plugin.requires() {
            self.visit(dependency, visiting, done)?;
        }
        visiting.pop();
        done.insert(name);
        self.plugins.push(plugin);
        Ok(())
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &dyn Plugin> {
        self.plugins.iter().map(AsRef::as_ref)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(Plugin::name).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.iter().any(|plugin| plugin.name() == name)
    }

    /// Every plugin's defaults, each under its own name.
    pub fn defaults(&self) -> ConfigTree {
        let mut tree = ConfigTree::new();
        for plugin in self.iter() {
            tree.set(plugin.name(), plugin.defaults());
        }
        tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependencies_come_first() -> Result<()> {
        let registry = PluginRegistry::load(&["playwright", "radon"])?;
        assert_eq!(
            registry.names(),
            vec!["python", "debugpy", "pytest", "playwright", "radon"]
        );
        Ok(())
    }

    #[test]
    fn python_is_always_loaded_once() -> Result<()> {
        let registry = PluginRegistry::load(&["python", "piptools", "python"])?;
        assert_eq!(registry.names(), vec!["python", "piptools"]);
        Ok(())
    }

    #[test]
    fn unknown_plugins_are_user_errors() {
        let err = PluginRegistry::load(&["mkinstance"]).err();
        assert!(err.is_some_and(|err| err.downcast_ref::<UserError>().is_some()));
    }

    #[test]
    fn every_builtin_declares_its_defaults() {
        let registry = PluginRegistry::load(BUILTIN_PLUGINS).ok();
        let defaults = registry.map(|registry| registry.defaults()).unwrap_or_default();
        assert!(defaults.contains("python.venv"));
        assert!(defaults.contains("pytest.requires.python"));
        assert!(defaults.contains("piptools.pip_compile.options"));
        assert!(defaults.contains("devpi.formats"));
    }
}
