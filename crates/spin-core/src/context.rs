use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use spin_domain::{ConfigTree, ConfigValue, Platform};

use crate::effects::{CommandRunner, Effects, GitClient, SharedEffects};
use crate::env::EnvContext;
use crate::plugins::PluginRegistry;
use crate::provision::{Provisioner, SimpleProvisioner};

#[derive(Clone, Debug, Default)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub trace: bool,
    pub json: bool,
    pub provision: bool,
    pub cleanup: bool,
}

/// Everything a lifecycle hook or task can see and change.
pub struct CommandContext {
    pub global: GlobalOptions,
    pub config: ConfigTree,
    pub env: EnvContext,
    platform: Platform,
    effects: SharedEffects,
    registry: Arc<PluginRegistry>,
    provisioner: Option<Box<dyn Provisioner>>,
}

impl CommandContext {
    pub fn new(
        global: GlobalOptions,
        config: ConfigTree,
        registry: Arc<PluginRegistry>,
        effects: SharedEffects,
    ) -> Self {
        Self {
            global,
            config,
            env: EnvContext::new(),
            platform: Platform::current(),
            effects,
            registry,
            provisioner: None,
        }
    }

    pub fn effects(&self) -> &dyn Effects {
        self.effects.as_ref()
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.effects.runner()
    }

    pub fn git(&self) -> &dyn GitClient {
        self.effects.git()
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn registry(&self) -> Arc<PluginRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn project_root(&self) -> Result<PathBuf> {
        Ok(PathBuf::from(self.config.string("spin.project_root")?))
    }

    /// A path option; relative values are taken relative to the project.
    pub fn path(&self, option: &str) -> Result<PathBuf> {
        let value = PathBuf::from(self.config.string(option)?);
        self.absolute(value)
    }

    pub fn absolute(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            Ok(self.project_root()?.join(path))
        }
    }

    /// `["-q"]` when running quietly, so it can be spliced into a command.
    pub fn quiet_flag(&self) -> Vec<String> {
        if self.global.quiet {
            vec!["-q".to_string()]
        } else {
            Vec::new()
        }
    }

    /// Interpolates `{...}` references in `text`, resolving bare names
    /// against the environment commands would see.
    pub fn interpolate(&self, text: &str) -> Result<String> {
        let env = &self.env;
        Ok(self
            .config
            .interpolate_with(text, &|name| env.get(name))?)
    }

    /// Exports a variable to every later command and to the patched
    /// activation scripts. The value is interpolated; `None` unsets it.
    pub fn setenv(&mut self, name: &str, value: Option<&str>) -> Result<()> {
        let value = value
            .map(|raw| self.interpolate(raw))
            .transpose()
            .with_context(|| format!("setting {name}"))?;
        self.env.export(name, value);
        Ok(())
    }

    /// Sets an option, e.g. `python.interpreter` once it is known.
    pub fn set_option(&mut self, path: &str, value: impl Into<ConfigValue>) {
        self.config.set(path, value);
    }

    pub fn set_provisioner(&mut self, provisioner: Box<dyn Provisioner>) {
        self.provisioner = Some(provisioner);
    }

    pub fn provisioner_name(&self) -> Option<&'static str> {
        self.provisioner.as_ref().map(|provisioner| provisioner.name())
    }

    /// Lends the configured provisioner to `action`, falling back to the
    /// direct pip one. The provisioner is put back even when `action`
    /// fails.
    pub fn with_provisioner<T>(
        &mut self,
        action: impl FnOnce(&mut dyn Provisioner, &mut CommandContext) -> Result<T>,
    ) -> Result<T> {
        let mut provisioner: Box<dyn Provisioner> = match self.provisioner.take() {
            Some(provisioner) => provisioner,
            None => Box::new(SimpleProvisioner::new(self.path("python.memo")?)),
        };
        let result = action(provisioner.as_mut(), self);
        self.provisioner = Some(provisioner);
        result
    }
}
