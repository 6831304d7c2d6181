//! Recording stand-ins for the effects used by unit tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use spin_domain::ConfigTree;

use crate::context::{CommandContext, GlobalOptions};
use crate::effects::{CommandRunner, Downloader, Effects, GitClient, SharedEffects};
use crate::plugins::PluginRegistry;
use crate::process::{EnvPairs, RunOutput};
use crate::shell::command_line;

#[derive(Clone, Debug)]
pub(crate) struct Call {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, Option<String>)>,
    pub passthrough: bool,
}

impl Call {
    pub fn line(&self) -> String {
        command_line(&self.program, &self.args)
    }

    pub fn env_value(&self, name: &str) -> Option<String> {
        self.env
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .and_then(|(_, value)| value.clone())
    }
}

type Responder = Box<dyn Fn(&Call) -> Option<RunOutput> + Send + Sync>;

#[derive(Default)]
pub(crate) struct FakeEffects {
    calls: Mutex<Vec<Call>>,
    responders: Mutex<Vec<Responder>>,
    downloads: Mutex<Vec<(String, PathBuf)>>,
    modified: Mutex<Option<Vec<String>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl FakeEffects {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Commands whose line contains `pattern` exit with `code` and print
    /// `stdout`.
    pub fn respond(&self, pattern: &str, code: i32, stdout: &str) {
        let pattern = pattern.to_string();
        let stdout = stdout.to_string();
        self.on(move |call| {
            call.line().contains(&pattern).then(|| RunOutput {
                code,
                stdout: stdout.clone(),
                stderr: String::new(),
            })
        });
    }

    /// Commands whose line contains `pattern` create `dir` and succeed.
    pub fn creates_dir(&self, pattern: &str, dir: &Path) {
        let pattern = pattern.to_string();
        let dir = dir.to_path_buf();
        self.on(move |call| {
            if !call.line().contains(&pattern) {
                return None;
            }
            fs::create_dir_all(&dir).ok()?;
            Some(RunOutput {
                code: 0,
                stdout: String::new(),
                stderr: String::new(),
            })
        });
    }

    pub fn on(&self, responder: impl Fn(&Call) -> Option<RunOutput> + Send + Sync + 'static) {
        lock(&self.responders).push(Box::new(responder));
    }

    pub fn set_modified(&self, files: &[&str]) {
        *lock(&self.modified) = Some(files.iter().map(ToString::to_string).collect());
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.calls().iter().map(Call::line).collect()
    }

    pub fn downloads(&self) -> Vec<(String, PathBuf)> {
        lock(&self.downloads).clone()
    }

    fn record(&self, program: &str, args: &[String], env: &EnvPairs, passthrough: bool) -> RunOutput {
        let call = Call {
            program: program.to_string(),
            args: args.to_vec(),
            env: env.to_vec(),
            passthrough,
        };
        let output = lock(&self.responders)
            .iter()
            .find_map(|responder| responder(&call))
            .unwrap_or(RunOutput {
                code: 0,
                stdout: String::new(),
                stderr: String::new(),
            });
        lock(&self.calls).push(call);
        output
    }
}

impl CommandRunner for FakeEffects {
    fn capture(
        &self,
        program: &str,
        args: &[String],
        env: &EnvPairs,
        _cwd: &Path,
    ) -> Result<RunOutput> {
        Ok(self.record(program, args, env, false))
    }

    fn passthrough(
        &self,
        program: &str,
        args: &[String],
        env: &EnvPairs,
        _cwd: &Path,
    ) -> Result<RunOutput> {
        let mut output = self.record(program, args, env, true);
        output.stdout.clear();
        Ok(output)
    }
}

impl Downloader for FakeEffects {
    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, b"fake")?;
        lock(&self.downloads).push((url.to_string(), dest.to_path_buf()));
        Ok(())
    }
}

impl GitClient for FakeEffects {
    fn modified_files(&self, _root: &Path) -> Result<Option<Vec<String>>> {
        Ok(lock(&self.modified).clone())
    }
}

impl Effects for FakeEffects {
    fn runner(&self) -> &dyn CommandRunner {
        self
    }

    fn http(&self) -> &dyn Downloader {
        self
    }

    fn git(&self) -> &dyn GitClient {
        self
    }
}

/// A context rooted at `root` with the built-in options, `config` on top
/// and no plugins loaded.
pub(crate) fn context(root: &Path, config: ConfigTree, fake: &Arc<FakeEffects>) -> CommandContext {
    context_with(root, config, fake, PluginRegistry::default())
}

pub(crate) fn context_with(
    root: &Path,
    config: ConfigTree,
    fake: &Arc<FakeEffects>,
    registry: PluginRegistry,
) -> CommandContext {
    let mut tree = crate::lifecycle::builtin_config(root, &root.join(".spin-data"));
    for plugin in registry.iter() {
        tree.set(plugin.name(), plugin.defaults());
    }
    tree.merge(config);
    let effects: SharedEffects = fake.clone();
    CommandContext::new(GlobalOptions::default(), tree, Arc::new(registry), effects)
}
