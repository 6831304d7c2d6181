#![allow(dead_code)]

use std::{
    env, fs,
    path::{Path, PathBuf},
    process::Command,
};

use tempfile::TempDir;

pub struct Project {
    pub temp: TempDir,
    pub root: PathBuf,
}

impl Project {
    /// A temporary project holding `spinfile` as its spinfile.toml.
    pub fn new(spinfile: &str) -> Self {
        let temp = tempfile::Builder::new()
            .prefix("spin-cli")
            .tempdir()
            .expect("tempdir");
        let root = fs::canonicalize(temp.path()).expect("canonical tempdir");
        fs::write(root.join("spinfile.toml"), spinfile).expect("write spinfile");
        Self { temp, root }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(".data")
    }

    pub fn venv(&self) -> PathBuf {
        self.root.join(".spin").join("venv")
    }

    /// `-C <root> --data-dir <root>/.data`, then `args`.
    pub fn args(&self, args: &[&str]) -> Vec<String> {
        let mut all = vec![
            "-C".to_string(),
            self.root.display().to_string(),
            "--data-dir".to_string(),
            self.data_dir().display().to_string(),
        ];
        all.extend(args.iter().map(ToString::to_string));
        all
    }
}

/// Any existing executable, for `python.use` when nothing gets run.
pub fn existing_executable() -> String {
    env::current_exe()
        .expect("test binary path")
        .display()
        .to_string()
}

pub fn require_online() -> bool {
    if let Some("1") = env::var("SPIN_ONLINE").ok().as_deref() {
        true
    } else {
        eprintln!("skipping online test (SPIN_ONLINE!=1)");
        false
    }
}

pub fn find_python() -> Option<String> {
    for candidate in ["python3", "python"] {
        let Ok(output) = Command::new(candidate)
            .args(["-c", "import sys; print(sys.executable)"])
            .output()
        else {
            continue;
        };
        if output.status.success() {
            let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if Path::new(&path).exists() {
                return Some(path);
            }
        }
    }
    None
}

/// `major.minor.micro` of a final release, which python-build has a
/// definition for.
pub fn release_version(python: &str) -> Option<String> {
    let output = Command::new(python)
        .args(["-c", "import platform; print(platform.python_version())"])
        .output()
        .ok()?;
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let parts: Vec<&str> = version.split('.').collect();
    let release = parts.len() == 3
        && parts
            .iter()
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
    release.then_some(version)
}
