use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Default, Serialize, Deserialize)]
struct MemoFile {
    #[serde(default)]
    entries: BTreeSet<String>,
}

/// Remembers which requirements were installed into a virtual environment.
///
/// Entries are only ever added; deleting the environment forgets them.
#[derive(Debug)]
pub struct Memoizer {
    path: PathBuf,
    known: BTreeSet<String>,
    staged: BTreeSet<String>,
}

impl Memoizer {
    /// Loads the memo at `path`. A missing or unreadable file counts as
    /// empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let known = read_entries(&path);
        Self {
            path,
            known,
            staged: BTreeSet::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn check(&self, key: &str) -> bool {
        self.known.contains(key) || self.staged.contains(key)
    }

    /// Stages `key`; it is persisted by the next [`Memoizer::save`].
    pub fn add(&mut self, key: &str) {
        if !self.known.contains(key) {
            self.staged.insert(key.to_string());
        }
    }

    /// Writes staged keys, merged with whatever the file holds by now.
    pub fn save(&mut self) -> Result<()> {
        let mut entries = read_entries(&self.path);
        entries.extend(self.known.iter().cloned());
        entries.append(&mut self.staged);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let memo = MemoFile { entries };
        let text = serde_json::to_string_pretty(&memo)?;
        fs::write(&self.path, format!("{text}\n"))
            .with_context(|| format!("writing {}", self.path.display()))?;
        self.known = memo.entries;
        Ok(())
    }
}

fn read_entries(path: &Path) -> BTreeSet<String> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            debug!(path = %path.display(), %err, "memo not readable, starting empty");
            return BTreeSet::new();
        }
    };
    match serde_json::from_str::<MemoFile>(&contents) {
        Ok(memo) => memo.entries,
        Err(err) => {
            debug!(path = %path.display(), %err, "memo corrupt, starting empty");
            BTreeSet::new()
        }
    }
}
