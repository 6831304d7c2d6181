//! Minimal INI model for pip configuration files.
//!
//! pip accepts `index-url` and `index_url` interchangeably; lookups here
//! compare keys with underscores folded to dashes.

pub const DEFAULT_INDEX_URL: &str = "https://pypi.org/simple";

const INDEX_KEY: &str = "index-url";
const FIND_LINKS_KEY: &str = "find-links";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipConf {
    sections: Vec<Section>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

impl PipConf {
    pub fn parse(text: &str) -> Self {
        let mut conf = Self::default();
        let mut current: Option<usize> = None;
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }
            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                let name = trimmed[1..trimmed.len() - 1].trim();
                current = Some(conf.section_index(name));
                continue;
            }
            let Some(idx) = current else {
                continue;
            };
            let indented = line.starts_with(' ') || line.starts_with('\t');
            if indented {
                if let Some((_, value)) = conf.sections[idx].entries.last_mut() {
                    value.push('\n');
                    value.push_str(trimmed);
                    continue;
                }
            }
            let split = trimmed.find(['=', ':']).map(|pos| trimmed.split_at(pos));
            if let Some((key, value)) = split {
                conf.sections[idx]
                    .entries
                    .push((key.trim().to_string(), value[1..].trim().to_string()));
            }
        }
        conf
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        let wanted = normalize_key(key);
        self.sections
            .iter()
            .filter(|s| s.name == section)
            .flat_map(|s| s.entries.iter())
            .filter(|(k, _)| normalize_key(k) == wanted)
            .map(|(_, v)| v.as_str())
            .last()
    }

    /// Sets `key` in `section`, dropping every spelling variant of it.
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        let wanted = normalize_key(key);
        let idx = self.section_index(section);
        let entries = &mut self.sections[idx].entries;
        let position = entries.iter().position(|(k, _)| normalize_key(k) == wanted);
        entries.retain(|(k, _)| normalize_key(k) != wanted);
        let entry = (key.to_string(), value.to_string());
        match position {
            Some(pos) => entries.insert(pos.min(entries.len()), entry),
            None => entries.push(entry),
        }
    }

    /// The index pip will use: `[global]` beats `[install]`, which beats
    /// `fallback`.
    pub fn effective_index_url<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.get("global", INDEX_KEY)
            .or_else(|| self.get("install", INDEX_KEY))
            .unwrap_or(fallback)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("[{}]\n", section.name));
            for (key, value) in &section.entries {
                let value = value.replace('\n', "\n    ");
                out.push_str(&format!("{key} = {value}\n"));
            }
        }
        out
    }

    fn section_index(&mut self, name: &str) -> usize {
        if let Some(idx) = self.sections.iter().position(|s| s.name == name) {
            return idx;
        }
        let section = Section {
            name: name.to_string(),
            entries: Vec::new(),
        };
        if name == "global" {
            self.sections.insert(0, section);
            0
        } else {
            self.sections.push(section);
            self.sections.len() - 1
        }
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase().replace('_', "-")
}

/// Renders the pip configuration written into a virtual environment.
///
/// `extra` is user-supplied INI text; the result carries exactly one index
/// key in `[global]`, holding the effective index, and `find_links` when a
/// wheelhouse is in use.
pub fn configure_pipconf(extra: &str, default_index: &str, find_links: Option<&str>) -> String {
    let mut conf = PipConf::parse(extra);
    let index = conf.effective_index_url(default_index).to_string();
    conf.set("global", INDEX_KEY, &index);
    if let Some(links) = find_links {
        if conf.get("global", FIND_LINKS_KEY).is_none() {
            conf.set("global", FIND_LINKS_KEY, links);
        }
    }
    conf.render()
}
