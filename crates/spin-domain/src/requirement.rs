use std::fmt;
use std::str::FromStr;

use pep508_rs::{Requirement as PepRequirement, VersionOrUrl};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequirementKind {
    /// A PEP 508 name with optional extras, specifiers and markers.
    Named,
    /// `-e <path-or-url>`
    Editable,
    /// A directory, archive or `file:` URL on disk.
    Local,
    /// A direct reference to a remote URL.
    Url,
}

/// One requirement line as handed to the installer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Requirement {
    spec: String,
}

impl Requirement {
    pub fn new(spec: impl Into<String>) -> Self {
        Self {
            spec: spec.into().trim().to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.spec
    }

    pub fn kind(&self) -> RequirementKind {
        classify(&self.spec)
    }

    /// Editable and on-disk requirements cannot carry pinned hashes.
    pub fn is_editable_or_local(&self) -> bool {
        matches!(
            self.kind(),
            RequirementKind::Editable | RequirementKind::Local
        )
    }

    /// Normalized project name when the requirement is a PEP 508 one.
    pub fn name(&self) -> Option<String> {
        PepRequirement::from_str(&self.spec)
            .ok()
            .map(|req| req.name.to_string())
    }

    /// Whitespace-separated installer arguments (`-e .` becomes two).
    pub fn install_args(&self) -> Vec<String> {
        self.spec.split_whitespace().map(ToOwned::to_owned).collect()
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec)
    }
}

fn classify(spec: &str) -> RequirementKind {
    if spec.starts_with("-e ") || spec.starts_with("--editable") || spec == "-e" {
        return RequirementKind::Editable;
    }
    if let Ok(req) = PepRequirement::from_str(spec) {
        return match req.version_or_url {
            Some(VersionOrUrl::Url(url)) if url.to_string().starts_with("file:") => {
                RequirementKind::Local
            }
            Some(VersionOrUrl::Url(_)) => RequirementKind::Url,
            _ => RequirementKind::Named,
        };
    }
    if spec.starts_with("file:") || looks_like_path(spec) {
        RequirementKind::Local
    } else if spec.contains("://") {
        RequirementKind::Url
    } else {
        RequirementKind::Named
    }
}

fn looks_like_path(spec: &str) -> bool {
    spec.starts_with('.')
        || spec.starts_with('/')
        || spec.starts_with('~')
        || spec.contains('\\')
        || (spec.len() > 1 && spec.as_bytes()[1] == b':' && !spec.contains("://"))
        || [".whl", ".tar.gz", ".zip"]
            .iter()
            .any(|suffix| spec.ends_with(suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_requirement_strings() {
        let cases = [
            ("pytest", RequirementKind::Named),
            ("pytest-cov>=4; python_version >= '3.8'", RequirementKind::Named),
            ("-e .", RequirementKind::Editable),
            ("--editable ../lib", RequirementKind::Editable),
            ("./vendor/pkg", RequirementKind::Local),
            ("dist/pkg-1.0-py3-none-any.whl", RequirementKind::Local),
            ("pkg @ file:///srv/pkg", RequirementKind::Local),
            ("pkg @ https://example.invalid/pkg.tar.gz", RequirementKind::Url),
        ];
        for (spec, expected) in cases {
            assert_eq!(Requirement::new(spec).kind(), expected, "{spec}");
        }
    }

    #[test]
    fn editable_and_local_flagged() {
        assert!(Requirement::new("-e .").is_editable_or_local());
        assert!(Requirement::new("../sibling").is_editable_or_local());
        assert!(!Requirement::new("radon").is_editable_or_local());
    }

    #[test]
    fn install_args_split_on_whitespace() {
        assert_eq!(
            Requirement::new("  -e   .  ").install_args(),
            vec!["-e".to_string(), ".".to_string()]
        );
    }

    #[test]
    fn name_is_normalized() {
        assert_eq!(
            Requirement::new("Pytest_Cov[toml]>=4").name().as_deref(),
            Some("pytest-cov")
        );
        assert_eq!(Requirement::new("-e .").name(), None);
    }
}
