use std::str::FromStr;

use anyhow::{anyhow, Result};
use pep440_rs::Version;

pub fn parse_version(raw: &str) -> Result<Version> {
    Version::from_str(raw.trim()).map_err(|err| anyhow!("invalid version `{raw}`: {err}"))
}

/// A requested interpreter version such as `3.9` or `3.11.4`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PythonVersion {
    raw: String,
    release: Vec<u64>,
}

impl PythonVersion {
    pub fn parse(raw: &str) -> Result<Self> {
        let version = parse_version(raw)?;
        let release = version.release().to_vec();
        if release.len() < 2 {
            return Err(anyhow!(
                "python version `{raw}` must name at least MAJOR.MINOR"
            ));
        }
        Ok(Self {
            raw: raw.trim().to_string(),
            release,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether a full version reported by an interpreter (e.g. `3.9.18`)
    /// satisfies this request.
    pub fn accepts(&self, reported: &str) -> bool {
        parse_version(reported).is_ok_and(|version| version.release().starts_with(&self.release))
    }
}

/// Checks the output of `python --version` ("Python 3.9.18") against a
/// requested version.
pub fn reported_version_matches(requested: &str, output: &str) -> bool {
    let Ok(requested) = PythonVersion::parse(requested) else {
        return false;
    };
    output
        .split_whitespace()
        .find(|token| token.starts_with(|ch: char| ch.is_ascii_digit()))
        .is_some_and(|token| requested.accepts(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_matching_patch_releases() {
        let requested = PythonVersion::parse("3.9").unwrap();
        assert!(requested.accepts("3.9.18"));
        assert!(!requested.accepts("3.10.1"));
        assert!(!requested.accepts("3.1"));
    }

    #[test]
    fn rejects_bare_major() {
        assert!(PythonVersion::parse("3").is_err());
        assert!(PythonVersion::parse("three").is_err());
    }

    #[test]
    fn matches_interpreter_banner() {
        assert!(reported_version_matches("3.9", "Python 3.9.18\n"));
        assert!(!reported_version_matches("3.9", "Python 3.11.2"));
        assert!(!reported_version_matches("3.9", ""));
    }
}
