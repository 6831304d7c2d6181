#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod config;
pub mod pipconf;
pub mod platform;
pub mod requirement;
pub mod version;

pub use config::{load_spinfile, parse_spinfile, ConfigError, ConfigTree, ConfigValue};
pub use pipconf::{configure_pipconf, PipConf, DEFAULT_INDEX_URL};
pub use platform::Platform;
pub use requirement::{Requirement, RequirementKind};
pub use version::{parse_version, reported_version_matches, PythonVersion};
