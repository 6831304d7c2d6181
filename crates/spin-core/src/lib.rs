#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod activate;
mod context;
pub mod effects;
mod env;
mod error;
mod lifecycle;
pub mod memo;
mod outcome;
mod plugins;
mod process;
mod provision;
mod shell;
#[cfg(test)]
mod testing;

pub use crate::context::{CommandContext, GlobalOptions};
pub use crate::effects::{SharedEffects, SystemEffects};
pub use crate::error::{CommandFailed, ConsistencyError, UserError};
pub use crate::lifecycle::{
    builtin_config, default_data_dir, execute, execute_with_effects, prepare, Invocation,
    TaskRequest, SPINFILE,
};
pub use crate::outcome::{to_json_response, CommandStatus, ExecutionOutcome};
pub use crate::plugins::{
    BehaveRequest, PlaywrightRequest, Plugin, PluginRegistry, PytestRequest, BUILTIN_PLUGINS,
};
pub use crate::process::RunOutput;
pub use crate::provision::{PiptoolsProvisioner, Provisioner, SimpleProvisioner};
