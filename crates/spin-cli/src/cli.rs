use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

pub const SPIN_HELP_TEMPLATE: &str =
    "{before-help}\nUsage:\n    {usage}\n\n{subcommands}\n\nGlobal options:\n{options}\n";

pub const SPIN_BEFORE_HELP: &str = concat!(
    "spin ",
    env!("CARGO_PKG_VERSION"),
    " – Python toolchain plugins for the spin task runner\n\n",
    "\x1b[1;36mEnvironment\x1b[0m\n",
    "  --provision      Build the interpreter and the project's virtual environment.\n",
    "  --cleanup        Remove the virtual environment before anything else runs.\n",
    "  env              Print the command that activates the environment.\n\n",
    "\x1b[1;36mTests\x1b[0m\n",
    "  pytest / behave / playwright   Run a suite inside the environment.\n",
);

#[derive(Parser, Debug)]
#[command(
    name = "spin",
    author,
    version,
    disable_help_subcommand = true,
    before_help = SPIN_BEFORE_HELP,
    help_template = SPIN_HELP_TEMPLATE
)]
#[allow(clippy::struct_excessive_bools)]
pub struct SpinCli {
    #[arg(
        short = 'C',
        long = "directory",
        value_name = "DIR",
        default_value = ".",
        help = "Run as if spin was started in DIR",
        global = true
    )]
    pub directory: PathBuf,
    #[arg(
        short = 'f',
        long = "file",
        value_name = "SPINFILE",
        help = "Use SPINFILE instead of spinfile.toml; its directory is the project root",
        global = true
    )]
    pub spinfile: Option<PathBuf>,
    #[arg(
        short = 'p',
        long = "prop",
        value_name = "KEY=VALUE",
        action = ArgAction::Append,
        help = "Override an option, e.g. -p python.version=3.11 (lists split on commas)",
        global = true
    )]
    pub properties: Vec<String>,
    #[arg(
        long,
        env = "SPIN_DATA",
        value_name = "DIR",
        help = "Directory for interpreters and caches shared by all projects [default: ~/.spin]",
        global = true
    )]
    pub data_dir: Option<PathBuf>,
    #[arg(
        short,
        long,
        help = "Less output from spin and the tools it runs",
        global = true
    )]
    pub quiet: bool,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)", global = true)]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[arg(long, help = "Provision the environment before running the task", global = true)]
    pub provision: bool,
    #[arg(long, help = "Remove the environment before running the task", global = true)]
    pub cleanup: bool,
    #[arg(
        long,
        help = "Emit {task,status,code,message,details} JSON envelopes",
        global = true
    )]
    pub json: bool,
    #[arg(long, help = "Disable colored human output", global = true)]
    pub no_color: bool,
    #[command(subcommand)]
    pub command: SpinCommand,
}

#[derive(Subcommand, Debug)]
pub enum SpinCommand {
    #[command(about = "Run the environment's Python interpreter")]
    Python(PassthroughArgs),
    #[command(name = "python:wheel", about = "Build a wheel of the current project")]
    PythonWheel,
    #[command(
        name = "python:upgrade",
        about = "Upgrade locked packages (all when none are named); needs the piptools plugin"
    )]
    PythonUpgrade(PackagesArgs),
    #[command(
        name = "python:wheelhouse",
        about = "Download the locked packages into the wheelhouse; needs the piptools plugin"
    )]
    PythonWheelhouse,
    #[command(about = "Print the command that activates the environment")]
    Env,
    #[command(about = "Run the pytest suite")]
    Pytest(SuiteArgs),
    #[command(about = "Run the behave acceptance tests")]
    Behave(SuiteArgs),
    #[command(about = "Run the end-to-end tests with playwright")]
    Playwright(PlaywrightArgs),
    #[command(about = "Maintainability index of Python files")]
    Radon(RadonArgs),
    #[command(about = "Run devpi-client inside the environment")]
    Devpi(PassthroughArgs),
    #[command(name = "devpi:upload", about = "Build and upload the project to devpi")]
    DevpiUpload,
    #[command(
        name = "system-provision",
        about = "Print the commands that install Python's build requirements"
    )]
    SystemProvision(SystemProvisionArgs),
    #[command(about = "Provision the environment and stop")]
    Provision,
    #[command(about = "Remove the environment and stop")]
    Cleanup,
}

#[derive(Args, Debug)]
pub struct PassthroughArgs {
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct PackagesArgs {
    #[arg(value_name = "PACKAGE")]
    pub packages: Vec<String>,
}

#[derive(Args, Debug)]
pub struct SuiteArgs {
    #[arg(short, long, value_name = "DIR", help = "Instance directory exported as CADDOK_BASE")]
    pub instance: Option<PathBuf>,
    #[arg(short, long, help = "Collect coverage")]
    pub coverage: bool,
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct PlaywrightArgs {
    #[command(flatten)]
    pub suite: SuiteArgs,
    #[arg(long, help = "Wait for a debugger to attach before running")]
    pub debug: bool,
    #[arg(long, help = "Write a JUnit report to playwright.test_report")]
    pub with_test_report: bool,
}

#[derive(Args, Debug)]
pub struct RadonArgs {
    #[arg(long, help = "Check everything below src and tests")]
    pub all: bool,
    #[arg(value_name = "FILE")]
    pub files: Vec<String>,
}

#[derive(Args, Debug)]
pub struct SystemProvisionArgs {
    #[arg(value_name = "DISTRO", help = "e.g. debian, ubuntu, fedora, centos, darwin, opensuse-leap")]
    pub distro: String,
    #[arg(value_name = "VERSION")]
    pub version: Option<String>,
}
