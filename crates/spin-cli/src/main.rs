use atty::Stream;
use clap::Parser;
use color_eyre::Result;
use serde_json::Value;
use spin_core::{
    BehaveRequest, ExecutionOutcome, GlobalOptions, Invocation, PlaywrightRequest, PytestRequest,
    TaskRequest,
};
use tracing_subscriber::EnvFilter;

mod cli;
mod style;

use cli::{SpinCli, SpinCommand, SuiteArgs};
use style::Style;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = SpinCli::parse();
    init_tracing(cli.trace, cli.quiet, cli.verbose);

    let global = GlobalOptions {
        quiet: cli.quiet,
        verbose: cli.verbose,
        trace: cli.trace,
        json: cli.json,
        provision: cli.provision,
        cleanup: cli.cleanup,
    };

    let invocation = Invocation {
        directory: cli.directory.clone(),
        spinfile: cli.spinfile.clone(),
        properties: cli.properties.clone(),
        data_dir: cli.data_dir.clone(),
        task: build_task(&cli.command),
    };
    let outcome = spin_core::execute(&global, &invocation);
    let code = emit_output(&cli, &invocation.task, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

/// Logs go to stderr so that `eval "$(spin env)"` only sees the command.
/// `SPIN_LOG` takes a full filter directive and wins over the flags.
fn init_tracing(trace: bool, quiet: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_env("SPIN_LOG")
        .unwrap_or_else(|_| EnvFilter::new(format!("spin_core={level},spin_cli={level}")));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn emit_output(cli: &SpinCli, task: &TaskRequest, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = outcome.exit_code();
    let style = Style::new(cli.no_color, atty::is(Stream::Stdout));

    if cli.json {
        let payload = spin_core::to_json_response(task.name(), outcome, code);
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if outcome.is_passthrough() {
        // meant for the shell, printed even with -q
        println!("{}", outcome.message);
    } else if outcome.is_streamed() {
        // the tool already talked to the terminal
        if code != 0 && !cli.quiet {
            eprintln!("{}", style.status(&outcome.status, &outcome.message));
        }
    } else if !cli.quiet || code != 0 {
        println!("{}", style.status(&outcome.status, &outcome.message));
        if let Some(hint) = hint_from_details(&outcome.details) {
            println!("{}", style.info(&format!("Hint: {hint}")));
        }
    }

    Ok(code)
}

fn hint_from_details(details: &Value) -> Option<&str> {
    details
        .as_object()
        .and_then(|map| map.get("hint"))
        .and_then(Value::as_str)
}

fn suite(args: &SuiteArgs) -> PytestRequest {
    PytestRequest {
        instance: args.instance.clone(),
        coverage: args.coverage,
        args: args.args.clone(),
    }
}

fn build_task(command: &SpinCommand) -> TaskRequest {
    match command {
        SpinCommand::Python(args) => TaskRequest::Python {
            args: args.args.clone(),
        },
        SpinCommand::PythonWheel => TaskRequest::Wheel,
        SpinCommand::PythonUpgrade(args) => TaskRequest::Upgrade {
            packages: args.packages.clone(),
        },
        SpinCommand::PythonWheelhouse => TaskRequest::Wheelhouse,
        SpinCommand::Env => TaskRequest::Env,
        SpinCommand::Pytest(args) => TaskRequest::Pytest(suite(args)),
        SpinCommand::Behave(args) => TaskRequest::Behave(BehaveRequest {
            instance: args.instance.clone(),
            coverage: args.coverage,
            args: args.args.clone(),
        }),
        SpinCommand::Playwright(args) => TaskRequest::Playwright(PlaywrightRequest {
            instance: args.suite.instance.clone(),
            coverage: args.suite.coverage,
            debug: args.debug,
            with_test_report: args.with_test_report,
            args: args.suite.args.clone(),
        }),
        SpinCommand::Radon(args) => TaskRequest::Radon {
            all: args.all,
            files: args.files.clone(),
        },
        SpinCommand::Devpi(args) => TaskRequest::Devpi {
            args: args.args.clone(),
        },
        SpinCommand::DevpiUpload => TaskRequest::DevpiUpload,
        SpinCommand::SystemProvision(args) => TaskRequest::SystemProvision {
            distro: args.distro.clone(),
            version: args.version.clone(),
        },
        SpinCommand::Provision => TaskRequest::Provision,
        SpinCommand::Cleanup => TaskRequest::Cleanup,
    }
}
