//! Binary entry point for the `mesobox` CLI.

mod cli;

use std::env;
use std::ffi::OsString;
use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use mesobox::{Distribution, SessionConfig, SshConnector, StateStore, TaskError, TaskRunner};

use cli::{Cli, Command};

const USAGE: &str = "\
usage: mesobox -H <hostname> -i <path-to-private-key> <task>[:arguments]

  # shows this page
  $ mesobox help

  # does the whole thing in one go
  $ mesobox it:distribution=ubuntu14.04

  # installs packages on an existing instance
  $ mesobox bootstrap:distribution=ubuntu14.04

  # run acceptance tests against an existing instance
  $ mesobox tests:distribution=ubuntu14.04

metadata state is stored locally in state.json.";

/// Task names accepted in the `task:key=value` form.
const TASKS: [&str; 4] = ["help", "it", "bootstrap", "tests"];

/// Task argument assumed when a value is given without a key.
const DEFAULT_TASK_ARGUMENT: &str = "distribution";

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Task(#[from] TaskError),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 1,
            Self::Task(err) => err.exit_code(),
        }
    }
}

fn main() {
    let cli = Cli::parse_from(normalize_task_args(env::args_os()));
    init_logging(cli.verbose);

    let exit_code = match dispatch(cli) {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            err.exit_code()
        }
    };

    process::exit(exit_code);
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // A subscriber installed earlier keeps precedence.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}

fn dispatch(cli: Cli) -> Result<(), CliError> {
    let Some(command) = cli.command else {
        return print_usage();
    };

    let (task, distribution) = match command {
        Command::Help => return print_usage(),
        Command::It(args) => ("it", args.distribution),
        Command::Bootstrap(args) => ("bootstrap", args.distribution),
        Command::Tests(args) => ("tests", args.distribution),
    };

    // Configuration problems must not mask an unknown distribution.
    let target: Distribution = distribution.parse().map_err(TaskError::from)?;

    let mut config =
        SessionConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    if let Some(identity_file) = cli.identity_file {
        config.identity_file = Some(identity_file);
    }
    let state = cli.state_file.map_or_else(StateStore::default, StateStore::new);
    debug!(task, distribution = %target, state_file = %state.path(), "dispatching");

    let runner = TaskRunner::new(SshConnector::new(cli.host, config), state);
    let report = match task {
        "it" => runner.it(target.identifier()),
        "bootstrap" => runner.bootstrap(target.identifier()),
        _ => runner.tests(target.identifier()),
    }?;

    writeln!(
        io::stdout(),
        "{task} passed: {} steps applied, {} checks verified",
        report.steps.len(),
        report.assertions_verified
    )
    .ok();
    Ok(())
}

fn print_usage() -> Result<(), CliError> {
    writeln!(io::stdout(), "{USAGE}").ok();
    Ok(())
}

/// Rewrites `task:key=value,...` arguments into clap's
/// `task --key value ...` form. Other arguments pass through untouched.
fn normalize_task_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut normalized = Vec::new();
    for arg in args {
        match arg.to_str().and_then(split_task_arg) {
            Some((task, params)) => {
                normalized.push(OsString::from(task));
                normalized.extend(task_params(params));
            }
            None => normalized.push(arg),
        }
    }
    normalized
}

fn split_task_arg(arg: &str) -> Option<(&str, &str)> {
    let (task, params) = arg.split_once(':')?;
    TASKS.contains(&task).then_some((task, params))
}

fn task_params(params: &str) -> Vec<OsString> {
    let mut rendered = Vec::new();
    for param in params.split(',').filter(|param| !param.is_empty()) {
        let (key, value) = param
            .split_once('=')
            .unwrap_or((DEFAULT_TASK_ARGUMENT, param));
        rendered.push(OsString::from(format!("--{}", key.replace('_', "-"))));
        rendered.push(OsString::from(value));
    }
    rendered
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "error: {err}").ok();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
