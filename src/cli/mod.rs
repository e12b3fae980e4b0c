//! Command-line interface definitions for the `mesobox` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser, Subcommand};

/// Top-level CLI for the `mesobox` binary.
#[derive(Debug, Parser)]
#[command(
    name = "mesobox",
    about = "Provision and verify a single-node Mesos host over SSH",
    disable_help_subcommand = true
)]
pub(crate) struct Cli {
    /// Target host, as accepted by ssh.
    #[arg(
        short = 'H',
        long,
        env = "MESOBOX_HOST",
        value_name = "HOST",
        global = true
    )]
    pub(crate) host: Option<String>,
    /// Private key used to authenticate.
    #[arg(short = 'i', long, value_name = "PATH", global = true)]
    pub(crate) identity_file: Option<String>,
    /// File recording the last task outcome per host [default: state.json].
    #[arg(long, env = "MESOBOX_STATE_FILE", value_name = "PATH", global = true)]
    pub(crate) state_file: Option<String>,
    /// Log remote command details.
    #[arg(short, long, global = true)]
    pub(crate) verbose: bool,
    /// Task to run; prints usage when omitted.
    #[command(subcommand)]
    pub(crate) command: Option<Command>,
}

/// Tasks understood by `mesobox`.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Print usage and exit.
    #[command(name = "help")]
    Help,
    /// Provision the host, then run the acceptance checks.
    #[command(name = "it")]
    It(DistributionArgs),
    /// Provision the host.
    #[command(name = "bootstrap")]
    Bootstrap(DistributionArgs),
    /// Run the acceptance checks.
    #[command(name = "tests")]
    Tests(DistributionArgs),
}

/// Arguments shared by every task.
#[derive(Debug, Args)]
pub(crate) struct DistributionArgs {
    /// Target distribution, for example `ubuntu14.04`.
    #[arg(long, value_name = "DISTRIBUTION")]
    pub(crate) distribution: String,
}
