//! Read-only health checks against a provisioned host.
//!
//! [`HealthChecker`] is the capability the pipeline verifies through. The
//! [`RemoteSession`] implementation queries the Debian package database, the
//! socket table (`ss`), and the process table (`ps`). A `false` answer is a
//! normal result; only transport failures are errors.

use std::fmt;

use shell_escape::unix::escape;

use crate::session::{CommandRunner, RemoteSession, RunOptions, SessionError};

mod parse;

pub use parse::{dpkg_status_installed, ps_lists_process, ss_command, ss_lists_port};

/// Transport protocol of a listening socket.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Protocol {
    /// Stream sockets.
    Tcp,
    /// Datagram sockets.
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            Self::Udp => f.write_str("udp"),
        }
    }
}

/// Predicates over remote runtime state.
///
/// Implementations must not change remote state.
pub trait HealthChecker {
    /// Reports whether package `name` is installed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the query cannot be executed.
    fn package_installed(&self, name: &str) -> Result<bool, SessionError>;

    /// Reports whether a socket is listening on `port` for `protocol`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the query cannot be executed.
    fn port_listening(&self, port: u16, protocol: Protocol) -> Result<bool, SessionError>;

    /// Reports whether a process called `name` is running.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the query cannot be executed.
    fn process_running(&self, name: &str) -> Result<bool, SessionError>;

    /// Runs a read-only `command` and reports whether its combined output
    /// contains `substring`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::CommandFailed`] when the command exits
    /// non-zero, or any transport error.
    fn command_output_contains(
        &self,
        command: &str,
        substring: &str,
        privileged: bool,
    ) -> Result<bool, SessionError>;
}

impl<R: CommandRunner> HealthChecker for RemoteSession<R> {
    fn package_installed(&self, name: &str) -> Result<bool, SessionError> {
        let command = format!(
            "dpkg-query -W -f='${{Status}}\\n' {} 2>/dev/null",
            escape(name.into())
        );
        let output = self.run(&command, RunOptions::PROBE)?;
        Ok(output.is_success() && dpkg_status_installed(&output.stdout))
    }

    fn port_listening(&self, port: u16, protocol: Protocol) -> Result<bool, SessionError> {
        let output = self.run(ss_command(protocol), RunOptions::default().hidden())?;
        Ok(ss_lists_port(&output.stdout, port))
    }

    fn process_running(&self, name: &str) -> Result<bool, SessionError> {
        let output = self.run("ps -A -o comm=", RunOptions::default().hidden())?;
        Ok(ps_lists_process(&output.stdout, name))
    }

    fn command_output_contains(
        &self,
        command: &str,
        substring: &str,
        privileged: bool,
    ) -> Result<bool, SessionError> {
        let options = RunOptions::default().hidden();
        let output = if privileged {
            self.run_privileged(command, options)?
        } else {
            self.run(command, options)?
        };
        Ok(output.combined().contains(substring))
    }
}
