//! Remote command execution over the system `ssh` client.
//!
//! A [`RemoteSession`] owns the connection to one host for the duration of a
//! task. Commands run synchronously, one at a time; the calling thread blocks
//! until the remote side reports an exit status. Sessions are closed
//! explicitly via [`Connection::close`] and again on drop, so teardown happens
//! on every exit path.

use std::ffi::OsString;

use shell_escape::unix::escape;
use tracing::{debug, info, warn};

mod config;
mod types;
mod util;

pub use config::{ConfigError, DEFAULT_CONTROL_PATH, SessionConfig, SessionError};
pub use types::{CommandOutput, CommandRunner, ProcessCommandRunner, RemoteCommandOutput, RunOptions};
pub use util::expand_tilde;

/// Exit status the OpenSSH client reserves for its own failures.
pub const SSH_CONNECTION_FAILURE: i32 = 255;

/// Lifecycle shared by real and in-memory sessions.
pub trait Connection {
    /// Host the session is connected to.
    fn host(&self) -> &str;

    /// Releases the connection. Calling it more than once is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the transport fails to shut down.
    fn close(&mut self) -> Result<(), SessionError>;
}

/// An authenticated command channel to a single host.
#[derive(Debug)]
pub struct RemoteSession<R: CommandRunner> {
    host: String,
    config: SessionConfig,
    runner: R,
    closed: bool,
}

impl RemoteSession<ProcessCommandRunner> {
    /// Connects using the real ssh client.
    ///
    /// # Errors
    ///
    /// See [`RemoteSession::connect`].
    pub fn connect_with_process_runner(
        host: &str,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        Self::connect(host, config, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> RemoteSession<R> {
    /// Validates `config` and probes `host` so that unreachable hosts and
    /// authentication failures surface before any step runs.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] for bad configuration and
    /// [`SessionError::Connection`] when the probe cannot reach the host.
    pub fn connect(host: &str, config: SessionConfig, runner: R) -> Result<Self, SessionError> {
        config.validate()?;
        if host.trim().is_empty() {
            return Err(SessionError::Connection {
                host: host.to_owned(),
                message: String::from("no host given; pass -H <host> or set MESOBOX_HOST"),
            });
        }

        let session = Self {
            host: host.trim().to_owned(),
            config,
            runner,
            closed: false,
        };

        debug!(host = %session.host, "probing ssh connectivity");
        let probe = session.execute("true").map_err(|err| match err {
            SessionError::Spawn { message, .. } => SessionError::Connection {
                host: session.host.clone(),
                message,
            },
            other => other,
        })?;
        if !probe.is_success() {
            return Err(SessionError::Connection {
                host: session.host.clone(),
                message: format!(
                    "connectivity probe exited with status {}: {}",
                    probe.exit_code,
                    probe.stderr.trim()
                ),
            });
        }
        info!(host = %session.host, user = %session.config.user, "connected");
        Ok(session)
    }

    /// Returns `true` once [`Connection::close`] has run.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Runs `command` in the remote user's shell.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connection`] when ssh itself fails,
    /// [`SessionError::CommandFailed`] on a non-zero exit unless
    /// `options.tolerant` is set, and [`SessionError::Closed`] after close.
    pub fn run(
        &self,
        command: &str,
        options: RunOptions,
    ) -> Result<RemoteCommandOutput, SessionError> {
        self.ensure_open()?;
        if options.hide_output {
            debug!(host = %self.host, command, "run");
        } else {
            info!(host = %self.host, command, "run");
        }

        let output = self.execute(command)?;
        if !options.hide_output {
            for line in output.stdout.lines() {
                info!(host = %self.host, "out: {line}");
            }
        }

        if output.is_success() || options.tolerant {
            return Ok(output);
        }
        Err(SessionError::command_failed(
            command,
            Some(output.exit_code),
            &output.stderr,
        ))
    }

    /// Runs `command` through `sudo` in a fresh POSIX shell.
    ///
    /// # Errors
    ///
    /// Same as [`RemoteSession::run`].
    pub fn run_privileged(
        &self,
        command: &str,
        options: RunOptions,
    ) -> Result<RemoteCommandOutput, SessionError> {
        self.run(&privileged_command(command), options)
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed {
                host: self.host.clone(),
            });
        }
        Ok(())
    }

    fn execute(&self, command: &str) -> Result<RemoteCommandOutput, SessionError> {
        let args = self.build_ssh_args(command);
        let output = self.runner.run(&self.config.bin, &args)?;
        match output.code {
            Some(SSH_CONNECTION_FAILURE) => Err(SessionError::Connection {
                host: self.host.clone(),
                message: output.stderr.trim().to_owned(),
            }),
            Some(exit_code) => Ok(RemoteCommandOutput {
                exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            }),
            None => Err(SessionError::Connection {
                host: self.host.clone(),
                message: format!("{} terminated without an exit status", self.config.bin),
            }),
        }
    }

    fn build_ssh_args(&self, remote_command: &str) -> Vec<OsString> {
        let mut args = self.common_ssh_options();
        if !self.config.eager_disconnect {
            args.extend(self.control_master_options());
        }
        args.push(OsString::from(self.destination()));
        args.push(OsString::from(remote_command));
        args
    }

    fn build_exit_args(&self) -> Vec<OsString> {
        let mut args = self.common_ssh_options();
        args.extend(self.control_master_options());
        args.push(OsString::from("-O"));
        args.push(OsString::from("exit"));
        args.push(OsString::from(self.destination()));
        args
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.config.user, self.host)
    }

    fn common_ssh_options(&self) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-p"),
            OsString::from(self.config.port.to_string()),
        ];

        if !self.config.use_ssh_config {
            args.push(OsString::from("-F"));
            args.push(OsString::from("/dev/null"));
        }

        if let Some(ref identity_file) = self.config.identity_file {
            args.push(OsString::from("-i"));
            args.push(OsString::from(expand_tilde(identity_file)));
        }

        if self.config.batch_mode {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.config.strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.config.known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.config.known_hosts_file
            )));
        }

        args.push(OsString::from("-o"));
        args.push(OsString::from(format!(
            "ConnectionAttempts={}",
            self.config.connection_attempts
        )));
        args
    }

    fn control_master_options(&self) -> Vec<OsString> {
        vec![
            OsString::from("-o"),
            OsString::from("ControlMaster=auto"),
            OsString::from("-o"),
            OsString::from(format!(
                "ControlPath={}",
                expand_tilde(&self.config.control_path)
            )),
            OsString::from("-o"),
            OsString::from("ControlPersist=yes"),
        ]
    }
}

impl<R: CommandRunner> Connection for RemoteSession<R> {
    fn host(&self) -> &str {
        &self.host
    }

    fn close(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.config.eager_disconnect {
            debug!(host = %self.host, "session closed");
            return Ok(());
        }

        let output = self.runner.run(&self.config.bin, &self.build_exit_args())?;
        if output.is_success() {
            debug!(host = %self.host, "control master stopped");
            return Ok(());
        }
        Err(SessionError::Connection {
            host: self.host.clone(),
            message: format!("failed to stop control master: {}", output.stderr.trim()),
        })
    }
}

impl<R: CommandRunner> Drop for RemoteSession<R> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(host = %self.host, error = %err, "failed to close session");
        }
    }
}

/// Wraps `command` so it runs as root in a non-login POSIX shell.
#[must_use]
pub fn privileged_command(command: &str) -> String {
    format!("sudo -n sh -c {}", escape(command.into()))
}

#[cfg(test)]
mod tests;
