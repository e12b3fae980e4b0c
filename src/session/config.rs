//! SSH session configuration and the errors raised by remote sessions.
//!
//! [`SessionConfig`] replaces ambient connection settings with an explicit
//! struct handed to [`super::RemoteSession::connect`]. Values are layered by
//! `ortho-config` from defaults, configuration files, and environment
//! variables.

use std::ffi::OsString;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default control socket path used when connections are shared.
pub const DEFAULT_CONTROL_PATH: &str = "~/.ssh/mesobox-%C";

/// Connection settings for the remote host.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "MESOBOX_SSH",
    discovery(
        app_name = "mesobox",
        env_var = "MESOBOX_CONFIG_PATH",
        config_file_name = "mesobox.toml",
        dotfile_name = ".mesobox.toml",
        project_file_name = "mesobox.toml"
    )
)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "ssh client toggles are naturally expressed as booleans"
)]
pub struct SessionConfig {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub bin: String,
    /// Remote user to connect as.
    #[ortho_config(default = "root".to_owned())]
    pub user: String,
    /// SSH port on the remote host.
    #[ortho_config(default = 22)]
    pub port: u16,
    /// Private key used for authentication. Supports `~/` expansion.
    pub identity_file: Option<String>,
    /// Whether to force batch mode so password prompts fail fast.
    #[ortho_config(default = true)]
    pub batch_mode: bool,
    /// Whether to verify host keys. Off by default: targets are disposable
    /// hosts that are rebuilt with fresh keys.
    #[ortho_config(default = false)]
    pub strict_host_key_checking: bool,
    /// Known hosts file; `/dev/null` keeps rebuilt hosts from clashing.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub known_hosts_file: String,
    /// Whether to honour the user's `~/.ssh/config`.
    #[ortho_config(default = false)]
    pub use_ssh_config: bool,
    /// Connection attempts handed to the ssh client (`ConnectionAttempts`).
    #[ortho_config(default = 5)]
    pub connection_attempts: u32,
    /// Open a fresh connection per command instead of sharing a control
    /// master for the lifetime of the session.
    #[ortho_config(default = true)]
    pub eager_disconnect: bool,
    /// Control socket path used when `eager_disconnect` is off.
    #[ortho_config(default = DEFAULT_CONTROL_PATH.to_owned())]
    pub control_path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bin: String::from("ssh"),
            user: String::from("root"),
            port: 22,
            identity_file: None,
            batch_mode: true,
            strict_host_key_checking: false,
            known_hosts_file: String::from("/dev/null"),
            use_ssh_config: false,
            connection_attempts: 5,
            eager_disconnect: true,
            control_path: DEFAULT_CONTROL_PATH.to_owned(),
        }
    }
}

/// Errors raised when loading the session configuration.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates that parsing or merging configuration layers failed.
    #[error("session configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

impl SessionConfig {
    /// Loads configuration from defaults, configuration files, and
    /// environment variables without parsing process arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("mesobox")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Ensures required values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] when a required field is empty
    /// or `connection_attempts` is zero.
    pub fn validate(&self) -> Result<(), SessionError> {
        Self::require_value(&self.bin, "bin")?;
        Self::require_value(&self.user, "user")?;
        Self::require_optional_value(self.identity_file.as_deref(), "identity_file")?;
        if self.connection_attempts == 0 {
            return Err(SessionError::InvalidConfig {
                field: String::from("connection_attempts"),
            });
        }
        if !self.eager_disconnect {
            Self::require_value(&self.control_path, "control_path")?;
        }
        Ok(())
    }

    fn require_optional_value(value: Option<&str>, field: &str) -> Result<(), SessionError> {
        match value {
            None => Ok(()),
            Some(v) if !v.trim().is_empty() => Ok(()),
            Some(_) => Err(SessionError::InvalidConfig {
                field: field.to_owned(),
            }),
        }
    }

    fn require_value(value: &str, field: &str) -> Result<(), SessionError> {
        Self::require_optional_value(Some(value), field)
    }
}

/// Errors surfaced while talking to the remote host.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SessionError {
    /// Raised when configuration is missing required values.
    #[error("missing {field}: set MESOBOX_SSH_{env_suffix} or add {field} to mesobox.toml", env_suffix = field.to_uppercase())]
    InvalidConfig {
        /// Configuration field that failed validation.
        field: String,
    },
    /// Raised when the local ssh client cannot be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the host cannot be reached or authentication fails.
    #[error("cannot connect to {host}: {message}")]
    Connection {
        /// Target host.
        host: String,
        /// Diagnostic reported by the ssh client.
        message: String,
    },
    /// Raised when a remote command exits non-zero and success was required.
    #[error("`{command}` exited with status {status_text}: {stderr}")]
    CommandFailed {
        /// Command as sent to the remote shell.
        command: String,
        /// Exit status, if the remote side reported one.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the remote command.
        stderr: String,
    },
    /// Raised when a command is issued on a session that was closed.
    #[error("session to {host} is closed")]
    Closed {
        /// Host of the closed session.
        host: String,
    },
}

impl SessionError {
    /// Builds a [`SessionError::CommandFailed`] from a command and its status.
    #[must_use]
    pub fn command_failed(command: &str, status: Option<i32>, stderr: &str) -> Self {
        let status_text = status.map_or_else(|| String::from("unknown"), |code| code.to_string());
        Self::CommandFailed {
            command: command.to_owned(),
            status,
            status_text,
            stderr: stderr.trim().to_owned(),
        }
    }
}
