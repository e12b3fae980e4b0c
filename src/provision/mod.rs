//! Provisioning steps and the installer capability they run through.
//!
//! A [`ProvisionStep`] pairs a log-friendly name with a [`StepAction`]. The
//! action is either a raw shell command or a structured install directive;
//! an [`Installer`] turns directives into remote work. Idempotence belongs
//! to the installer primitives, never to the pipeline.

use std::fmt;

use tracing::debug;

use crate::session::{CommandRunner, RemoteSession, RunOptions, SessionError};

mod commands;

pub use commands::{
    enable_repository_command, import_key_command, install_packages_command,
    install_remote_package_command, restart_service_command, upgrade_system_command,
};

/// Signing key for an APT repository.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AptKey {
    /// Key fetched from a keyserver by identifier.
    Keyserver {
        /// Keyserver URL, for example `hkp://keyserver.ubuntu.com:80`.
        server: String,
        /// Key identifier.
        id: String,
    },
    /// Armoured key downloaded from a URL.
    Url(String),
}

/// An APT source line plus the key that signs it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AptRepository {
    /// Source type, normally `deb`.
    pub kind: String,
    /// Archive URL.
    pub url: String,
    /// Suite; may be a shell expression expanded remotely.
    pub suite: String,
    /// Archive components.
    pub components: Vec<String>,
    /// Name of the file under `/etc/apt/sources.list.d` (without `.list`).
    pub list_name: String,
    /// Signing key to import first, if any.
    pub key: Option<AptKey>,
}

/// A package installed from a downloaded `.deb` at a pinned version.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemotePackage {
    /// Package name as known to `dpkg`.
    pub name: String,
    /// Version that must be present.
    pub version: String,
    /// Download URL of the `.deb`.
    pub url: String,
}

/// Work performed by a provisioning step.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StepAction {
    /// Arbitrary shell. The command itself must be safe to re-run.
    Shell {
        /// Command line executed on the remote host.
        command: String,
        /// Whether to run through `sudo`.
        privileged: bool,
    },
    /// Add an APT repository (and its key) and refresh the index.
    EnableRepository(AptRepository),
    /// Refresh the index and apply all pending upgrades.
    UpgradeSystem,
    /// Install a set of packages from configured repositories.
    InstallPackages(Vec<String>),
    /// Install a pinned `.deb` from a URL.
    InstallRemotePackage(RemotePackage),
    /// Stop (ignoring failure) and start a system service.
    RestartService(String),
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shell { command, .. } => write!(f, "shell `{command}`"),
            Self::EnableRepository(repository) => {
                write!(f, "enable repository {}", repository.url)
            }
            Self::UpgradeSystem => f.write_str("upgrade system packages"),
            Self::InstallPackages(packages) => {
                write!(f, "install packages {}", packages.join(" "))
            }
            Self::InstallRemotePackage(package) => {
                write!(f, "install {} {}", package.name, package.version)
            }
            Self::RestartService(service) => write!(f, "restart service {service}"),
        }
    }
}

/// A named, ordered unit of provisioning work.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionStep {
    name: String,
    action: StepAction,
}

impl ProvisionStep {
    /// Creates a step.
    #[must_use]
    pub fn new(name: impl Into<String>, action: StepAction) -> Self {
        Self {
            name: name.into(),
            action,
        }
    }

    /// Step name used in logs and errors.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Action performed by the step.
    #[must_use]
    pub const fn action(&self) -> &StepAction {
        &self.action
    }

    /// Applies the step through `installer`.
    ///
    /// # Errors
    ///
    /// Propagates the installer's [`SessionError`].
    pub fn apply<I: Installer + ?Sized>(&self, installer: &I) -> Result<(), SessionError> {
        debug!(step = %self.name, action = %self.action, "applying step");
        match &self.action {
            StepAction::Shell {
                command,
                privileged,
            } => installer.run_shell(command, *privileged),
            StepAction::EnableRepository(repository) => installer.enable_repository(repository),
            StepAction::UpgradeSystem => installer.upgrade_system(),
            StepAction::InstallPackages(packages) => installer.install_packages(packages),
            StepAction::InstallRemotePackage(package) => installer.install_remote_package(package),
            StepAction::RestartService(service) => installer.restart_service(service),
        }
    }
}

/// Idempotent install primitives.
///
/// Re-applying any method against a host where it already took effect must
/// succeed without changing anything.
pub trait Installer {
    /// Runs a shell command, optionally as root.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the command fails.
    fn run_shell(&self, command: &str, privileged: bool) -> Result<(), SessionError>;

    /// Imports the repository key, adds the source line, refreshes the index.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when any of the commands fail.
    fn enable_repository(&self, repository: &AptRepository) -> Result<(), SessionError>;

    /// Applies all pending package upgrades.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the upgrade fails.
    fn upgrade_system(&self) -> Result<(), SessionError>;

    /// Installs `packages`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the package manager fails.
    fn install_packages(&self, packages: &[String]) -> Result<(), SessionError>;

    /// Installs a pinned `.deb` unless that version is present.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the download or install fails.
    fn install_remote_package(&self, package: &RemotePackage) -> Result<(), SessionError>;

    /// Restarts `service`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the service fails to start.
    fn restart_service(&self, service: &str) -> Result<(), SessionError>;
}

impl<R: CommandRunner> Installer for RemoteSession<R> {
    fn run_shell(&self, command: &str, privileged: bool) -> Result<(), SessionError> {
        if privileged {
            self.run_privileged(command, RunOptions::default())?;
        } else {
            self.run(command, RunOptions::default())?;
        }
        Ok(())
    }

    fn enable_repository(&self, repository: &AptRepository) -> Result<(), SessionError> {
        if let Some(key) = &repository.key {
            self.run_privileged(&import_key_command(key), RunOptions::default())?;
        }
        self.run_privileged(
            &enable_repository_command(repository),
            RunOptions::default(),
        )?;
        Ok(())
    }

    fn upgrade_system(&self) -> Result<(), SessionError> {
        self.run_privileged(&upgrade_system_command(), RunOptions::default())?;
        Ok(())
    }

    fn install_packages(&self, packages: &[String]) -> Result<(), SessionError> {
        if packages.is_empty() {
            return Ok(());
        }
        self.run_privileged(&install_packages_command(packages), RunOptions::default())?;
        Ok(())
    }

    fn install_remote_package(&self, package: &RemotePackage) -> Result<(), SessionError> {
        self.run_privileged(
            &install_remote_package_command(package),
            RunOptions::default(),
        )?;
        Ok(())
    }

    fn restart_service(&self, service: &str) -> Result<(), SessionError> {
        self.run_privileged(&restart_service_command(service), RunOptions::default())?;
        Ok(())
    }
}
