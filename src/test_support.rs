//! Test doubles shared across unit and integration tests.
//!
//! [`ScriptedRunner`] stands in for the local `ssh` process, while
//! [`FakeHost`] implements the installer and health-check capabilities in
//! memory so pipelines and tasks run without a transport at all.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::ffi::OsString;
use std::rc::Rc;

use crate::checks::{HealthChecker, Protocol};
use crate::pipeline::Check;
use crate::provision::{AptRepository, Installer, RemotePackage, StepAction};
use crate::session::{CommandOutput, CommandRunner, Connection, SessionError};
use crate::state_store::{HostRecord, StateRecorder, StateStoreError};
use crate::tasks::Connector;

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<CommandOutput>>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }

    /// Returns the final argument, which is the remote command for ssh.
    #[must_use]
    pub fn remote_command(&self) -> Option<String> {
        self.args
            .last()
            .map(|arg| arg.to_string_lossy().into_owned())
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Pushes a successful exit status with empty output.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a specific exit code with empty output.
    pub fn push_exit_code(&self, code: i32) {
        self.push_output(Some(code), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes a response with no exit code to simulate abnormal termination.
    pub fn push_missing_exit_code(&self) {
        self.push_output(None, "", "");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SessionError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| SessionError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Interaction recorded by [`FakeHost`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HostCall {
    /// An installer primitive, described like its [`StepAction`].
    Provision(String),
    /// A health check, described like its [`Check`].
    Check(String),
    /// The session was closed.
    Close,
}

#[derive(Debug, Default)]
struct FakeHostState {
    healthy: bool,
    packages: BTreeMap<String, bool>,
    ports: BTreeMap<(u16, Protocol), bool>,
    processes: BTreeMap<String, bool>,
    outputs: BTreeMap<String, String>,
    failures: Vec<String>,
    calls: Vec<HostCall>,
}

/// In-memory host implementing [`Installer`], [`HealthChecker`], and
/// [`Connection`].
///
/// Clones share state, so a test can keep a handle while a connector hands
/// copies to the code under test.
#[derive(Clone, Debug, Default)]
pub struct FakeHost {
    state: Rc<RefCell<FakeHostState>>,
}

impl FakeHost {
    /// Host name reported by every fake session.
    pub const HOST: &'static str = "fake-host";

    /// Exit status reported by simulated failures.
    pub const FAILURE_STATUS: i32 = 100;

    /// A host where nothing is installed and every check answers `false`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A host where every check answers `true` unless overridden.
    #[must_use]
    pub fn healthy() -> Self {
        let host = Self::default();
        host.state.borrow_mut().healthy = true;
        host
    }

    /// Overrides whether `name` is reported as installed.
    pub fn set_package(&self, name: &str, installed: bool) {
        self.state
            .borrow_mut()
            .packages
            .insert(name.to_owned(), installed);
    }

    /// Overrides whether `port` is reported as listening.
    pub fn set_port(&self, port: u16, protocol: Protocol, listening: bool) {
        self.state
            .borrow_mut()
            .ports
            .insert((port, protocol), listening);
    }

    /// Overrides whether process `name` is reported as running.
    pub fn set_process(&self, name: &str, running: bool) {
        self.state
            .borrow_mut()
            .processes
            .insert(name.to_owned(), running);
    }

    /// Sets the output returned for `command`.
    pub fn set_output(&self, command: &str, output: &str) {
        self.state
            .borrow_mut()
            .outputs
            .insert(command.to_owned(), output.to_owned());
    }

    /// Makes every call whose description contains `marker` fail with
    /// [`FakeHost::FAILURE_STATUS`].
    pub fn fail_when(&self, marker: &str) {
        self.state.borrow_mut().failures.push(marker.to_owned());
    }

    /// Every interaction so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<HostCall> {
        self.state.borrow().calls.clone()
    }

    /// Descriptions of installer calls, in order.
    #[must_use]
    pub fn provision_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HostCall::Provision(description) => Some(description),
                HostCall::Check(_) | HostCall::Close => None,
            })
            .collect()
    }

    /// Descriptions of health checks, in order.
    #[must_use]
    pub fn check_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HostCall::Check(description) => Some(description),
                HostCall::Provision(_) | HostCall::Close => None,
            })
            .collect()
    }

    fn record(&self, call: HostCall) -> Result<(), SessionError> {
        let mut state = self.state.borrow_mut();
        let description = match &call {
            HostCall::Provision(description) | HostCall::Check(description) => {
                Some(description.clone())
            }
            HostCall::Close => None,
        };
        state.calls.push(call);
        match description {
            Some(text) if state.failures.iter().any(|marker| text.contains(marker)) => Err(
                SessionError::command_failed(&text, Some(Self::FAILURE_STATUS), "simulated failure"),
            ),
            _ => Ok(()),
        }
    }

    fn provision(&self, action: &StepAction) -> Result<(), SessionError> {
        self.record(HostCall::Provision(action.to_string()))
    }

    fn check(&self, check: &Check) -> Result<(), SessionError> {
        self.record(HostCall::Check(check.to_string()))
    }
}

impl Installer for FakeHost {
    fn run_shell(&self, command: &str, privileged: bool) -> Result<(), SessionError> {
        self.provision(&StepAction::Shell {
            command: command.to_owned(),
            privileged,
        })
    }

    fn enable_repository(&self, repository: &AptRepository) -> Result<(), SessionError> {
        self.provision(&StepAction::EnableRepository(repository.clone()))
    }

    fn upgrade_system(&self) -> Result<(), SessionError> {
        self.provision(&StepAction::UpgradeSystem)
    }

    fn install_packages(&self, packages: &[String]) -> Result<(), SessionError> {
        self.provision(&StepAction::InstallPackages(packages.to_vec()))?;
        let mut state = self.state.borrow_mut();
        for package in packages {
            state.packages.insert(package.clone(), true);
        }
        Ok(())
    }

    fn install_remote_package(&self, package: &RemotePackage) -> Result<(), SessionError> {
        self.provision(&StepAction::InstallRemotePackage(package.clone()))?;
        self.set_package(&package.name, true);
        Ok(())
    }

    fn restart_service(&self, service: &str) -> Result<(), SessionError> {
        self.provision(&StepAction::RestartService(service.to_owned()))?;
        self.set_process(service, true);
        Ok(())
    }
}

impl HealthChecker for FakeHost {
    fn package_installed(&self, name: &str) -> Result<bool, SessionError> {
        self.check(&Check::PackageInstalled(name.to_owned()))?;
        let state = self.state.borrow();
        Ok(state.packages.get(name).copied().unwrap_or(state.healthy))
    }

    fn port_listening(&self, port: u16, protocol: Protocol) -> Result<bool, SessionError> {
        self.check(&Check::PortListening { port, protocol })?;
        let state = self.state.borrow();
        Ok(state
            .ports
            .get(&(port, protocol))
            .copied()
            .unwrap_or(state.healthy))
    }

    fn process_running(&self, name: &str) -> Result<bool, SessionError> {
        self.check(&Check::ProcessRunning(name.to_owned()))?;
        let state = self.state.borrow();
        Ok(state.processes.get(name).copied().unwrap_or(state.healthy))
    }

    fn command_output_contains(
        &self,
        command: &str,
        substring: &str,
        privileged: bool,
    ) -> Result<bool, SessionError> {
        self.check(&Check::OutputContains {
            command: command.to_owned(),
            substring: substring.to_owned(),
            privileged,
        })?;
        let state = self.state.borrow();
        Ok(state
            .outputs
            .get(command)
            .map_or(state.healthy, |output| output.contains(substring)))
    }
}

impl Connection for FakeHost {
    fn host(&self) -> &str {
        Self::HOST
    }

    fn close(&mut self) -> Result<(), SessionError> {
        self.record(HostCall::Close)
    }
}

/// [`Connector`] handing out clones of one [`FakeHost`].
#[derive(Clone, Debug, Default)]
pub struct FakeConnector {
    host: FakeHost,
    connects: Rc<Cell<usize>>,
    refuse: Rc<Cell<bool>>,
}

impl FakeConnector {
    /// Creates a connector for `host`.
    #[must_use]
    pub fn new(host: FakeHost) -> Self {
        Self {
            host,
            ..Self::default()
        }
    }

    /// Makes every later connection attempt fail.
    pub fn refuse_connections(&self) {
        self.refuse.set(true);
    }

    /// Number of connection attempts so far.
    #[must_use]
    pub fn connects(&self) -> usize {
        self.connects.get()
    }
}

impl Connector for FakeConnector {
    type Session = FakeHost;

    fn connect(&self) -> Result<Self::Session, SessionError> {
        self.connects.set(self.connects.get() + 1);
        if self.refuse.get() {
            return Err(SessionError::Connection {
                host: FakeHost::HOST.to_owned(),
                message: String::from("connection refused"),
            });
        }
        Ok(self.host.clone())
    }
}

/// In-memory [`StateRecorder`]; clones share the same records.
#[derive(Clone, Debug, Default)]
pub struct MemoryStateStore {
    records: Rc<RefCell<BTreeMap<String, HostRecord>>>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateRecorder for MemoryStateStore {
    fn load(&self, host: &str) -> Result<Option<HostRecord>, StateStoreError> {
        Ok(self.records.borrow().get(host).cloned())
    }

    fn record(&self, host: &str, record: HostRecord) -> Result<(), StateStoreError> {
        self.records.borrow_mut().insert(host.to_owned(), record);
        Ok(())
    }
}
