//! The `bootstrap`, `tests`, and `it` tasks.
//!
//! [`TaskRunner`] resolves the distribution, opens a session through a
//! [`Connector`], runs one pipeline on it, records the outcome, and closes the
//! session on every path. An unknown distribution is rejected before any
//! connection is attempted.

use std::fmt::Display;

use tracing::{info, warn};

use crate::catalog::{Distribution, UnsupportedDistributionError};
use crate::checks::HealthChecker;
use crate::pipeline::{Pipeline, PipelineError, PipelineReport};
use crate::provision::Installer;
use crate::session::{
    Connection, ProcessCommandRunner, RemoteSession, SessionConfig, SessionError,
};
use crate::state_store::{HostRecord, StateRecorder, TaskStatus};

/// Opens sessions to the target host.
pub trait Connector {
    /// Session type produced by this connector.
    type Session: Installer + HealthChecker + Connection;

    /// Opens a new session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the host cannot be reached.
    fn connect(&self) -> Result<Self::Session, SessionError>;
}

/// Connector backed by the system ssh client.
#[derive(Clone, Debug)]
pub struct SshConnector {
    host: Option<String>,
    config: SessionConfig,
}

impl SshConnector {
    /// Creates a connector. A missing host is reported when connecting.
    #[must_use]
    pub const fn new(host: Option<String>, config: SessionConfig) -> Self {
        Self { host, config }
    }
}

impl Connector for SshConnector {
    type Session = RemoteSession<ProcessCommandRunner>;

    fn connect(&self) -> Result<Self::Session, SessionError> {
        RemoteSession::connect_with_process_runner(
            self.host.as_deref().unwrap_or_default(),
            self.config.clone(),
        )
    }
}

/// Task names as recorded in the state file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Task {
    /// Provisioning only.
    Bootstrap,
    /// Acceptance checks only.
    Tests,
}

impl Task {
    /// Lower-case task name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::Tests => "tests",
        }
    }
}

/// Errors surfaced by a task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The distribution identifier has no configuration.
    #[error(transparent)]
    UnsupportedDistribution(#[from] UnsupportedDistributionError),
    /// The host could not be reached.
    #[error("{0}")]
    Connect(#[source] SessionError),
    /// The pipeline stopped on a step, check, or assertion.
    #[error("{task} failed: {message}")]
    Pipeline {
        /// Task that failed.
        task: &'static str,
        /// Failure description, including any teardown failure.
        message: String,
        /// Underlying pipeline error.
        #[source]
        source: PipelineError,
    },
    /// The pipeline passed but the session could not be closed.
    #[error("failed to close session: {0}")]
    Teardown(#[source] SessionError),
}

impl TaskError {
    /// Process exit status for this error.
    ///
    /// A failing remote command propagates its own status; everything else
    /// maps to `1`.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Pipeline {
                source:
                    PipelineError::Step {
                        source: SessionError::CommandFailed {
                            status: Some(code), ..
                        },
                        ..
                    },
                ..
            } if *code != 0 => *code,
            _ => 1,
        }
    }
}

/// Runs tasks against the host reached through `C`.
#[derive(Debug)]
pub struct TaskRunner<C, W> {
    connector: C,
    state: W,
}

impl<C, W> TaskRunner<C, W>
where
    C: Connector,
    W: StateRecorder,
{
    /// Creates a task runner.
    #[must_use]
    pub const fn new(connector: C, state: W) -> Self {
        Self { connector, state }
    }

    /// Provisions the host for `distribution`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError`] for unknown distributions, unreachable hosts,
    /// failed steps, or teardown failures.
    pub fn bootstrap(&self, distribution: &str) -> Result<PipelineReport, TaskError> {
        let target: Distribution = distribution.parse()?;
        self.run_task(Task::Bootstrap, target, |session| {
            Pipeline::new(session).with_steps(target.bootstrap_steps())
        })
    }

    /// Runs the acceptance checks for `distribution`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError`] for unknown distributions, unreachable hosts,
    /// failed checks, or teardown failures.
    pub fn tests(&self, distribution: &str) -> Result<PipelineReport, TaskError> {
        let target: Distribution = distribution.parse()?;
        self.run_task(Task::Tests, target, |session| {
            Pipeline::new(session).with_assertions(target.acceptance_checks())
        })
    }

    /// Runs `bootstrap` then `tests`; `tests` is skipped when `bootstrap`
    /// fails.
    ///
    /// # Errors
    ///
    /// Returns the first [`TaskError`] encountered.
    pub fn it(&self, distribution: &str) -> Result<PipelineReport, TaskError> {
        self.bootstrap(distribution)?;
        self.tests(distribution)
    }

    fn run_task<F>(
        &self,
        task: Task,
        target: Distribution,
        build: F,
    ) -> Result<PipelineReport, TaskError>
    where
        F: for<'s> FnOnce(&'s C::Session) -> Pipeline<'s, C::Session>,
    {
        info!(task = task.name(), distribution = %target, "starting task");
        let mut session = self.connector.connect().map_err(TaskError::Connect)?;
        let host = session.host().to_owned();

        // The pipeline borrows the session; it is consumed before close.
        let result = build(&session).run();
        let teardown = session.close();

        let status = if result.is_ok() && teardown.is_ok() {
            TaskStatus::Succeeded
        } else {
            TaskStatus::Failed
        };
        self.record(&host, target, task, status);

        match (result, teardown) {
            (Ok(report), Ok(())) => {
                info!(task = task.name(), host = %host, "task succeeded");
                Ok(report)
            }
            (Ok(_), Err(err)) => Err(TaskError::Teardown(err)),
            (Err(err), teardown_result) => Err(TaskError::Pipeline {
                task: task.name(),
                message: append_teardown_note(err.to_string(), teardown_result.err().as_ref()),
                source: err,
            }),
        }
    }

    fn record(&self, host: &str, target: Distribution, task: Task, status: TaskStatus) {
        let record = HostRecord::now(target.identifier(), task.name(), status);
        if let Err(err) = self.state.record(host, record) {
            warn!(host, error = %err, "failed to record task state");
        }
    }
}

fn append_teardown_note<E: Display>(message: String, teardown_error: Option<&E>) -> String {
    if let Some(teardown) = teardown_error {
        format!("{message} (teardown also failed: {teardown})")
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::Protocol;
    use crate::pipeline::PipelineState;
    use crate::test_support::{FakeConnector, FakeHost, HostCall, MemoryStateStore};

    fn runner(host: &FakeHost) -> (TaskRunner<FakeConnector, MemoryStateStore>, FakeConnector) {
        let connector = FakeConnector::new(host.clone());
        (
            TaskRunner::new(connector.clone(), MemoryStateStore::new()),
            connector,
        )
    }

    #[test]
    fn unsupported_distribution_never_connects() {
        let host = FakeHost::healthy();
        let (tasks, connector) = runner(&host);

        let err = tasks
            .bootstrap("unsupported-os")
            .expect_err("unknown distribution should fail");

        assert!(matches!(err, TaskError::UnsupportedDistribution(_)));
        assert_eq!(connector.connects(), 0);
        assert!(host.calls().is_empty());
    }

    #[test]
    fn bootstrap_runs_every_step_once_in_order() {
        let host = FakeHost::new();
        let (tasks, _) = runner(&host);

        let report = tasks.bootstrap("ubuntu14.04").expect("bootstrap should pass");

        let expected: Vec<String> = Distribution::Ubuntu1404
            .bootstrap_steps()
            .iter()
            .map(|step| step.action().to_string())
            .collect();
        assert_eq!(host.provision_calls(), expected);
        assert_eq!(report.steps.len(), expected.len());
        assert_eq!(report.assertions_verified, 0);
    }

    #[test]
    fn bootstrap_is_repeatable_on_a_provisioned_host() {
        let host = FakeHost::new();
        let (tasks, connector) = runner(&host);

        tasks.bootstrap("ubuntu14.04").expect("first bootstrap");
        tasks.bootstrap("ubuntu1404").expect("second bootstrap");

        assert_eq!(connector.connects(), 2);
    }

    #[test]
    fn tests_pass_on_a_healthy_host() {
        let host = FakeHost::healthy();
        let (tasks, _) = runner(&host);

        let report = tasks.tests("ubuntu14.04").expect("tests should pass");

        assert_eq!(report.state, PipelineState::Passed);
        assert_eq!(
            report.assertions_verified,
            Distribution::Ubuntu1404.acceptance_checks().len()
        );
        assert!(host.provision_calls().is_empty());
    }

    #[test]
    fn zookeeper_port_failure_stops_before_mesos_master() {
        let host = FakeHost::healthy();
        host.set_port(2181, Protocol::Tcp, false);
        let (tasks, _) = runner(&host);

        let err = tasks.tests("ubuntu14.04").expect_err("tests should fail");

        let TaskError::Pipeline {
            source: PipelineError::Assertion(failure),
            ..
        } = &err
        else {
            panic!("expected assertion failure, got {err:?}");
        };
        assert_eq!(failure.check, "zookeeper listens on 2181/tcp");
        assert!(
            !host
                .check_calls()
                .iter()
                .any(|call| call.contains("5050") || call.contains("mesos-master")),
            "mesos-master must not be checked: {:?}",
            host.check_calls()
        );
    }

    #[test]
    fn wrong_pip_version_fails_the_last_check() {
        let host = FakeHost::healthy();
        host.set_output("pip --version", "pip 8.1.1 from /usr/lib/python2.7/dist-packages");
        let (tasks, _) = runner(&host);

        let err = tasks.tests("ubuntu14.04").expect_err("tests should fail");

        let TaskError::Pipeline {
            source: PipelineError::Assertion(failure),
            ..
        } = &err
        else {
            panic!("expected assertion failure, got {err:?}");
        };
        assert_eq!(failure.check, "pip is version 7");
        assert_eq!(
            host.check_calls().len(),
            Distribution::Ubuntu1404.acceptance_checks().len()
        );
    }

    #[test]
    fn it_skips_tests_when_bootstrap_fails() {
        let host = FakeHost::healthy();
        host.fail_when("upgrade system packages");
        let (tasks, connector) = runner(&host);

        let err = tasks.it("ubuntu14.04").expect_err("it should fail");

        assert!(matches!(
            err,
            TaskError::Pipeline {
                task: "bootstrap",
                ..
            }
        ));
        assert_eq!(connector.connects(), 1);
        assert!(host.check_calls().is_empty());
    }

    #[test]
    fn it_runs_bootstrap_then_tests() {
        let host = FakeHost::healthy();
        let (tasks, connector) = runner(&host);

        tasks.it("ubuntu14.04").expect("it should pass");

        assert_eq!(connector.connects(), 2);
        let calls = host.calls();
        let last_provision = calls
            .iter()
            .rposition(|call| matches!(call, HostCall::Provision(_)))
            .expect("provision calls");
        let first_check = calls
            .iter()
            .position(|call| matches!(call, HostCall::Check(_)))
            .expect("check calls");
        assert!(last_provision < first_check);
    }

    #[test]
    fn session_is_closed_after_failure() {
        let host = FakeHost::new();
        let (tasks, _) = runner(&host);

        tasks.tests("ubuntu14.04").expect_err("empty host fails checks");

        assert_eq!(host.calls().last(), Some(&HostCall::Close));
    }

    #[test]
    fn outcomes_are_recorded_per_host() {
        let host = FakeHost::new();
        let connector = FakeConnector::new(host.clone());
        let state = MemoryStateStore::new();
        let tasks = TaskRunner::new(connector, state.clone());

        tasks.bootstrap("ubuntu14.04").expect("bootstrap");
        tasks.tests("ubuntu14.04").expect_err("tests fail on empty host");

        let record = state
            .load(FakeHost::HOST)
            .expect("load")
            .expect("record should exist");
        assert_eq!(record.task, "tests");
        assert_eq!(record.status, TaskStatus::Failed);
    }

    #[test]
    fn failing_step_propagates_remote_exit_code() {
        let host = FakeHost::new();
        host.fail_when("install packages");
        let (tasks, _) = runner(&host);

        let err = tasks.bootstrap("ubuntu14.04").expect_err("bootstrap fails");

        assert_eq!(err.exit_code(), FakeHost::FAILURE_STATUS);
    }

    #[test]
    fn teardown_failure_is_appended_to_pipeline_failure() {
        let message = append_teardown_note(String::from("step failed"), Some(&"socket gone"));
        assert_eq!(message, "step failed (teardown also failed: socket gone)");
    }
}
