//! Ordered provisioning followed by ordered verification.
//!
//! A [`Pipeline`] borrows one session, applies its [`ProvisionStep`]s left to
//! right, then evaluates its [`Assertion`]s in declaration order. The first
//! failure ends the run: a failing step aborts before any assertion runs and
//! a failing assertion stops later assertions from running. `run` consumes
//! the pipeline, so a failed pipeline cannot be restarted; the terminal state
//! is read from [`PipelineReport::state`] or [`PipelineError::state`].

use std::fmt;

use tracing::{debug, info};

use crate::checks::{HealthChecker, Protocol};
use crate::provision::{Installer, ProvisionStep};
use crate::session::SessionError;

mod error;

pub use error::{AssertionFailure, PipelineError};

/// Lifecycle of a single provisioning step.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepState {
    /// Not started.
    Pending,
    /// Currently applying.
    Running,
    /// Applied without error.
    Succeeded,
    /// Applying failed.
    Failed,
}

/// Lifecycle of a pipeline run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PipelineState {
    /// Built but not run.
    Pending,
    /// Applying provisioning steps.
    Running,
    /// All steps succeeded; evaluating assertions.
    Verifying,
    /// Every step and assertion succeeded.
    Passed,
    /// An assertion failed or could not be evaluated.
    Failed,
    /// A provisioning step failed.
    Aborted,
}

/// Read-only predicate evaluated through a [`HealthChecker`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Check {
    /// Package is installed.
    PackageInstalled(String),
    /// Something listens on a port.
    PortListening {
        /// Expected port.
        port: u16,
        /// Expected protocol.
        protocol: Protocol,
    },
    /// A process with this name is running.
    ProcessRunning(String),
    /// A command's output contains a substring.
    OutputContains {
        /// Read-only command to run.
        command: String,
        /// Substring expected in stdout or stderr.
        substring: String,
        /// Whether to run the command through `sudo`.
        privileged: bool,
    },
}

impl Check {
    /// Evaluates the check.
    ///
    /// # Errors
    ///
    /// Propagates the checker's [`SessionError`].
    pub fn evaluate<H: HealthChecker + ?Sized>(&self, checker: &H) -> Result<bool, SessionError> {
        match self {
            Self::PackageInstalled(name) => checker.package_installed(name),
            Self::PortListening { port, protocol } => checker.port_listening(*port, *protocol),
            Self::ProcessRunning(name) => checker.process_running(name),
            Self::OutputContains {
                command,
                substring,
                privileged,
            } => checker.command_output_contains(command, substring, *privileged),
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PackageInstalled(name) => write!(f, "package {name} installed"),
            Self::PortListening { port, protocol } => {
                write!(f, "port {port}/{protocol} listening")
            }
            Self::ProcessRunning(name) => write!(f, "process {name} running"),
            Self::OutputContains {
                command, substring, ..
            } => write!(f, "`{command}` output to contain '{substring}'"),
        }
    }
}

/// A named health check.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Assertion {
    name: String,
    check: Check,
}

impl Assertion {
    /// Creates an assertion.
    #[must_use]
    pub fn new(name: impl Into<String>, check: Check) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }

    /// Assertion name used in logs and failures.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Underlying predicate.
    #[must_use]
    pub const fn check(&self) -> &Check {
        &self.check
    }
}

/// Summary of a pipeline that passed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PipelineReport {
    /// Terminal state; always [`PipelineState::Passed`] for a report.
    pub state: PipelineState,
    /// Step names with their final states, in execution order.
    pub steps: Vec<(String, StepState)>,
    /// Number of assertions that held.
    pub assertions_verified: usize,
}

/// Steps and assertions bound to one session.
#[derive(Debug)]
pub struct Pipeline<'s, S: ?Sized> {
    session: &'s S,
    steps: Vec<ProvisionStep>,
    assertions: Vec<Assertion>,
    step_states: Vec<StepState>,
}

impl<'s, S> Pipeline<'s, S>
where
    S: Installer + HealthChecker + ?Sized,
{
    /// Creates an empty pipeline bound to `session`.
    #[must_use]
    pub const fn new(session: &'s S) -> Self {
        Self {
            session,
            steps: Vec::new(),
            assertions: Vec::new(),
            step_states: Vec::new(),
        }
    }

    /// Appends provisioning steps.
    #[must_use]
    pub fn with_steps(mut self, steps: impl IntoIterator<Item = ProvisionStep>) -> Self {
        self.steps.extend(steps);
        self.step_states.resize(self.steps.len(), StepState::Pending);
        self
    }

    /// Appends assertions.
    #[must_use]
    pub fn with_assertions(mut self, assertions: impl IntoIterator<Item = Assertion>) -> Self {
        self.assertions.extend(assertions);
        self
    }

    /// Runs every step, then every assertion, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Step`] when a step fails,
    /// [`PipelineError::Check`] when a check cannot be evaluated, and
    /// [`PipelineError::Assertion`] when a check answers `false`.
    pub fn run(mut self) -> Result<PipelineReport, PipelineError> {
        self.provision()?;
        let assertions_verified = self.verify()?;
        info!(
            steps = self.steps.len(),
            assertions = assertions_verified,
            "pipeline passed"
        );

        let Self {
            steps, step_states, ..
        } = self;
        Ok(PipelineReport {
            state: PipelineState::Passed,
            steps: steps
                .into_iter()
                .map(|step| step.name().to_owned())
                .zip(step_states)
                .collect(),
            assertions_verified,
        })
    }

    fn provision(&mut self) -> Result<(), PipelineError> {
        debug!(steps = self.steps.len(), "provisioning");
        for (index, step) in self.steps.iter().enumerate() {
            set_step_state(&mut self.step_states, index, StepState::Running);
            info!(step = %step.name(), "{} ...", step.name());
            if let Err(source) = step.apply(self.session) {
                set_step_state(&mut self.step_states, index, StepState::Failed);
                return Err(PipelineError::Step {
                    step: step.name().to_owned(),
                    source,
                });
            }
            set_step_state(&mut self.step_states, index, StepState::Succeeded);
        }
        Ok(())
    }

    fn verify(&self) -> Result<usize, PipelineError> {
        debug!(assertions = self.assertions.len(), "verifying");
        for assertion in &self.assertions {
            info!(check = %assertion.name(), "checking {}", assertion.name());
            let held = assertion
                .check()
                .evaluate(self.session)
                .map_err(|source| PipelineError::Check {
                    check: assertion.name().to_owned(),
                    source,
                })?;
            if !held {
                return Err(PipelineError::Assertion(AssertionFailure {
                    check: assertion.name().to_owned(),
                    expectation: assertion.check().to_string(),
                }));
            }
            debug!(check = %assertion.name(), "check held");
        }
        Ok(self.assertions.len())
    }
}

fn set_step_state(states: &mut [StepState], index: usize, state: StepState) {
    if let Some(slot) = states.get_mut(index) {
        *slot = state;
    }
}
