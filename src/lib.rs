//! Core library for the `mesobox` provisioning tool.
//!
//! The crate drives a single host over SSH: a [`RemoteSession`] runs
//! commands, [`ProvisionStep`]s install software, [`Assertion`]s verify the
//! result, and a [`Pipeline`] sequences both with fail-fast semantics. The
//! [`TaskRunner`] wires these to the per-distribution [`catalog`].

pub mod catalog;
pub mod checks;
pub mod pipeline;
pub mod provision;
pub mod session;
pub mod state_store;
pub mod tasks;
pub mod test_support;

pub use catalog::{Distribution, UnsupportedDistributionError};
pub use checks::{HealthChecker, Protocol};
pub use pipeline::{
    Assertion, AssertionFailure, Check, Pipeline, PipelineError, PipelineReport, PipelineState,
    StepState,
};
pub use provision::{AptKey, AptRepository, Installer, ProvisionStep, RemotePackage, StepAction};
pub use session::{
    CommandOutput, CommandRunner, ConfigError, Connection, ProcessCommandRunner,
    RemoteCommandOutput, RemoteSession, RunOptions, SessionConfig, SessionError,
};
pub use state_store::{HostRecord, StateRecorder, StateStore, StateStoreError, TaskStatus};
pub use tasks::{Connector, SshConnector, Task, TaskError, TaskRunner};
