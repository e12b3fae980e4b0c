//! Errors raised while running a pipeline.

use thiserror::Error;

use crate::session::SessionError;

use super::PipelineState;

/// A required health check answered `false`.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("check failed: {check} (expected {expectation})")]
pub struct AssertionFailure {
    /// Name of the failing assertion.
    pub check: String,
    /// What the assertion expected to observe.
    pub expectation: String,
}

/// Reasons a pipeline stops early.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PipelineError {
    /// A provisioning step failed; later steps and all assertions were
    /// skipped.
    #[error("step '{step}' failed: {source}")]
    Step {
        /// Name of the failing step.
        step: String,
        /// Underlying session error.
        #[source]
        source: SessionError,
    },
    /// A health check could not be evaluated.
    #[error("check '{check}' could not run: {source}")]
    Check {
        /// Name of the assertion being evaluated.
        check: String,
        /// Underlying session error.
        #[source]
        source: SessionError,
    },
    /// A health check answered `false`.
    #[error(transparent)]
    Assertion(#[from] AssertionFailure),
}

impl PipelineError {
    /// Terminal state the pipeline reached.
    #[must_use]
    pub const fn state(&self) -> PipelineState {
        match self {
            Self::Step { .. } => PipelineState::Aborted,
            Self::Check { .. } | Self::Assertion(_) => PipelineState::Failed,
        }
    }

    /// Underlying session error, when the failure came from the transport.
    #[must_use]
    pub const fn session_error(&self) -> Option<&SessionError> {
        match self {
            Self::Step { source, .. } | Self::Check { source, .. } => Some(source),
            Self::Assertion(_) => None,
        }
    }
}
