//! Static per-distribution configuration.
//!
//! A [`Distribution`] selects the provisioning steps and acceptance checks
//! used by the tasks. The lists are built on demand from constants and never
//! change at runtime.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::pipeline::Assertion;
use crate::provision::ProvisionStep;

mod ubuntu;

/// Raised when a distribution identifier has no configuration.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("unsupported distribution '{identifier}'; supported: {supported}")]
pub struct UnsupportedDistributionError {
    /// Identifier that was requested.
    pub identifier: String,
    /// Comma-separated list of accepted identifiers.
    pub supported: String,
}

/// Target operating systems with a known step and check list.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Distribution {
    /// Ubuntu 14.04 LTS (Trusty Tahr).
    Ubuntu1404,
}

impl Distribution {
    /// Every supported distribution.
    pub const ALL: [Self; 1] = [Self::Ubuntu1404];

    /// Canonical identifier.
    #[must_use]
    pub const fn identifier(self) -> &'static str {
        match self {
            Self::Ubuntu1404 => "ubuntu14.04",
        }
    }

    const fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Ubuntu1404 => &["ubuntu14.04", "ubuntu1404"],
        }
    }

    /// Packages every bootstrap installs and every acceptance run verifies.
    #[must_use]
    pub fn required_packages(self) -> Vec<String> {
        match self {
            Self::Ubuntu1404 => ubuntu::required_packages(),
        }
    }

    /// Provisioning steps in execution order.
    #[must_use]
    pub fn bootstrap_steps(self) -> Vec<ProvisionStep> {
        match self {
            Self::Ubuntu1404 => ubuntu::bootstrap_steps(),
        }
    }

    /// Acceptance checks in execution order.
    #[must_use]
    pub fn acceptance_checks(self) -> Vec<Assertion> {
        match self {
            Self::Ubuntu1404 => ubuntu::acceptance_checks(),
        }
    }

    fn supported_identifiers() -> String {
        Self::ALL
            .iter()
            .flat_map(|distribution| distribution.aliases().iter().copied())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromStr for Distribution {
    type Err = UnsupportedDistributionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|distribution| distribution.aliases().contains(&wanted.as_str()))
            .ok_or_else(|| UnsupportedDistributionError {
                identifier: value.to_owned(),
                supported: Self::supported_identifiers(),
            })
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}
