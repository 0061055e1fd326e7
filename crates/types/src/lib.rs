//! Shared declaration types for Airframe.
//!
//! These are plain, serde-friendly values: the engine validates and derives them,
//! the CLI reads them from manifests and renders them back out. Nothing in this
//! crate performs validation beyond what the type system and `FromStr` impls give.

use std::{error::Error, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

pub mod logging;
pub mod policy;

pub use logging::{LogLevel, LogType, LoggingConfiguration, LoggingConfigurationProperty, ParseRetentionDaysError, RetentionDays};
pub use policy::{ConditionValue, Conditions, Effect, PolicyStatement, ServicePrincipal, TrustPolicy};

/// Capacity class of a managed Airflow environment, ordered smallest to largest.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EnvironmentClass {
    /// Single-node class; every count is pinned to 1.
    #[serde(rename = "mw1.micro")]
    Mw1Micro,
    #[serde(rename = "mw1.small")]
    Mw1Small,
    #[serde(rename = "mw1.medium")]
    Mw1Medium,
    #[serde(rename = "mw1.large")]
    Mw1Large,
}

impl EnvironmentClass {
    /// All classes in ascending capacity order.
    pub const ALL: [EnvironmentClass; 4] = [Self::Mw1Micro, Self::Mw1Small, Self::Mw1Medium, Self::Mw1Large];

    /// Wire name used by the provisioning API (e.g. `mw1.small`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mw1Micro => "mw1.micro",
            Self::Mw1Small => "mw1.small",
            Self::Mw1Medium => "mw1.medium",
            Self::Mw1Large => "mw1.large",
        }
    }

    /// Whether the class pins all counts instead of accepting ranges.
    pub fn is_fixed(&self) -> bool {
        matches!(self, Self::Mw1Micro)
    }
}

impl fmt::Display for EnvironmentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvironmentClass {
    type Err = ParseEnvironmentClassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|class| class.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseEnvironmentClassError(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnvironmentClassError(pub String);

impl fmt::Display for ParseEnvironmentClassError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid environment class '{}'; expected one of mw1.micro, mw1.small, mw1.medium, mw1.large",
            self.0
        )
    }
}

impl Error for ParseEnvironmentClassError {}

/// Network reachability of the Airflow webserver.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebserverAccessMode {
    PrivateOnly,
    #[default]
    PublicOnly,
}

/// Who owns the VPC endpoints the environment needs.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EndpointManagement {
    Customer,
    Service,
}

/// What happens to a storage bucket when its declaration is removed.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemovalPolicy {
    #[default]
    Retain,
    Destroy,
    Snapshot,
}
