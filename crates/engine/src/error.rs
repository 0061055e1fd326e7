//! Error types for configuration derivation.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Policy(#[from] PolicyViolation),
}

/// An input that violates a sizing, format, or declaration rule.
///
/// Messages name the exact rule that failed; they are part of the public contract.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("For MW1_MICRO environment class, minWorkers, maxWorkers, minWebservers, maxWebservers, and schedulers must all be 1.")]
    FixedTierCounts,

    #[error("For non-MW1_MICRO environment classes, {field} must be between {min} and {max}.")]
    CountOutOfRange { field: &'static str, min: u32, max: u32 },

    #[error("For non-MW1_MICRO environment classes, {lower} must be less than or equal to {upper}.")]
    CountOrder { lower: &'static str, upper: &'static str },

    #[error("Invalid format for weeklyMaintenanceWindowStart. Expected format: \"Day:HH:mm\"")]
    MaintenanceWindowFormat { value: String },

    #[error("Environment name must not be empty")]
    EmptyEnvironmentName,

    #[error("Invalid permission statement: {reason}")]
    InvalidStatement { reason: String },

    #[error("Invalid pool '{name}': {reason}")]
    InvalidPool { name: String, reason: String },

    #[error("subnetCidrMask must be between 16 and 28, got {mask}")]
    SubnetMask { mask: u8 },

    #[error("Supply either an existing network or a vpc to declare, not both")]
    NetworkConflict,
}

/// A build-time safety gate refused an artifact.
#[derive(Debug, Error)]
pub enum PolicyViolation {
    #[error(
        "requirements file {} must pin dependencies with the upstream constraints file (expected `{marker}`)",
        .path.display()
    )]
    MissingConstraints { path: PathBuf, marker: &'static str },

    #[error("requirements file {} could not be read for the constraints check: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The pool event handler's request table refused an event.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolRequestError {
    #[error("Pool {0} already exists")]
    AlreadyExists(String),

    #[error("Unsupported request type: {0}")]
    UnsupportedRequestType(String),

    #[error("Unexpected status code {0}")]
    UnexpectedStatus(u16),
}
