// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for image build orchestration
//!
//! Every failure a build can surface is a [`BuildError`]. Steps return them,
//! the saga runner records the first one in the run context, and the caller
//! receives exactly that one error in the final outcome.
//!
//! # Taxonomy
//!
//! ```text
//! Configuration      → bad build parameters, raised before any step runs
//! ExternalCall       → compute provider / remote executor call failed
//! Timeout            → a convergence wait exceeded its bound
//! MissingContextKey  → a step ran before the step that feeds it
//! Cancelled          → external cancellation observed
//! ```

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while building an image
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BuildError {
    /// Build configuration rejected before orchestration started
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A compute provider or remote executor call failed
    #[error("{action}: {message}")]
    ExternalCall { action: String, message: String },

    /// A convergence wait ran out of attempts or time
    #[error("Timed out waiting for {what} after {attempts} attempts ({elapsed:?})")]
    Timeout {
        what: String,
        attempts: u32,
        elapsed: Duration,
    },

    /// A step read a context key no earlier step wrote
    #[error("Missing context key: {0}")]
    MissingContextKey(&'static str),

    /// The build was cancelled
    #[error("Build was cancelled")]
    Cancelled,

    /// A step halted without recording a cause
    #[error("Build was halted by step '{0}'")]
    Halted(String),

    /// Local filesystem failure (temp dirs, seed copies)
    #[error("I/O error: {0}")]
    Io(String),
}

impl BuildError {
    /// Wrap a failed external call with the label of the action that issued it
    pub fn external(action: impl Into<String>, message: impl ToString) -> Self {
        BuildError::ExternalCall {
            action: action.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error represents cancellation rather than failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BuildError::Cancelled)
    }
}

/// Result type for build operations
pub type BuildResult<T> = Result<T, BuildError>;

impl From<std::io::Error> for BuildError {
    fn from(err: std::io::Error) -> Self {
        BuildError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BuildError {
    fn from(err: serde_json::Error) -> Self {
        BuildError::Configuration(err.to_string())
    }
}

/// A single violated configuration option
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("disk_size_mb: must be between {min} and {max} MB, got {actual}")]
    DiskSize { min: u64, max: u64, actual: u64 },

    #[error("memory_size_mb: must be between {min} and {max} MB, got {actual}")]
    MemorySize { min: u64, max: u64, actual: u64 },

    #[error("iso_path: {0}")]
    IsoPath(String),

    #[error("seed_image: {0}")]
    SeedImage(String),

    #[error("output_dir: {0}")]
    OutputDir(String),

    #[error("install_timeout_mins: {0}")]
    InstallTimeout(String),

    #[error(
        "install_poll_interval_secs: {interval_secs}s exceeds the install timeout of {timeout_secs}s"
    )]
    InstallPollInterval { interval_secs: u64, timeout_secs: u64 },

    #[error("{field}: must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("vlan_id: {0}")]
    Vlan(String),

    #[error("reboot_jitter_tolerance_secs: must be a non-negative number, got {0}")]
    JitterTolerance(String),

    #[error("credential: {0}")]
    Credential(String),
}

/// Every violation found while validating a configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigErrors(pub Vec<ConfigError>);

impl std::fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let messages: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for ConfigErrors {}

impl From<ConfigErrors> for BuildError {
    fn from(errs: ConfigErrors) -> Self {
        BuildError::Configuration(errs.to_string())
    }
}
