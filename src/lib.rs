// Copyright (c) 2025 - Cowboy AI, Inc.
//! VM image build orchestration for the Composable Information Machine
//!
//! Builds virtual machine images by running an ordered list of reversible
//! steps against a hypervisor host, waiting on guest state that only the
//! guest controls, and unwinding whatever was created when a build stops.
//!
//! # Architecture
//!
//! ```text
//! BuildConfig ──validate──► ImageBuilder ──► SagaRunner ──► Step, Step, ...
//!                                                │            │
//!                                                │      RunContext (typed keys)
//!                                                │            │
//!                                           RunReport    ports: ComputeProvider
//!                                                               RemoteExecutor
//!                                                               Ui
//! ```
//!
//! - [`saga`]: forward steps and reverse compensations, one outcome per run
//! - [`poll`]: bounded level- and edge-triggered convergence waits
//! - [`context`]: typed run context shared by the steps
//! - [`ports`]: the interfaces to the outside world
//! - [`steps`] and [`builder`]: the ISO install profile
//! - [`adapters`]: Hyper-V and WinRM implementations of the ports

pub mod adapters;
pub mod artifact;
pub mod builder;
pub mod config;
pub mod context;
pub mod domain;
pub mod errors;
pub mod poll;
pub mod ports;
pub mod saga;
pub mod state_machine;
pub mod steps;

// Re-export commonly used types
pub use artifact::Artifact;
pub use builder::{iso_install_steps, ImageBuilder};
pub use config::{BuildConfig, ValidatedConfig};
pub use context::{keys, CancelFlag, ContextKey, RunContext};
pub use errors::{BuildError, BuildResult, ConfigError, ConfigErrors};
pub use poll::{poll_until, PollPolicy, Polled, Probe, RebootDetector};
pub use ports::{ComputeProvider, RemoteExecutor, TracingUi, Ui};
pub use saga::{check_dependencies, CleanupFailure, Outcome, RunReport, SagaRunner, Step, StepAction};
