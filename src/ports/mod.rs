// Copyright (c) 2025 - Cowboy AI, Inc.
//! External Capability Ports
//!
//! The three narrow interfaces the orchestration core calls through. Every
//! mutation of the outside world goes through one of them.
//!
//! ```text
//! Steps
//!   ├── ComputeProvider  → switches, VMs, media, power, uptime, addresses
//!   ├── RemoteExecutor   → trust list, remote channel, guest commands
//!   └── Ui               → progress and error reporting
//! ```
//!
//! Concrete Hyper-V/PowerShell implementations live in
//! [`crate::adapters`]; tests substitute in-memory mocks.

pub mod compute;
pub mod remote;
pub mod ui;

pub use compute::{
    ComputeProvider, MediaKind, MediaSlot, SwitchAllocation, SwitchKind, VmSpec,
};
pub use remote::{CommandOutput, Credential, RemoteExecutor, RemoteHandle};
pub use ui::{TracingUi, Ui};
