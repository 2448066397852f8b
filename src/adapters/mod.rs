// Copyright (c) 2025 - Cowboy AI, Inc.
//! Host Adapters
//!
//! Concrete port implementations for a Windows build host.
//!
//! - [`HypervProvider`]: `ComputeProvider` over the Hyper-V cmdlets
//! - [`PowerShellRemoting`]: `RemoteExecutor` over WinRM
//!
//! All provider syntax lives here; the steps never see a cmdlet name.

pub mod hyperv;
pub mod powershell;
pub mod remoting;

pub use hyperv::HypervProvider;
pub use powershell::{PowerShellBuilder, PowerShellCmdletBuilder, PowerShellScript};
pub use remoting::PowerShellRemoting;
