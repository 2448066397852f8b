// Copyright (c) 2025 - Cowboy AI, Inc.
//! Build Steps
//!
//! Concrete saga steps. Each declares the context keys it reads and writes,
//! announces its intent through the UI sink before acting, and keeps what
//! it allocated in private fields so its compensation releases exactly that.
//!
//! # Resource ownership on cleanup
//!
//! | Resource                 | Step                     | Released            |
//! |--------------------------|--------------------------|---------------------|
//! | temporary directory      | [`CreateTempDir`]        | always              |
//! | seed copy                | [`CopySeedImage`]        | always              |
//! | attached media           | [`MountMedia`], [`MountSecondaryDvds`] | always |
//! | VLAN tags                | [`ConfigureVlan`]        | always              |
//! | trust-list entry         | [`EstablishRemoteChannel`] | always            |
//! | output directory         | [`PrepareOutputDir`]     | build not completed |
//! | switch (if created)      | [`CreateSwitch`]         | build not completed |
//! | VM                       | [`CreateVm`]             | build not completed |

pub mod address;
pub mod export;
pub mod install;
pub mod media;
pub mod power;
pub mod provision;
pub mod remoting;
pub mod switch;
pub mod vlan;
pub mod vm;
pub mod workspace;

pub use address::{AddressProbe, ResolveGuestAddress};
pub use export::ExportVm;
pub use install::{UptimeProbe, WaitForInstall};
pub use media::{
    CopySeedImage, MountMedia, MountSecondaryDvds, UnmountMedia, UnmountSecondaryDvds,
};
pub use power::{RestartVm, StartVm, StopVm};
pub use provision::Provision;
pub use remoting::{CheckRemoting, EstablishRemoteChannel, RemotePing};
pub use switch::CreateSwitch;
pub use vlan::{ConfigureVlan, DisableVlan};
pub use vm::{CreateVm, EnableIntegrationService, GUEST_SERVICE_INTERFACE};
pub use workspace::{CreateTempDir, PrepareOutputDir};
