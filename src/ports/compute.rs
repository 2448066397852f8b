// Copyright (c) 2025 - Cowboy AI, Inc.
//! Compute Provider Port
//!
//! The hypervisor management surface the build drives: switch, VM, media and
//! power lifecycle plus the two attribute queries the convergence waits poll.
//! Implementations own every bit of provider syntax; the core only ever
//! speaks in names, paths, sizes and slots.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use crate::domain::VlanId;
use crate::errors::BuildResult;

/// Kind of virtual switch to allocate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum SwitchKind {
    /// Host and guests can talk, no external network
    #[default]
    Internal,
    /// Guests only
    Private,
    /// Bound to a host network adapter; the host may pick an existing
    /// external switch on that adapter instead of creating one
    External { adapter: String },
}

impl fmt::Display for SwitchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchKind::Internal => write!(f, "Internal"),
            SwitchKind::Private => write!(f, "Private"),
            SwitchKind::External { .. } => write!(f, "External"),
        }
    }
}

/// Result of an idempotent create-if-absent switch request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchAllocation {
    /// Name the switch actually has; may differ from the requested one
    pub name: String,
    /// Whether this request created the switch (false when reused)
    pub created: bool,
}

/// Everything the provider needs to create a VM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmSpec {
    pub name: String,
    /// Directory holding the VM's configuration and virtual disk
    pub path: PathBuf,
    pub memory_bytes: u64,
    pub disk_bytes: u64,
    pub switch_name: String,
}

/// Removable media type; the hypervisor infers the format from it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Dvd,
    Floppy,
}

/// Where a piece of media is attached
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaSlot {
    pub kind: MediaKind,
    pub controller_number: u32,
    pub controller_location: u32,
}

impl fmt::Display for MediaSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}@{}:{}",
            self.kind, self.controller_number, self.controller_location
        )
    }
}

/// Hypervisor management surface consumed by the build steps
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Create the switch unless one with this name already exists
    async fn create_switch(&self, name: &str, kind: &SwitchKind) -> BuildResult<SwitchAllocation>;

    /// Delete a switch by name
    async fn delete_switch(&self, name: &str) -> BuildResult<()>;

    /// Create a VM with a fresh virtual disk, connected to a switch
    async fn create_vm(&self, spec: &VmSpec) -> BuildResult<()>;

    /// Unregister and delete a VM
    async fn delete_vm(&self, name: &str) -> BuildResult<()>;

    /// Enable a named guest integration service
    async fn enable_integration_service(&self, vm_name: &str, service: &str) -> BuildResult<()>;

    /// Attach media to an existing slot, or to a new drive when `slot` is None
    async fn attach_media(
        &self,
        vm_name: &str,
        path: &Path,
        kind: MediaKind,
        slot: Option<&MediaSlot>,
    ) -> BuildResult<MediaSlot>;

    /// Eject whatever media is in a slot
    async fn detach_media(&self, vm_name: &str, slot: &MediaSlot) -> BuildResult<()>;

    /// Tag the VM adapter and the switch's management adapter with a VLAN
    async fn set_vlan(&self, vm_name: &str, switch_name: &str, vlan: VlanId) -> BuildResult<()>;

    /// Return both adapters tagged by [`ComputeProvider::set_vlan`] to untagged
    async fn clear_vlan(&self, vm_name: &str, switch_name: &str) -> BuildResult<()>;

    async fn start_vm(&self, name: &str) -> BuildResult<()>;

    async fn stop_vm(&self, name: &str) -> BuildResult<()>;

    async fn restart_vm(&self, name: &str) -> BuildResult<()>;

    /// Raw address report of the VM's first network adapter
    async fn adapter_address(&self, vm_name: &str) -> BuildResult<Option<String>>;

    /// Guest uptime in seconds; resets towards zero on every reboot
    async fn uptime_seconds(&self, vm_name: &str) -> BuildResult<f64>;

    /// Reverse lookup of a guest address, if the host can resolve it
    async fn resolve_hostname(&self, address: IpAddr) -> BuildResult<Option<String>>;

    /// Export the VM's persisted representation into `destination`
    async fn export_vm(&self, name: &str, destination: &Path) -> BuildResult<()>;
}
