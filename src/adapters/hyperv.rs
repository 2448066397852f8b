// Copyright (c) 2025 - Cowboy AI, Inc.
//! Hyper-V Compute Provider
//!
//! [`ComputeProvider`] over the Hyper-V PowerShell module. Requires an
//! elevated session on a host with the Hyper-V role installed.
//!
//! # Operation mapping
//!
//! ```text
//! create_switch        → Get-VMSwitch / New-VMSwitch (create-if-absent)
//! create_vm            → New-VM -NewVHDPath <path>\<name>.vhdx
//! delete_vm            → Stop-VM -TurnOff, Remove-VM
//! attach_media (DVD)   → Add-VMDvdDrive -Passthru
//! attach_media (floppy)→ Set-VMFloppyDiskDrive
//! set_vlan             → Set-VMNetworkAdapterVlan -Access (VM and management OS)
//! clear_vlan           → Set-VMNetworkAdapterVlan -Untagged (VM and management OS)
//! adapter_address      → Get-VMNetworkAdapter .IPAddresses[0]
//! uptime_seconds       → Get-VM .Uptime.TotalSeconds
//! export_vm            → Export-VM
//! ```

use async_trait::async_trait;
use std::net::IpAddr;
use std::path::Path;
use tracing::debug;

use super::powershell::{PowerShellBuilder, PowerShellScript};
use crate::domain::VlanId;
use crate::errors::{BuildError, BuildResult};
use crate::ports::{
    ComputeProvider, MediaKind, MediaSlot, SwitchAllocation, SwitchKind, VmSpec,
};

const CREATE_SWITCH: &str = r#"param([string]$switchName,[string]$switchType)
$existing = Get-VMSwitch -Name $switchName -ErrorAction SilentlyContinue | Select-Object -First 1
if ($existing) {
  'existing:' + $existing.Name
} else {
  $created = New-VMSwitch -Name $switchName -SwitchType $switchType -ErrorAction Stop
  'created:' + $created.Name
}
"#;

const CREATE_EXTERNAL_SWITCH: &str = r#"param([string]$switchName,[string]$adapterName)
$adapter = Get-NetAdapter -Physical -Name $adapterName -ErrorAction Stop
$existing = Get-VMSwitch -SwitchType External |
  Where-Object { $_.NetAdapterInterfaceDescription -eq $adapter.InterfaceDescription } |
  Select-Object -First 1
if ($existing) {
  'existing:' + $existing.Name
} else {
  $created = New-VMSwitch -Name $switchName -NetAdapterName $adapter.Name -AllowManagementOS $true -ErrorAction Stop
  'created:' + $created.Name
}
"#;

const CREATE_VM: &str = r#"param([string]$vmName,[string]$path,[long]$memoryStartupBytes,[long]$newVHDSizeBytes,[string]$switchName)
$vhdPath = Join-Path -Path $path -ChildPath ($vmName + '.vhdx')
New-VM -Name $vmName -Path $path -MemoryStartupBytes $memoryStartupBytes -NewVHDPath $vhdPath -NewVHDSizeBytes $newVHDSizeBytes -SwitchName $switchName -ErrorAction Stop | Out-Null
"#;

const DELETE_VM: &str = r#"param([string]$vmName)
$vm = Get-VM -Name $vmName -ErrorAction SilentlyContinue
if ($vm) {
  if ($vm.State -ne 'Off') { Stop-VM -VM $vm -TurnOff -Force }
  Remove-VM -VM $vm -Force
}
"#;

const ADD_DVD_DRIVE: &str = r#"param([string]$vmName,[string]$path)
$drive = Add-VMDvdDrive -VMName $vmName -Path $path -Passthru -ErrorAction Stop
[string]$drive.ControllerNumber + ':' + [string]$drive.ControllerLocation
"#;

const STOP_VM: &str = r#"param([string]$vmName)
$vm = Get-VM -Name $vmName
if ($vm.State -eq [Microsoft.HyperV.PowerShell.VMState]::Running) {
  Stop-VM -VM $vm
}
"#;

const ADAPTER_ADDRESS: &str = r#"param([string]$vmName)
try {
  $adapter = Get-VMNetworkAdapter -VMName $vmName -ErrorAction SilentlyContinue
  $ip = $adapter.IPAddresses[0]
  if ($ip -eq $null) {
    return $false
  }
} catch {
  return $false
}
$ip
"#;

const RESOLVE_HOSTNAME: &str = r#"param([string]$ip)
try {
  [System.Net.Dns]::GetHostEntry($ip).HostName
} catch { }
"#;

/// Parse the `created:<name>` / `existing:<name>` switch script output
pub fn parse_switch_allocation(output: &str) -> Option<SwitchAllocation> {
    let line = output.lines().map(str::trim).rfind(|line| !line.is_empty())?;
    let (state, name) = line.split_once(':')?;
    if name.is_empty() {
        return None;
    }
    let created = match state {
        "created" => true,
        "existing" => false,
        _ => return None,
    };
    Some(SwitchAllocation {
        name: name.to_string(),
        created,
    })
}

/// Parse the `<controller>:<location>` drive script output
pub fn parse_dvd_slot(output: &str) -> Option<MediaSlot> {
    let (number, location) = output.trim().split_once(':')?;
    Some(MediaSlot {
        kind: MediaKind::Dvd,
        controller_number: number.trim().parse().ok()?,
        controller_location: location.trim().parse().ok()?,
    })
}

/// Parse `TotalSeconds`, which PowerShell may print with a decimal comma
pub fn parse_uptime(output: &str) -> Option<f64> {
    output.trim().replace(',', ".").parse().ok()
}

fn floppy_slot() -> MediaSlot {
    MediaSlot {
        kind: MediaKind::Floppy,
        controller_number: 0,
        controller_location: 0,
    }
}

/// Hyper-V host
#[derive(Debug, Clone, Default)]
pub struct HypervProvider;

impl HypervProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ComputeProvider for HypervProvider {
    async fn create_switch(&self, name: &str, kind: &SwitchKind) -> BuildResult<SwitchAllocation> {
        let action = format!("Creating switch '{}'", name);
        let script = match kind {
            SwitchKind::External { adapter } => {
                PowerShellScript::new(CREATE_EXTERNAL_SWITCH).param(name).param(adapter)
            }
            other => PowerShellScript::new(CREATE_SWITCH).param(name).param(other),
        };

        let output = script.output(&action).await?;
        parse_switch_allocation(&output).ok_or_else(|| {
            BuildError::external(action, format!("unexpected switch output: {}", output))
        })
    }

    async fn delete_switch(&self, name: &str) -> BuildResult<()> {
        PowerShellBuilder::new()
            .cmdlet("Remove-VMSwitch")
            .arg("Name", name)
            .flag("Force")
            .finish()
            .run(&format!("Deleting switch '{}'", name))
            .await
    }

    async fn create_vm(&self, spec: &VmSpec) -> BuildResult<()> {
        PowerShellScript::new(CREATE_VM)
            .param(&spec.name)
            .param(spec.path.display())
            .param(spec.memory_bytes)
            .param(spec.disk_bytes)
            .param(&spec.switch_name)
            .run(&format!("Creating virtual machine '{}'", spec.name))
            .await
    }

    async fn delete_vm(&self, name: &str) -> BuildResult<()> {
        PowerShellScript::new(DELETE_VM)
            .param(name)
            .run(&format!("Deleting virtual machine '{}'", name))
            .await
    }

    async fn enable_integration_service(&self, vm_name: &str, service: &str) -> BuildResult<()> {
        PowerShellBuilder::new()
            .cmdlet("Enable-VMIntegrationService")
            .arg("VMName", vm_name)
            .arg("Name", service)
            .finish()
            .run(&format!("Enabling integration service '{}'", service))
            .await
    }

    async fn attach_media(
        &self,
        vm_name: &str,
        path: &Path,
        kind: MediaKind,
        slot: Option<&MediaSlot>,
    ) -> BuildResult<MediaSlot> {
        let action = format!("Mounting {}", path.display());
        let path = path.display().to_string();

        match (kind, slot) {
            (MediaKind::Floppy, _) => {
                PowerShellBuilder::new()
                    .cmdlet("Set-VMFloppyDiskDrive")
                    .arg("VMName", vm_name)
                    .arg("Path", &path)
                    .finish()
                    .run(&action)
                    .await?;
                Ok(floppy_slot())
            }
            (MediaKind::Dvd, Some(slot)) => {
                PowerShellBuilder::new()
                    .cmdlet("Set-VMDvdDrive")
                    .arg("VMName", vm_name)
                    .arg("Path", &path)
                    .arg_raw("ControllerNumber", slot.controller_number)
                    .arg_raw("ControllerLocation", slot.controller_location)
                    .finish()
                    .run(&action)
                    .await?;
                Ok(slot.clone())
            }
            (MediaKind::Dvd, None) => {
                let output = PowerShellScript::new(ADD_DVD_DRIVE)
                    .param(vm_name)
                    .param(&path)
                    .output(&action)
                    .await?;
                parse_dvd_slot(&output).ok_or_else(|| {
                    BuildError::external(action, format!("unexpected drive output: {}", output))
                })
            }
        }
    }

    async fn detach_media(&self, vm_name: &str, slot: &MediaSlot) -> BuildResult<()> {
        let action = format!("Unmounting {}", slot);
        match slot.kind {
            MediaKind::Floppy => {
                PowerShellBuilder::new()
                    .cmdlet("Set-VMFloppyDiskDrive")
                    .arg("VMName", vm_name)
                    .arg_raw("Path", "$null")
                    .finish()
                    .run(&action)
                    .await
            }
            MediaKind::Dvd => {
                PowerShellBuilder::new()
                    .cmdlet("Remove-VMDvdDrive")
                    .arg("VMName", vm_name)
                    .arg_raw("ControllerNumber", slot.controller_number)
                    .arg_raw("ControllerLocation", slot.controller_location)
                    .finish()
                    .run(&action)
                    .await
            }
        }
    }

    async fn set_vlan(&self, vm_name: &str, switch_name: &str, vlan: VlanId) -> BuildResult<()> {
        PowerShellBuilder::new()
            .cmdlet("Set-VMNetworkAdapterVlan")
            .arg("VMName", vm_name)
            .flag("Access")
            .arg_raw("VlanId", vlan.value())
            .next()
            .cmdlet("Set-VMNetworkAdapterVlan")
            .flag("ManagementOS")
            .arg("VMNetworkAdapterName", switch_name)
            .flag("Access")
            .arg_raw("VlanId", vlan.value())
            .finish()
            .run(&format!("Setting VLAN {}", vlan))
            .await
    }

    async fn clear_vlan(&self, vm_name: &str, switch_name: &str) -> BuildResult<()> {
        PowerShellBuilder::new()
            .cmdlet("Set-VMNetworkAdapterVlan")
            .arg("VMName", vm_name)
            .flag("Untagged")
            .next()
            .cmdlet("Set-VMNetworkAdapterVlan")
            .flag("ManagementOS")
            .arg("VMNetworkAdapterName", switch_name)
            .flag("Untagged")
            .finish()
            .run("Disabling VLAN")
            .await
    }

    async fn start_vm(&self, name: &str) -> BuildResult<()> {
        PowerShellBuilder::new()
            .cmdlet("Start-VM")
            .arg("Name", name)
            .finish()
            .run(&format!("Starting virtual machine '{}'", name))
            .await
    }

    async fn stop_vm(&self, name: &str) -> BuildResult<()> {
        PowerShellScript::new(STOP_VM)
            .param(name)
            .run(&format!("Stopping virtual machine '{}'", name))
            .await
    }

    async fn restart_vm(&self, name: &str) -> BuildResult<()> {
        PowerShellBuilder::new()
            .cmdlet("Restart-VM")
            .arg("Name", name)
            .flag("Force")
            .finish()
            .run(&format!("Restarting virtual machine '{}'", name))
            .await
    }

    async fn adapter_address(&self, vm_name: &str) -> BuildResult<Option<String>> {
        let output = PowerShellScript::new(ADAPTER_ADDRESS)
            .param(vm_name)
            .output("Reading guest address")
            .await?;
        debug!("Adapter address of '{}': {}", vm_name, output);
        Ok((!output.is_empty()).then_some(output))
    }

    async fn uptime_seconds(&self, vm_name: &str) -> BuildResult<f64> {
        let action = "Reading guest uptime";
        let output = PowerShellBuilder::new()
            .cmdlet("Get-VM")
            .arg("Name", vm_name)
            .pipeline()
            .select_object_property("Uptime")
            .pipeline()
            .select_object_property("TotalSeconds")
            .finish()
            .output(action)
            .await?;
        parse_uptime(&output)
            .ok_or_else(|| BuildError::external(action, format!("unexpected uptime: {}", output)))
    }

    async fn resolve_hostname(&self, address: IpAddr) -> BuildResult<Option<String>> {
        let output = PowerShellScript::new(RESOLVE_HOSTNAME)
            .param(address)
            .output("Resolving guest hostname")
            .await?;
        Ok((!output.is_empty()).then_some(output))
    }

    async fn export_vm(&self, name: &str, destination: &Path) -> BuildResult<()> {
        PowerShellBuilder::new()
            .cmdlet("Export-VM")
            .arg("Name", name)
            .arg("Path", destination.display().to_string())
            .finish()
            .run(&format!("Exporting virtual machine '{}'", name))
            .await
    }
}
