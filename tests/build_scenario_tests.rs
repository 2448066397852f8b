// Copyright (c) 2025 - Cowboy AI, Inc.
//! End-to-end ISO install scenarios
//!
//! The full step list runs against mock ports on a paused clock, so the
//! install, address and remoting waits finish without real delays.

mod fixtures;

use fixtures::{credential, ComputeCall, Harness, MockCompute, MockRemote, RemoteCall};
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use cim_image_builder::errors::BuildError;
use cim_image_builder::saga::Outcome;
use cim_image_builder::{BuildConfig, CancelFlag, ImageBuilder};

const MIB: u64 = 1024 * 1024;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("install.iso"), b"iso").unwrap();
        Self { dir }
    }

    fn extra_iso(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"iso").unwrap();
        path
    }

    fn output_dir(&self) -> PathBuf {
        self.dir.path().join("output")
    }

    fn vm_dir(&self) -> PathBuf {
        self.dir.path().join("vm")
    }

    fn config(&self) -> BuildConfig {
        BuildConfig {
            disk_size_mb: 20480,
            memory_size_mb: 2048,
            vm_name: "pvm_scenario".to_string(),
            switch_name: "sw1".to_string(),
            iso_path: self.dir.path().join("install.iso"),
            output_dir: self.output_dir(),
            vm_dir: Some(self.vm_dir()),
            expected_reboot_count: 2,
            credential: Some(credential()),
            ..BuildConfig::default()
        }
    }
}

fn builder(config: BuildConfig, harness: &Harness) -> ImageBuilder {
    ImageBuilder::new(
        config.validate().unwrap(),
        harness.compute.clone(),
        harness.remote.clone(),
        harness.ui.clone(),
    )
}

fn installing_guest() -> MockCompute {
    MockCompute::new()
        .with_uptimes([5.0, 40.0, 75.0, 3.0, 30.0, 2.0, 50.0])
        .with_addresses(&[None, None, Some("10.0.0.7")])
}

#[tokio::test(start_paused = true)]
async fn test_iso_install_completes_with_artifact() {
    let workspace = Workspace::new();
    let harness = Harness::new(installing_guest(), MockRemote::new());

    let report = builder(workspace.config(), &harness)
        .run(CancelFlag::new())
        .await
        .unwrap();

    let Outcome::Completed(Some(artifact)) = &report.outcome else {
        panic!("expected completed build, got {:?}", report.outcome);
    };
    assert_eq!(artifact.dir, workspace.output_dir());
    assert_eq!(artifact.vm_name.as_deref(), Some("pvm_scenario"));
    assert!(report.cleanup_failures.is_empty());

    let compute = &harness.compute;
    assert_eq!(compute.count(|c| matches!(c, ComputeCall::CreateVm(_))), 1);
    assert_eq!(compute.count(|c| matches!(c, ComputeCall::ExportVm(..))), 1);
    assert_eq!(compute.count(|c| matches!(c, ComputeCall::DeleteVm(_))), 0);
    assert_eq!(compute.count(|c| matches!(c, ComputeCall::DeleteSwitch(_))), 0);
    assert_eq!(compute.count(|c| matches!(c, ComputeCall::Uptime)), 6);
    assert_eq!(compute.count(|c| matches!(c, ComputeCall::AdapterAddress)), 3);

    let spec = compute
        .calls()
        .into_iter()
        .find_map(|call| match call {
            ComputeCall::CreateVm(spec) => Some(spec),
            _ => None,
        })
        .unwrap();
    assert_eq!(spec.disk_bytes, 20480 * MIB);
    assert_eq!(spec.memory_bytes, 2048 * MIB);
    assert_eq!(spec.switch_name, "sw1");

    assert!(workspace.output_dir().is_dir());
    assert!(harness
        .remote
        .calls()
        .contains(&RemoteCall::Untrust("10.0.0.7".to_string())));
}

#[tokio::test(start_paused = true)]
async fn test_forward_order_matches_profile() {
    let workspace = Workspace::new();
    let harness = Harness::new(installing_guest(), MockRemote::new());

    let report = builder(workspace.config(), &harness)
        .run(CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(
        report.executed,
        vec![
            "Creating temporary directory",
            "Preparing output directory",
            "Creating switch",
            "Creating virtual machine",
            "Enabling integration service",
            "Mounting installation media",
            "Starting virtual machine",
            "Waiting for installation to finish",
            "Resolving guest address",
            "Establishing remote channel",
            "Checking remote channel",
            "Unmounting installation media",
            "Stopping virtual machine",
            "Exporting virtual machine",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_vlan_and_secondary_dvds_are_released_before_export() {
    let workspace = Workspace::new();
    let harness = Harness::new(installing_guest(), MockRemote::new());
    let config = BuildConfig {
        vlan_id: Some(1724),
        secondary_iso_images: vec![
            workspace.extra_iso("drivers.iso"),
            workspace.extra_iso("tools.iso"),
        ],
        ..workspace.config()
    };

    let report = builder(config, &harness)
        .run(CancelFlag::new())
        .await
        .unwrap();

    assert!(report.outcome.is_completed());
    let tail: Vec<&str> = report.executed[report.executed.len() - 5..]
        .iter()
        .map(String::as_str)
        .collect();
    assert_eq!(
        tail,
        vec![
            "Unmounting secondary DVD images",
            "Unmounting installation media",
            "Disabling VLAN",
            "Stopping virtual machine",
            "Exporting virtual machine",
        ]
    );

    let calls = harness.compute.calls();
    let export = calls
        .iter()
        .position(|c| matches!(c, ComputeCall::ExportVm(..)))
        .unwrap();
    let (before_export, after_export) = calls.split_at(export);
    assert_eq!(
        before_export
            .iter()
            .filter(|c| matches!(c, ComputeCall::ClearVlan(..)))
            .count(),
        1
    );
    assert_eq!(
        before_export
            .iter()
            .filter(|c| matches!(c, ComputeCall::DetachMedia(_)))
            .count(),
        3
    );
    assert!(!after_export
        .iter()
        .any(|c| matches!(c, ComputeCall::DetachMedia(_) | ComputeCall::ClearVlan(..))));
}

#[tokio::test(start_paused = true)]
async fn test_failed_export_rolls_everything_back() {
    let workspace = Workspace::new();
    let harness = Harness::new(installing_guest().fail_on("export_vm"), MockRemote::new());

    let report = builder(workspace.config(), &harness)
        .run(CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        Outcome::Halted(BuildError::external("export_vm", "injected failure"))
    );
    let compute = &harness.compute;
    assert_eq!(compute.count(|c| matches!(c, ComputeCall::DeleteVm(_))), 1);
    assert_eq!(compute.count(|c| matches!(c, ComputeCall::DeleteSwitch(_))), 1);
    assert!(!workspace.output_dir().exists());
    assert!(!workspace.vm_dir().exists());

    let calls = compute.calls();
    let delete_vm = calls
        .iter()
        .position(|c| matches!(c, ComputeCall::DeleteVm(_)))
        .unwrap();
    let delete_switch = calls
        .iter()
        .position(|c| matches!(c, ComputeCall::DeleteSwitch(_)))
        .unwrap();
    assert!(delete_vm < delete_switch);
}

#[tokio::test(start_paused = true)]
async fn test_install_timeout_halts_with_timeout() {
    let workspace = Workspace::new();
    let harness = Harness::new(
        MockCompute::new().with_addresses(&[Some("10.0.0.7")]),
        MockRemote::new(),
    );
    let config = BuildConfig {
        install_timeout_mins: 1,
        ..workspace.config()
    };

    let report = builder(config, &harness)
        .run(CancelFlag::new())
        .await
        .unwrap();

    assert!(matches!(
        report.outcome,
        Outcome::Halted(BuildError::Timeout { .. })
    ));
    assert_eq!(
        harness
            .compute
            .count(|c| matches!(c, ComputeCall::AdapterAddress)),
        0
    );
    assert!(harness
        .ui
        .errors()
        .iter()
        .any(|message| message.starts_with("Waiting for installation")));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_run_creates_nothing() {
    let workspace = Workspace::new();
    let harness = Harness::new(installing_guest(), MockRemote::new());
    let cancel = CancelFlag::new();
    cancel.cancel();

    let report = builder(workspace.config(), &harness)
        .run(cancel)
        .await
        .unwrap();

    assert_eq!(report.outcome, Outcome::Cancelled);
    assert!(harness.compute.calls().is_empty());
    assert!(!workspace.output_dir().exists());
}

#[tokio::test(start_paused = true)]
async fn test_provisioning_and_restart_run_after_remoting() {
    let workspace = Workspace::new();
    let harness = Harness::new(installing_guest(), MockRemote::new().with_unanswered_pings(1));
    let config = BuildConfig {
        provision_commands: vec!["hostname".to_string()],
        restart_after_provision: true,
        ..workspace.config()
    };

    let report = builder(config, &harness)
        .run(CancelFlag::new())
        .await
        .unwrap();

    assert!(report.outcome.is_completed());
    assert!(harness
        .remote
        .calls()
        .contains(&RemoteCall::Run("hostname".to_string())));
    assert_eq!(
        harness
            .compute
            .count(|c| matches!(c, ComputeCall::RestartVm(_))),
        1
    );
}

#[tokio::test]
async fn test_builder_reports_warnings_to_ui() {
    let workspace = Workspace::new();
    let harness = Harness::new(
        installing_guest(),
        MockRemote::new(),
    );
    let config = BuildConfig {
        expected_reboot_count: 0,
        ..workspace.config()
    };
    let builder = ImageBuilder::new(
        config.validate().unwrap(),
        Arc::clone(&harness.compute) as _,
        Arc::clone(&harness.remote) as _,
        Arc::clone(&harness.ui) as _,
    );
    assert!(!builder.config().warnings.is_empty());

    let cancel = CancelFlag::new();
    cancel.cancel();
    builder.run(cancel).await.unwrap();

    assert!(harness
        .ui
        .said()
        .iter()
        .any(|message| message.starts_with("Warning:")));
}
