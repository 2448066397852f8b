// Copyright (c) 2025 - Cowboy AI, Inc.
//! ISO Install Build Profile
//!
//! Assembles the ordered step list for installing an OS from an ISO into a
//! fresh VM and exporting the result, and runs it.
//!
//! ```text
//! temp dir → output dir → [seed copy] → switch → VM → integration service
//!   → [VLAN] → DVD → [secondary DVDs] → [floppy] → start → wait for install
//!   → address → remote channel → remote check → [provision] → [restart]
//!   → [unmount floppy] → [unmount secondary DVDs] → unmount DVD
//!   → [disable VLAN] → stop → export
//! ```
//!
//! Bracketed steps are only included when configured.

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ValidatedConfig;
use crate::context::{CancelFlag, RunContext};
use crate::errors::{BuildError, BuildResult};
use crate::ports::{ComputeProvider, RemoteExecutor, Ui};
use crate::saga::{RunReport, SagaRunner, Step};
use crate::steps::{
    CheckRemoting, ConfigureVlan, CopySeedImage, CreateSwitch, CreateTempDir, CreateVm,
    DisableVlan, EnableIntegrationService, EstablishRemoteChannel, ExportVm, MountMedia,
    MountSecondaryDvds, PrepareOutputDir, Provision, ResolveGuestAddress, RestartVm, StartVm,
    StopVm, UnmountMedia, UnmountSecondaryDvds, WaitForInstall,
};

/// Ordered steps of an ISO install build
pub fn iso_install_steps(config: &ValidatedConfig) -> Vec<Box<dyn Step>> {
    let mut steps: Vec<Box<dyn Step>> = vec![
        Box::new(CreateTempDir::new()),
        Box::new(PrepareOutputDir::new(&config.output_dir, config.force)),
    ];

    if let Some(seed_image) = &config.seed_image {
        steps.push(Box::new(CopySeedImage::new(seed_image)));
    }

    steps.push(Box::new(CreateSwitch::new(
        &config.switch_name,
        config.switch_kind.clone(),
    )));
    steps.push(Box::new(CreateVm::new(
        &config.vm_name,
        &config.vm_dir,
        config.memory_bytes,
        config.disk_bytes,
    )));
    steps.push(Box::new(EnableIntegrationService::guest_service_interface()));

    if let Some(vlan) = config.vlan {
        steps.push(Box::new(ConfigureVlan::new(vlan)));
    }

    steps.push(Box::new(MountMedia::dvd(&config.iso_path)));
    if !config.secondary_iso_images.is_empty() {
        steps.push(Box::new(MountSecondaryDvds::new(
            config.secondary_iso_images.clone(),
        )));
    }
    if config.seed_image.is_some() {
        steps.push(Box::new(MountMedia::floppy()));
    }

    steps.push(Box::new(StartVm::new(config.start_settle)));
    steps.push(Box::new(
        WaitForInstall::new(config.expected_reboot_count, config.install_poll.clone())
            .with_jitter_tolerance(config.reboot_jitter_tolerance_secs),
    ));
    steps.push(Box::new(ResolveGuestAddress::new(
        config.address_poll.clone(),
    )));
    steps.push(Box::new(EstablishRemoteChannel::new(
        config.credential.clone(),
    )));
    steps.push(Box::new(CheckRemoting::new(config.remote_poll.clone())));

    if !config.provision_commands.is_empty() {
        steps.push(Box::new(Provision::new(config.provision_commands.clone())));
    }
    if config.restart_after_provision {
        steps.push(Box::new(RestartVm::new(config.restart_settle)));
    }

    if config.seed_image.is_some() {
        steps.push(Box::new(UnmountMedia::floppy()));
    }
    if !config.secondary_iso_images.is_empty() {
        steps.push(Box::new(UnmountSecondaryDvds));
    }
    steps.push(Box::new(UnmountMedia::dvd()));
    if config.vlan.is_some() {
        steps.push(Box::new(DisableVlan));
    }
    steps.push(Box::new(StopVm));
    steps.push(Box::new(ExportVm));

    steps
}

/// Runs the ISO install profile against a set of ports
pub struct ImageBuilder {
    config: ValidatedConfig,
    compute: Arc<dyn ComputeProvider>,
    remote: Arc<dyn RemoteExecutor>,
    ui: Arc<dyn Ui>,
}

impl ImageBuilder {
    pub fn new(
        config: ValidatedConfig,
        compute: Arc<dyn ComputeProvider>,
        remote: Arc<dyn RemoteExecutor>,
        ui: Arc<dyn Ui>,
    ) -> Self {
        Self {
            config,
            compute,
            remote,
            ui,
        }
    }

    pub fn config(&self) -> &ValidatedConfig {
        &self.config
    }

    /// Run the build to its single outcome
    ///
    /// Fails without running anything if the step list reads a key no
    /// earlier step writes.
    pub async fn run(&self, cancel: CancelFlag) -> BuildResult<RunReport> {
        for warning in &self.config.warnings {
            warn!("{}", warning);
            self.ui.say(&format!("Warning: {}", warning));
        }

        let runner = SagaRunner::new(iso_install_steps(&self.config));
        if let Err(unsatisfied) = runner.check_dependencies(&[]) {
            let messages: Vec<String> = unsatisfied.iter().map(ToString::to_string).collect();
            return Err(BuildError::Configuration(messages.join("; ")));
        }
        info!(
            "Building '{}' with {} steps",
            self.config.vm_name,
            runner.step_names().len()
        );

        let mut ctx = RunContext::new(
            Arc::clone(&self.compute),
            Arc::clone(&self.remote),
            Arc::clone(&self.ui),
        )
        .with_cancel_flag(cancel);

        Ok(runner.run(&mut ctx).await)
    }
}
