// Copyright (c) 2025 - Cowboy AI, Inc.
//! Virtual machine creation and guest services

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::warn;

use crate::context::{keys, RunContext};
use crate::errors::BuildResult;
use crate::ports::VmSpec;
use crate::saga::{Step, StepAction};

/// Integration service that lets the host copy files into the guest
pub const GUEST_SERVICE_INTERFACE: &str = "Guest Service Interface";

/// Create the build VM on the resolved switch
///
/// The VM is the build's product: it is deleted on cleanup only when the
/// build did not complete, together with the directory holding its files.
/// The directory is tracked apart from the VM, since a failed create can
/// leave a partial disk behind without registering anything.
#[derive(Debug)]
pub struct CreateVm {
    vm_name: String,
    vm_dir: PathBuf,
    memory_bytes: u64,
    disk_bytes: u64,
    created: Option<String>,
    created_dir: Option<PathBuf>,
}

impl CreateVm {
    pub fn new(
        vm_name: impl Into<String>,
        vm_dir: impl Into<PathBuf>,
        memory_bytes: u64,
        disk_bytes: u64,
    ) -> Self {
        Self {
            vm_name: vm_name.into(),
            vm_dir: vm_dir.into(),
            memory_bytes,
            disk_bytes,
            created: None,
            created_dir: None,
        }
    }
}

#[async_trait]
impl Step for CreateVm {
    fn name(&self) -> &str {
        "Creating virtual machine"
    }

    fn reads(&self) -> Vec<&'static str> {
        vec![keys::SWITCH_NAME.name()]
    }

    fn writes(&self) -> Vec<&'static str> {
        vec![keys::VM_NAME.name()]
    }

    async fn run(&mut self, ctx: &mut RunContext) -> BuildResult<StepAction> {
        let spec = VmSpec {
            name: self.vm_name.clone(),
            path: self.vm_dir.clone(),
            memory_bytes: self.memory_bytes,
            disk_bytes: self.disk_bytes,
            switch_name: ctx.require(keys::SWITCH_NAME)?.clone(),
        };

        ctx.ui()
            .say(&format!("Creating virtual machine '{}'...", spec.name));
        if !tokio::fs::try_exists(&spec.path).await? {
            tokio::fs::create_dir_all(&spec.path).await?;
            self.created_dir = Some(spec.path.clone());
        }
        ctx.compute().create_vm(&spec).await?;
        self.created = Some(spec.name.clone());

        ctx.put(keys::VM_NAME, spec.name);
        Ok(StepAction::Continue)
    }

    async fn cleanup(&mut self, ctx: &RunContext) -> BuildResult<()> {
        if ctx.run_completed() {
            return Ok(());
        }

        if let Some(name) = self.created.take() {
            ctx.ui()
                .say(&format!("Unregistering and deleting virtual machine '{}'...", name));
            ctx.compute().delete_vm(&name).await?;
        }

        let Some(dir) = self.created_dir.take() else {
            return Ok(());
        };
        if let Err(err) = tokio::fs::remove_dir_all(&dir).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove VM directory {}: {}", dir.display(), err);
            }
        }
        Ok(())
    }
}

/// Enable a guest integration service on the build VM
#[derive(Debug)]
pub struct EnableIntegrationService {
    service: String,
}

impl EnableIntegrationService {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn guest_service_interface() -> Self {
        Self::new(GUEST_SERVICE_INTERFACE)
    }
}

#[async_trait]
impl Step for EnableIntegrationService {
    fn name(&self) -> &str {
        "Enabling integration service"
    }

    fn reads(&self) -> Vec<&'static str> {
        vec![keys::VM_NAME.name()]
    }

    async fn run(&mut self, ctx: &mut RunContext) -> BuildResult<StepAction> {
        let vm_name = ctx.require(keys::VM_NAME)?;
        ctx.ui()
            .say(&format!("Enabling integration service '{}'...", self.service));
        ctx.compute()
            .enable_integration_service(vm_name, &self.service)
            .await?;
        Ok(StepAction::Continue)
    }

    async fn cleanup(&mut self, _ctx: &RunContext) -> BuildResult<()> {
        Ok(())
    }
}
