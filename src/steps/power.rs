// Copyright (c) 2025 - Cowboy AI, Inc.
//! VM power transitions
//!
//! Settle delays after start and restart are fixed waits, configured per
//! build; they are the only sleeps outside the convergence poller.

use async_trait::async_trait;
use std::time::Duration;

use crate::context::{keys, RunContext};
use crate::errors::BuildResult;
use crate::saga::{Step, StepAction};

async fn settle(ctx: &RunContext, delay: Duration, reason: &str) {
    if delay.is_zero() {
        return;
    }
    ctx.ui()
        .say(&format!("Waiting {}s {}...", delay.as_secs(), reason));
    tokio::time::sleep(delay).await;
}

/// Power on the build VM
#[derive(Debug, Default)]
pub struct StartVm {
    settle: Duration,
}

impl StartVm {
    pub fn new(settle: Duration) -> Self {
        Self { settle }
    }
}

#[async_trait]
impl Step for StartVm {
    fn name(&self) -> &str {
        "Starting virtual machine"
    }

    fn reads(&self) -> Vec<&'static str> {
        vec![keys::VM_NAME.name()]
    }

    async fn run(&mut self, ctx: &mut RunContext) -> BuildResult<StepAction> {
        let vm_name = ctx.require(keys::VM_NAME)?;
        ctx.ui()
            .say(&format!("Starting virtual machine '{}'...", vm_name));
        ctx.compute().start_vm(vm_name).await?;

        settle(ctx, self.settle, "for the virtual machine to boot").await;
        Ok(StepAction::Continue)
    }

    async fn cleanup(&mut self, _ctx: &RunContext) -> BuildResult<()> {
        Ok(())
    }
}

/// Shut the build VM down before export
#[derive(Debug, Default)]
pub struct StopVm;

#[async_trait]
impl Step for StopVm {
    fn name(&self) -> &str {
        "Stopping virtual machine"
    }

    fn reads(&self) -> Vec<&'static str> {
        vec![keys::VM_NAME.name()]
    }

    async fn run(&mut self, ctx: &mut RunContext) -> BuildResult<StepAction> {
        let vm_name = ctx.require(keys::VM_NAME)?;
        ctx.ui().say("Shutting down virtual machine...");
        ctx.compute().stop_vm(vm_name).await?;
        Ok(StepAction::Continue)
    }

    async fn cleanup(&mut self, _ctx: &RunContext) -> BuildResult<()> {
        Ok(())
    }
}

/// Restart the guest and wait for it to come back
#[derive(Debug)]
pub struct RestartVm {
    settle: Duration,
}

impl RestartVm {
    pub fn new(settle: Duration) -> Self {
        Self { settle }
    }
}

#[async_trait]
impl Step for RestartVm {
    fn name(&self) -> &str {
        "Restarting virtual machine"
    }

    fn reads(&self) -> Vec<&'static str> {
        vec![keys::VM_NAME.name()]
    }

    async fn run(&mut self, ctx: &mut RunContext) -> BuildResult<StepAction> {
        let vm_name = ctx.require(keys::VM_NAME)?;
        ctx.ui().say("Restarting virtual machine...");
        ctx.compute().restart_vm(vm_name).await?;

        settle(ctx, self.settle, "for the virtual machine to complete rebooting").await;
        Ok(StepAction::Continue)
    }

    async fn cleanup(&mut self, _ctx: &RunContext) -> BuildResult<()> {
        Ok(())
    }
}
