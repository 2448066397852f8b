// Copyright (c) 2025 - Cowboy AI, Inc.
//! VLAN tagging of the build network
//!
//! ```text
//! ConfigureVlan ──► ... ──► DisableVlan
//! ```
//!
//! The host side of the tag lives on the switch's management adapter, which
//! outlives the build when the switch was reused. Tags are therefore always
//! removed: forward by [`DisableVlan`] before the VM is exported, or by the
//! compensation of [`ConfigureVlan`] when the build stops earlier.

use async_trait::async_trait;

use crate::context::{keys, RunContext};
use crate::domain::VlanId;
use crate::errors::BuildResult;
use crate::saga::{Step, StepAction};

/// Tag the VM adapter and the switch's management adapter with one VLAN
#[derive(Debug)]
pub struct ConfigureVlan {
    vlan: VlanId,
    tagged: Option<(String, String)>,
    applied: bool,
}

impl ConfigureVlan {
    pub fn new(vlan: VlanId) -> Self {
        Self {
            vlan,
            tagged: None,
            applied: false,
        }
    }
}

#[async_trait]
impl Step for ConfigureVlan {
    fn name(&self) -> &str {
        "Configuring VLAN"
    }

    fn reads(&self) -> Vec<&'static str> {
        vec![keys::VM_NAME.name(), keys::SWITCH_NAME.name()]
    }

    fn writes(&self) -> Vec<&'static str> {
        vec![keys::VLAN_TAG.name()]
    }

    async fn run(&mut self, ctx: &mut RunContext) -> BuildResult<StepAction> {
        let vm_name = ctx.require(keys::VM_NAME)?.clone();
        let switch_name = ctx.require(keys::SWITCH_NAME)?.clone();

        ctx.ui().say(&format!("Setting VLAN {}...", self.vlan));
        // a partial failure may have tagged one adapter already
        self.tagged = Some((vm_name.clone(), switch_name.clone()));
        ctx.compute()
            .set_vlan(&vm_name, &switch_name, self.vlan)
            .await?;
        self.applied = true;

        ctx.put(keys::VLAN_TAG, self.vlan);
        Ok(StepAction::Continue)
    }

    async fn cleanup(&mut self, ctx: &RunContext) -> BuildResult<()> {
        let Some((vm_name, switch_name)) = self.tagged.take() else {
            return Ok(());
        };
        if self.applied && !ctx.contains(keys::VLAN_TAG) {
            return Ok(());
        }

        ctx.ui().say("Disabling VLAN...");
        ctx.compute().clear_vlan(&vm_name, &switch_name).await
    }
}

/// Untag both adapters as a forward step and withdraw the tag
#[derive(Debug, Default)]
pub struct DisableVlan;

#[async_trait]
impl Step for DisableVlan {
    fn name(&self) -> &str {
        "Disabling VLAN"
    }

    fn reads(&self) -> Vec<&'static str> {
        vec![keys::VM_NAME.name(), keys::SWITCH_NAME.name()]
    }

    async fn run(&mut self, ctx: &mut RunContext) -> BuildResult<StepAction> {
        if !ctx.contains(keys::VLAN_TAG) {
            return Ok(StepAction::Continue);
        }
        let vm_name = ctx.require(keys::VM_NAME)?.clone();
        let switch_name = ctx.require(keys::SWITCH_NAME)?.clone();

        ctx.ui().say("Disabling VLAN...");
        ctx.compute().clear_vlan(&vm_name, &switch_name).await?;

        ctx.remove(keys::VLAN_TAG);
        Ok(StepAction::Continue)
    }

    async fn cleanup(&mut self, _ctx: &RunContext) -> BuildResult<()> {
        Ok(())
    }
}
