// Copyright (c) 2025 - Cowboy AI, Inc.
//! Guest address resolution

use async_trait::async_trait;
use std::net::IpAddr;
use tracing::{info, warn};

use crate::context::{keys, RunContext};
use crate::domain::{parse_guest_address, Hostname};
use crate::errors::BuildResult;
use crate::poll::{poll_until, Level, PollPolicy, Probe};
use crate::ports::ComputeProvider;
use crate::saga::{Step, StepAction};

/// Reads the address reported for the VM's first adapter
pub struct AddressProbe<'a> {
    compute: &'a dyn ComputeProvider,
    vm_name: &'a str,
}

impl<'a> AddressProbe<'a> {
    pub fn new(compute: &'a dyn ComputeProvider, vm_name: &'a str) -> Self {
        Self { compute, vm_name }
    }
}

#[async_trait]
impl<'a> Probe for AddressProbe<'a> {
    type Snapshot = Option<IpAddr>;

    fn describe(&self) -> String {
        format!("an address on '{}'", self.vm_name)
    }

    async fn probe(&mut self) -> BuildResult<Option<IpAddr>> {
        let raw = self.compute.adapter_address(self.vm_name).await?;
        Ok(raw.as_deref().and_then(parse_guest_address))
    }
}

/// Wait for the guest's address, then look up its hostname
///
/// The hostname is best-effort: a missing or malformed reverse lookup only
/// produces a warning.
#[derive(Debug)]
pub struct ResolveGuestAddress {
    policy: PollPolicy,
}

impl ResolveGuestAddress {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Step for ResolveGuestAddress {
    fn name(&self) -> &str {
        "Resolving guest address"
    }

    fn reads(&self) -> Vec<&'static str> {
        vec![keys::VM_NAME.name()]
    }

    fn writes(&self) -> Vec<&'static str> {
        vec![keys::GUEST_ADDRESS.name(), keys::GUEST_HOSTNAME.name()]
    }

    async fn run(&mut self, ctx: &mut RunContext) -> BuildResult<StepAction> {
        let vm_name = ctx.require(keys::VM_NAME)?.clone();
        ctx.ui().say("Waiting for the guest to report an address...");

        let mut probe = AddressProbe::new(ctx.compute(), &vm_name);
        let polled = poll_until(
            &self.policy,
            &mut probe,
            &mut Level(|address: &Option<IpAddr>| address.is_some()),
            Some(ctx.cancel_flag()),
        )
        .await?;

        let Some(address) = polled.snapshot else {
            return Ok(StepAction::Halt);
        };
        ctx.ui().say(&format!("Guest address: {}", address));

        let lookup = ctx.compute().resolve_hostname(address).await;
        match lookup {
            Ok(Some(raw)) => match Hostname::from_lookup(&raw) {
                Ok(Some(hostname)) => {
                    ctx.ui().say(&format!("Guest hostname: {}", hostname));
                    ctx.put(keys::GUEST_HOSTNAME, hostname);
                }
                Ok(None) => info!("Reverse lookup of {} returned no name", address),
                Err(err) => warn!("Ignoring hostname '{}' for {}: {}", raw.trim(), address, err),
            },
            Ok(None) => info!("No reverse lookup entry for {}", address),
            Err(err) => warn!("Reverse lookup of {} failed: {}", address, err),
        }

        ctx.put(keys::GUEST_ADDRESS, address);
        Ok(StepAction::Continue)
    }

    async fn cleanup(&mut self, _ctx: &RunContext) -> BuildResult<()> {
        Ok(())
    }
}
