// Copyright (c) 2025 - Cowboy AI, Inc.
//! Unattended install wait
//!
//! The guest reports nothing while Windows setup runs; the only observable
//! is its uptime, which drops back towards zero on every reboot. Setup is
//! finished once the expected number of reboots has been seen.

use async_trait::async_trait;

use crate::context::{keys, RunContext};
use crate::errors::BuildResult;
use crate::poll::{poll_until, PollPolicy, Probe, RebootDetector};
use crate::ports::ComputeProvider;
use crate::saga::{Step, StepAction};

/// Samples guest uptime in seconds
pub struct UptimeProbe<'a> {
    compute: &'a dyn ComputeProvider,
    vm_name: &'a str,
}

impl<'a> UptimeProbe<'a> {
    pub fn new(compute: &'a dyn ComputeProvider, vm_name: &'a str) -> Self {
        Self { compute, vm_name }
    }
}

#[async_trait]
impl<'a> Probe for UptimeProbe<'a> {
    type Snapshot = f64;

    fn describe(&self) -> String {
        format!("reboots of '{}'", self.vm_name)
    }

    async fn probe(&mut self) -> BuildResult<f64> {
        self.compute.uptime_seconds(self.vm_name).await
    }
}

/// Wait until the guest has rebooted the expected number of times
#[derive(Debug)]
pub struct WaitForInstall {
    expected_reboots: u32,
    jitter_tolerance_secs: f64,
    policy: PollPolicy,
}

impl WaitForInstall {
    pub fn new(expected_reboots: u32, policy: PollPolicy) -> Self {
        Self {
            expected_reboots,
            jitter_tolerance_secs: 0.0,
            policy,
        }
    }

    pub fn with_jitter_tolerance(mut self, seconds: f64) -> Self {
        self.jitter_tolerance_secs = seconds;
        self
    }
}

#[async_trait]
impl Step for WaitForInstall {
    fn name(&self) -> &str {
        "Waiting for installation to finish"
    }

    fn reads(&self) -> Vec<&'static str> {
        vec![keys::VM_NAME.name()]
    }

    async fn run(&mut self, ctx: &mut RunContext) -> BuildResult<StepAction> {
        let vm_name = ctx.require(keys::VM_NAME)?.clone();
        ctx.ui().say(&format!(
            "Waiting for the unattended install to finish ({} reboots expected)...",
            self.expected_reboots
        ));

        let mut detector = RebootDetector::new(self.expected_reboots)
            .with_jitter_tolerance(self.jitter_tolerance_secs);
        let mut probe = UptimeProbe::new(ctx.compute(), &vm_name);
        let polled = poll_until(
            &self.policy,
            &mut probe,
            &mut detector,
            Some(ctx.cancel_flag()),
        )
        .await?;

        for event in detector.events() {
            ctx.ui().say(&format!(
                "Detected reboot {} after {:.0}s of uptime",
                event.count, event.uptime_before
            ));
        }
        ctx.ui().say(&format!(
            "Install finished after {} uptime samples",
            polled.attempts
        ));
        Ok(StepAction::Continue)
    }

    async fn cleanup(&mut self, _ctx: &RunContext) -> BuildResult<()> {
        Ok(())
    }
}
