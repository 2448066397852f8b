// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-image-builder
//!
//! In-memory ports that record every call, plus scripted steps for
//! exercising the saga runner without a hypervisor.
//!
//! # Design Principles
//! - Mocks never sleep; time only passes through tokio's paused clock
//! - Every external call is recorded in order, so tests assert on sequences
//! - Failures are injected by operation name

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use cim_image_builder::context::RunContext;
use cim_image_builder::domain::VlanId;
use cim_image_builder::errors::{BuildError, BuildResult};
use cim_image_builder::ports::{
    CommandOutput, ComputeProvider, Credential, MediaKind, MediaSlot, RemoteExecutor,
    RemoteHandle, SwitchAllocation, SwitchKind, Ui, VmSpec,
};
use cim_image_builder::saga::{Step, StepAction};

// ============================================================================
// Compute Provider
// ============================================================================

/// One recorded compute provider call
#[derive(Debug, Clone, PartialEq)]
pub enum ComputeCall {
    CreateSwitch(String),
    DeleteSwitch(String),
    CreateVm(VmSpec),
    DeleteVm(String),
    EnableIntegrationService(String),
    AttachMedia(MediaKind, PathBuf),
    DetachMedia(MediaSlot),
    SetVlan(u16),
    ClearVlan(String, String),
    StartVm(String),
    StopVm(String),
    RestartVm(String),
    AdapterAddress,
    Uptime,
    ResolveHostname(IpAddr),
    ExportVm(String, PathBuf),
}

/// Scripted, recording compute provider
#[derive(Default)]
pub struct MockCompute {
    calls: Mutex<Vec<ComputeCall>>,
    uptimes: Mutex<VecDeque<BuildResult<f64>>>,
    last_uptime: Mutex<f64>,
    addresses: Mutex<VecDeque<Option<String>>>,
    resolved_switch: Option<String>,
    existing_switch: bool,
    hostname: Option<String>,
    failing: Mutex<HashSet<&'static str>>,
    next_location: Mutex<u32>,
    attach_limit: Option<u32>,
}

impl MockCompute {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uptime samples, in order; the last one repeats once exhausted
    pub fn with_uptimes(self, uptimes: impl IntoIterator<Item = f64>) -> Self {
        *self.uptimes.lock().unwrap() = uptimes.into_iter().map(Ok).collect();
        self
    }

    /// Uptime results including failed probes
    pub fn with_uptime_results(self, results: Vec<BuildResult<f64>>) -> Self {
        *self.uptimes.lock().unwrap() = results.into_iter().collect();
        self
    }

    /// Raw address reports, in order; the last one repeats once exhausted
    pub fn with_addresses(self, addresses: &[Option<&str>]) -> Self {
        *self.addresses.lock().unwrap() = addresses
            .iter()
            .map(|address| address.map(str::to_string))
            .collect();
        self
    }

    /// Resolve every requested switch name to this one
    pub fn resolving_switch_to(mut self, name: &str) -> Self {
        self.resolved_switch = Some(name.to_string());
        self
    }

    /// Report the requested switch as already present
    pub fn with_existing_switch(mut self) -> Self {
        self.existing_switch = true;
        self
    }

    pub fn with_hostname(mut self, hostname: &str) -> Self {
        self.hostname = Some(hostname.to_string());
        self
    }

    /// Make an operation (by method name) fail from now on
    pub fn fail_on(self, operation: &'static str) -> Self {
        self.failing.lock().unwrap().insert(operation);
        self
    }

    /// Let the first `limit` media attachments succeed and fail the rest
    pub fn attaching_at_most(mut self, limit: u32) -> Self {
        self.attach_limit = Some(limit);
        self
    }

    pub fn calls(&self) -> Vec<ComputeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&ComputeCall) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: ComputeCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, operation: &'static str) -> BuildResult<()> {
        if self.failing.lock().unwrap().contains(operation) {
            Err(BuildError::external(operation, "injected failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ComputeProvider for MockCompute {
    async fn create_switch(&self, name: &str, _kind: &SwitchKind) -> BuildResult<SwitchAllocation> {
        self.record(ComputeCall::CreateSwitch(name.to_string()));
        self.check("create_switch")?;
        Ok(SwitchAllocation {
            name: self
                .resolved_switch
                .clone()
                .unwrap_or_else(|| name.to_string()),
            created: !self.existing_switch,
        })
    }

    async fn delete_switch(&self, name: &str) -> BuildResult<()> {
        self.record(ComputeCall::DeleteSwitch(name.to_string()));
        self.check("delete_switch")
    }

    async fn create_vm(&self, spec: &VmSpec) -> BuildResult<()> {
        self.record(ComputeCall::CreateVm(spec.clone()));
        self.check("create_vm")
    }

    async fn delete_vm(&self, name: &str) -> BuildResult<()> {
        self.record(ComputeCall::DeleteVm(name.to_string()));
        self.check("delete_vm")
    }

    async fn enable_integration_service(&self, _vm_name: &str, service: &str) -> BuildResult<()> {
        self.record(ComputeCall::EnableIntegrationService(service.to_string()));
        self.check("enable_integration_service")
    }

    async fn attach_media(
        &self,
        _vm_name: &str,
        path: &Path,
        kind: MediaKind,
        _slot: Option<&MediaSlot>,
    ) -> BuildResult<MediaSlot> {
        self.record(ComputeCall::AttachMedia(kind, path.to_path_buf()));
        self.check("attach_media")?;
        let mut next_location = self.next_location.lock().unwrap();
        if self.attach_limit.is_some_and(|limit| *next_location >= limit) {
            return Err(BuildError::external("attach_media", "no free controller"));
        }
        *next_location += 1;
        Ok(MediaSlot {
            kind,
            controller_number: 1,
            controller_location: *next_location,
        })
    }

    async fn detach_media(&self, _vm_name: &str, slot: &MediaSlot) -> BuildResult<()> {
        self.record(ComputeCall::DetachMedia(slot.clone()));
        self.check("detach_media")
    }

    async fn set_vlan(&self, _vm_name: &str, _switch_name: &str, vlan: VlanId) -> BuildResult<()> {
        self.record(ComputeCall::SetVlan(vlan.value()));
        self.check("set_vlan")
    }

    async fn clear_vlan(&self, vm_name: &str, switch_name: &str) -> BuildResult<()> {
        self.record(ComputeCall::ClearVlan(
            vm_name.to_string(),
            switch_name.to_string(),
        ));
        self.check("clear_vlan")
    }

    async fn start_vm(&self, name: &str) -> BuildResult<()> {
        self.record(ComputeCall::StartVm(name.to_string()));
        self.check("start_vm")
    }

    async fn stop_vm(&self, name: &str) -> BuildResult<()> {
        self.record(ComputeCall::StopVm(name.to_string()));
        self.check("stop_vm")
    }

    async fn restart_vm(&self, name: &str) -> BuildResult<()> {
        self.record(ComputeCall::RestartVm(name.to_string()));
        self.check("restart_vm")
    }

    async fn adapter_address(&self, _vm_name: &str) -> BuildResult<Option<String>> {
        self.record(ComputeCall::AdapterAddress);
        self.check("adapter_address")?;
        let mut addresses = self.addresses.lock().unwrap();
        if addresses.len() > 1 {
            Ok(addresses.pop_front().flatten())
        } else {
            Ok(addresses.front().cloned().flatten())
        }
    }

    async fn uptime_seconds(&self, _vm_name: &str) -> BuildResult<f64> {
        self.record(ComputeCall::Uptime);
        self.check("uptime_seconds")?;
        let next = self.uptimes.lock().unwrap().pop_front();
        let mut last = self.last_uptime.lock().unwrap();
        match next {
            Some(Ok(uptime)) => {
                *last = uptime;
                Ok(uptime)
            }
            Some(Err(err)) => Err(err),
            None => {
                *last += 10.0;
                Ok(*last)
            }
        }
    }

    async fn resolve_hostname(&self, address: IpAddr) -> BuildResult<Option<String>> {
        self.record(ComputeCall::ResolveHostname(address));
        self.check("resolve_hostname")?;
        Ok(self.hostname.clone())
    }

    async fn export_vm(&self, name: &str, destination: &Path) -> BuildResult<()> {
        self.record(ComputeCall::ExportVm(
            name.to_string(),
            destination.to_path_buf(),
        ));
        self.check("export_vm")
    }
}

// ============================================================================
// Remote Executor
// ============================================================================

/// One recorded remote executor call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Trust(String),
    Untrust(String),
    Open(String, String),
    Run(String),
    Ping,
}

/// Scripted, recording remote executor
#[derive(Default)]
pub struct MockRemote {
    calls: Mutex<Vec<RemoteCall>>,
    already_trusted: bool,
    unanswered_pings: Mutex<u32>,
    failing_command: Option<String>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report hosts as already on the trust list
    pub fn with_host_already_trusted(mut self) -> Self {
        self.already_trusted = true;
        self
    }

    /// Fail the first `count` pings
    pub fn with_unanswered_pings(self, count: u32) -> Self {
        *self.unanswered_pings.lock().unwrap() = count;
        self
    }

    /// Make this command exit non-zero
    pub fn with_failing_command(mut self, command: &str) -> Self {
        self.failing_command = Some(command.to_string());
        self
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: RemoteCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RemoteExecutor for MockRemote {
    async fn trust_host(&self, host: &str) -> BuildResult<bool> {
        self.record(RemoteCall::Trust(host.to_string()));
        Ok(!self.already_trusted)
    }

    async fn untrust_host(&self, host: &str) -> BuildResult<()> {
        self.record(RemoteCall::Untrust(host.to_string()));
        Ok(())
    }

    async fn open(&self, credential: &Credential, host: &str) -> BuildResult<RemoteHandle> {
        self.record(RemoteCall::Open(
            host.to_string(),
            credential.username.clone(),
        ));
        Ok(RemoteHandle::new(host, credential.username.clone()))
    }

    async fn run(&self, _handle: &RemoteHandle, command: &str) -> BuildResult<CommandOutput> {
        self.record(RemoteCall::Run(command.to_string()));
        if self.failing_command.as_deref() == Some(command) {
            return Ok(CommandOutput {
                stdout: String::new(),
                stderr: "access denied".to_string(),
                exit_code: 5,
            });
        }
        Ok(CommandOutput {
            stdout: format!("ran {}", command),
            ..CommandOutput::default()
        })
    }

    async fn ping(&self, handle: &RemoteHandle) -> BuildResult<()> {
        self.record(RemoteCall::Ping);
        let mut unanswered = self.unanswered_pings.lock().unwrap();
        if *unanswered > 0 {
            *unanswered -= 1;
            return Err(BuildError::external(
                format!("Checking remote channel to {}", handle.host),
                "connection refused",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// UI Sink
// ============================================================================

/// UI sink keeping every message
#[derive(Default)]
pub struct RecordingUi {
    said: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingUi {
    pub fn said(&self) -> Vec<String> {
        self.said.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl Ui for RecordingUi {
    fn say(&self, message: &str) {
        self.said.lock().unwrap().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Ports handed to one run context, kept for assertions
pub struct Harness {
    pub compute: Arc<MockCompute>,
    pub remote: Arc<MockRemote>,
    pub ui: Arc<RecordingUi>,
}

impl Harness {
    pub fn new(compute: MockCompute, remote: MockRemote) -> Self {
        Self {
            compute: Arc::new(compute),
            remote: Arc::new(remote),
            ui: Arc::new(RecordingUi::default()),
        }
    }

    pub fn context(&self) -> RunContext {
        RunContext::new(
            self.compute.clone(),
            self.remote.clone(),
            self.ui.clone(),
        )
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(MockCompute::new(), MockRemote::new())
    }
}

pub fn credential() -> Credential {
    Credential {
        username: "vagrant".to_string(),
        password: "vagrant".to_string(),
    }
}

// ============================================================================
// Scripted Steps
// ============================================================================

/// What a scripted step's forward pass does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Continue,
    /// Halt without recording an error
    Halt,
    /// Record an error, then halt
    Reject,
    Fail,
    Cancel,
    /// Continue, but raise the cancellation flag on the way out
    RaiseCancel,
}

/// Shared journal of forward and cleanup invocations
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// Step that follows a script and journals what happens to it
pub struct ScriptedStep {
    label: String,
    script: Script,
    failing_cleanup: bool,
    cancelling_cleanup: bool,
    journal: Journal,
}

impl ScriptedStep {
    pub fn new(label: &str, script: Script, journal: &Journal) -> Self {
        Self {
            label: label.to_string(),
            script,
            failing_cleanup: false,
            cancelling_cleanup: false,
            journal: Arc::clone(journal),
        }
    }

    pub fn with_failing_cleanup(mut self) -> Self {
        self.failing_cleanup = true;
        self
    }

    /// Raise the cancellation flag from inside the compensation
    pub fn with_cancelling_cleanup(mut self) -> Self {
        self.cancelling_cleanup = true;
        self
    }

    pub fn boxed(self) -> Box<dyn Step> {
        Box::new(self)
    }
}

#[async_trait]
impl Step for ScriptedStep {
    fn name(&self) -> &str {
        &self.label
    }

    async fn run(&mut self, ctx: &mut RunContext) -> BuildResult<StepAction> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("run:{}", self.label));
        match self.script {
            Script::Continue => Ok(StepAction::Continue),
            Script::Halt => Ok(StepAction::Halt),
            Script::Reject => {
                ctx.fail(BuildError::external(self.label.clone(), "rejected"));
                Ok(StepAction::Halt)
            }
            Script::Fail => Err(BuildError::external(self.label.clone(), "failed")),
            Script::Cancel => Err(BuildError::Cancelled),
            Script::RaiseCancel => {
                ctx.cancel_flag().cancel();
                Ok(StepAction::Continue)
            }
        }
    }

    async fn cleanup(&mut self, ctx: &RunContext) -> BuildResult<()> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("cleanup:{}", self.label));
        if self.cancelling_cleanup {
            ctx.cancel_flag().cancel();
        }
        if self.failing_cleanup {
            Err(BuildError::external(self.label.clone(), "cleanup failed"))
        } else {
            Ok(())
        }
    }
}

/// Journal entries, for comparing against an expected sequence
pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}
