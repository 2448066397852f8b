// Copyright (c) 2025 - Cowboy AI, Inc.
//! Shared Run Context
//!
//! The one piece of mutable state a build shares between its steps. Values
//! are stored under typed keys declared in [`keys`], so a read either yields
//! the type the writer stored or nothing at all; there are no casts at the
//! call site.
//!
//! # Lifecycle
//!
//! ```text
//! created per build ──► forward steps put/get ──► compensations read ──► dropped
//! ```
//!
//! Besides the keyed values the context owns three dedicated slots:
//!
//! - the terminal error (first error recorded wins),
//! - the cancellation flag, shared with whoever may cancel the build,
//! - the completion marker the runner sets when every step continued.
//!
//! It also carries the ports, so steps reach the outside world only through
//! the context they are handed.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::{BuildError, BuildResult};
use crate::ports::{ComputeProvider, RemoteExecutor, Ui};

/// Name and value type of one context entry
pub struct ContextKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ContextKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ContextKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ContextKey<T> {}

impl<T> fmt::Debug for ContextKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextKey({})", self.name)
    }
}

/// Every key a build step may read or write
pub mod keys {
    use std::net::IpAddr;
    use std::path::PathBuf;

    use super::ContextKey;
    use crate::domain::{Hostname, VlanId};
    use crate::ports::{MediaSlot, RemoteHandle};

    /// Scratch directory for seed copies; removed when the build ends
    pub const TEMP_DIR: ContextKey<PathBuf> = ContextKey::new("temp_dir");
    /// Output directory the artifact is exported into
    pub const OUTPUT_DIR: ContextKey<PathBuf> = ContextKey::new("output_dir");
    /// Seed image to present to the guest as a floppy
    pub const SEED_IMAGE: ContextKey<PathBuf> = ContextKey::new("seed_image");
    /// Resolved switch name
    pub const SWITCH_NAME: ContextKey<String> = ContextKey::new("switch_name");
    pub const VM_NAME: ContextKey<String> = ContextKey::new("vm_name");
    /// Slot holding the installation media while it is attached
    pub const DVD_SLOT: ContextKey<MediaSlot> = ContextKey::new("dvd_slot");
    /// Slot holding the seed floppy while it is attached
    pub const FLOPPY_SLOT: ContextKey<MediaSlot> = ContextKey::new("floppy_slot");
    /// Slots of the extra DVD drives, in attach order
    pub const SECONDARY_DVD_SLOTS: ContextKey<Vec<MediaSlot>> =
        ContextKey::new("secondary_dvd_slots");
    /// VLAN the build network is tagged with until it is untagged again
    pub const VLAN_TAG: ContextKey<VlanId> = ContextKey::new("vlan_tag");
    pub const GUEST_ADDRESS: ContextKey<IpAddr> = ContextKey::new("guest_address");
    pub const GUEST_HOSTNAME: ContextKey<Hostname> = ContextKey::new("guest_hostname");
    pub const REMOTE_HANDLE: ContextKey<RemoteHandle> = ContextKey::new("remote_handle");
    /// Directory holding the exported VM
    pub const ARTIFACT_DIR: ContextKey<PathBuf> = ContextKey::new("artifact_dir");
}

/// Cooperative cancellation signal shared between a build and its caller
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; observed at step and poll-interval boundaries
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Mutable state shared by the steps of one build
pub struct RunContext {
    values: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
    error: Option<BuildError>,
    cancel: CancelFlag,
    completed: bool,
    compute: Arc<dyn ComputeProvider>,
    remote: Arc<dyn RemoteExecutor>,
    ui: Arc<dyn Ui>,
}

impl RunContext {
    /// Create an empty context over the given ports
    pub fn new(
        compute: Arc<dyn ComputeProvider>,
        remote: Arc<dyn RemoteExecutor>,
        ui: Arc<dyn Ui>,
    ) -> Self {
        Self {
            values: HashMap::new(),
            error: None,
            cancel: CancelFlag::new(),
            completed: false,
            compute,
            remote,
            ui,
        }
    }

    /// Share an externally owned cancellation flag
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Store a value, replacing any previous value under the key
    pub fn put<T: Any + Send + Sync>(&mut self, key: ContextKey<T>, value: T) {
        self.values.insert(key.name, Box::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self, key: ContextKey<T>) -> Option<&T> {
        self.values
            .get(key.name)
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Read a value a predecessor must have written
    ///
    /// A missing key means the step list is ordered wrong, not that the
    /// outside world misbehaved.
    pub fn require<T: Any + Send + Sync>(&self, key: ContextKey<T>) -> BuildResult<&T> {
        self.get(key)
            .ok_or(BuildError::MissingContextKey(key.name))
    }

    pub fn remove<T: Any + Send + Sync>(&mut self, key: ContextKey<T>) -> Option<T> {
        let value = self.values.remove(key.name)?;
        value.downcast::<T>().ok().map(|boxed| *boxed)
    }

    pub fn contains<T: Any + Send + Sync>(&self, key: ContextKey<T>) -> bool {
        self.get(key).is_some()
    }

    /// Names of every key currently present
    pub fn key_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.values.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Record the terminal error; the first one recorded is kept
    pub fn fail(&mut self, error: BuildError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    pub fn error(&self) -> Option<&BuildError> {
        self.error.as_ref()
    }

    pub(crate) fn take_error(&mut self) -> Option<BuildError> {
        self.error.take()
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn mark_completed(&mut self) {
        self.completed = true;
    }

    /// Whether every step ran forward successfully
    ///
    /// Compensations use this to keep what the build produced and only roll
    /// back when the run halted or was cancelled. The marker is set once,
    /// after the forward pass, so a cancellation raised during unwind does
    /// not turn a completed build into a rolled-back one.
    pub fn run_completed(&self) -> bool {
        self.completed
    }

    pub fn compute(&self) -> &dyn ComputeProvider {
        self.compute.as_ref()
    }

    pub fn remote(&self) -> &dyn RemoteExecutor {
        self.remote.as_ref()
    }

    pub fn ui(&self) -> &dyn Ui {
        self.ui.as_ref()
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("keys", &self.key_names())
            .field("error", &self.error)
            .field("cancelled", &self.is_cancelled())
            .field("completed", &self.completed)
            .finish()
    }
}
