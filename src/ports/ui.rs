// Copyright (c) 2025 - Cowboy AI, Inc.
//! UI Sink Port

use tracing::{error, info};

/// Fire-and-forget progress reporting
pub trait Ui: Send + Sync {
    /// Announce progress
    fn say(&self, message: &str);

    /// Report a failure
    fn error(&self, message: &str);
}

/// UI sink that writes to the `tracing` subscriber
#[derive(Debug, Clone, Default)]
pub struct TracingUi;

impl Ui for TracingUi {
    fn say(&self, message: &str) {
        info!(target: "cim_image_builder::ui", "{}", message);
    }

    fn error(&self, message: &str) {
        error!(target: "cim_image_builder::ui", "{}", message);
    }
}
