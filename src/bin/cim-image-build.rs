// Copyright (c) 2025 - Cowboy AI, Inc.
//! Image Build CLI
//!
//! Builds a VM image from an installation ISO on the local Hyper-V host and
//! exports it to the configured output directory.
//!
//! Run with: cim-image-build <config.json>
//!
//! Prerequisites:
//! 1. Elevated PowerShell session on a Hyper-V host
//! 2. WinRM client enabled (the guest is added to TrustedHosts for the build)
//! 3. Options may be overridden with CIM_IMAGE_* environment variables
//!    (CIM_IMAGE_PASSWORD keeps the guest password out of the config file)
//!
//! Ctrl-C requests cancellation; the build stops at the next step boundary
//! and cleans up what it created.

use anyhow::{bail, Context, Result};
use cim_image_builder::{
    adapters::{HypervProvider, PowerShellRemoting},
    BuildConfig, CancelFlag, ImageBuilder, Outcome, TracingUi,
};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .context("usage: cim-image-build <config.json>")?;

    let mut config = BuildConfig::from_file(&path)
        .with_context(|| format!("Failed to load configuration from {}", path))?;
    config
        .apply_env()
        .context("Failed to apply CIM_IMAGE_* overrides")?;
    let config = config.validate().context("Invalid build configuration")?;

    info!("🚀 Starting image build");
    info!("  - VM: {}", config.vm_name);
    info!("  - Switch: {} ({})", config.switch_name, config.switch_kind);
    info!("  - ISO: {}", config.iso_path.display());
    info!("  - Output: {}", config.output_dir.display());

    let cancel = CancelFlag::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Cancellation requested, stopping at the next step boundary");
            on_signal.cancel();
        }
    });

    let builder = ImageBuilder::new(
        config,
        Arc::new(HypervProvider::new()),
        Arc::new(PowerShellRemoting::new()),
        Arc::new(TracingUi),
    );
    let report = builder.run(cancel).await?;

    for failure in &report.cleanup_failures {
        warn!("⚠️  Cleanup of '{}' failed: {}", failure.step, failure.error);
    }

    match report.outcome {
        Outcome::Completed(Some(artifact)) => {
            info!("✅ {}", artifact);
            println!("{}", artifact.dir.display());
            Ok(())
        }
        Outcome::Completed(None) => {
            info!("✅ Build completed without an artifact");
            Ok(())
        }
        Outcome::Halted(err) => {
            error!("❌ Build failed: {}", err);
            bail!(err)
        }
        Outcome::Cancelled => bail!("build cancelled"),
    }
}
