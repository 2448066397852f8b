// Copyright (c) 2025 - Cowboy AI, Inc.
//! Installation and seed media
//!
//! ```text
//! CopySeedImage ──► MountFloppy ──► ... ──► UnmountFloppy
//! MountDvd      ──────────────────► ... ──► UnmountDvd
//! MountSecondaryDvds ─────────────► ... ──► UnmountSecondaryDvds
//! ```
//!
//! The forward unmount steps detach and then withdraw the slot key, so the
//! mount steps' compensations only detach media that is still published.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::context::{keys, ContextKey, RunContext};
use crate::errors::BuildResult;
use crate::ports::{MediaKind, MediaSlot};
use crate::saga::{Step, StepAction};

/// Extension Hyper-V expects for virtual floppy disks
pub const FLOPPY_EXTENSION: &str = "vfd";

/// Copy the seed image into the temporary directory under a `.vfd` name
///
/// The hypervisor infers the media format from the file extension, so the
/// user's image is never attached in place. The copy is always deleted on
/// cleanup.
#[derive(Debug)]
pub struct CopySeedImage {
    source: PathBuf,
    copied: Option<PathBuf>,
}

impl CopySeedImage {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            copied: None,
        }
    }
}

#[async_trait]
impl Step for CopySeedImage {
    fn name(&self) -> &str {
        "Copying floppy seed image"
    }

    fn reads(&self) -> Vec<&'static str> {
        vec![keys::TEMP_DIR.name()]
    }

    fn writes(&self) -> Vec<&'static str> {
        vec![keys::SEED_IMAGE.name()]
    }

    async fn run(&mut self, ctx: &mut RunContext) -> BuildResult<StepAction> {
        let destination = seed_destination(ctx.require(keys::TEMP_DIR)?, &self.source);

        ctx.ui().say(&format!(
            "Copying floppy seed image {}...",
            self.source.display()
        ));
        self.copied = Some(destination.clone());
        tokio::fs::copy(&self.source, &destination).await?;
        debug!("Seed image copied to {}", destination.display());

        ctx.put(keys::SEED_IMAGE, destination);
        Ok(StepAction::Continue)
    }

    async fn cleanup(&mut self, ctx: &RunContext) -> BuildResult<()> {
        let Some(copied) = self.copied.take() else {
            return Ok(());
        };

        ctx.ui().say("Deleting floppy seed copy...");
        match tokio::fs::remove_file(&copied).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn seed_destination(temp_dir: &Path, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("seed");
    temp_dir.join(format!("{}.{}", stem, FLOPPY_EXTENSION))
}

enum MediaSource {
    Path(PathBuf),
    Context(ContextKey<PathBuf>),
}

/// Attach one piece of media and publish its slot
pub struct MountMedia {
    label: &'static str,
    source: MediaSource,
    kind: MediaKind,
    slot_key: ContextKey<MediaSlot>,
    attached: Option<(String, MediaSlot)>,
}

impl MountMedia {
    /// Attach the installation ISO on a new DVD drive
    pub fn dvd(iso_path: impl Into<PathBuf>) -> Self {
        Self {
            label: "Mounting installation media",
            source: MediaSource::Path(iso_path.into()),
            kind: MediaKind::Dvd,
            slot_key: keys::DVD_SLOT,
            attached: None,
        }
    }

    /// Attach the seed copy made by [`CopySeedImage`]
    pub fn floppy() -> Self {
        Self {
            label: "Mounting floppy seed",
            source: MediaSource::Context(keys::SEED_IMAGE),
            kind: MediaKind::Floppy,
            slot_key: keys::FLOPPY_SLOT,
            attached: None,
        }
    }
}

#[async_trait]
impl Step for MountMedia {
    fn name(&self) -> &str {
        self.label
    }

    fn reads(&self) -> Vec<&'static str> {
        match &self.source {
            MediaSource::Path(_) => vec![keys::VM_NAME.name()],
            MediaSource::Context(key) => vec![keys::VM_NAME.name(), key.name()],
        }
    }

    fn writes(&self) -> Vec<&'static str> {
        vec![self.slot_key.name()]
    }

    async fn run(&mut self, ctx: &mut RunContext) -> BuildResult<StepAction> {
        let vm_name = ctx.require(keys::VM_NAME)?.clone();
        let path = match &self.source {
            MediaSource::Path(path) => path.clone(),
            MediaSource::Context(key) => ctx.require(*key)?.clone(),
        };

        ctx.ui().say(&format!(
            "Mounting {:?} media {}...",
            self.kind,
            path.display()
        ));
        let slot = ctx
            .compute()
            .attach_media(&vm_name, &path, self.kind, None)
            .await?;
        debug!("Attached {} to {}", path.display(), slot);

        self.attached = Some((vm_name, slot.clone()));
        ctx.put(self.slot_key, slot);
        Ok(StepAction::Continue)
    }

    async fn cleanup(&mut self, ctx: &RunContext) -> BuildResult<()> {
        let Some((vm_name, slot)) = self.attached.take() else {
            return Ok(());
        };
        if !ctx.contains(self.slot_key) {
            return Ok(());
        }

        ctx.ui().say(&format!("Unmounting {:?} media...", self.kind));
        ctx.compute().detach_media(&vm_name, &slot).await
    }
}

/// Detach media as a forward step and withdraw its slot
pub struct UnmountMedia {
    label: &'static str,
    slot_key: ContextKey<MediaSlot>,
}

impl UnmountMedia {
    pub fn dvd() -> Self {
        Self {
            label: "Unmounting installation media",
            slot_key: keys::DVD_SLOT,
        }
    }

    pub fn floppy() -> Self {
        Self {
            label: "Unmounting floppy seed",
            slot_key: keys::FLOPPY_SLOT,
        }
    }
}

#[async_trait]
impl Step for UnmountMedia {
    fn name(&self) -> &str {
        self.label
    }

    fn reads(&self) -> Vec<&'static str> {
        vec![keys::VM_NAME.name()]
    }

    async fn run(&mut self, ctx: &mut RunContext) -> BuildResult<StepAction> {
        let Some(slot) = ctx.get(self.slot_key).cloned() else {
            return Ok(StepAction::Continue);
        };
        let vm_name = ctx.require(keys::VM_NAME)?.clone();

        ctx.ui().say(&format!("Unmounting {}...", slot));
        ctx.compute().detach_media(&vm_name, &slot).await?;

        ctx.remove(self.slot_key);
        Ok(StepAction::Continue)
    }

    async fn cleanup(&mut self, _ctx: &RunContext) -> BuildResult<()> {
        Ok(())
    }
}

/// Attach extra DVD images, each on its own new drive
///
/// The slots are republished after every attach, so a failure partway
/// through still leaves cleanup the drives that did get attached.
#[derive(Debug)]
pub struct MountSecondaryDvds {
    images: Vec<PathBuf>,
    attached: Vec<(String, MediaSlot)>,
}

impl MountSecondaryDvds {
    pub fn new(images: Vec<PathBuf>) -> Self {
        Self {
            images,
            attached: Vec::new(),
        }
    }
}

#[async_trait]
impl Step for MountSecondaryDvds {
    fn name(&self) -> &str {
        "Mounting secondary DVD images"
    }

    fn reads(&self) -> Vec<&'static str> {
        vec![keys::VM_NAME.name()]
    }

    fn writes(&self) -> Vec<&'static str> {
        vec![keys::SECONDARY_DVD_SLOTS.name()]
    }

    async fn run(&mut self, ctx: &mut RunContext) -> BuildResult<StepAction> {
        let vm_name = ctx.require(keys::VM_NAME)?.clone();

        for image in &self.images {
            ctx.ui()
                .say(&format!("Mounting secondary DVD image {}...", image.display()));
            let slot = ctx
                .compute()
                .attach_media(&vm_name, image, MediaKind::Dvd, None)
                .await?;
            self.attached.push((vm_name.clone(), slot));
            ctx.put(
                keys::SECONDARY_DVD_SLOTS,
                self.attached.iter().map(|(_, slot)| slot.clone()).collect(),
            );
        }

        Ok(StepAction::Continue)
    }

    async fn cleanup(&mut self, ctx: &RunContext) -> BuildResult<()> {
        let attached = std::mem::take(&mut self.attached);
        if !ctx.contains(keys::SECONDARY_DVD_SLOTS) {
            return Ok(());
        }
        detach_all(ctx, attached.into_iter().rev()).await
    }
}

/// Detach the secondary DVD drives as a forward step and withdraw their slots
#[derive(Debug, Default)]
pub struct UnmountSecondaryDvds;

#[async_trait]
impl Step for UnmountSecondaryDvds {
    fn name(&self) -> &str {
        "Unmounting secondary DVD images"
    }

    fn reads(&self) -> Vec<&'static str> {
        vec![keys::VM_NAME.name()]
    }

    async fn run(&mut self, ctx: &mut RunContext) -> BuildResult<StepAction> {
        let Some(slots) = ctx.get(keys::SECONDARY_DVD_SLOTS).cloned() else {
            return Ok(StepAction::Continue);
        };
        let vm_name = ctx.require(keys::VM_NAME)?.clone();

        detach_all(ctx, slots.into_iter().rev().map(|slot| (vm_name.clone(), slot))).await?;

        ctx.remove(keys::SECONDARY_DVD_SLOTS);
        Ok(StepAction::Continue)
    }

    async fn cleanup(&mut self, _ctx: &RunContext) -> BuildResult<()> {
        Ok(())
    }
}

/// Detach every slot, carrying on past failures; the first error is returned
async fn detach_all(
    ctx: &RunContext,
    slots: impl Iterator<Item = (String, MediaSlot)> + Send,
) -> BuildResult<()> {
    let mut first_error = None;

    for (vm_name, slot) in slots {
        ctx.ui().say(&format!("Unmounting secondary DVD {}...", slot));
        if let Err(err) = ctx.compute().detach_media(&vm_name, &slot).await {
            first_error.get_or_insert(err);
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
