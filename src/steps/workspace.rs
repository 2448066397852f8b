// Copyright (c) 2025 - Cowboy AI, Inc.
//! Local directories a build works in

use async_trait::async_trait;
use std::path::PathBuf;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::context::{keys, RunContext};
use crate::errors::{BuildError, BuildResult};
use crate::saga::{Step, StepAction};

/// Scratch directory for the build's transient files
///
/// Always removed on cleanup, whatever the outcome.
#[derive(Debug, Default)]
pub struct CreateTempDir {
    dir: Option<TempDir>,
}

impl CreateTempDir {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Step for CreateTempDir {
    fn name(&self) -> &str {
        "Creating temporary directory"
    }

    fn writes(&self) -> Vec<&'static str> {
        vec![keys::TEMP_DIR.name()]
    }

    async fn run(&mut self, ctx: &mut RunContext) -> BuildResult<StepAction> {
        ctx.ui().say("Creating temporary directory...");
        let dir = tempfile::Builder::new().prefix("cim-image-").tempdir()?;
        debug!("Temporary directory: {}", dir.path().display());

        ctx.put(keys::TEMP_DIR, dir.path().to_path_buf());
        self.dir = Some(dir);
        Ok(StepAction::Continue)
    }

    async fn cleanup(&mut self, ctx: &RunContext) -> BuildResult<()> {
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };
        ctx.ui().say("Deleting temporary directory...");
        dir.close()?;
        Ok(())
    }
}

/// Directory the finished VM is exported into
///
/// An existing directory is only replaced when `force` is set. The
/// directory is removed again unless the build completed.
#[derive(Debug)]
pub struct PrepareOutputDir {
    path: PathBuf,
    force: bool,
    created: Option<PathBuf>,
}

impl PrepareOutputDir {
    pub fn new(path: impl Into<PathBuf>, force: bool) -> Self {
        Self {
            path: path.into(),
            force,
            created: None,
        }
    }
}

#[async_trait]
impl Step for PrepareOutputDir {
    fn name(&self) -> &str {
        "Preparing output directory"
    }

    fn writes(&self) -> Vec<&'static str> {
        vec![keys::OUTPUT_DIR.name()]
    }

    async fn run(&mut self, ctx: &mut RunContext) -> BuildResult<StepAction> {
        if tokio::fs::try_exists(&self.path).await? {
            if !self.force {
                return Err(BuildError::Configuration(format!(
                    "output directory {} already exists; set force to replace it",
                    self.path.display()
                )));
            }
            ctx.ui().say(&format!(
                "Deleting previous output directory {}...",
                self.path.display()
            ));
            tokio::fs::remove_dir_all(&self.path).await?;
        }

        ctx.ui()
            .say(&format!("Creating output directory {}...", self.path.display()));
        tokio::fs::create_dir_all(&self.path).await?;
        self.created = Some(self.path.clone());

        ctx.put(keys::OUTPUT_DIR, self.path.clone());
        Ok(StepAction::Continue)
    }

    async fn cleanup(&mut self, ctx: &RunContext) -> BuildResult<()> {
        if ctx.run_completed() {
            return Ok(());
        }
        let Some(path) = self.created.take() else {
            return Ok(());
        };

        ctx.ui()
            .say(&format!("Deleting output directory {}...", path.display()));
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!("Output directory {} already gone", path.display());
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}
