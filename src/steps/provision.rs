// Copyright (c) 2025 - Cowboy AI, Inc.
//! Guest provisioning over the remote channel

use async_trait::async_trait;
use tracing::debug;

use crate::context::{keys, RunContext};
use crate::errors::{BuildError, BuildResult};
use crate::saga::{Step, StepAction};

/// Run configured commands in the guest, in order
///
/// The first command exiting non-zero halts the build with its stderr.
#[derive(Debug)]
pub struct Provision {
    commands: Vec<String>,
}

impl Provision {
    pub fn new(commands: Vec<String>) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl Step for Provision {
    fn name(&self) -> &str {
        "Provisioning guest"
    }

    fn reads(&self) -> Vec<&'static str> {
        vec![keys::REMOTE_HANDLE.name()]
    }

    async fn run(&mut self, ctx: &mut RunContext) -> BuildResult<StepAction> {
        let handle = ctx.require(keys::REMOTE_HANDLE)?;

        for command in &self.commands {
            if ctx.is_cancelled() {
                return Err(BuildError::Cancelled);
            }

            ctx.ui().say(&format!("Provisioning with: {}", command));
            let output = ctx.remote().run(handle, command).await?;
            if !output.stdout.trim().is_empty() {
                debug!("{}", output.stdout.trim_end());
            }

            if !output.success() {
                return Err(BuildError::external(
                    format!("Provisioning command '{}'", command),
                    format!("exit code {}: {}", output.exit_code, output.stderr.trim()),
                ));
            }
        }

        Ok(StepAction::Continue)
    }

    async fn cleanup(&mut self, _ctx: &RunContext) -> BuildResult<()> {
        Ok(())
    }
}
