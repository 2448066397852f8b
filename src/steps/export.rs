// Copyright (c) 2025 - Cowboy AI, Inc.
//! VM export

use async_trait::async_trait;

use crate::context::{keys, RunContext};
use crate::errors::BuildResult;
use crate::saga::{Step, StepAction};

/// Export the finished VM into the output directory
///
/// Not reversible: once the artifact exists the build has produced what it
/// set out to. The output directory step owns its removal on failure.
#[derive(Debug, Default)]
pub struct ExportVm;

#[async_trait]
impl Step for ExportVm {
    fn name(&self) -> &str {
        "Exporting virtual machine"
    }

    fn reads(&self) -> Vec<&'static str> {
        vec![keys::VM_NAME.name(), keys::OUTPUT_DIR.name()]
    }

    fn writes(&self) -> Vec<&'static str> {
        vec![keys::ARTIFACT_DIR.name()]
    }

    async fn run(&mut self, ctx: &mut RunContext) -> BuildResult<StepAction> {
        let vm_name = ctx.require(keys::VM_NAME)?;
        let output_dir = ctx.require(keys::OUTPUT_DIR)?.clone();

        ctx.ui().say(&format!(
            "Exporting virtual machine to {}...",
            output_dir.display()
        ));
        ctx.compute().export_vm(vm_name, &output_dir).await?;

        ctx.put(keys::ARTIFACT_DIR, output_dir);
        Ok(StepAction::Continue)
    }

    async fn cleanup(&mut self, _ctx: &RunContext) -> BuildResult<()> {
        Ok(())
    }
}
