// Copyright (c) 2025 - Cowboy AI, Inc.
//! Virtual switch allocation

use async_trait::async_trait;
use tracing::info;

use crate::context::{keys, RunContext};
use crate::errors::BuildResult;
use crate::ports::SwitchKind;
use crate::saga::{Step, StepAction};

/// Create-if-absent switch allocation
///
/// Publishes the name the provider resolved, which can differ from the
/// requested one. Only a switch this step created is ever deleted, and only
/// when the build did not complete.
#[derive(Debug)]
pub struct CreateSwitch {
    requested: String,
    kind: SwitchKind,
    created: Option<String>,
}

impl CreateSwitch {
    pub fn new(requested: impl Into<String>, kind: SwitchKind) -> Self {
        Self {
            requested: requested.into(),
            kind,
            created: None,
        }
    }
}

#[async_trait]
impl Step for CreateSwitch {
    fn name(&self) -> &str {
        "Creating switch"
    }

    fn writes(&self) -> Vec<&'static str> {
        vec![keys::SWITCH_NAME.name()]
    }

    async fn run(&mut self, ctx: &mut RunContext) -> BuildResult<StepAction> {
        ctx.ui().say(&format!(
            "Creating {} switch '{}'...",
            self.kind, self.requested
        ));

        let allocation = ctx
            .compute()
            .create_switch(&self.requested, &self.kind)
            .await?;

        if allocation.created {
            self.created = Some(allocation.name.clone());
        } else {
            ctx.ui()
                .say(&format!("Using existing switch '{}'", allocation.name));
        }
        if allocation.name != self.requested {
            info!(
                "Switch '{}' resolved to '{}'",
                self.requested, allocation.name
            );
        }

        ctx.put(keys::SWITCH_NAME, allocation.name);
        Ok(StepAction::Continue)
    }

    async fn cleanup(&mut self, ctx: &RunContext) -> BuildResult<()> {
        if ctx.run_completed() {
            return Ok(());
        }
        let Some(name) = self.created.take() else {
            return Ok(());
        };

        ctx.ui().say(&format!("Deleting switch '{}'...", name));
        ctx.compute().delete_switch(&name).await
    }
}
