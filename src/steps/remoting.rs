// Copyright (c) 2025 - Cowboy AI, Inc.
//! Remote management channel into the guest

use async_trait::async_trait;
use tracing::debug;

use crate::context::{keys, RunContext};
use crate::errors::BuildResult;
use crate::poll::{poll_until, Level, PollPolicy, Probe};
use crate::ports::{Credential, RemoteExecutor, RemoteHandle};
use crate::saga::{Step, StepAction};

/// Trust the guest and open a channel to it
///
/// Cleanup removes only the trust entry this step added, leaving entries
/// other builds on the same host depend on.
#[derive(Debug)]
pub struct EstablishRemoteChannel {
    credential: Credential,
    trusted: Option<String>,
}

impl EstablishRemoteChannel {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            trusted: None,
        }
    }
}

#[async_trait]
impl Step for EstablishRemoteChannel {
    fn name(&self) -> &str {
        "Establishing remote channel"
    }

    fn reads(&self) -> Vec<&'static str> {
        vec![keys::GUEST_ADDRESS.name()]
    }

    fn writes(&self) -> Vec<&'static str> {
        vec![keys::REMOTE_HANDLE.name()]
    }

    async fn run(&mut self, ctx: &mut RunContext) -> BuildResult<StepAction> {
        let host = ctx.require(keys::GUEST_ADDRESS)?.to_string();

        ctx.ui()
            .say(&format!("Adding {} to the trusted hosts list...", host));
        if ctx.remote().trust_host(&host).await? {
            self.trusted = Some(host.clone());
        } else {
            debug!("{} was already trusted", host);
        }

        ctx.ui().say(&format!(
            "Opening remote channel to {} as {}...",
            host, self.credential.username
        ));
        let handle = ctx.remote().open(&self.credential, &host).await?;

        ctx.put(keys::REMOTE_HANDLE, handle);
        Ok(StepAction::Continue)
    }

    async fn cleanup(&mut self, ctx: &RunContext) -> BuildResult<()> {
        let Some(host) = self.trusted.take() else {
            return Ok(());
        };

        ctx.ui()
            .say(&format!("Removing {} from the trusted hosts list...", host));
        ctx.remote().untrust_host(&host).await
    }
}

/// Whether the channel answered a round trip
pub struct RemotePing<'a> {
    remote: &'a dyn RemoteExecutor,
    handle: &'a RemoteHandle,
}

impl<'a> RemotePing<'a> {
    pub fn new(remote: &'a dyn RemoteExecutor, handle: &'a RemoteHandle) -> Self {
        Self { remote, handle }
    }
}

#[async_trait]
impl<'a> Probe for RemotePing<'a> {
    type Snapshot = bool;

    fn describe(&self) -> String {
        format!("the remote channel to {}", self.handle.host)
    }

    async fn probe(&mut self) -> BuildResult<bool> {
        match self.remote.ping(self.handle).await {
            Ok(()) => Ok(true),
            Err(err) => {
                debug!("{} not answering yet: {}", self.handle.host, err);
                Ok(false)
            }
        }
    }
}

/// Wait until the remote channel answers
#[derive(Debug)]
pub struct CheckRemoting {
    policy: PollPolicy,
}

impl CheckRemoting {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Step for CheckRemoting {
    fn name(&self) -> &str {
        "Checking remote channel"
    }

    fn reads(&self) -> Vec<&'static str> {
        vec![keys::REMOTE_HANDLE.name()]
    }

    async fn run(&mut self, ctx: &mut RunContext) -> BuildResult<StepAction> {
        let handle = ctx.require(keys::REMOTE_HANDLE)?;
        ctx.ui().say("Waiting for the remote channel to answer...");

        let mut probe = RemotePing::new(ctx.remote(), handle);
        let polled = poll_until(
            &self.policy,
            &mut probe,
            &mut Level(|answered: &bool| *answered),
            Some(ctx.cancel_flag()),
        )
        .await?;

        ctx.ui().say(&format!(
            "Remote channel answered after {} attempts",
            polled.attempts
        ));
        Ok(StepAction::Continue)
    }

    async fn cleanup(&mut self, _ctx: &RunContext) -> BuildResult<()> {
        Ok(())
    }
}
