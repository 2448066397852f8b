// Copyright (c) 2025 - Cowboy AI, Inc.
//! Remote Executor Port
//!
//! Runs commands inside the guest over the remote management channel. The
//! channel requires the guest to be on the host's trust list first.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::BuildResult;

/// Credential used to open a remote channel
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Handle to an opened remote channel, scoped to one host and credential
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteHandle {
    pub id: Uuid,
    pub host: String,
    pub username: String,
}

impl RemoteHandle {
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            host: host.into(),
            username: username.into(),
        }
    }
}

/// Captured result of a remote command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Remote command channel into the guest
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Add a host to the trust list; returns false if it was already there
    async fn trust_host(&self, host: &str) -> BuildResult<bool>;

    /// Remove exactly this host from the trust list
    async fn untrust_host(&self, host: &str) -> BuildResult<()>;

    /// Open a channel to `host` with `credential`
    async fn open(&self, credential: &Credential, host: &str) -> BuildResult<RemoteHandle>;

    /// Run a command, capturing output and exit status
    async fn run(&self, handle: &RemoteHandle, command: &str) -> BuildResult<CommandOutput>;

    /// Cheap round trip proving the channel answers
    async fn ping(&self, handle: &RemoteHandle) -> BuildResult<()>;
}
