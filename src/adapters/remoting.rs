// Copyright (c) 2025 - Cowboy AI, Inc.
//! PowerShell Remoting Executor
//!
//! [`RemoteExecutor`] over WinRM: the WSMan client trust list plus
//! `Invoke-Command`. Passwords reach the child process through its
//! environment, never its command line.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::powershell::PowerShellScript;
use crate::errors::{BuildError, BuildResult};
use crate::ports::{CommandOutput, Credential, RemoteExecutor, RemoteHandle};

const PASSWORD_VAR: &str = "CIM_REMOTE_PASSWORD";

const TRUST_HOST: &str = r#"param([string]$hostName)
$current = (Get-Item -Path WSMan:\localhost\Client\TrustedHosts).Value
$entries = @($current -split ',' | ForEach-Object { $_.Trim() } | Where-Object { $_ })
if ($entries -contains $hostName -or $entries -contains '*') {
  'present'
} else {
  Set-Item -Path WSMan:\localhost\Client\TrustedHosts -Value (($entries + $hostName) -join ',') -Force
  'added'
}
"#;

const UNTRUST_HOST: &str = r#"param([string]$hostName)
$current = (Get-Item -Path WSMan:\localhost\Client\TrustedHosts).Value
$entries = @($current -split ',' | ForEach-Object { $_.Trim() } | Where-Object { $_ -and $_ -ne $hostName })
Set-Item -Path WSMan:\localhost\Client\TrustedHosts -Value ($entries -join ',') -Force
"#;

const CREDENTIAL_PRELUDE: &str = r#"$securePassword = ConvertTo-SecureString $env:CIM_REMOTE_PASSWORD -AsPlainText -Force
$credential = New-Object System.Management.Automation.PSCredential -ArgumentList $username, $securePassword
"#;

const RUN_COMMAND: &str = r#"$result = Invoke-Command -ComputerName $computerName -Credential $credential -ErrorAction Stop -ScriptBlock {
  param($command)
  $output = Invoke-Expression $command 2>&1 | Out-String
  $code = if ($LASTEXITCODE -ne $null) { $LASTEXITCODE } elseif ($?) { 0 } else { 1 }
  [pscustomobject]@{ Output = $output; ExitCode = $code }
} -ArgumentList $command
Write-Output $result.Output
exit $result.ExitCode
"#;

const PING: &str = r#"Invoke-Command -ComputerName $computerName -Credential $credential -ErrorAction Stop -ScriptBlock { $env:COMPUTERNAME } | Out-Null
"#;

fn with_credential(params: &str, body: &str) -> String {
    format!("param({})\n{}{}", params, CREDENTIAL_PRELUDE, body)
}

/// WinRM remoting from the build host
#[derive(Debug, Default)]
pub struct PowerShellRemoting {
    credentials: Mutex<HashMap<Uuid, Credential>>,
}

impl PowerShellRemoting {
    pub fn new() -> Self {
        Self::default()
    }

    async fn credential_for(&self, handle: &RemoteHandle, action: &str) -> BuildResult<Credential> {
        self.credentials
            .lock()
            .await
            .get(&handle.id)
            .cloned()
            .ok_or_else(|| BuildError::external(action, format!("no open channel to {}", handle.host)))
    }
}

#[async_trait]
impl RemoteExecutor for PowerShellRemoting {
    async fn trust_host(&self, host: &str) -> BuildResult<bool> {
        let output = PowerShellScript::new(TRUST_HOST)
            .param(host)
            .output(&format!("Adding {} to trusted hosts", host))
            .await?;
        Ok(output.trim() == "added")
    }

    async fn untrust_host(&self, host: &str) -> BuildResult<()> {
        PowerShellScript::new(UNTRUST_HOST)
            .param(host)
            .run(&format!("Removing {} from trusted hosts", host))
            .await
    }

    async fn open(&self, credential: &Credential, host: &str) -> BuildResult<RemoteHandle> {
        let handle = RemoteHandle::new(host, credential.username.clone());
        self.credentials
            .lock()
            .await
            .insert(handle.id, credential.clone());
        Ok(handle)
    }

    async fn run(&self, handle: &RemoteHandle, command: &str) -> BuildResult<CommandOutput> {
        let action = format!("Running command on {}", handle.host);
        let credential = self.credential_for(handle, &action).await?;

        PowerShellScript::new(with_credential(
            "[string]$computerName,[string]$username,[string]$command",
            RUN_COMMAND,
        ))
        .param(&handle.host)
        .param(&credential.username)
        .param(command)
        .env(PASSWORD_VAR, credential.password)
        .capture(&action)
        .await
    }

    async fn ping(&self, handle: &RemoteHandle) -> BuildResult<()> {
        let action = format!("Checking remote channel to {}", handle.host);
        let credential = self.credential_for(handle, &action).await?;

        PowerShellScript::new(with_credential(
            "[string]$computerName,[string]$username",
            PING,
        ))
        .param(&handle.host)
        .param(&credential.username)
        .env(PASSWORD_VAR, credential.password)
        .run(&action)
        .await
    }
}
