// Copyright (c) 2025 - Cowboy AI, Inc.
//! PowerShell invocation
//!
//! Two ways to reach the host's management cmdlets:
//!
//! - [`PowerShellBuilder`] composes a one-line pipeline of cmdlets. Values
//!   are single-quoted, so names and paths with spaces survive.
//! - [`PowerShellScript`] writes a multi-statement script to a temporary
//!   `.ps1` file and runs it with positional parameters, for anything that
//!   needs variables or branching.
//!
//! Both report failure as [`BuildError::ExternalCall`] labelled with the
//! action being attempted. Anything written to stderr counts as failure,
//! even with a zero exit status, since many cmdlets report non-terminating
//! errors that way.

use std::ffi::OsStr;
use std::io::Write;
use std::process::Output;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::debug;

use crate::errors::{BuildError, BuildResult};
use crate::ports::CommandOutput;

const POWERSHELL: &str = "powershell.exe";

/// Quote a value as a PowerShell single-quoted string literal
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn base_command() -> Command {
    let mut cmd = Command::new(POWERSHELL);
    cmd.arg("-NoProfile").arg("-NonInteractive");
    cmd.kill_on_drop(true);
    cmd
}

async fn spawn(mut cmd: Command, action: &str) -> BuildResult<Output> {
    debug!("{}: {:?}", action, cmd.as_std());
    cmd.output()
        .await
        .map_err(|err| BuildError::external(action, format!("failed to launch powershell: {}", err)))
}

fn checked_stdout(output: Output, action: &str) -> BuildResult<String> {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !stderr.is_empty() {
        return Err(BuildError::external(action, stderr));
    }
    if !output.status.success() {
        return Err(BuildError::external(
            action,
            format!("powershell failed with {}", output.status),
        ));
    }
    String::from_utf8(output.stdout)
        .map(|stdout| stdout.trim().to_string())
        .map_err(|_| BuildError::external(action, "powershell output is not utf-8"))
}

/// A PowerShell command line
pub struct PowerShellBuilder(Command);

impl Default for PowerShellBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerShellBuilder {
    /// Create a new PowerShell command
    pub fn new() -> Self {
        Self(base_command())
    }

    /// Start a new Cmdlet
    pub fn cmdlet<S: AsRef<OsStr>>(mut self, cmdlet: S) -> PowerShellCmdletBuilder {
        self.0.arg(cmdlet);
        PowerShellCmdletBuilder(self.0)
    }

    /// Use Select-Object to return a property of the piped object
    pub fn select_object_property(mut self, property: &str) -> PowerShellCmdletBuilder {
        self.0
            .arg("Select-Object")
            .arg("-ExpandProperty")
            .arg(property);
        PowerShellCmdletBuilder(self.0)
    }

    /// Run, discarding output
    pub async fn run(self, action: &str) -> BuildResult<()> {
        self.output(action).await.map(|_| ())
    }

    /// Run and return trimmed stdout
    pub async fn output(self, action: &str) -> BuildResult<String> {
        let output = spawn(self.0, action).await?;
        checked_stdout(output, action)
    }

    #[cfg(test)]
    fn args(&self) -> Vec<String> {
        self.0
            .as_std()
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }
}

/// A PowerShell Cmdlet builder
pub struct PowerShellCmdletBuilder(Command);

impl PowerShellCmdletBuilder {
    /// Add a switch parameter
    pub fn flag(mut self, flag: &str) -> Self {
        self.0.arg(format!("-{}", flag));
        self
    }

    /// Add a named parameter with a quoted string value
    pub fn arg(mut self, name: &str, value: impl AsRef<str>) -> Self {
        self.0.arg(format!("-{}", name)).arg(quote(value.as_ref()));
        self
    }

    /// Add a named parameter with an unquoted value (numbers, `$null`)
    pub fn arg_raw(mut self, name: &str, value: impl ToString) -> Self {
        self.0.arg(format!("-{}", name)).arg(value.to_string());
        self
    }

    /// Optionally add a named parameter
    pub fn arg_opt(self, name: &str, value: Option<impl AsRef<str>>) -> Self {
        match value {
            Some(value) => self.arg(name, value),
            None => self,
        }
    }

    /// Finish the cmdlet
    pub fn finish(self) -> PowerShellBuilder {
        PowerShellBuilder(self.0)
    }

    /// Finish the cmdlet with a pipeline operator
    pub fn pipeline(mut self) -> PowerShellBuilder {
        self.0.arg("|");
        self.finish()
    }

    /// Finish the cmdlet with a semicolon
    pub fn next(mut self) -> PowerShellBuilder {
        self.0.arg(";");
        self.finish()
    }
}

/// A multi-statement script run from a temporary `.ps1` file
///
/// The body should open with a `param(...)` block matching the values
/// added with [`PowerShellScript::param`].
pub struct PowerShellScript {
    body: String,
    params: Vec<String>,
    env: Vec<(String, String)>,
}

impl PowerShellScript {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            params: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Append a positional parameter
    pub fn param(mut self, value: impl ToString) -> Self {
        self.params.push(value.to_string());
        self
    }

    /// Pass a value through the environment instead of the command line
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    async fn spawn(self, action: &str) -> BuildResult<Output> {
        let file = write_script(self.body.clone()).await?;

        let mut cmd = base_command();
        cmd.arg("-ExecutionPolicy")
            .arg("Bypass")
            .arg("-File")
            .arg(file.path())
            .args(&self.params);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        // the script file lives until the process has exited
        let output = spawn(cmd, action).await;
        drop(file);
        output
    }

    /// Run, discarding output
    pub async fn run(self, action: &str) -> BuildResult<()> {
        self.output(action).await.map(|_| ())
    }

    /// Run and return trimmed stdout; stderr output is a failure
    pub async fn output(self, action: &str) -> BuildResult<String> {
        let output = self.spawn(action).await?;
        checked_stdout(output, action)
    }

    /// Run and hand back stdout, stderr and exit code without judging them
    pub async fn capture(self, action: &str) -> BuildResult<CommandOutput> {
        let output = self.spawn(action).await?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

/// Write a script body to a fresh `.ps1` file off the async executor
async fn write_script(body: String) -> BuildResult<NamedTempFile> {
    tokio::task::spawn_blocking(move || -> std::io::Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("cim-ps")
            .suffix(".ps1")
            .tempfile()?;
        file.write_all(body.as_bytes())?;
        file.flush()?;
        Ok(file)
    })
    .await
    .map_err(|err| BuildError::Io(format!("script writer panicked: {}", err)))?
    .map_err(BuildError::from)
}
