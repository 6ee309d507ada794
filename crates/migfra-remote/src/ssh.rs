//! `ssh`-client backed remote shell.
//!
//! Every command runs in a fresh `ssh` child process (BatchMode, so a missing
//! key fails instead of prompting). The child is killed if the future is
//! dropped, which is what happens when a task runner is cancelled mid-command.

use crate::shell::{CommandOutput, RemoteShell};
use async_trait::async_trait;
use migfra_common::{RemoteError, RemoteResult};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::debug;

/// Options for the `ssh` client invocation.
#[derive(Debug, Clone)]
pub struct SshOptions {
    /// Client binary
    pub program: PathBuf,
    /// Passed as `-o ConnectTimeout=<secs>`
    pub connect_timeout: Duration,
    /// Upper bound for a whole command execution (None = unbounded)
    pub command_timeout: Option<Duration>,
    /// Additional arguments placed before the destination
    pub extra_args: Vec<String>,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ssh"),
            connect_timeout: Duration::from_secs(10),
            command_timeout: None,
            extra_args: Vec::new(),
        }
    }
}

/// Remote shell that shells out to the system `ssh` client.
#[derive(Debug, Clone, Default)]
pub struct SshShell {
    options: SshOptions,
}

impl SshShell {
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }

    /// Arguments for one invocation (without the program itself).
    pub fn build_args(&self, host: &str, user: &str, command: &str) -> Vec<String> {
        let mut args = self.options.extra_args.clone();
        args.extend([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.options.connect_timeout.as_secs().max(1)),
            "-l".to_string(),
            user.to_string(),
            host.to_string(),
            command.to_string(),
        ]);
        args
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn run_command(&self, host: &str, user: &str, command: &str) -> RemoteResult<CommandOutput> {
        let mut cmd = Command::new(&self.options.program);
        cmd.args(self.build_args(host, user, command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(host = %host, user = %user, command = %command, "Running remote command");

        let started = Instant::now();
        let output = match self.options.command_timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| RemoteError::Timeout {
                    host: host.to_string(),
                    seconds: limit.as_secs(),
                })?,
            None => cmd.output().await,
        }
        .map_err(|e| RemoteError::spawn(host, user, e.to_string()))?;
        let elapsed = started.elapsed();

        if !output.status.success() {
            return Err(RemoteError::command_failed(
                host,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            elapsed,
        })
    }
}
