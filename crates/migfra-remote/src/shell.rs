//! RemoteShell trait - Interface for executing a command on a remote host

use async_trait::async_trait;
use migfra_common::RemoteResult;
use std::time::Duration;

/// Output of one successful remote command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured standard output
    pub stdout: String,
    /// Wall-clock time from session open to command exit
    pub elapsed: Duration,
}

/// Executes commands on remote hosts.
///
/// Each call opens its own session; a failure only affects that call, so a
/// caller can simply try again on its next iteration.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn run_command(&self, host: &str, user: &str, command: &str) -> RemoteResult<CommandOutput>;
}
