//! Remote shell that records every call instead of opening a session.

use async_trait::async_trait;
use migfra_common::{RemoteError, RemoteResult};
use migfra_remote::{CommandOutput, RemoteShell};
use parking_lot::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCall {
    pub host: String,
    pub user: String,
    pub command: String,
}

pub struct RecordingShell {
    calls: Mutex<Vec<ShellCall>>,
    runtime: Duration,
    unreachable: Vec<String>,
}

impl RecordingShell {
    /// Every command takes `runtime` and succeeds.
    pub fn new(runtime: Duration) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            runtime,
            unreachable: Vec::new(),
        }
    }

    /// Commands on `host` fail with a connection error.
    pub fn with_unreachable(mut self, host: &str) -> Self {
        self.unreachable.push(host.to_string());
        self
    }

    pub fn calls(&self) -> Vec<ShellCall> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, host: &str, command: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.host == host && c.command == command)
            .count()
    }
}

#[async_trait]
impl RemoteShell for RecordingShell {
    async fn run_command(&self, host: &str, user: &str, command: &str) -> RemoteResult<CommandOutput> {
        self.calls.lock().push(ShellCall {
            host: host.to_string(),
            user: user.to_string(),
            command: command.to_string(),
        });

        if self.unreachable.iter().any(|h| h == host) {
            tokio::time::sleep(Duration::from_millis(10)).await;
            return Err(RemoteError::spawn(host, user, "No route to host"));
        }

        tokio::time::sleep(self.runtime).await;
        Ok(CommandOutput {
            stdout: format!("{} done on {}\n", command, host),
            elapsed: self.runtime,
        })
    }
}
