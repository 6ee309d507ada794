//! TaskRunner - executes a workload command on one benchmarked VM.
//!
//! Initialization runs the command once and reports the elapsed time.
//! Continuous mode repeats it until the completion signal fires; every
//! iteration opens its own remote session, so a failed iteration is followed
//! by a fresh attempt on the next one.

use migfra_common::RemoteResult;
use migfra_remote::{CommandOutput, RemoteShell};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pause between two continuous iterations
pub const DEFAULT_ITERATION_PAUSE: Duration = Duration::from_millis(500);

/// Result of a continuous run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunnerSummary {
    pub host: String,
    pub iterations: usize,
    pub failures: usize,
    /// Sum of the elapsed time of successful iterations
    pub busy_time: Duration,
}

impl RunnerSummary {
    pub fn succeeded(&self) -> usize {
        self.iterations - self.failures
    }
}

pub struct TaskRunner {
    shell: Arc<dyn RemoteShell>,
    host: String,
    user: String,
    command: String,
    log_dir: Option<PathBuf>,
}

impl TaskRunner {
    pub fn new(
        shell: Arc<dyn RemoteShell>,
        host: impl Into<String>,
        user: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            shell,
            host: host.into(),
            user: user.into(),
            command: command.into(),
            log_dir: None,
        }
    }

    /// Write per-iteration artifacts into `log_dir`.
    pub fn with_log_dir(mut self, log_dir: Option<PathBuf>) -> Self {
        self.log_dir = log_dir;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Execute the command exactly once.
    pub async fn run_once(&self) -> RemoteResult<Duration> {
        info!(host = %self.host, command = %self.command, "Running initialization command");
        let output = self.execute().await?;
        info!(host = %self.host, elapsed = ?output.elapsed, "Initialization finished");
        Ok(output.elapsed)
    }

    /// Repeat the command until `completion` is cancelled.
    ///
    /// An iteration already running when the signal fires is abandoned.
    pub async fn run(self, completion: CancellationToken) -> RunnerSummary {
        let mut summary = RunnerSummary {
            host: self.host.clone(),
            ..Default::default()
        };
        info!(host = %self.host, command = %self.command, "Task runner started");

        while !completion.is_cancelled() {
            let result = tokio::select! {
                _ = completion.cancelled() => break,
                result = self.execute() => result,
            };

            let n = summary.iterations;
            summary.iterations += 1;
            match result {
                Ok(output) => {
                    debug!(host = %self.host, iteration = n, elapsed = ?output.elapsed, "Iteration finished");
                    summary.busy_time += output.elapsed;
                    if let Some(dir) = &self.log_dir {
                        if let Err(e) = write_artifacts(dir, &self.host, n, &output).await {
                            warn!(host = %self.host, iteration = n, error = %e, "Failed to write log artifacts");
                        }
                    }
                }
                Err(e) => {
                    warn!(host = %self.host, iteration = n, error = %e, "Iteration failed");
                    summary.failures += 1;
                }
            }

            tokio::select! {
                _ = completion.cancelled() => break,
                _ = sleep(DEFAULT_ITERATION_PAUSE) => {}
            }
        }

        info!(
            host = %self.host,
            iterations = summary.iterations,
            failures = summary.failures,
            "Task runner stopped"
        );
        summary
    }

    async fn execute(&self) -> RemoteResult<CommandOutput> {
        self.shell
            .run_command(&self.host, &self.user, &self.command)
            .await
    }
}

/// Path of the stdout artifact of iteration `n`
pub fn output_path(dir: &Path, host: &str, n: usize) -> PathBuf {
    dir.join(format!("{}_output_{}.dat", host, n))
}

/// Path of the runtime artifact of iteration `n`
pub fn runtime_path(dir: &Path, host: &str, n: usize) -> PathBuf {
    dir.join(format!("{}_runtime_{}.dat", host, n))
}

async fn write_artifacts(
    dir: &Path,
    host: &str,
    n: usize,
    output: &CommandOutput,
) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(output_path(dir, host, n), &output.stdout).await?;
    tokio::fs::write(
        runtime_path(dir, host, n),
        format!("{:.6}\n", output.elapsed.as_secs_f64()),
    )
    .await
}
