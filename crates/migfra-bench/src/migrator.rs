//! Migrator - sequences one benchmark campaign.
//!
//! Phases, in order:
//! 1. VM start (only with `start-stop-vms`)
//! 2. initialization commands, joined before anything is timed
//! 3. the timed phase: Requester, Receiver, app TaskRunners and the countdown
//!    run concurrently until the Requester fires the completion signal
//! 4. VM stop (only with `start-stop-vms`)
//! 5. evaluation
//!
//! The abort token is the parent of every completion signal. Cancelling it
//! ends the timed phase early; the campaign still stops the VMs and evaluates
//! whatever completed.

use crate::catalog::{TaskCatalog, TopicTasks};
use crate::config::BenchConfig;
use crate::countdown;
use crate::evaluator::evaluate;
use crate::lifecycle::{self, LifecycleSummary, Phase};
use crate::receiver::{Receiver, ReceiverSummary};
use crate::report::{self, CampaignReport, InitOutcome};
use crate::requester::{Requester, RequesterOptions};
use crate::store::CorrelationStore;
use crate::task_runner::{RunnerSummary, TaskRunner};
use futures::future::join_all;
use migfra_broker::BrokerChannel;
use migfra_common::Result;
use migfra_remote::RemoteShell;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct Migrator {
    config: BenchConfig,
    catalog: TaskCatalog,
    channel: Arc<dyn BrokerChannel>,
    shell: Arc<dyn RemoteShell>,
    abort: CancellationToken,
}

impl Migrator {
    /// Build the task catalog up front; configuration errors surface here,
    /// before anything is published.
    pub fn new(
        config: BenchConfig,
        channel: Arc<dyn BrokerChannel>,
        shell: Arc<dyn RemoteShell>,
    ) -> Result<Self> {
        let catalog = TaskCatalog::build(&config)?;
        Ok(Self {
            config,
            catalog,
            channel,
            shell,
            abort: CancellationToken::new(),
        })
    }

    /// Token that aborts the campaign when cancelled
    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }

    pub fn catalog(&self) -> &TaskCatalog {
        &self.catalog
    }

    /// Run the whole campaign.
    ///
    /// Only a failed response subscription is an error; everything else is
    /// recorded in the report.
    pub async fn run(self) -> Result<CampaignReport> {
        let mut report = CampaignReport {
            started_at: Some(chrono::Utc::now()),
            ..Default::default()
        };
        info!(
            vms = self.config.bench_config.len(),
            rounds = self.config.effective_rounds(),
            period = self.config.period,
            "Starting migration benchmark"
        );

        if self.config.start_stop_vms {
            report.start_phase = Some(self.lifecycle_phase(Phase::Start, &self.catalog.start).await?);
        }

        if !self.abort.is_cancelled() {
            report.init = self.run_init_commands().await;
        }

        let store = CorrelationStore::new();
        if !self.abort.is_cancelled() {
            let (requester, receiver, runners) = self.run_bench_phase(&store).await?;
            report.requester = requester;
            report.receiver = receiver;
            report.runners = runners;
        } else {
            report.requester.aborted = true;
        }
        report.unanswered = store.pending_count();

        if self.config.start_stop_vms {
            report.stop_phase = Some(self.lifecycle_phase(Phase::Stop, &self.catalog.stop).await?);
        }

        if self.config.evaluate {
            let evaluation = evaluate(&store.snapshot(), self.config.effective_rounds());
            if let Some(dir) = &self.config.log_dir {
                match report::write_evaluation(dir, &evaluation) {
                    Ok(path) => report.evaluation_file = Some(path),
                    Err(e) => warn!(error = %e, "Failed to persist evaluation"),
                }
            }
            report.evaluation = Some(evaluation);
        }

        report.finished_at = Some(chrono::Utc::now());
        info!(
            matched = report.receiver.matched,
            unanswered = report.unanswered,
            aborted = report.requester.aborted,
            "Migration benchmark finished"
        );
        Ok(report)
    }

    async fn lifecycle_phase(&self, phase: Phase, tasks: &TopicTasks) -> Result<LifecycleSummary> {
        let store = CorrelationStore::new();
        let done = CancellationToken::new();
        let receiver = Receiver::new(
            self.channel.clone(),
            self.config.response_topic.clone(),
            store.clone(),
            done.clone(),
        );
        receiver.subscribe().await?;
        let poller = WorkerHandle::spawn("lifecycle receiver", receiver.poll());

        let summary = lifecycle::run_phase(
            phase,
            self.channel.as_ref(),
            tasks,
            &store,
            self.config.lifecycle_timeout,
            &self.abort,
        )
        .await;

        done.cancel();
        poller.join().await;
        Ok(summary)
    }

    async fn run_init_commands(&self) -> Vec<InitOutcome> {
        let runners: Vec<TaskRunner> = self
            .config
            .init_entries()
            .map(|(entry, command)| {
                TaskRunner::new(
                    self.shell.clone(),
                    entry.vm_name(),
                    self.config.ssh_user.clone(),
                    command,
                )
            })
            .collect();
        if runners.is_empty() {
            return Vec::new();
        }

        info!(count = runners.len(), "Running initialization commands");
        // Dropping the pending sessions on abort kills their remote commands
        let results = tokio::select! {
            results = join_all(runners.iter().map(|r| r.run_once())) => results,
            _ = self.abort.cancelled() => {
                warn!(count = runners.len(), "Initialization aborted");
                return runners
                    .iter()
                    .map(|runner| InitOutcome {
                        host: runner.host().to_string(),
                        result: Err("aborted".to_string()),
                    })
                    .collect();
            }
        };

        runners
            .iter()
            .zip(results)
            .map(|(runner, result)| {
                if let Err(e) = &result {
                    warn!(host = %runner.host(), error = %e, "Initialization failed");
                }
                InitOutcome {
                    host: runner.host().to_string(),
                    result: result.map_err(|e| e.to_string()),
                }
            })
            .collect()
    }

    async fn run_bench_phase(
        &self,
        store: &CorrelationStore,
    ) -> Result<(crate::requester::RequesterSummary, ReceiverSummary, Vec<RunnerSummary>)> {
        let completion = self.abort.child_token();
        let options = RequesterOptions {
            rounds: self.config.effective_rounds(),
            period: self.config.period(),
            grace_period: self.config.grace_period(),
            message_delay: self.config.message_delay,
        };

        // Subscribe before the first request can go out
        let receiver = Receiver::new(
            self.channel.clone(),
            self.config.response_topic.clone(),
            store.clone(),
            completion.clone(),
        );
        receiver.subscribe().await?;
        let receiver = WorkerHandle::spawn("receiver", receiver.poll());

        let runners: Vec<_> = self
            .config
            .app_entries()
            .map(|(entry, command)| {
                let runner = TaskRunner::new(
                    self.shell.clone(),
                    entry.vm_name(),
                    self.config.ssh_user.clone(),
                    command,
                )
                .with_log_dir(self.config.log_dir.clone());
                WorkerHandle::spawn("task runner", runner.run(completion.clone()))
            })
            .collect();

        let countdown = WorkerHandle::spawn(
            "countdown",
            countdown::run(
                countdown::expected_duration(options.rounds, options.period, options.grace_period),
                countdown::DEFAULT_COUNTDOWN_STEP,
                completion.clone(),
            ),
        );

        let requester = Requester::new(
            self.channel.clone(),
            self.catalog.migration.clone(),
            store.clone(),
            options,
            completion,
        );
        let requester_summary = requester.run().await;

        let receiver_summary = receiver.join().await.unwrap_or_default();
        let mut runner_summaries = Vec::with_capacity(runners.len());
        for runner in runners {
            if let Some(summary) = runner.join().await {
                runner_summaries.push(summary);
            }
        }
        countdown.join().await;

        Ok((requester_summary, receiver_summary, runner_summaries))
    }
}

/// A spawned worker. Dropping the handle without joining aborts the task.
struct WorkerHandle<T> {
    name: &'static str,
    handle: Option<JoinHandle<T>>,
}

impl<T: Send + 'static> WorkerHandle<T> {
    fn spawn<F>(name: &'static str, future: F) -> Self
    where
        F: std::future::Future<Output = T> + Send + 'static,
    {
        Self {
            name,
            handle: Some(tokio::spawn(future)),
        }
    }

    /// Wait for the worker. A panicked worker is logged and yields `None`.
    async fn join(mut self) -> Option<T> {
        let handle = self.handle.take()?;
        match handle.await {
            Ok(value) => Some(value),
            Err(e) => {
                error!(worker = self.name, error = %e, "Worker terminated abnormally");
                None
            }
        }
    }
}

impl<T> Drop for WorkerHandle<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
