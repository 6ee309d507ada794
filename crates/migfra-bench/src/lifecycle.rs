//! VM start/stop phases around the timed benchmark.
//!
//! A phase publishes every task of one collection, tracks each request in a
//! correlation store and waits until all of them are acknowledged or the
//! timeout expires. A missing or negative acknowledgement is reported, never
//! fatal: the campaign goes on with whatever VMs came up.

use crate::catalog::TopicTasks;
use crate::messages::{Request, Response};
use crate::store::{CorrelationRecord, CorrelationStore};
use migfra_broker::BrokerChannel;
use migfra_common::CorrelationId;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How often the store is checked while waiting for acknowledgements
const ACK_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Stop,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Start => write!(f, "start"),
            Phase::Stop => write!(f, "stop"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSummary {
    pub phase: Phase,
    pub sent: usize,
    pub acknowledged: usize,
    /// Acknowledgements reporting a non-success status
    pub rejected: Vec<String>,
    /// VMs without any acknowledgement when the wait ended
    pub unanswered: Vec<String>,
    pub elapsed: Duration,
}

impl LifecycleSummary {
    pub fn is_complete(&self) -> bool {
        self.unanswered.is_empty() && self.rejected.is_empty()
    }
}

/// Publish all `tasks` and wait for their acknowledgements.
///
/// A receiver completing records in `store` must already be running.
/// `abort` cuts the wait short; the publishes themselves always go out.
pub async fn run_phase(
    phase: Phase,
    channel: &dyn BrokerChannel,
    tasks: &TopicTasks,
    store: &CorrelationStore,
    timeout: Duration,
    abort: &CancellationToken,
) -> LifecycleSummary {
    let started = Instant::now();
    let mut pending: Vec<(CorrelationId, String)> = Vec::with_capacity(tasks.len());
    let mut sent = 0;

    info!(%phase, vms = tasks.len(), "Lifecycle phase started");
    for (topic, task) in tasks.iter() {
        let id = CorrelationId::new();
        let payload = match Request::stamp(id, task).to_yaml() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(%phase, vm = %task.vm_name(), error = %e, "Failed to serialize request");
                continue;
            }
        };
        store.insert(CorrelationRecord::new(id, task.vm_name(), Instant::now()));
        match channel.publish(topic, payload).await {
            Ok(()) => {
                debug!(%phase, %id, %topic, vm = %task.vm_name(), "Lifecycle request published");
                sent += 1;
            }
            Err(e) => warn!(%phase, %id, %topic, error = %e, "Publish failed"),
        }
        pending.push((id, task.vm_name().to_string()));
    }

    let deadline = started + timeout;
    loop {
        if pending.iter().all(|(id, _)| is_acknowledged(store, id)) {
            break;
        }
        if Instant::now() >= deadline {
            warn!(%phase, ?timeout, "Timed out waiting for acknowledgements");
            break;
        }
        tokio::select! {
            _ = abort.cancelled() => {
                warn!(%phase, "Wait for acknowledgements aborted");
                break;
            }
            _ = sleep(ACK_POLL_INTERVAL) => {}
        }
    }

    let mut summary = LifecycleSummary {
        phase,
        sent,
        acknowledged: 0,
        rejected: Vec::new(),
        unanswered: Vec::new(),
        elapsed: started.elapsed(),
    };
    for (id, vm_name) in pending {
        let response = store.get(&id).and_then(|r| r.response);
        match response.map(|payload| Response::from_yaml(&payload)) {
            Some(Ok(response)) if response.is_success() => summary.acknowledged += 1,
            Some(Ok(response)) => {
                warn!(
                    %phase,
                    vm = %vm_name,
                    result = %response.result,
                    details = ?response.details,
                    "Lifecycle request rejected"
                );
                summary.acknowledged += 1;
                summary.rejected.push(vm_name);
            }
            Some(Err(e)) => {
                warn!(%phase, vm = %vm_name, error = %e, "Unparsable acknowledgement");
                summary.acknowledged += 1;
                summary.rejected.push(vm_name);
            }
            None => summary.unanswered.push(vm_name),
        }
    }

    info!(
        %phase,
        sent = summary.sent,
        acknowledged = summary.acknowledged,
        unanswered = summary.unanswered.len(),
        elapsed = ?summary.elapsed,
        "Lifecycle phase finished"
    );
    summary
}

fn is_acknowledged(store: &CorrelationStore, id: &CorrelationId) -> bool {
    store.get(id).map_or(false, |r| r.is_complete())
}
