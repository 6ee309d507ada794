//! Requester - periodic actor dispatching migration rounds.
//!
//! One round per period tick, alternating direction starting with forth. The
//! first round goes out immediately. After the last round the requester waits
//! out the grace period and then fires the completion signal.

use crate::catalog::MigrationTasks;
use crate::messages::Request;
use crate::store::{CorrelationRecord, CorrelationStore};
use migfra_broker::BrokerChannel;
use migfra_common::{CorrelationId, Direction};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Timing of the requester
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequesterOptions {
    /// Round budget, already rounded up to an even number
    pub rounds: u32,
    /// Time between round starts
    pub period: Duration,
    /// Wait after the last round before signalling completion
    pub grace_period: Duration,
    /// Pause between two publishes of the same round
    pub message_delay: Duration,
}

/// Round counter and direction. Only the requester's tick handler advances it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundState {
    /// 1-based
    pub round: u32,
    pub direction: Direction,
}

impl RoundState {
    pub fn first() -> Self {
        Self {
            round: 1,
            direction: Direction::Forth,
        }
    }

    pub fn advance(&mut self) {
        self.round += 1;
        self.direction = self.direction.flip();
    }
}

/// What the requester did during a campaign
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequesterSummary {
    /// Rounds whose first request went out, including one cut short by an abort
    pub rounds_dispatched: u32,
    pub requests_sent: usize,
    pub publish_failures: usize,
    /// Completion was signalled from outside before the round budget was spent
    pub aborted: bool,
}

pub struct Requester {
    channel: Arc<dyn BrokerChannel>,
    tasks: MigrationTasks,
    store: CorrelationStore,
    options: RequesterOptions,
    completion: CancellationToken,
}

impl Requester {
    pub fn new(
        channel: Arc<dyn BrokerChannel>,
        tasks: MigrationTasks,
        store: CorrelationStore,
        options: RequesterOptions,
        completion: CancellationToken,
    ) -> Self {
        Self {
            channel,
            tasks,
            store,
            options,
            completion,
        }
    }

    /// Dispatch the whole round budget, then signal completion.
    ///
    /// The completion token is cancelled on every exit path, so the other
    /// workers always stop once this returns.
    pub async fn run(self) -> RequesterSummary {
        let mut summary = RequesterSummary::default();
        let mut ticker = interval(self.options.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut state = RoundState::first();

        info!(
            rounds = self.options.rounds,
            period = ?self.options.period,
            forth = self.tasks.forth.len(),
            back = self.tasks.back.len(),
            "Requester started"
        );

        while state.round <= self.options.rounds {
            tokio::select! {
                _ = self.completion.cancelled() => {
                    summary.aborted = true;
                    break;
                }
                _ = ticker.tick() => {}
            }

            if !self.dispatch_round(state, &mut summary).await {
                summary.aborted = true;
                break;
            }
            state.advance();
        }

        if summary.aborted {
            warn!(
                rounds_dispatched = summary.rounds_dispatched,
                "Campaign aborted before the round budget was spent"
            );
        } else {
            info!(
                grace_period = ?self.options.grace_period,
                "All rounds dispatched, waiting for in-flight responses"
            );
            tokio::select! {
                _ = self.completion.cancelled() => {}
                _ = sleep(self.options.grace_period) => {}
            }
        }

        self.completion.cancel();
        info!(
            rounds = summary.rounds_dispatched,
            requests = summary.requests_sent,
            publish_failures = summary.publish_failures,
            "Requester finished"
        );
        summary
    }

    /// Publish every task of the round's direction. Returns false if the
    /// campaign was aborted mid-round.
    async fn dispatch_round(&self, state: RoundState, summary: &mut RequesterSummary) -> bool {
        info!(round = state.round, direction = %state.direction, "Dispatching round");
        // Nothing can interrupt the round before its first publish
        summary.rounds_dispatched += 1;

        for (index, (topic, task)) in self.tasks.get(state.direction).iter().enumerate() {
            if index > 0 && !self.options.message_delay.is_zero() {
                tokio::select! {
                    _ = self.completion.cancelled() => return false,
                    _ = sleep(self.options.message_delay) => {}
                }
            }

            let id = CorrelationId::new();
            let payload = match Request::stamp(id, task).to_yaml() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(vm = %task.vm_name(), error = %e, "Failed to serialize request");
                    summary.publish_failures += 1;
                    continue;
                }
            };

            let record = CorrelationRecord::new(id, task.vm_name(), Instant::now())
                .in_round(state.round, state.direction);
            self.store.insert(record);

            match self.channel.publish(topic, payload).await {
                Ok(()) => {
                    debug!(%id, %topic, vm = %task.vm_name(), "Request published");
                    summary.requests_sent += 1;
                }
                Err(e) => {
                    warn!(%id, %topic, error = %e, "Publish failed, request will stay unanswered");
                    summary.publish_failures += 1;
                }
            }
        }

        true
    }
}
