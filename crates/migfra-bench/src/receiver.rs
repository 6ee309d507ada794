//! Receiver - drains responses and completes correlation records.

use crate::messages::extract_correlation_id;
use crate::store::CorrelationStore;
use migfra_broker::BrokerChannel;
use migfra_common::TransportResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Poll interval when the inbox is empty
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Message counters of one receiver run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverSummary {
    /// Responses matched to a dispatched request
    pub matched: usize,
    /// Responses with a well-formed id nobody dispatched
    pub stray: usize,
    /// Messages without a parsable correlation id
    pub malformed: usize,
}

pub struct Receiver {
    channel: Arc<dyn BrokerChannel>,
    response_topic: String,
    store: CorrelationStore,
    completion: CancellationToken,
}

impl Receiver {
    pub fn new(
        channel: Arc<dyn BrokerChannel>,
        response_topic: impl Into<String>,
        store: CorrelationStore,
        completion: CancellationToken,
    ) -> Self {
        Self {
            channel,
            response_topic: response_topic.into(),
            store,
            completion,
        }
    }

    /// Subscribe to the response topic.
    ///
    /// Call this before any request goes out so no early response is missed.
    pub async fn subscribe(&self) -> TransportResult<()> {
        self.channel.subscribe(&self.response_topic).await?;
        info!(topic = %self.response_topic, "Receiver subscribed");
        Ok(())
    }

    /// Subscribe, then poll until the completion signal fires.
    pub async fn run(self) -> TransportResult<ReceiverSummary> {
        self.subscribe().await?;
        Ok(self.poll().await)
    }

    /// Poll the session until the completion signal fires.
    ///
    /// Whatever is already queued is drained on every tick; responses still
    /// in flight when the signal arrives are left alone.
    pub async fn poll(self) -> ReceiverSummary {
        let mut summary = ReceiverSummary::default();
        let mut ticker = interval(DEFAULT_POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.completion.cancelled() => break,
                _ = ticker.tick() => {}
            }

            while let Some(message) = self.channel.try_receive() {
                let arrived = Instant::now();
                match extract_correlation_id(&message.payload) {
                    Some(id) => {
                        if self.store.complete_at(&id, message.payload, arrived) {
                            debug!(%id, topic = %message.topic, "Response matched");
                            summary.matched += 1;
                        } else {
                            debug!(%id, topic = %message.topic, "Dropping stray response");
                            summary.stray += 1;
                        }
                    }
                    None => {
                        warn!(topic = %message.topic, "Dropping message without correlation id");
                        summary.malformed += 1;
                    }
                }
            }
        }

        info!(
            matched = summary.matched,
            stray = summary.stray,
            malformed = summary.malformed,
            "Receiver stopped"
        );
        summary
    }
}
