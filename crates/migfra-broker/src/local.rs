//! In-process broker.
//!
//! `LocalBroker` routes messages between `LocalChannel` sessions inside one
//! process using the same topic-filter rules as MQTT. Each channel owns an
//! unbounded inbox which `try_receive` drains without blocking, mirroring the
//! queue-backed behavior of a real MQTT client.

use crate::channel::{BrokerChannel, BrokerMessage};
use crate::topic::topic_matches;
use async_trait::async_trait;
use migfra_common::{TransportError, TransportResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

struct Subscription {
    channel_id: u64,
    filter: String,
    inbox: mpsc::UnboundedSender<BrokerMessage>,
}

#[derive(Default)]
struct BrokerState {
    subscriptions: Vec<Subscription>,
    published: u64,
}

/// Shared in-process message hub. Cheap to clone.
#[derive(Clone, Default)]
pub struct LocalBroker {
    state: Arc<Mutex<BrokerState>>,
    next_channel_id: Arc<AtomicU64>,
}

impl LocalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new session on this broker.
    pub fn connect(&self) -> LocalChannel {
        let (tx, rx) = mpsc::unbounded_channel();
        LocalChannel {
            broker: self.clone(),
            id: self.next_channel_id.fetch_add(1, Ordering::Relaxed),
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Total number of messages published through this broker.
    pub fn published_count(&self) -> u64 {
        self.state.lock().published
    }

    fn subscribe(&self, channel_id: u64, filter: &str, inbox: &mpsc::UnboundedSender<BrokerMessage>) {
        let mut state = self.state.lock();
        let exists = state
            .subscriptions
            .iter()
            .any(|s| s.channel_id == channel_id && s.filter == filter);
        if !exists {
            state.subscriptions.push(Subscription {
                channel_id,
                filter: filter.to_string(),
                inbox: inbox.clone(),
            });
        }
    }

    fn route(&self, topic: &str, payload: String) -> usize {
        let mut state = self.state.lock();
        state.published += 1;

        // Closed inboxes belong to dropped channels.
        state.subscriptions.retain(|s| !s.inbox.is_closed());

        let mut delivered_to: Vec<u64> = Vec::new();
        for sub in state.subscriptions.iter() {
            if delivered_to.contains(&sub.channel_id) || !topic_matches(&sub.filter, topic) {
                continue;
            }
            if sub.inbox.send(BrokerMessage::new(topic, payload.clone())).is_ok() {
                delivered_to.push(sub.channel_id);
            }
        }
        delivered_to.len()
    }
}

/// A session on a [`LocalBroker`].
pub struct LocalChannel {
    broker: LocalBroker,
    id: u64,
    tx: mpsc::UnboundedSender<BrokerMessage>,
    rx: Mutex<mpsc::UnboundedReceiver<BrokerMessage>>,
}

#[async_trait]
impl BrokerChannel for LocalChannel {
    async fn subscribe(&self, topic: &str) -> TransportResult<()> {
        if topic.is_empty() {
            return Err(TransportError::subscribe(topic, "empty topic filter"));
        }
        self.broker.subscribe(self.id, topic, &self.tx);
        debug!(channel = self.id, topic = %topic, "Local subscription added");
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: String) -> TransportResult<()> {
        if topic.contains('+') || topic.contains('#') {
            return Err(TransportError::publish(topic, "wildcards are not allowed in topic names"));
        }
        let receivers = self.broker.route(topic, payload);
        debug!(channel = self.id, topic = %topic, receivers, "Local publish");
        Ok(())
    }

    fn try_receive(&self) -> Option<BrokerMessage> {
        self.rx.lock().try_recv().ok()
    }
}
