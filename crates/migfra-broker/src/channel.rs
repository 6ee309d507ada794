//! BrokerChannel trait - Interface to a connected publish/subscribe session
//!
//! The coordination engine never talks to a concrete transport. Requester and
//! Receiver hold an `Arc<dyn BrokerChannel>` and only need three operations:
//! subscribe, publish and a non-blocking receive.

use async_trait::async_trait;
use migfra_common::TransportResult;

/// A message taken off the broker session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub topic: String,
    pub payload: String,
}

impl BrokerMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Connected publish/subscribe session.
///
/// Implementations must be usable from several tasks at once: the Requester
/// publishes while the Receiver drains inbound messages on the same session.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Subscribe to a topic filter (MQTT wildcards `+` and `#` allowed).
    ///
    /// Subscribing twice to the same filter has no additional effect.
    async fn subscribe(&self, topic: &str) -> TransportResult<()>;

    /// Publish a payload to a topic.
    async fn publish(&self, topic: &str, payload: String) -> TransportResult<()>;

    /// Take the next queued inbound message, if any. Never blocks.
    fn try_receive(&self) -> Option<BrokerMessage>;
}
