//! # Migfra Broker
//!
//! Publish/subscribe sessions used by the benchmark workers.
//!
//! This crate provides:
//! - [`BrokerChannel`] - the contract the coordination engine relies on
//! - [`MqttChannel`] - a connected MQTT session (rumqttc)
//! - [`LocalBroker`] - an in-process broker with MQTT topic-filter semantics,
//!   used for tests and dry runs without a real message bus

pub mod channel;
pub mod local;
pub mod mqtt;
pub mod topic;

// Re-export main types
pub use channel::{BrokerChannel, BrokerMessage};
pub use local::{LocalBroker, LocalChannel};
pub use mqtt::{BrokerAddress, MqttChannel};
pub use topic::topic_matches;
