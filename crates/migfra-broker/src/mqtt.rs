//! MQTT broker session backed by rumqttc.
//!
//! rumqttc splits a connection into an `AsyncClient` (requests) and an
//! `EventLoop` that must be polled for anything to happen. The event loop runs
//! in a background task that forwards every inbound publish into an unbounded
//! queue; `try_receive` drains that queue without blocking.
//!
//! The session is clean, so the broker forgets subscriptions on every
//! reconnect. The channel remembers its filters and the event loop replays
//! them after each CONNACK.

use crate::channel::{BrokerChannel, BrokerMessage};
use async_trait::async_trait;
use migfra_common::{TransportError, TransportResult};
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default MQTT port
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Capacity of the rumqttc request queue
const REQUEST_QUEUE_CAPACITY: usize = 256;

/// How long to wait for the broker's CONNACK before giving up
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause before the event loop retries after a connection error
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// How long `disconnect` waits for queued requests to reach the broker
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Broker address in `host[:port]` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl FromStr for BrokerAddress {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix("mqtt://").or_else(|| s.strip_prefix("tcp://")).unwrap_or(s);
        if s.is_empty() {
            return Err(TransportError::connect(s, "empty broker address"));
        }

        match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| TransportError::connect(s, format!("invalid port '{}'", port)))?;
                if host.is_empty() {
                    return Err(TransportError::connect(s, "missing host"));
                }
                Ok(Self {
                    host: host.to_string(),
                    port,
                })
            }
            None => Ok(Self {
                host: s.to_string(),
                port: DEFAULT_MQTT_PORT,
            }),
        }
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// State shared between the channel and its event loop task
#[derive(Default)]
struct SessionState {
    /// Filters to replay after a reconnect
    filters: Mutex<Vec<String>>,
    closing: AtomicBool,
}

impl SessionState {
    fn remember(&self, filter: &str) {
        let mut filters = self.filters.lock();
        if !filters.iter().any(|f| f == filter) {
            filters.push(filter.to_string());
        }
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }
}

/// Connected MQTT session.
pub struct MqttChannel {
    address: BrokerAddress,
    client: AsyncClient,
    inbox: Mutex<mpsc::UnboundedReceiver<BrokerMessage>>,
    state: Arc<SessionState>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl MqttChannel {
    /// Connect to the broker and wait for the CONNACK.
    pub async fn connect(address: &BrokerAddress, client_id_prefix: &str) -> TransportResult<Self> {
        let client_id = format!("{}-{}", client_id_prefix, uuid::Uuid::new_v4().simple());
        let mut options = MqttOptions::new(client_id.clone(), address.host.clone(), address.port);
        options.set_keep_alive(Duration::from_secs(30));
        options.set_clean_session(true);

        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_QUEUE_CAPACITY);

        tokio::time::timeout(CONNECT_TIMEOUT, Self::wait_for_connack(&mut event_loop))
            .await
            .map_err(|_| TransportError::connect(address.to_string(), "timed out waiting for CONNACK"))?
            .map_err(|reason| TransportError::connect(address.to_string(), reason))?;

        info!(broker = %address, client_id = %client_id, "Connected to MQTT broker");

        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(SessionState::default());
        let task = tokio::spawn(Self::run_event_loop(event_loop, client.clone(), state.clone(), tx));

        Ok(Self {
            address: address.clone(),
            client,
            inbox: Mutex::new(rx),
            state,
            event_loop: Mutex::new(Some(task)),
        })
    }

    /// Send DISCONNECT after everything already queued and wait until the
    /// event loop has written it. Later publishes fail with
    /// [`TransportError::Disconnected`].
    pub async fn disconnect(&self) {
        if self.state.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "MQTT disconnect request failed");
        }

        let task = self.event_loop.lock().take();
        if let Some(mut task) = task {
            match tokio::time::timeout(DISCONNECT_TIMEOUT, &mut task).await {
                Ok(_) => info!(broker = %self.address, "Disconnected from MQTT broker"),
                Err(_) => {
                    warn!(broker = %self.address, timeout = ?DISCONNECT_TIMEOUT, "MQTT disconnect did not complete");
                    task.abort();
                }
            }
        }
    }

    async fn wait_for_connack(event_loop: &mut EventLoop) -> Result<(), String> {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                Ok(_) => {}
                Err(e) => return Err(e.to_string()),
            }
        }
    }

    /// Background loop: forwards inbound publishes into the inbox and
    /// restores subscriptions after a reconnect. Ends once DISCONNECT is out.
    async fn run_event_loop(
        mut event_loop: EventLoop,
        client: AsyncClient,
        state: Arc<SessionState>,
        tx: mpsc::UnboundedSender<BrokerMessage>,
    ) {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let payload = String::from_utf8_lossy(&publish.payload).into_owned();
                    if tx.send(BrokerMessage::new(publish.topic, payload)).is_err() {
                        debug!("MQTT inbox closed; event loop exiting");
                        break;
                    }
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    // The initial CONNACK is consumed by `connect`
                    let filters = state.filters.lock().clone();
                    for filter in &filters {
                        // Non-blocking: this task is what drains the request queue
                        if let Err(e) = client.try_subscribe(filter.as_str(), QoS::AtMostOnce) {
                            error!(topic = %filter, error = %e, "MQTT resubscribe failed");
                        }
                    }
                    info!(filters = filters.len(), "Reconnected to MQTT broker");
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!("MQTT broker sent DISCONNECT");
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    debug!("MQTT DISCONNECT sent; event loop exiting");
                    break;
                }
                Ok(_) => {}
                Err(e) if state.is_closing() => {
                    debug!(error = %e, "MQTT event loop closed");
                    break;
                }
                Err(e) => {
                    // rumqttc reconnects on the next poll
                    error!(error = %e, "MQTT connection error");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }
}

#[async_trait]
impl BrokerChannel for MqttChannel {
    async fn subscribe(&self, topic: &str) -> TransportResult<()> {
        if self.state.is_closing() {
            return Err(TransportError::Disconnected);
        }
        self.client
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|e| TransportError::subscribe(topic, e.to_string()))?;
        self.state.remember(topic);
        debug!(topic = %topic, "MQTT subscribe queued");
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: String) -> TransportResult<()> {
        if self.state.is_closing() {
            return Err(TransportError::Disconnected);
        }
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload.into_bytes())
            .await
            .map_err(|e| TransportError::publish(topic, e.to_string()))
    }

    fn try_receive(&self) -> Option<BrokerMessage> {
        self.inbox.lock().try_recv().ok()
    }
}

impl Drop for MqttChannel {
    fn drop(&mut self) {
        if let Some(task) = self.event_loop.get_mut().take() {
            task.abort();
            debug!(broker = %self.address, "MQTT event loop stopped");
        }
    }
}
