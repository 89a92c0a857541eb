//! MQTT transport built on `rumqttc`.
//!
//! ```text
//!  publish(target) ─► AsyncClient ─► [request channel] ─► EventLoop ─► broker
//!                                                            ▲
//!                                     poll task: ConnAck / errors / backoff
//! ```
//!
//! Each sub-frame goes out as one QoS 1 (at-least-once) publish on
//! `topic_prefix + target`. The request channel is FIFO and a call enqueues
//! before its first await, so broker order follows call order. While the
//! broker is unreachable calls fail fast with
//! [`PublishError::NotConnected`]; reconnecting is the poll task's job.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{
    AsyncClient, ClientError, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, PublishError};
use crate::frame::{MAX_FRAME_BYTES, TargetId};

use super::Transport;

/// Room for the fixed header, topic and packet id on top of the payload.
const PACKET_OVERHEAD: usize = 64 * 1024;

/// Settings for [`MqttTransport`].
#[derive(Debug, Clone)]
pub struct MqttTransportConfig {
    /// Broker address, `host:port`.
    pub broker: String,
    pub client_id: String,
    /// Prepended to the target id to form the topic.
    pub topic_prefix: String,
    pub keep_alive: Duration,
    /// Requests the client may queue ahead of the event loop.
    pub request_capacity: usize,
    /// Pause between reconnect attempts.
    pub reconnect_delay: Duration,
}

impl Default for MqttTransportConfig {
    fn default() -> Self {
        Self {
            broker: "127.0.0.1:1883".into(),
            client_id: "pixcast-bridge".into(),
            topic_prefix: "matrix/".into(),
            keep_alive: Duration::from_secs(30),
            request_capacity: 64,
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

impl MqttTransportConfig {
    /// Split `broker` into host and port.
    pub fn host_port(&self) -> Result<(String, u16), ConfigError> {
        let invalid = || ConfigError::InvalidBroker(self.broker.clone());
        let (host, port) = self.broker.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        Ok((host.to_string(), port))
    }
}

// ── MqttTransport ────────────────────────────────────────────────

/// Transport publishing sub-frames to an MQTT broker.
pub struct MqttTransport {
    client: AsyncClient,
    broker: String,
    topic_prefix: String,
    connected: Arc<AtomicBool>,
    poller: JoinHandle<()>,
}

impl MqttTransport {
    /// Build the client and spawn its event loop. Must be called inside a
    /// Tokio runtime.
    pub fn new(config: MqttTransportConfig) -> Result<Self, ConfigError> {
        let (host, port) = config.host_port()?;
        let mut options = MqttOptions::new(config.client_id.clone(), host, port);
        options.set_keep_alive(config.keep_alive);
        options.set_max_packet_size(
            MAX_FRAME_BYTES + PACKET_OVERHEAD,
            MAX_FRAME_BYTES + PACKET_OVERHEAD,
        );

        let (client, eventloop) = AsyncClient::new(options, config.request_capacity.max(1));
        let connected = Arc::new(AtomicBool::new(false));
        let poller = tokio::spawn(run_eventloop(
            eventloop,
            config.broker.clone(),
            Arc::clone(&connected),
            config.reconnect_delay,
        ));

        Ok(Self {
            client,
            broker: config.broker,
            topic_prefix: config.topic_prefix,
            connected,
            poller,
        })
    }

    /// Full topic for `target`.
    pub fn topic(&self, target: TargetId) -> String {
        format!("{}{}", self.topic_prefix, target.as_str())
    }

    /// Whether the broker has acknowledged the current connection.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.poller.abort();
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn publish(&self, target: TargetId, payload: Bytes) -> Result<(), PublishError> {
        if !self.is_connected() {
            return Err(PublishError::NotConnected(self.broker.clone()));
        }
        self.client
            .publish_bytes(self.topic(target), QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| match e {
                ClientError::Request(_) | ClientError::TryRequest(_) => {
                    PublishError::NotConnected(self.broker.clone())
                }
            })
    }
}

// ── Event loop ───────────────────────────────────────────────────

async fn run_eventloop(
    mut eventloop: EventLoop,
    broker: String,
    connected: Arc<AtomicBool>,
    reconnect_delay: Duration,
) {
    // Consecutive failures since the last ConnAck.
    let mut failures = 0u32;
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                connected.store(true, Ordering::Relaxed);
                info!(broker = %broker, code = ?ack.code, failures, "connected to broker");
                failures = 0;
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                connected.store(false, Ordering::Relaxed);
                warn!(broker = %broker, "broker closed the session");
            }
            Ok(_) => {}
            Err(ConnectionError::RequestsDone) => break,
            Err(e) => {
                failures = failures.saturating_add(1);
                if connected.swap(false, Ordering::Relaxed) {
                    warn!(broker = %broker, error = %e, "lost broker connection");
                } else if failures == 1 {
                    warn!(broker = %broker, error = %e, "broker unreachable, retrying");
                } else {
                    debug!(broker = %broker, error = %e, failures, "broker still unreachable");
                }
                tokio::time::sleep(reconnect_delay).await;
            }
        }
    }
    debug!(broker = %broker, "mqtt event loop closed");
}
