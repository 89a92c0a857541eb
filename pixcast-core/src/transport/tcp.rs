//! TCP transport to a publish broker.
//!
//! A single writer task owns the connection and writes [`PublishMessage`]s
//! framed by [`PublishCodec`]. `publish` enqueues its message before its
//! first await, so messages reach the wire in the order the calls were
//! made. The connection is opened lazily; a write error drops it and the
//! next message dials again.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::FramedWrite;
use tracing::{debug, info};

use crate::error::PublishError;
use crate::frame::TargetId;

use super::Transport;
use super::codec::{PublishCodec, PublishMessage};

/// Settings for [`TcpTransport`].
#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    /// Broker address, `host:port`.
    pub broker: String,
    /// Prepended to the target id to form the topic.
    pub topic_prefix: String,
    /// Upper bound on connecting to the broker.
    pub connect_timeout: Duration,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            broker: "127.0.0.1:1884".into(),
            topic_prefix: "matrix/".into(),
            connect_timeout: Duration::from_secs(3),
        }
    }
}

type Writer = FramedWrite<TcpStream, PublishCodec>;

struct Outgoing {
    message: PublishMessage,
    ack: oneshot::Sender<Result<(), PublishError>>,
}

/// Transport writing framed publish messages over one TCP connection.
pub struct TcpTransport {
    broker: String,
    topic_prefix: String,
    queue: mpsc::UnboundedSender<Outgoing>,
    connected: Arc<AtomicBool>,
}

impl TcpTransport {
    /// Spawn the writer task. Must be called inside a Tokio runtime.
    pub fn new(config: TcpTransportConfig) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        let broker = config.broker.clone();
        let topic_prefix = config.topic_prefix.clone();
        tokio::spawn(run_writer(config, rx, Arc::clone(&connected)));

        Self {
            broker,
            topic_prefix,
            queue,
            connected,
        }
    }

    /// Full topic for `target`.
    pub fn topic(&self, target: TargetId) -> String {
        format!("{}{}", self.topic_prefix, target.as_str())
    }

    /// Whether the writer currently holds an open connection.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn publish(&self, target: TargetId, payload: Bytes) -> Result<(), PublishError> {
        let (ack, done) = oneshot::channel();
        let message = PublishMessage {
            topic: self.topic(target),
            payload,
        };
        self.queue
            .send(Outgoing { message, ack })
            .map_err(|_| PublishError::NotConnected(self.broker.clone()))?;

        done.await
            .map_err(|_| PublishError::NotConnected(self.broker.clone()))?
    }
}

// ── Writer task ──────────────────────────────────────────────────

async fn run_writer(
    config: TcpTransportConfig,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
    connected: Arc<AtomicBool>,
) {
    let mut writer: Option<Writer> = None;

    while let Some(Outgoing { message, ack }) = rx.recv().await {
        let result = write_message(&config, &mut writer, message).await;
        connected.store(writer.is_some(), Ordering::Relaxed);
        // The caller may have given up waiting.
        let _ = ack.send(result);
    }
    debug!(broker = %config.broker, "tcp writer closed");
}

async fn write_message(
    config: &TcpTransportConfig,
    writer: &mut Option<Writer>,
    message: PublishMessage,
) -> Result<(), PublishError> {
    if writer.is_none() {
        *writer = Some(connect(config).await?);
    }
    let Some(framed) = writer.as_mut() else {
        return Err(PublishError::NotConnected(config.broker.clone()));
    };

    if let Err(e) = framed.send(message).await {
        debug!(broker = %config.broker, error = %e, "dropping broker connection");
        *writer = None;
        return Err(e.into());
    }
    Ok(())
}

async fn connect(config: &TcpTransportConfig) -> Result<Writer, PublishError> {
    let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&config.broker))
        .await
        .map_err(|_| PublishError::NotConnected(config.broker.clone()))??;
    stream.set_nodelay(true)?;

    info!(broker = %config.broker, "connected to broker");
    Ok(FramedWrite::new(stream, PublishCodec))
}
