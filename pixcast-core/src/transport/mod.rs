//! Publish/subscribe transports that carry sub-frames to displays.
//!
//! | Transport          | Purpose                                        |
//! |--------------------|------------------------------------------------|
//! | [`ChannelTransport`] | In-process fan-out over `tokio::sync::broadcast` |
//! | [`MqttTransport`]    | QoS 1 publishes to an MQTT broker (`rumqttc`)   |
//! | [`TcpTransport`]     | Framed publish messages to a TCP broker         |
//!
//! Every call is independent and reports its own outcome. Retrying is left
//! to the transport implementation; the pipeline never retries.

pub mod channel;
pub mod codec;
pub mod mqtt;
pub mod tcp;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::PublishError;
use crate::frame::TargetId;

pub use channel::ChannelTransport;
pub use codec::{PublishCodec, PublishMessage};
pub use mqtt::{MqttTransport, MqttTransportConfig};
pub use tcp::{TcpTransport, TcpTransportConfig};

/// Something that can deliver a payload to a display.
///
/// Implementations must fix a call's place in their output order before
/// its first await, so calls started in sequence leave in sequence.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Deliver `payload` to `target`.
    async fn publish(&self, target: TargetId, payload: Bytes) -> Result<(), PublishError>;
}
