//! In-process transport.
//!
//! Each display gets its own broadcast channel. Subscribers share the
//! published `Bytes` by reference count, so fan-out never copies pixels.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

use crate::error::PublishError;
use crate::frame::TargetId;

use super::Transport;

/// Broadcast-backed transport, one channel per target.
pub struct ChannelTransport {
    senders: [broadcast::Sender<Bytes>; 2],
}

impl ChannelTransport {
    /// Create a transport whose channels hold up to `capacity` payloads
    /// per lagging subscriber.
    pub fn new(capacity: usize) -> Self {
        let (display1, _) = broadcast::channel(capacity.max(1));
        let (display2, _) = broadcast::channel(capacity.max(1));
        Self {
            senders: [display1, display2],
        }
    }

    /// Receive everything published to `target` from now on.
    pub fn subscribe(&self, target: TargetId) -> broadcast::Receiver<Bytes> {
        self.senders[target.index()].subscribe()
    }

    /// Live subscribers on `target`.
    pub fn subscriber_count(&self, target: TargetId) -> usize {
        self.senders[target.index()].receiver_count()
    }
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::new(16)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn publish(&self, target: TargetId, payload: Bytes) -> Result<(), PublishError> {
        self.senders[target.index()]
            .send(payload)
            .map(|_| ())
            .map_err(|_| PublishError::NoSubscribers(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_only_its_target() {
        let transport = ChannelTransport::default();
        let mut rx1 = transport.subscribe(TargetId::Display1);
        let mut rx2 = transport.subscribe(TargetId::Display2);

        transport
            .publish(TargetId::Display2, Bytes::from_static(b"bottom"))
            .await
            .unwrap();

        assert_eq!(rx2.recv().await.unwrap(), Bytes::from_static(b"bottom"));
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_without_subscribers_fails() {
        let transport = ChannelTransport::new(4);
        let err = transport
            .publish(TargetId::Display1, Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::NoSubscribers(TargetId::Display1)));
        assert_eq!(transport.subscriber_count(TargetId::Display1), 0);
    }
}
