//! Wire framing for publish messages.
//!
//! ```text
//! topic_len:    u16  (2)   little-endian
//! topic:        [u8]       UTF-8
//! payload_len:  u32  (4)   little-endian
//! payload:      [u8]
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::MAX_FRAME_BYTES;

/// Largest payload accepted in either direction: one whole frame.
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_BYTES;

const TOPIC_LEN_SIZE: usize = 2;
const PAYLOAD_LEN_SIZE: usize = 4;

/// One message on a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// `tokio_util` codec for [`PublishMessage`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PublishCodec;

impl Encoder<PublishMessage> for PublishCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: PublishMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let topic = item.topic.as_bytes();
        if topic.len() > u16::MAX as usize {
            return Err(invalid_data("topic too long"));
        }
        if item.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(invalid_data("payload too large"));
        }

        dst.reserve(TOPIC_LEN_SIZE + topic.len() + PAYLOAD_LEN_SIZE + item.payload.len());
        dst.put_u16_le(topic.len() as u16);
        dst.put_slice(topic);
        dst.put_u32_le(item.payload.len() as u32);
        dst.put_slice(&item.payload);
        Ok(())
    }
}

impl Decoder for PublishCodec {
    type Item = PublishMessage;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < TOPIC_LEN_SIZE {
            return Ok(None);
        }
        let topic_len = u16::from_le_bytes([src[0], src[1]]) as usize;
        let len_at = TOPIC_LEN_SIZE + topic_len;
        if src.len() < len_at + PAYLOAD_LEN_SIZE {
            return Ok(None);
        }
        let payload_len = u32::from_le_bytes([
            src[len_at],
            src[len_at + 1],
            src[len_at + 2],
            src[len_at + 3],
        ]) as usize;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(invalid_data("payload too large"));
        }
        let total = len_at + PAYLOAD_LEN_SIZE + payload_len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(TOPIC_LEN_SIZE);
        let topic = src.split_to(topic_len);
        let topic = String::from_utf8(topic.to_vec())
            .map_err(|_| invalid_data("topic is not valid utf-8"))?;
        src.advance(PAYLOAD_LEN_SIZE);
        let payload = src.split_to(payload_len).freeze();

        Ok(Some(PublishMessage { topic, payload }))
    }
}

fn invalid_data(msg: &'static str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg)
}
