//! # pixcast-core
//!
//! Turns a decoder's raw RGBA byte stream into frames for pixel-matrix
//! displays.
//!
//! This crate contains:
//! - **Frame model**: `FrameSpec`, `Frame`, `SubFrame`, `DisplayMode`, `TargetId`
//! - **Reassembler**: `FrameReassembler` cuts arbitrary chunks into whole frames
//! - **Transform**: `BrightnessFactor` and `apply_brightness`
//! - **Distribute**: single-display passthrough or a top/bottom split
//! - **Publish**: `PublisherGateway`, an ordered whole-frame queue over a `Transport`
//! - **Transports**: `MqttTransport` (`rumqttc`), `ChannelTransport` (in-process),
//!   `TcpTransport` (`PublishCodec`)
//! - **Decoder**: `DecoderProcess`, the supervised external decoder
//! - **Pipeline**: `Pipeline` with `start` / `stop` / `status`
//! - **Error**: `PixcastError`, typed with `thiserror`

pub mod decoder;
pub mod distribute;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod processor;
pub mod publish;
pub mod reassembler;
pub mod stats;
pub mod supervisor;
pub mod transform;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use decoder::{DecoderConfig, DecoderProcess};
pub use distribute::distribute;
pub use error::{ConfigError, PixcastError, PublishError};
pub use frame::{
    BYTES_PER_PIXEL, DisplayMode, Frame, FrameSpec, MAX_FRAME_BYTES, SubFrame, TargetId,
};
pub use pipeline::{Pipeline, PipelineConfig, PipelineStatus, ProcessingState};
pub use processor::FrameProcessor;
pub use publish::{PublishConfig, PublishMetrics, PublisherGateway};
pub use reassembler::FrameReassembler;
pub use stats::{FrameRateCounter, Throughput};
pub use supervisor::{SessionEnd, StreamSupervisor};
pub use transform::{BrightnessFactor, MAX_BRIGHTNESS, apply_brightness};
pub use transport::{
    ChannelTransport, MqttTransport, MqttTransportConfig, PublishCodec, PublishMessage,
    TcpTransport, TcpTransportConfig, Transport,
};
