//! # pixcast-bridge
//!
//! Service that pulls a stream through the decoder and publishes the frames
//! to one or two pixel-matrix displays through an MQTT broker (or the plain
//! TCP publish protocol).
//!
//! Settings come from a TOML file (see [`config::BridgeConfig`]); the stream
//! name and broker can be overridden on the command line.

pub mod config;
