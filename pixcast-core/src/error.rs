//! Domain-specific error types for the pixcast pipeline.
//!
//! Configuration problems are caught once, when a pipeline is built.
//! Publish failures are reported per call and never stop the pipeline.

use thiserror::Error;

use crate::frame::TargetId;

/// The canonical error type for pipeline construction and control.
#[derive(Debug, Error)]
pub enum PixcastError {
    // ── Configuration ────────────────────────────────────────────
    /// The pipeline configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    // ── Decoder Process ──────────────────────────────────────────
    /// The external decoder could not be launched.
    #[error("failed to spawn decoder `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The decoder was started without a piped stdout.
    #[error("decoder stdout is not available")]
    MissingStdout,

    /// Reading from or waiting on the decoder failed.
    #[error("decoder I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── ConfigError ──────────────────────────────────────────────────

/// Reasons a [`PipelineConfig`](crate::PipelineConfig) is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Width or height is zero.
    #[error("frame dimensions must be positive, got {width}x{height}")]
    ZeroDimension { width: u32, height: u32 },

    /// `width * height * 4` exceeds the largest publishable frame.
    #[error("frame {width}x{height} exceeds the {limit}-byte frame limit")]
    FrameTooLarge {
        width: u32,
        height: u32,
        limit: usize,
    },

    /// Brightness percentage outside `0..=100`.
    #[error("brightness must be within 0..=100, got {0}")]
    BrightnessOutOfRange(u32),

    /// The decoder output rate is zero.
    #[error("frame rate must be positive")]
    ZeroFrameRate,

    /// No decoder program was configured.
    #[error("decoder program is empty")]
    EmptyProgram,

    /// The stats reporting interval is zero.
    #[error("stats interval must be positive")]
    ZeroStatsInterval,

    /// The publish timeout is zero.
    #[error("publish timeout must be positive")]
    ZeroPublishTimeout,

    /// A broker address that is not `host:port`.
    #[error("broker address must be host:port, got `{0}`")]
    InvalidBroker(String),
}

// ── PublishError ─────────────────────────────────────────────────

/// Failure of a single [`Transport::publish`](crate::Transport::publish) call.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The underlying socket reported an error.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport has no live connection to the broker.
    #[error("not connected to {0}")]
    NotConnected(String),

    /// Nobody is listening on the target's topic.
    #[error("no subscribers for {0}")]
    NoSubscribers(TargetId),

    /// The transport refused the payload.
    #[error("publish rejected: {0}")]
    Rejected(String),

    /// The call did not complete within the gateway's publish timeout.
    #[error("publish timed out after {0:?}")]
    TimedOut(std::time::Duration),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for PixcastError {
    fn from(s: String) -> Self {
        PixcastError::Other(s)
    }
}

impl From<&str> for PixcastError {
    fn from(s: &str) -> Self {
        PixcastError::Other(s.to_string())
    }
}
