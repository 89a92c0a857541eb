//! Decoder lifecycle for a single streaming session.
//!
//! ```text
//!  launch() ─► DecoderProcess + stdout
//!                 │
//!  run() ────── pump(stdout) ─► FrameProcessor::process_chunk
//!                 │  ends on: stop (cancel) │ end-of-stream │ read error
//!                 ▼
//!              DecoderProcess::shutdown()   (kill + reap, every path)
//! ```
//!
//! Cancellation only suppresses the *next* read. A chunk already read is
//! always processed to completion.

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::process::ChildStdout;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::decoder::{DecoderConfig, DecoderProcess};
use crate::error::PixcastError;
use crate::frame::FrameSpec;
use crate::processor::FrameProcessor;

/// Read size used on the decoder's stdout.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Why a session stopped reading.
#[derive(Debug)]
pub enum SessionEnd {
    /// `stop()` was requested.
    Stopped,
    /// The decoder closed its stdout.
    EndOfStream,
    /// Reading the decoder output failed.
    ReadError(std::io::Error),
}

impl std::fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::EndOfStream => write!(f, "end of stream"),
            Self::ReadError(e) => write!(f, "read error: {e}"),
        }
    }
}

/// Launches decoders and drives their output through a processor.
#[derive(Debug, Clone)]
pub struct StreamSupervisor {
    decoder: DecoderConfig,
    spec: FrameSpec,
}

impl StreamSupervisor {
    pub fn new(decoder: DecoderConfig, spec: FrameSpec) -> Self {
        Self { decoder, spec }
    }

    /// Start the decoder for `stream`.
    pub fn launch(&self, stream: &str) -> Result<(DecoderProcess, ChildStdout), PixcastError> {
        DecoderProcess::spawn(&self.decoder, stream, &self.spec)
    }

    /// Pump decoder output until the session ends, then tear the decoder
    /// down.
    pub async fn run(
        &self,
        process: DecoderProcess,
        stdout: ChildStdout,
        processor: &mut FrameProcessor,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        let end = pump(stdout, processor, cancel).await;
        match &end {
            SessionEnd::Stopped => info!("stopping decoder"),
            SessionEnd::EndOfStream => info!("decoder output ended"),
            SessionEnd::ReadError(e) => warn!(error = %e, "decoder output failed"),
        }

        if let Err(e) = process.shutdown().await {
            warn!(error = %e, "failed to reap decoder");
        }
        end
    }
}

/// Feed `reader` chunk by chunk into `processor`.
pub async fn pump<R>(
    reader: R,
    processor: &mut FrameProcessor,
    cancel: &CancellationToken,
) -> SessionEnd
where
    R: AsyncRead + Unpin,
{
    let mut chunks = ReaderStream::with_capacity(reader, READ_CHUNK_SIZE);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return SessionEnd::Stopped,
            next = chunks.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                let frames = processor.process_chunk(&chunk);
                if frames > 0 {
                    debug!(
                        bytes = chunk.len(),
                        frames,
                        buffered = processor.buffered(),
                        "chunk processed"
                    );
                }
            }
            Some(Err(e)) => return SessionEnd::ReadError(e),
            None => return SessionEnd::EndOfStream,
        }
    }
}
