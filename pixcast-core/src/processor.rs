//! One synchronous pass per chunk: reassemble, scale, split, submit.
//!
//! Nothing in here awaits. Every frame completed by a chunk is handed to
//! the gateway before the caller reads the next chunk, so frames leave in
//! arrival order.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::distribute::distribute;
use crate::frame::{DisplayMode, FrameSpec};
use crate::publish::PublisherGateway;
use crate::reassembler::FrameReassembler;
use crate::stats::FrameRateCounter;
use crate::transform::{BrightnessFactor, apply_brightness};

/// Per-session frame path from raw bytes to queued sub-frames.
pub struct FrameProcessor {
    reassembler: FrameReassembler,
    spec: FrameSpec,
    mode: DisplayMode,
    brightness: BrightnessFactor,
    gateway: PublisherGateway,
    counter: Arc<FrameRateCounter>,
    buffered: Arc<AtomicUsize>,
}

impl FrameProcessor {
    pub fn new(
        spec: FrameSpec,
        mode: DisplayMode,
        brightness: BrightnessFactor,
        gateway: PublisherGateway,
        counter: Arc<FrameRateCounter>,
    ) -> Self {
        Self {
            reassembler: FrameReassembler::new(spec),
            spec,
            mode,
            brightness,
            gateway,
            counter,
            buffered: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Handle one chunk and return how many frames it completed.
    pub fn process_chunk(&mut self, chunk: &[u8]) -> usize {
        let mut completed = 0;

        for frame in self.reassembler.feed(chunk) {
            let frame = apply_brightness(frame, &self.brightness);
            self.gateway.submit(distribute(frame, self.mode, &self.spec));
            self.counter.record_frame();
            completed += 1;
        }

        self.buffered
            .store(self.reassembler.buffered(), Ordering::Relaxed);
        completed
    }

    /// Bytes of the next, incomplete frame.
    pub fn buffered(&self) -> usize {
        self.reassembler.buffered()
    }

    /// Gauge mirroring [`buffered`](Self::buffered), readable from other tasks.
    pub fn buffered_gauge(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.buffered)
    }
}
