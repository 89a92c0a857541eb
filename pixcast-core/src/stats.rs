//! Throughput statistics for a running pipeline.
//!
//! The frame loop only bumps atomics. A separate reporter task wakes on a
//! wall-clock interval, turns the window into frames/second and logs it,
//! so reporting can never slow the pipeline down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

// ── Throughput ───────────────────────────────────────────────────

/// Frames observed over one reporting window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    pub frames: u64,
    pub elapsed: Duration,
}

impl Throughput {
    /// Frames per second, `0.0` for an empty window.
    pub fn fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }
}

// ── FrameRateCounter ─────────────────────────────────────────────

/// Rolling frame counter with a cumulative total.
#[derive(Debug)]
pub struct FrameRateCounter {
    window: AtomicU64,
    total: AtomicU64,
    last_flush: Mutex<Instant>,
}

impl FrameRateCounter {
    pub fn new() -> Self {
        Self {
            window: AtomicU64::new(0),
            total: AtomicU64::new(0),
            last_flush: Mutex::new(Instant::now()),
        }
    }

    /// Count one completed frame.
    pub fn record_frame(&self) {
        self.window.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Frames since the counter was created.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Frames in the current window.
    pub fn pending(&self) -> u64 {
        self.window.load(Ordering::Relaxed)
    }

    /// When the current window started.
    pub fn last_flush(&self) -> Instant {
        *self.last_flush.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Close the current window and start a new one.
    pub fn flush(&self) -> Throughput {
        self.flush_at(Instant::now())
    }

    /// [`flush`](Self::flush) with an explicit clock (useful for testing).
    pub fn flush_at(&self, now: Instant) -> Throughput {
        let mut last = self.last_flush.lock().unwrap_or_else(PoisonError::into_inner);
        let frames = self.window.swap(0, Ordering::Relaxed);
        let elapsed = now.saturating_duration_since(*last);
        *last = now;
        Throughput { frames, elapsed }
    }
}

impl Default for FrameRateCounter {
    fn default() -> Self {
        Self::new()
    }
}

// ── Reporter ─────────────────────────────────────────────────────

/// Point-in-time gauges logged next to the frame rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Gauges {
    pub buffered_bytes: usize,
    pub outstanding_publishes: usize,
}

/// Spawn the periodic throughput logger.
///
/// Runs until `cancel` fires. `gauges` is sampled on every tick.
pub fn spawn_reporter<F>(
    interval: Duration,
    counter: Arc<FrameRateCounter>,
    cancel: CancellationToken,
    gauges: F,
) -> JoinHandle<()>
where
    F: Fn() -> Gauges + Send + 'static,
{
    tokio::spawn(async move {
        counter.flush();
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let window = counter.flush();
                    let g = gauges();
                    info!(
                        fps = window.fps(),
                        frames = window.frames,
                        total_frames = counter.total(),
                        buffered_bytes = g.buffered_bytes,
                        outstanding_publishes = g.outstanding_publishes,
                        "pipeline throughput"
                    );
                }
            }
        }
    })
}

// ── Tests ────────────────────────────────────────────────────────
