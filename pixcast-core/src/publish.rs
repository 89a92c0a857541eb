//! Publisher gateway: hands frames to the transport without blocking the
//! frame loop.
//!
//! Frames are queued whole, as the ordered sub-frames `distribute`
//! produced. One dispatcher task takes them in sequence order and starts
//! every call of a frame in target order, so display1 always reaches the
//! transport before display2. The calls of one frame then run
//! concurrently: a failing or stalled display never holds back the other
//! half of the same frame, and a stalled call is cut off after
//! `publish_timeout`.
//!
//! ```text
//!  submit([d1, d2]) ─► [frame queue] ─► dispatcher ─┬─► publish(display1)
//!                                                   └─► publish(display2)
//! ```
//!
//! With `max_queued_frames > 0` a full queue drops its *oldest* frame, both
//! halves together, so the displays never show different frames. `0`
//! leaves the queue unbounded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::PublishError;
use crate::frame::SubFrame;
use crate::transport::Transport;

/// Gateway tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishConfig {
    /// Whole frames queued before the oldest is dropped; `0` disables the bound.
    pub max_queued_frames: usize,
    /// Upper bound on a single transport call.
    pub publish_timeout: Duration,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            max_queued_frames: 4,
            publish_timeout: Duration::from_secs(2),
        }
    }
}

// ── PublishMetrics ───────────────────────────────────────────────

/// Counters shared by every gateway a pipeline creates.
#[derive(Debug, Default)]
pub struct PublishMetrics {
    published: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    outstanding: AtomicUsize,
}

impl PublishMetrics {
    /// Sub-frames the transport accepted.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Sub-frames whose publish failed or timed out.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Whole frames evicted from a full queue before being published.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Sub-frames queued or in flight.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Relaxed)
    }
}

// ── FrameQueue ───────────────────────────────────────────────────

struct FrameQueue {
    frames: Mutex<VecDeque<Vec<SubFrame>>>,
    notify: Notify,
    closed: AtomicBool,
}

impl FrameQueue {
    fn new() -> Self {
        Self {
            frames: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Push a frame, returning the evicted one if the queue was full.
    fn push(&self, parts: Vec<SubFrame>, bound: usize) -> Option<Vec<SubFrame>> {
        let mut frames = self.frames.lock().unwrap_or_else(PoisonError::into_inner);
        let evicted = if bound > 0 && frames.len() >= bound {
            frames.pop_front()
        } else {
            None
        };
        frames.push_back(parts);
        evicted
    }

    fn pop(&self) -> Option<Vec<SubFrame>> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

// ── PublisherGateway ─────────────────────────────────────────────

/// Fire-and-forget front of a [`Transport`].
///
/// Must be created inside a Tokio runtime; it spawns the dispatcher.
/// Dropping or [`close`](Self::close)-ing the gateway lets the dispatcher
/// finish what is already queued and exit.
pub struct PublisherGateway {
    queue: Arc<FrameQueue>,
    metrics: Arc<PublishMetrics>,
    config: PublishConfig,
}

impl PublisherGateway {
    pub fn spawn(
        transport: Arc<dyn Transport>,
        config: PublishConfig,
        metrics: Arc<PublishMetrics>,
    ) -> Self {
        let queue = Arc::new(FrameQueue::new());
        tokio::spawn(run_dispatcher(
            Arc::clone(&queue),
            transport,
            Arc::clone(&metrics),
            config.publish_timeout,
        ));
        Self {
            queue,
            metrics,
            config,
        }
    }

    /// Queue the sub-frames of one frame and return immediately.
    ///
    /// `parts` must be in target order, as [`distribute`](crate::distribute)
    /// returns them.
    pub fn submit(&self, parts: Vec<SubFrame>) {
        if parts.is_empty() {
            return;
        }
        self.metrics
            .outstanding
            .fetch_add(parts.len(), Ordering::Relaxed);

        if let Some(evicted) = self.queue.push(parts, self.config.max_queued_frames) {
            self.metrics
                .outstanding
                .fetch_sub(evicted.len(), Ordering::Relaxed);
            self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(
                sequence = evicted.first().map(|s| s.sequence),
                "publish queue full, dropped oldest frame"
            );
        }
        self.queue.notify.notify_one();
    }

    /// Shared counters.
    pub fn metrics(&self) -> &Arc<PublishMetrics> {
        &self.metrics
    }

    /// Stop accepting work once the queue drains.
    pub fn close(&self) {
        self.queue.closed.store(true, Ordering::SeqCst);
        self.queue.notify.notify_one();
    }
}

impl Drop for PublisherGateway {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_dispatcher(
    queue: Arc<FrameQueue>,
    transport: Arc<dyn Transport>,
    metrics: Arc<PublishMetrics>,
    timeout: Duration,
) {
    loop {
        let Some(parts) = queue.pop() else {
            if queue.closed.load(Ordering::SeqCst) {
                break;
            }
            queue.notify.notified().await;
            continue;
        };

        // join_all polls its futures in order, so each call is started in
        // target order before any of them is awaited.
        let calls = parts
            .into_iter()
            .map(|sub| publish_one(transport.as_ref(), sub, timeout, &metrics));
        join_all(calls).await;
    }
    debug!("publish dispatcher closed");
}

async fn publish_one(
    transport: &dyn Transport,
    sub: SubFrame,
    timeout: Duration,
    metrics: &PublishMetrics,
) {
    let SubFrame {
        target,
        sequence,
        data,
    } = sub;
    let result = match tokio::time::timeout(timeout, transport.publish(target, data)).await {
        Ok(result) => result,
        Err(_) => Err(PublishError::TimedOut(timeout)),
    };
    metrics.outstanding.fetch_sub(1, Ordering::Relaxed);

    match result {
        Ok(()) => {
            metrics.published.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            metrics.failed.fetch_add(1, Ordering::Relaxed);
            warn!(display = %target, sequence, error = %e, "publish failed");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::frame::TargetId;

    /// Records `(target, first payload byte)` on entry; display1 then waits
    /// for a permit (or a fixed delay) before completing.
    struct StallingTransport {
        gate: Option<Semaphore>,
        delay: Duration,
        entered: Mutex<Vec<(TargetId, u8)>>,
        completed: Mutex<Vec<(TargetId, u8)>>,
    }

    impl StallingTransport {
        fn gated() -> Self {
            Self {
                gate: Some(Semaphore::new(0)),
                delay: Duration::ZERO,
                entered: Mutex::new(Vec::new()),
                completed: Mutex::new(Vec::new()),
            }
        }

        fn delayed(delay: Duration) -> Self {
            Self {
                gate: None,
                delay,
                entered: Mutex::new(Vec::new()),
                completed: Mutex::new(Vec::new()),
            }
        }

        fn completed(&self, target: TargetId) -> Vec<u8> {
            self.completed
                .lock()
                .unwrap()
                .iter()
                .filter(|(t, _)| *t == target)
                .map(|(_, seq)| *seq)
                .collect()
        }
    }

    #[async_trait]
    impl Transport for StallingTransport {
        async fn publish(&self, target: TargetId, payload: Bytes) -> Result<(), PublishError> {
            self.entered.lock().unwrap().push((target, payload[0]));
            if target == TargetId::Display1 {
                if let Some(gate) = &self.gate {
                    gate.acquire().await.unwrap().forget();
                }
                tokio::time::sleep(self.delay).await;
            }
            self.completed.lock().unwrap().push((target, payload[0]));
            Ok(())
        }
    }

    fn dual_frame(sequence: u8) -> Vec<SubFrame> {
        TargetId::ALL
            .iter()
            .map(|&target| SubFrame {
                target,
                sequence: sequence as u64,
                data: Bytes::from(vec![sequence]),
            })
            .collect()
    }

    fn unbounded() -> PublishConfig {
        PublishConfig {
            max_queued_frames: 0,
            ..Default::default()
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn calls_start_in_target_order() {
        let transport = Arc::new(StallingTransport::delayed(Duration::from_millis(1)));
        let metrics = Arc::new(PublishMetrics::default());
        let gw = PublisherGateway::spawn(transport.clone(), unbounded(), metrics);

        for seq in 0..100u8 {
            gw.submit(dual_frame(seq));
        }
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while gw.metrics().published() < 200 {
            assert!(tokio::time::Instant::now() < deadline, "publishes stalled");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let expected: Vec<(TargetId, u8)> = (0..100u8)
            .flat_map(|seq| [(TargetId::Display1, seq), (TargetId::Display2, seq)])
            .collect();
        assert_eq!(*transport.entered.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn stalled_display_does_not_hold_back_other_half() {
        let transport = Arc::new(StallingTransport::gated());
        let metrics = Arc::new(PublishMetrics::default());
        let gw = PublisherGateway::spawn(transport.clone(), PublishConfig::default(), metrics);

        gw.submit(dual_frame(0));
        settle().await;

        assert_eq!(transport.completed(TargetId::Display2), vec![0]);
        assert!(transport.completed(TargetId::Display1).is_empty());
        assert_eq!(gw.metrics().outstanding(), 1);

        if let Some(gate) = &transport.gate {
            gate.add_permits(1);
        }
        settle().await;
        assert_eq!(gw.metrics().published(), 2);
        assert_eq!(gw.metrics().outstanding(), 0);
    }

    #[tokio::test]
    async fn hung_call_times_out() {
        let transport = Arc::new(StallingTransport::gated());
        let metrics = Arc::new(PublishMetrics::default());
        let config = PublishConfig {
            publish_timeout: Duration::from_millis(30),
            ..unbounded()
        };
        let gw = PublisherGateway::spawn(transport.clone(), config, metrics);

        gw.submit(dual_frame(0));
        gw.submit(dual_frame(1));
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(gw.metrics().failed(), 2);
        assert_eq!(transport.completed(TargetId::Display2), vec![0, 1]);
        assert_eq!(gw.metrics().outstanding(), 0);
    }

    #[tokio::test]
    async fn slow_display_drops_whole_frames() {
        let transport = Arc::new(StallingTransport::delayed(Duration::from_millis(20)));
        let metrics = Arc::new(PublishMetrics::default());
        let gw = PublisherGateway::spawn(transport.clone(), PublishConfig::default(), metrics);

        for seq in 0..50u8 {
            gw.submit(dual_frame(seq));
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while gw.metrics().outstanding() > 0 {
            assert!(tokio::time::Instant::now() < deadline, "queue never drained");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let top = transport.completed(TargetId::Display1);
        let bottom = transport.completed(TargetId::Display2);
        let dropped = gw.metrics().dropped();
        assert!(dropped > 0);
        assert_eq!(top, bottom);
        assert_eq!(top.len() as u64 + dropped, 50);
        assert_eq!(gw.metrics().published(), 2 * top.len() as u64);
    }

    #[tokio::test]
    async fn full_queue_drops_oldest_frame() {
        let transport = Arc::new(StallingTransport::gated());
        let metrics = Arc::new(PublishMetrics::default());
        let config = PublishConfig {
            max_queued_frames: 2,
            ..Default::default()
        };
        let gw = PublisherGateway::spawn(transport.clone(), config, metrics);

        // Frame 0 goes in flight and blocks on display1; 1..=4 queue behind it.
        gw.submit(dual_frame(0));
        settle().await;
        for seq in 1..=4u8 {
            gw.submit(dual_frame(seq));
        }
        assert_eq!(gw.metrics().dropped(), 2);
        // display1 of frame 0 in flight, frames 3 and 4 queued.
        assert_eq!(gw.metrics().outstanding(), 5);

        if let Some(gate) = &transport.gate {
            gate.add_permits(10);
        }
        settle().await;

        assert_eq!(transport.completed(TargetId::Display1), vec![0, 3, 4]);
        assert_eq!(transport.completed(TargetId::Display2), vec![0, 3, 4]);
    }

    #[tokio::test]
    async fn unbounded_queue_keeps_everything() {
        let transport = Arc::new(StallingTransport::gated());
        let metrics = Arc::new(PublishMetrics::default());
        let gw = PublisherGateway::spawn(transport.clone(), unbounded(), metrics);

        for seq in 0..20u8 {
            gw.submit(dual_frame(seq));
        }
        assert_eq!(gw.metrics().outstanding(), 40);
        assert_eq!(gw.metrics().dropped(), 0);

        if let Some(gate) = &transport.gate {
            gate.add_permits(20);
        }
        settle().await;
        assert_eq!(gw.metrics().published(), 40);
        gw.submit(Vec::new());
        assert_eq!(gw.metrics().outstanding(), 0);
    }
}
