//! Control surface: `start`, `stop`, `status`.
//!
//! A [`Pipeline`] owns one session at a time. Each session gets a fresh
//! decoder, reassembler and publisher gateway; the frame counter and the
//! publish metrics outlive sessions.
//!
//! ```text
//!            start(stream)           decoder spawned
//!   Idle ───────────────► Starting ─────────────────► Running
//!    ▲                       │ spawn failed              │
//!    └───────────────────────┘                           │
//!    └───────────── stop() │ end of stream │ read error ─┘
//! ```

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::decoder::DecoderConfig;
use crate::error::{ConfigError, PixcastError};
use crate::frame::{DisplayMode, FrameSpec};
use crate::processor::FrameProcessor;
use crate::publish::{PublishConfig, PublishMetrics, PublisherGateway};
use crate::stats::{FrameRateCounter, Gauges, spawn_reporter};
use crate::supervisor::StreamSupervisor;
use crate::transform::BrightnessFactor;
use crate::transport::Transport;

// ── PipelineConfig ───────────────────────────────────────────────

/// Everything a [`Pipeline`] needs, validated once by [`Pipeline::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    pub mode: DisplayMode,
    /// Brightness percentage, `0..=100`.
    pub brightness: u32,
    pub decoder: DecoderConfig,
    pub publish: PublishConfig,
    /// How often throughput is logged.
    pub stats_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            width: 128,
            height: 64,
            mode: DisplayMode::Single,
            brightness: 100,
            decoder: DecoderConfig::default(),
            publish: PublishConfig::default(),
            stats_interval: Duration::from_secs(5),
        }
    }
}

impl PipelineConfig {
    /// Check every field and derive the frame geometry and brightness table.
    pub fn validate(&self) -> Result<(FrameSpec, BrightnessFactor), ConfigError> {
        let spec = FrameSpec::new(self.width, self.height)?;
        let brightness = BrightnessFactor::from_percent(self.brightness)?;
        self.decoder.validate()?;
        if self.stats_interval.is_zero() {
            return Err(ConfigError::ZeroStatsInterval);
        }
        if self.publish.publish_timeout.is_zero() {
            return Err(ConfigError::ZeroPublishTimeout);
        }
        Ok((spec, brightness))
    }
}

// ── State / status ───────────────────────────────────────────────

/// Lifecycle of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingState {
    Idle,
    Starting,
    Running { stream: String, since: Instant },
}

impl ProcessingState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Point-in-time snapshot returned by [`Pipeline::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStatus {
    pub is_processing: bool,
    /// Bytes of the incomplete next frame.
    pub buffered_bytes: usize,
    pub expected_frame_size: usize,
    /// Frames completed since the pipeline was created.
    pub frames_processed: u64,
    pub outstanding_publishes: usize,
    pub publish_failures: u64,
    pub dropped_publishes: u64,
    /// Stream of the running session.
    pub stream: Option<String>,
}

// ── Pipeline ─────────────────────────────────────────────────────

struct ActiveSession {
    generation: u64,
    cancel: CancellationToken,
    buffered: Arc<AtomicUsize>,
    handle: Option<JoinHandle<()>>,
}

struct Shared {
    config: PipelineConfig,
    spec: FrameSpec,
    brightness: BrightnessFactor,
    supervisor: StreamSupervisor,
    transport: Arc<dyn Transport>,
    state: watch::Sender<ProcessingState>,
    active: Mutex<Option<ActiveSession>>,
    counter: Arc<FrameRateCounter>,
    metrics: Arc<PublishMetrics>,
    generation: AtomicU64,
}

impl Shared {
    fn active(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called by a session task once it has torn down. A session that was
    /// already stopped (or replaced) leaves the state alone.
    fn finish(&self, generation: u64) {
        let mut active = self.active();
        if active.as_ref().is_some_and(|s| s.generation == generation) {
            *active = None;
            self.state.send_replace(ProcessingState::Idle);
        }
    }
}

/// Frame ingestion and distribution pipeline.
///
/// Must be driven from inside a Tokio runtime. Dropping the pipeline stops
/// any running session.
pub struct Pipeline {
    shared: Arc<Shared>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, transport: Arc<dyn Transport>) -> Result<Self, PixcastError> {
        let (spec, brightness) = config.validate()?;
        let supervisor = StreamSupervisor::new(config.decoder.clone(), spec);
        let (state, _) = watch::channel(ProcessingState::Idle);

        info!(
            %spec,
            mode = ?config.mode,
            brightness = brightness.percent(),
            fps = config.decoder.fps,
            "pipeline configured"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                spec,
                brightness,
                supervisor,
                transport,
                state,
                active: Mutex::new(None),
                counter: Arc::new(FrameRateCounter::new()),
                metrics: Arc::new(PublishMetrics::default()),
                generation: AtomicU64::new(0),
            }),
        })
    }

    /// Launch the decoder for `stream` and begin processing.
    ///
    /// Does nothing if a session is already active.
    pub fn start(&self, stream: &str) -> Result<(), PixcastError> {
        let shared = &self.shared;
        let mut active = shared.active();
        if active.is_some() {
            info!(stream, "pipeline already processing, start ignored");
            return Ok(());
        }

        shared.state.send_replace(ProcessingState::Starting);
        let (process, stdout) = match shared.supervisor.launch(stream) {
            Ok(launched) => launched,
            Err(e) => {
                shared.state.send_replace(ProcessingState::Idle);
                warn!(stream, error = %e, "failed to start decoder");
                return Err(e);
            }
        };

        let generation = shared.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();

        let gateway = PublisherGateway::spawn(
            Arc::clone(&shared.transport),
            shared.config.publish,
            Arc::clone(&shared.metrics),
        );
        let mut processor = FrameProcessor::new(
            shared.spec,
            shared.config.mode,
            shared.brightness.clone(),
            gateway,
            Arc::clone(&shared.counter),
        );
        let buffered = processor.buffered_gauge();

        let gauge = Arc::clone(&buffered);
        let metrics = Arc::clone(&shared.metrics);
        spawn_reporter(
            shared.config.stats_interval,
            Arc::clone(&shared.counter),
            cancel.child_token(),
            move || Gauges {
                buffered_bytes: gauge.load(Ordering::Relaxed),
                outstanding_publishes: metrics.outstanding(),
            },
        );

        let task_shared = Arc::clone(shared);
        let task_cancel = cancel.clone();
        let task_stream = stream.to_owned();
        let handle = tokio::spawn(async move {
            let end = task_shared
                .supervisor
                .run(process, stdout, &mut processor, &task_cancel)
                .await;
            // Also stops the reporter.
            task_cancel.cancel();
            drop(processor);
            info!(stream = %task_stream, reason = %end, "session ended");
            task_shared.finish(generation);
        });

        shared.state.send_replace(ProcessingState::Running {
            stream: stream.to_owned(),
            since: Instant::now(),
        });
        *active = Some(ActiveSession {
            generation,
            cancel,
            buffered,
            handle: Some(handle),
        });
        info!(stream, generation, "pipeline started");
        Ok(())
    }

    /// Stop the running session. Safe to call at any time.
    ///
    /// The chunk being processed, if any, is finished; nothing further is
    /// read. The decoder is killed and reaped in the background.
    pub fn stop(&self) {
        drop(self.stop_session());
    }

    /// [`stop`](Self::stop), then wait for the decoder to be reaped.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.stop_session() {
            if let Err(e) = handle.await {
                warn!(error = %e, "session task failed");
            }
        }
    }

    fn stop_session(&self) -> Option<JoinHandle<()>> {
        let mut active = self.shared.active();
        let Some(mut session) = active.take() else {
            debug!("stop requested while idle");
            return None;
        };
        session.cancel.cancel();
        self.shared.state.send_replace(ProcessingState::Idle);
        info!(generation = session.generation, "pipeline stopped");
        session.handle.take()
    }

    /// Resolve once the pipeline is idle.
    pub async fn wait(&self) {
        let mut rx = self.shared.state.subscribe();
        // The sender lives in `shared`, which `self` keeps alive.
        let _ = rx.wait_for(ProcessingState::is_idle).await;
    }

    pub fn state(&self) -> ProcessingState {
        self.shared.state.borrow().clone()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<ProcessingState> {
        self.shared.state.subscribe()
    }

    pub fn status(&self) -> PipelineStatus {
        let shared = &self.shared;
        let active = shared.active();
        let state = shared.state.borrow().clone();
        let stream = match &state {
            ProcessingState::Running { stream, .. } => Some(stream.clone()),
            _ => None,
        };

        PipelineStatus {
            is_processing: !state.is_idle(),
            buffered_bytes: active
                .as_ref()
                .map_or(0, |s| s.buffered.load(Ordering::Relaxed)),
            expected_frame_size: shared.spec.frame_byte_size(),
            frames_processed: shared.counter.total(),
            outstanding_publishes: shared.metrics.outstanding(),
            publish_failures: shared.metrics.failed(),
            dropped_publishes: shared.metrics.dropped(),
            stream,
        }
    }

    pub fn frame_spec(&self) -> FrameSpec {
        self.shared.spec
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MAX_FRAME_BYTES;
    use crate::transport::ChannelTransport;

    fn transport() -> Arc<dyn Transport> {
        Arc::new(ChannelTransport::default())
    }

    #[test]
    fn default_config_is_valid() {
        let (spec, brightness) = PipelineConfig::default().validate().unwrap();
        assert_eq!(spec.frame_byte_size(), 128 * 64 * 4);
        assert!(brightness.is_identity());
    }

    #[test]
    fn misconfiguration_fails_fast() {
        let cases = [
            (
                PipelineConfig {
                    width: 0,
                    ..Default::default()
                },
                ConfigError::ZeroDimension {
                    width: 0,
                    height: 64,
                },
            ),
            (
                PipelineConfig {
                    width: 4096,
                    height: 4096,
                    ..Default::default()
                },
                ConfigError::FrameTooLarge {
                    width: 4096,
                    height: 4096,
                    limit: MAX_FRAME_BYTES,
                },
            ),
            (
                PipelineConfig {
                    brightness: 101,
                    ..Default::default()
                },
                ConfigError::BrightnessOutOfRange(101),
            ),
            (
                PipelineConfig {
                    stats_interval: Duration::ZERO,
                    ..Default::default()
                },
                ConfigError::ZeroStatsInterval,
            ),
            (
                PipelineConfig {
                    publish: PublishConfig {
                        publish_timeout: Duration::ZERO,
                        ..Default::default()
                    },
                    ..Default::default()
                },
                ConfigError::ZeroPublishTimeout,
            ),
        ];
        for (config, expected) in cases {
            assert_eq!(config.validate().unwrap_err(), expected);
            assert!(matches!(
                Pipeline::new(config, transport()),
                Err(PixcastError::Config(e)) if e == expected
            ));
        }
    }

    #[tokio::test]
    async fn idle_status_and_stop() {
        let pipeline = Pipeline::new(PipelineConfig::default(), transport()).unwrap();
        pipeline.stop();
        pipeline.stop();

        let status = pipeline.status();
        assert!(!status.is_processing);
        assert_eq!(status.buffered_bytes, 0);
        assert_eq!(status.expected_frame_size, 128 * 64 * 4);
        assert_eq!(status.stream, None);
        assert_eq!(pipeline.state(), ProcessingState::Idle);
        pipeline.wait().await;
    }

    #[test]
    fn pipelines_do_not_share_state() {
        let a = Pipeline::new(PipelineConfig::default(), transport()).unwrap();
        let b = Pipeline::new(
            PipelineConfig {
                width: 4,
                height: 4,
                ..Default::default()
            },
            transport(),
        )
        .unwrap();

        a.shared.counter.record_frame();
        assert_eq!(a.status().frames_processed, 1);
        assert_eq!(b.status().frames_processed, 0);
        assert_eq!(b.status().expected_frame_size, 64);
        assert_eq!(b.frame_spec(), FrameSpec::new(4, 4).unwrap());
    }

    #[tokio::test]
    async fn failed_launch_returns_to_idle() {
        let config = PipelineConfig {
            decoder: DecoderConfig {
                program: "/nonexistent/pixcast-decoder".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let pipeline = Pipeline::new(config, transport()).unwrap();

        let err = pipeline.start("scene").unwrap_err();
        assert!(matches!(err, PixcastError::Spawn { .. }));
        assert_eq!(pipeline.state(), ProcessingState::Idle);
        assert!(!pipeline.status().is_processing);
    }
}
