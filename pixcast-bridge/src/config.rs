//! Configuration for the bridge service.

use std::path::Path;
use std::time::Duration;

use pixcast_core::{
    DecoderConfig, DisplayMode, MqttTransportConfig, PipelineConfig, PublishConfig,
    TcpTransportConfig,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Frame geometry and output.
    pub display: DisplayConfig,
    /// External decoder.
    pub decoder: DecoderSection,
    /// Broker connection and publish queues.
    pub transport: TransportConfig,
    /// Throughput reporting.
    pub stats: StatsConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Frame geometry and output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// "single" or "dual".
    pub mode: DisplayMode,
    /// Brightness percentage, 0..=100.
    pub brightness: u32,
    /// Frames per second requested from the decoder.
    pub fps: u32,
}

/// Decoder process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderSection {
    /// Executable to run.
    pub program: String,
    /// Arguments; `{input}`, `{width}`, `{height}` and `{fps}` are filled in.
    pub args: Vec<String>,
    /// Input reference; `{stream}` is replaced with the stream name.
    pub input_template: String,
    /// Stream used when `--stream` is not given.
    pub stream: String,
}

/// Which broker protocol to speak.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// MQTT 3.1.1, QoS 1.
    #[default]
    Mqtt,
    /// Length-prefixed publish frames over plain TCP.
    Tcp,
}

/// Broker connection and publish queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// "mqtt" or "tcp".
    pub kind: TransportKind,
    /// Broker address, `host:port`.
    pub broker: String,
    /// MQTT client identifier.
    pub client_id: String,
    /// Topic prefix; the display id is appended.
    pub topic_prefix: String,
    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// MQTT keep-alive in seconds.
    pub keep_alive_secs: u64,
    /// Pause between MQTT reconnect attempts, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Whole frames queued before the oldest is dropped (0 = no limit).
    pub max_queued_frames: usize,
    /// Upper bound on one publish call, in milliseconds.
    pub publish_timeout_ms: u64,
}

/// Throughput reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Seconds between throughput log lines.
    pub interval_secs: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for DisplayConfig {
    fn default() -> Self {
        let pipeline = PipelineConfig::default();
        Self {
            width: pipeline.width,
            height: pipeline.height,
            mode: pipeline.mode,
            brightness: pipeline.brightness,
            fps: pipeline.decoder.fps,
        }
    }
}

impl Default for DecoderSection {
    fn default() -> Self {
        let decoder = DecoderConfig::default();
        Self {
            program: decoder.program,
            args: decoder.args,
            input_template: decoder.input_template,
            stream: "pixcast".into(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        let mqtt = MqttTransportConfig::default();
        let tcp = TcpTransportConfig::default();
        let publish = PublishConfig::default();
        Self {
            kind: TransportKind::default(),
            broker: mqtt.broker,
            client_id: mqtt.client_id,
            topic_prefix: mqtt.topic_prefix,
            connect_timeout_ms: tcp.connect_timeout.as_millis() as u64,
            keep_alive_secs: mqtt.keep_alive.as_secs(),
            reconnect_delay_ms: mqtt.reconnect_delay.as_millis() as u64,
            max_queued_frames: publish.max_queued_frames,
            publish_timeout_ms: publish.publish_timeout.as_millis() as u64,
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self { interval_secs: 5 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

/// Failure to read or parse a configuration file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Where a loaded configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    File,
    /// The file did not exist.
    Defaults,
}

impl BridgeConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the defaults. A file that exists but does not
    /// parse is an error. Runs before logging is set up, so the caller
    /// reports the source.
    pub fn load(path: &Path) -> Result<(Self, ConfigSource), LoadError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok((Self::default(), ConfigSource::Defaults));
            }
            Err(source) => {
                return Err(LoadError::Read {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        let config = toml::from_str(&contents).map_err(|source| LoadError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Ok((config, ConfigSource::File))
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Pipeline settings. Validation happens in `Pipeline::new`.
    pub fn to_pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            width: self.display.width,
            height: self.display.height,
            mode: self.display.mode,
            brightness: self.display.brightness,
            decoder: DecoderConfig {
                program: self.decoder.program.clone(),
                args: self.decoder.args.clone(),
                input_template: self.decoder.input_template.clone(),
                fps: self.display.fps,
            },
            publish: PublishConfig {
                max_queued_frames: self.transport.max_queued_frames,
                publish_timeout: Duration::from_millis(self.transport.publish_timeout_ms),
            },
            stats_interval: Duration::from_secs(self.stats.interval_secs),
        }
    }

    /// Settings for the MQTT transport.
    pub fn mqtt_config(&self) -> MqttTransportConfig {
        MqttTransportConfig {
            broker: self.transport.broker.clone(),
            client_id: self.transport.client_id.clone(),
            topic_prefix: self.transport.topic_prefix.clone(),
            keep_alive: Duration::from_secs(self.transport.keep_alive_secs),
            reconnect_delay: Duration::from_millis(self.transport.reconnect_delay_ms),
            ..Default::default()
        }
    }

    /// Settings for the plain TCP transport.
    pub fn tcp_config(&self) -> TcpTransportConfig {
        TcpTransportConfig {
            broker: self.transport.broker.clone(),
            topic_prefix: self.transport.topic_prefix.clone(),
            connect_timeout: Duration::from_millis(self.transport.connect_timeout_ms),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
