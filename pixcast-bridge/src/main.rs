//! pixcast bridge: entry point.
//!
//! ```text
//! pixcast-bridge                    Run with pixcast-bridge.toml (or defaults)
//! pixcast-bridge --config <path>    Load a custom config TOML
//! pixcast-bridge --stream <name>    Override the stream to pull
//! pixcast-bridge --broker <addr>    Override the broker address
//! pixcast-bridge --gen-config       Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pixcast_bridge::config::{BridgeConfig, ConfigSource, TransportKind};
use pixcast_core::{MqttTransport, Pipeline, TcpTransport, Transport};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "pixcast-bridge", about = "Stream-to-pixel-matrix bridge")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "pixcast-bridge.toml")]
    config: PathBuf,

    /// Stream to pull (overrides `decoder.stream`).
    #[arg(short, long)]
    stream: Option<String>,

    /// Broker address (overrides `transport.broker`).
    #[arg(short, long)]
    broker: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&BridgeConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let (mut config, source) = BridgeConfig::load(&cli.config)?;
    if let Some(broker) = cli.broker {
        config.transport.broker = broker;
    }
    let stream = cli.stream.unwrap_or_else(|| config.decoder.stream.clone());

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("pixcast-bridge v{}", env!("CARGO_PKG_VERSION"));
    if source == ConfigSource::Defaults {
        info!("no config at {}; using defaults", cli.config.display());
    }
    info!("broker: {} ({:?})", config.transport.broker, config.transport.kind);

    let transport: Arc<dyn Transport> = match config.transport.kind {
        TransportKind::Mqtt => Arc::new(MqttTransport::new(config.mqtt_config())?),
        TransportKind::Tcp => Arc::new(TcpTransport::new(config.tcp_config())),
    };
    let pipeline = Pipeline::new(config.to_pipeline_config(), transport)?;
    info!(
        "display: {} {:?}, brightness {}%",
        pipeline.frame_spec(),
        config.display.mode,
        config.display.brightness
    );
    pipeline.start(&stream)?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
            pipeline.shutdown().await;
        }
        _ = pipeline.wait() => {
            info!("stream {stream} ended");
        }
    }

    let status = pipeline.status();
    info!(
        frames = status.frames_processed,
        publish_failures = status.publish_failures,
        dropped_publishes = status.dropped_publishes,
        "bridge stopped"
    );
    Ok(())
}
