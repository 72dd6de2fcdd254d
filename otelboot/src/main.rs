//! Standalone OpenTelemetry pipeline runner.

use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use opentelemetry::global as otel_global;
use opentelemetry::trace::Tracer;
use tracing::{info, warn};

use otelboot::{FileConfig, OtelLogLayer, init, logging};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Bring up an OTLP telemetry pipeline and emit a heartbeat through it.
#[derive(Parser, Debug)]
#[command(name = "otelboot")]
#[command(about = "Bootstrap an OpenTelemetry pipeline and emit heartbeats")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// OTLP endpoint (overrides config).
    #[arg(long)]
    endpoint: Option<String>,

    /// Service name (overrides config).
    #[arg(long)]
    service_name: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Seconds between heartbeats.
    #[arg(long, default_value_t = 10)]
    interval_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut file = if let Some(config_path) = &args.config {
        FileConfig::load_from_file(config_path)
            .with_context(|| format!("loading {}", config_path))?
    } else {
        FileConfig::default()
    };

    // Apply CLI overrides
    if let Some(endpoint) = args.endpoint {
        file.telemetry.endpoint = endpoint;
    }
    if let Some(service_name) = args.service_name {
        file.telemetry.service_name = service_name;
    }
    if let Some(level) = args.log_level {
        file.logging.level = level;
    }

    let config = file.to_config()?;
    let mut telemetry = init(Some(&config)).await?;

    logging::init_tracing(&file.logging, OtelLogLayer::from_global())?;

    info!(
        endpoint = %config.endpoint(),
        transport = %config.transport(),
        service_name = %config.service_name(),
        noop = telemetry.is_noop(),
        "Telemetry pipeline running"
    );

    let tracer = otel_global::tracer("otelboot");
    let heartbeats = otel_global::meter("otelboot")
        .u64_counter("otelboot.heartbeats")
        .with_description("Heartbeats emitted by the runner")
        .build();

    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval_secs.max(1)));
    let mut beat: u64 = 0;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                beat += 1;
                tracer.in_span("heartbeat", |_cx| {
                    heartbeats.add(1, &[]);
                    info!(beat, "heartbeat");
                });
            }
            _ = &mut shutdown => break,
        }
    }

    if let Err(e) = telemetry.shutdown_with_timeout(SHUTDOWN_TIMEOUT).await {
        warn!(error = %e, "Telemetry shutdown incomplete");
    }

    info!(beats = beat, "Runner stopped");
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

async fn terminate() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        std::future::pending::<()>().await;
    }
}
