//! OpenTelemetry pipeline bootstrap for Rust services.
//!
//! This crate brings up trace, metric and log providers exporting over OTLP
//! (gRPC or HTTP), registers them as the process-wide defaults, and forwards
//! `tracing` events into the OpenTelemetry log model.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐     ┌──────────────┐     ┌──────────────┐     ┌─────────────┐
//! │  Config  │────>│ Orchestrator │────>│  Providers   │────>│  Collector  │
//! │          │     │ (init/       │     │ traces/logs/ │     │  (OTLP)     │
//! └──────────┘     │  shutdown)   │     │ metrics      │     └─────────────┘
//!                  └──────────────┘     └──────────────┘
//!                                              ^
//! tracing event ──> OtelLogLayer ──> LogBridge ┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use otelboot::{Config, OtelLogLayer, init, logging};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .endpoint("http://collector:4318")
//!     .use_http(true)
//!     .service_name("checkout")
//!     .build()?;
//!
//! let mut telemetry = init(Some(&config)).await?;
//! logging::init_tracing(&Default::default(), OtelLogLayer::from_global())?;
//!
//! tracing::info!(order_id = 42, "order placed");
//!
//! telemetry.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod exporter;
pub mod global;
pub mod logging;
pub mod provider;
pub mod resource;
pub mod settings;
pub mod telemetry;

pub use bridge::{LogBridge, LogEvent, OtelLogLayer, SourceLevel};
pub use config::{Config, ConfigBuilder, ConfigError, FileConfig, Transport};
pub use error::{AggregatedShutdownError, Result, ShutdownError, TelemetryError};
pub use exporter::{Channel, build_exporter};
pub use provider::{ManagedProvider, OtlpProviderFactory, ProviderFactory};
pub use settings::ResolvedSettings;
pub use telemetry::{Telemetry, init, init_with};
