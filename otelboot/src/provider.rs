//! Per-channel providers and the factory the orchestrator builds them through.

use opentelemetry::global as otel_global;
use opentelemetry_otlp::{LogExporter, MetricExporter, SpanExporter};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::exporter::{Channel, exporter_for};
use crate::global;

/// A constructed provider the orchestrator can register and shut down.
///
/// Clones must share state: shutting down one clone shuts down all of them.
pub trait ManagedProvider: Clone + Send + Sync + 'static {
    /// Flush and stop the provider.
    fn shutdown(&self) -> OTelSdkResult;

    /// Install this provider as the process-wide default for its channel.
    fn install_global(&self);
}

impl ManagedProvider for SdkTracerProvider {
    fn shutdown(&self) -> OTelSdkResult {
        SdkTracerProvider::shutdown(self)
    }

    fn install_global(&self) {
        otel_global::set_tracer_provider(self.clone());
        global::mark_registered(Channel::Traces);
    }
}

impl ManagedProvider for SdkMeterProvider {
    fn shutdown(&self) -> OTelSdkResult {
        SdkMeterProvider::shutdown(self)
    }

    fn install_global(&self) {
        otel_global::set_meter_provider(self.clone());
        global::mark_registered(Channel::Metrics);
    }
}

impl ManagedProvider for SdkLoggerProvider {
    fn shutdown(&self) -> OTelSdkResult {
        SdkLoggerProvider::shutdown(self)
    }

    fn install_global(&self) {
        global::set_logger_provider(self.clone());
    }
}

/// Builds the provider for each channel.
///
/// The orchestrator only decides order, gating and cleanup; everything
/// about how a provider is made lives behind this trait.
pub trait ProviderFactory {
    type Tracer: ManagedProvider;
    type Meter: ManagedProvider;
    type Logger: ManagedProvider;

    fn tracer_provider(&self, config: &Config, resource: &Resource) -> Result<Self::Tracer>;

    fn meter_provider(&self, config: &Config, resource: &Resource) -> Result<Self::Meter>;

    fn logger_provider(&self, config: &Config, resource: &Resource) -> Result<Self::Logger>;
}

/// SDK providers exporting over OTLP.
#[derive(Debug, Clone, Copy, Default)]
pub struct OtlpProviderFactory;

impl ProviderFactory for OtlpProviderFactory {
    type Tracer = SdkTracerProvider;
    type Meter = SdkMeterProvider;
    type Logger = SdkLoggerProvider;

    fn tracer_provider(&self, config: &Config, resource: &Resource) -> Result<SdkTracerProvider> {
        let exporter = exporter_for::<SpanExporter>(config)?;

        let provider = SdkTracerProvider::builder()
            .with_resource(resource.clone())
            .with_batch_exporter(exporter)
            .build();

        info!("Tracer provider initialized");
        Ok(provider)
    }

    fn meter_provider(&self, config: &Config, resource: &Resource) -> Result<SdkMeterProvider> {
        let exporter = exporter_for::<MetricExporter>(config)?;

        let reader = PeriodicReader::builder(exporter)
            .with_interval(config.metric_export_interval())
            .build();

        let provider = SdkMeterProvider::builder()
            .with_resource(resource.clone())
            .with_reader(reader)
            .build();

        info!(
            interval = ?config.metric_export_interval(),
            "Meter provider initialized"
        );
        Ok(provider)
    }

    fn logger_provider(&self, config: &Config, resource: &Resource) -> Result<SdkLoggerProvider> {
        let exporter = exporter_for::<LogExporter>(config)?;

        let provider = SdkLoggerProvider::builder()
            .with_resource(resource.clone())
            .with_batch_exporter(exporter)
            .build();

        info!("Logger provider initialized");
        Ok(provider)
    }
}
