//! OTLP exporter factory, keyed by (channel, transport).
//!
//! Every exporter gets gzip compression, the configured headers and the
//! configured timeout. HTTP exporters target `<endpoint>/v1/<channel>`;
//! gRPC exporters target the bare endpoint and carry headers as metadata.

use std::collections::HashMap;
use std::fmt;

use opentelemetry_otlp::{
    Compression, ExporterBuildError, LogExporter, MetricExporter, Protocol, SpanExporter,
    WithExportConfig, WithHttpConfig, WithTonicConfig,
};
use tonic::metadata::{Ascii, MetadataKey, MetadataMap, MetadataValue};
use tonic::transport::ClientTlsConfig;
use tracing::debug;

use crate::config::{Config, Transport};
use crate::error::{Result, TelemetryError};

/// A telemetry signal with its own exporter/provider pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Traces,
    Metrics,
    Logs,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Traces, Channel::Metrics, Channel::Logs];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Traces => "traces",
            Self::Metrics => "metrics",
            Self::Logs => "logs",
        }
    }

    /// Fixed OTLP/HTTP path for this channel.
    pub fn http_path(&self) -> &'static str {
        match self {
            Self::Traces => "/v1/traces",
            Self::Metrics => "/v1/metrics",
            Self::Logs => "/v1/logs",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An exporter bound to one channel.
pub enum Exporter {
    Span(SpanExporter),
    Metric(MetricExporter),
    Log(LogExporter),
}

impl Exporter {
    pub fn channel(&self) -> Channel {
        match self {
            Self::Span(_) => Channel::Traces,
            Self::Metric(_) => Channel::Metrics,
            Self::Log(_) => Channel::Logs,
        }
    }
}

impl fmt::Debug for Exporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Exporter").field(&self.channel()).finish()
    }
}

/// Build a fresh exporter for `channel` using the configured transport.
pub fn build_exporter(config: &Config, channel: Channel) -> Result<Exporter> {
    match channel {
        Channel::Traces => exporter_for::<SpanExporter>(config).map(Exporter::Span),
        Channel::Metrics => exporter_for::<MetricExporter>(config).map(Exporter::Metric),
        Channel::Logs => exporter_for::<LogExporter>(config).map(Exporter::Log),
    }
}

/// Build a typed exporter; failures are tagged with channel and transport.
pub fn exporter_for<E: ChannelExporter>(config: &Config) -> Result<E> {
    let transport = config.transport();
    let endpoint = resolve_endpoint(config.endpoint(), config.insecure());

    match transport {
        Transport::Http => {
            let url = http_url(&endpoint, E::CHANNEL);
            debug!(channel = %E::CHANNEL, url = %url, "Building HTTP exporter");
            E::build_http(config, &url).map_err(|e| TelemetryError::exporter(E::CHANNEL, transport, e))
        }
        Transport::Grpc => {
            debug!(channel = %E::CHANNEL, endpoint = %endpoint, "Building gRPC exporter");
            let metadata = grpc_metadata(config.headers())
                .map_err(|e| TelemetryError::exporter(E::CHANNEL, transport, e))?;
            E::build_grpc(config, &endpoint, metadata)
                .map_err(|e| TelemetryError::exporter(E::CHANNEL, transport, e))
        }
    }
}

/// An OTLP exporter type that can be built over either transport.
pub trait ChannelExporter: Sized {
    const CHANNEL: Channel;

    fn build_http(config: &Config, url: &str) -> std::result::Result<Self, ExporterBuildError>;

    fn build_grpc(
        config: &Config,
        endpoint: &str,
        metadata: MetadataMap,
    ) -> std::result::Result<Self, ExporterBuildError>;
}

impl ChannelExporter for SpanExporter {
    const CHANNEL: Channel = Channel::Traces;

    fn build_http(config: &Config, url: &str) -> std::result::Result<Self, ExporterBuildError> {
        http_options(SpanExporter::builder().with_http(), config, url).build()
    }

    fn build_grpc(
        config: &Config,
        endpoint: &str,
        metadata: MetadataMap,
    ) -> std::result::Result<Self, ExporterBuildError> {
        tonic_options(SpanExporter::builder().with_tonic(), config, endpoint, metadata).build()
    }
}

impl ChannelExporter for MetricExporter {
    const CHANNEL: Channel = Channel::Metrics;

    fn build_http(config: &Config, url: &str) -> std::result::Result<Self, ExporterBuildError> {
        http_options(MetricExporter::builder().with_http(), config, url).build()
    }

    fn build_grpc(
        config: &Config,
        endpoint: &str,
        metadata: MetadataMap,
    ) -> std::result::Result<Self, ExporterBuildError> {
        tonic_options(MetricExporter::builder().with_tonic(), config, endpoint, metadata).build()
    }
}

impl ChannelExporter for LogExporter {
    const CHANNEL: Channel = Channel::Logs;

    fn build_http(config: &Config, url: &str) -> std::result::Result<Self, ExporterBuildError> {
        http_options(LogExporter::builder().with_http(), config, url).build()
    }

    fn build_grpc(
        config: &Config,
        endpoint: &str,
        metadata: MetadataMap,
    ) -> std::result::Result<Self, ExporterBuildError> {
        tonic_options(LogExporter::builder().with_tonic(), config, endpoint, metadata).build()
    }
}

fn http_options<B>(builder: B, config: &Config, url: &str) -> B
where
    B: WithExportConfig + WithHttpConfig,
{
    let builder = builder
        .with_endpoint(url)
        .with_protocol(Protocol::HttpBinary)
        .with_timeout(config.export_timeout())
        .with_compression(Compression::Gzip);

    if config.headers().is_empty() {
        builder
    } else {
        builder.with_headers(config.headers().clone())
    }
}

fn tonic_options<B>(builder: B, config: &Config, endpoint: &str, metadata: MetadataMap) -> B
where
    B: WithExportConfig + WithTonicConfig,
{
    let mut builder = builder
        .with_endpoint(endpoint)
        .with_protocol(Protocol::Grpc)
        .with_timeout(config.export_timeout())
        .with_compression(Compression::Gzip);

    if !metadata.is_empty() {
        builder = builder.with_metadata(metadata);
    }

    // Plaintext unless the resolved endpoint asks for TLS.
    if endpoint.starts_with("https://") {
        builder = builder.with_tls_config(ClientTlsConfig::new().with_native_roots());
    }

    builder
}

/// Normalize the scheme of an endpoint.
///
/// Scheme-less endpoints get `http://` when insecure and `https://`
/// otherwise. Insecure mode also downgrades an explicit `https://`.
pub fn resolve_endpoint(endpoint: &str, insecure: bool) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');

    match endpoint.split_once("://") {
        Some(("https", rest)) if insecure => format!("http://{}", rest),
        Some(_) => endpoint.to_string(),
        None if insecure => format!("http://{}", endpoint),
        None => format!("https://{}", endpoint),
    }
}

/// Append the channel's OTLP/HTTP path unless the endpoint already has it.
pub fn http_url(endpoint: &str, channel: Channel) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    let path = channel.http_path();

    if endpoint.ends_with(path) {
        endpoint.to_string()
    } else {
        format!("{}{}", endpoint, path)
    }
}

/// Convert export headers into gRPC metadata (keys are lowercased).
fn grpc_metadata(
    headers: &HashMap<String, String>,
) -> std::result::Result<MetadataMap, Box<dyn std::error::Error + Send + Sync>> {
    let mut metadata = MetadataMap::with_capacity(headers.len());

    for (key, value) in headers {
        let key: MetadataKey<Ascii> = MetadataKey::from_bytes(key.to_ascii_lowercase().as_bytes())?;
        let value: MetadataValue<Ascii> = MetadataValue::try_from(value.as_str())?;
        metadata.insert(key, value);
    }

    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_config() -> Config {
        Config::builder()
            .endpoint("http://collector:4318")
            .transport(Transport::Http)
            .build()
            .unwrap()
    }

    #[test]
    fn test_channel_names_and_paths() {
        assert_eq!(Channel::Traces.as_str(), "traces");
        assert_eq!(Channel::Metrics.http_path(), "/v1/metrics");
        assert_eq!(Channel::Logs.http_path(), "/v1/logs");
        assert_eq!(Channel::ALL.len(), 3);
    }

    #[test]
    fn test_resolve_endpoint() {
        assert_eq!(
            resolve_endpoint("localhost:4317", true),
            "http://localhost:4317"
        );
        assert_eq!(
            resolve_endpoint("otel.example.com:4317", false),
            "https://otel.example.com:4317"
        );
        assert_eq!(
            resolve_endpoint("https://otel.example.com/", true),
            "http://otel.example.com"
        );
        assert_eq!(
            resolve_endpoint("http://collector:4318", false),
            "http://collector:4318"
        );
    }

    #[test]
    fn test_http_url() {
        assert_eq!(
            http_url("http://collector:4318", Channel::Traces),
            "http://collector:4318/v1/traces"
        );
        assert_eq!(
            http_url("http://collector:4318/", Channel::Logs),
            "http://collector:4318/v1/logs"
        );
        assert_eq!(
            http_url("http://collector:4318/v1/metrics", Channel::Metrics),
            "http://collector:4318/v1/metrics"
        );
    }

    #[test]
    fn test_grpc_metadata() {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer abc".to_string());

        let metadata = grpc_metadata(&headers).unwrap();
        assert_eq!(
            metadata.get("authorization").and_then(|v| v.to_str().ok()),
            Some("Bearer abc")
        );
    }

    #[test]
    fn test_build_http_exporters() {
        let config = http_config();

        for channel in Channel::ALL {
            let exporter = build_exporter(&config, channel).unwrap();
            assert_eq!(exporter.channel(), channel);
        }
    }

    #[test]
    fn test_invalid_grpc_header_is_tagged() {
        let config = Config::builder()
            .transport(Transport::Grpc)
            .header("bad header", "value")
            .build()
            .unwrap();

        let err = build_exporter(&config, Channel::Logs).unwrap_err();
        match err {
            TelemetryError::ExporterSetup {
                channel, transport, ..
            } => {
                assert_eq!(channel, Channel::Logs);
                assert_eq!(transport, Transport::Grpc);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_build_grpc_exporters() {
        let config = Config::builder()
            .endpoint("localhost:4317")
            .header("x-tenant", "acme")
            .build()
            .unwrap();

        for channel in Channel::ALL {
            let exporter = build_exporter(&config, channel).unwrap();
            assert_eq!(exporter.channel(), channel);
        }
    }
}
