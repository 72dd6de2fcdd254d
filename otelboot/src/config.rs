//! Configuration for the telemetry pipeline.
//!
//! [`Config`] is immutable once built. It is assembled either through the
//! chainable [`ConfigBuilder`] or from a JSON5 file via [`FileConfig`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use opentelemetry::{Key, KeyValue, Value};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::logging::LoggingConfig;

/// Default OTLP endpoint (gRPC port on the local agent).
pub const DEFAULT_ENDPOINT: &str = "localhost:4317";

/// Service name used when none is configured.
pub const DEFAULT_SERVICE_NAME: &str = "example-service";

/// Resource key reserved for the service name.
pub const SERVICE_NAME_KEY: &str = "service.name";

const DEFAULT_EXPORT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_METRIC_EXPORT_INTERVAL_SECS: u64 = 60;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Telemetry configuration is required")]
    Missing,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// OTLP transport selection, shared by all channels of one pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// gRPC via tonic (port 4317).
    #[default]
    Grpc,
    /// HTTP/protobuf (port 4318).
    Http,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grpc => "grpc",
            Self::Http => "http",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated pipeline configuration.
#[derive(Debug, Clone)]
pub struct Config {
    endpoint: String,
    transport: Transport,
    insecure: bool,
    headers: HashMap<String, String>,
    service_name: String,
    resource_attributes: Vec<KeyValue>,
    disable_traces: bool,
    disable_metrics: bool,
    disable_logs: bool,
    export_timeout: Duration,
    metric_export_interval: Duration,
    install_globals: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            transport: Transport::default(),
            insecure: true,
            headers: HashMap::new(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            resource_attributes: vec![KeyValue::new("library.language", "rust")],
            disable_traces: false,
            disable_metrics: false,
            disable_logs: false,
            export_timeout: Duration::from_secs(DEFAULT_EXPORT_TIMEOUT_SECS),
            metric_export_interval: Duration::from_secs(DEFAULT_METRIC_EXPORT_INTERVAL_SECS),
            install_globals: true,
        }
    }
}

impl Config {
    /// Start building a configuration from the defaults.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn insecure(&self) -> bool {
        self.insecure
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Extra resource attributes, in insertion order. Never contains `service.name`.
    pub fn resource_attributes(&self) -> &[KeyValue] {
        &self.resource_attributes
    }

    pub fn traces_disabled(&self) -> bool {
        self.disable_traces
    }

    pub fn metrics_disabled(&self) -> bool {
        self.disable_metrics
    }

    pub fn logs_disabled(&self) -> bool {
        self.disable_logs
    }

    /// True when every channel is switched off.
    pub fn all_disabled(&self) -> bool {
        self.disable_traces && self.disable_metrics && self.disable_logs
    }

    pub fn export_timeout(&self) -> Duration {
        self.export_timeout
    }

    pub fn metric_export_interval(&self) -> Duration {
        self.metric_export_interval
    }

    /// Whether successful providers are installed as the process-wide defaults.
    pub fn install_globals(&self) -> bool {
        self.install_globals
    }
}

/// Chainable builder for [`Config`]. Validation happens once, in [`build`](Self::build).
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    pub fn transport(mut self, transport: Transport) -> Self {
        self.config.transport = transport;
        self
    }

    /// Shorthand for choosing HTTP over gRPC.
    pub fn use_http(self, use_http: bool) -> Self {
        self.transport(if use_http {
            Transport::Http
        } else {
            Transport::Grpc
        })
    }

    pub fn insecure(mut self, insecure: bool) -> Self {
        self.config.insecure = insecure;
        self
    }

    pub fn disable_traces(mut self, disable: bool) -> Self {
        self.config.disable_traces = disable;
        self
    }

    pub fn disable_metrics(mut self, disable: bool) -> Self {
        self.config.disable_metrics = disable;
        self
    }

    pub fn disable_logs(mut self, disable: bool) -> Self {
        self.config.disable_logs = disable;
        self
    }

    /// Set the `authorization` header sent with every export request.
    pub fn authorization(self, value: impl Into<String>) -> Self {
        self.header("authorization", value)
    }

    /// Set an arbitrary export header. A repeated key replaces the earlier value.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(key.into(), value.into());
        self
    }

    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.config.service_name = name.into();
        self
    }

    /// Add a resource attribute.
    ///
    /// Only string, integer and float values are accepted; anything else is
    /// dropped with a warning. A string `service.name` is treated as
    /// [`service_name`](Self::service_name).
    pub fn resource_attribute(mut self, key: impl Into<Key>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();

        if key.as_str() == SERVICE_NAME_KEY {
            if let Value::String(name) = &value {
                self.config.service_name = name.as_str().to_string();
            } else {
                warn!(value = %value, "service.name must be a string; dropping");
            }
            return self;
        }

        match value {
            Value::String(_) | Value::I64(_) | Value::F64(_) => {
                self.config.resource_attributes.push(KeyValue::new(key, value));
            }
            other => {
                warn!(
                    key = key.as_str(),
                    value = %other,
                    "Resource attributes must be string, int or float; dropping"
                );
            }
        }
        self
    }

    pub fn export_timeout(mut self, timeout: Duration) -> Self {
        self.config.export_timeout = timeout;
        self
    }

    pub fn metric_export_interval(mut self, interval: Duration) -> Self {
        self.config.metric_export_interval = interval;
        self
    }

    pub fn install_globals(mut self, install: bool) -> Self {
        self.config.install_globals = install;
        self
    }

    /// Validate and freeze the configuration.
    pub fn build(self) -> Result<Config, ConfigError> {
        let config = self.config;

        if config.endpoint.trim().is_empty() {
            return Err(ConfigError::Validation(
                "OTLP endpoint cannot be empty".to_string(),
            ));
        }

        if config.export_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "export timeout must be > 0".to_string(),
            ));
        }

        if config.metric_export_interval.is_zero() {
            return Err(ConfigError::Validation(
                "metric export interval must be > 0".to_string(),
            ));
        }

        if let Some(key) = config.headers.keys().find(|k| k.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "header name cannot be empty (got {:?})",
                key
            )));
        }

        Ok(config)
    }
}

/// On-disk configuration (JSON5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    /// Pipeline settings.
    #[serde(default)]
    pub telemetry: TelemetrySection,

    /// Local logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The `telemetry` section of a [`FileConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySection {
    /// OTLP endpoint, with or without scheme.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Transport: "grpc" or "http".
    #[serde(default)]
    pub transport: Transport,

    /// Plaintext transport (no TLS).
    #[serde(default = "default_true")]
    pub insecure: bool,

    /// Headers to include in OTLP requests.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Value for the `authorization` header.
    #[serde(default)]
    pub authorization: Option<String>,

    /// Service name for the OTEL resource.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Extra resource attributes (string, int or float values).
    #[serde(default)]
    pub resource: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub disable_traces: bool,

    #[serde(default)]
    pub disable_metrics: bool,

    #[serde(default)]
    pub disable_logs: bool,

    /// Export timeout in seconds.
    #[serde(default = "default_export_timeout")]
    pub export_timeout_secs: u64,

    /// Metric export interval in seconds.
    #[serde(default = "default_metric_export_interval")]
    pub metric_export_interval_secs: u64,

    /// Install providers as process-wide defaults.
    #[serde(default = "default_true")]
    pub install_globals: bool,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

fn default_export_timeout() -> u64 {
    DEFAULT_EXPORT_TIMEOUT_SECS
}

fn default_metric_export_interval() -> u64 {
    DEFAULT_METRIC_EXPORT_INTERVAL_SECS
}

fn default_true() -> bool {
    true
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            transport: Transport::default(),
            insecure: true,
            headers: HashMap::new(),
            authorization: None,
            service_name: default_service_name(),
            resource: BTreeMap::new(),
            disable_traces: false,
            disable_metrics: false,
            disable_logs: false,
            export_timeout_secs: default_export_timeout(),
            metric_export_interval_secs: default_metric_export_interval(),
            install_globals: true,
        }
    }
}

impl TelemetrySection {
    /// Convert into a builder, applying every setting in the section.
    pub fn to_builder(&self) -> ConfigBuilder {
        let mut builder = Config::builder()
            .endpoint(&self.endpoint)
            .transport(self.transport)
            .insecure(self.insecure)
            .service_name(&self.service_name)
            .disable_traces(self.disable_traces)
            .disable_metrics(self.disable_metrics)
            .disable_logs(self.disable_logs)
            .export_timeout(Duration::from_secs(self.export_timeout_secs))
            .metric_export_interval(Duration::from_secs(self.metric_export_interval_secs))
            .install_globals(self.install_globals);

        for (key, value) in &self.headers {
            builder = builder.header(key, value);
        }

        if let Some(auth) = &self.authorization {
            builder = builder.authorization(auth);
        }

        for (key, value) in &self.resource {
            builder = match json_to_attribute_value(value) {
                Some(value) => builder.resource_attribute(key.clone(), value),
                None => {
                    warn!(key = %key, "Unsupported resource attribute value; dropping");
                    builder
                }
            };
        }

        builder
    }
}

/// Map a JSON value onto an attribute value. Booleans are passed through so
/// that the builder's type check reports them.
pub(crate) fn json_to_attribute_value(value: &serde_json::Value) -> Option<Value> {
    match value {
        serde_json::Value::String(s) => Some(Value::from(s.clone())),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Value::I64)
            .or_else(|| n.as_f64().map(Value::F64)),
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        _ => None,
    }
}

impl FileConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.to_config().map(|_| ())
    }

    /// Build the pipeline [`Config`] described by this file.
    pub fn to_config(&self) -> Result<Config, ConfigError> {
        self.telemetry.to_builder().build()
    }
}
