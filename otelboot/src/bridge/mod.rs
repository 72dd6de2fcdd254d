//! Bridge from an existing logging pipeline into OpenTelemetry log records.
//!
//! [`LogBridge::forward`] is the pipeline-agnostic entry point; it accepts a
//! captured [`LogEvent`] and emits one record. [`OtelLogLayer`] attaches the
//! bridge to a `tracing` subscriber. The bridge never reports back to the
//! caller: an event either becomes a record or is filtered out.

mod attributes;
mod layer;
mod severity;

use std::borrow::Cow;
use std::time::SystemTime;

use opentelemetry::logs::{AnyValue, LogRecord, Logger, LoggerProvider};
use opentelemetry::trace::TraceContextExt;
use opentelemetry::{Context, InstrumentationScope};
use serde_json::{Map, Value};

pub use attributes::{
    RecoveredAttribute, RecoveredValue, recover, recover_map, recover_payload,
};
pub use layer::OtelLogLayer;
pub use severity::{SeverityOrdinal, SourceLevel};

/// Instrumentation scope name of forwarded records.
pub const SCOPE_NAME: &str = "otelboot";

/// Attribute carrying the reported name of a level with no severity mapping.
pub const LEVEL_ATTRIBUTE: &str = "level";

/// Targets whose events are never forwarded: the export stack itself.
pub const SUPPRESSED_TARGETS: &[&str] = &[
    "opentelemetry",
    "opentelemetry_sdk",
    "opentelemetry_otlp",
    "opentelemetry-otlp",
    "opentelemetry-http",
    "hyper",
    "hyper_util",
    "h2",
    "tonic",
    "tower",
    "reqwest",
];

/// Fields attached to one log line.
#[derive(Debug, Clone)]
pub enum FieldPayload {
    /// Fields already split into key/value pairs.
    Structured(Map<String, Value>),
    /// A serialized JSON object.
    Raw(String),
}

impl FieldPayload {
    pub fn attributes(&self) -> Vec<RecoveredAttribute> {
        match self {
            Self::Structured(fields) => recover_map(fields),
            Self::Raw(raw) => recover_payload(raw),
        }
    }
}

impl Default for FieldPayload {
    fn default() -> Self {
        Self::Structured(Map::new())
    }
}

/// One captured log line.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub level: SourceLevel,
    pub target: Cow<'static, str>,
    pub message: String,
    pub fields: FieldPayload,
    /// Correlation context; its active span, if valid, is attached to the record.
    pub context: Context,
}

impl LogEvent {
    pub fn new(level: SourceLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            target: Cow::Borrowed(""),
            message: message.into(),
            fields: FieldPayload::default(),
            context: Context::new(),
        }
    }

    pub fn with_target(mut self, target: impl Into<Cow<'static, str>>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_fields(mut self, fields: FieldPayload) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }
}

/// Converts captured events into OpenTelemetry log records.
#[derive(Debug)]
pub struct LogBridge<L> {
    logger: L,
    min_level: SourceLevel,
    suppressed: Vec<Cow<'static, str>>,
}

impl<L: Logger> LogBridge<L> {
    /// Bridge into a logger obtained from `provider`.
    pub fn new<P>(provider: &P) -> Self
    where
        P: LoggerProvider<Logger = L>,
    {
        let scope = InstrumentationScope::builder(SCOPE_NAME)
            .with_version(env!("CARGO_PKG_VERSION"))
            .build();
        Self::with_logger(provider.logger_with_scope(scope))
    }

    pub fn with_logger(logger: L) -> Self {
        Self {
            logger,
            min_level: SourceLevel::Trace,
            suppressed: SUPPRESSED_TARGETS.iter().map(|t| Cow::Borrowed(*t)).collect(),
        }
    }

    /// Drop events less severe than `level`.
    pub fn with_min_level(mut self, level: SourceLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Never forward events whose target is `prefix` or one of its submodules.
    pub fn suppress_target(mut self, prefix: impl Into<Cow<'static, str>>) -> Self {
        self.suppressed.push(prefix.into());
        self
    }

    /// Whether an event at `level` from `target` would be forwarded.
    pub fn enabled(&self, level: &SourceLevel, target: &str) -> bool {
        if let (Some(rank), Some(min)) = (level.rank(), self.min_level.rank())
            && rank < min
        {
            return false;
        }

        !self.suppressed.iter().any(|prefix| is_under(target, prefix))
    }

    /// Emit `event` as a log record, unless it is filtered out.
    pub fn forward(&self, event: LogEvent) {
        if self.enabled(&event.level, &event.target) {
            self.emit(event);
        }
    }

    pub(crate) fn emit(&self, event: LogEvent) {
        let mut record = self.logger.create_log_record();

        let now = SystemTime::now();
        record.set_timestamp(now);
        record.set_observed_timestamp(now);

        if !event.target.is_empty() {
            record.set_target(event.target);
        }
        record.set_body(AnyValue::from(event.message));

        if let Some(severity) = event.level.ordinal().to_otel() {
            record.set_severity_number(severity);
        }
        if let Some(text) = event.level.as_str() {
            record.set_severity_text(text);
        } else if let SourceLevel::Unrecognized(name) = event.level
            && !name.is_empty()
        {
            record.add_attribute(LEVEL_ATTRIBUTE, AnyValue::from(name.into_owned()));
        }

        for attr in event.fields.attributes() {
            record.add_attribute(attr.key, AnyValue::from(attr.value));
        }

        let span = event.context.span();
        let span_context = span.span_context();
        if span_context.is_valid() {
            record.set_trace_context(
                span_context.trace_id(),
                span_context.span_id(),
                Some(span_context.trace_flags()),
            );
        }

        self.logger.emit(record);
    }
}

fn is_under(target: &str, prefix: &str) -> bool {
    target
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}
