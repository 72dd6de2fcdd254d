//! `tracing_subscriber` layer that forwards events through a [`LogBridge`].

use std::borrow::Cow;
use std::fmt;

use opentelemetry::logs::{Logger, LoggerProvider};
use opentelemetry_sdk::logs::SdkLogger;
use serde_json::{Map, Number, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use super::{FieldPayload, LogBridge, LogEvent, SourceLevel};
use crate::global;

const MESSAGE_FIELD: &str = "message";

/// Forwards every `tracing` event to an OpenTelemetry logger.
///
/// The original event still reaches every other layer unchanged.
#[derive(Debug)]
pub struct OtelLogLayer<L = SdkLogger> {
    bridge: LogBridge<L>,
}

impl OtelLogLayer<SdkLogger> {
    /// Build a layer over the process-wide log provider, if one is registered.
    pub fn from_global() -> Option<Self> {
        global::logger_provider().map(|provider| Self::new(&provider))
    }
}

impl<L: Logger> OtelLogLayer<L> {
    pub fn new<P>(provider: &P) -> Self
    where
        P: LoggerProvider<Logger = L>,
    {
        Self::from_bridge(LogBridge::new(provider))
    }

    pub fn from_bridge(bridge: LogBridge<L>) -> Self {
        Self { bridge }
    }

    pub fn with_min_level(self, level: SourceLevel) -> Self {
        Self::from_bridge(self.bridge.with_min_level(level))
    }

    pub fn bridge(&self) -> &LogBridge<L> {
        &self.bridge
    }
}

impl<S, L> Layer<S> for OtelLogLayer<L>
where
    S: Subscriber,
    L: Logger + Send + Sync + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = SourceLevel::from(metadata.level());

        if !self.bridge.enabled(&level, metadata.target()) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        self.bridge.emit(LogEvent {
            level,
            target: Cow::Borrowed(metadata.target()),
            message: visitor.message.unwrap_or_default(),
            fields: FieldPayload::Structured(visitor.fields),
            context: opentelemetry::Context::current(),
        });
    }
}

/// Collects event fields into a JSON map, keeping their recorded types.
///
/// `tracing` hands `?value` and `%value` fields to the same
/// [`record_debug`](Visit::record_debug) callback, so the two cannot be told
/// apart here: a Display rendering that parses as a JSON array is flattened
/// like a debug-recorded sequence. Plain string fields go through
/// `record_str` and are always kept as one string.
#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.insert(field, value);
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == MESSAGE_FIELD {
            self.message = Some(value.to_string());
        } else {
            self.insert(field, Value::String(value.to_string()));
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{:?}", value);

        if field.name() == MESSAGE_FIELD {
            self.message = Some(rendered);
            return;
        }

        // Sequences render as JSON arrays and are flattened downstream.
        let value = match serde_json::from_str::<Value>(&rendered) {
            Ok(array @ Value::Array(_)) => array,
            _ => Value::String(rendered),
        };
        self.insert(field, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::logs::{AnyValue, Severity};
    use opentelemetry_sdk::logs::{InMemoryLogExporter, SdkLogRecord, SdkLoggerProvider};
    use tracing::{debug, error, info, trace, warn};
    use tracing_subscriber::prelude::*;

    fn capture<F: FnOnce()>(layer_min: SourceLevel, f: F) -> Vec<SdkLogRecord> {
        let exporter = InMemoryLogExporter::default();
        let provider = SdkLoggerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();

        let subscriber = tracing_subscriber::registry()
            .with(OtelLogLayer::new(&provider).with_min_level(layer_min));
        tracing::subscriber::with_default(subscriber, f);

        exporter
            .get_emitted_logs()
            .unwrap()
            .into_iter()
            .map(|log| log.record)
            .collect()
    }

    fn attribute(record: &SdkLogRecord, key: &str) -> Vec<AnyValue> {
        record
            .attributes_iter()
            .filter(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v.clone())
            .collect()
    }

    #[test]
    fn test_event_becomes_record() {
        let records = capture(SourceLevel::Trace, || {
            info!(user = "ada", retries = 3_i64, ratio = 0.5, ok = true, "login {}", "done");
        });

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.body(), Some(&AnyValue::from("login done")));
        assert_eq!(record.severity_number(), Some(Severity::Info));
        assert_eq!(record.severity_text(), Some("info"));
        assert_eq!(attribute(record, "user"), vec![AnyValue::from("ada")]);
        assert_eq!(attribute(record, "retries"), vec![AnyValue::Int(3)]);
        assert_eq!(attribute(record, "ratio"), vec![AnyValue::Double(0.5)]);
        assert_eq!(attribute(record, "ok"), vec![AnyValue::Boolean(true)]);
    }

    #[test]
    fn test_whole_float_field_recovered_as_int() {
        let records = capture(SourceLevel::Trace, || {
            warn!(latency = 42.0, jitter = 42.5, "slow");
        });

        assert_eq!(attribute(&records[0], "latency"), vec![AnyValue::Int(42)]);
        assert_eq!(
            attribute(&records[0], "jitter"),
            vec![AnyValue::Double(42.5)]
        );
    }

    #[test]
    fn test_debug_sequence_is_flattened() {
        let records = capture(SourceLevel::Trace, || {
            error!(ids = ?vec![1, 2, 3], name = ?"plain", "batch failed");
        });

        assert_eq!(
            attribute(&records[0], "ids"),
            vec![AnyValue::Int(1), AnyValue::Int(2), AnyValue::Int(3)]
        );
        assert_eq!(
            attribute(&records[0], "name"),
            vec![AnyValue::from("\"plain\"")]
        );
    }

    #[test]
    fn test_array_like_text_fields() {
        let records = capture(SourceLevel::Trace, || {
            info!(range = "[0, 10]", shown = %"[0, 10]", "query");
        });

        assert_eq!(
            attribute(&records[0], "range"),
            vec![AnyValue::from("[0, 10]")]
        );
        // Display fields share the debug path.
        assert_eq!(
            attribute(&records[0], "shown"),
            vec![AnyValue::Int(0), AnyValue::Int(10)]
        );
    }

    #[test]
    fn test_trace_level_has_no_severity_number() {
        let records = capture(SourceLevel::Trace, || {
            trace!("very fine");
        });

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity_number(), None);
        assert_eq!(records[0].severity_text(), Some("trace"));
    }

    #[test]
    fn test_min_level_and_suppressed_targets() {
        let records = capture(SourceLevel::Info, || {
            debug!("dropped");
            info!(target: "hyper::client", "dropped too");
            info!("kept");
        });

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].body(), Some(&AnyValue::from("kept")));
    }

    #[test]
    fn test_records_follow_call_order() {
        let records = capture(SourceLevel::Trace, || {
            for i in 0..5_i64 {
                info!(seq = i, "tick");
            }
        });

        let seqs: Vec<AnyValue> = records
            .iter()
            .flat_map(|r| attribute(r, "seq"))
            .collect();
        assert_eq!(seqs, (0..5).map(AnyValue::Int).collect::<Vec<_>>());
    }
}
