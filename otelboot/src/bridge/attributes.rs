//! Type recovery for log fields that passed through a JSON representation.

use opentelemetry::logs::AnyValue;
use serde_json::{Map, Value};

/// A field value after type recovery.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveredValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl From<RecoveredValue> for AnyValue {
    fn from(value: RecoveredValue) -> Self {
        match value {
            RecoveredValue::Bool(b) => AnyValue::Boolean(b),
            RecoveredValue::Int(i) => AnyValue::Int(i),
            RecoveredValue::Float(f) => AnyValue::Double(f),
            RecoveredValue::String(s) => AnyValue::from(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecoveredAttribute {
    pub key: String,
    pub value: RecoveredValue,
}

impl RecoveredAttribute {
    fn new(key: &str, value: RecoveredValue) -> Self {
        Self {
            key: key.to_string(),
            value,
        }
    }
}

/// Recover typed attributes for one field.
///
/// Arrays expand into one attribute per leaf, all under `key`.
pub fn recover(key: &str, value: &Value) -> Vec<RecoveredAttribute> {
    let mut out = Vec::new();
    recover_into(key, value, &mut out);
    out
}

/// Recover every field of a structured payload, in key order.
pub fn recover_map(fields: &Map<String, Value>) -> Vec<RecoveredAttribute> {
    let mut out = Vec::with_capacity(fields.len());
    for (key, value) in fields {
        recover_into(key, value, &mut out);
    }
    out
}

/// Recover every field of a raw JSON object.
///
/// Anything that is not a JSON object yields no attributes.
pub fn recover_payload(raw: &str) -> Vec<RecoveredAttribute> {
    match serde_json::from_str::<Map<String, Value>>(raw) {
        Ok(fields) => recover_map(&fields),
        Err(_) => Vec::new(),
    }
}

fn recover_into(key: &str, value: &Value, out: &mut Vec<RecoveredAttribute>) {
    match value {
        Value::Bool(b) => out.push(RecoveredAttribute::new(key, RecoveredValue::Bool(*b))),
        Value::String(s) => out.push(RecoveredAttribute::new(
            key,
            RecoveredValue::String(s.clone()),
        )),
        Value::Number(n) => out.push(RecoveredAttribute::new(key, recover_number(n))),
        Value::Array(items) => {
            for item in items {
                recover_into(key, item, out);
            }
        }
        Value::Null | Value::Object(_) => out.push(RecoveredAttribute::new(
            key,
            RecoveredValue::String(value.to_string()),
        )),
    }
}

// JSON numbers lose the int/float distinction; a float with no
// fractional part is taken to have been an integer.
fn recover_number(n: &serde_json::Number) -> RecoveredValue {
    if let Some(i) = n.as_i64() {
        return RecoveredValue::Int(i);
    }
    if n.is_u64() {
        // Above i64::MAX.
        return RecoveredValue::String(n.to_string());
    }

    match n.as_f64() {
        Some(f) if is_integral(f) => RecoveredValue::Int(f as i64),
        Some(f) => RecoveredValue::Float(f),
        None => RecoveredValue::String(n.to_string()),
    }
}

fn is_integral(f: f64) -> bool {
    f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64
}
