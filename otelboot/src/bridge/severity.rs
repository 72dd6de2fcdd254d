//! Mapping from source log levels to OpenTelemetry severities.

use std::borrow::Cow;

use opentelemetry::logs::Severity;

/// Level name as the source logging pipeline reported it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    /// First fatal tier: the process is about to unwind.
    Panic,
    /// Second fatal tier: the process is about to exit.
    Fatal,
    /// A name with no known mapping, kept as reported.
    Unrecognized(Cow<'static, str>),
}

impl SourceLevel {
    /// Parse a level name, case-insensitively.
    pub fn parse(name: &str) -> Self {
        let name = name.trim();
        match name.to_ascii_lowercase().as_str() {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            "panic" => Self::Panic,
            "fatal" => Self::Fatal,
            _ => Self::Unrecognized(Cow::Owned(name.to_string())),
        }
    }

    /// Canonical level name, used as severity text. Unrecognized levels
    /// have none; see [`name`](Self::name).
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            Self::Trace => Some("trace"),
            Self::Debug => Some("debug"),
            Self::Info => Some("info"),
            Self::Warn => Some("warn"),
            Self::Error => Some("error"),
            Self::Panic => Some("panic"),
            Self::Fatal => Some("fatal"),
            Self::Unrecognized(_) => None,
        }
    }

    /// The level name, canonical for known levels and as reported otherwise.
    pub fn name(&self) -> &str {
        match self {
            Self::Unrecognized(name) => name.as_ref(),
            known => known.as_str().unwrap_or_default(),
        }
    }

    pub fn ordinal(&self) -> SeverityOrdinal {
        match self {
            Self::Debug => SeverityOrdinal::Debug,
            Self::Info => SeverityOrdinal::Info,
            Self::Warn => SeverityOrdinal::Warn,
            Self::Error => SeverityOrdinal::Error,
            Self::Panic => SeverityOrdinal::Fatal,
            Self::Fatal => SeverityOrdinal::Fatal2,
            Self::Trace | Self::Unrecognized(_) => SeverityOrdinal::Undefined,
        }
    }

    /// Verbosity rank used for level filtering. `None` for unrecognized
    /// levels, which are never filtered.
    pub(crate) fn rank(&self) -> Option<u8> {
        match self {
            Self::Trace => Some(0),
            Self::Debug => Some(1),
            Self::Info => Some(2),
            Self::Warn => Some(3),
            Self::Error => Some(4),
            Self::Panic => Some(5),
            Self::Fatal => Some(6),
            Self::Unrecognized(_) => None,
        }
    }
}

impl From<&tracing::Level> for SourceLevel {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => Self::Trace,
            tracing::Level::DEBUG => Self::Debug,
            tracing::Level::INFO => Self::Info,
            tracing::Level::WARN => Self::Warn,
            tracing::Level::ERROR => Self::Error,
        }
    }
}

/// OpenTelemetry severity number assigned to a forwarded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SeverityOrdinal {
    /// No mapping; the record carries no severity number.
    Undefined = 0,
    Debug = 5,
    Info = 9,
    Warn = 13,
    Error = 17,
    Fatal = 21,
    Fatal2 = 22,
}

impl SeverityOrdinal {
    pub fn number(&self) -> u8 {
        *self as u8
    }

    /// Convert to an OpenTelemetry severity, if defined.
    pub fn to_otel(&self) -> Option<Severity> {
        match self {
            Self::Undefined => None,
            Self::Debug => Some(Severity::Debug),
            Self::Info => Some(Severity::Info),
            Self::Warn => Some(Severity::Warn),
            Self::Error => Some(Severity::Error),
            Self::Fatal => Some(Severity::Fatal),
            Self::Fatal2 => Some(Severity::Fatal2),
        }
    }
}
