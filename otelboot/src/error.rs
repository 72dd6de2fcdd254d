//! Error types for pipeline setup and shutdown.

use std::fmt;
use std::time::Duration;

use opentelemetry_sdk::error::OTelSdkError;
use thiserror::Error;

use crate::config::{ConfigError, Transport};
use crate::exporter::Channel;

/// Result type alias using [`TelemetryError`].
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors raised while bringing the pipeline up.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Missing or invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An exporter could not be constructed.
    #[error("Failed to create {transport} {channel} exporter: {source}")]
    ExporterSetup {
        channel: Channel,
        transport: Transport,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The resource attribute set could not be assembled.
    #[error("Failed to build resource: {0}")]
    ResourceBuild(String),

    /// Setup failed and shutting down the already-built providers failed too.
    #[error("{cause}; rollback failed: {rollback}")]
    RollbackFailed {
        #[source]
        cause: Box<TelemetryError>,
        rollback: AggregatedShutdownError,
    },

    /// The local tracing subscriber could not be installed.
    #[error("Failed to initialize tracing: {0}")]
    Tracing(String),
}

impl TelemetryError {
    /// Wrap an exporter construction failure with its channel and transport.
    pub fn exporter<E>(channel: Channel, transport: Transport, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::ExporterSetup {
            channel,
            transport,
            source: source.into(),
        }
    }

    /// Join a setup failure with the outcome of its rollback.
    pub(crate) fn with_rollback(
        self,
        rollback: std::result::Result<(), AggregatedShutdownError>,
    ) -> Self {
        match rollback {
            Ok(()) => self,
            Err(rollback) => Self::RollbackFailed {
                cause: Box::new(self),
                rollback,
            },
        }
    }

    /// The original setup failure, looking through a rollback wrapper.
    pub fn cause(&self) -> &TelemetryError {
        match self {
            Self::RollbackFailed { cause, .. } => cause.cause(),
            other => other,
        }
    }
}

/// One provider that failed to shut down.
#[derive(Debug)]
pub struct ProviderShutdownFailure {
    pub channel: Channel,
    pub error: OTelSdkError,
}

impl fmt::Display for ProviderShutdownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} provider: {}", self.channel, self.error)
    }
}

/// Every provider shutdown failure from one drain; none are suppressed.
#[derive(Debug, Error)]
#[error("{} provider shutdown(s) failed: {}", .failures.len(), join_failures(.failures))]
pub struct AggregatedShutdownError {
    pub failures: Vec<ProviderShutdownFailure>,
}

impl AggregatedShutdownError {
    /// Channels whose provider failed to shut down, in shutdown order.
    pub fn channels(&self) -> Vec<Channel> {
        self.failures.iter().map(|f| f.channel).collect()
    }
}

fn join_failures(failures: &[ProviderShutdownFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from a deadline-bounded shutdown.
#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error(transparent)]
    Providers(#[from] AggregatedShutdownError),

    #[error("Shutdown did not finish within {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Shutdown task failed: {0}")]
    Join(String),
}
