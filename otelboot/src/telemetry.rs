//! Pipeline lifecycle: ordered provider construction, rollback on partial
//! failure, deferred global registration and aggregated shutdown.

use std::sync::Once;
use std::time::Duration;

use opentelemetry::global as otel_global;
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use tracing::{debug, error, info, warn};

use crate::cleanup::CleanupRegistry;
use crate::config::{Config, ConfigError};
use crate::error::{AggregatedShutdownError, Result, ShutdownError};
use crate::exporter::Channel;
use crate::global;
use crate::provider::{ManagedProvider, OtlpProviderFactory, ProviderFactory};
use crate::resource::build_resource;

static PROPAGATOR: Once = Once::new();

/// Handle to a running pipeline.
///
/// Holds the constructed providers and their shutdown callbacks. Dropping the
/// handle does not shut anything down; call [`shutdown`](Self::shutdown).
pub struct Telemetry<F: ProviderFactory = OtlpProviderFactory> {
    tracer_provider: Option<F::Tracer>,
    meter_provider: Option<F::Meter>,
    logger_provider: Option<F::Logger>,
    resource: Option<Resource>,
    cleanup: CleanupRegistry,
    globals_installed: bool,
}

/// Bring up the OTLP pipeline described by `config`.
///
/// Must be polled inside a Tokio runtime: the gRPC exporters need one.
pub async fn init(config: Option<&Config>) -> Result<Telemetry> {
    init_with(config, OtlpProviderFactory).await
}

/// Bring up a pipeline whose providers come from `factory`.
///
/// Providers are built in the order traces, logs, metrics. If any enabled
/// channel fails, every provider built so far is shut down and the failure
/// is returned; nothing is registered globally in that case.
pub async fn init_with<F: ProviderFactory>(
    config: Option<&Config>,
    factory: F,
) -> Result<Telemetry<F>> {
    let config = config.ok_or(ConfigError::Missing)?;

    if config.all_disabled() {
        warn!("All telemetry channels are disabled; pipeline will be inert");
        return Ok(Telemetry::inert());
    }

    info!(
        endpoint = %config.endpoint(),
        transport = %config.transport(),
        traces = !config.traces_disabled(),
        metrics = !config.metrics_disabled(),
        logs = !config.logs_disabled(),
        "Initializing telemetry pipeline"
    );

    install_propagator();
    let resource = build_resource(config)?;
    let mut cleanup = CleanupRegistry::default();

    let tracer_provider = construct(
        Channel::Traces,
        config.traces_disabled(),
        &mut cleanup,
        || factory.tracer_provider(config, &resource),
    )?;

    let logger_provider = construct(
        Channel::Logs,
        config.logs_disabled(),
        &mut cleanup,
        || factory.logger_provider(config, &resource),
    )?;

    let meter_provider = construct(
        Channel::Metrics,
        config.metrics_disabled(),
        &mut cleanup,
        || factory.meter_provider(config, &resource),
    )?;

    if config.install_globals() {
        if let Some(provider) = &tracer_provider {
            provider.install_global();
        }
        if let Some(provider) = &logger_provider {
            provider.install_global();
        }
        if let Some(provider) = &meter_provider {
            provider.install_global();
        }
        debug!(providers = cleanup.len(), "Providers installed as process-wide defaults");
    }

    info!(
        service_name = %config.service_name(),
        providers = cleanup.len(),
        "Telemetry pipeline started"
    );

    Ok(Telemetry {
        tracer_provider,
        meter_provider,
        logger_provider,
        resource: Some(resource),
        cleanup,
        globals_installed: config.install_globals(),
    })
}

/// Build one channel's provider, rolling back everything already built if
/// construction fails.
fn construct<P, B>(
    channel: Channel,
    disabled: bool,
    cleanup: &mut CleanupRegistry,
    build: B,
) -> Result<Option<P>>
where
    P: ManagedProvider,
    B: FnOnce() -> Result<P>,
{
    if disabled {
        debug!(channel = %channel, "Channel disabled, skipping");
        return Ok(None);
    }

    match build() {
        Ok(provider) => {
            cleanup.register(channel, provider.clone());
            Ok(Some(provider))
        }
        Err(e) => {
            error!(
                channel = %channel,
                error = %e,
                rollback = cleanup.len(),
                "Provider construction failed, rolling back"
            );
            Err(e.with_rollback(cleanup.drain()))
        }
    }
}

fn install_propagator() {
    PROPAGATOR.call_once(|| {
        otel_global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(BaggagePropagator::new()),
        ]));
        debug!("Installed trace-context and baggage propagator");
    });
}

impl<F: ProviderFactory> Telemetry<F> {
    fn inert() -> Self {
        Self {
            tracer_provider: None,
            meter_provider: None,
            logger_provider: None,
            resource: None,
            cleanup: CleanupRegistry::default(),
            globals_installed: false,
        }
    }

    /// True when no channel was enabled.
    pub fn is_noop(&self) -> bool {
        self.tracer_provider.is_none()
            && self.meter_provider.is_none()
            && self.logger_provider.is_none()
    }

    pub fn tracer_provider(&self) -> Option<&F::Tracer> {
        self.tracer_provider.as_ref()
    }

    pub fn meter_provider(&self) -> Option<&F::Meter> {
        self.meter_provider.as_ref()
    }

    pub fn logger_provider(&self) -> Option<&F::Logger> {
        self.logger_provider.as_ref()
    }

    /// The resource shared by every provider.
    pub fn resource(&self) -> Option<&Resource> {
        self.resource.as_ref()
    }

    /// Shut down every provider in construction order.
    ///
    /// All providers are attempted even if some fail. Later calls are no-ops.
    /// Provider shutdown blocks until queued data is exported, and the gRPC
    /// exporters need the runtime to make progress, so the drain runs on the
    /// blocking pool while this future yields.
    pub async fn shutdown(&mut self) -> std::result::Result<(), AggregatedShutdownError> {
        let Some(cleanup) = self.take_cleanup() else {
            return Ok(());
        };

        info!(providers = cleanup.len(), "Shutting down telemetry pipeline");

        match tokio::task::spawn_blocking(move || cleanup.run()).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            // Cancelled only while the runtime itself is shutting down.
            Err(_) => Ok(()),
        }
    }

    /// Like [`shutdown`](Self::shutdown), bounded by `timeout`.
    ///
    /// If the deadline passes the drain keeps running in the background and
    /// the handle is left empty.
    pub async fn shutdown_with_timeout(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<(), ShutdownError> {
        let Some(cleanup) = self.take_cleanup() else {
            return Ok(());
        };

        info!(
            providers = cleanup.len(),
            timeout = ?timeout,
            "Shutting down telemetry pipeline"
        );

        let task = tokio::task::spawn_blocking(move || cleanup.run());

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result.map_err(ShutdownError::from),
            Ok(Err(e)) => Err(ShutdownError::Join(e.to_string())),
            Err(_) => {
                warn!(timeout = ?timeout, "Telemetry shutdown deadline exceeded");
                Err(ShutdownError::DeadlineExceeded(timeout))
            }
        }
    }

    /// Empty the registry, withdrawing any process-wide registration first so
    /// no new bridge attaches to a provider that is going away.
    fn take_cleanup(&mut self) -> Option<CleanupRegistry> {
        if self.cleanup.is_empty() {
            return None;
        }

        if std::mem::take(&mut self.globals_installed) {
            global::clear();
        }

        Some(std::mem::take(&mut self.cleanup))
    }
}

impl<F: ProviderFactory> std::fmt::Debug for Telemetry<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("traces", &self.tracer_provider.is_some())
            .field("metrics", &self.meter_provider.is_some())
            .field("logs", &self.logger_provider.is_some())
            .field("cleanup", &self.cleanup)
            .finish()
    }
}
