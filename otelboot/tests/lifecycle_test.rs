//! Lifecycle tests for the orchestrator, driven through a fake provider factory.
//!
//! The fake records every build, install and shutdown in a shared journal so
//! ordering and rollback behavior can be asserted without a collector.

use std::sync::Arc;
use std::time::Duration;

use opentelemetry_sdk::Resource;
use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use parking_lot::Mutex;

use otelboot::{
    Channel, Config, ConfigError, ManagedProvider, ProviderFactory, ShutdownError,
    TelemetryError, Transport, init_with,
};

#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, entry: String) {
        self.0.lock().push(entry);
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| e.as_str() == entry).count()
    }

    fn count_prefix(&self, prefix: &str) -> usize {
        self.0.lock().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

#[derive(Clone)]
struct FakeProvider {
    channel: Channel,
    journal: Journal,
    fail_shutdown: bool,
    shutdown_delay: Option<Duration>,
}

impl ManagedProvider for FakeProvider {
    fn shutdown(&self) -> OTelSdkResult {
        if let Some(delay) = self.shutdown_delay {
            std::thread::sleep(delay);
        }
        self.journal.push(format!("shutdown {}", self.channel));

        if self.fail_shutdown {
            Err(OTelSdkError::InternalFailure(format!(
                "{} exporter unreachable",
                self.channel
            )))
        } else {
            Ok(())
        }
    }

    fn install_global(&self) {
        self.journal.push(format!("install {}", self.channel));
    }
}

#[derive(Clone, Default)]
struct FakeFactory {
    journal: Journal,
    fail_build: Option<Channel>,
    fail_shutdown: Vec<Channel>,
    shutdown_delay: Option<Duration>,
}

impl FakeFactory {
    fn failing_build(channel: Channel) -> Self {
        Self {
            fail_build: Some(channel),
            ..Default::default()
        }
    }

    fn build(&self, channel: Channel) -> otelboot::Result<FakeProvider> {
        if self.fail_build == Some(channel) {
            self.journal.push(format!("fail {}", channel));
            return Err(TelemetryError::exporter(
                channel,
                Transport::Http,
                "connection refused",
            ));
        }

        self.journal.push(format!("build {}", channel));
        Ok(FakeProvider {
            channel,
            journal: self.journal.clone(),
            fail_shutdown: self.fail_shutdown.contains(&channel),
            shutdown_delay: self.shutdown_delay,
        })
    }
}

impl ProviderFactory for FakeFactory {
    type Tracer = FakeProvider;
    type Meter = FakeProvider;
    type Logger = FakeProvider;

    fn tracer_provider(&self, _: &Config, _: &Resource) -> otelboot::Result<FakeProvider> {
        self.build(Channel::Traces)
    }

    fn meter_provider(&self, _: &Config, _: &Resource) -> otelboot::Result<FakeProvider> {
        self.build(Channel::Metrics)
    }

    fn logger_provider(&self, _: &Config, _: &Resource) -> otelboot::Result<FakeProvider> {
        self.build(Channel::Logs)
    }
}

fn config() -> Config {
    Config::builder()
        .endpoint("http://collector:4318")
        .use_http(true)
        .service_name("svc-a")
        .build()
        .unwrap()
}

// =============================================================================
// Init
// =============================================================================

#[tokio::test]
async fn test_missing_config_touches_nothing() {
    let factory = FakeFactory::default();
    let journal = factory.journal.clone();

    let result = init_with(None, factory).await;

    assert!(matches!(
        result,
        Err(TelemetryError::Config(ConfigError::Missing))
    ));
    assert!(journal.entries().is_empty());
}

#[tokio::test]
async fn test_all_disabled_builds_nothing() {
    let factory = FakeFactory::default();
    let journal = factory.journal.clone();
    let config = Config::builder()
        .disable_traces(true)
        .disable_metrics(true)
        .disable_logs(true)
        .build()
        .unwrap();

    let mut telemetry = init_with(Some(&config), factory).await.unwrap();

    assert!(telemetry.is_noop());
    assert!(telemetry.shutdown().await.is_ok());
    assert!(journal.entries().is_empty());
}

#[tokio::test]
async fn test_build_order_then_deferred_registration() {
    let factory = FakeFactory::default();
    let journal = factory.journal.clone();

    let telemetry = init_with(Some(&config()), factory).await.unwrap();

    assert!(!telemetry.is_noop());
    assert_eq!(
        journal.entries(),
        vec![
            "build traces",
            "build logs",
            "build metrics",
            "install traces",
            "install logs",
            "install metrics",
        ]
    );
}

#[tokio::test]
async fn test_disabled_channel_is_skipped() {
    let factory = FakeFactory::default();
    let journal = factory.journal.clone();
    let config = Config::builder().disable_logs(true).build().unwrap();

    let telemetry = init_with(Some(&config), factory).await.unwrap();

    assert!(telemetry.logger_provider().is_none());
    assert!(telemetry.tracer_provider().is_some());
    assert!(telemetry.meter_provider().is_some());
    assert_eq!(journal.count("build logs"), 0);
    assert_eq!(journal.count("install logs"), 0);
}

#[tokio::test]
async fn test_install_globals_off() {
    let factory = FakeFactory::default();
    let journal = factory.journal.clone();
    let config = Config::builder().install_globals(false).build().unwrap();

    let telemetry = init_with(Some(&config), factory).await.unwrap();

    assert!(telemetry.tracer_provider().is_some());
    assert_eq!(journal.count_prefix("install"), 0);
}

// =============================================================================
// Rollback
// =============================================================================

#[tokio::test]
async fn test_log_failure_rolls_back_traces() {
    let factory = FakeFactory::failing_build(Channel::Logs);
    let journal = factory.journal.clone();

    let err = init_with(Some(&config()), factory).await.unwrap_err();

    match &err {
        TelemetryError::ExporterSetup { channel, .. } => assert_eq!(*channel, Channel::Logs),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("connection refused"));

    assert_eq!(
        journal.entries(),
        vec!["build traces", "fail logs", "shutdown traces"]
    );
    assert_eq!(journal.count("shutdown traces"), 1);
    assert_eq!(journal.count_prefix("install"), 0);
    assert_eq!(journal.count("build metrics"), 0);
}

#[tokio::test]
async fn test_first_channel_failure_has_nothing_to_roll_back() {
    let factory = FakeFactory::failing_build(Channel::Traces);
    let journal = factory.journal.clone();

    let err = init_with(Some(&config()), factory).await.unwrap_err();

    assert!(matches!(err, TelemetryError::ExporterSetup { .. }));
    assert_eq!(journal.entries(), vec!["fail traces"]);
}

#[tokio::test]
async fn test_rollback_failure_is_joined_with_cause() {
    let factory = FakeFactory {
        fail_build: Some(Channel::Metrics),
        fail_shutdown: vec![Channel::Traces],
        ..Default::default()
    };
    let journal = factory.journal.clone();

    let err = init_with(Some(&config()), factory).await.unwrap_err();

    match &err {
        TelemetryError::RollbackFailed { rollback, .. } => {
            assert_eq!(rollback.channels(), vec![Channel::Traces]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(
        err.cause(),
        TelemetryError::ExporterSetup {
            channel: Channel::Metrics,
            ..
        }
    ));

    let message = err.to_string();
    assert!(message.contains("metrics exporter"));
    assert!(message.contains("traces exporter unreachable"));

    // A failed shutdown does not stop the rest of the rollback.
    assert_eq!(journal.count("shutdown logs"), 1);
    assert_eq!(journal.count_prefix("install"), 0);
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn test_double_shutdown_is_noop() {
    let factory = FakeFactory::default();
    let journal = factory.journal.clone();

    let mut telemetry = init_with(Some(&config()), factory).await.unwrap();

    assert!(telemetry.shutdown().await.is_ok());
    assert_eq!(journal.count_prefix("shutdown"), 3);

    assert!(telemetry.shutdown().await.is_ok());
    assert_eq!(journal.count_prefix("shutdown"), 3);
}

#[tokio::test]
async fn test_shutdown_runs_in_registration_order() {
    let factory = FakeFactory::default();
    let journal = factory.journal.clone();

    let mut telemetry = init_with(Some(&config()), factory).await.unwrap();
    telemetry.shutdown().await.unwrap();

    let shutdowns: Vec<String> = journal
        .entries()
        .into_iter()
        .filter(|e| e.starts_with("shutdown"))
        .collect();
    assert_eq!(
        shutdowns,
        vec!["shutdown traces", "shutdown logs", "shutdown metrics"]
    );
}

#[tokio::test]
async fn test_shutdown_aggregates_every_failure() {
    let factory = FakeFactory {
        fail_shutdown: vec![Channel::Traces, Channel::Metrics],
        ..Default::default()
    };
    let journal = factory.journal.clone();

    let mut telemetry = init_with(Some(&config()), factory).await.unwrap();
    let err = telemetry.shutdown().await.unwrap_err();

    assert_eq!(err.channels(), vec![Channel::Traces, Channel::Metrics]);
    assert_eq!(err.failures.len(), 2);
    assert_eq!(journal.count("shutdown logs"), 1);

    // Failures are reported once; the registry is drained regardless.
    assert!(telemetry.shutdown().await.is_ok());
    assert_eq!(journal.count_prefix("shutdown"), 3);
}

#[tokio::test]
async fn test_shutdown_with_timeout_completes() {
    let factory = FakeFactory::default();
    let journal = factory.journal.clone();

    let mut telemetry = init_with(Some(&config()), factory).await.unwrap();
    telemetry
        .shutdown_with_timeout(Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(journal.count_prefix("shutdown"), 3);
    assert!(telemetry.shutdown().await.is_ok());
}

#[tokio::test]
async fn test_shutdown_with_timeout_reports_provider_failures() {
    let factory = FakeFactory {
        fail_shutdown: vec![Channel::Logs],
        ..Default::default()
    };

    let mut telemetry = init_with(Some(&config()), factory).await.unwrap();
    let err = telemetry
        .shutdown_with_timeout(Duration::from_secs(5))
        .await
        .unwrap_err();

    match err {
        ShutdownError::Providers(aggregated) => {
            assert_eq!(aggregated.channels(), vec![Channel::Logs]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_shutdown_deadline_exceeded() {
    let factory = FakeFactory {
        shutdown_delay: Some(Duration::from_millis(300)),
        ..Default::default()
    };

    let mut telemetry = init_with(Some(&config()), factory).await.unwrap();
    let err = telemetry
        .shutdown_with_timeout(Duration::from_millis(20))
        .await
        .unwrap_err();

    assert!(matches!(err, ShutdownError::DeadlineExceeded(_)));
    assert!(telemetry.shutdown().await.is_ok());
}
