//! Process-wide registration state.
//!
//! OpenTelemetry keeps global tracer and meter providers but no global
//! logger provider, so the log sink is held here. Registration is
//! unsynchronized with respect to concurrent `init` calls.
//!
//! Shutting down the pipeline that installed the providers clears this
//! state. The OpenTelemetry tracer and meter globals keep pointing at the
//! shut-down SDK providers, which then drop whatever they receive.

use std::sync::atomic::{AtomicU8, Ordering};

use opentelemetry_sdk::logs::SdkLoggerProvider;
use parking_lot::RwLock;

use crate::exporter::Channel;

static LOGGER_PROVIDER: RwLock<Option<SdkLoggerProvider>> = parking_lot::const_rwlock(None);

static REGISTERED: AtomicU8 = AtomicU8::new(0);

fn bit(channel: Channel) -> u8 {
    match channel {
        Channel::Traces => 0b001,
        Channel::Metrics => 0b010,
        Channel::Logs => 0b100,
    }
}

pub(crate) fn mark_registered(channel: Channel) {
    REGISTERED.fetch_or(bit(channel), Ordering::SeqCst);
}

/// Whether a provider has been installed process-wide for `channel`.
pub fn is_registered(channel: Channel) -> bool {
    REGISTERED.load(Ordering::SeqCst) & bit(channel) != 0
}

/// Install `provider` as the process-wide log sink.
pub fn set_logger_provider(provider: SdkLoggerProvider) {
    *LOGGER_PROVIDER.write() = Some(provider);
    mark_registered(Channel::Logs);
}

/// The process-wide log sink, if one has been installed.
pub fn logger_provider() -> Option<SdkLoggerProvider> {
    LOGGER_PROVIDER.read().clone()
}

/// Forget every registration made by the pipeline being shut down.
pub(crate) fn clear() {
    LOGGER_PROVIDER.write().take();
    REGISTERED.store(0, Ordering::SeqCst);
}
