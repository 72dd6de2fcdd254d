//! Ordered registry of provider shutdown callbacks.

use std::fmt;

use opentelemetry_sdk::error::OTelSdkResult;
use tracing::{debug, warn};

use crate::error::{AggregatedShutdownError, ProviderShutdownFailure};
use crate::exporter::Channel;
use crate::provider::ManagedProvider;

type ShutdownFn = Box<dyn FnOnce() -> OTelSdkResult + Send>;

/// Append-only list of shutdown callbacks, drained exactly once.
#[derive(Default)]
pub struct CleanupRegistry {
    entries: Vec<(Channel, ShutdownFn)>,
}

impl CleanupRegistry {
    /// Register `provider` for shutdown.
    pub fn register<P: ManagedProvider>(&mut self, channel: Channel, provider: P) {
        self.entries
            .push((channel, Box::new(move || provider.shutdown())));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every callback, leaving the registry empty.
    ///
    /// Later callbacks still run when earlier ones fail; all failures are
    /// returned together.
    pub fn drain(&mut self) -> Result<(), AggregatedShutdownError> {
        std::mem::take(self).run()
    }

    /// Consume the registry, running every callback in registration order.
    pub fn run(self) -> Result<(), AggregatedShutdownError> {
        let mut failures = Vec::new();

        for (channel, shutdown) in self.entries {
            match shutdown() {
                Ok(()) => debug!(channel = %channel, "Provider shut down"),
                Err(error) => {
                    warn!(channel = %channel, error = %error, "Provider shutdown failed");
                    failures.push(ProviderShutdownFailure { channel, error });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AggregatedShutdownError { failures })
        }
    }
}

impl fmt::Debug for CleanupRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(channel, _)| channel))
            .finish()
    }
}
