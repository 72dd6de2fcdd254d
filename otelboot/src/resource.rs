//! Construction of the shared OpenTelemetry resource.

use opentelemetry_sdk::Resource;

use crate::config::Config;
use crate::error::{Result, TelemetryError};

/// Build the resource shared by every provider of one pipeline.
///
/// `service.name` always comes from the configured service name, after
/// any environment-detected attributes.
pub fn build_resource(config: &Config) -> Result<Resource> {
    let service_name = config.service_name().trim();
    if service_name.is_empty() {
        return Err(TelemetryError::ResourceBuild(
            "service name cannot be empty".to_string(),
        ));
    }

    if let Some(kv) = config
        .resource_attributes()
        .iter()
        .find(|kv| kv.key.as_str().trim().is_empty())
    {
        return Err(TelemetryError::ResourceBuild(format!(
            "attribute key cannot be empty (value {})",
            kv.value
        )));
    }

    Ok(Resource::builder()
        .with_service_name(service_name.to_string())
        .with_attributes(config.resource_attributes().iter().cloned())
        .build())
}
