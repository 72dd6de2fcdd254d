//! Conversion of externally resolved agent settings into a pipeline config.
//!
//! Resolving the settings themselves (explicit options, environment,
//! defaults) happens elsewhere; this module only maps the result.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{Config, ConfigBuilder, json_to_attribute_value};

/// Resource key carrying the workspace identifier.
pub const WORKSPACE_ID_KEY: &str = "workspace.id";

/// Final settings produced by the settings-resolution cascade.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSettings {
    #[serde(rename = "service")]
    pub service_name: String,

    #[serde(default)]
    pub workspace_id: String,

    /// Collector address, with or without scheme.
    #[serde(rename = "target")]
    pub host: String,

    #[serde(default)]
    pub pause_traces: bool,

    #[serde(default)]
    pub pause_metrics: bool,

    #[serde(default)]
    pub pause_logs: bool,

    /// Sent as the `authorization` header.
    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default)]
    pub custom_resource_attributes: BTreeMap<String, serde_json::Value>,
}

impl ResolvedSettings {
    /// Map these settings onto a builder.
    ///
    /// An explicit `https://` host turns TLS on; anything else keeps the
    /// plaintext default.
    pub fn to_builder(&self) -> ConfigBuilder {
        let mut builder = Config::builder()
            .endpoint(&self.host)
            .insecure(!self.host.starts_with("https://"))
            .service_name(&self.service_name)
            .disable_traces(self.pause_traces)
            .disable_metrics(self.pause_metrics)
            .disable_logs(self.pause_logs);

        if !self.workspace_id.is_empty() {
            builder = builder.resource_attribute(WORKSPACE_ID_KEY, self.workspace_id.clone());
        }

        if let Some(token) = self.access_token.as_deref().filter(|t| !t.is_empty()) {
            builder = builder.authorization(token);
        }

        for (key, value) in &self.custom_resource_attributes {
            builder = match json_to_attribute_value(value) {
                Some(value) => builder.resource_attribute(key.clone(), value),
                None => {
                    warn!(key = %key, "Unsupported custom resource attribute; dropping");
                    builder
                }
            };
        }

        builder
    }
}

impl From<ResolvedSettings> for ConfigBuilder {
    fn from(settings: ResolvedSettings) -> Self {
        settings.to_builder()
    }
}
