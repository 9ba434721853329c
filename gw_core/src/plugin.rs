//! Declared plugin configuration.

use crate::redact::{Redact, redact_json};
use errors::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PluginConfig {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    /// Location of a custom plugin; built-in plugins have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>
}

impl PluginConfig {
    #[must_use]
    pub fn is_custom(&self) -> bool {
        self.path.is_some()
    }

    /// The plugin's own config, with an empty object treated as absent.
    #[must_use]
    pub fn effective_config(&self) -> Option<&Value> {
        self.config
            .as_ref()
            .filter(|v| !v.is_null() && !v.as_object().is_some_and(serde_json::Map::is_empty))
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::validation("plugin", "name must not be empty"));
        }
        if self.path.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::validation(
                format!("plugin {}", self.name),
                "path must not be empty when set"
            ));
        }
        Ok(())
    }
}

impl Redact for PluginConfig {
    fn redacted(&self) -> Self {
        Self {
            config: self.config.as_ref().map(redact_json),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_object_is_no_config() {
        let plugin = PluginConfig {
            name: "semantic_cache".to_string(),
            config: Some(json!({})),
            ..PluginConfig::default()
        };
        assert!(plugin.effective_config().is_none());

        let plugin = PluginConfig {
            config: Some(json!({"ttl": 60})),
            ..plugin
        };
        assert_eq!(plugin.effective_config(), Some(&json!({"ttl": 60})));
    }

    #[test]
    fn test_custom_plugin_detection() {
        let plugin = PluginConfig {
            name: "audit".to_string(),
            path: Some("/opt/plugins/audit.so".to_string()),
            ..PluginConfig::default()
        };
        assert!(plugin.is_custom());
        assert!(plugin.check().is_ok());
    }
}
