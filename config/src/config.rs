//! # Configuration Structures
//!
//! The declarative config file and the process settings that locate it.

use gw_core::{ClientConfig, EnvVar, GovernanceConfig, McpClientConfig, PluginConfig, ProviderConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Schema identifier this build understands.
pub const SCHEMA_ID: &str = "gateway-config/v1";

/// Default config file name inside the app directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Top-level config file document.
///
/// Every section is optional. An absent section means "the file says nothing
/// about this collection" and leaves the stored collection untouched, which
/// is different from a present-but-empty section for the client config only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfigFile {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<EnvVar>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientConfig>,

    /// Provider name to provider config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub providers: Option<BTreeMap<String, ProviderConfig>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp: Option<McpSection>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub governance: Option<GovernanceConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins: Option<Vec<PluginConfig>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_store: Option<StoreConnectionConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_store: Option<StoreConnectionConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_store: Option<StoreConnectionConfig>
}

impl GatewayConfigFile {
    /// Declared MCP clients, empty when the section is absent.
    #[must_use]
    pub fn mcp_clients(&self) -> &[McpClientConfig] {
        self.mcp.as_ref().map_or(&[], |m| m.client_configs.as_slice())
    }

    /// Whether the file declares no entity of any kind.
    #[must_use]
    pub fn declares_nothing(&self) -> bool {
        self.client.is_none()
            && self.providers.as_ref().is_none_or(BTreeMap::is_empty)
            && self.mcp_clients().is_empty()
            && self.governance.as_ref().is_none_or(GovernanceConfig::is_empty)
            && self.plugins.as_ref().is_none_or(Vec::is_empty)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpSection {
    #[serde(default)]
    pub client_configs: Vec<McpClientConfig>
}

/// Connection settings for one of the external stores. The `config` payload
/// is backend-specific and passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConnectionConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(rename = "type")]
    pub store_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>
}

impl StoreConnectionConfig {
    /// String option from the backend payload, e.g. `path` for a file store.
    #[must_use]
    pub fn option(&self, key: &str) -> Option<&str> {
        self.config.as_ref()?.get(key)?.as_str()
    }
}

/// Process settings: where to find the config file and how to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Explicit config file. Defaults to `<app_dir>/config.json` when present.
    pub config_path: Option<PathBuf>,
    pub app_dir: PathBuf,
    pub log_level: String,
    /// Snapshot file for the file-backed store; in-memory when unset.
    pub store_path: Option<PathBuf>
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            config_path: None,
            app_dir: PathBuf::from("."),
            log_level: "info".to_string(),
            store_path: None
        }
    }
}

impl GatewaySettings {
    /// The config file to load, if any exists.
    #[must_use]
    pub fn resolved_config_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            return Some(path.clone());
        }
        let candidate = self.app_dir.join(DEFAULT_CONFIG_FILE);
        candidate.is_file().then_some(candidate)
    }

    #[must_use]
    pub fn is_valid_log_level(level: &str) -> bool {
        matches!(
            level.to_ascii_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        )
    }

    #[must_use]
    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }
}

/// A partial settings layer. `None` fields defer to lower layers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsOverrides {
    pub config_path: Option<PathBuf>,
    pub app_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub store_path: Option<PathBuf>
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_sections_deserialize_as_none() {
        let file: GatewayConfigFile =
            serde_json::from_str(r#"{"$schema": "gateway-config/v1"}"#).unwrap();
        assert_eq!(file.schema.as_deref(), Some(SCHEMA_ID));
        assert!(file.providers.is_none());
        assert!(file.client.is_none());
        assert!(file.declares_nothing());
    }

    #[test]
    fn test_declared_sections() {
        let file: GatewayConfigFile = serde_json::from_str(
            r#"{
                "encryption_key": "env.GW_KEY",
                "providers": {"openai": {"keys": [{"id": "k1", "name": "main", "value": "env.OPENAI_API_KEY"}]}},
                "mcp": {"client_configs": [{"name": "files", "connection_type": "http", "connection_string": "http://localhost:3001"}]},
                "config_store": {"enabled": true, "type": "file", "config": {"path": "/tmp/store.json"}}
            }"#
        )
        .unwrap();
        assert_eq!(
            file.encryption_key.as_ref().and_then(EnvVar::env_name),
            Some("GW_KEY")
        );
        assert_eq!(file.mcp_clients().len(), 1);
        let store = file.config_store.as_ref().unwrap();
        assert_eq!(store.store_type, "file");
        assert_eq!(store.option("path"), Some("/tmp/store.json"));
        assert!(!file.declares_nothing());
    }

    #[test]
    fn test_resolved_config_path_prefers_explicit() {
        let dir = tempfile::tempdir().unwrap();
        let settings = GatewaySettings {
            app_dir: dir.path().to_path_buf(),
            ..GatewaySettings::default()
        };
        assert!(settings.resolved_config_path().is_none());

        std::fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "{}").unwrap();
        assert_eq!(
            settings.resolved_config_path(),
            Some(dir.path().join(DEFAULT_CONFIG_FILE))
        );

        let explicit = GatewaySettings {
            config_path: Some(PathBuf::from("/etc/gateway.yaml")),
            ..settings
        };
        assert_eq!(
            explicit.resolved_config_path(),
            Some(PathBuf::from("/etc/gateway.yaml"))
        );
    }

    #[test]
    fn test_log_level_check() {
        assert!(GatewaySettings::is_valid_log_level("DEBUG"));
        assert!(!GatewaySettings::is_valid_log_level("verbose"));
    }
}
