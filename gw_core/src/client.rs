//! Process-wide serving tunables.

use crate::validation_error;
use errors::ConfigError;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HeaderFilterConfig {
    #[serde(default)]
    pub allowlist: Vec<String>,
    #[serde(default)]
    pub denylist: Vec<String>
}

impl HeaderFilterConfig {
    /// Whether a client-supplied header may be forwarded upstream. The
    /// denylist wins; an empty allowlist allows everything else.
    #[must_use]
    pub fn allows(&self, header: &str) -> bool {
        let matches = |list: &[String]| list.iter().any(|h| h.eq_ignore_ascii_case(header));
        if matches(&self.denylist) {
            return false;
        }
        self.allowlist.is_empty() || matches(&self.allowlist)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ClientConfig {
    pub drop_excess_requests: bool,
    #[validate(range(min = 1))]
    pub initial_pool_size: u32,
    pub prometheus_labels: Vec<String>,
    pub enable_logging: bool,
    pub disable_content_logging: bool,
    #[validate(range(min = 1))]
    pub log_retention_days: u32,
    pub enable_governance: bool,
    pub enforce_governance_header: bool,
    pub allow_direct_keys: bool,
    pub allowed_origins: Vec<String>,
    pub allowed_headers: Vec<String>,
    #[validate(range(min = 1))]
    pub max_request_body_size_mb: u32,
    #[validate(range(min = 1))]
    pub mcp_agent_depth: u32,
    #[validate(range(min = 1))]
    pub mcp_tool_execution_timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_filter_config: Option<HeaderFilterConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            drop_excess_requests: false,
            initial_pool_size: 300,
            prometheus_labels: Vec::new(),
            enable_logging: true,
            disable_content_logging: false,
            log_retention_days: 365,
            enable_governance: true,
            enforce_governance_header: false,
            allow_direct_keys: false,
            allowed_origins: Vec::new(),
            allowed_headers: Vec::new(),
            max_request_body_size_mb: 100,
            mcp_agent_depth: 10,
            mcp_tool_execution_timeout: 30,
            header_filter_config: None,
            config_hash: None
        }
    }
}

impl ClientConfig {
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate().map_err(|e| validation_error("client config", &e))?;
        if let Some(origin) = self.allowed_origins.iter().find(|o| {
            o.as_str() != "*" && !o.starts_with("http://") && !o.starts_with("https://")
        }) {
            return Err(ConfigError::validation(
                "client config",
                format!("allowed origin {origin} must be * or an http(s) origin")
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document_uses_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"enable_logging": false, "allowed_origins": ["https://app.example.com"]}"#)
                .unwrap();
        assert!(!config.enable_logging);
        assert_eq!(config.initial_pool_size, 300);
        assert_eq!(config.max_request_body_size_mb, 100);
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_invalid_origin_rejected() {
        let config = ClientConfig {
            allowed_origins: vec!["app.example.com".to_string()],
            ..ClientConfig::default()
        };
        assert!(config.check().is_err());
    }

    #[test]
    fn test_zero_pool_size_rejected() {
        let config = ClientConfig {
            initial_pool_size: 0,
            ..ClientConfig::default()
        };
        assert!(matches!(
            config.check(),
            Err(ConfigError::ValidationFailure { .. })
        ));
    }

    #[test]
    fn test_header_filter() {
        let filter = HeaderFilterConfig {
            allowlist: vec!["x-request-id".to_string(), "x-trace".to_string()],
            denylist: vec!["x-trace".to_string()]
        };
        assert!(filter.allows("X-Request-Id"));
        assert!(!filter.allows("x-trace"));
        assert!(!filter.allows("cookie"));
        assert!(HeaderFilterConfig::default().allows("cookie"));
    }
}
