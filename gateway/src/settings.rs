use gw_core::{ClientConfig, HeaderFilterConfig};
use serde::Serialize;

/// Client settings read on every inbound request.
///
/// Published as an immutable snapshot whenever the client config changes,
/// so request handlers read it without taking any lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestSettings {
    pub drop_excess_requests: bool,
    pub enable_logging: bool,
    pub disable_content_logging: bool,
    pub enable_governance: bool,
    pub enforce_governance_header: bool,
    pub allow_direct_keys: bool,
    pub max_request_body_bytes: u64,
    pub allowed_origins: Vec<String>,
    pub header_filter: HeaderFilterConfig
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for RequestSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            drop_excess_requests: config.drop_excess_requests,
            enable_logging: config.enable_logging,
            disable_content_logging: config.disable_content_logging,
            enable_governance: config.enable_governance,
            enforce_governance_header: config.enforce_governance_header,
            allow_direct_keys: config.allow_direct_keys,
            max_request_body_bytes: u64::from(config.max_request_body_size_mb) * 1024 * 1024,
            allowed_origins: config.allowed_origins.clone(),
            header_filter: config.header_filter_config.clone().unwrap_or_default()
        }
    }
}

impl RequestSettings {
    pub fn allows_header(&self, header: &str) -> bool {
        self.header_filter.allows(header)
    }

    /// An empty origin list allows none; `*` allows all.
    pub fn allows_origin(&self, origin: &str) -> bool {
        self.allowed_origins
            .iter()
            .any(|o| o == "*" || o.eq_ignore_ascii_case(origin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_from_client_config() {
        let config = ClientConfig {
            max_request_body_size_mb: 2,
            allowed_origins: vec!["https://app.example.com".to_string()],
            header_filter_config: Some(HeaderFilterConfig {
                allowlist: Vec::new(),
                denylist: vec!["cookie".to_string()]
            }),
            ..ClientConfig::default()
        };
        let settings = RequestSettings::from(&config);
        assert_eq!(settings.max_request_body_bytes, 2 * 1024 * 1024);
        assert!(settings.allows_origin("https://APP.example.com"));
        assert!(!settings.allows_origin("https://evil.example.com"));
        assert!(!settings.allows_header("Cookie"));
        assert!(settings.allows_header("x-request-id"));
    }

    #[test]
    fn test_defaults() {
        let settings = RequestSettings::default();
        assert!(settings.enable_governance);
        assert_eq!(settings.max_request_body_bytes, 100 * 1024 * 1024);
        assert!(!settings.allows_origin("https://app.example.com"));
    }
}
