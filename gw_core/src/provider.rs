//! Provider and key configuration.

use crate::env::{EnvFields, EnvVar, Requirement};
use crate::redact::{Redact, mask_secret};
use crate::validation_error;
use errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use validator::Validate;

/// Upstream providers the serving engine knows how to talk to.
pub const STANDARD_PROVIDERS: &[&str] = &[
    "openai",
    "azure",
    "anthropic",
    "bedrock",
    "cohere",
    "vertex",
    "mistral",
    "ollama",
    "groq",
    "sgl",
    "parasail",
    "perplexity",
    "cerebras",
    "gemini",
    "openrouter",
    "elevenlabs",
    "huggingface"
];

/// Providers reachable without any credential.
const KEYLESS_PROVIDERS: &[&str] = &["ollama", "sgl"];

/// Providers whose keys may authenticate through their extension block.
const CREDENTIAL_CHAIN_PROVIDERS: &[&str] = &["bedrock", "vertex"];

#[must_use]
pub fn is_standard_provider(name: &str) -> bool {
    STANDARD_PROVIDERS.contains(&name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    #[default]
    Unknown,
    Healthy,
    Failing
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AzureKeyConfig {
    pub endpoint: EnvVar,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<EnvVar>,
    #[serde(default)]
    pub deployments: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<EnvVar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<EnvVar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<EnvVar>
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VertexKeyConfig {
    pub project_id: EnvVar,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_number: Option<EnvVar>,
    pub region: EnvVar,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_credentials: Option<EnvVar>,
    #[serde(default)]
    pub deployments: BTreeMap<String, String>
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BedrockKeyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<EnvVar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<EnvVar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<EnvVar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<EnvVar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<EnvVar>,
    #[serde(default)]
    pub deployments: BTreeMap<String, String>
}

/// One credential of a provider.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Validate)]
pub struct Key {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: EnvVar,
    #[serde(default)]
    pub models: Vec<String>,
    /// Unset means 1.0; an explicit 0 takes the key out of rotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_key_config: Option<AzureKeyConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertex_key_config: Option<VertexKeyConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedrock_key_config: Option<BedrockKeyConfig>,
    #[serde(default)]
    pub status: KeyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>
}

impl Key {
    #[must_use]
    pub fn effective_weight(&self) -> f64 {
        self.weight.unwrap_or(1.0)
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Name of the provider family the extension block belongs to, if any.
    fn extension_kind(&self) -> Result<Option<&'static str>, String> {
        let declared: Vec<&'static str> = [
            self.azure_key_config.as_ref().map(|_| "azure"),
            self.vertex_key_config.as_ref().map(|_| "vertex"),
            self.bedrock_key_config.as_ref().map(|_| "bedrock")
        ]
        .into_iter()
        .flatten()
        .collect();
        match declared.as_slice() {
            [] => Ok(None),
            [one] => Ok(Some(*one)),
            many => Err(format!("declares more than one extension block: {}", many.join(", ")))
        }
    }
}

impl EnvFields for Key {
    fn visit_env_fields(&mut self, path: &str, visit: &mut dyn FnMut(&str, &mut EnvVar, Requirement)) {
        visit(&format!("{path}.value"), &mut self.value, Requirement::Required);
        if let Some(azure) = &mut self.azure_key_config {
            let base = format!("{path}.azure_key_config");
            visit(&format!("{base}.endpoint"), &mut azure.endpoint, Requirement::Required);
            for (field, slot) in [
                ("api_version", &mut azure.api_version),
                ("client_id", &mut azure.client_id),
                ("client_secret", &mut azure.client_secret),
                ("tenant_id", &mut azure.tenant_id)
            ] {
                if let Some(var) = slot {
                    visit(&format!("{base}.{field}"), var, Requirement::Optional);
                }
            }
        }
        if let Some(vertex) = &mut self.vertex_key_config {
            let base = format!("{path}.vertex_key_config");
            visit(&format!("{base}.project_id"), &mut vertex.project_id, Requirement::Required);
            visit(&format!("{base}.region"), &mut vertex.region, Requirement::Required);
            for (field, slot) in [
                ("project_number", &mut vertex.project_number),
                ("auth_credentials", &mut vertex.auth_credentials)
            ] {
                if let Some(var) = slot {
                    visit(&format!("{base}.{field}"), var, Requirement::Optional);
                }
            }
        }
        if let Some(bedrock) = &mut self.bedrock_key_config {
            let base = format!("{path}.bedrock_key_config");
            for (field, slot) in [
                ("access_key", &mut bedrock.access_key),
                ("secret_key", &mut bedrock.secret_key),
                ("session_token", &mut bedrock.session_token),
                ("region", &mut bedrock.region),
                ("arn", &mut bedrock.arn)
            ] {
                if let Some(var) = slot {
                    visit(&format!("{base}.{field}"), var, Requirement::Optional);
                }
            }
        }
    }
}

impl Redact for Key {
    fn redacted(&self) -> Self {
        let mut key = self.clone();
        key.value = self.value.redacted();
        if let Some(azure) = &mut key.azure_key_config {
            azure.client_secret = azure.client_secret.redacted();
            azure.client_id = azure.client_id.redacted();
        }
        if let Some(vertex) = &mut key.vertex_key_config {
            vertex.auth_credentials = vertex.auth_credentials.redacted();
        }
        if let Some(bedrock) = &mut key.bedrock_key_config {
            bedrock.access_key = bedrock.access_key.redacted();
            bedrock.secret_key = bedrock.secret_key.redacted();
            bedrock.session_token = bedrock.session_token.redacted();
        }
        key
    }
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_backoff_initial_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,
    #[serde(default = "default_timeout_seconds")]
    pub default_request_timeout_in_seconds: u64,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_backoff_initial_ms")]
    pub retry_backoff_initial_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub retry_backoff_max_ms: u64
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            extra_headers: BTreeMap::new(),
            default_request_timeout_in_seconds: default_timeout_seconds(),
            max_retries: 0,
            retry_backoff_initial_ms: default_backoff_initial_ms(),
            retry_backoff_max_ms: default_backoff_max_ms()
        }
    }
}

fn default_concurrency() -> u32 {
    1000
}

fn default_buffer_size() -> u32 {
    5000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ConcurrencyAndBufferSize {
    #[serde(default = "default_concurrency")]
    #[validate(range(min = 1))]
    pub concurrency: u32,
    #[serde(default = "default_buffer_size")]
    #[validate(range(min = 1))]
    pub buffer_size: u32
}

impl Default for ConcurrencyAndBufferSize {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            buffer_size: default_buffer_size()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyType {
    #[default]
    None,
    Http,
    Socks5,
    Environment
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(rename = "type", default)]
    pub proxy_type: ProxyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<EnvVar>
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CustomProviderConfig {
    pub base_provider_type: String,
    #[serde(default)]
    pub is_key_less: bool,
    /// Request kinds the custom provider accepts; absent means all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_requests: Option<BTreeMap<String, bool>>
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Validate)]
pub struct PricingOverride {
    pub model: String,
    #[validate(range(min = 0.0))]
    pub input_cost_per_token: f64,
    #[validate(range(min = 0.0))]
    pub output_cost_per_token: f64
}

/// Everything the gateway knows about one upstream provider.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Validate)]
pub struct ProviderConfig {
    #[serde(default)]
    #[validate(nested)]
    pub keys: Vec<Key>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_config: Option<NetworkConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub concurrency_and_buffer_size: Option<ConcurrencyAndBufferSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_config: Option<ProxyConfig>,
    #[serde(default)]
    pub send_back_raw_response: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_provider_config: Option<CustomProviderConfig>,
    #[serde(default)]
    #[validate(nested)]
    pub pricing_overrides: Vec<PricingOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>
}

impl ProviderConfig {
    /// The provider family requests are translated for.
    #[must_use]
    pub fn base_type<'a>(&'a self, provider: &'a str) -> &'a str {
        self.custom_provider_config
            .as_ref()
            .map_or(provider, |custom| custom.base_provider_type.as_str())
    }

    fn is_key_less(&self, provider: &str) -> bool {
        self.custom_provider_config.as_ref().is_some_and(|c| c.is_key_less)
            || KEYLESS_PROVIDERS.contains(&self.base_type(provider))
    }

    #[must_use]
    pub fn key(&self, id: &str) -> Option<&Key> {
        self.keys.iter().find(|k| k.id == id)
    }

    /// Checks the structural invariants of a provider declared under `provider`.
    pub fn validate_for(&self, provider: &str) -> Result<(), ConfigError> {
        let entity = format!("provider {provider}");
        if provider.trim().is_empty() {
            return Err(ConfigError::validation(entity, "provider id must not be empty"));
        }
        self.validate().map_err(|e| validation_error(&entity, &e))?;

        if let Some(custom) = &self.custom_provider_config {
            if is_standard_provider(provider) {
                return Err(ConfigError::validation(
                    entity,
                    "a custom provider cannot reuse a standard provider name"
                ));
            }
            if !is_standard_provider(&custom.base_provider_type) {
                return Err(ConfigError::validation(
                    entity,
                    format!("unknown base provider type {}", custom.base_provider_type)
                ));
            }
        }

        if let Some(cb) = &self.concurrency_and_buffer_size {
            if cb.concurrency > cb.buffer_size {
                return Err(ConfigError::validation(
                    entity,
                    "concurrency must not exceed buffer_size"
                ));
            }
        }

        if let Some(network) = &self.network_config {
            if network.retry_backoff_initial_ms > network.retry_backoff_max_ms {
                return Err(ConfigError::validation(
                    entity,
                    "retry_backoff_initial_ms must not exceed retry_backoff_max_ms"
                ));
            }
        }

        if let Some(proxy) = &self.proxy_config {
            let needs_url = matches!(proxy.proxy_type, ProxyType::Http | ProxyType::Socks5);
            if needs_url && proxy.url.as_deref().is_none_or(str::is_empty) {
                return Err(ConfigError::validation(entity, "proxy type requires a url"));
            }
        }

        let base = self.base_type(provider);
        let mut seen = HashSet::new();
        for (i, key) in self.keys.iter().enumerate() {
            let label = if key.name.is_empty() { format!("#{i}") } else { key.name.clone() };
            if !key.id.is_empty() && !seen.insert(key.id.as_str()) {
                return Err(ConfigError::validation(
                    entity,
                    format!("duplicate key id {}", key.id)
                ));
            }
            let extension = key
                .extension_kind()
                .map_err(|reason| ConfigError::validation(&entity, format!("key {label} {reason}")))?;
            if let Some(kind) = extension {
                if kind != base {
                    return Err(ConfigError::validation(
                        entity,
                        format!("key {label} carries a {kind} extension but the provider base type is {base}")
                    ));
                }
            }
            if base == "azure" && key.azure_key_config.is_none() {
                return Err(ConfigError::validation(
                    entity,
                    format!("key {label} requires azure_key_config")
                ));
            }
            if base == "vertex" && key.vertex_key_config.is_none() {
                return Err(ConfigError::validation(
                    entity,
                    format!("key {label} requires vertex_key_config")
                ));
            }
            let value_optional =
                self.is_key_less(provider) || CREDENTIAL_CHAIN_PROVIDERS.contains(&base);
            if !value_optional && key.value.is_empty() {
                return Err(ConfigError::validation(
                    entity,
                    format!("key {label} has no value")
                ));
            }
        }
        Ok(())
    }
}

impl EnvFields for ProviderConfig {
    fn visit_env_fields(&mut self, path: &str, visit: &mut dyn FnMut(&str, &mut EnvVar, Requirement)) {
        for (i, key) in self.keys.iter_mut().enumerate() {
            key.visit_env_fields(&format!("{path}.keys[{i}]"), visit);
        }
        if let Some(password) = self.proxy_config.as_mut().and_then(|p| p.password.as_mut()) {
            visit(&format!("{path}.proxy_config.password"), password, Requirement::Optional);
        }
    }
}

impl Redact for ProviderConfig {
    fn redacted(&self) -> Self {
        let mut config = self.clone();
        config.keys = self.keys.iter().map(Redact::redacted).collect();
        if let Some(proxy) = &mut config.proxy_config {
            proxy.password = proxy.password.redacted();
        }
        if let Some(network) = &mut config.network_config {
            for (name, value) in &mut network.extra_headers {
                if utils::is_sensitive_field_name(name) {
                    *value = mask_secret(value);
                }
            }
        }
        config
    }
}
