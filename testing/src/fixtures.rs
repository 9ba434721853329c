use config::{GatewayConfigFile, McpSection};
use gw_core::{
    Budget, EnvVar, GovernanceConfig, Key, McpClientConfig, McpConnection, PluginConfig,
    ProviderConfig, VirtualKey, VirtualKeyProviderConfig
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use storage::InMemoryConfigStore;

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

pub fn unique_id(prefix: &str) -> String {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}", prefix, id)
}

/// Environment backed by a map, so tests never touch the process env.
pub fn map_env(vars: &[(&str, &str)]) -> Arc<HashMap<String, String>> {
    Arc::new(
        vars.iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    )
}

/// The variables [`sample_config`] refers to.
pub fn sample_env() -> Arc<HashMap<String, String>> {
    map_env(&[
        ("OPENAI_API_KEY", "sk-openai-test-0000000000"),
        ("ANTHROPIC_API_KEY", "sk-ant-test-0000000000"),
        ("DOCS_MCP_URL", "https://mcp.internal/docs")
    ])
}

pub fn memory_store() -> Arc<InMemoryConfigStore> {
    Arc::new(InMemoryConfigStore::new())
}

/// A key whose value is read from `var`.
pub fn env_key(id: &str, name: &str, var: &str) -> Key {
    Key {
        id: id.to_string(),
        name: name.to_string(),
        value: EnvVar::from_env(var),
        models: Vec::new(),
        weight: Some(1.0),
        ..Key::default()
    }
}

pub fn provider(keys: Vec<Key>) -> ProviderConfig {
    ProviderConfig {
        keys,
        ..ProviderConfig::default()
    }
}

pub fn http_mcp_client(name: &str, url_var: &str) -> McpClientConfig {
    McpClientConfig {
        id: String::new(),
        name: name.to_string(),
        connection: McpConnection::Http {
            connection_string: EnvVar::from_env(url_var)
        },
        headers: BTreeMap::new(),
        tools_to_execute: vec!["*".to_string()],
        tools_to_auto_execute: Vec::new(),
        tool_pricing: BTreeMap::new(),
        config_hash: None
    }
}

pub fn budget(id: &str, max_limit: f64) -> Budget {
    Budget {
        id: id.to_string(),
        max_limit,
        reset_duration: "1M".to_string(),
        ..Budget::default()
    }
}

pub fn virtual_key(id: &str, providers: &[&str]) -> VirtualKey {
    VirtualKey {
        id: id.to_string(),
        name: id.to_string(),
        value: format!("sk-gw-{id}"),
        provider_configs: providers
            .iter()
            .map(|p| VirtualKeyProviderConfig {
                provider: (*p).to_string(),
                weight: Some(1.0),
                ..VirtualKeyProviderConfig::default()
            })
            .collect(),
        ..VirtualKey::default()
    }
}

pub fn plugin(name: &str, enabled: bool) -> PluginConfig {
    PluginConfig {
        name: name.to_string(),
        enabled,
        ..PluginConfig::default()
    }
}

/// Two providers, an MCP client, a budget, a virtual key and a plugin, all
/// resolvable against [`sample_env`].
pub fn sample_config() -> GatewayConfigFile {
    let mut providers = BTreeMap::new();
    providers.insert(
        "openai".to_string(),
        provider(vec![env_key("openai-primary", "primary", "OPENAI_API_KEY")])
    );
    providers.insert(
        "anthropic".to_string(),
        provider(vec![env_key("", "claude", "ANTHROPIC_API_KEY")])
    );

    GatewayConfigFile {
        schema: Some(config::SCHEMA_ID.to_string()),
        providers: Some(providers),
        mcp: Some(McpSection {
            client_configs: vec![http_mcp_client("docs", "DOCS_MCP_URL")]
        }),
        governance: Some(GovernanceConfig {
            budgets: vec![budget("monthly", 100.0)],
            virtual_keys: vec![virtual_key("vk-ci", &["openai", "anthropic"])],
            ..GovernanceConfig::default()
        }),
        plugins: Some(vec![plugin("telemetry", true)]),
        ..GatewayConfigFile::default()
    }
}

/// Parses a JSON document into a config file, panicking on bad input.
pub fn config_from_json(value: serde_json::Value) -> GatewayConfigFile {
    match config::parse_document(value) {
        Ok(file) => file,
        Err(e) => panic!("invalid test config: {e}")
    }
}
