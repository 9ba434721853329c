use errors::{ConfigError, PluginError};
use gateway::ConfigCache;
use gw_core::{
    BasePlugin, Budget, ClientConfig, ConfigStore, Customer, EntityKind, HeaderFilterConfig, PluginConfig,
    Redact, RoutingRule, RoutingScope, RoutingTarget, Team, VirtualKey, VirtualKeyMcpConfig
};
use plugins::{BuiltinPluginFactory, PluginState};
use std::sync::Arc;
use storage::InMemoryConfigStore;
use sync::Reconciler;
use testing::{
    FaultyStore, StubPlugin, budget, memory_store, plugin, sample_config, sample_env, virtual_key
};

struct Harness {
    memory: Arc<InMemoryConfigStore>,
    faulty: Arc<FaultyStore>,
    cache: ConfigCache
}

fn stub(plugin: StubPlugin) -> Result<Arc<dyn BasePlugin>, PluginError> {
    Ok(Arc::new(plugin))
}

async fn harness() -> Harness {
    let memory = memory_store();
    let faulty = Arc::new(FaultyStore::new(memory.clone()));
    let state = Reconciler::new(faulty.clone(), sample_env())
        .reconcile_all(&sample_config())
        .await;
    let factory = BuiltinPluginFactory::new()
        .with_plugin("telemetry", |_| stub(StubPlugin::new("telemetry").llm()))
        .with_plugin("audit", |_| stub(StubPlugin::new("audit").http()));
    let cache = ConfigCache::new(faulty.clone(), sample_env()).with_plugin_factory(Arc::new(factory));
    cache.populate(state).await;
    cache.load_plugins().await;
    Harness {
        memory,
        faulty,
        cache
    }
}

fn customer(id: &str, budget_id: Option<&str>) -> Customer {
    Customer {
        id: id.to_string(),
        name: id.to_string(),
        budget_id: budget_id.map(str::to_string),
        ..Customer::default()
    }
}

#[tokio::test]
async fn test_create_budget_generates_id_and_hash() {
    let h = harness().await;

    let created = h.cache.create_governance(budget("", 50.0)).await.unwrap();

    assert!(!created.id.is_empty());
    assert!(created.config_hash.is_some());
    assert!(h.memory.get_budgets().await.unwrap().iter().any(|b| b.id == created.id));
    assert!(h.cache.governance().await.budget(&created.id).is_some());
}

#[tokio::test]
async fn test_duplicate_id_rejected() {
    let h = harness().await;

    let err = h.cache.create_governance(budget("monthly", 10.0)).await.unwrap_err();

    assert!(matches!(err, ConfigError::AlreadyExists { .. }));
}

#[tokio::test]
async fn test_dangling_reference_rejected() {
    let h = harness().await;

    let err = h
        .cache
        .create_governance(customer("acme", Some("quarterly")))
        .await
        .unwrap_err();

    assert!(matches!(err, ConfigError::ValidationFailure { .. }));
    assert!(h.memory.get_customers().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_referenced_entity_cannot_be_deleted() {
    // GIVEN a customer pointing at the monthly budget
    let h = harness().await;
    h.cache
        .create_governance(customer("acme", Some("monthly")))
        .await
        .unwrap();

    // WHEN the budget is deleted
    let err = h.cache.delete_governance::<Budget>("monthly").await.unwrap_err();

    // THEN the delete is refused, naming the holder
    assert!(err.to_string().contains("customer acme"));
    assert!(h.cache.governance().await.budget("monthly").is_some());

    // AND it succeeds once the customer is gone
    h.cache.delete_governance::<Customer>("acme").await.unwrap();
    h.cache.delete_governance::<Budget>("monthly").await.unwrap();
    assert!(h.memory.get_budgets().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_keeps_usage_counters() {
    // GIVEN a budget with usage recorded
    let h = harness().await;
    let mut quarterly = budget("quarterly", 100.0);
    quarterly.current_usage = 12.5;
    h.cache.create_governance(quarterly).await.unwrap();

    // WHEN the limit is raised by a caller that knows nothing of usage
    let updated = h
        .cache
        .update_governance("quarterly", budget("quarterly", 250.0))
        .await
        .unwrap();

    // THEN the new limit is stored with the usage carried over
    assert!((updated.current_usage - 12.5).abs() < f64::EPSILON);
    let stored = h
        .memory
        .get_budgets()
        .await
        .unwrap()
        .into_iter()
        .find(|b| b.id == "quarterly")
        .unwrap();
    assert!((stored.max_limit - 250.0).abs() < f64::EPSILON);
    assert!((stored.current_usage - 12.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_budget_edit_survives_reconcile_of_unchanged_file() {
    // GIVEN the file-declared monthly budget raised through the admin surface
    let h = harness().await;
    let synced = h.cache.governance().await.budget("monthly").cloned().unwrap();
    let updated = h
        .cache
        .update_governance("monthly", budget("monthly", 400.0))
        .await
        .unwrap();
    assert_eq!(updated.config_hash, synced.config_hash);

    // WHEN the unchanged file is reconciled again
    let state = Reconciler::new(h.memory.clone(), sample_env())
        .reconcile_all(&sample_config())
        .await;

    // THEN the raised limit is kept
    assert_eq!(state.report.collection("budgets").unwrap().updated, 0);
    let monthly = state.governance.budget("monthly").unwrap();
    assert!((monthly.max_limit - 400.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_store_failure_rolls_back_create() {
    let h = harness().await;
    h.faulty.fail_writes_to(EntityKind::Team);

    let team = Team {
        id: "platform".to_string(),
        name: "Platform".to_string(),
        ..Team::default()
    };
    let err = h.cache.create_governance(team).await.unwrap_err();

    assert!(matches!(err, ConfigError::TransactionFailure { ref collection, .. } if collection == "teams"));
    assert!(h.cache.governance().await.teams.is_empty());
}

#[tokio::test]
async fn test_virtual_key_with_associations() {
    // GIVEN a new virtual key routed to openai with one MCP tool config
    let h = harness().await;
    let mut vk = virtual_key("vk-dev", &["openai"]);
    vk.value = String::new();
    vk.mcp_configs.push(VirtualKeyMcpConfig {
        mcp_client_name: "docs".to_string(),
        tools_to_execute: vec!["search".to_string()],
        ..VirtualKeyMcpConfig::default()
    });

    // WHEN it is created
    let created = h.cache.create_governance(vk).await.unwrap();

    // THEN it has a generated secret and its associations are stored under it
    assert!(created.value.starts_with("sk-gw-"));
    let stored = h
        .memory
        .get_virtual_keys()
        .await
        .unwrap()
        .into_iter()
        .find(|v| v.id == "vk-dev")
        .unwrap();
    assert_eq!(stored.provider_configs.len(), 1);
    assert_eq!(stored.mcp_configs.len(), 1);

    // WHEN the redacted view is sent back without the MCP config
    let mut incoming: VirtualKey = h
        .cache
        .redacted_virtual_keys()
        .await
        .into_iter()
        .find(|v| v.id == "vk-dev")
        .unwrap();
    assert_ne!(incoming.value, created.value);
    incoming.mcp_configs.clear();
    h.cache.update_governance("vk-dev", incoming).await.unwrap();

    // THEN the association is deleted and the secret is unchanged
    let stored = h
        .memory
        .get_virtual_keys()
        .await
        .unwrap()
        .into_iter()
        .find(|v| v.id == "vk-dev")
        .unwrap();
    assert!(stored.mcp_configs.is_empty());
    assert_eq!(stored.value, created.value);
}

#[tokio::test]
async fn test_virtual_key_unknown_provider_rejected() {
    let h = harness().await;

    let err = h
        .cache
        .create_governance(virtual_key("vk-bad", &["cohere"]))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("provider cohere does not exist"));
}

#[tokio::test]
async fn test_scoped_routing_rule_pins_its_team() {
    // GIVEN a team and a routing rule scoped to it
    let h = harness().await;
    let team = Team {
        id: "research".to_string(),
        name: "Research".to_string(),
        ..Team::default()
    };
    h.cache.create_governance(team).await.unwrap();
    let rule = RoutingRule {
        id: "research-claude".to_string(),
        name: "research to claude".to_string(),
        description: None,
        enabled: true,
        condition: "model == 'gpt-4o'".to_string(),
        targets: vec![RoutingTarget {
            provider: "anthropic".to_string(),
            model: None,
            weight: 1.0
        }],
        fallbacks: Vec::new(),
        scope: RoutingScope::Team,
        scope_id: Some("research".to_string()),
        priority: 10,
        config_hash: None
    };
    h.cache.create_governance(rule).await.unwrap();

    // WHEN the team is deleted
    let err = h.cache.delete_governance::<Team>("research").await.unwrap_err();

    // THEN the rule holds it in place
    assert!(err.to_string().contains("routing_rule research-claude"));
}

#[tokio::test]
async fn test_client_config_update_publishes_request_settings() {
    // GIVEN default request settings
    let h = harness().await;
    assert!(h.cache.request_settings().allows_header("cookie"));

    // WHEN the client config is updated
    let config = ClientConfig {
        allowed_origins: vec!["https://console.example.com".to_string()],
        header_filter_config: Some(HeaderFilterConfig {
            allowlist: Vec::new(),
            denylist: vec!["cookie".to_string()]
        }),
        ..ClientConfig::default()
    };
    h.cache.update_client_config(config).await.unwrap();

    // THEN readers see the new settings without taking a lock
    let settings = h.cache.request_settings();
    assert!(!settings.allows_header("Cookie"));
    assert!(settings.allows_origin("https://console.example.com"));
    let stored = h.memory.get_client_config().await.unwrap().unwrap();
    assert_eq!(stored.allowed_origins, vec!["https://console.example.com".to_string()]);
}

#[tokio::test]
async fn test_client_config_store_failure_keeps_settings() {
    let h = harness().await;
    h.faulty.fail_writes_to(EntityKind::ClientConfig);

    let config = ClientConfig {
        enable_logging: false,
        ..ClientConfig::default()
    };
    let err = h.cache.update_client_config(config).await.unwrap_err();

    assert!(matches!(err, ConfigError::TransactionFailure { .. }));
    assert!(h.cache.request_settings().enable_logging);
    assert!(h.cache.client_config().await.enable_logging);
}

#[tokio::test]
async fn test_plugins_loaded_at_boot() {
    let h = harness().await;

    assert_eq!(h.cache.llm_plugins().len(), 1);
    assert_eq!(h.cache.loaded_plugins().names(), vec!["telemetry".to_string()]);
    let status = h.cache.plugin_registry().status("telemetry").unwrap();
    assert_eq!(status.status, PluginState::Active);
}

#[tokio::test]
async fn test_reload_plugin_persists_and_loads() {
    let h = harness().await;

    h.cache.reload_plugin(plugin("audit", true)).await.unwrap();

    assert_eq!(h.cache.http_transport_plugins().len(), 1);
    assert!(h.memory.get_plugins().await.unwrap().iter().any(|p| p.name == "audit"));
    assert!(h.cache.plugin_configs().await.iter().any(|p| p.name == "audit"));
}

#[tokio::test]
async fn test_failed_plugin_keeps_config_and_error_status() {
    let h = harness().await;

    let err = h.cache.reload_plugin(plugin("unknown", true)).await.unwrap_err();

    assert!(matches!(err, ConfigError::Plugin(PluginError::LoadFailed { .. })));
    assert!(h.memory.get_plugins().await.unwrap().iter().any(|p| p.name == "unknown"));
    let status = h.cache.plugin_registry().status("unknown").unwrap();
    assert_eq!(status.status, PluginState::Error);
}

#[tokio::test]
async fn test_disabling_plugin_unloads_it() {
    let h = harness().await;

    h.cache.reload_plugin(plugin("telemetry", false)).await.unwrap();

    assert!(h.cache.llm_plugins().is_empty());
    let status = h.cache.plugin_registry().status("telemetry").unwrap();
    assert_eq!(status.status, PluginState::Disabled);
    let stored = h.memory.get_plugins().await.unwrap();
    assert!(!stored.iter().find(|p| p.name == "telemetry").unwrap().enabled);
}

#[tokio::test]
async fn test_unregister_is_runtime_only() {
    let h = harness().await;

    h.cache.unregister_plugin("telemetry").await.unwrap();

    assert!(h.cache.loaded_plugins().is_empty());
    assert!(h.memory.get_plugins().await.unwrap().iter().any(|p| p.name == "telemetry"));
    assert!(matches!(
        h.cache.unregister_plugin("telemetry").await,
        Err(ConfigError::Plugin(PluginError::NotFound { .. }))
    ));
}

#[tokio::test]
async fn test_delete_plugin_removes_everything() {
    let h = harness().await;

    h.cache.delete_plugin("telemetry").await.unwrap();

    assert!(h.cache.loaded_plugins().is_empty());
    assert!(h.cache.plugin_registry().status("telemetry").is_none());
    assert!(h.memory.get_plugins().await.unwrap().is_empty());
    assert!(h.cache.plugin_configs().await.is_empty());
}

#[tokio::test]
async fn test_plugin_configs_are_redacted() {
    let h = harness().await;
    let config = PluginConfig {
        config: Some(serde_json::json!({"api_key": "pk-live-0123456789abcdef", "ttl": 60})),
        ..plugin("audit", true)
    };
    h.cache.reload_plugin(config.clone()).await.unwrap();

    let shown = h
        .cache
        .plugin_configs()
        .await
        .into_iter()
        .find(|p| p.name == "audit")
        .unwrap();

    assert_eq!(shown.config, config.redacted().config);
    assert_ne!(shown.config, config.config);
}
