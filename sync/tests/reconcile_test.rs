use gw_core::{
    ClientConfig, ConfigStore, EntityKind, EnvVar, KeyStatus, ProviderConfig, Record, VirtualKey
};
use std::collections::BTreeMap;
use std::sync::Arc;
use sync::{ReconciledState, Reconciler};
use testing::{
    FaultyStore, LogCapture, env_key, map_env, memory_store, provider, sample_config, sample_env,
    virtual_key
};

async fn reconcile(store: Arc<dyn ConfigStore>, file: &config::GatewayConfigFile) -> ReconciledState {
    Reconciler::new(store, sample_env()).reconcile_all(file).await
}

fn by_id(vks: Vec<VirtualKey>) -> BTreeMap<String, VirtualKey> {
    vks.into_iter().map(|vk| (vk.id.clone(), vk)).collect()
}

#[tokio::test]
async fn test_second_pass_writes_nothing() {
    // GIVEN an empty store and a file declaring every collection
    let store = memory_store();
    let file = sample_config();

    // WHEN the file is reconciled twice
    let first = reconcile(store.clone(), &file).await;
    let transactions = store.committed_transactions();
    let second = reconcile(store.clone(), &file).await;

    // THEN the first pass creates, the second finds nothing to do
    assert!(first.report.failures().is_empty());
    assert_eq!(first.report.collection("providers").unwrap().created, 2);
    assert_eq!(first.report.collection("keys").unwrap().created, 2);
    assert_eq!(first.report.collection("mcp_clients").unwrap().created, 1);
    assert_eq!(first.report.collection("virtual_key_provider_configs").unwrap().created, 2);

    assert_eq!(second.report.total_writes(), 0);
    assert_eq!(store.committed_transactions(), transactions);
    assert_eq!(second.report.collection("keys").unwrap().unchanged, 2);
    assert_eq!(second.providers, first.providers);
    assert_eq!(second.governance, first.governance);
    assert_eq!(second.mcp_clients, first.mcp_clients);
}

#[tokio::test]
async fn test_runtime_state_matches_store() {
    // GIVEN a reconciled sample config
    let store = memory_store();
    let state = reconcile(store.clone(), &sample_config()).await;

    // THEN every collection handed back equals what the store holds
    assert_eq!(state.providers, store.get_providers().await.unwrap());
    assert_eq!(state.mcp_clients, store.get_mcp_clients().await.unwrap());
    assert_eq!(state.governance.budgets, store.get_budgets().await.unwrap());
    assert_eq!(
        by_id(state.governance.virtual_keys.clone()),
        by_id(store.get_virtual_keys().await.unwrap())
    );
    assert_eq!(state.plugins, store.get_plugins().await.unwrap());

    // AND secrets are persisted as references
    let openai = &state.providers["openai"];
    assert_eq!(openai.keys[0].value.reference(), "env.OPENAI_API_KEY");
    assert!(openai.keys.iter().all(|k| k.config_hash.is_some()));
}

#[tokio::test]
async fn test_changed_key_is_updated_in_place() {
    // GIVEN a reconciled key that the admin surface marked failing
    let store = memory_store();
    reconcile(store.clone(), &sample_config()).await;
    let mut stored_key = store.get_keys("openai").await.unwrap().remove(0);
    stored_key.status = KeyStatus::Failing;
    store
        .update(Record::Key {
            provider: "openai".to_string(),
            key: stored_key.clone()
        })
        .await
        .unwrap();

    // WHEN the file points the key at another variable
    let mut file = sample_config();
    file.providers.as_mut().unwrap().insert(
        "openai".to_string(),
        provider(vec![env_key("openai-primary", "primary", "ANTHROPIC_API_KEY")])
    );
    let state = reconcile(store.clone(), &file).await;

    // THEN the key is updated, keeping its id and its admin-owned status
    let keys = state.report.collection("keys").unwrap();
    assert_eq!((keys.updated, keys.unchanged), (1, 1));
    let key = &store.get_keys("openai").await.unwrap()[0];
    assert_eq!(key.id, "openai-primary");
    assert_eq!(key.status, KeyStatus::Failing);
    assert_eq!(key.value, EnvVar::from_env("ANTHROPIC_API_KEY"));
    assert_ne!(key.config_hash, stored_key.config_hash);
}

#[tokio::test]
async fn test_entities_missing_from_file_are_preserved() {
    // GIVEN a provider and a key added through the admin surface
    let store = memory_store();
    reconcile(store.clone(), &sample_config()).await;
    store
        .create(Record::Provider {
            id: "groq".to_string(),
            config: ProviderConfig::default()
        })
        .await
        .unwrap();
    store
        .create(Record::Key {
            provider: "openai".to_string(),
            key: env_key("openai-admin", "admin", "OPENAI_API_KEY")
        })
        .await
        .unwrap();

    // WHEN the unchanged file is reconciled again
    let state = reconcile(store.clone(), &sample_config()).await;

    // THEN nothing is deleted and both admin entities are in the runtime state
    assert_eq!(state.report.total_writes(), 0);
    assert!(state.providers.contains_key("groq"));
    let ids: Vec<&str> = state.providers["openai"].keys.iter().map(|k| k.id.as_str()).collect();
    assert_eq!(ids, vec!["openai-primary", "openai-admin"]);
}

#[tokio::test]
async fn test_provider_with_missing_required_env_is_not_admitted() {
    // GIVEN an environment without ANTHROPIC_API_KEY
    let store = memory_store();
    let env = map_env(&[
        ("OPENAI_API_KEY", "sk-openai-test-0000000000"),
        ("DOCS_MCP_URL", "https://mcp.internal/docs")
    ]);

    // WHEN the sample config is reconciled
    let state = Reconciler::new(store.clone(), env)
        .reconcile_all(&sample_config())
        .await;

    // THEN anthropic is skipped and never persisted
    let providers = state.report.collection("providers").unwrap();
    assert_eq!((providers.created, providers.skipped), (1, 1));
    assert!(!state.providers.contains_key("anthropic"));
    assert!(store.get_provider("anthropic").await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_transaction_leaves_collection_at_stored_state() {
    // GIVEN a store that rejects budget writes
    let store = Arc::new(FaultyStore::new(memory_store()));
    store.fail_writes_to(EntityKind::Budget);

    // WHEN the sample config is reconciled
    let state = reconcile(store.clone(), &sample_config()).await;

    // THEN only the budget collection failed, with no writes and no budgets
    let failures = state.report.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].collection, "budgets");
    assert_eq!(failures[0].writes(), 0);
    assert!(state.governance.budgets.is_empty());
    assert_eq!(store.rejected_transactions(), 1);

    // AND the other collections committed
    assert_eq!(state.providers.len(), 2);
    assert_eq!(store.get_virtual_keys().await.unwrap().len(), 1);

    // WHEN the store recovers, the next pass creates the budget
    store.heal();
    let retry = reconcile(store.clone(), &sample_config()).await;
    assert_eq!(retry.report.collection("budgets").unwrap().created, 1);
    assert_eq!(retry.report.total_writes(), 1);
}

#[tokio::test]
async fn test_failed_read_marks_collection_failed() {
    let store = Arc::new(FaultyStore::new(memory_store()));
    store.fail_reads_of(EntityKind::Plugin);

    let state = reconcile(store.clone(), &sample_config()).await;

    let plugins = state.report.collection("plugins").unwrap();
    assert!(plugins.failed.as_deref().unwrap().contains("injected read failure"));
    assert!(state.plugins.is_empty());
    assert_eq!(state.governance.budgets.len(), 1);
}

#[tokio::test]
async fn test_unhashable_key_is_skipped() {
    // GIVEN a key whose weight cannot be hashed
    let store = memory_store();
    let mut file = sample_config();
    let mut broken = env_key("openai-primary", "primary", "OPENAI_API_KEY");
    broken.weight = Some(f64::NAN);
    file.providers
        .as_mut()
        .unwrap()
        .insert("openai".to_string(), provider(vec![broken]));

    // WHEN it is reconciled
    let state = reconcile(store.clone(), &file).await;

    // THEN the provider is created without that key and the pass completes
    let keys = state.report.collection("keys").unwrap();
    assert_eq!((keys.created, keys.skipped), (1, 1));
    assert!(state.providers["openai"].keys.is_empty());
    assert!(state.report.failures().is_empty());
}

#[tokio::test]
async fn test_virtual_key_associations_follow_the_file() {
    // GIVEN a virtual key routed to two providers, and one absent from later files
    let store = memory_store();
    let mut file = sample_config();
    file.governance
        .as_mut()
        .unwrap()
        .virtual_keys
        .push(virtual_key("vk-ops", &["openai"]));
    reconcile(store.clone(), &file).await;

    // WHEN vk-ci drops anthropic and vk-ops disappears from the file
    let mut file = sample_config();
    file.governance.as_mut().unwrap().virtual_keys = vec![virtual_key("vk-ci", &["openai"])];
    let state = reconcile(store.clone(), &file).await;

    // THEN the dropped association is deleted and vk-ops is left alone
    let associations = state.report.collection("virtual_key_provider_configs").unwrap();
    assert_eq!((associations.deleted, associations.unchanged), (1, 1));

    let stored = by_id(store.get_virtual_keys().await.unwrap());
    let ci: Vec<&str> = stored["vk-ci"]
        .provider_configs
        .iter()
        .map(|p| p.provider.as_str())
        .collect();
    assert_eq!(ci, vec!["openai"]);
    assert_eq!(stored["vk-ops"].provider_configs.len(), 1);
    assert_eq!(by_id(state.governance.virtual_keys), stored);
}

#[tokio::test]
async fn test_client_config_is_written_once() {
    let store = memory_store();
    let mut file = sample_config();
    file.client = Some(ClientConfig {
        initial_pool_size: 64,
        ..ClientConfig::default()
    });

    let first = reconcile(store.clone(), &file).await;
    let second = reconcile(store.clone(), &file).await;

    assert_eq!(first.report.collection("client_config").unwrap().created, 1);
    assert_eq!(second.report.collection("client_config").unwrap().unchanged, 1);
    assert_eq!(second.client_config.initial_pool_size, 64);
    assert!(store.get_client_config_hash().await.unwrap().is_some());
}

#[tokio::test]
async fn test_absent_sections_return_stored_state() {
    let store = memory_store();
    reconcile(store.clone(), &sample_config()).await;

    let state = reconcile(store.clone(), &config::GatewayConfigFile::default()).await;

    assert_eq!(state.report.total_writes(), 0);
    assert_eq!(state.providers.len(), 2);
    assert_eq!(state.governance.virtual_keys.len(), 1);
    assert_eq!(state.client_config, ClientConfig::default());
}

#[tokio::test]
async fn test_logs_go_to_injected_dispatch() {
    // GIVEN a reconciler with its own log capture
    let capture = LogCapture::new();
    let reconciler =
        Reconciler::new(memory_store(), sample_env()).with_dispatch(capture.dispatch());

    // WHEN it runs with a provider that fails validation
    let mut file = sample_config();
    let mut bad = provider(vec![env_key("k", "k", "OPENAI_API_KEY")]);
    bad.keys[0].weight = Some(-1.0);
    file.providers.as_mut().unwrap().insert("mistral".to_string(), bad);
    reconciler.reconcile_all(&file).await;

    // THEN the capture saw the skip and the summary
    assert_eq!(capture.with_field("provider", "mistral").len(), 1);
    assert!(capture.contains("Reconciliation finished"));
    assert!(capture.count(tracing::Level::ERROR) >= 1);
}
