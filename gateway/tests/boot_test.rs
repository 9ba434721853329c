use config::{ENCRYPTION_KEY_ENV, GatewaySettings};
use errors::ConfigError;
use gateway::Bootstrap;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use testing::{LogCapture, map_env, sample_env};

const LITERAL_SECRET: &str = "sk-literal-0123456789abcdef";

fn write_config(dir: &Path, document: &Value) -> PathBuf {
    let path = dir.join("config.json");
    std::fs::write(&path, serde_json::to_vec_pretty(document).unwrap()).unwrap();
    path
}

fn sample_document() -> Value {
    json!({
        "$schema": config::SCHEMA_ID,
        "client": { "enable_logging": false },
        "providers": {
            "openai": {
                "keys": [
                    { "id": "openai-primary", "name": "primary", "value": "env.OPENAI_API_KEY" }
                ]
            }
        },
        "mcp": {
            "client_configs": [
                {
                    "name": "docs",
                    "connection_type": "http",
                    "connection_string": "env.DOCS_MCP_URL"
                }
            ]
        },
        "governance": {
            "budgets": [{ "id": "monthly", "max_limit": 100.0, "reset_duration": "1M" }]
        }
    })
}

#[tokio::test]
async fn test_boot_from_config_file() {
    // GIVEN a config file declaring a provider, an MCP client and a budget
    let dir = TempDir::new().unwrap();
    let path = write_config(dir.path(), &sample_document());

    // WHEN the gateway boots from it
    let gateway = Bootstrap::new()
        .with_config_path(&path)
        .with_env(sample_env())
        .boot()
        .await
        .unwrap();

    // THEN the cache holds resolved entities and the client settings
    let cache = gateway.cache();
    assert_eq!(cache.provider_names().await, vec!["openai".to_string()]);
    let openai = cache.resolved_provider("openai").await.unwrap();
    assert_eq!(openai.keys[0].value.value(), Some("sk-openai-test-0000000000"));
    assert_eq!(cache.resolved_mcp_clients().await.len(), 1);
    assert!(cache.governance().await.budget("monthly").is_some());
    assert!(!cache.request_settings().enable_logging);

    // AND the report accounts for every write
    assert!(gateway.report().total_writes() > 0);
    assert!(gateway.report().failures().is_empty());
    assert_eq!(gateway.store().backend(), "memory");
}

#[tokio::test]
async fn test_wrong_section_type_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = write_config(dir.path(), &json!({ "providers": ["openai"] }));

    let result = Bootstrap::new()
        .with_config_path(&path)
        .with_env(sample_env())
        .boot()
        .await;

    assert!(matches!(result, Err(ConfigError::ValidationFailure { .. })));
}

#[tokio::test]
async fn test_unparseable_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ \"providers\": ").unwrap();

    let result = Bootstrap::new().with_config_path(&path).boot().await;

    assert!(matches!(result, Err(ConfigError::Parse { .. })));
}

#[tokio::test]
async fn test_missing_file_is_fatal() {
    let dir = TempDir::new().unwrap();

    let result = Bootstrap::new()
        .with_config_path(dir.path().join("absent.json"))
        .boot()
        .await;

    assert!(matches!(result, Err(ConfigError::Io { .. })));
}

#[tokio::test]
async fn test_schema_mismatch_only_warns() {
    // GIVEN a file declaring another schema version
    let dir = TempDir::new().unwrap();
    let mut document = sample_document();
    document["$schema"] = json!("gateway-config/v0");
    let path = write_config(dir.path(), &document);
    let logs = LogCapture::new();

    // WHEN the gateway boots
    let gateway = Bootstrap::new()
        .with_config_path(&path)
        .with_env(sample_env())
        .with_dispatch(logs.dispatch())
        .boot()
        .await
        .unwrap();

    // THEN it is running and the operator was told
    assert_eq!(gateway.cache().provider_names().await.len(), 1);
    assert!(logs.contains("declares $schema gateway-config/v0"));
}

#[tokio::test]
async fn test_boot_logs_to_injected_dispatch() {
    let dir = TempDir::new().unwrap();
    let path = write_config(dir.path(), &sample_document());
    let logs = LogCapture::new();

    Bootstrap::new()
        .with_config_path(&path)
        .with_env(sample_env())
        .with_dispatch(logs.dispatch())
        .boot()
        .await
        .unwrap();

    assert!(logs.contains("Config file loaded"));
    assert!(logs.contains("Gateway control plane ready"));
}

#[tokio::test]
async fn test_auto_detects_providers_without_config_file() {
    let env = map_env(&[
        ("OPENAI_API_KEY", "sk-openai-test-0000000000"),
        ("GROQ_API_KEY", "gsk-test-0000000000")
    ]);

    let gateway = Bootstrap::new().with_env(env).boot().await.unwrap();

    let cache = gateway.cache();
    assert_eq!(
        cache.provider_names().await,
        vec!["groq".to_string(), "openai".to_string()]
    );
    let groq = cache.resolved_provider("groq").await.unwrap();
    assert_eq!(groq.keys[0].id, "groq-env");
    assert_eq!(groq.keys[0].value.value(), Some("gsk-test-0000000000"));
}

#[tokio::test]
async fn test_auto_detect_only_on_first_boot() {
    // GIVEN a store seeded by a first boot that detected anthropic
    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("store.json");
    Bootstrap::new()
        .with_store_path(&store_path)
        .with_env(map_env(&[("ANTHROPIC_API_KEY", "sk-ant-test-0000000000")]))
        .boot()
        .await
        .unwrap();

    // WHEN the gateway boots again with another provider's variable set
    let gateway = Bootstrap::new()
        .with_store_path(&store_path)
        .with_env(map_env(&[
            ("ANTHROPIC_API_KEY", "sk-ant-test-0000000000"),
            ("OPENAI_API_KEY", "sk-openai-test-0000000000")
        ]))
        .boot()
        .await
        .unwrap();

    // THEN the stored providers are used as they are
    assert_eq!(gateway.cache().provider_names().await, vec!["anthropic".to_string()]);
    assert!(gateway.store().get_provider("openai").await.unwrap().is_none());
}

#[tokio::test]
async fn test_config_store_section_selects_snapshot_file() {
    // GIVEN a config file pointing the store at a path relative to the app dir
    let dir = TempDir::new().unwrap();
    let mut document = sample_document();
    document["config_store"] = json!({
        "enabled": true,
        "type": "file",
        "config": { "path": "state/store.json" }
    });
    write_config(dir.path(), &document);
    std::fs::create_dir_all(dir.path().join("state")).unwrap();
    let settings = GatewaySettings {
        app_dir: dir.path().to_path_buf(),
        ..GatewaySettings::default()
    };

    // WHEN the gateway boots from process settings
    let gateway = Bootstrap::from_settings(&settings)
        .with_env(sample_env())
        .boot()
        .await
        .unwrap();

    // THEN the default config file was found and the snapshot written
    assert_eq!(gateway.cache().provider_names().await, vec!["openai".to_string()]);
    assert!(dir.path().join("state/store.json").is_file());
}

#[tokio::test]
async fn test_unsupported_store_type_is_fatal() {
    let dir = TempDir::new().unwrap();
    let mut document = sample_document();
    document["config_store"] = json!({ "enabled": true, "type": "postgres" });
    let path = write_config(dir.path(), &document);

    let result = Bootstrap::new()
        .with_config_path(&path)
        .with_env(sample_env())
        .boot()
        .await;

    assert!(matches!(result, Err(ConfigError::Storage(_))));
}

#[tokio::test]
async fn test_encryption_key_backfills_plaintext_rows() {
    // GIVEN a store written without an encryption key
    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("store.json");
    let path = write_config(
        dir.path(),
        &json!({
            "providers": {
                "openai": { "keys": [{ "id": "k1", "name": "inline", "value": LITERAL_SECRET }] }
            }
        })
    );
    Bootstrap::new()
        .with_config_path(&path)
        .with_store_path(&store_path)
        .with_env(map_env(&[]))
        .boot()
        .await
        .unwrap();
    assert!(std::fs::read_to_string(&store_path).unwrap().contains(LITERAL_SECRET));

    // WHEN it boots again with a key in the environment
    let logs = LogCapture::new();
    let gateway = Bootstrap::new()
        .with_config_path(&path)
        .with_store_path(&store_path)
        .with_env(map_env(&[(ENCRYPTION_KEY_ENV, "correct-horse-battery-staple")]))
        .with_dispatch(logs.dispatch())
        .boot()
        .await
        .unwrap();

    // THEN the secret is no longer readable on disk but still served
    assert!(logs.contains("Encrypted plaintext config rows"));
    assert!(!std::fs::read_to_string(&store_path).unwrap().contains(LITERAL_SECRET));
    let openai = gateway.cache().resolved_provider("openai").await.unwrap();
    assert_eq!(openai.keys[0].value.value(), Some(LITERAL_SECRET));
}

#[tokio::test]
async fn test_encrypted_store_reopens_with_same_key() {
    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("store.json");
    let path = write_config(
        dir.path(),
        &json!({
            "encryption_key": "env.STORE_KEY",
            "providers": {
                "openai": { "keys": [{ "id": "k1", "name": "inline", "value": LITERAL_SECRET }] }
            }
        })
    );
    let env = map_env(&[("STORE_KEY", "correct-horse-battery-staple")]);

    for _ in 0..2 {
        let gateway = Bootstrap::new()
            .with_config_path(&path)
            .with_store_path(&store_path)
            .with_env(env.clone())
            .boot()
            .await
            .unwrap();
        let openai = gateway.cache().resolved_provider("openai").await.unwrap();
        assert_eq!(openai.keys[0].value.value(), Some(LITERAL_SECRET));
    }
    assert!(!std::fs::read_to_string(&store_path).unwrap().contains(LITERAL_SECRET));
}
