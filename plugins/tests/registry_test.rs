use gw_core::{BasePlugin, PluginConfig};
use plugins::{BuiltinPluginFactory, PluginRegistry, PluginState, PluginType};
use serde_json::json;
use std::sync::Arc;
use testing::{LogCapture, StubPlugin, plugin};

fn factory() -> BuiltinPluginFactory {
    BuiltinPluginFactory::new()
        .with_plugin("telemetry", |_| {
            Ok(Arc::new(StubPlugin::new("telemetry").llm().http()) as Arc<dyn BasePlugin>)
        })
        .with_plugin("mcp_guard", |_| {
            Ok(Arc::new(StubPlugin::new("mcp_guard").mcp()) as Arc<dyn BasePlugin>)
        })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_never_lose_a_plugin() {
    // GIVEN a shared registry
    let registry = Arc::new(PluginRegistry::new());

    // WHEN many tasks register distinct plugins while others read
    let mut handles = Vec::new();
    for i in 0..64 {
        let writer = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            writer
                .register(Arc::new(StubPlugin::new(&format!("p{i}")).llm()))
                .unwrap();
        }));
        let reader = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            let snapshot = reader.snapshot();
            assert_eq!(snapshot.llm_plugins().len(), snapshot.len());
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // THEN every registration survived
    let snapshot = registry.snapshot();
    assert_eq!(snapshot.len(), 64);
    assert_eq!(snapshot.llm_plugins().len(), 64);
    for i in 0..64 {
        assert!(snapshot.get(&format!("p{i}")).is_some());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_registration_admits_one() {
    let registry = Arc::new(PluginRegistry::new());

    let mut handles = Vec::new();
    for _ in 0..16 {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            registry.register(Arc::new(StubPlugin::new("same"))).is_ok()
        }));
    }
    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }

    assert_eq!(admitted, 1);
    assert_eq!(registry.names(), vec!["same"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_unregister_and_register_keep_exact_set() {
    // GIVEN a registry holding p0..p31
    let registry = Arc::new(PluginRegistry::new());
    for i in 0..32 {
        registry
            .register(Arc::new(StubPlugin::new(&format!("p{i}")).llm()))
            .unwrap();
    }

    // WHEN the even p's are removed while q0..q31 are added concurrently
    let mut handles = Vec::new();
    for i in 0..32 {
        let writer = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            writer
                .register(Arc::new(StubPlugin::new(&format!("q{i}")).mcp()))
                .unwrap();
        }));
        if i % 2 == 0 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.unregister(&format!("p{i}")).await.unwrap();
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // THEN exactly the odd p's and every q remain, each once
    let mut names = registry.names();
    names.sort();
    let mut expected: Vec<String> = (0..32)
        .filter(|i| i % 2 == 1)
        .map(|i| format!("p{i}"))
        .chain((0..32).map(|i| format!("q{i}")))
        .collect();
    expected.sort();
    assert_eq!(names, expected);
    assert_eq!(names.len(), 48);
    let snapshot = registry.snapshot();
    assert_eq!(snapshot.llm_plugins().len(), 16);
    assert_eq!(snapshot.mcp_plugins().len(), 32);
}

#[tokio::test]
async fn test_load_all_records_statuses() {
    // GIVEN an enabled built-in, a disabled one and an unknown plugin
    let registry = PluginRegistry::new();
    let configs = vec![
        plugin("telemetry", true),
        plugin("mcp_guard", false),
        PluginConfig {
            config: Some(json!({"endpoint": "http://collector"})),
            ..plugin("unknown", true)
        },
    ];

    // WHEN they are loaded
    registry.load_all(&factory(), &configs).await;

    // THEN each gets the matching status and only the enabled one is loaded
    assert_eq!(registry.names(), vec!["telemetry"]);

    let telemetry = registry.status("telemetry").unwrap();
    assert_eq!(telemetry.status, PluginState::Active);
    assert_eq!(telemetry.types, vec![PluginType::Llm, PluginType::HttpTransport]);

    assert_eq!(registry.status("mcp_guard").unwrap().status, PluginState::Disabled);

    let unknown = registry.status("unknown").unwrap();
    assert_eq!(unknown.status, PluginState::Error);
    assert!(unknown.logs[0].contains("no built-in plugin"));
    assert_eq!(registry.statuses().len(), 3);
}

#[tokio::test]
async fn test_disabling_a_loaded_plugin_unloads_it() {
    let registry = PluginRegistry::new();
    let factory = factory();
    registry
        .apply_config(&factory, &plugin("telemetry", true))
        .await
        .unwrap();

    registry
        .apply_config(&factory, &plugin("telemetry", false))
        .await
        .unwrap();

    assert!(registry.get("telemetry").is_none());
    assert_eq!(registry.status("telemetry").unwrap().status, PluginState::Disabled);
}

#[tokio::test]
async fn test_custom_plugin_path_is_refused() {
    let registry = PluginRegistry::new();
    let config = PluginConfig {
        path: Some("/opt/plugins/custom.so".to_string()),
        ..plugin("custom", true)
    };

    assert!(registry.apply_config(&factory(), &config).await.is_err());
    assert_eq!(registry.status("custom").unwrap().status, PluginState::Error);
}

#[tokio::test]
async fn test_registry_logs_to_injected_dispatch() {
    let capture = LogCapture::new();
    let registry = PluginRegistry::new().with_dispatch(capture.dispatch());

    registry.register(Arc::new(StubPlugin::new("a"))).unwrap();
    registry.unregister("a").await.unwrap();

    assert_eq!(capture.with_field("plugin", "a").len(), 2);
    assert!(capture.contains("Plugin unregistered"));
}
