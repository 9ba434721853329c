//! # In-Memory Config Cache
//!
//! The assembled configuration the request path reads from.
//!
//! Locking is split by subsystem:
//! - one `RwLock` over providers, governance, client settings and plugin
//!   configs
//! - one `Mutex` over MCP clients
//! - no lock at all for [`RequestSettings`] and the capability-filtered plugin
//!   lists, which are atomic snapshots
//!
//! Administrative mutations live in the sibling modules. Each one takes the
//! relevant lock, applies the change, writes the store, and releases the
//! lock before calling the [`ServingEngine`]. A store failure restores the
//! previous value before returning; an engine failure restores it only if no
//! newer write has replaced the entry since.

use crate::settings::RequestSettings;
use arc_swap::ArcSwap;
use errors::{ConfigError, StorageError};
use gw_core::{
    ClientConfig, ConfigStore, EnvFields, EnvLookup, EnvReference, GovernanceConfig,
    HttpTransportPlugin, LlmPlugin, McpClientConfig, McpPlugin, NoopEngine, PluginConfig,
    ProviderConfig, Redact, ServingEngine, StoreOp, VirtualKey, env_references, resolve_env
};
use plugins::{BuiltinPluginFactory, PluginFactory, PluginRegistry, PluginSet, PluginStatus};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use sync::ReconciledState;
use tokio::sync::{Mutex, RwLock};
use tracing::Dispatch;
use tracing::instrument::WithSubscriber;

/// A cached entry and the revision of the write that produced it.
#[derive(Debug, Clone)]
pub(crate) struct Versioned<T> {
    pub(crate) value: T,
    pub(crate) revision: u64
}

#[derive(Debug, Default)]
pub(crate) struct CacheState {
    pub(crate) client_config: ClientConfig,
    /// Providers with resolved secrets.
    pub(crate) providers: BTreeMap<String, Versioned<ProviderConfig>>,
    pub(crate) governance: GovernanceConfig,
    pub(crate) plugins: Vec<PluginConfig>
}

#[derive(Debug, Default)]
pub(crate) struct McpState {
    /// Clients with resolved secrets, in load order.
    pub(crate) clients: Vec<Versioned<McpClientConfig>>
}

impl McpState {
    pub(crate) fn position(&self, id: &str) -> Option<usize> {
        self.clients.iter().position(|c| c.value.id == id)
    }

    pub(crate) fn name_taken(&self, name: &str, except_id: Option<&str>) -> bool {
        self.clients
            .iter()
            .any(|c| c.value.name == name && Some(c.value.id.as_str()) != except_id)
    }
}

pub struct ConfigCache {
    pub(crate) store: Arc<dyn ConfigStore>,
    pub(crate) env: Arc<dyn EnvLookup>,
    pub(crate) engine: Arc<dyn ServingEngine>,
    pub(crate) plugin_factory: Arc<dyn PluginFactory>,
    pub(crate) state: RwLock<CacheState>,
    pub(crate) mcp: Mutex<McpState>,
    pub(crate) plugins: Arc<PluginRegistry>,
    request_settings: ArcSwap<RequestSettings>,
    revisions: AtomicU64,
    pub(crate) dispatch: Dispatch
}

impl ConfigCache {
    /// An empty cache over `store`. Logs go to the dispatcher current at
    /// construction time.
    pub fn new(store: Arc<dyn ConfigStore>, env: Arc<dyn EnvLookup>) -> Self {
        Self {
            store,
            env,
            engine: Arc::new(NoopEngine),
            plugin_factory: Arc::new(BuiltinPluginFactory::new()),
            state: RwLock::new(CacheState::default()),
            mcp: Mutex::new(McpState::default()),
            plugins: Arc::new(PluginRegistry::new()),
            request_settings: ArcSwap::from_pointee(RequestSettings::default()),
            revisions: AtomicU64::new(0),
            dispatch: tracing::dispatcher::get_default(Dispatch::clone)
        }
    }

    #[must_use]
    pub fn with_engine(mut self, engine: Arc<dyn ServingEngine>) -> Self {
        self.engine = engine;
        self
    }

    #[must_use]
    pub fn with_plugin_factory(mut self, factory: Arc<dyn PluginFactory>) -> Self {
        self.plugin_factory = factory;
        self
    }

    /// Routes the cache's logs, and those of its own plugin registry, to
    /// `dispatch`.
    #[must_use]
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.plugins = Arc::new(PluginRegistry::new().with_dispatch(dispatch.clone()));
        self.dispatch = dispatch;
        self
    }

    /// Shares an existing registry instead of the cache's own.
    #[must_use]
    pub fn with_plugin_registry(mut self, registry: Arc<PluginRegistry>) -> Self {
        self.plugins = registry;
        self
    }

    pub(crate) fn next_revision(&self) -> u64 {
        self.revisions.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn versioned<T>(&self, value: T) -> Versioned<T> {
        Versioned {
            value,
            revision: self.next_revision()
        }
    }

    pub(crate) fn publish_settings(&self, config: &ClientConfig) {
        self.request_settings
            .store(Arc::new(RequestSettings::from(config)));
    }

    /// Replaces the cache contents with a reconciled state.
    ///
    /// Secrets are resolved here. A provider or MCP client whose required
    /// variables are missing is left out of the cache and logged.
    pub async fn populate(&self, state: ReconciledState) {
        async {
            let mut providers = BTreeMap::new();
            for (name, mut config) in state.providers {
                match resolve_secrets(&mut config, self.env.as_ref(), &format!("providers.{name}")) {
                    Ok(()) => {
                        providers.insert(name, self.versioned(config));
                    }
                    Err(e) => {
                        tracing::error!(provider = %name, error = %e, "Provider left out of the cache");
                    }
                }
            }

            let mut clients = Vec::with_capacity(state.mcp_clients.len());
            for mut client in state.mcp_clients {
                let path = format!("mcp.client_configs.{}", client.name);
                match resolve_secrets(&mut client, self.env.as_ref(), &path) {
                    Ok(()) => clients.push(self.versioned(client)),
                    Err(e) => {
                        tracing::error!(mcp_client = %client.name, error = %e, "MCP client left out of the cache");
                    }
                }
            }

            tracing::info!(
                providers = providers.len(),
                mcp_clients = clients.len(),
                virtual_keys = state.governance.virtual_keys.len(),
                plugins = state.plugins.len(),
                "Config cache populated"
            );

            self.publish_settings(&state.client_config);
            *self.state.write().await = CacheState {
                client_config: state.client_config,
                providers,
                governance: state.governance,
                plugins: state.plugins
            };
            self.mcp.lock().await.clients = clients;
        }
        .with_subscriber(self.dispatch.clone())
        .await;
    }

    /// Instantiates every cached plugin config and records its status.
    pub async fn load_plugins(&self) {
        let configs = self.state.read().await.plugins.clone();
        self.plugins
            .load_all(self.plugin_factory.as_ref(), &configs)
            .await;
    }

    /// Writes a compensating batch after a rolled-back mutation. Failure is
    /// logged; the cache already holds the restored value.
    pub(crate) async fn compensate(&self, collection: &str, ops: Vec<StoreOp>) {
        if ops.is_empty() {
            return;
        }
        if let Err(e) = self.store.execute_transaction(ops).await {
            tracing::error!(
                collection,
                error = %e,
                "Compensating write failed; store and cache differ until the next reload"
            );
        }
    }

    // Lock-free reads.

    pub fn request_settings(&self) -> Arc<RequestSettings> {
        self.request_settings.load_full()
    }

    pub fn llm_plugins(&self) -> Vec<Arc<dyn LlmPlugin>> {
        self.plugins.llm_plugins()
    }

    pub fn mcp_plugins(&self) -> Vec<Arc<dyn McpPlugin>> {
        self.plugins.mcp_plugins()
    }

    pub fn http_transport_plugins(&self) -> Vec<Arc<dyn HttpTransportPlugin>> {
        self.plugins.http_transport_plugins()
    }

    pub fn loaded_plugins(&self) -> Arc<PluginSet> {
        self.plugins.snapshot()
    }

    pub fn plugin_statuses(&self) -> Vec<PluginStatus> {
        self.plugins.statuses()
    }

    pub fn plugin_registry(&self) -> &Arc<PluginRegistry> {
        &self.plugins
    }

    // Locked reads.

    pub async fn client_config(&self) -> ClientConfig {
        self.state.read().await.client_config.clone()
    }

    pub async fn provider_names(&self) -> Vec<String> {
        self.state.read().await.providers.keys().cloned().collect()
    }

    /// The provider with its resolved secrets, for the serving engine.
    pub async fn resolved_provider(&self, name: &str) -> Option<ProviderConfig> {
        self.state
            .read()
            .await
            .providers
            .get(name)
            .map(|p| p.value.clone())
    }

    /// Every provider with resolved secrets, for the serving engine.
    pub async fn resolved_providers(&self) -> BTreeMap<String, ProviderConfig> {
        self.state
            .read()
            .await
            .providers
            .iter()
            .map(|(name, p)| (name.clone(), p.value.clone()))
            .collect()
    }

    pub async fn redacted_provider(&self, name: &str) -> Result<ProviderConfig, ConfigError> {
        self.state
            .read()
            .await
            .providers
            .get(name)
            .map(|p| p.value.redacted())
            .ok_or_else(|| ConfigError::not_found("provider", name))
    }

    pub async fn redacted_providers(&self) -> BTreeMap<String, ProviderConfig> {
        self.state
            .read()
            .await
            .providers
            .iter()
            .map(|(name, p)| (name.clone(), p.value.redacted()))
            .collect()
    }

    pub async fn resolved_mcp_clients(&self) -> Vec<McpClientConfig> {
        self.mcp
            .lock()
            .await
            .clients
            .iter()
            .map(|c| c.value.clone())
            .collect()
    }

    pub async fn redacted_mcp_clients(&self) -> Vec<McpClientConfig> {
        self.mcp
            .lock()
            .await
            .clients
            .iter()
            .map(|c| c.value.redacted())
            .collect()
    }

    /// Snapshot of every governance collection. Virtual key values are
    /// included; use [`Self::redacted_virtual_keys`] for display.
    pub async fn governance(&self) -> GovernanceConfig {
        self.state.read().await.governance.clone()
    }

    pub async fn redacted_virtual_keys(&self) -> Vec<VirtualKey> {
        self.state
            .read()
            .await
            .governance
            .virtual_keys
            .iter()
            .map(Redact::redacted)
            .collect()
    }

    pub async fn plugin_configs(&self) -> Vec<PluginConfig> {
        self.state
            .read()
            .await
            .plugins
            .iter()
            .map(Redact::redacted)
            .collect()
    }

    /// Every environment variable referenced by a cached provider or MCP
    /// client, with its config path.
    pub async fn env_references(&self) -> Vec<EnvReference> {
        let mut found: Vec<EnvReference> = {
            let state = self.state.read().await;
            state
                .providers
                .iter()
                .flat_map(|(name, p)| env_references(&p.value, &format!("providers.{name}")))
                .collect()
        };
        let mcp = self.mcp.lock().await;
        found.extend(mcp.clients.iter().flat_map(|c| {
            env_references(&c.value, &format!("mcp.client_configs.{}", c.value.name))
        }));
        found
    }
}

/// Resolves every reference in `entity`, logging unset optional variables.
pub(crate) fn resolve_secrets<T: EnvFields>(
    entity: &mut T,
    env: &dyn EnvLookup,
    path: &str
) -> Result<(), ConfigError> {
    for warning in resolve_env(entity, env, path)? {
        tracing::warn!(
            var = %warning.var,
            path = %warning.path,
            "Optional environment variable is not set"
        );
    }
    Ok(())
}

pub(crate) fn tx_failure(collection: &str, error: &StorageError) -> ConfigError {
    ConfigError::TransactionFailure {
        collection: collection.to_string(),
        reason: error.to_string()
    }
}
