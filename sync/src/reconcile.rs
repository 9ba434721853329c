//! # Reconciler
//!
//! Merges the declarative config file into the persistent store, one
//! collection at a time.
//!
//! Every collection follows the same steps: read the stored set, admit the
//! file entities that pass validation and env resolution, [`plan_merge`] the
//! two, and write the plan as a single transaction. The runtime set handed
//! back is always what the store holds once the pass finishes, so a failed
//! transaction leaves the collection at its stored state.

use crate::hash::ConfigHashable;
use crate::merge::{MergePlan, OrphanPolicy, Reconcilable, plan_merge};
use crate::report::{CollectionReport, SyncReport};
use config::GatewayConfigFile;
use errors::{ConfigError, StorageError};
use gw_core::{
    Budget, ClientConfig, ConfigStore, Customer, EntityKind, EnvLookup, GovernanceConfig,
    McpClientConfig, PluginConfig, ProviderConfig, RateLimit, Record, RoutingRule, StoreOp, Team,
    VirtualKey, resolve_env
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::Dispatch;
use tracing::instrument::WithSubscriber;
use utils::{ContentHasher, HashError};

/// A provider keyed by its name, so providers can go through [`plan_merge`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderEntry {
    pub name: String,
    pub config: ProviderConfig
}

impl ProviderEntry {
    pub fn new(name: impl Into<String>, config: ProviderConfig) -> Self {
        Self {
            name: name.into(),
            config
        }
    }
}

impl ConfigHashable for ProviderEntry {
    const HASH_KIND: &'static str = ProviderConfig::HASH_KIND;

    fn hash_label(&self) -> String {
        format!("provider {}", self.name)
    }

    fn write_fields(&self, hasher: &mut ContentHasher) -> Result<(), HashError> {
        self.config.write_fields(hasher)
    }
}

impl Reconcilable for ProviderEntry {
    const KIND: EntityKind = EntityKind::Provider;

    fn entity_id(&self) -> &str {
        &self.name
    }

    fn set_entity_id(&mut self, id: String) {
        self.name = id;
    }

    fn stored_hash(&self) -> Option<&str> {
        self.config.config_hash.as_deref()
    }

    fn set_stored_hash(&mut self, hash: Option<String>) {
        self.config.config_hash = hash;
    }

    fn fill_generated(&mut self) {}

    fn record(&self, _parent: Option<&str>) -> Record {
        Record::Provider {
            id: self.name.clone(),
            config: self.config.clone()
        }
    }
}

/// Runtime state after a reconciliation pass. Secret fields are still in
/// their declared form; resolution happens when the cache is populated.
#[derive(Debug, Clone, Default)]
pub struct ReconciledState {
    pub client_config: ClientConfig,
    pub providers: BTreeMap<String, ProviderConfig>,
    pub mcp_clients: Vec<McpClientConfig>,
    pub governance: GovernanceConfig,
    pub plugins: Vec<PluginConfig>,
    pub report: SyncReport
}

pub struct Reconciler {
    store: Arc<dyn ConfigStore>,
    env: Arc<dyn EnvLookup>,
    dispatch: Dispatch
}

impl Reconciler {
    /// Logs go to the dispatcher that is current when this is called.
    pub fn new(store: Arc<dyn ConfigStore>, env: Arc<dyn EnvLookup>) -> Self {
        Self {
            store,
            env,
            dispatch: tracing::dispatcher::get_default(Dispatch::clone)
        }
    }

    #[must_use]
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Reconciles every collection of `file` against the store.
    ///
    /// # Failure handling
    ///
    /// Invalid entities are logged and skipped. A failed read or transaction
    /// marks its collection failed in the report and the collection keeps
    /// its stored state; later collections still run.
    pub async fn reconcile_all(&self, file: &GatewayConfigFile) -> ReconciledState {
        self.run(file).with_subscriber(self.dispatch.clone()).await
    }

    async fn run(&self, file: &GatewayConfigFile) -> ReconciledState {
        tracing::info!(backend = self.store.backend(), "Reconciling configuration");
        let mut report = SyncReport::default();

        let client_config = self
            .reconcile_client_config(file.client.as_ref(), &mut report)
            .await;
        let providers = self
            .reconcile_providers(file.providers.as_ref(), &mut report)
            .await;

        let env = Arc::clone(&self.env);
        let mcp_clients = self
            .sync_collection(
                "mcp_clients",
                file.mcp.as_ref().map(|m| m.client_configs.as_slice()),
                self.store.get_mcp_clients().await,
                |client: &McpClientConfig| {
                    client.check()?;
                    let mut probe = client.clone();
                    let path = format!("mcp.client_configs.{}", client.name);
                    for warning in resolve_env(&mut probe, env.as_ref(), &path)? {
                        tracing::warn!(
                            var = %warning.var,
                            path = %warning.path,
                            "Optional environment variable is not set"
                        );
                    }
                    Ok(())
                },
                &mut report
            )
            .await;

        let governance = file.governance.as_ref();
        let budgets = self
            .sync_collection(
                "budgets",
                governance.map(|g| g.budgets.as_slice()),
                self.store.get_budgets().await,
                |b: &Budget| b.check(),
                &mut report
            )
            .await;
        let rate_limits = self
            .sync_collection(
                "rate_limits",
                governance.map(|g| g.rate_limits.as_slice()),
                self.store.get_rate_limits().await,
                |r: &RateLimit| r.check(),
                &mut report
            )
            .await;
        let customers = self
            .sync_collection(
                "customers",
                governance.map(|g| g.customers.as_slice()),
                self.store.get_customers().await,
                |c: &Customer| c.check(),
                &mut report
            )
            .await;
        let teams = self
            .sync_collection(
                "teams",
                governance.map(|g| g.teams.as_slice()),
                self.store.get_teams().await,
                |t: &Team| t.check(),
                &mut report
            )
            .await;
        let virtual_keys = self
            .reconcile_virtual_keys(governance.map(|g| g.virtual_keys.as_slice()), &mut report)
            .await;
        let routing_rules = self
            .sync_collection(
                "routing_rules",
                governance.map(|g| g.routing_rules.as_slice()),
                self.store.get_routing_rules().await,
                |r: &RoutingRule| r.check(),
                &mut report
            )
            .await;

        let plugins = self
            .sync_collection(
                "plugins",
                file.plugins.as_deref(),
                self.store.get_plugins().await,
                |p: &PluginConfig| p.check(),
                &mut report
            )
            .await;

        tracing::info!(
            writes = report.total_writes(),
            failed = report.failures().len(),
            "Reconciliation finished"
        );

        ReconciledState {
            client_config,
            providers,
            mcp_clients,
            governance: GovernanceConfig {
                budgets,
                rate_limits,
                customers,
                teams,
                virtual_keys,
                routing_rules
            },
            plugins,
            report
        }
    }

    async fn commit(&self, ops: Vec<StoreOp>) -> Result<(), String> {
        if ops.is_empty() {
            return Ok(());
        }
        self.store
            .execute_transaction(ops)
            .await
            .map_err(|e| e.to_string())
    }

    async fn stored_client_config(&self, collection: &mut CollectionReport) -> ClientConfig {
        match self.store.get_client_config().await {
            Ok(stored) => stored.unwrap_or_default(),
            Err(e) => {
                collection.fail(e.to_string());
                ClientConfig::default()
            }
        }
    }

    async fn reconcile_client_config(
        &self,
        declared: Option<&ClientConfig>,
        report: &mut SyncReport
    ) -> ClientConfig {
        let mut collection = CollectionReport::new("client_config");
        let stored_hash = match self.store.get_client_config_hash().await {
            Ok(hash) => hash,
            Err(e) => {
                collection.fail(e.to_string());
                report.push(collection);
                return ClientConfig::default();
            }
        };

        let config = match declared {
            None => self.stored_client_config(&mut collection).await,
            Some(config) => match config.check().and_then(|()| config.compute_hash()) {
                Err(e) => {
                    tracing::error!(error = %e, "Ignoring client config from file");
                    collection.skipped += 1;
                    self.stored_client_config(&mut collection).await
                }
                Ok(hash) if stored_hash.as_deref() == Some(hash.as_str()) => {
                    collection.unchanged += 1;
                    self.stored_client_config(&mut collection).await
                }
                Ok(hash) => {
                    let config = ClientConfig {
                        config_hash: Some(hash),
                        ..config.clone()
                    };
                    match self.store.update_client_config(&config).await {
                        Ok(()) => {
                            if stored_hash.is_some() {
                                collection.updated += 1;
                            } else {
                                collection.created += 1;
                            }
                            config
                        }
                        Err(e) => {
                            let reason = e.to_string();
                            let stored = self.stored_client_config(&mut collection).await;
                            collection.fail(reason);
                            stored
                        }
                    }
                }
            }
        };
        report.push(collection);
        config
    }

    /// Validates a file provider and resolves its env references on a
    /// scratch copy. The declared form is what gets persisted.
    fn admit_provider(&self, name: &str, config: &ProviderConfig) -> Result<(), ConfigError> {
        config.validate_for(name)?;
        let mut probe = config.clone();
        for warning in resolve_env(&mut probe, self.env.as_ref(), &format!("providers.{name}"))? {
            tracing::warn!(
                provider = %name,
                var = %warning.var,
                path = %warning.path,
                "Optional environment variable is not set"
            );
        }
        config.compute_hash()?;
        Ok(())
    }

    async fn reconcile_providers(
        &self,
        declared: Option<&BTreeMap<String, ProviderConfig>>,
        report: &mut SyncReport
    ) -> BTreeMap<String, ProviderConfig> {
        let mut providers_report = CollectionReport::new("providers");
        let mut keys_report = CollectionReport::new("keys");

        let stored = match self.store.get_providers().await {
            Ok(stored) => stored,
            Err(e) => {
                providers_report.fail(e.to_string());
                keys_report.fail(e.to_string());
                report.push(providers_report);
                report.push(keys_report);
                return BTreeMap::new();
            }
        };
        let Some(declared) = declared else {
            report.push(providers_report);
            report.push(keys_report);
            return stored;
        };

        let mut admitted = Vec::with_capacity(declared.len());
        for (name, config) in declared {
            match self.admit_provider(name, config) {
                Ok(()) => admitted.push(ProviderEntry::new(name, config.clone())),
                Err(e) => {
                    tracing::error!(provider = %name, error = %e, "Skipping provider");
                    providers_report.skipped += 1;
                }
            }
        }

        let stored_entries: Vec<ProviderEntry> = stored
            .iter()
            .map(|(name, config)| ProviderEntry::new(name, config.clone()))
            .collect();
        let plan = plan_merge(&admitted, &stored_entries, OrphanPolicy::Preserve);
        record_plan(&plan, &mut providers_report);

        let mut ops = plan.store_ops(None);
        let mut key_sets = HashMap::new();
        for entry in &plan.declared {
            let stored_keys = stored
                .get(&entry.name)
                .map(|c| c.keys.as_slice())
                .unwrap_or(&[]);
            let key_plan = plan_merge(&entry.config.keys, stored_keys, OrphanPolicy::Preserve);
            record_plan(&key_plan, &mut keys_report);
            ops.extend(key_plan.store_ops(Some(&entry.name)));
            key_sets.insert(entry.name.clone(), key_plan.merged);
        }

        if let Err(reason) = self.commit(ops).await {
            providers_report.fail(reason.clone());
            keys_report.fail(reason);
            report.push(providers_report);
            report.push(keys_report);
            return stored;
        }
        report.push(providers_report);
        report.push(keys_report);

        plan.merged
            .into_iter()
            .map(|entry| {
                let mut config = entry.config;
                if let Some(keys) = key_sets.remove(&entry.name) {
                    config.keys = keys;
                }
                (entry.name, config)
            })
            .collect()
    }

    async fn reconcile_virtual_keys(
        &self,
        declared: Option<&[VirtualKey]>,
        report: &mut SyncReport
    ) -> Vec<VirtualKey> {
        let mut collection = CollectionReport::new("virtual_keys");
        let stored = match self.store.get_virtual_keys().await {
            Ok(stored) => stored,
            Err(e) => {
                collection.fail(e.to_string());
                report.push(collection);
                return Vec::new();
            }
        };
        let Some(declared) = declared else {
            report.push(collection);
            return stored;
        };

        let admitted = admit_all(declared, |vk: &VirtualKey| vk.check(), &mut collection);
        let plan = plan_merge(&admitted, &stored, OrphanPolicy::Preserve);
        record_plan(&plan, &mut collection);
        if let Err(reason) = self.commit(plan.store_ops(None)).await {
            collection.fail(reason);
            report.push(collection);
            return stored;
        }
        report.push(collection);

        // Associations are owned by the file for every virtual key it
        // declares, so their orphans are deleted.
        let mut provider_report = CollectionReport::new("virtual_key_provider_configs");
        let mut mcp_report = CollectionReport::new("virtual_key_mcp_configs");
        let mut provider_ops = Vec::new();
        let mut mcp_ops = Vec::new();
        let mut provider_sets = HashMap::new();
        let mut mcp_sets = HashMap::new();
        for vk in &plan.declared {
            let current = stored.iter().find(|s| s.id == vk.id);

            let provider_plan = plan_merge(
                &vk.provider_configs,
                current.map(|s| s.provider_configs.as_slice()).unwrap_or(&[]),
                OrphanPolicy::Delete
            );
            record_plan(&provider_plan, &mut provider_report);
            provider_ops.extend(provider_plan.store_ops(Some(&vk.id)));
            provider_sets.insert(vk.id.clone(), provider_plan.merged);

            let mcp_plan = plan_merge(
                &vk.mcp_configs,
                current.map(|s| s.mcp_configs.as_slice()).unwrap_or(&[]),
                OrphanPolicy::Delete
            );
            record_plan(&mcp_plan, &mut mcp_report);
            mcp_ops.extend(mcp_plan.store_ops(Some(&vk.id)));
            mcp_sets.insert(vk.id.clone(), mcp_plan.merged);
        }

        let providers_committed = match self.commit(provider_ops).await {
            Ok(()) => true,
            Err(reason) => {
                provider_report.fail(reason);
                false
            }
        };
        let mcp_committed = match self.commit(mcp_ops).await {
            Ok(()) => true,
            Err(reason) => {
                mcp_report.fail(reason);
                false
            }
        };
        report.push(provider_report);
        report.push(mcp_report);

        plan.merged
            .into_iter()
            .map(|mut vk| {
                let current = stored.iter().find(|s| s.id == vk.id);
                if let Some(set) = provider_sets.remove(&vk.id) {
                    vk.provider_configs = if providers_committed {
                        set
                    } else {
                        current.map(|s| s.provider_configs.clone()).unwrap_or_default()
                    };
                }
                if let Some(set) = mcp_sets.remove(&vk.id) {
                    vk.mcp_configs = if mcp_committed {
                        set
                    } else {
                        current.map(|s| s.mcp_configs.clone()).unwrap_or_default()
                    };
                }
                vk
            })
            .collect()
    }

    /// Reconciles a flat collection with the preserve policy.
    async fn sync_collection<T: Reconcilable>(
        &self,
        name: &str,
        declared: Option<&[T]>,
        stored: Result<Vec<T>, StorageError>,
        admit: impl Fn(&T) -> Result<(), ConfigError>,
        report: &mut SyncReport
    ) -> Vec<T> {
        let mut collection = CollectionReport::new(name);
        let stored = match stored {
            Ok(stored) => stored,
            Err(e) => {
                collection.fail(e.to_string());
                report.push(collection);
                return Vec::new();
            }
        };
        let Some(declared) = declared else {
            report.push(collection);
            return stored;
        };

        let admitted = admit_all(declared, admit, &mut collection);
        let plan = plan_merge(&admitted, &stored, OrphanPolicy::Preserve);
        record_plan(&plan, &mut collection);
        match self.commit(plan.store_ops(None)).await {
            Ok(()) => {
                report.push(collection);
                plan.merged
            }
            Err(reason) => {
                collection.fail(reason);
                report.push(collection);
                stored
            }
        }
    }
}

fn admit_all<T: Reconcilable>(
    declared: &[T],
    admit: impl Fn(&T) -> Result<(), ConfigError>,
    collection: &mut CollectionReport
) -> Vec<T> {
    declared
        .iter()
        .filter(|entity| match admit(entity) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    collection = %collection.collection,
                    entity = %entity.hash_label(),
                    error = %e,
                    "Skipping invalid entity"
                );
                collection.skipped += 1;
                false
            }
        })
        .cloned()
        .collect()
}

fn record_plan<T>(plan: &MergePlan<T>, collection: &mut CollectionReport) {
    collection.created += plan.creates.len();
    collection.updated += plan.updates.len();
    collection.deleted += plan.deletes.len();
    collection.unchanged += plan.unchanged;
    collection.skipped += plan.skipped.len();
    for e in &plan.skipped {
        tracing::error!(collection = %collection.collection, error = %e, "Skipping entity");
    }
}
