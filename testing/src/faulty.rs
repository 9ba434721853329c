use async_trait::async_trait;
use errors::StorageError;
use gw_core::{
    Budget, ClientConfig, ConfigStore, Customer, EntityKind, Key, McpClientConfig, PluginConfig,
    ProviderConfig, RateLimit, Record, RecordRef, RoutingRule, StoreOp, Team, VirtualKey
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A store that fails on demand.
///
/// Reads of a kind registered with [`FaultyStore::fail_reads_of`] and any
/// transaction touching a kind registered with [`FaultyStore::fail_writes_to`]
/// return an error without reaching the wrapped store.
pub struct FaultyStore {
    inner: Arc<dyn ConfigStore>,
    failing_reads: Mutex<HashSet<EntityKind>>,
    failing_writes: Mutex<HashSet<EntityKind>>,
    rejected: AtomicUsize
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn ConfigStore>) -> Self {
        Self {
            inner,
            failing_reads: Mutex::new(HashSet::new()),
            failing_writes: Mutex::new(HashSet::new()),
            rejected: AtomicUsize::new(0)
        }
    }

    pub fn fail_reads_of(&self, kind: EntityKind) {
        self.failing_reads.lock().insert(kind);
    }

    pub fn fail_writes_to(&self, kind: EntityKind) {
        self.failing_writes.lock().insert(kind);
    }

    pub fn heal(&self) {
        self.failing_reads.lock().clear();
        self.failing_writes.lock().clear();
    }

    /// Transactions refused so far.
    pub fn rejected_transactions(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }

    fn check_read(&self, kind: EntityKind) -> Result<(), StorageError> {
        if self.failing_reads.lock().contains(&kind) {
            return Err(StorageError::QueryError {
                backend: "faulty".to_string(),
                reason: format!("injected read failure for {kind}")
            });
        }
        Ok(())
    }

    fn check_write(&self, kinds: impl IntoIterator<Item = EntityKind>) -> Result<(), StorageError> {
        let failing = self.failing_writes.lock();
        if let Some(kind) = kinds.into_iter().find(|k| failing.contains(k)) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(StorageError::TransactionError {
                backend: "faulty".to_string(),
                reason: format!("injected write failure for {kind}")
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for FaultyStore {
    fn backend(&self) -> &str {
        "faulty"
    }

    async fn get_client_config(&self) -> Result<Option<ClientConfig>, StorageError> {
        self.check_read(EntityKind::ClientConfig)?;
        self.inner.get_client_config().await
    }

    async fn get_client_config_hash(&self) -> Result<Option<String>, StorageError> {
        self.check_read(EntityKind::ClientConfig)?;
        self.inner.get_client_config_hash().await
    }

    async fn update_client_config(&self, config: &ClientConfig) -> Result<(), StorageError> {
        self.check_write([EntityKind::ClientConfig])?;
        self.inner.update_client_config(config).await
    }

    async fn get_providers(&self) -> Result<BTreeMap<String, ProviderConfig>, StorageError> {
        self.check_read(EntityKind::Provider)?;
        self.check_read(EntityKind::Key)?;
        self.inner.get_providers().await
    }

    async fn get_provider(&self, id: &str) -> Result<Option<ProviderConfig>, StorageError> {
        self.check_read(EntityKind::Provider)?;
        self.inner.get_provider(id).await
    }

    async fn get_keys(&self, provider: &str) -> Result<Vec<Key>, StorageError> {
        self.check_read(EntityKind::Key)?;
        self.inner.get_keys(provider).await
    }

    async fn get_budgets(&self) -> Result<Vec<Budget>, StorageError> {
        self.check_read(EntityKind::Budget)?;
        self.inner.get_budgets().await
    }

    async fn get_rate_limits(&self) -> Result<Vec<RateLimit>, StorageError> {
        self.check_read(EntityKind::RateLimit)?;
        self.inner.get_rate_limits().await
    }

    async fn get_customers(&self) -> Result<Vec<Customer>, StorageError> {
        self.check_read(EntityKind::Customer)?;
        self.inner.get_customers().await
    }

    async fn get_teams(&self) -> Result<Vec<Team>, StorageError> {
        self.check_read(EntityKind::Team)?;
        self.inner.get_teams().await
    }

    async fn get_virtual_keys(&self) -> Result<Vec<VirtualKey>, StorageError> {
        self.check_read(EntityKind::VirtualKey)?;
        self.inner.get_virtual_keys().await
    }

    async fn get_routing_rules(&self) -> Result<Vec<RoutingRule>, StorageError> {
        self.check_read(EntityKind::RoutingRule)?;
        self.inner.get_routing_rules().await
    }

    async fn get_mcp_clients(&self) -> Result<Vec<McpClientConfig>, StorageError> {
        self.check_read(EntityKind::McpClient)?;
        self.inner.get_mcp_clients().await
    }

    async fn get_mcp_client_by_name(&self, name: &str) -> Result<Option<McpClientConfig>, StorageError> {
        self.check_read(EntityKind::McpClient)?;
        self.inner.get_mcp_client_by_name(name).await
    }

    async fn get_plugins(&self) -> Result<Vec<PluginConfig>, StorageError> {
        self.check_read(EntityKind::Plugin)?;
        self.inner.get_plugins().await
    }

    async fn get_record(&self, target: &RecordRef) -> Result<Option<Record>, StorageError> {
        self.check_read(target.kind)?;
        self.inner.get_record(target).await
    }

    async fn execute_transaction(&self, ops: Vec<StoreOp>) -> Result<(), StorageError> {
        self.check_write(ops.iter().map(|op| op.target().kind))?;
        self.inner.execute_transaction(ops).await
    }

    async fn encrypt_plaintext_rows(&self) -> Result<usize, StorageError> {
        self.inner.encrypt_plaintext_rows().await
    }
}
