//! # In-Memory Config Store
//!
//! Reference [`ConfigStore`] implementation. Rows live in a single ordered
//! table behind a `tokio::sync::RwLock`. A transaction applies its ops to a
//! copy of the table and swaps the copy in only when every op succeeded, so
//! readers never observe a half-applied batch.
//!
//! With a snapshot path the table is written to disk after every commit
//! (write-to-temp then rename) and reloaded on [`InMemoryConfigStore::open`].
//! With an [`EncryptionManager`] the payloads of secret-bearing rows are
//! encrypted at rest.

use crate::encryption::EncryptionManager;
use crate::rows::{EncryptionStatus, StoredRow, decode_payload, encode_payload};
use async_trait::async_trait;
use errors::StorageError;
use gw_core::store::CLIENT_CONFIG_ID;
use gw_core::{
    Budget, ClientConfig, ConfigStore, Customer, EntityKind, Key, McpClientConfig, PluginConfig,
    ProviderConfig, RateLimit, Record, RecordRef, RoutingRule, StoreOp, Team, VirtualKey
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Rows encrypted per commit during a plaintext backfill.
pub const BACKFILL_BATCH_SIZE: usize = 100;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    next_seq: u64,
    rows: Vec<StoredRow>
}

#[derive(Debug, Clone, Default)]
struct Tables {
    next_seq: u64,
    rows: BTreeMap<RecordRef, StoredRow>
}

impl Tables {
    fn rows_of<'a>(
        &'a self,
        kind: EntityKind,
        parent: Option<&'a str>
    ) -> impl Iterator<Item = &'a StoredRow> + 'a {
        let mut rows: Vec<&StoredRow> = self
            .rows
            .values()
            .filter(|row| {
                row.address.kind == kind
                    && parent.is_none_or(|p| row.address.parent.as_deref() == Some(p))
            })
            .collect();
        rows.sort_by_key(|row| row.seq);
        rows.into_iter()
    }
}

fn parent_kind(kind: EntityKind) -> Option<EntityKind> {
    match kind {
        EntityKind::Key => Some(EntityKind::Provider),
        EntityKind::VirtualKeyProviderConfig | EntityKind::VirtualKeyMcpConfig => {
            Some(EntityKind::VirtualKey)
        }
        _ => None
    }
}

pub struct InMemoryConfigStore {
    backend: String,
    tables: RwLock<Tables>,
    cipher: Option<Arc<EncryptionManager>>,
    snapshot_path: Option<PathBuf>,
    transactions: AtomicU64
}

impl Default for InMemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryConfigStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            backend: "memory".to_string(),
            tables: RwLock::new(Tables::default()),
            cipher: None,
            snapshot_path: None,
            transactions: AtomicU64::new(0)
        }
    }

    /// Opens a snapshot-backed store, loading the snapshot if it exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let tables = if path.exists() {
            let data = std::fs::read(&path).map_err(|e| StorageError::ConnectionError {
                backend: "file".to_string(),
                reason: format!("{}: {e}", path.display())
            })?;
            let snapshot: Snapshot =
                serde_json::from_slice(&data).map_err(|e| StorageError::SerializationError {
                    error_type: "snapshot".to_string(),
                    reason: e.to_string()
                })?;
            if snapshot.version != SNAPSHOT_VERSION {
                return Err(StorageError::ConnectionError {
                    backend: "file".to_string(),
                    reason: format!("unsupported snapshot version {}", snapshot.version)
                });
            }
            Tables {
                next_seq: snapshot.next_seq,
                rows: snapshot
                    .rows
                    .into_iter()
                    .map(|row| (row.address.clone(), row))
                    .collect()
            }
        } else {
            Tables::default()
        };
        tracing::info!(
            "Opened config store snapshot {} ({} rows)",
            path.display(),
            tables.rows.len()
        );

        Ok(Self {
            backend: "file".to_string(),
            tables: RwLock::new(tables),
            cipher: None,
            snapshot_path: Some(path),
            transactions: AtomicU64::new(0)
        })
    }

    #[must_use]
    pub fn with_cipher(mut self, cipher: Option<Arc<EncryptionManager>>) -> Self {
        self.cipher = cipher;
        self
    }

    #[must_use]
    pub fn is_encrypting(&self) -> bool {
        self.cipher.is_some()
    }

    /// Number of committed write batches since the store was opened.
    #[must_use]
    pub fn committed_transactions(&self) -> u64 {
        self.transactions.load(Ordering::SeqCst)
    }

    /// Raw rows of one kind, in insertion order.
    pub async fn rows(&self, kind: EntityKind) -> Vec<StoredRow> {
        self.tables.read().await.rows_of(kind, None).cloned().collect()
    }

    fn tx_error(&self, reason: impl Into<String>) -> StorageError {
        StorageError::TransactionError {
            backend: self.backend.clone(),
            reason: reason.into()
        }
    }

    fn seal(&self, record: &Record) -> Result<(String, EncryptionStatus), StorageError> {
        let payload = encode_payload(record)?;
        match &self.cipher {
            Some(cipher) if record.kind().is_secret_bearing() => {
                let sealed =
                    cipher
                        .encrypt_payload(&payload)
                        .map_err(|e| StorageError::EncryptionError {
                            table: record.kind().to_string(),
                            reason: e.to_string()
                        })?;
                Ok((sealed, EncryptionStatus::Encrypted))
            }
            _ => Ok((payload, EncryptionStatus::PlainText))
        }
    }

    fn unseal(&self, row: &StoredRow) -> Result<Record, StorageError> {
        match row.encryption_status {
            EncryptionStatus::PlainText => decode_payload(&row.address, &row.payload),
            EncryptionStatus::Encrypted => {
                let table = row.address.kind.to_string();
                let cipher = self.cipher.as_ref().ok_or_else(|| StorageError::EncryptionError {
                    table: table.clone(),
                    reason: format!("row {} is encrypted and no key is configured", row.address)
                })?;
                let payload = cipher
                    .decrypt_payload(&row.payload)
                    .map_err(|e| StorageError::EncryptionError {
                        table,
                        reason: e.to_string()
                    })?;
                decode_payload(&row.address, &payload)
            }
        }
    }

    fn apply(&self, tables: &mut Tables, op: StoreOp) -> Result<(), StorageError> {
        match op {
            StoreOp::Create(record) => {
                let address = record.reference();
                if tables.rows.contains_key(&address) {
                    return Err(self.tx_error(format!("row {address} already exists")));
                }
                if let (Some(kind), Some(parent)) = (parent_kind(address.kind), &address.parent)
                    && !tables.rows.contains_key(&RecordRef::new(kind, parent.clone()))
                {
                    return Err(self.tx_error(format!("parent {kind}:{parent} of {address} is missing")));
                }
                let (payload, encryption_status) = self.seal(&record)?;
                let seq = tables.next_seq;
                tables.next_seq += 1;
                tables.rows.insert(
                    address.clone(),
                    StoredRow {
                        address,
                        seq,
                        config_hash: record.config_hash().map(str::to_string),
                        payload,
                        encryption_status
                    }
                );
            }
            StoreOp::Update(record) => {
                let address = record.reference();
                let Some(seq) = tables.rows.get(&address).map(|row| row.seq) else {
                    return Err(self.tx_error(format!("row {address} does not exist")));
                };
                let (payload, encryption_status) = self.seal(&record)?;
                tables.rows.insert(
                    address.clone(),
                    StoredRow {
                        address,
                        seq,
                        config_hash: record.config_hash().map(str::to_string),
                        payload,
                        encryption_status
                    }
                );
            }
            StoreOp::Delete(address) => {
                if tables.rows.remove(&address).is_none() {
                    return Err(self.tx_error(format!("row {address} does not exist")));
                }
                if address.parent.is_none() {
                    tables.rows.retain(|key, _| {
                        !(parent_kind(key.kind) == Some(address.kind)
                            && key.parent.as_deref() == Some(address.id.as_str()))
                    });
                }
            }
        }
        Ok(())
    }

    fn persist(&self, tables: &Tables) -> Result<(), StorageError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            next_seq: tables.next_seq,
            rows: tables.rows.values().cloned().collect()
        };
        let data =
            serde_json::to_vec_pretty(&snapshot).map_err(|e| StorageError::SerializationError {
                error_type: "snapshot".to_string(),
                reason: e.to_string()
            })?;

        let io_error = |e: std::io::Error| self.tx_error(format!("{}: {e}", path.display()));
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(io_error)?;
        file.write_all(&data).map_err(io_error)?;
        file.persist(path).map_err(|e| io_error(e.error))?;
        Ok(())
    }

    async fn commit(&self, build: impl FnOnce(&Tables) -> Vec<StoreOp>) -> Result<(), StorageError> {
        let mut guard = self.tables.write().await;
        let ops = build(&guard);
        let mut next = guard.clone();
        for op in ops {
            self.apply(&mut next, op)?;
        }
        self.persist(&next)?;
        *guard = next;
        self.transactions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list(&self, kind: EntityKind, parent: Option<&str>) -> Result<Vec<Record>, StorageError> {
        let tables = self.tables.read().await;
        tables
            .rows_of(kind, parent)
            .map(|row| self.unseal(row))
            .collect()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    fn backend(&self) -> &str {
        &self.backend
    }

    async fn get_client_config(&self) -> Result<Option<ClientConfig>, StorageError> {
        Ok(self
            .list(EntityKind::ClientConfig, None)
            .await?
            .into_iter()
            .find_map(|record| match record {
                Record::ClientConfig(config) => Some(config),
                _ => None
            }))
    }

    async fn get_client_config_hash(&self) -> Result<Option<String>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .rows
            .get(&RecordRef::new(EntityKind::ClientConfig, CLIENT_CONFIG_ID))
            .and_then(|row| row.config_hash.clone()))
    }

    async fn update_client_config(&self, config: &ClientConfig) -> Result<(), StorageError> {
        let record = Record::ClientConfig(config.clone());
        self.commit(|tables| {
            if tables.rows.contains_key(&record.reference()) {
                vec![StoreOp::Update(record)]
            } else {
                vec![StoreOp::Create(record)]
            }
        })
        .await
    }

    async fn get_providers(&self) -> Result<BTreeMap<String, ProviderConfig>, StorageError> {
        let mut providers = BTreeMap::new();
        for record in self.list(EntityKind::Provider, None).await? {
            if let Record::Provider { id, mut config } = record {
                config.keys = self.get_keys(&id).await?;
                providers.insert(id, config);
            }
        }
        Ok(providers)
    }

    async fn get_provider(&self, id: &str) -> Result<Option<ProviderConfig>, StorageError> {
        match self.get_record(&RecordRef::new(EntityKind::Provider, id)).await? {
            Some(Record::Provider { mut config, .. }) => {
                config.keys = self.get_keys(id).await?;
                Ok(Some(config))
            }
            _ => Ok(None)
        }
    }

    async fn get_keys(&self, provider: &str) -> Result<Vec<Key>, StorageError> {
        Ok(self
            .list(EntityKind::Key, Some(provider))
            .await?
            .into_iter()
            .filter_map(|record| match record {
                Record::Key { key, .. } => Some(key),
                _ => None
            })
            .collect())
    }

    async fn get_budgets(&self) -> Result<Vec<Budget>, StorageError> {
        Ok(self
            .list(EntityKind::Budget, None)
            .await?
            .into_iter()
            .filter_map(|record| match record {
                Record::Budget(b) => Some(b),
                _ => None
            })
            .collect())
    }

    async fn get_rate_limits(&self) -> Result<Vec<RateLimit>, StorageError> {
        Ok(self
            .list(EntityKind::RateLimit, None)
            .await?
            .into_iter()
            .filter_map(|record| match record {
                Record::RateLimit(r) => Some(r),
                _ => None
            })
            .collect())
    }

    async fn get_customers(&self) -> Result<Vec<Customer>, StorageError> {
        Ok(self
            .list(EntityKind::Customer, None)
            .await?
            .into_iter()
            .filter_map(|record| match record {
                Record::Customer(c) => Some(c),
                _ => None
            })
            .collect())
    }

    async fn get_teams(&self) -> Result<Vec<Team>, StorageError> {
        Ok(self
            .list(EntityKind::Team, None)
            .await?
            .into_iter()
            .filter_map(|record| match record {
                Record::Team(t) => Some(t),
                _ => None
            })
            .collect())
    }

    async fn get_virtual_keys(&self) -> Result<Vec<VirtualKey>, StorageError> {
        let mut virtual_keys = Vec::new();
        for record in self.list(EntityKind::VirtualKey, None).await? {
            let Record::VirtualKey(mut vk) = record else {
                continue;
            };
            vk.provider_configs = self
                .list(EntityKind::VirtualKeyProviderConfig, Some(&vk.id))
                .await?
                .into_iter()
                .filter_map(|record| match record {
                    Record::VirtualKeyProviderConfig { config, .. } => Some(config),
                    _ => None
                })
                .collect();
            vk.mcp_configs = self
                .list(EntityKind::VirtualKeyMcpConfig, Some(&vk.id))
                .await?
                .into_iter()
                .filter_map(|record| match record {
                    Record::VirtualKeyMcpConfig { config, .. } => Some(config),
                    _ => None
                })
                .collect();
            virtual_keys.push(vk);
        }
        Ok(virtual_keys)
    }

    async fn get_routing_rules(&self) -> Result<Vec<RoutingRule>, StorageError> {
        Ok(self
            .list(EntityKind::RoutingRule, None)
            .await?
            .into_iter()
            .filter_map(|record| match record {
                Record::RoutingRule(r) => Some(r),
                _ => None
            })
            .collect())
    }

    async fn get_mcp_clients(&self) -> Result<Vec<McpClientConfig>, StorageError> {
        Ok(self
            .list(EntityKind::McpClient, None)
            .await?
            .into_iter()
            .filter_map(|record| match record {
                Record::McpClient(m) => Some(m),
                _ => None
            })
            .collect())
    }

    async fn get_mcp_client_by_name(
        &self,
        name: &str
    ) -> Result<Option<McpClientConfig>, StorageError> {
        Ok(self
            .get_mcp_clients()
            .await?
            .into_iter()
            .find(|client| client.name == name))
    }

    async fn get_plugins(&self) -> Result<Vec<PluginConfig>, StorageError> {
        Ok(self
            .list(EntityKind::Plugin, None)
            .await?
            .into_iter()
            .filter_map(|record| match record {
                Record::Plugin(p) => Some(p),
                _ => None
            })
            .collect())
    }

    async fn get_record(&self, target: &RecordRef) -> Result<Option<Record>, StorageError> {
        let tables = self.tables.read().await;
        tables.rows.get(target).map(|row| self.unseal(row)).transpose()
    }

    async fn execute_transaction(&self, ops: Vec<StoreOp>) -> Result<(), StorageError> {
        if ops.is_empty() {
            return Ok(());
        }
        let count = ops.len();
        self.commit(move |_| ops).await?;
        tracing::debug!("Committed {} ops on {}", count, self.backend);
        Ok(())
    }

    async fn encrypt_plaintext_rows(&self) -> Result<usize, StorageError> {
        let Some(cipher) = &self.cipher else {
            return Ok(0);
        };

        let pending: Vec<RecordRef> = {
            let tables = self.tables.read().await;
            tables
                .rows
                .values()
                .filter(|row| {
                    row.address.kind.is_secret_bearing()
                        && row.encryption_status == EncryptionStatus::PlainText
                })
                .map(|row| row.address.clone())
                .collect()
        };
        if pending.is_empty() {
            return Ok(0);
        }

        let mut encrypted = 0;
        for batch in pending.chunks(BACKFILL_BATCH_SIZE) {
            let mut guard = self.tables.write().await;
            let mut next = guard.clone();
            let mut in_batch = 0;
            for address in batch {
                let Some(row) = next.rows.get_mut(address) else {
                    continue;
                };
                if row.encryption_status != EncryptionStatus::PlainText {
                    continue;
                }
                row.payload =
                    cipher
                        .encrypt_payload(&row.payload)
                        .map_err(|e| StorageError::EncryptionError {
                            table: address.kind.to_string(),
                            reason: e.to_string()
                        })?;
                row.encryption_status = EncryptionStatus::Encrypted;
                in_batch += 1;
            }
            self.persist(&next)?;
            *guard = next;
            encrypted += in_batch;
            tracing::debug!("Encrypted batch of {} rows", in_batch);
        }

        tracing::info!("Encrypted {} plaintext rows on {}", encrypted, self.backend);
        Ok(encrypted)
    }
}
