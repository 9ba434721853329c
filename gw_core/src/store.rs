//! Persistence contract for the control plane.
//!
//! The store is the durable mirror of the in-memory cache. It is read at boot
//! and written on every reconciliation pass or administrative mutation.
//! Writes are expressed as a batch of [`StoreOp`]s that commit atomically.

use crate::client::ClientConfig;
use crate::governance::{
    Budget, Customer, RateLimit, RoutingRule, Team, VirtualKey, VirtualKeyMcpConfig,
    VirtualKeyProviderConfig
};
use crate::mcp::McpClientConfig;
use crate::plugin::PluginConfig;
use crate::provider::{Key, ProviderConfig};
use async_trait::async_trait;
use errors::StorageError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Id under which the single client settings row is stored.
pub const CLIENT_CONFIG_ID: &str = "client";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    ClientConfig,
    Provider,
    Key,
    Budget,
    RateLimit,
    Customer,
    Team,
    VirtualKey,
    VirtualKeyProviderConfig,
    VirtualKeyMcpConfig,
    RoutingRule,
    McpClient,
    Plugin
}

impl EntityKind {
    pub const ALL: [Self; 13] = [
        Self::ClientConfig,
        Self::Provider,
        Self::Key,
        Self::Budget,
        Self::RateLimit,
        Self::Customer,
        Self::Team,
        Self::VirtualKey,
        Self::VirtualKeyProviderConfig,
        Self::VirtualKeyMcpConfig,
        Self::RoutingRule,
        Self::McpClient,
        Self::Plugin
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientConfig => "client_config",
            Self::Provider => "provider",
            Self::Key => "key",
            Self::Budget => "budget",
            Self::RateLimit => "rate_limit",
            Self::Customer => "customer",
            Self::Team => "team",
            Self::VirtualKey => "virtual_key",
            Self::VirtualKeyProviderConfig => "virtual_key_provider_config",
            Self::VirtualKeyMcpConfig => "virtual_key_mcp_config",
            Self::RoutingRule => "routing_rule",
            Self::McpClient => "mcp_client",
            Self::Plugin => "plugin"
        }
    }

    /// Kinds whose rows can hold secret material and are encrypted at rest.
    #[must_use]
    pub fn is_secret_bearing(self) -> bool {
        matches!(
            self,
            Self::Provider | Self::Key | Self::VirtualKey | Self::McpClient | Self::Plugin
        )
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted row. Parent-scoped kinds carry their parent id.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    ClientConfig(ClientConfig),
    /// Provider-level settings. The `keys` field is ignored on write and
    /// filled from key rows on read.
    Provider { id: String, config: ProviderConfig },
    Key { provider: String, key: Key },
    Budget(Budget),
    RateLimit(RateLimit),
    Customer(Customer),
    Team(Team),
    /// Associations are ignored on write and filled from association rows.
    VirtualKey(VirtualKey),
    VirtualKeyProviderConfig {
        virtual_key_id: String,
        config: VirtualKeyProviderConfig
    },
    VirtualKeyMcpConfig {
        virtual_key_id: String,
        config: VirtualKeyMcpConfig
    },
    RoutingRule(RoutingRule),
    McpClient(McpClientConfig),
    Plugin(PluginConfig)
}

impl Record {
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::ClientConfig(_) => EntityKind::ClientConfig,
            Self::Provider { .. } => EntityKind::Provider,
            Self::Key { .. } => EntityKind::Key,
            Self::Budget(_) => EntityKind::Budget,
            Self::RateLimit(_) => EntityKind::RateLimit,
            Self::Customer(_) => EntityKind::Customer,
            Self::Team(_) => EntityKind::Team,
            Self::VirtualKey(_) => EntityKind::VirtualKey,
            Self::VirtualKeyProviderConfig { .. } => EntityKind::VirtualKeyProviderConfig,
            Self::VirtualKeyMcpConfig { .. } => EntityKind::VirtualKeyMcpConfig,
            Self::RoutingRule(_) => EntityKind::RoutingRule,
            Self::McpClient(_) => EntityKind::McpClient,
            Self::Plugin(_) => EntityKind::Plugin
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::ClientConfig(_) => CLIENT_CONFIG_ID,
            Self::Provider { id, .. } => id,
            Self::Key { key, .. } => &key.id,
            Self::Budget(b) => &b.id,
            Self::RateLimit(r) => &r.id,
            Self::Customer(c) => &c.id,
            Self::Team(t) => &t.id,
            Self::VirtualKey(v) => &v.id,
            Self::VirtualKeyProviderConfig { config, .. } => &config.id,
            Self::VirtualKeyMcpConfig { config, .. } => &config.id,
            Self::RoutingRule(r) => &r.id,
            Self::McpClient(m) => &m.id,
            Self::Plugin(p) => &p.name
        }
    }

    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        match self {
            Self::Key { provider, .. } => Some(provider),
            Self::VirtualKeyProviderConfig { virtual_key_id, .. }
            | Self::VirtualKeyMcpConfig { virtual_key_id, .. } => Some(virtual_key_id),
            _ => None
        }
    }

    #[must_use]
    pub fn config_hash(&self) -> Option<&str> {
        match self {
            Self::ClientConfig(c) => c.config_hash.as_deref(),
            Self::Provider { config, .. } => config.config_hash.as_deref(),
            Self::Key { key, .. } => key.config_hash.as_deref(),
            Self::Budget(b) => b.config_hash.as_deref(),
            Self::RateLimit(r) => r.config_hash.as_deref(),
            Self::Customer(c) => c.config_hash.as_deref(),
            Self::Team(t) => t.config_hash.as_deref(),
            Self::VirtualKey(v) => v.config_hash.as_deref(),
            Self::VirtualKeyProviderConfig { config, .. } => config.config_hash.as_deref(),
            Self::VirtualKeyMcpConfig { config, .. } => config.config_hash.as_deref(),
            Self::RoutingRule(r) => r.config_hash.as_deref(),
            Self::McpClient(m) => m.config_hash.as_deref(),
            Self::Plugin(p) => p.config_hash.as_deref()
        }
    }

    #[must_use]
    pub fn reference(&self) -> RecordRef {
        RecordRef {
            kind: self.kind(),
            id: self.id().to_string(),
            parent: self.parent().map(str::to_string)
        }
    }
}

/// Address of a stored row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordRef {
    pub kind: EntityKind,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>
}

impl RecordRef {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            parent: None
        }
    }

    pub fn child(kind: EntityKind, parent: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            parent: Some(parent.into())
        }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent {
            Some(parent) => write!(f, "{}:{}/{}", self.kind, parent, self.id),
            None => write!(f, "{}:{}", self.kind, self.id)
        }
    }
}

/// One write inside a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    /// Fails if the row exists.
    Create(Record),
    /// Fails if the row does not exist.
    Update(Record),
    /// Fails if the row does not exist. Deleting a provider or virtual key
    /// also deletes its child rows.
    Delete(RecordRef)
}

impl StoreOp {
    #[must_use]
    pub fn target(&self) -> RecordRef {
        match self {
            Self::Create(record) | Self::Update(record) => record.reference(),
            Self::Delete(target) => target.clone()
        }
    }
}

/// Abstract persistence for every control-plane entity.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Backend name used in errors and logs.
    fn backend(&self) -> &str;

    async fn get_client_config(&self) -> Result<Option<ClientConfig>, StorageError>;

    /// Hash of the stored client settings, without decoding the row.
    async fn get_client_config_hash(&self) -> Result<Option<String>, StorageError>;

    /// Upserts the client settings together with their `config_hash`.
    async fn update_client_config(&self, config: &ClientConfig) -> Result<(), StorageError>;

    /// Providers with their keys attached.
    async fn get_providers(&self) -> Result<BTreeMap<String, ProviderConfig>, StorageError>;

    async fn get_provider(&self, id: &str) -> Result<Option<ProviderConfig>, StorageError>;

    async fn get_keys(&self, provider: &str) -> Result<Vec<Key>, StorageError>;

    async fn get_budgets(&self) -> Result<Vec<Budget>, StorageError>;

    async fn get_rate_limits(&self) -> Result<Vec<RateLimit>, StorageError>;

    async fn get_customers(&self) -> Result<Vec<Customer>, StorageError>;

    async fn get_teams(&self) -> Result<Vec<Team>, StorageError>;

    /// Virtual keys with both association collections attached.
    async fn get_virtual_keys(&self) -> Result<Vec<VirtualKey>, StorageError>;

    async fn get_routing_rules(&self) -> Result<Vec<RoutingRule>, StorageError>;

    async fn get_mcp_clients(&self) -> Result<Vec<McpClientConfig>, StorageError>;

    async fn get_mcp_client_by_name(&self, name: &str) -> Result<Option<McpClientConfig>, StorageError>;

    async fn get_plugins(&self) -> Result<Vec<PluginConfig>, StorageError>;

    /// Single row lookup by address.
    async fn get_record(&self, target: &RecordRef) -> Result<Option<Record>, StorageError>;

    /// Applies every op or none of them.
    async fn execute_transaction(&self, ops: Vec<StoreOp>) -> Result<(), StorageError>;

    async fn create(&self, record: Record) -> Result<(), StorageError> {
        self.execute_transaction(vec![StoreOp::Create(record)]).await
    }

    async fn update(&self, record: Record) -> Result<(), StorageError> {
        self.execute_transaction(vec![StoreOp::Update(record)]).await
    }

    async fn delete(&self, target: RecordRef) -> Result<(), StorageError> {
        self.execute_transaction(vec![StoreOp::Delete(target)]).await
    }

    /// Encrypts rows still stored in plaintext. Returns how many rows were
    /// rewritten; zero when encryption is inactive or nothing is left to do.
    async fn encrypt_plaintext_rows(&self) -> Result<usize, StorageError>;
}
