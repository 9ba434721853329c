//! MCP client administration.
//!
//! Client names are unique across the cache since the serving engine and the
//! virtual-key tool configs address clients by name.

use crate::cache::{ConfigCache, resolve_secrets, tx_failure};
use crate::providers::restore_secret;
use errors::{ConfigError, EngineError};
use gw_core::{EntityKind, McpClientConfig, Record, RecordRef, StoreOp};
use sync::{ConfigHashable, Reconcilable};
use tracing::instrument::WithSubscriber;

const COLLECTION: &str = "mcp_clients";

impl ConfigCache {
    /// Connects a new MCP client. Returns the stored config with its id.
    pub async fn add_mcp_client(&self, config: McpClientConfig) -> Result<McpClientConfig, ConfigError> {
        self.add_mcp_client_inner(config)
            .with_subscriber(self.dispatch.clone())
            .await
    }

    async fn add_mcp_client_inner(&self, mut config: McpClientConfig) -> Result<McpClientConfig, ConfigError> {
        config.check()?;
        config.fill_generated();
        config.config_hash = Some(config.compute_hash()?);
        let path = format!("mcp.client_configs.{}", config.name);
        resolve_secrets(&mut config, self.env.as_ref(), &path)?;

        let revision = {
            let mut mcp = self.mcp.lock().await;
            if mcp.name_taken(&config.name, None) {
                return Err(ConfigError::already_exists("mcp_client", &config.name));
            }
            if mcp.position(&config.id).is_some() {
                return Err(ConfigError::already_exists("mcp_client", &config.id));
            }
            let entry = self.versioned(config.clone());
            let revision = entry.revision;
            mcp.clients.push(entry);
            if let Err(e) = self
                .store
                .execute_transaction(vec![StoreOp::Create(Record::McpClient(config.clone()))])
                .await
            {
                if let Some(i) = mcp.position(&config.id) {
                    mcp.clients.remove(i);
                }
                return Err(tx_failure(COLLECTION, &e));
            }
            revision
        };

        if let Err(e) = self.engine.upsert_mcp_client(&config).await {
            let mut mcp = self.mcp.lock().await;
            match mcp.position(&config.id) {
                Some(i) if mcp.clients[i].revision == revision => {
                    mcp.clients.remove(i);
                    self.compensate(COLLECTION, vec![StoreOp::Delete(mcp_ref(&config.id))])
                        .await;
                    tracing::warn!(mcp_client = %config.name, error = %e, "Engine rejected new MCP client; rolled back");
                }
                _ => {
                    tracing::warn!(mcp_client = %config.name, error = %e, "Engine rejected new MCP client; a newer write is kept");
                }
            }
            return Err(e.into());
        }

        tracing::info!(mcp_client = %config.name, id = %config.id, transport = config.connection.kind(), "MCP client added");
        Ok(config)
    }

    /// Replaces the client with id `id`.
    ///
    /// A connection string or header echoed back in redacted form keeps the
    /// stored value. An update with the same content as the stored client is
    /// a no-op. The client keeps its `config_hash` from the last file sync.
    pub async fn update_mcp_client(&self, id: &str, config: McpClientConfig) -> Result<(), ConfigError> {
        self.update_mcp_client_inner(id, config)
            .with_subscriber(self.dispatch.clone())
            .await
    }

    async fn update_mcp_client_inner(&self, id: &str, mut config: McpClientConfig) -> Result<(), ConfigError> {
        let (previous, revision) = {
            let mut mcp = self.mcp.lock().await;
            let Some(i) = mcp.position(id) else {
                return Err(ConfigError::not_found("mcp_client", id));
            };
            let previous = mcp.clients[i].clone();

            config.id = id.to_string();
            restore_redacted(&mut config, &previous.value);
            config.check()?;
            if mcp.name_taken(&config.name, Some(id)) {
                return Err(ConfigError::already_exists("mcp_client", &config.name));
            }
            if config.compute_hash()? == previous.value.compute_hash()? {
                tracing::debug!(mcp_client = %config.name, "MCP client unchanged");
                return Ok(());
            }
            config.config_hash = previous.value.config_hash.clone();
            let path = format!("mcp.client_configs.{}", config.name);
            resolve_secrets(&mut config, self.env.as_ref(), &path)?;

            let entry = self.versioned(config.clone());
            let revision = entry.revision;
            mcp.clients[i] = entry;
            if let Err(e) = self
                .store
                .execute_transaction(vec![StoreOp::Update(Record::McpClient(config.clone()))])
                .await
            {
                mcp.clients[i] = previous;
                return Err(tx_failure(COLLECTION, &e));
            }
            (previous, revision)
        };

        if let Err(e) = self.swap_mcp_client(&previous.value.name, &config).await {
            let mut mcp = self.mcp.lock().await;
            match mcp.position(id) {
                Some(i) if mcp.clients[i].revision == revision => {
                    let restored = previous.value.clone();
                    mcp.clients[i] = previous;
                    self.compensate(COLLECTION, vec![StoreOp::Update(Record::McpClient(restored))])
                        .await;
                    tracing::warn!(mcp_client = %config.name, error = %e, "Engine rejected MCP client update; rolled back");
                }
                _ => {
                    tracing::warn!(mcp_client = %config.name, error = %e, "Engine rejected MCP client update; a newer write is kept");
                }
            }
            return Err(e.into());
        }

        tracing::info!(mcp_client = %config.name, id = %id, "MCP client updated");
        Ok(())
    }

    /// A rename disconnects the old name before connecting the new one.
    async fn swap_mcp_client(&self, previous_name: &str, config: &McpClientConfig) -> Result<(), EngineError> {
        if previous_name != config.name {
            self.engine.remove_mcp_client(previous_name).await?;
        }
        self.engine.upsert_mcp_client(config).await
    }

    pub async fn remove_mcp_client(&self, id: &str) -> Result<(), ConfigError> {
        self.remove_mcp_client_inner(id)
            .with_subscriber(self.dispatch.clone())
            .await
    }

    async fn remove_mcp_client_inner(&self, id: &str) -> Result<(), ConfigError> {
        let (previous, index) = {
            let mut mcp = self.mcp.lock().await;
            let Some(i) = mcp.position(id) else {
                return Err(ConfigError::not_found("mcp_client", id));
            };
            let previous = mcp.clients.remove(i);
            if let Err(e) = self.store.delete(mcp_ref(id)).await {
                mcp.clients.insert(i, previous);
                return Err(tx_failure(COLLECTION, &e));
            }
            (previous, i)
        };

        let name = previous.value.name.clone();
        if let Err(e) = self.engine.remove_mcp_client(&name).await {
            let mut mcp = self.mcp.lock().await;
            if mcp.position(id).is_some() || mcp.name_taken(&name, None) {
                tracing::warn!(mcp_client = %name, error = %e, "Engine rejected MCP client removal; a newer write is kept");
            } else {
                let restored = previous.value.clone();
                let at = index.min(mcp.clients.len());
                mcp.clients.insert(at, self.versioned(previous.value));
                self.compensate(COLLECTION, vec![StoreOp::Create(Record::McpClient(restored))])
                    .await;
                tracing::warn!(mcp_client = %name, error = %e, "Engine rejected MCP client removal; rolled back");
            }
            return Err(e.into());
        }

        tracing::info!(mcp_client = %name, id = %id, "MCP client removed");
        Ok(())
    }
}

fn mcp_ref(id: &str) -> RecordRef {
    RecordRef::new(EntityKind::McpClient, id)
}

fn restore_redacted(incoming: &mut McpClientConfig, stored: &McpClientConfig) {
    if let (Some(new), Some(old)) = (
        incoming.connection.connection_string_mut(),
        stored.connection.connection_string()
    ) {
        restore_secret(new, old);
    }
    for (name, value) in &mut incoming.headers {
        if let Some(old) = stored.headers.get(name) {
            restore_secret(value, old);
        }
    }
}
