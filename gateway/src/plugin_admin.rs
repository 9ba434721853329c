//! Plugin administration: persisted configs plus the live registry.

use crate::cache::{ConfigCache, tx_failure};
use errors::ConfigError;
use gw_core::{EntityKind, PluginConfig, Record, RecordRef, StoreOp};
use plugins::PluginStatus;
use sync::ConfigHashable;
use tracing::instrument::WithSubscriber;

const COLLECTION: &str = "plugins";

impl ConfigCache {
    /// Persists `config` (creating or replacing it by name) and applies it to
    /// the registry.
    ///
    /// A replaced config keeps its `config_hash` from the last file sync. A
    /// plugin that fails to instantiate keeps its persisted config and an
    /// `error` status; the failure is returned.
    pub async fn reload_plugin(&self, config: PluginConfig) -> Result<(), ConfigError> {
        self.reload_plugin_inner(config)
            .with_subscriber(self.dispatch.clone())
            .await
    }

    async fn reload_plugin_inner(&self, mut config: PluginConfig) -> Result<(), ConfigError> {
        config.check()?;
        let hash = config.compute_hash()?;

        {
            let mut state = self.state.write().await;
            let position = state.plugins.iter().position(|p| p.name == config.name);
            let current_hash = position.map(|i| state.plugins[i].compute_hash()).transpose()?;
            match position {
                Some(_) if current_hash.as_deref() == Some(hash.as_str()) => {
                    tracing::debug!(plugin = %config.name, "Plugin config unchanged");
                }
                Some(i) => {
                    config.config_hash = state.plugins[i].config_hash.clone();
                    let previous = std::mem::replace(&mut state.plugins[i], config.clone());
                    if let Err(e) = self
                        .store
                        .execute_transaction(vec![StoreOp::Update(Record::Plugin(config.clone()))])
                        .await
                    {
                        state.plugins[i] = previous;
                        return Err(tx_failure(COLLECTION, &e));
                    }
                }
                None => {
                    config.config_hash = Some(hash);
                    state.plugins.push(config.clone());
                    if let Err(e) = self
                        .store
                        .execute_transaction(vec![StoreOp::Create(Record::Plugin(config.clone()))])
                        .await
                    {
                        state.plugins.pop();
                        return Err(tx_failure(COLLECTION, &e));
                    }
                }
            }
        }

        self.plugins
            .apply_config(self.plugin_factory.as_ref(), &config)
            .await?;
        tracing::info!(plugin = %config.name, enabled = config.enabled, "Plugin config applied");
        Ok(())
    }

    /// Unloads a running plugin without touching its persisted config. The
    /// next boot loads it again.
    pub async fn unregister_plugin(&self, name: &str) -> Result<(), ConfigError> {
        async {
            self.plugins.unregister(name).await?;
            self.plugins.set_status(PluginStatus::disabled(name));
            tracing::info!(plugin = %name, "Plugin unloaded until next boot");
            Ok(())
        }
        .with_subscriber(self.dispatch.clone())
        .await
    }

    /// Deletes the persisted config and unloads the plugin if it is running.
    pub async fn delete_plugin(&self, name: &str) -> Result<(), ConfigError> {
        self.delete_plugin_inner(name)
            .with_subscriber(self.dispatch.clone())
            .await
    }

    async fn delete_plugin_inner(&self, name: &str) -> Result<(), ConfigError> {
        {
            let mut state = self.state.write().await;
            let Some(i) = state.plugins.iter().position(|p| p.name == name) else {
                return Err(ConfigError::not_found("plugin", name));
            };
            let previous = state.plugins.remove(i);
            if let Err(e) = self.store.delete(RecordRef::new(EntityKind::Plugin, name)).await {
                state.plugins.insert(i, previous);
                return Err(tx_failure(COLLECTION, &e));
            }
        }

        if self.plugins.get(name).is_some() {
            self.plugins.unregister(name).await?;
        }
        self.plugins.remove_status(name);
        tracing::info!(plugin = %name, "Plugin deleted");
        Ok(())
    }
}
