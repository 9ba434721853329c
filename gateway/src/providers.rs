//! Provider administration.

use crate::cache::{ConfigCache, resolve_secrets, tx_failure};
use errors::ConfigError;
use gw_core::{
    EntityKind, EnvVar, Key, ProviderConfig, Record, RecordRef, Redact, StoreOp, is_redacted
};
use sync::{ConfigHashable, plan_edit};
use tracing::instrument::WithSubscriber;

const COLLECTION: &str = "providers";

impl ConfigCache {
    /// Admits a new provider.
    ///
    /// Keys without an id get one. A required environment variable that is
    /// not set rejects the provider before anything is written.
    pub async fn add_provider(&self, name: &str, config: ProviderConfig) -> Result<(), ConfigError> {
        self.add_provider_inner(name, config)
            .with_subscriber(self.dispatch.clone())
            .await
    }

    async fn add_provider_inner(&self, name: &str, mut config: ProviderConfig) -> Result<(), ConfigError> {
        config.validate_for(name)?;
        let (keys, key_ops) = plan_keys(name, &config.keys, &[])?;
        config.keys = keys;
        config.config_hash = Some(config.compute_hash()?);
        resolve_secrets(&mut config, self.env.as_ref(), &format!("providers.{name}"))?;

        let mut ops = vec![StoreOp::Create(provider_record(name, &config))];
        ops.extend(key_ops);

        let revision = {
            let mut state = self.state.write().await;
            if state.providers.contains_key(name) {
                return Err(ConfigError::already_exists("provider", name));
            }
            let entry = self.versioned(config.clone());
            let revision = entry.revision;
            state.providers.insert(name.to_string(), entry);
            if let Err(e) = self.store.execute_transaction(ops).await {
                state.providers.remove(name);
                return Err(tx_failure(COLLECTION, &e));
            }
            revision
        };

        if let Err(e) = self.engine.update_provider(name, &config).await {
            let mut state = self.state.write().await;
            if state.providers.get(name).is_some_and(|p| p.revision == revision) {
                state.providers.remove(name);
                self.compensate(COLLECTION, vec![StoreOp::Delete(provider_ref(name))])
                    .await;
                tracing::warn!(provider = %name, error = %e, "Engine rejected new provider; rolled back");
            } else {
                tracing::warn!(provider = %name, error = %e, "Engine rejected new provider; a newer write is kept");
            }
            return Err(e.into());
        }

        tracing::info!(provider = %name, keys = config.keys.len(), "Provider added");
        Ok(())
    }

    /// Replaces a provider's settings and key set.
    ///
    /// Secrets echoed back in their redacted form (as returned by
    /// [`ConfigCache::redacted_provider`]) keep the stored value. Keys missing
    /// from `config` are deleted.
    ///
    /// The provider and its existing keys keep their `config_hash`, which is
    /// only stamped by a file sync. Reconciling an unchanged file afterwards
    /// therefore keeps the edit.
    pub async fn update_provider_config(
        &self,
        name: &str,
        config: ProviderConfig
    ) -> Result<(), ConfigError> {
        self.update_provider_inner(name, config)
            .with_subscriber(self.dispatch.clone())
            .await
    }

    async fn update_provider_inner(&self, name: &str, mut config: ProviderConfig) -> Result<(), ConfigError> {
        config.validate_for(name)?;

        let (previous, revision) = {
            let mut state = self.state.write().await;
            let Some(current) = state.providers.get(name) else {
                return Err(ConfigError::not_found("provider", name));
            };
            let previous = current.clone();

            restore_redacted_secrets(&mut config, &previous.value);
            let (keys, key_ops) = plan_keys(name, &config.keys, &previous.value.keys)?;
            config.keys = keys;
            let changed = config.compute_hash()? != previous.value.compute_hash()?;
            config.config_hash = previous.value.config_hash.clone();
            resolve_secrets(&mut config, self.env.as_ref(), &format!("providers.{name}"))?;

            let mut ops = Vec::new();
            if changed {
                ops.push(StoreOp::Update(provider_record(name, &config)));
            }
            ops.extend(key_ops);
            if ops.is_empty() {
                tracing::debug!(provider = %name, "Provider unchanged");
                return Ok(());
            }

            let entry = self.versioned(config.clone());
            let revision = entry.revision;
            state.providers.insert(name.to_string(), entry);
            if let Err(e) = self.store.execute_transaction(ops).await {
                state.providers.insert(name.to_string(), previous);
                return Err(tx_failure(COLLECTION, &e));
            }
            (previous, revision)
        };

        if let Err(e) = self.engine.update_provider(name, &config).await {
            let mut state = self.state.write().await;
            if state.providers.get(name).is_some_and(|p| p.revision == revision) {
                let ops = transition_ops(name, &config, &previous.value);
                state.providers.insert(name.to_string(), previous);
                self.compensate(COLLECTION, ops).await;
                tracing::warn!(provider = %name, error = %e, "Engine rejected provider update; rolled back");
            } else {
                tracing::warn!(provider = %name, error = %e, "Engine rejected provider update; a newer write is kept");
            }
            return Err(e.into());
        }

        tracing::info!(provider = %name, keys = config.keys.len(), "Provider updated");
        Ok(())
    }

    /// Removes a provider and its keys.
    pub async fn remove_provider(&self, name: &str) -> Result<(), ConfigError> {
        self.remove_provider_inner(name)
            .with_subscriber(self.dispatch.clone())
            .await
    }

    async fn remove_provider_inner(&self, name: &str) -> Result<(), ConfigError> {
        let previous = {
            let mut state = self.state.write().await;
            let Some(previous) = state.providers.remove(name) else {
                return Err(ConfigError::not_found("provider", name));
            };
            if let Err(e) = self.store.delete(provider_ref(name)).await {
                state.providers.insert(name.to_string(), previous);
                return Err(tx_failure(COLLECTION, &e));
            }
            previous
        };

        if let Err(e) = self.engine.remove_provider(name).await {
            let mut state = self.state.write().await;
            if state.providers.contains_key(name) {
                tracing::warn!(provider = %name, error = %e, "Engine rejected provider removal; a newer write is kept");
            } else {
                let mut ops = vec![StoreOp::Create(provider_record(name, &previous.value))];
                ops.extend(previous.value.keys.iter().map(|k| StoreOp::Create(key_record(name, k))));
                state.providers.insert(name.to_string(), self.versioned(previous.value));
                self.compensate(COLLECTION, ops).await;
                tracing::warn!(provider = %name, error = %e, "Engine rejected provider removal; rolled back");
            }
            return Err(e.into());
        }

        tracing::info!(provider = %name, "Provider removed");
        Ok(())
    }
}

fn provider_ref(name: &str) -> RecordRef {
    RecordRef::new(EntityKind::Provider, name)
}

fn provider_record(name: &str, config: &ProviderConfig) -> Record {
    Record::Provider {
        id: name.to_string(),
        config: config.clone()
    }
}

fn key_record(provider: &str, key: &Key) -> Record {
    Record::Key {
        provider: provider.to_string(),
        key: key.clone()
    }
}

/// Plans `provider`'s key rows going from `current` to `incoming`. Keys not
/// in `incoming` are deleted; kept keys keep their `config_hash`.
fn plan_keys(
    provider: &str,
    incoming: &[Key],
    current: &[Key]
) -> Result<(Vec<Key>, Vec<StoreOp>), ConfigError> {
    let plan = plan_edit(incoming, current);
    let ops = plan.store_ops(Some(provider));
    if let Some(e) = plan.skipped.into_iter().next() {
        return Err(e);
    }
    Ok((plan.merged, ops))
}

/// Store ops that turn the persisted `from` provider back into `to`, hashes
/// included.
fn transition_ops(name: &str, from: &ProviderConfig, to: &ProviderConfig) -> Vec<StoreOp> {
    let mut ops = vec![StoreOp::Update(provider_record(name, to))];
    for key in &to.keys {
        match from.key(&key.id) {
            Some(current) if current == key => {}
            Some(_) => ops.push(StoreOp::Update(key_record(name, key))),
            None => ops.push(StoreOp::Create(key_record(name, key)))
        }
    }
    ops.extend(
        from.keys
            .iter()
            .filter(|k| to.key(&k.id).is_none())
            .map(|k| StoreOp::Delete(RecordRef::child(EntityKind::Key, name, &k.id)))
    );
    ops
}

pub(crate) fn restore_secret(incoming: &mut EnvVar, stored: &EnvVar) {
    let shown = incoming.reference();
    if is_redacted(&shown) && shown == stored.redacted().reference() {
        *incoming = stored.clone();
    }
}

fn restore_optional(incoming: &mut Option<EnvVar>, stored: Option<&EnvVar>) {
    if let (Some(incoming), Some(stored)) = (incoming.as_mut(), stored) {
        restore_secret(incoming, stored);
    }
}

/// Puts stored secrets back where `incoming` carries their redacted form.
fn restore_redacted_secrets(incoming: &mut ProviderConfig, stored: &ProviderConfig) {
    for key in &mut incoming.keys {
        let counterpart = if key.id.is_empty() {
            stored.keys.iter().find(|k| !key.name.is_empty() && k.name == key.name)
        } else {
            stored.key(&key.id)
        };
        let Some(old) = counterpart else {
            continue;
        };
        restore_secret(&mut key.value, &old.value);
        if let (Some(new), Some(old)) = (&mut key.azure_key_config, &old.azure_key_config) {
            restore_optional(&mut new.client_id, old.client_id.as_ref());
            restore_optional(&mut new.client_secret, old.client_secret.as_ref());
        }
        if let (Some(new), Some(old)) = (&mut key.vertex_key_config, &old.vertex_key_config) {
            restore_optional(&mut new.auth_credentials, old.auth_credentials.as_ref());
        }
        if let (Some(new), Some(old)) = (&mut key.bedrock_key_config, &old.bedrock_key_config) {
            restore_optional(&mut new.access_key, old.access_key.as_ref());
            restore_optional(&mut new.secret_key, old.secret_key.as_ref());
            restore_optional(&mut new.session_token, old.session_token.as_ref());
        }
    }
    if let (Some(new), Some(old)) = (&mut incoming.proxy_config, &stored.proxy_config) {
        restore_optional(&mut new.password, old.password.as_ref());
    }
}
