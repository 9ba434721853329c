//! Governance CRUD and client settings updates.
//!
//! Every governance collection goes through the same three generic
//! operations; [`GovernanceEntity`] supplies what differs per kind (where the
//! collection lives, which ids it references, what references it).

use crate::cache::{ConfigCache, tx_failure};
use errors::ConfigError;
use gw_core::{
    Budget, ClientConfig, Customer, GovernanceConfig, RateLimit, Redact, RoutingRule,
    RoutingScope, StoreOp, Team, VirtualKey, is_redacted
};
use sync::{ConfigHashable, Reconcilable, plan_edit};
use tracing::instrument::WithSubscriber;

/// A governance kind managed through the cache.
pub trait GovernanceEntity: Reconcilable + Send + Sync + 'static {
    /// Collection name used in transaction errors.
    const COLLECTION: &'static str;

    fn collection(governance: &GovernanceConfig) -> &Vec<Self>;

    fn collection_mut(governance: &mut GovernanceConfig) -> &mut Vec<Self>;

    /// Structural checks; the entity has an id by the time this runs.
    fn validate_entity(&self) -> Result<(), ConfigError>;

    /// Checks that every id this entity points at exists. `has_provider`
    /// answers for provider names.
    fn check_references(
        &self,
        _governance: &GovernanceConfig,
        _has_provider: &dyn Fn(&str) -> bool
    ) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Describes the first entity that still points at `id`, if any.
    fn referenced_by(_id: &str, _governance: &GovernanceConfig) -> Option<String> {
        None
    }

    /// Puts back secrets the caller echoed in their redacted form.
    fn restore_redacted(&mut self, _previous: &Self) {}

    /// Plans child rows and replaces them with their merged form.
    fn prepare_children(&mut self, _previous: Option<&Self>) -> Result<Vec<StoreOp>, ConfigError> {
        Ok(Vec::new())
    }
}

fn missing(entity: String, kind: &str, id: &str) -> ConfigError {
    ConfigError::validation(entity, format!("{kind} {id} does not exist"))
}

fn require<T>(
    entity: &str,
    kind: &str,
    id: Option<&str>,
    lookup: impl Fn(&str) -> Option<T>
) -> Result<(), ConfigError> {
    match id {
        Some(id) if lookup(id).is_none() => Err(missing(entity.to_string(), kind, id)),
        _ => Ok(())
    }
}

fn scoped_rule(governance: &GovernanceConfig, scope: RoutingScope, id: &str) -> Option<String> {
    governance
        .routing_rules
        .iter()
        .find(|r| r.scope == scope && r.scope_id.as_deref() == Some(id))
        .map(|r| format!("routing_rule {}", r.id))
}

impl GovernanceEntity for Budget {
    const COLLECTION: &'static str = "budgets";

    fn collection(governance: &GovernanceConfig) -> &Vec<Self> {
        &governance.budgets
    }

    fn collection_mut(governance: &mut GovernanceConfig) -> &mut Vec<Self> {
        &mut governance.budgets
    }

    fn validate_entity(&self) -> Result<(), ConfigError> {
        self.check()
    }

    fn referenced_by(id: &str, governance: &GovernanceConfig) -> Option<String> {
        let id = Some(id);
        if let Some(c) = governance.customers.iter().find(|c| c.budget_id.as_deref() == id) {
            return Some(format!("customer {}", c.id));
        }
        if let Some(t) = governance.teams.iter().find(|t| t.budget_id.as_deref() == id) {
            return Some(format!("team {}", t.id));
        }
        governance
            .virtual_keys
            .iter()
            .find(|vk| {
                vk.budget_id.as_deref() == id
                    || vk.provider_configs.iter().any(|pc| pc.budget_id.as_deref() == id)
            })
            .map(|vk| format!("virtual_key {}", vk.id))
    }
}

impl GovernanceEntity for RateLimit {
    const COLLECTION: &'static str = "rate_limits";

    fn collection(governance: &GovernanceConfig) -> &Vec<Self> {
        &governance.rate_limits
    }

    fn collection_mut(governance: &mut GovernanceConfig) -> &mut Vec<Self> {
        &mut governance.rate_limits
    }

    fn validate_entity(&self) -> Result<(), ConfigError> {
        self.check()
    }

    fn referenced_by(id: &str, governance: &GovernanceConfig) -> Option<String> {
        let id = Some(id);
        if let Some(c) = governance.customers.iter().find(|c| c.rate_limit_id.as_deref() == id) {
            return Some(format!("customer {}", c.id));
        }
        if let Some(t) = governance.teams.iter().find(|t| t.rate_limit_id.as_deref() == id) {
            return Some(format!("team {}", t.id));
        }
        governance
            .virtual_keys
            .iter()
            .find(|vk| {
                vk.rate_limit_id.as_deref() == id
                    || vk.provider_configs.iter().any(|pc| pc.rate_limit_id.as_deref() == id)
            })
            .map(|vk| format!("virtual_key {}", vk.id))
    }
}

impl GovernanceEntity for Customer {
    const COLLECTION: &'static str = "customers";

    fn collection(governance: &GovernanceConfig) -> &Vec<Self> {
        &governance.customers
    }

    fn collection_mut(governance: &mut GovernanceConfig) -> &mut Vec<Self> {
        &mut governance.customers
    }

    fn validate_entity(&self) -> Result<(), ConfigError> {
        self.check()
    }

    fn check_references(
        &self,
        governance: &GovernanceConfig,
        _has_provider: &dyn Fn(&str) -> bool
    ) -> Result<(), ConfigError> {
        let entity = format!("customer {}", self.id);
        require(&entity, "budget", self.budget_id.as_deref(), |id| governance.budget(id))?;
        require(&entity, "rate_limit", self.rate_limit_id.as_deref(), |id| governance.rate_limit(id))
    }

    fn referenced_by(id: &str, governance: &GovernanceConfig) -> Option<String> {
        if let Some(t) = governance.teams.iter().find(|t| t.customer_id.as_deref() == Some(id)) {
            return Some(format!("team {}", t.id));
        }
        if let Some(vk) = governance
            .virtual_keys
            .iter()
            .find(|vk| vk.customer_id.as_deref() == Some(id))
        {
            return Some(format!("virtual_key {}", vk.id));
        }
        scoped_rule(governance, RoutingScope::Customer, id)
    }
}

impl GovernanceEntity for Team {
    const COLLECTION: &'static str = "teams";

    fn collection(governance: &GovernanceConfig) -> &Vec<Self> {
        &governance.teams
    }

    fn collection_mut(governance: &mut GovernanceConfig) -> &mut Vec<Self> {
        &mut governance.teams
    }

    fn validate_entity(&self) -> Result<(), ConfigError> {
        self.check()
    }

    fn check_references(
        &self,
        governance: &GovernanceConfig,
        _has_provider: &dyn Fn(&str) -> bool
    ) -> Result<(), ConfigError> {
        let entity = format!("team {}", self.id);
        require(&entity, "customer", self.customer_id.as_deref(), |id| governance.customer(id))?;
        require(&entity, "budget", self.budget_id.as_deref(), |id| governance.budget(id))?;
        require(&entity, "rate_limit", self.rate_limit_id.as_deref(), |id| governance.rate_limit(id))
    }

    fn referenced_by(id: &str, governance: &GovernanceConfig) -> Option<String> {
        if let Some(vk) = governance
            .virtual_keys
            .iter()
            .find(|vk| vk.team_id.as_deref() == Some(id))
        {
            return Some(format!("virtual_key {}", vk.id));
        }
        scoped_rule(governance, RoutingScope::Team, id)
    }
}

impl GovernanceEntity for VirtualKey {
    const COLLECTION: &'static str = "virtual_keys";

    fn collection(governance: &GovernanceConfig) -> &Vec<Self> {
        &governance.virtual_keys
    }

    fn collection_mut(governance: &mut GovernanceConfig) -> &mut Vec<Self> {
        &mut governance.virtual_keys
    }

    fn validate_entity(&self) -> Result<(), ConfigError> {
        self.check()
    }

    fn check_references(
        &self,
        governance: &GovernanceConfig,
        has_provider: &dyn Fn(&str) -> bool
    ) -> Result<(), ConfigError> {
        let entity = format!("virtual_key {}", self.id);
        if governance
            .virtual_keys
            .iter()
            .any(|vk| vk.id != self.id && vk.value == self.value)
        {
            return Err(ConfigError::validation(entity, "value is already issued to another virtual key"));
        }
        require(&entity, "team", self.team_id.as_deref(), |id| governance.team(id))?;
        require(&entity, "customer", self.customer_id.as_deref(), |id| governance.customer(id))?;
        require(&entity, "budget", self.budget_id.as_deref(), |id| governance.budget(id))?;
        require(&entity, "rate_limit", self.rate_limit_id.as_deref(), |id| governance.rate_limit(id))?;
        for pc in &self.provider_configs {
            if !has_provider(&pc.provider) {
                return Err(missing(entity, "provider", &pc.provider));
            }
            require(&entity, "budget", pc.budget_id.as_deref(), |id| governance.budget(id))?;
            require(&entity, "rate_limit", pc.rate_limit_id.as_deref(), |id| governance.rate_limit(id))?;
        }
        Ok(())
    }

    fn referenced_by(id: &str, governance: &GovernanceConfig) -> Option<String> {
        scoped_rule(governance, RoutingScope::VirtualKey, id)
    }

    fn restore_redacted(&mut self, previous: &Self) {
        if is_redacted(&self.value) && self.value == previous.redacted().value {
            self.value = previous.value.clone();
        }
    }

    fn prepare_children(&mut self, previous: Option<&Self>) -> Result<Vec<StoreOp>, ConfigError> {
        let (stored_providers, stored_mcp) = match previous {
            Some(p) => (p.provider_configs.as_slice(), p.mcp_configs.as_slice()),
            None => (&[][..], &[][..])
        };
        let providers = plan_edit(&self.provider_configs, stored_providers);
        let mcp = plan_edit(&self.mcp_configs, stored_mcp);

        let mut ops = providers.store_ops(Some(self.id.as_str()));
        ops.extend(mcp.store_ops(Some(self.id.as_str())));
        if let Some(e) = providers.skipped.into_iter().chain(mcp.skipped).next() {
            return Err(e);
        }
        self.provider_configs = providers.merged;
        self.mcp_configs = mcp.merged;
        Ok(ops)
    }
}

impl GovernanceEntity for RoutingRule {
    const COLLECTION: &'static str = "routing_rules";

    fn collection(governance: &GovernanceConfig) -> &Vec<Self> {
        &governance.routing_rules
    }

    fn collection_mut(governance: &mut GovernanceConfig) -> &mut Vec<Self> {
        &mut governance.routing_rules
    }

    fn validate_entity(&self) -> Result<(), ConfigError> {
        self.check()
    }

    fn check_references(
        &self,
        governance: &GovernanceConfig,
        has_provider: &dyn Fn(&str) -> bool
    ) -> Result<(), ConfigError> {
        let entity = format!("routing_rule {}", self.id);
        for target in &self.targets {
            if !has_provider(&target.provider) {
                return Err(missing(entity, "provider", &target.provider));
            }
        }
        let scope_id = self.scope_id.as_deref();
        match self.scope {
            RoutingScope::Global => Ok(()),
            RoutingScope::Customer => require(&entity, "customer", scope_id, |id| governance.customer(id)),
            RoutingScope::Team => require(&entity, "team", scope_id, |id| governance.team(id)),
            RoutingScope::VirtualKey => {
                require(&entity, "virtual_key", scope_id, |id| governance.virtual_key(id))
            }
        }
    }
}

impl ConfigCache {
    /// Admits a new governance entity. Returns it with its generated id,
    /// hash and (for virtual keys) secret value.
    pub async fn create_governance<T: GovernanceEntity>(&self, entity: T) -> Result<T, ConfigError> {
        self.create_governance_inner(entity)
            .with_subscriber(self.dispatch.clone())
            .await
    }

    async fn create_governance_inner<T: GovernanceEntity>(&self, mut entity: T) -> Result<T, ConfigError> {
        entity.fill_generated();
        entity.validate_entity()?;

        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let id = entity.entity_id().to_string();
        if T::collection(&state.governance).iter().any(|e| e.entity_id() == id) {
            return Err(ConfigError::already_exists(T::KIND.as_str(), id));
        }
        let providers = &state.providers;
        entity.check_references(&state.governance, &|name: &str| providers.contains_key(name))?;

        let children = entity.prepare_children(None)?;
        entity.set_stored_hash(Some(entity.compute_hash()?));
        let mut ops = vec![StoreOp::Create(entity.record(None))];
        ops.extend(children);

        T::collection_mut(&mut state.governance).push(entity.clone());
        if let Err(e) = self.store.execute_transaction(ops).await {
            T::collection_mut(&mut state.governance).pop();
            return Err(tx_failure(T::COLLECTION, &e));
        }

        tracing::info!(kind = %T::KIND, id = %id, "Governance entity created");
        Ok(entity)
    }

    /// Replaces the entity with id `id`. Usage counters, other store-owned
    /// fields and the `config_hash` are carried over from the current entity.
    pub async fn update_governance<T: GovernanceEntity>(&self, id: &str, entity: T) -> Result<T, ConfigError> {
        self.update_governance_inner(id, entity)
            .with_subscriber(self.dispatch.clone())
            .await
    }

    async fn update_governance_inner<T: GovernanceEntity>(&self, id: &str, mut entity: T) -> Result<T, ConfigError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let Some(i) = T::collection(&state.governance)
            .iter()
            .position(|e| e.entity_id() == id)
        else {
            return Err(ConfigError::not_found(T::KIND.as_str(), id));
        };
        let previous = T::collection(&state.governance)[i].clone();

        entity.set_entity_id(id.to_string());
        entity.restore_redacted(&previous);
        entity.retain_stored_fields(&previous);
        entity.validate_entity()?;
        let providers = &state.providers;
        entity.check_references(&state.governance, &|name: &str| providers.contains_key(name))?;

        let children = entity.prepare_children(Some(&previous))?;
        let changed = entity.compute_hash()? != previous.compute_hash()?;
        if !changed && children.is_empty() {
            tracing::debug!(kind = %T::KIND, id = %id, "Governance entity unchanged");
            return Ok(previous);
        }
        entity.set_stored_hash(previous.stored_hash().map(str::to_string));
        let mut ops = Vec::with_capacity(children.len() + 1);
        if changed {
            ops.push(StoreOp::Update(entity.record(None)));
        }
        ops.extend(children);

        T::collection_mut(&mut state.governance)[i] = entity.clone();
        if let Err(e) = self.store.execute_transaction(ops).await {
            T::collection_mut(&mut state.governance)[i] = previous;
            return Err(tx_failure(T::COLLECTION, &e));
        }

        tracing::info!(kind = %T::KIND, id = %id, "Governance entity updated");
        Ok(entity)
    }

    /// Deletes the entity with id `id`. Fails while another entity still
    /// references it.
    pub async fn delete_governance<T: GovernanceEntity>(&self, id: &str) -> Result<(), ConfigError> {
        self.delete_governance_inner::<T>(id)
            .with_subscriber(self.dispatch.clone())
            .await
    }

    async fn delete_governance_inner<T: GovernanceEntity>(&self, id: &str) -> Result<(), ConfigError> {
        let mut state = self.state.write().await;
        let Some(i) = T::collection(&state.governance)
            .iter()
            .position(|e| e.entity_id() == id)
        else {
            return Err(ConfigError::not_found(T::KIND.as_str(), id));
        };
        if let Some(holder) = T::referenced_by(id, &state.governance) {
            return Err(ConfigError::validation(
                format!("{} {id}", T::KIND),
                format!("still referenced by {holder}")
            ));
        }

        let previous = T::collection_mut(&mut state.governance).remove(i);
        if let Err(e) = self.store.delete(previous.address(None)).await {
            T::collection_mut(&mut state.governance).insert(i, previous);
            return Err(tx_failure(T::COLLECTION, &e));
        }

        tracing::info!(kind = %T::KIND, id = %id, "Governance entity deleted");
        Ok(())
    }

    /// Replaces the client settings and republishes the lock-free request
    /// settings snapshot.
    pub async fn update_client_config(&self, config: ClientConfig) -> Result<(), ConfigError> {
        self.update_client_config_inner(config)
            .with_subscriber(self.dispatch.clone())
            .await
    }

    async fn update_client_config_inner(&self, mut config: ClientConfig) -> Result<(), ConfigError> {
        config.check()?;
        let hash = config.compute_hash()?;

        let mut state = self.state.write().await;
        if state.client_config.compute_hash()? == hash {
            tracing::debug!("Client config unchanged");
            return Ok(());
        }
        config.config_hash = state.client_config.config_hash.clone();
        let previous = std::mem::replace(&mut state.client_config, config.clone());
        if let Err(e) = self.store.update_client_config(&config).await {
            state.client_config = previous;
            return Err(tx_failure("client_config", &e));
        }
        self.publish_settings(&config);

        tracing::info!(
            enable_governance = config.enable_governance,
            enable_logging = config.enable_logging,
            "Client config updated"
        );
        Ok(())
    }
}
