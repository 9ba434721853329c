//! Matching file entities against stored ones.
//!
//! [`plan_merge`] is the pure half of reconciliation: it decides, per entity,
//! whether the store needs a create, an update, a delete or nothing, and what
//! the runtime set looks like once those writes land. Nothing here touches
//! the store.

use crate::hash::ConfigHashable;
use errors::ConfigError;
use gw_core::{
    Budget, Customer, EntityKind, Key, McpClientConfig, PluginConfig, RateLimit, Record, RecordRef,
    RoutingRule, StoreOp, Team, VirtualKey, VirtualKeyMcpConfig, VirtualKeyProviderConfig
};
use std::collections::HashSet;

/// What happens to stored entities the file does not mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanPolicy {
    /// Keep them; they were most likely added through the admin surface.
    Preserve,
    /// Remove them. Used for virtual-key associations, which the file owns.
    Delete
}

/// An entity the reconciler can match, hash and persist.
pub trait Reconcilable: ConfigHashable + Clone {
    const KIND: EntityKind;

    /// Id-less file entities may match a stored entity with the same hash.
    const MATCH_BY_HASH: bool = false;

    fn entity_id(&self) -> &str;

    fn set_entity_id(&mut self, id: String);

    fn stored_hash(&self) -> Option<&str>;

    fn set_stored_hash(&mut self, hash: Option<String>);

    /// Natural key used to match id-less file entities.
    fn match_name(&self) -> Option<&str> {
        None
    }

    /// Copies fields the store owns from the matched stored entity.
    fn retain_stored_fields(&mut self, _stored: &Self) {}

    /// Fills generated fields of a brand-new entity.
    fn fill_generated(&mut self) {
        if self.entity_id().is_empty() {
            self.set_entity_id(utils::generate_uuid());
        }
    }

    /// Store record for this entity; `parent` is the owning provider or
    /// virtual key for child kinds.
    fn record(&self, parent: Option<&str>) -> Record;

    fn address(&self, parent: Option<&str>) -> RecordRef {
        match parent {
            Some(parent) => RecordRef::child(Self::KIND, parent, self.entity_id()),
            None => RecordRef::new(Self::KIND, self.entity_id())
        }
    }
}

/// Outcome of matching one collection.
#[derive(Debug)]
pub struct MergePlan<T> {
    /// Runtime set once the planned writes are committed: file order first,
    /// then preserved stored entities.
    pub merged: Vec<T>,
    /// Every admitted file entity with its id and hash filled in.
    pub declared: Vec<T>,
    pub creates: Vec<T>,
    pub updates: Vec<T>,
    pub deletes: Vec<T>,
    pub unchanged: usize,
    pub skipped: Vec<ConfigError>
}

impl<T> MergePlan<T> {
    fn empty() -> Self {
        Self {
            merged: Vec::new(),
            declared: Vec::new(),
            creates: Vec::new(),
            updates: Vec::new(),
            deletes: Vec::new(),
            unchanged: 0,
            skipped: Vec::new()
        }
    }

    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

impl<T: Reconcilable> MergePlan<T> {
    /// Store operations for the plan, creates first.
    #[must_use]
    pub fn store_ops(&self, parent: Option<&str>) -> Vec<StoreOp> {
        let mut ops = Vec::with_capacity(self.creates.len() + self.updates.len() + self.deletes.len());
        ops.extend(self.creates.iter().map(|e| StoreOp::Create(e.record(parent))));
        ops.extend(self.updates.iter().map(|e| StoreOp::Update(e.record(parent))));
        ops.extend(self.deletes.iter().map(|e| StoreOp::Delete(e.address(parent))));
        ops
    }
}

fn find_counterpart<T: Reconcilable>(entity: &T, stored: &[T], claimed: &[bool]) -> Option<usize> {
    let free = |i: &usize| !claimed[*i];
    if T::MATCH_BY_HASH
        && let Ok(hash) = entity.compute_hash()
        && let Some(i) = (0..stored.len())
            .filter(free)
            .find(|i| stored[*i].stored_hash() == Some(hash.as_str()))
    {
        return Some(i);
    }
    let name = entity.match_name().filter(|n| !n.is_empty())?;
    (0..stored.len())
        .filter(free)
        .find(|i| stored[*i].match_name() == Some(name))
}

/// Where a matched entity's `config_hash` comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stamp {
    /// File sync: the fresh hash is stored and compared to the stored one.
    FileSync,
    /// Admin edit: content is compared and the stored hash is kept.
    Edit
}

/// Matches `file` against `stored`.
///
/// File entities with an id match by id only. Id-less ones match by content
/// hash (for kinds that allow it) and then by name. A matched entity whose
/// hash equals the stored hash is unchanged and the stored copy is kept.
/// Entities that fail to hash are skipped; a skipped entity that had a
/// stored counterpart keeps that counterpart in the merged set.
pub fn plan_merge<T: Reconcilable>(file: &[T], stored: &[T], policy: OrphanPolicy) -> MergePlan<T> {
    plan_collection(file, stored, policy, Stamp::FileSync)
}

/// Matches an admin edit against the `current` entities of one collection.
///
/// Matching follows [`plan_merge`] and entities missing from `incoming` are
/// deleted. A matched entity is updated when its content differs from the
/// current content, and it keeps the current `config_hash`: that hash
/// records the last file sync, so reconciling the same file again leaves
/// the edit alone. Only new entities get a freshly computed hash.
pub fn plan_edit<T: Reconcilable>(incoming: &[T], current: &[T]) -> MergePlan<T> {
    plan_collection(incoming, current, OrphanPolicy::Delete, Stamp::Edit)
}

/// Whether `entity` matches `current`, restamping `entity` per `stamp`.
fn compare<T: Reconcilable>(entity: &mut T, current: &T, stamp: Stamp) -> Result<bool, ConfigError> {
    let hash = entity.compute_hash()?;
    match stamp {
        Stamp::FileSync => {
            let same = current.stored_hash() == Some(hash.as_str());
            entity.set_stored_hash(Some(hash));
            Ok(same)
        }
        Stamp::Edit => {
            let same = current.compute_hash()? == hash;
            entity.set_stored_hash(current.stored_hash().map(str::to_string));
            Ok(same)
        }
    }
}

fn plan_collection<T: Reconcilable>(
    file: &[T],
    stored: &[T],
    policy: OrphanPolicy,
    stamp: Stamp
) -> MergePlan<T> {
    let mut plan = MergePlan::empty();
    if file.is_empty() && policy == OrphanPolicy::Preserve {
        plan.merged = stored.to_vec();
        return plan;
    }

    let mut claimed = vec![false; stored.len()];
    let mut seen_ids: HashSet<String> = HashSet::new();

    for declared in file {
        let mut entity = declared.clone();

        let counterpart = if entity.entity_id().is_empty() {
            find_counterpart(&entity, stored, &claimed)
        } else {
            let id = entity.entity_id();
            let position = stored.iter().position(|s| s.entity_id() == id);
            if !seen_ids.insert(id.to_string()) || position.is_some_and(|i| claimed[i]) {
                plan.skipped.push(ConfigError::validation(
                    entity.hash_label(),
                    format!("{} id {} is declared twice", T::KIND, id)
                ));
                continue;
            }
            position
        };

        match counterpart {
            Some(i) => {
                claimed[i] = true;
                let current = &stored[i];
                entity.set_entity_id(current.entity_id().to_string());
                entity.retain_stored_fields(current);
                match compare(&mut entity, current, stamp) {
                    Ok(true) => {
                        plan.unchanged += 1;
                        plan.merged.push(current.clone());
                        plan.declared.push(entity);
                    }
                    Ok(false) => {
                        plan.updates.push(entity.clone());
                        plan.merged.push(entity.clone());
                        plan.declared.push(entity);
                    }
                    Err(e) => {
                        plan.skipped.push(e);
                        plan.merged.push(current.clone());
                    }
                }
            }
            None => {
                entity.fill_generated();
                match entity.compute_hash() {
                    Ok(hash) => {
                        entity.set_stored_hash(Some(hash));
                        plan.creates.push(entity.clone());
                        plan.merged.push(entity.clone());
                        plan.declared.push(entity);
                    }
                    Err(e) => plan.skipped.push(e)
                }
            }
        }
    }

    for (i, orphan) in stored.iter().enumerate() {
        if claimed[i] {
            continue;
        }
        match policy {
            OrphanPolicy::Preserve => plan.merged.push(orphan.clone()),
            OrphanPolicy::Delete => plan.deletes.push(orphan.clone())
        }
    }
    plan
}

macro_rules! id_and_hash {
    () => {
        fn entity_id(&self) -> &str {
            &self.id
        }

        fn set_entity_id(&mut self, id: String) {
            self.id = id;
        }

        fn stored_hash(&self) -> Option<&str> {
            self.config_hash.as_deref()
        }

        fn set_stored_hash(&mut self, hash: Option<String>) {
            self.config_hash = hash;
        }
    };
}

impl Reconcilable for Key {
    const KIND: EntityKind = EntityKind::Key;
    const MATCH_BY_HASH: bool = true;

    id_and_hash!();

    fn match_name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn retain_stored_fields(&mut self, stored: &Self) {
        self.status = stored.status;
        self.description = stored.description.clone();
    }

    fn record(&self, parent: Option<&str>) -> Record {
        Record::Key {
            provider: parent.unwrap_or_default().to_string(),
            key: self.clone()
        }
    }
}

impl Reconcilable for Budget {
    const KIND: EntityKind = EntityKind::Budget;

    id_and_hash!();

    fn retain_stored_fields(&mut self, stored: &Self) {
        self.current_usage = stored.current_usage;
        self.last_reset = stored.last_reset;
    }

    fn record(&self, _parent: Option<&str>) -> Record {
        Record::Budget(self.clone())
    }
}

impl Reconcilable for RateLimit {
    const KIND: EntityKind = EntityKind::RateLimit;

    id_and_hash!();

    fn retain_stored_fields(&mut self, stored: &Self) {
        self.token_current_usage = stored.token_current_usage;
        self.request_current_usage = stored.request_current_usage;
    }

    fn record(&self, _parent: Option<&str>) -> Record {
        Record::RateLimit(self.clone())
    }
}

impl Reconcilable for Customer {
    const KIND: EntityKind = EntityKind::Customer;

    id_and_hash!();

    fn record(&self, _parent: Option<&str>) -> Record {
        Record::Customer(self.clone())
    }
}

impl Reconcilable for Team {
    const KIND: EntityKind = EntityKind::Team;

    id_and_hash!();

    fn record(&self, _parent: Option<&str>) -> Record {
        Record::Team(self.clone())
    }
}

impl Reconcilable for VirtualKey {
    const KIND: EntityKind = EntityKind::VirtualKey;

    id_and_hash!();

    fn match_name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn retain_stored_fields(&mut self, stored: &Self) {
        if self.value.is_empty() {
            self.value = stored.value.clone();
        }
    }

    fn fill_generated(&mut self) {
        if self.id.is_empty() {
            self.id = utils::generate_uuid();
        }
        self.ensure_value();
    }

    fn record(&self, _parent: Option<&str>) -> Record {
        Record::VirtualKey(self.clone())
    }
}

impl Reconcilable for VirtualKeyProviderConfig {
    const KIND: EntityKind = EntityKind::VirtualKeyProviderConfig;

    id_and_hash!();

    fn match_name(&self) -> Option<&str> {
        Some(&self.provider)
    }

    fn record(&self, parent: Option<&str>) -> Record {
        Record::VirtualKeyProviderConfig {
            virtual_key_id: parent.unwrap_or_default().to_string(),
            config: self.clone()
        }
    }
}

impl Reconcilable for VirtualKeyMcpConfig {
    const KIND: EntityKind = EntityKind::VirtualKeyMcpConfig;

    id_and_hash!();

    fn match_name(&self) -> Option<&str> {
        Some(&self.mcp_client_name)
    }

    fn record(&self, parent: Option<&str>) -> Record {
        Record::VirtualKeyMcpConfig {
            virtual_key_id: parent.unwrap_or_default().to_string(),
            config: self.clone()
        }
    }
}

impl Reconcilable for RoutingRule {
    const KIND: EntityKind = EntityKind::RoutingRule;

    id_and_hash!();

    fn record(&self, _parent: Option<&str>) -> Record {
        Record::RoutingRule(self.clone())
    }
}

impl Reconcilable for McpClientConfig {
    const KIND: EntityKind = EntityKind::McpClient;

    id_and_hash!();

    fn match_name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn record(&self, _parent: Option<&str>) -> Record {
        Record::McpClient(self.clone())
    }
}

impl Reconcilable for PluginConfig {
    const KIND: EntityKind = EntityKind::Plugin;

    fn entity_id(&self) -> &str {
        &self.name
    }

    fn set_entity_id(&mut self, id: String) {
        self.name = id;
    }

    fn stored_hash(&self) -> Option<&str> {
        self.config_hash.as_deref()
    }

    fn set_stored_hash(&mut self, hash: Option<String>) {
        self.config_hash = hash;
    }

    fn fill_generated(&mut self) {}

    fn record(&self, _parent: Option<&str>) -> Record {
        Record::Plugin(self.clone())
    }
}
