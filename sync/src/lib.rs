//! # Config Sync
//!
//! Content hashing and reconciliation of the config file with the store.
//!
//! - [`hash`]: per-entity content hashes that ignore bookkeeping fields
//! - [`merge`]: pure matching of file entities against stored ones
//! - [`reconcile`]: the [`Reconciler`] that writes merge plans to the store
//! - [`report`]: per-collection outcome counts

pub mod hash;
pub mod merge;
pub mod reconcile;
pub mod report;

pub use hash::ConfigHashable;
pub use merge::{MergePlan, OrphanPolicy, Reconcilable, plan_edit, plan_merge};
pub use reconcile::{ProviderEntry, ReconciledState, Reconciler};
pub use report::{CollectionReport, SyncReport};

#[cfg(test)]
mod proptests;
