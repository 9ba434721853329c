//! # Storage Layer
//!
//! Config store backends for the gateway control plane.
//!
//! - [`InMemoryConfigStore`]: atomic transactions over an ordered row table,
//!   optionally persisted to a JSON snapshot file
//! - [`EncryptionManager`]: AES-256-GCM encryption of secret-bearing rows
//! - [`StoreFactory`]: backend selection

pub mod encryption;
pub mod factory;
pub mod memory;
pub mod rows;

pub use encryption::{EncryptedData, EncryptionError, EncryptionManager};
pub use factory::{StoreBackend, StoreFactory};
pub use memory::{BACKFILL_BATCH_SIZE, InMemoryConfigStore};
pub use rows::{EncryptionStatus, StoredRow};
