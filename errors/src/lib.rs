//! # Gateway Errors
//!
//! Error taxonomy shared by every control-plane crate.
//!
//! - `ConfigError` is what reconciliation and administrative callers see.
//! - `StorageError` is raised by `ConfigStore` implementations and wrapped
//!   into `ConfigError::Storage` on the way up.
//! - `PluginError` and `EngineError` come from the plugin registry and the
//!   serving engine's hot-swap callbacks respectively.

use thiserror::Error;

/// Storage layer errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Connection to {backend} failed: {reason}")]
    ConnectionError { backend: String, reason: String },

    #[error("Query on {backend} failed: {reason}")]
    QueryError { backend: String, reason: String },

    #[error("Serialization error: {error_type} - {reason}")]
    SerializationError { error_type: String, reason: String },

    #[error("Encryption error on {table}: {reason}")]
    EncryptionError { table: String, reason: String },

    #[error("Not found on {backend}:{id}")]
    NotFound { backend: String, id: String },

    #[error("Transaction on {backend} failed: {reason}")]
    TransactionError { backend: String, reason: String }
}

/// Plugin registry and plugin lifecycle errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PluginError {
    #[error("Plugin already registered: {name}")]
    AlreadyRegistered { name: String },

    #[error("Plugin not found: {name}")]
    NotFound { name: String },

    #[error("Plugin {name} failed to load: {reason}")]
    LoadFailed { name: String, reason: String },

    #[error("Plugin {name} hook failed: {reason}")]
    HookFailed { name: String, reason: String },

    #[error("Plugin {name} cleanup failed: {reason}")]
    CleanupFailed { name: String, reason: String }
}

/// Failures reported by the serving engine when a hot swap is rejected
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("Provider pool update for {provider} failed: {reason}")]
    ProviderUpdate { provider: String, reason: String },

    #[error("MCP client update for {client} failed: {reason}")]
    McpUpdate { client: String, reason: String }
}

/// Control-plane errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: String, id: String },

    #[error("Validation failed for {entity}: {reason}")]
    ValidationFailure { entity: String, reason: String },

    #[error("Environment variable {var} referenced by {path} is not set")]
    EnvReferenceMissing { var: String, path: String },

    #[error("Could not hash {entity}: {reason}")]
    HashGenerationFailure { entity: String, reason: String },

    #[error("Transaction for {collection} failed: {reason}")]
    TransactionFailure { collection: String, reason: String },

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Plugin(#[from] PluginError)
}

impl ConfigError {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into()
        }
    }

    pub fn already_exists(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            id: id.into()
        }
    }

    pub fn validation(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ValidationFailure {
            entity: entity.into(),
            reason: reason.into()
        }
    }

    /// Errors that only invalidate the entity being processed. Reconciliation
    /// logs these and moves on to the entity's siblings.
    #[must_use]
    pub fn is_entity_scoped(&self) -> bool {
        matches!(
            self,
            Self::HashGenerationFailure { .. }
                | Self::EnvReferenceMissing { .. }
                | Self::ValidationFailure { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
