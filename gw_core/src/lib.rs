//! # Gateway Control-Plane Core
//!
//! Shared types and traits for the gateway control plane.
//!
//! This crate provides:
//! - The entity model (providers and keys, governance, MCP clients, plugins,
//!   client settings)
//! - [`EnvVar`], the literal-or-environment secret value, with resolution and
//!   redaction
//! - The [`ConfigStore`] persistence trait and its [`StoreOp`] transaction batch
//! - Plugin capability traits consumed by the plugin registry
//! - The [`ServingEngine`] hot-swap seam called after admin mutations

pub mod client;
pub mod engine;
pub mod env;
pub mod governance;
pub mod mcp;
pub mod plugin;
pub mod provider;
pub mod redact;
pub mod store;
pub mod traits;

pub use client::{ClientConfig, HeaderFilterConfig};
pub use engine::{NoopEngine, ServingEngine};
pub use env::{
    EnvFields, EnvLookup, EnvReference, EnvVar, EnvWarning, ProcessEnv, Requirement,
    env_references, resolve_env
};
pub use governance::{
    Budget, Customer, GovernanceConfig, RateLimit, RoutingRule, RoutingScope, RoutingTarget, Team,
    VirtualKey, VirtualKeyMcpConfig, VirtualKeyProviderConfig
};
pub use mcp::{McpClientConfig, McpConnection, StdioConfig};
pub use plugin::PluginConfig;
pub use provider::{
    AzureKeyConfig, BedrockKeyConfig, ConcurrencyAndBufferSize, CustomProviderConfig, Key,
    KeyStatus, NetworkConfig, PricingOverride, ProviderConfig, ProxyConfig, ProxyType,
    VertexKeyConfig
};
pub use redact::{Redact, is_redacted, mask_secret, redact_json};
pub use store::{ConfigStore, EntityKind, Record, RecordRef, StoreOp};
pub use traits::{BasePlugin, HttpTransportPlugin, LlmPlugin, McpPlugin};

/// Turns `validator` output into the control-plane taxonomy.
pub(crate) fn validation_error(
    entity: impl Into<String>,
    errors: &validator::ValidationErrors
) -> errors::ConfigError {
    errors::ConfigError::validation(entity, errors.to_string())
}
