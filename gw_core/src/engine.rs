//! Hot-swap seam into the request-serving engine.

use crate::mcp::McpClientConfig;
use crate::provider::ProviderConfig;
use async_trait::async_trait;
use errors::EngineError;

/// Callbacks the config cache makes after an administrative change has been
/// committed. They run with every cache lock released, so an implementation
/// may take its own locks freely.
///
/// Configs passed in carry resolved secrets.
#[async_trait]
pub trait ServingEngine: Send + Sync {
    /// Creates or replaces the provider's connection pool.
    async fn update_provider(&self, name: &str, config: &ProviderConfig) -> Result<(), EngineError>;

    async fn remove_provider(&self, name: &str) -> Result<(), EngineError>;

    /// Connects a new MCP client or reconnects a changed one.
    async fn upsert_mcp_client(&self, client: &McpClientConfig) -> Result<(), EngineError>;

    async fn remove_mcp_client(&self, name: &str) -> Result<(), EngineError>;
}

/// Engine that accepts every change. Used when the control plane runs
/// without a serving engine attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEngine;

#[async_trait]
impl ServingEngine for NoopEngine {
    async fn update_provider(&self, _name: &str, _config: &ProviderConfig) -> Result<(), EngineError> {
        Ok(())
    }

    async fn remove_provider(&self, _name: &str) -> Result<(), EngineError> {
        Ok(())
    }

    async fn upsert_mcp_client(&self, _client: &McpClientConfig) -> Result<(), EngineError> {
        Ok(())
    }

    async fn remove_mcp_client(&self, _name: &str) -> Result<(), EngineError> {
        Ok(())
    }
}
