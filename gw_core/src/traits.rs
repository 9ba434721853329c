//! Plugin capability traits.
//!
//! Every plugin implements [`BasePlugin`]. Capabilities are opt-in: a plugin
//! that processes LLM requests overrides [`BasePlugin::as_llm_plugin`] to
//! hand out an `Arc<dyn LlmPlugin>` of itself, and so on. The registry asks
//! once per structural change and caches the answer, so request handlers
//! never probe capabilities themselves.

use async_trait::async_trait;
use errors::PluginError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

#[async_trait]
pub trait BasePlugin: Send + Sync {
    /// Unique registry name.
    fn name(&self) -> &str;

    fn display_name(&self) -> String {
        self.name().to_string()
    }

    fn as_llm_plugin(self: Arc<Self>) -> Option<Arc<dyn LlmPlugin>> {
        None
    }

    fn as_mcp_plugin(self: Arc<Self>) -> Option<Arc<dyn McpPlugin>> {
        None
    }

    fn as_http_transport_plugin(self: Arc<Self>) -> Option<Arc<dyn HttpTransportPlugin>> {
        None
    }

    /// Releases resources when the plugin is replaced or unregistered.
    async fn cleanup(&self) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Hooks around every upstream model call.
#[async_trait]
pub trait LlmPlugin: BasePlugin {
    /// May rewrite the request. Returning a response short-circuits the call.
    async fn pre_llm_hook(&self, request: &mut Value) -> Result<Option<Value>, PluginError>;

    async fn post_llm_hook(&self, response: &mut Value) -> Result<(), PluginError>;
}

/// Hooks around MCP tool execution.
#[async_trait]
pub trait McpPlugin: BasePlugin {
    async fn pre_mcp_hook(&self, tool_call: &mut Value) -> Result<(), PluginError>;

    async fn post_mcp_hook(&self, tool_result: &mut Value) -> Result<(), PluginError>;
}

/// Hook on the raw inbound HTTP request, before it is parsed.
#[async_trait]
pub trait HttpTransportPlugin: BasePlugin {
    async fn http_transport_pre_hook(
        &self,
        headers: &mut BTreeMap<String, String>,
        body: &mut Vec<u8>
    ) -> Result<(), PluginError>;
}
