use async_trait::async_trait;
use errors::PluginError;
use gw_core::{BasePlugin, HttpTransportPlugin, LlmPlugin, McpPlugin};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Plugin with configurable capabilities that counts its cleanups.
#[derive(Debug, Default)]
pub struct StubPlugin {
    name: String,
    llm: bool,
    mcp: bool,
    http: bool,
    fail_cleanup: bool,
    cleanups: Arc<AtomicUsize>
}

impl StubPlugin {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn llm(mut self) -> Self {
        self.llm = true;
        self
    }

    #[must_use]
    pub fn mcp(mut self) -> Self {
        self.mcp = true;
        self
    }

    #[must_use]
    pub fn http(mut self) -> Self {
        self.http = true;
        self
    }

    #[must_use]
    pub fn failing_cleanup(mut self) -> Self {
        self.fail_cleanup = true;
        self
    }

    /// Shared counter, readable after the plugin has been moved into a registry.
    pub fn cleanup_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.cleanups)
    }

    pub fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BasePlugin for StubPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_llm_plugin(self: Arc<Self>) -> Option<Arc<dyn LlmPlugin>> {
        if self.llm { Some(self) } else { None }
    }

    fn as_mcp_plugin(self: Arc<Self>) -> Option<Arc<dyn McpPlugin>> {
        if self.mcp { Some(self) } else { None }
    }

    fn as_http_transport_plugin(self: Arc<Self>) -> Option<Arc<dyn HttpTransportPlugin>> {
        if self.http { Some(self) } else { None }
    }

    async fn cleanup(&self) -> Result<(), PluginError> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        if self.fail_cleanup {
            return Err(PluginError::CleanupFailed {
                name: self.name.clone(),
                reason: "stub cleanup failure".to_string()
            });
        }
        Ok(())
    }
}

#[async_trait]
impl LlmPlugin for StubPlugin {
    async fn pre_llm_hook(&self, request: &mut Value) -> Result<Option<Value>, PluginError> {
        if let Some(obj) = request.as_object_mut() {
            obj.insert(format!("seen_by_{}", self.name), Value::Bool(true));
        }
        Ok(None)
    }

    async fn post_llm_hook(&self, _response: &mut Value) -> Result<(), PluginError> {
        Ok(())
    }
}

#[async_trait]
impl McpPlugin for StubPlugin {
    async fn pre_mcp_hook(&self, _tool_call: &mut Value) -> Result<(), PluginError> {
        Ok(())
    }

    async fn post_mcp_hook(&self, _tool_result: &mut Value) -> Result<(), PluginError> {
        Ok(())
    }
}

#[async_trait]
impl HttpTransportPlugin for StubPlugin {
    async fn http_transport_pre_hook(
        &self,
        _headers: &mut BTreeMap<String, String>,
        _body: &mut Vec<u8>
    ) -> Result<(), PluginError> {
        Ok(())
    }
}
