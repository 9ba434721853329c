use async_trait::async_trait;
use errors::PluginError;
use gw_core::{BasePlugin, PluginConfig};
use std::collections::HashMap;
use std::sync::Arc;

/// Turns a declared plugin into a running instance.
#[async_trait]
pub trait PluginFactory: Send + Sync {
    async fn instantiate(&self, config: &PluginConfig) -> Result<Arc<dyn BasePlugin>, PluginError>;
}

pub type PluginConstructor =
    Arc<dyn Fn(&PluginConfig) -> Result<Arc<dyn BasePlugin>, PluginError> + Send + Sync>;

/// Factory for plugins compiled into the gateway, looked up by name.
///
/// Custom plugins (those with a `path`) are refused: loading code from disk
/// is left to the embedding binary, which can supply its own factory.
#[derive(Default, Clone)]
pub struct BuiltinPluginFactory {
    constructors: HashMap<String, PluginConstructor>
}

impl BuiltinPluginFactory {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_plugin(
        mut self,
        name: impl Into<String>,
        constructor: impl Fn(&PluginConfig) -> Result<Arc<dyn BasePlugin>, PluginError>
        + Send
        + Sync
        + 'static
    ) -> Self {
        self.constructors.insert(name.into(), Arc::new(constructor));
        self
    }

    pub fn knows(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }
}

#[async_trait]
impl PluginFactory for BuiltinPluginFactory {
    async fn instantiate(&self, config: &PluginConfig) -> Result<Arc<dyn BasePlugin>, PluginError> {
        if let Some(path) = &config.path {
            return Err(PluginError::LoadFailed {
                name: config.name.clone(),
                reason: format!("custom plugin at {path} cannot be loaded by the built-in factory")
            });
        }
        let constructor = self
            .constructors
            .get(&config.name)
            .ok_or_else(|| PluginError::LoadFailed {
                name: config.name.clone(),
                reason: "no built-in plugin with this name".to_string()
            })?;
        constructor(config)
    }
}
