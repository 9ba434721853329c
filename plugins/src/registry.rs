use crate::factory::PluginFactory;
use crate::status::{PluginStatus, infer_plugin_types};
use arc_swap::ArcSwap;
use errors::PluginError;
use gw_core::{BasePlugin, HttpTransportPlugin, LlmPlugin, McpPlugin, PluginConfig};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::Dispatch;
use tracing::instrument::WithSubscriber;

/// Immutable view of the loaded plugins, in registration order.
#[derive(Default)]
pub struct PluginSet {
    plugins: Vec<Arc<dyn BasePlugin>>,
    llm: Vec<Arc<dyn LlmPlugin>>,
    mcp: Vec<Arc<dyn McpPlugin>>,
    http: Vec<Arc<dyn HttpTransportPlugin>>
}

impl PluginSet {
    fn build(plugins: Vec<Arc<dyn BasePlugin>>) -> Self {
        let llm = plugins
            .iter()
            .filter_map(|p| Arc::clone(p).as_llm_plugin())
            .collect();
        let mcp = plugins
            .iter()
            .filter_map(|p| Arc::clone(p).as_mcp_plugin())
            .collect();
        let http = plugins
            .iter()
            .filter_map(|p| Arc::clone(p).as_http_transport_plugin())
            .collect();
        Self {
            plugins,
            llm,
            mcp,
            http
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.plugins.iter().position(|p| p.name() == name)
    }

    pub fn plugins(&self) -> &[Arc<dyn BasePlugin>] {
        &self.plugins
    }

    pub fn llm_plugins(&self) -> &[Arc<dyn LlmPlugin>] {
        &self.llm
    }

    pub fn mcp_plugins(&self) -> &[Arc<dyn McpPlugin>] {
        &self.mcp
    }

    pub fn http_transport_plugins(&self) -> &[Arc<dyn HttpTransportPlugin>] {
        &self.http
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn BasePlugin>> {
        self.plugins.iter().find(|p| p.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

pub struct PluginRegistry {
    current: ArcSwap<PluginSet>,
    /// Serializes writers. Readers only ever touch `current`.
    writer: Mutex<()>,
    statuses: RwLock<BTreeMap<String, PluginStatus>>,
    dispatch: Dispatch
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(PluginSet::default()),
            writer: Mutex::new(()),
            statuses: RwLock::new(BTreeMap::new()),
            dispatch: tracing::dispatcher::get_default(Dispatch::clone)
        }
    }

    #[must_use]
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Publishes the set produced by `change`.
    ///
    /// Writers take `writer` so sets are not rebuilt only to lose the race;
    /// the compare-and-swap retry still guards the publish itself. `change`
    /// may run more than once and must not have side effects.
    fn swap<R>(
        &self,
        mut change: impl FnMut(&PluginSet) -> Result<(Vec<Arc<dyn BasePlugin>>, R), PluginError>
    ) -> Result<R, PluginError> {
        let _writer = self.writer.lock();
        let mut current = self.current.load_full();
        loop {
            let (plugins, out) = change(&current)?;
            let next = Arc::new(PluginSet::build(plugins));
            let previous = self.current.compare_and_swap(&current, next);
            if Arc::ptr_eq(&previous, &current) {
                return Ok(out);
            }
            current = arc_swap::Guard::into_inner(previous);
        }
    }

    /// Adds a plugin. Fails if one with the same name is loaded.
    pub fn register(&self, plugin: Arc<dyn BasePlugin>) -> Result<(), PluginError> {
        let name = plugin.name().to_string();
        self.swap(|set| {
            if set.position(&name).is_some() {
                return Err(PluginError::AlreadyRegistered { name: name.clone() });
            }
            let mut plugins = set.plugins.clone();
            plugins.push(Arc::clone(&plugin));
            Ok((plugins, ()))
        })?;
        tracing::dispatcher::with_default(&self.dispatch, || {
            tracing::info!(plugin = %name, "Plugin registered");
        });
        Ok(())
    }

    /// Replaces the plugin with the same name in place, or appends it. The
    /// replaced instance is cleaned up after the new set is published.
    pub async fn reload(&self, plugin: Arc<dyn BasePlugin>) -> Result<(), PluginError> {
        let name = plugin.name().to_string();
        let replaced = self.swap(|set| {
            let mut plugins = set.plugins.clone();
            let old = match set.position(&name) {
                Some(i) => Some(std::mem::replace(&mut plugins[i], Arc::clone(&plugin))),
                None => {
                    plugins.push(Arc::clone(&plugin));
                    None
                }
            };
            Ok((plugins, old))
        })?;
        async {
            match replaced {
                Some(old) => {
                    tracing::info!(plugin = %name, "Plugin reloaded");
                    cleanup(old.as_ref()).await;
                }
                None => tracing::info!(plugin = %name, "Plugin registered")
            }
        }
        .with_subscriber(self.dispatch.clone())
        .await;
        Ok(())
    }

    /// Removes a plugin and cleans it up.
    pub async fn unregister(&self, name: &str) -> Result<(), PluginError> {
        let removed = self.swap(|set| {
            let i = set.position(name).ok_or_else(|| PluginError::NotFound {
                name: name.to_string()
            })?;
            let mut plugins = set.plugins.clone();
            let old = plugins.remove(i);
            Ok((plugins, old))
        })?;
        async {
            tracing::info!(plugin = %name, "Plugin unregistered");
            cleanup(removed.as_ref()).await;
        }
        .with_subscriber(self.dispatch.clone())
        .await;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn BasePlugin>> {
        self.current.load().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.current.load().names()
    }

    /// The set as of now. Holding it does not block writers.
    pub fn snapshot(&self) -> Arc<PluginSet> {
        self.current.load_full()
    }

    pub fn llm_plugins(&self) -> Vec<Arc<dyn LlmPlugin>> {
        self.current.load().llm.clone()
    }

    pub fn mcp_plugins(&self) -> Vec<Arc<dyn McpPlugin>> {
        self.current.load().mcp.clone()
    }

    pub fn http_transport_plugins(&self) -> Vec<Arc<dyn HttpTransportPlugin>> {
        self.current.load().http.clone()
    }

    pub fn set_status(&self, status: PluginStatus) {
        self.statuses.write().insert(status.name.clone(), status);
    }

    pub fn status(&self, name: &str) -> Option<PluginStatus> {
        self.statuses.read().get(name).cloned()
    }

    pub fn statuses(&self) -> Vec<PluginStatus> {
        self.statuses.read().values().cloned().collect()
    }

    pub fn remove_status(&self, name: &str) -> Option<PluginStatus> {
        self.statuses.write().remove(name)
    }

    /// Instantiates and loads one declared plugin, recording its status.
    ///
    /// Disabled plugins are unloaded if present. Factory failures are
    /// recorded as an `error` status and returned.
    pub async fn apply_config(
        &self,
        factory: &dyn PluginFactory,
        config: &PluginConfig
    ) -> Result<(), PluginError> {
        if !config.enabled {
            if self.get(&config.name).is_some() {
                self.unregister(&config.name).await?;
            }
            self.set_status(PluginStatus::disabled(&config.name));
            return Ok(());
        }
        match factory.instantiate(config).await {
            Ok(plugin) => {
                let types = infer_plugin_types(&plugin);
                self.reload(plugin).await?;
                self.set_status(PluginStatus::active(&config.name, types));
                Ok(())
            }
            Err(e) => {
                tracing::dispatcher::with_default(&self.dispatch, || {
                    tracing::error!(plugin = %config.name, error = %e, "Failed to load plugin");
                });
                self.set_status(PluginStatus::error(&config.name, e.to_string()));
                Err(e)
            }
        }
    }

    /// Applies every config in order. Individual failures are recorded in
    /// the status map and do not stop the others.
    pub async fn load_all(&self, factory: &dyn PluginFactory, configs: &[PluginConfig]) {
        for config in configs {
            let _ = self.apply_config(factory, config).await;
        }
    }
}

async fn cleanup(plugin: &dyn BasePlugin) {
    if let Err(e) = plugin.cleanup().await {
        tracing::warn!(plugin = %plugin.name(), error = %e, "Plugin cleanup failed");
    }
}
