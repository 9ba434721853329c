use gw_core::BasePlugin;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    Active,
    Disabled,
    Error
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Disabled => "disabled",
            Self::Error => "error"
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginType {
    Llm,
    Mcp,
    HttpTransport
}

/// What the admin surface reports for one declared plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginStatus {
    pub name: String,
    pub status: PluginState,
    pub logs: Vec<String>,
    pub types: Vec<PluginType>
}

impl PluginStatus {
    pub fn active(name: impl Into<String>, types: Vec<PluginType>) -> Self {
        let name = name.into();
        Self {
            logs: vec![format!("plugin {name} initialized successfully")],
            name,
            status: PluginState::Active,
            types
        }
    }

    pub fn disabled(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            logs: vec![format!("plugin {name} is disabled")],
            name,
            status: PluginState::Disabled,
            types: Vec::new()
        }
    }

    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: PluginState::Error,
            logs: vec![message.into()],
            types: Vec::new()
        }
    }
}

/// Capabilities an instance exposes.
pub fn infer_plugin_types(plugin: &Arc<dyn BasePlugin>) -> Vec<PluginType> {
    let mut types = Vec::new();
    if Arc::clone(plugin).as_llm_plugin().is_some() {
        types.push(PluginType::Llm);
    }
    if Arc::clone(plugin).as_mcp_plugin().is_some() {
        types.push(PluginType::Mcp);
    }
    if Arc::clone(plugin).as_http_transport_plugin().is_some() {
        types.push(PluginType::HttpTransport);
    }
    types
}
