//! # Plugin Registry
//!
//! Plugins are read on every request and replaced rarely. The registry keeps
//! the loaded set in an [`arc_swap::ArcSwap`] so readers never take a lock;
//! writers are serialized behind a mutex, build a new set and publish it
//! with a compare-and-swap.
//!
//! Capability lists (LLM, MCP, HTTP transport) are computed once per change
//! and stored alongside the plugin list.

mod factory;
mod registry;
mod status;

pub use factory::{BuiltinPluginFactory, PluginConstructor, PluginFactory};
pub use registry::{PluginRegistry, PluginSet};
pub use status::{PluginState, PluginStatus, PluginType, infer_plugin_types};
