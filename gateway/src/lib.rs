//! # Gateway Control Plane
//!
//! The runtime half of the control plane: the in-memory config cache the
//! request path reads from, the administrative mutations that keep cache,
//! store and serving engine in step, and the boot sequence that builds it all.
//!
//! - [`ConfigCache`]: locked maps for providers, governance and client
//!   settings, a separate lock for MCP clients, and lock-free request
//!   settings and plugin lists
//! - [`GovernanceEntity`]: the per-kind hooks behind generic governance CRUD
//! - [`Bootstrap`]: boot from a config file (or none) to a [`Gateway`]

mod bootstrap;
mod cache;
mod governance;
mod mcp;
mod plugin_admin;
mod providers;
mod settings;

pub use bootstrap::{Bootstrap, Gateway};
pub use cache::ConfigCache;
pub use governance::GovernanceEntity;
pub use settings::RequestSettings;
