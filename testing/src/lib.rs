//! Shared test fixtures for the gateway workspace.
//!
//! - [`LogCapture`]: a `tracing` dispatcher that records events so tests can
//!   assert on what an injected logger received
//! - [`FaultyStore`]: wraps a [`gw_core::ConfigStore`] and fails reads or
//!   transactions for chosen entity kinds
//! - [`RecordingEngine`]: a serving engine that records hot swaps and can
//!   be told to fail or to park a call
//! - Config builders, a map-backed environment and stub plugins

mod engine;
mod faulty;
mod fixtures;
mod logs;
mod stubs;

pub use engine::{EngineCall, RecordingEngine};
pub use faulty::FaultyStore;
pub use fixtures::*;
pub use logs::{CapturedEvent, LogCapture};
pub use stubs::StubPlugin;
