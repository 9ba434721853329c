use async_trait::async_trait;
use errors::EngineError;
use gw_core::{McpClientConfig, ProviderConfig, ServingEngine};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Notify, oneshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    UpdateProvider(String),
    RemoveProvider(String),
    UpsertMcpClient(String),
    RemoveMcpClient(String)
}

/// Serving engine that records every hot swap.
///
/// `fail_next(n)` makes the next `n` calls fail. `hold_next_call` parks the
/// next call until the returned sender fires, so tests can interleave a
/// second mutation while the first is inside the engine.
#[derive(Default)]
pub struct RecordingEngine {
    calls: Mutex<Vec<EngineCall>>,
    providers: Mutex<Vec<(String, ProviderConfig)>>,
    mcp_clients: Mutex<Vec<McpClientConfig>>,
    failures: AtomicUsize,
    gate: Mutex<Option<(Arc<Notify>, oneshot::Receiver<()>)>>
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, calls: usize) {
        self.failures.store(calls, Ordering::SeqCst);
    }

    /// Returns a notifier signalled when the held call arrives and the
    /// sender that lets it continue.
    pub fn hold_next_call(&self) -> (Arc<Notify>, oneshot::Sender<()>) {
        let entered = Arc::new(Notify::new());
        let (release, wait) = oneshot::channel();
        *self.gate.lock() = Some((Arc::clone(&entered), wait));
        (entered, release)
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    /// Last config handed over for `name`.
    pub fn provider(&self, name: &str) -> Option<ProviderConfig> {
        self.providers
            .lock()
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, config)| config.clone())
    }

    pub fn mcp_client(&self, name: &str) -> Option<McpClientConfig> {
        self.mcp_clients
            .lock()
            .iter()
            .rev()
            .find(|c| c.name == name)
            .cloned()
    }

    async fn enter(&self, call: EngineCall) -> bool {
        self.calls.lock().push(call);
        let fail = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let gate = self.gate.lock().take();
        if let Some((entered, wait)) = gate {
            entered.notify_one();
            let _ = wait.await;
        }
        fail
    }
}

#[async_trait]
impl ServingEngine for RecordingEngine {
    async fn update_provider(&self, name: &str, config: &ProviderConfig) -> Result<(), EngineError> {
        if self.enter(EngineCall::UpdateProvider(name.to_string())).await {
            return Err(EngineError::ProviderUpdate {
                provider: name.to_string(),
                reason: "injected engine failure".to_string()
            });
        }
        self.providers.lock().push((name.to_string(), config.clone()));
        Ok(())
    }

    async fn remove_provider(&self, name: &str) -> Result<(), EngineError> {
        if self.enter(EngineCall::RemoveProvider(name.to_string())).await {
            return Err(EngineError::ProviderUpdate {
                provider: name.to_string(),
                reason: "injected engine failure".to_string()
            });
        }
        Ok(())
    }

    async fn upsert_mcp_client(&self, client: &McpClientConfig) -> Result<(), EngineError> {
        if self.enter(EngineCall::UpsertMcpClient(client.name.clone())).await {
            return Err(EngineError::McpUpdate {
                client: client.name.clone(),
                reason: "injected engine failure".to_string()
            });
        }
        self.mcp_clients.lock().push(client.clone());
        Ok(())
    }

    async fn remove_mcp_client(&self, name: &str) -> Result<(), EngineError> {
        if self.enter(EngineCall::RemoveMcpClient(name.to_string())).await {
            return Err(EngineError::McpUpdate {
                client: name.to_string(),
                reason: "injected engine failure".to_string()
            });
        }
        Ok(())
    }
}
