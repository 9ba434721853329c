//! # Boot Sequence
//!
//! Brings the control plane from a config file (or none) to a populated
//! cache:
//!
//! 1. load and validate the config document
//! 2. resolve the encryption key
//! 3. open the config store with the resulting cipher
//! 4. auto-detect providers on a bare first boot
//! 5. reconcile every collection and populate the cache
//! 6. instantiate plugins
//! 7. encrypt rows written before a key was configured
//!
//! Nothing serves traffic until [`Bootstrap::boot`] returns.

use crate::cache::ConfigCache;
use config::{
    GatewayConfigFile, GatewaySettings, SchemaValidator, StructuralValidator,
    auto_detect_providers, check_schema_identifier, load_document, parse_document,
    resolve_encryption_key
};
use errors::{ConfigError, StorageError};
use gw_core::{ConfigStore, EnvLookup, NoopEngine, ProcessEnv, ServingEngine};
use plugins::{BuiltinPluginFactory, PluginFactory};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storage::{EncryptionManager, StoreBackend, StoreFactory};
use sync::{Reconciler, SyncReport};
use tracing::Dispatch;
use tracing::instrument::WithSubscriber;

/// A booted control plane.
pub struct Gateway {
    cache: Arc<ConfigCache>,
    store: Arc<dyn ConfigStore>,
    report: SyncReport
}

impl Gateway {
    pub fn cache(&self) -> &Arc<ConfigCache> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    /// What the boot-time reconciliation wrote.
    pub fn report(&self) -> &SyncReport {
        &self.report
    }
}

/// Builder for the boot sequence.
pub struct Bootstrap {
    config_path: Option<PathBuf>,
    app_dir: PathBuf,
    store_path: Option<PathBuf>,
    store: Option<Arc<dyn ConfigStore>>,
    env: Arc<dyn EnvLookup>,
    engine: Arc<dyn ServingEngine>,
    plugin_factory: Arc<dyn PluginFactory>,
    validator: Arc<dyn SchemaValidator>,
    dispatch: Dispatch
}

impl Default for Bootstrap {
    fn default() -> Self {
        Self::new()
    }
}

impl Bootstrap {
    pub fn new() -> Self {
        Self {
            config_path: None,
            app_dir: PathBuf::from("."),
            store_path: None,
            store: None,
            env: Arc::new(ProcessEnv),
            engine: Arc::new(NoopEngine),
            plugin_factory: Arc::new(BuiltinPluginFactory::new()),
            validator: Arc::new(StructuralValidator),
            dispatch: tracing::dispatcher::get_default(Dispatch::clone)
        }
    }

    /// Takes the config file, app directory and store path from process
    /// settings.
    pub fn from_settings(settings: &GatewaySettings) -> Self {
        Self {
            config_path: settings.resolved_config_path(),
            app_dir: settings.app_dir.clone(),
            store_path: settings.store_path.clone(),
            ..Self::new()
        }
    }

    #[must_use]
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_env(mut self, env: Arc<dyn EnvLookup>) -> Self {
        self.env = env;
        self
    }

    #[must_use]
    pub fn with_engine(mut self, engine: Arc<dyn ServingEngine>) -> Self {
        self.engine = engine;
        self
    }

    #[must_use]
    pub fn with_plugin_factory(mut self, factory: Arc<dyn PluginFactory>) -> Self {
        self.plugin_factory = factory;
        self
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Uses an already opened store. The file's `config_store` section and
    /// any resolved encryption key are then ignored for opening it.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Snapshot file used when the config file has no `config_store`
    /// section.
    #[must_use]
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Runs the boot sequence.
    ///
    /// # Errors
    ///
    /// Fails on an unreadable or structurally invalid config file, an
    /// unusable encryption key, or a store that cannot be opened. Problems
    /// with individual entities are logged and reported in
    /// [`Gateway::report`] instead.
    pub async fn boot(self) -> Result<Gateway, ConfigError> {
        let dispatch = self.dispatch.clone();
        self.run().with_subscriber(dispatch).await
    }

    async fn run(self) -> Result<Gateway, ConfigError> {
        let mut file = match &self.config_path {
            Some(path) => self.load_file(path)?,
            None => {
                tracing::info!("No config file found; running from the config store");
                GatewayConfigFile::default()
            }
        };

        let cipher = self.cipher(&file)?;
        let store = self.open_store(&file, cipher)?;

        if self.config_path.is_none() && file.providers.is_none() {
            let stored = store.get_providers().await?;
            if stored.is_empty() {
                let detected = auto_detect_providers(self.env.as_ref());
                if !detected.is_empty() {
                    tracing::info!(providers = detected.len(), "Auto-detected providers from the environment");
                    file.providers = Some(detected);
                }
            }
        }

        let mut state = Reconciler::new(Arc::clone(&store), Arc::clone(&self.env))
            .with_dispatch(self.dispatch.clone())
            .reconcile_all(&file)
            .await;
        let report = std::mem::take(&mut state.report);

        let cache = ConfigCache::new(Arc::clone(&store), Arc::clone(&self.env))
            .with_engine(Arc::clone(&self.engine))
            .with_plugin_factory(Arc::clone(&self.plugin_factory))
            .with_dispatch(self.dispatch.clone());
        let cache = Arc::new(cache);
        cache.populate(state).await;
        cache.load_plugins().await;

        match store.encrypt_plaintext_rows().await {
            Ok(0) => {}
            Ok(rows) => tracing::info!(rows, "Encrypted plaintext config rows"),
            Err(e) => tracing::error!(error = %e, "Encryption backfill failed; rows stay in plaintext")
        }

        tracing::info!(
            backend = store.backend(),
            writes = report.total_writes(),
            failed_collections = report.failures().len(),
            "Gateway control plane ready"
        );
        Ok(Gateway {
            cache,
            store,
            report
        })
    }

    fn load_file(&self, path: &Path) -> Result<GatewayConfigFile, ConfigError> {
        let document = load_document(path).map_err(|e| e.into_config_error(path))?;

        let schema = self.validator.validate(&document);
        for diagnostic in &schema.diagnostics {
            tracing::warn!(path = %path.display(), "{}", diagnostic);
        }
        if !schema.valid {
            return Err(ConfigError::validation(
                format!("config file {}", path.display()),
                schema.summary()
            ));
        }

        let file = parse_document(document).map_err(|e| e.into_config_error(path))?;
        if let Some(warning) = check_schema_identifier(&file) {
            tracing::warn!(path = %path.display(), "{}", warning);
        }
        tracing::info!(path = %path.display(), "Config file loaded");
        Ok(file)
    }

    fn cipher(&self, file: &GatewayConfigFile) -> Result<Option<Arc<EncryptionManager>>, ConfigError> {
        let Some(key) = resolve_encryption_key(file.encryption_key.as_ref(), self.env.as_ref()) else {
            tracing::info!("No encryption key configured; secrets are stored in plaintext");
            return Ok(None);
        };
        let manager = EncryptionManager::from_passphrase(key.passphrase()).map_err(|e| {
            StorageError::EncryptionError {
                table: "config_store".to_string(),
                reason: e.to_string()
            }
        })?;
        tracing::info!(source = ?key.source, "Encryption key resolved");
        Ok(Some(Arc::new(manager)))
    }

    fn open_store(
        &self,
        file: &GatewayConfigFile,
        cipher: Option<Arc<EncryptionManager>>
    ) -> Result<Arc<dyn ConfigStore>, ConfigError> {
        if let Some(store) = &self.store {
            return Ok(Arc::clone(store));
        }
        let backend = match file.config_store.as_ref().filter(|s| s.enabled) {
            Some(section) => {
                let path = section
                    .option("path")
                    .map(|p| self.app_dir.join(p))
                    .or_else(|| self.store_path.clone());
                StoreBackend::from_type(&section.store_type, path)?
            }
            None => match &self.store_path {
                Some(path) => StoreBackend::File(path.clone()),
                None => StoreBackend::Memory
            }
        };
        tracing::info!(backend = ?backend, "Opening config store");
        let store: Arc<dyn ConfigStore> = StoreFactory::open(&backend, cipher)?;
        Ok(store)
    }
}
