//! Store selection from the `config_store` section of the config file.

use crate::encryption::EncryptionManager;
use crate::memory::InMemoryConfigStore;
use errors::StorageError;
use std::path::PathBuf;
use std::sync::Arc;

/// Backend chosen for the config store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    /// Snapshot file persisted after every commit.
    File(PathBuf)
}

impl StoreBackend {
    /// Maps a declared store type to a backend. `file` needs a path, either
    /// from the section's options or the fallback.
    pub fn from_type(
        store_type: &str,
        path: Option<PathBuf>
    ) -> Result<Self, StorageError> {
        match store_type.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => path.map(Self::File).ok_or_else(|| StorageError::ConnectionError {
                backend: "file".to_string(),
                reason: "no snapshot path configured".to_string()
            }),
            other => Err(StorageError::ConnectionError {
                backend: other.to_string(),
                reason: "unsupported config store type".to_string()
            })
        }
    }
}

pub struct StoreFactory;

impl StoreFactory {
    pub fn open(
        backend: &StoreBackend,
        cipher: Option<Arc<EncryptionManager>>
    ) -> Result<Arc<InMemoryConfigStore>, StorageError> {
        let store = match backend {
            StoreBackend::Memory => InMemoryConfigStore::new(),
            StoreBackend::File(path) => InMemoryConfigStore::open(path)?
        };
        if cipher.is_some() {
            tracing::info!("Config store encryption enabled");
        }
        Ok(Arc::new(store.with_cipher(cipher)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_type() {
        assert_eq!(StoreBackend::from_type("memory", None).unwrap(), StoreBackend::Memory);
        assert_eq!(
            StoreBackend::from_type("file", Some(PathBuf::from("/tmp/s.json"))).unwrap(),
            StoreBackend::File(PathBuf::from("/tmp/s.json"))
        );
        assert!(StoreBackend::from_type("file", None).is_err());
        assert!(StoreBackend::from_type("postgres", None).is_err());
    }
}
