/// Row-level encryption using AES-256-GCM.
///
/// Keys are derived from an operator passphrase with SHA-256. Every encrypted
/// payload records the id of the key that produced it, so rows written under
/// a retired passphrase stay readable once that passphrase is added back with
/// [`EncryptionManager::add_passphrase`].
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng}
};
use base64::{Engine as _, engine::general_purpose};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use zeroize::Zeroizing;

pub const ALGORITHM: &str = "AES-256-GCM";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Invalid encrypted data format")]
    InvalidFormat
}

/// Encrypted payload with the metadata needed to decrypt it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedData {
    /// Base64-encoded ciphertext
    pub ciphertext: String,

    /// Base64-encoded nonce
    pub nonce: String,

    pub key_id: String,

    pub algorithm: String,

    pub encrypted_at: chrono::DateTime<chrono::Utc>
}

pub struct EncryptionManager {
    keys: RwLock<HashMap<String, Arc<Aes256Gcm>>>,
    active_key_id: String
}

impl std::fmt::Debug for EncryptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionManager")
            .field("active_key_id", &self.active_key_id)
            .field("keys", &self.keys.read().len())
            .finish()
    }
}

impl EncryptionManager {
    /// Builds a manager whose active key is derived from `passphrase`.
    pub fn from_passphrase(passphrase: &str) -> Result<Self, EncryptionError> {
        let (key_id, cipher) = derive_cipher(passphrase)?;
        let mut keys = HashMap::new();
        keys.insert(key_id.clone(), Arc::new(cipher));
        Ok(Self {
            keys: RwLock::new(keys),
            active_key_id: key_id
        })
    }

    /// Adds a decrypt-only key, e.g. the passphrase a store was encrypted
    /// with before rotation. Returns its key id.
    pub fn add_passphrase(&self, passphrase: &str) -> Result<String, EncryptionError> {
        let (key_id, cipher) = derive_cipher(passphrase)?;
        self.keys.write().insert(key_id.clone(), Arc::new(cipher));
        Ok(key_id)
    }

    #[must_use]
    pub fn active_key_id(&self) -> &str {
        &self.active_key_id
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedData, EncryptionError> {
        let cipher = self
            .keys
            .read()
            .get(&self.active_key_id)
            .cloned()
            .ok_or_else(|| EncryptionError::KeyNotFound(self.active_key_id.clone()))?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| EncryptionError::EncryptionFailed(e.to_string()))?;

        Ok(EncryptedData {
            ciphertext: general_purpose::STANDARD.encode(&ciphertext),
            nonce: general_purpose::STANDARD.encode(nonce.as_slice()),
            key_id: self.active_key_id.clone(),
            algorithm: ALGORITHM.to_string(),
            encrypted_at: chrono::Utc::now()
        })
    }

    pub fn decrypt(&self, encrypted: &EncryptedData) -> Result<String, EncryptionError> {
        let cipher = self
            .keys
            .read()
            .get(&encrypted.key_id)
            .cloned()
            .ok_or_else(|| EncryptionError::KeyNotFound(encrypted.key_id.clone()))?;

        let ciphertext = general_purpose::STANDARD
            .decode(&encrypted.ciphertext)
            .map_err(|e| EncryptionError::DecryptionFailed(e.to_string()))?;
        let nonce_bytes = general_purpose::STANDARD
            .decode(&encrypted.nonce)
            .map_err(|e| EncryptionError::DecryptionFailed(e.to_string()))?;
        if nonce_bytes.len() != 12 {
            return Err(EncryptionError::InvalidFormat);
        }
        let nonce = Nonce::from_slice(&nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|e| EncryptionError::DecryptionFailed(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| EncryptionError::DecryptionFailed(e.to_string()))
    }

    /// Encrypts a whole row payload into its stored string form.
    pub fn encrypt_payload(&self, plaintext: &str) -> Result<String, EncryptionError> {
        let encrypted = self.encrypt(plaintext)?;
        serde_json::to_string(&encrypted).map_err(|e| EncryptionError::EncryptionFailed(e.to_string()))
    }

    pub fn decrypt_payload(&self, payload: &str) -> Result<String, EncryptionError> {
        let encrypted: EncryptedData =
            serde_json::from_str(payload).map_err(|_| EncryptionError::InvalidFormat)?;
        self.decrypt(&encrypted)
    }
}

fn derive_cipher(passphrase: &str) -> Result<(String, Aes256Gcm), EncryptionError> {
    if passphrase.is_empty() {
        return Err(EncryptionError::InvalidKey(
            "passphrase must not be empty".to_string()
        ));
    }
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&Sha256::digest(passphrase.as_bytes()));

    let cipher = Aes256Gcm::new_from_slice(key.as_slice())
        .map_err(|e| EncryptionError::InvalidKey(e.to_string()))?;
    let key_id = hex::encode(&Sha256::digest(key.as_slice())[..8]);
    Ok((key_id, cipher))
}
