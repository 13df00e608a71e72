//! Secure token vault for the Lumen shell.
//!
//! Token values are encrypted with ChaCha20-Poly1305 under a master key that
//! lives in the platform keychain:
//! - **macOS**: Keychain Access via `security-framework`
//! - **Linux**: Secret Service (GNOME Keyring / KWallet) via `secret-service`
//!
//! Ciphertexts are persisted in `~/.lumen/secure-tokens.json`. When no
//! keychain is reachable the vault stores plaintext and warns; see
//! [`SecureVault`] for the read policy.

mod cipher;
mod file_store;
mod keys;
mod traits;
mod vault;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "linux")]
mod linux;

pub use cipher::{KeychainCipher, UnavailableCipher};
pub use file_store::FileStore;
pub use keys::{StorageKeys, DISABLE_ENCRYPTION_ENV};
pub use traits::{EncryptionBackend, SecureStorage};
pub use vault::SecureVault;

use shell_config_and_utils::{Paths, APP_ID};
use thiserror::Error;
use tracing::warn;

/// Service name used for keychain entries.
pub const SERVICE_NAME: &str = APP_ID;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Platform-specific storage error
    #[error("Platform storage error: {0}")]
    Platform(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Encryption or decryption failed
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Encryption was requested while no backend is available
    #[error("Encryption unavailable")]
    EncryptionUnavailable,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create the default platform keychain.
pub fn create_storage() -> StorageResult<Box<dyn SecureStorage>> {
    #[cfg(target_os = "macos")]
    {
        let storage = macos::KeychainStorage::new(SERVICE_NAME)?;
        Ok(Box::new(storage))
    }

    #[cfg(target_os = "linux")]
    {
        let storage = linux::SecretServiceStorage::new(SERVICE_NAME)?;
        Ok(Box::new(storage))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Err(StorageError::Platform(
            "No secure storage implementation available for this platform".to_string(),
        ))
    }
}

/// Pick the encryption backend for this process.
///
/// Falls back to [`UnavailableCipher`] when the keychain cannot be opened or
/// `LUMEN_DISABLE_ENCRYPTION=1` is set.
pub fn create_cipher() -> Box<dyn EncryptionBackend> {
    if std::env::var(DISABLE_ENCRYPTION_ENV)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
    {
        warn!("Encryption disabled by {}", DISABLE_ENCRYPTION_ENV);
        return Box::new(UnavailableCipher);
    }

    match create_storage().and_then(KeychainCipher::new) {
        Ok(cipher) => Box::new(cipher),
        Err(e) => {
            warn!(error = %e, "Keychain unavailable, token vault will not encrypt");
            Box::new(UnavailableCipher)
        }
    }
}

/// Open the vault at its default location with the platform cipher.
pub fn open_vault(paths: &Paths) -> StorageResult<SecureVault> {
    let store = FileStore::open(paths.vault_file())?;
    Ok(SecureVault::new(create_cipher(), store))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory keychain for testing.
    #[derive(Default)]
    pub struct MemoryStorage {
        data: Mutex<HashMap<String, String>>,
    }

    impl SecureStorage for MemoryStorage {
        fn set(&self, key: &str, value: &str) -> StorageResult<()> {
            self.data
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn get(&self, key: &str) -> StorageResult<Option<String>> {
            Ok(self.data.lock().unwrap().get(key).cloned())
        }

        fn delete(&self, key: &str) -> StorageResult<bool> {
            Ok(self.data.lock().unwrap().remove(key).is_some())
        }
    }
}
