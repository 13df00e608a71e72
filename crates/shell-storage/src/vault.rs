//! The token vault the privileged IPC surface delegates to.

use crate::{EncryptionBackend, FileStore, StorageResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Encrypts values when the backend is available, otherwise stores
/// plaintext with a warning.
///
/// Read policy: while encryption is available every stored value is treated
/// as ciphertext. A value that does not decrypt (written in plaintext
/// fallback, or under a previous master key) reads as `None` and is left in
/// place; it is never returned as plaintext. While encryption is unavailable,
/// stored values are returned as-is.
pub struct SecureVault {
    cipher: Box<dyn EncryptionBackend>,
    store: FileStore,
    fallback_warned: AtomicBool,
}

impl SecureVault {
    pub fn new(cipher: Box<dyn EncryptionBackend>, store: FileStore) -> Self {
        Self {
            cipher,
            store,
            fallback_warned: AtomicBool::new(false),
        }
    }

    pub fn is_encryption_available(&self) -> bool {
        self.cipher.is_available()
    }

    pub fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        if self.cipher.is_available() {
            let sealed = self.cipher.encrypt(value)?;
            self.store.set(key, BASE64.encode(sealed))?;
            debug!(key = %key, value_len = value.len(), "Stored encrypted value");
        } else {
            self.warn_plaintext_once();
            self.store.set(key, value.to_string())?;
            debug!(key = %key, value_len = value.len(), "Stored unencrypted value");
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let stored = self.store.get(key)?;

        if !self.cipher.is_available() {
            return Some(stored);
        }

        let decoded = match BASE64.decode(stored.as_bytes()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "Stored value is not valid ciphertext");
                return None;
            }
        };
        match self.cipher.decrypt(&decoded) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Decryption failed, treating as missing");
                None
            }
        }
    }

    /// Returns whether the key existed.
    pub fn remove(&self, key: &str) -> StorageResult<bool> {
        let removed = self.store.remove(key)?;
        debug!(key = %key, removed, "Removed vault entry");
        Ok(removed)
    }

    fn warn_plaintext_once(&self) {
        if !self.fallback_warned.swap(true, Ordering::Relaxed) {
            warn!(
                path = %self.store.path().display(),
                "Encryption unavailable, storing tokens without encryption (no keychain/keyring)"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{KeychainCipher, UnavailableCipher};
    use tempfile::{tempdir, TempDir};

    fn encrypted_vault(dir: &TempDir, key: u8) -> SecureVault {
        SecureVault::new(
            Box::new(KeychainCipher::from_key(&[key; 32]).unwrap()),
            FileStore::open(dir.path().join("secure-tokens.json")).unwrap(),
        )
    }

    fn plaintext_vault(dir: &TempDir) -> SecureVault {
        SecureVault::new(
            Box::new(UnavailableCipher),
            FileStore::open(dir.path().join("secure-tokens.json")).unwrap(),
        )
    }

    #[test]
    fn set_then_get_with_encryption() {
        let dir = tempdir().unwrap();
        let vault = encrypted_vault(&dir, 9);
        assert!(vault.is_encryption_available());

        vault.set("k", "v").unwrap();
        assert_eq!(vault.get("k").as_deref(), Some("v"));

        let raw = std::fs::read_to_string(dir.path().join("secure-tokens.json")).unwrap();
        assert!(!raw.contains("\"v\""));
    }

    #[test]
    fn set_then_get_in_plaintext_fallback() {
        let dir = tempdir().unwrap();
        let vault = plaintext_vault(&dir);
        assert!(!vault.is_encryption_available());

        vault.set("k", "v").unwrap();
        assert_eq!(vault.get("k").as_deref(), Some("v"));

        let raw = std::fs::read_to_string(dir.path().join("secure-tokens.json")).unwrap();
        assert!(raw.contains("\"v\""));
    }

    #[test]
    fn missing_key_is_none() {
        let dir = tempdir().unwrap();
        assert!(encrypted_vault(&dir, 1).get("nope").is_none());
        assert!(plaintext_vault(&dir).get("nope").is_none());
    }

    #[test]
    fn remove_deletes_entry() {
        let dir = tempdir().unwrap();
        let vault = encrypted_vault(&dir, 2);
        vault.set("k", "v").unwrap();
        assert!(vault.remove("k").unwrap());
        assert!(vault.get("k").is_none());
        assert!(!vault.remove("k").unwrap());
    }

    #[test]
    fn value_under_previous_key_reads_as_none_and_is_kept() {
        let dir = tempdir().unwrap();
        encrypted_vault(&dir, 1).set("k", "v").unwrap();

        let rotated = encrypted_vault(&dir, 2);
        assert!(rotated.get("k").is_none());

        let original = encrypted_vault(&dir, 1);
        assert_eq!(original.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn plaintext_value_is_not_served_once_encryption_is_available() {
        let dir = tempdir().unwrap();
        plaintext_vault(&dir).set("k", "plain-session").unwrap();

        let vault = encrypted_vault(&dir, 4);
        assert!(vault.get("k").is_none());

        let store = FileStore::open(dir.path().join("secure-tokens.json")).unwrap();
        assert_eq!(store.get("k").as_deref(), Some("plain-session"));
    }

    #[test]
    fn overwrite_replaces_value() {
        let dir = tempdir().unwrap();
        let vault = encrypted_vault(&dir, 5);
        vault.set("k", "one").unwrap();
        vault.set("k", "two").unwrap();
        assert_eq!(vault.get("k").as_deref(), Some("two"));
    }
}
