//! Storage trait definitions.

use crate::StorageResult;

/// A platform keychain: small secrets addressed by key.
///
/// The vault only keeps its master key here; token values live in the
/// encrypted file store.
pub trait SecureStorage: Send + Sync {
    /// Store a value securely, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a value.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Delete a value. Returns whether something was deleted.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists.
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// An OS "safe storage" style primitive: string in, opaque bytes out.
pub trait EncryptionBackend: Send + Sync {
    /// Whether values can currently be encrypted and decrypted.
    fn is_available(&self) -> bool;

    /// Encrypt a UTF-8 value.
    fn encrypt(&self, plaintext: &str) -> StorageResult<Vec<u8>>;

    /// Decrypt bytes produced by [`EncryptionBackend::encrypt`].
    fn decrypt(&self, ciphertext: &[u8]) -> StorageResult<String>;
}
