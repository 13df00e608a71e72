//! Encryption backends.
//!
//! Ciphertext layout: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.

use crate::{EncryptionBackend, SecureStorage, StorageError, StorageKeys, StorageResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use tracing::{debug, info};

/// Nonce size for ChaCha20-Poly1305 (96 bits).
pub const NONCE_SIZE: usize = 12;
/// Key size for ChaCha20-Poly1305 (256 bits).
pub const KEY_SIZE: usize = 32;

/// Encrypts with a master key held in the platform keychain.
pub struct KeychainCipher {
    cipher: ChaCha20Poly1305,
}

impl KeychainCipher {
    /// Load the master key from `storage`, generating and saving one on first use.
    pub fn new(storage: Box<dyn SecureStorage>) -> StorageResult<Self> {
        let key = match storage.get(StorageKeys::VAULT_MASTER_KEY)? {
            Some(encoded) => {
                let key = BASE64
                    .decode(encoded.trim())
                    .map_err(|e| StorageError::Encoding(format!("master key: {}", e)))?;
                debug!("Loaded vault master key");
                key
            }
            None => {
                let mut key = vec![0u8; KEY_SIZE];
                rand::thread_rng().fill_bytes(&mut key);
                storage.set(StorageKeys::VAULT_MASTER_KEY, &BASE64.encode(&key))?;
                info!("Generated new vault master key");
                key
            }
        };
        Self::from_key(&key)
    }

    /// Build a cipher from raw key bytes.
    pub fn from_key(key: &[u8]) -> StorageResult<Self> {
        if key.len() != KEY_SIZE {
            return Err(StorageError::Crypto(format!(
                "invalid key length: expected {}, got {}",
                KEY_SIZE,
                key.len()
            )));
        }
        let cipher = ChaCha20Poly1305::new_from_slice(key)
            .map_err(|e| StorageError::Crypto(e.to_string()))?;
        Ok(Self { cipher })
    }
}

impl EncryptionBackend for KeychainCipher {
    fn is_available(&self) -> bool {
        true
    }

    fn encrypt(&self, plaintext: &str) -> StorageResult<Vec<u8>> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| StorageError::Crypto(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, data: &[u8]) -> StorageResult<String> {
        if data.len() <= NONCE_SIZE {
            return Err(StorageError::Crypto("ciphertext too short".to_string()));
        }
        let (nonce, ciphertext) = data.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| StorageError::Crypto(e.to_string()))?;
        String::from_utf8(plaintext).map_err(|e| StorageError::Encoding(e.to_string()))
    }
}

/// Backend used when no keychain is reachable.
pub struct UnavailableCipher;

impl EncryptionBackend for UnavailableCipher {
    fn is_available(&self) -> bool {
        false
    }

    fn encrypt(&self, _plaintext: &str) -> StorageResult<Vec<u8>> {
        Err(StorageError::EncryptionUnavailable)
    }

    fn decrypt(&self, _ciphertext: &[u8]) -> StorageResult<String> {
        Err(StorageError::EncryptionUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryStorage;
    use std::sync::Arc;

    struct SharedStorage(Arc<MemoryStorage>);

    impl SecureStorage for SharedStorage {
        fn set(&self, key: &str, value: &str) -> StorageResult<()> {
            self.0.set(key, value)
        }
        fn get(&self, key: &str) -> StorageResult<Option<String>> {
            self.0.get(key)
        }
        fn delete(&self, key: &str) -> StorageResult<bool> {
            self.0.delete(key)
        }
    }

    #[test]
    fn encrypts_and_decrypts() {
        let cipher = KeychainCipher::new(Box::new(MemoryStorage::default())).unwrap();
        let sealed = cipher.encrypt("refresh-token-value").unwrap();

        assert!(sealed.len() > NONCE_SIZE + 16);
        assert!(!sealed
            .windows(b"refresh-token-value".len())
            .any(|w| w == b"refresh-token-value"));
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "refresh-token-value");
    }

    #[test]
    fn fresh_nonce_per_encryption() {
        let cipher = KeychainCipher::from_key(&[7u8; KEY_SIZE]).unwrap();
        let a = cipher.encrypt("same").unwrap();
        let b = cipher.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn master_key_is_generated_once_and_reused() {
        let shared = Arc::new(MemoryStorage::default());

        let first = KeychainCipher::new(Box::new(SharedStorage(shared.clone()))).unwrap();
        let stored = shared.get(StorageKeys::VAULT_MASTER_KEY).unwrap().unwrap();
        let sealed = first.encrypt("value").unwrap();

        let second = KeychainCipher::new(Box::new(SharedStorage(shared.clone()))).unwrap();
        assert_eq!(
            shared.get(StorageKeys::VAULT_MASTER_KEY).unwrap().unwrap(),
            stored
        );
        assert_eq!(second.decrypt(&sealed).unwrap(), "value");
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let a = KeychainCipher::from_key(&[1u8; KEY_SIZE]).unwrap();
        let b = KeychainCipher::from_key(&[2u8; KEY_SIZE]).unwrap();
        let sealed = a.encrypt("secret").unwrap();
        assert!(matches!(b.decrypt(&sealed), Err(StorageError::Crypto(_))));
    }

    #[test]
    fn short_or_tampered_input_fails() {
        let cipher = KeychainCipher::from_key(&[3u8; KEY_SIZE]).unwrap();
        assert!(cipher.decrypt(&[0u8; 4]).is_err());

        let mut sealed = cipher.encrypt("secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(cipher.decrypt(&sealed).is_err());
    }

    #[test]
    fn corrupt_master_key_is_an_error() {
        let storage = MemoryStorage::default();
        storage
            .set(StorageKeys::VAULT_MASTER_KEY, &BASE64.encode([1u8; 5]))
            .unwrap();
        assert!(KeychainCipher::new(Box::new(storage)).is_err());
    }

    #[test]
    fn unavailable_cipher_refuses() {
        let cipher = UnavailableCipher;
        assert!(!cipher.is_available());
        assert!(matches!(
            cipher.encrypt("x"),
            Err(StorageError::EncryptionUnavailable)
        ));
    }
}
