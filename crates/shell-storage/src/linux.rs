//! Linux Secret Service backend.

use crate::{SecureStorage, StorageError, StorageResult};
use secret_service::blocking::{Collection, SecretService};
use secret_service::EncryptionType;
use std::collections::HashMap;
use tracing::debug;

/// Items in the default Secret Service collection, tagged with the service name.
pub struct SecretServiceStorage {
    service_name: String,
}

impl SecretServiceStorage {
    /// Fails when no Secret Service daemon is reachable over D-Bus, which is
    /// the signal for the vault's plaintext fallback.
    pub fn new(service_name: &str) -> StorageResult<Self> {
        let ss = SecretService::connect(EncryptionType::Dh).map_err(|e| {
            StorageError::Platform(format!("Failed to connect to Secret Service: {}", e))
        })?;
        ss.get_default_collection().map_err(|e| {
            StorageError::Platform(format!("No default keyring collection: {}", e))
        })?;

        Ok(Self {
            service_name: service_name.to_string(),
        })
    }

    fn with_collection<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Collection) -> StorageResult<T>,
    {
        let ss = SecretService::connect(EncryptionType::Dh)
            .map_err(|e| StorageError::Platform(e.to_string()))?;
        let collection = ss
            .get_default_collection()
            .map_err(|e| StorageError::Platform(e.to_string()))?;

        if collection.is_locked().unwrap_or(false) {
            collection.unlock().map_err(|e| {
                StorageError::Platform(format!("Failed to unlock keyring: {}", e))
            })?;
        }

        f(&collection)
    }

    fn attributes<'a>(&'a self, key: &'a str) -> HashMap<&'a str, &'a str> {
        HashMap::from([("service", self.service_name.as_str()), ("key", key)])
    }
}

impl SecureStorage for SecretServiceStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        debug!(service = %self.service_name, key = %key, "Setting secret");

        self.with_collection(|collection| {
            let label = format!("{}/{}", self.service_name, key);
            collection
                .create_item(
                    &label,
                    self.attributes(key),
                    value.as_bytes(),
                    true,
                    "text/plain",
                )
                .map_err(|e| StorageError::Platform(e.to_string()))?;
            Ok(())
        })
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        debug!(service = %self.service_name, key = %key, "Getting secret");

        self.with_collection(|collection| {
            let items = collection
                .search_items(self.attributes(key))
                .map_err(|e| StorageError::Platform(e.to_string()))?;

            let Some(item) = items.first() else {
                return Ok(None);
            };
            let secret = item
                .get_secret()
                .map_err(|e| StorageError::Platform(e.to_string()))?;
            String::from_utf8(secret)
                .map(Some)
                .map_err(|e| StorageError::Encoding(e.to_string()))
        })
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        debug!(service = %self.service_name, key = %key, "Deleting secret");

        self.with_collection(|collection| {
            let items = collection
                .search_items(self.attributes(key))
                .map_err(|e| StorageError::Platform(e.to_string()))?;

            let Some(item) = items.first() else {
                return Ok(false);
            };
            item.delete()
                .map_err(|e| StorageError::Platform(e.to_string()))?;
            Ok(true)
        })
    }
}
