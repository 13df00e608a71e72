//! Where the session of record is persisted.
//!
//! The UI process never touches the vault directly. [`IpcSessionStorage`]
//! routes through the host's `secure-store.*` methods.

use crate::SessionResult;
use async_trait::async_trait;
use shell_ipc::{IpcClient, KeyParams, Method, SetParams};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Key the session JSON is stored under.
pub const DEFAULT_STORAGE_KEY: &str = "lumen-auth-token";

/// Key-value storage for the session and the PKCE verifier.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn get_item(&self, key: &str) -> SessionResult<Option<String>>;
    async fn set_item(&self, key: &str, value: &str) -> SessionResult<()>;
    async fn remove_item(&self, key: &str) -> SessionResult<()>;
}

/// Session storage backed by the host's secure token vault.
#[derive(Debug, Clone)]
pub struct IpcSessionStorage {
    host: IpcClient,
}

impl IpcSessionStorage {
    pub fn new(host: IpcClient) -> Self {
        Self { host }
    }
}

#[async_trait]
impl SessionStorage for IpcSessionStorage {
    async fn get_item(&self, key: &str) -> SessionResult<Option<String>> {
        let params = serde_json::to_value(KeyParams {
            key: key.to_string(),
        })?;
        let value: Option<String> = self
            .host
            .request(Method::SecureStoreGet, Some(params))
            .await?;
        debug!(key = %key, found = value.is_some(), "Read session item");
        Ok(value)
    }

    async fn set_item(&self, key: &str, value: &str) -> SessionResult<()> {
        let params = serde_json::to_value(SetParams {
            key: key.to_string(),
            value: value.to_string(),
        })?;
        let _: serde_json::Value = self
            .host
            .request(Method::SecureStoreSet, Some(params))
            .await?;
        debug!(key = %key, value_len = value.len(), "Stored session item");
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> SessionResult<()> {
        let params = serde_json::to_value(KeyParams {
            key: key.to_string(),
        })?;
        let _: serde_json::Value = self
            .host
            .request(Method::SecureStoreRemove, Some(params))
            .await?;
        Ok(())
    }
}

/// In-process storage for tests and browser-only development.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }
}

#[async_trait]
impl SessionStorage for MemorySessionStorage {
    async fn get_item(&self, key: &str) -> SessionResult<Option<String>> {
        Ok(self
            .items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> SessionResult<()> {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> SessionResult<()> {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }
}

#[async_trait]
impl<S: SessionStorage + ?Sized> SessionStorage for std::sync::Arc<S> {
    async fn get_item(&self, key: &str) -> SessionResult<Option<String>> {
        (**self).get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> SessionResult<()> {
        (**self).set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> SessionResult<()> {
        (**self).remove_item(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SessionError;
    use shell_ipc::{error_codes, IpcServer, Request, Response};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn start_vault_host(dir: &TempDir) -> (Arc<IpcServer>, IpcClient) {
        let socket = dir.path().join("shell.sock");
        let server = Arc::new(IpcServer::new(&socket));
        let vault: Arc<Mutex<HashMap<String, String>>> = Arc::default();

        let store = vault.clone();
        server
            .register_handler(Method::SecureStoreGet, move |req: Request| {
                let store = store.clone();
                async move {
                    match req.params_as::<KeyParams>() {
                        Ok(p) => {
                            let value = store.lock().unwrap().get(&p.key).cloned();
                            Response::success(&req.id, serde_json::json!(value))
                        }
                        Err(e) => {
                            Response::error(&req.id, error_codes::INVALID_PARAMS, &e.to_string())
                        }
                    }
                }
            })
            .await;
        let store = vault.clone();
        server
            .register_handler(Method::SecureStoreSet, move |req: Request| {
                let store = store.clone();
                async move {
                    let p: SetParams = req.params_as().unwrap();
                    store.lock().unwrap().insert(p.key, p.value);
                    Response::success(&req.id, serde_json::Value::Null)
                }
            })
            .await;
        let store = vault;
        server
            .register_handler(Method::SecureStoreRemove, move |req: Request| {
                let store = store.clone();
                async move {
                    let p: KeyParams = req.params_as().unwrap();
                    store.lock().unwrap().remove(&p.key);
                    Response::success(&req.id, serde_json::Value::Null)
                }
            })
            .await;

        let listener = server.bind().unwrap();
        let serving = server.clone();
        tokio::spawn(async move {
            let _ = serving.serve(listener).await;
        });
        (server, IpcClient::new(socket))
    }

    #[tokio::test]
    async fn ipc_storage_round_trips_through_host() {
        let dir = TempDir::new().unwrap();
        let (_server, client) = start_vault_host(&dir).await;
        let storage = IpcSessionStorage::new(client);

        assert_eq!(storage.get_item(DEFAULT_STORAGE_KEY).await.unwrap(), None);
        storage
            .set_item(DEFAULT_STORAGE_KEY, r#"{"user_id":"u1"}"#)
            .await
            .unwrap();
        assert_eq!(
            storage.get_item(DEFAULT_STORAGE_KEY).await.unwrap().as_deref(),
            Some(r#"{"user_id":"u1"}"#)
        );
        storage.remove_item(DEFAULT_STORAGE_KEY).await.unwrap();
        assert_eq!(storage.get_item(DEFAULT_STORAGE_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn ipc_storage_surfaces_host_down() {
        let dir = TempDir::new().unwrap();
        let storage = IpcSessionStorage::new(IpcClient::new(dir.path().join("missing.sock")));
        assert!(matches!(
            storage.get_item("k").await,
            Err(SessionError::Ipc(_))
        ));
    }

    #[tokio::test]
    async fn memory_storage_basic_ops() {
        let storage = MemorySessionStorage::new();
        storage.set_item("k", "v").await.unwrap();
        assert!(storage.contains("k"));
        assert_eq!(storage.get_item("k").await.unwrap().as_deref(), Some("v"));
        storage.remove_item("k").await.unwrap();
        assert!(!storage.contains("k"));
    }
}
