//! Credential cache persistence in the OS keychain (Keychain, Credential
//! Manager, Secret Service) through the `keyring` crate.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecureStore,
};
use keyring::Entry;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const DEFAULT_SERVICE_NAME: &str = "onedrive-sdk";

/// Reserved entry listing every key this store has written, one per line.
/// Keychains cannot be enumerated portably.
const KEY_INDEX: &str = "__onedrive_sdk_key_index";

/// Keychain-backed [`SecureStore`].
///
/// Values are base64 encoded since keychain entries hold strings. Every
/// write or delete also updates the key index under a lock, so `list_keys`
/// and `clear_all` only ever see keys this store created.
pub struct KeyringSecureStore {
    service: String,
    index_lock: Mutex<()>,
}

impl KeyringSecureStore {
    pub fn new() -> Self {
        Self::with_service_name(DEFAULT_SERVICE_NAME)
    }

    /// Entries are grouped under `service` in the keychain UI.
    pub fn with_service_name(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            index_lock: Mutex::new(()),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).map_err(keyring_failure)
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(keyring_failure(e)),
        }
    }

    /// Returns whether an entry was actually removed.
    fn remove(&self, key: &str) -> Result<bool> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(keyring_failure(e)),
        }
    }

    fn indexed_keys(&self) -> Result<Vec<String>> {
        Ok(self
            .read(KEY_INDEX)?
            .map(|raw| raw.lines().filter(|l| !l.is_empty()).map(str::to_owned).collect())
            .unwrap_or_default())
    }

    fn store_index(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return self.remove(KEY_INDEX).map(drop);
        }
        self.entry(KEY_INDEX)?
            .set_password(&keys.join("\n"))
            .map_err(keyring_failure)
    }

    async fn track(&self, key: &str, present: bool) -> Result<()> {
        let _guard = self.index_lock.lock().await;
        let mut keys = self.indexed_keys()?;
        let position = keys.iter().position(|k| k == key);
        match (present, position) {
            (true, None) => keys.push(key.to_owned()),
            (false, Some(index)) => {
                keys.remove(index);
            }
            _ => return Ok(()),
        }
        self.store_index(&keys)
    }
}

impl Default for KeyringSecureStore {
    fn default() -> Self {
        Self::new()
    }
}

fn keyring_failure(e: keyring::Error) -> BridgeError {
    BridgeError::OperationFailed(format!("Keychain: {e}"))
}

#[async_trait]
impl SecureStore for KeyringSecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entry(key)?
            .set_password(&STANDARD.encode(value))
            .map_err(keyring_failure)?;
        self.track(key, true).await?;
        debug!(key, bytes = value.len(), "Secret stored");
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let Some(encoded) = self.read(key)? else {
            return Ok(None);
        };
        STANDARD.decode(encoded.as_bytes()).map(Some).map_err(|e| {
            warn!(key, error = %e, "Keychain entry is not valid base64");
            BridgeError::OperationFailed(format!("Corrupt keychain entry '{key}': {e}"))
        })
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        if self.remove(key)? {
            debug!(key, "Secret deleted");
        }
        self.track(key, false).await
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let _guard = self.index_lock.lock().await;
        self.indexed_keys()
    }

    async fn clear_all(&self) -> Result<()> {
        let _guard = self.index_lock.lock().await;
        for key in self.indexed_keys()? {
            self.remove(&key)?;
        }
        self.store_index(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_name_defaults_to_sdk_name() {
        assert_eq!(KeyringSecureStore::new().service, "onedrive-sdk");
        assert_eq!(
            KeyringSecureStore::with_service_name("contoso-sync").service,
            "contoso-sync"
        );
    }

    #[tokio::test]
    async fn round_trip_when_keychain_is_available() {
        // headless CI usually has no Secret Service
        let store = KeyringSecureStore::with_service_name("onedrive-sdk-tests");
        let key = "credential_cache:test-app";
        let blob = br#"{"sessions":[]}"#;

        if let Err(e) = store.set_secret(key, blob).await {
            println!("Keychain unavailable ({e}), skipping");
            return;
        }

        // the mock credential builder does not persist between entries
        match store.get_secret(key).await {
            Ok(Some(stored)) => assert_eq!(stored, blob.to_vec()),
            _ => {
                println!("Keychain does not persist, skipping");
                return;
            }
        }
        assert!(store.list_keys().await.unwrap().contains(&key.to_string()));

        store.delete_secret(key).await.unwrap();
        assert_eq!(store.get_secret(key).await.unwrap(), None);
        assert!(!store.list_keys().await.unwrap().contains(&key.to_string()));
    }
}
