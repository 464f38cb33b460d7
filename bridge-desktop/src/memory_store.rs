//! In-process secret storage for hosts without an OS keychain.

use async_trait::async_trait;
use bridge_traits::{error::Result, storage::SecureStore};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// `SecureStore` that keeps secrets in memory for the life of the process.
///
/// Used as the fallback when the `secure-store` feature is off, and handy in
/// tests. Nothing survives a restart.
#[derive(Default)]
pub struct InMemorySecureStore {
    secrets: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecureStore for InMemorySecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        self.secrets
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.secrets.read().await.get(key).cloned())
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        self.secrets.write().await.remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.secrets.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn clear_all(&self) -> Result<()> {
        self.secrets.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip_and_clear() {
        let store = InMemorySecureStore::new();
        store.set_secret("b", b"two").await.unwrap();
        store.set_secret("a", b"one").await.unwrap();

        assert_eq!(store.get_secret("a").await.unwrap(), Some(b"one".to_vec()));
        assert!(store.has_secret("b").await.unwrap());
        assert_eq!(store.list_keys().await.unwrap(), vec!["a", "b"]);

        store.delete_secret("a").await.unwrap();
        assert_eq!(store.get_secret("a").await.unwrap(), None);

        store.clear_all().await.unwrap();
        assert!(store.list_keys().await.unwrap().is_empty());
    }
}
