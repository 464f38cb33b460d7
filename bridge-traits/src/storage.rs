//! Where the credential cache lives between runs.

use async_trait::async_trait;

use crate::error::Result;

/// Opaque key/value secret storage.
///
/// The SDK writes one blob per application id, under keys such as
/// `onedrive_credential_cache:<app id>`. Implementations must not log
/// values.
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Replaces any previous value under `key`.
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()>;

    /// `Ok(None)` when nothing is stored under `key`.
    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Deleting a missing key succeeds.
    async fn delete_secret(&self, key: &str) -> Result<()>;

    async fn has_secret(&self, key: &str) -> Result<bool> {
        Ok(self.get_secret(key).await?.is_some())
    }

    /// Keys written through this store.
    async fn list_keys(&self) -> Result<Vec<String>>;

    async fn clear_all(&self) -> Result<()>;
}
