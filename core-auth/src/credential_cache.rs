//! In-memory session cache with optional secure persistence.
//!
//! The cache tracks whether it changed since the last
//! serialize/deserialize so hosts can decide when to write it out. The
//! serialized blob is opaque to callers.
//!
//! ## Example
//!
//! ```no_run
//! use core_auth::{AccountSession, AccountType, CredentialCache};
//! use std::sync::Arc;
//! # use bridge_traits::storage::SecureStore;
//! # async fn example(store: Arc<dyn SecureStore>) -> core_auth::Result<()> {
//! let cache = CredentialCache::new();
//! cache.load(store.as_ref(), "app-id").await?;
//!
//! let session = AccountSession::new("token", AccountType::MicrosoftAccount, "app-id");
//! cache.add(session).await;
//!
//! if cache.has_state_changed().await {
//!     cache.persist(store.as_ref(), "app-id").await?;
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::{AccountSession, AccountType, CredentialCacheKey};
use bridge_traits::storage::SecureStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const BLOB_VERSION: u32 = 1;
const STORAGE_KEY_PREFIX: &str = "onedrive_credential_cache";

/// Passed to the access hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAccess {
    Read,
    Write,
}

pub type CacheAccessHook = Arc<dyn Fn(CacheAccess) + Send + Sync>;

#[derive(Default)]
struct CacheState {
    sessions: HashMap<CredentialCacheKey, AccountSession>,
    has_state_changed: bool,
}

#[derive(Serialize, Deserialize)]
struct CacheBlob {
    version: u32,
    sessions: Vec<AccountSession>,
}

/// Sessions keyed by client, user and account type.
#[derive(Default)]
pub struct CredentialCache {
    state: RwLock<CacheState>,
    before_access: Option<CacheAccessHook>,
    after_access: Option<CacheAccessHook>,
}

impl fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCache")
            .field("before_access", &self.before_access.is_some())
            .field("after_access", &self.after_access.is_some())
            .finish_non_exhaustive()
    }
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called before every read or write of the cache contents.
    pub fn with_before_access(mut self, hook: impl Fn(CacheAccess) + Send + Sync + 'static) -> Self {
        self.before_access = Some(Arc::new(hook));
        self
    }

    /// Called after every read or write of the cache contents.
    pub fn with_after_access(mut self, hook: impl Fn(CacheAccess) + Send + Sync + 'static) -> Self {
        self.after_access = Some(Arc::new(hook));
        self
    }

    fn before(&self, access: CacheAccess) {
        if let Some(hook) = &self.before_access {
            hook(access);
        }
    }

    fn after(&self, access: CacheAccess) {
        if let Some(hook) = &self.after_access {
            hook(access);
        }
    }

    /// Insert or replace the session under its own key.
    pub async fn add(&self, session: AccountSession) {
        self.before(CacheAccess::Write);
        {
            let mut state = self.state.write().await;
            state.sessions.insert(session.cache_key(), session);
            state.has_state_changed = true;
        }
        self.after(CacheAccess::Write);
    }

    pub async fn get(&self, key: &CredentialCacheKey) -> Option<AccountSession> {
        self.before(CacheAccess::Read);
        let session = self.state.read().await.sessions.get(key).cloned();
        self.after(CacheAccess::Read);
        session
    }

    /// First session for a client when the user is not known yet.
    pub async fn get_for_client(
        &self,
        client_id: &str,
        account_type: AccountType,
    ) -> Option<AccountSession> {
        self.before(CacheAccess::Read);
        let session = {
            let state = self.state.read().await;
            let mut matches: Vec<&AccountSession> = state
                .sessions
                .values()
                .filter(|s| s.client_id == client_id && s.account_type == account_type)
                .collect();
            // HashMap order is arbitrary; pick deterministically.
            matches.sort_by(|a, b| a.user_id.cmp(&b.user_id));
            matches.first().map(|s| (*s).clone())
        };
        self.after(CacheAccess::Read);
        session
    }

    pub async fn remove(&self, key: &CredentialCacheKey) -> Option<AccountSession> {
        self.before(CacheAccess::Write);
        let removed = {
            let mut state = self.state.write().await;
            let removed = state.sessions.remove(key);
            if removed.is_some() {
                state.has_state_changed = true;
            }
            removed
        };
        self.after(CacheAccess::Write);
        removed
    }

    pub async fn clear(&self) {
        self.before(CacheAccess::Write);
        {
            let mut state = self.state.write().await;
            state.sessions.clear();
            state.has_state_changed = true;
        }
        self.after(CacheAccess::Write);
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.sessions.is_empty()
    }

    pub async fn has_state_changed(&self) -> bool {
        self.state.read().await.has_state_changed
    }

    /// Opaque blob of every cached session. Clears the changed flag.
    pub async fn serialize(&self) -> Result<Vec<u8>> {
        self.before(CacheAccess::Read);
        let blob = {
            let mut state = self.state.write().await;
            let mut sessions: Vec<AccountSession> = state.sessions.values().cloned().collect();
            sessions.sort_by(|a, b| {
                (&a.client_id, &a.user_id).cmp(&(&b.client_id, &b.user_id))
            });
            let blob = serde_json::to_vec(&CacheBlob {
                version: BLOB_VERSION,
                sessions,
            })?;
            state.has_state_changed = false;
            blob
        };
        self.after(CacheAccess::Read);
        Ok(blob)
    }

    /// Replace the contents with a blob from [`serialize`](Self::serialize).
    /// Clears the changed flag.
    pub async fn deserialize(&self, blob: &[u8]) -> Result<()> {
        let parsed: CacheBlob = serde_json::from_slice(blob)?;
        if parsed.version != BLOB_VERSION {
            return Err(AuthError::Storage(format!(
                "Unsupported credential cache version {}",
                parsed.version
            )));
        }

        self.before(CacheAccess::Write);
        {
            let mut state = self.state.write().await;
            state.sessions = parsed
                .sessions
                .into_iter()
                .map(|session| (session.cache_key(), session))
                .collect();
            state.has_state_changed = false;
        }
        self.after(CacheAccess::Write);
        Ok(())
    }

    fn storage_key(client_id: &str) -> String {
        format!("{}:{}", STORAGE_KEY_PREFIX, client_id)
    }

    /// Write the cache to `store` under the client's key.
    pub async fn persist(&self, store: &dyn SecureStore, client_id: &str) -> Result<()> {
        let key = Self::storage_key(client_id);
        let blob = self.serialize().await?;

        store.set_secret(&key, &blob).await.map_err(|e| {
            warn!(client_id, error = %e, "Failed to persist credential cache");
            AuthError::Storage(e.to_string())
        })?;

        let sessions = self.len().await;
        debug!(client_id, sessions, "Credential cache persisted");
        Ok(())
    }

    /// Replace the cache with what `store` holds for the client.
    ///
    /// Returns `false` when nothing was stored. A corrupted blob is deleted
    /// and the cache is left empty.
    pub async fn load(&self, store: &dyn SecureStore, client_id: &str) -> Result<bool> {
        let key = Self::storage_key(client_id);

        let data = store.get_secret(&key).await.map_err(|e| {
            warn!(client_id, error = %e, "Failed to read credential cache");
            AuthError::Storage(e.to_string())
        })?;

        let Some(data) = data else {
            debug!(client_id, "No stored credential cache");
            return Ok(false);
        };

        if let Err(e) = self.deserialize(&data).await {
            warn!(
                client_id,
                error = %e,
                "Stored credential cache is corrupted, discarding it"
            );

            if let Err(delete_err) = store.delete_secret(&key).await {
                warn!(client_id, error = %delete_err, "Failed to delete corrupted credential cache");
            }

            let mut state = self.state.write().await;
            state.sessions.clear();
            state.has_state_changed = false;
            return Ok(false);
        }

        let sessions = self.len().await;
        info!(client_id, sessions, "Credential cache loaded");
        Ok(true)
    }

    /// Remove the client's blob from `store`.
    pub async fn delete_persisted(&self, store: &dyn SecureStore, client_id: &str) -> Result<()> {
        store
            .delete_secret(&Self::storage_key(client_id))
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        storage: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait::async_trait]
    impl SecureStore for MemoryStore {
        async fn set_secret(&self, key: &str, value: &[u8]) -> bridge_traits::error::Result<()> {
            self.storage
                .lock()
                .await
                .insert(key.to_string(), value.to_vec());
            Ok(())
        }

        async fn get_secret(&self, key: &str) -> bridge_traits::error::Result<Option<Vec<u8>>> {
            Ok(self.storage.lock().await.get(key).cloned())
        }

        async fn delete_secret(&self, key: &str) -> bridge_traits::error::Result<()> {
            self.storage.lock().await.remove(key);
            Ok(())
        }

        async fn list_keys(&self) -> bridge_traits::error::Result<Vec<String>> {
            Ok(self.storage.lock().await.keys().cloned().collect())
        }

        async fn clear_all(&self) -> bridge_traits::error::Result<()> {
            self.storage.lock().await.clear();
            Ok(())
        }
    }

    fn session(user: &str) -> AccountSession {
        AccountSession::new(format!("token-{}", user), AccountType::MicrosoftAccount, "app")
            .with_user_id(user)
            .with_refresh_token("refresh")
            .with_expires_on(Utc::now() + Duration::hours(1))
    }

    #[tokio::test]
    async fn test_add_get_remove() {
        let cache = CredentialCache::new();
        assert!(!cache.has_state_changed().await);

        cache.add(session("alice")).await;
        assert!(cache.has_state_changed().await);

        let key = CredentialCacheKey::new("app", Some("alice".to_string()), AccountType::MicrosoftAccount);
        assert_eq!(cache.get(&key).await.unwrap().access_token, "token-alice");

        let other_type = CredentialCacheKey::new("app", Some("alice".to_string()), AccountType::ActiveDirectory);
        assert!(cache.get(&other_type).await.is_none());

        assert!(cache.remove(&key).await.is_some());
        assert!(cache.get(&key).await.is_none());
        assert!(cache.remove(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_add_replaces_existing_session() {
        let cache = CredentialCache::new();
        cache.add(session("alice")).await;
        cache
            .add(session("alice").with_token_type("Bearer"))
            .await;
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_for_client() {
        let cache = CredentialCache::new();
        cache.add(session("bob")).await;
        cache.add(session("alice")).await;

        let found = cache
            .get_for_client("app", AccountType::MicrosoftAccount)
            .await
            .unwrap();
        assert_eq!(found.user_id.as_deref(), Some("alice"));

        assert!(cache
            .get_for_client("other", AccountType::MicrosoftAccount)
            .await
            .is_none());
        assert!(cache
            .get_for_client("app", AccountType::ActiveDirectory)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_serialize_round_trip_clears_flag() {
        let cache = CredentialCache::new();
        cache.add(session("alice")).await;
        cache.add(session("bob")).await;

        let blob = cache.serialize().await.unwrap();
        assert!(!cache.has_state_changed().await);

        let restored = CredentialCache::new();
        restored.deserialize(&blob).await.unwrap();
        assert_eq!(restored.len().await, 2);
        assert!(!restored.has_state_changed().await);

        let key = CredentialCacheKey::new("app", Some("bob".to_string()), AccountType::MicrosoftAccount);
        let bob = restored.get(&key).await.unwrap();
        assert_eq!(bob.refresh_token.as_deref(), Some("refresh"));
    }

    #[tokio::test]
    async fn test_deserialize_replaces_contents() {
        let source = CredentialCache::new();
        source.add(session("alice")).await;
        let blob = source.serialize().await.unwrap();

        let cache = CredentialCache::new();
        cache.add(session("zed")).await;
        cache.deserialize(&blob).await.unwrap();

        assert_eq!(cache.len().await, 1);
        assert!(cache
            .get(&CredentialCacheKey::new("app", Some("zed".to_string()), AccountType::MicrosoftAccount))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_deserialize_rejects_garbage() {
        let cache = CredentialCache::new();
        assert!(matches!(
            cache.deserialize(b"not json").await,
            Err(AuthError::Serialization(_))
        ));
        assert!(matches!(
            cache.deserialize(br#"{"version":99,"sessions":[]}"#).await,
            Err(AuthError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_persist_and_load() {
        let store = MemoryStore::default();
        let cache = CredentialCache::new();
        cache.add(session("alice")).await;
        cache.persist(&store, "app").await.unwrap();

        assert!(store
            .get_secret("onedrive_credential_cache:app")
            .await
            .unwrap()
            .is_some());

        let loaded = CredentialCache::new();
        assert!(loaded.load(&store, "app").await.unwrap());
        assert_eq!(loaded.len().await, 1);

        let empty = CredentialCache::new();
        assert!(!empty.load(&store, "other-app").await.unwrap());
    }

    #[tokio::test]
    async fn test_persist_and_load_run_on_spawned_tasks() {
        let store = Arc::new(MemoryStore::default());
        let cache = Arc::new(CredentialCache::new());
        cache.add(session("alice")).await;

        let (task_cache, task_store) = (cache.clone(), store.clone());
        tokio::spawn(async move { task_cache.persist(task_store.as_ref(), "app").await })
            .await
            .unwrap()
            .unwrap();

        let loaded = Arc::new(CredentialCache::new());
        let task_loaded = loaded.clone();
        let found = tokio::spawn(async move { task_loaded.load(store.as_ref(), "app").await })
            .await
            .unwrap()
            .unwrap();
        assert!(found);
        assert_eq!(loaded.len().await, 1);
    }

    #[tokio::test]
    async fn test_load_discards_corrupted_blob() {
        let store = MemoryStore::default();
        store
            .set_secret("onedrive_credential_cache:app", b"{broken")
            .await
            .unwrap();

        let cache = CredentialCache::new();
        cache.add(session("alice")).await;
        assert!(!cache.load(&store, "app").await.unwrap());
        assert!(cache.is_empty().await);
        assert!(!store
            .has_secret("onedrive_credential_cache:app")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_access_hooks_fire() {
        let reads = Arc::new(AtomicUsize::new(0));
        let writes = Arc::new(AtomicUsize::new(0));
        let after = Arc::new(AtomicUsize::new(0));

        let (r, w, a) = (reads.clone(), writes.clone(), after.clone());
        let cache = CredentialCache::new()
            .with_before_access(move |access| match access {
                CacheAccess::Read => {
                    r.fetch_add(1, Ordering::SeqCst);
                }
                CacheAccess::Write => {
                    w.fetch_add(1, Ordering::SeqCst);
                }
            })
            .with_after_access(move |_| {
                a.fetch_add(1, Ordering::SeqCst);
            });

        cache.add(session("alice")).await;
        cache
            .get_for_client("app", AccountType::MicrosoftAccount)
            .await;
        cache.clear().await;

        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert_eq!(writes.load(Ordering::SeqCst), 2);
        assert_eq!(after.load(Ordering::SeqCst), 3);
    }
}
