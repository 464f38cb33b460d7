//! # SDK Configuration
//!
//! Builder-based configuration holding the bridge handles and tunables shared
//! by the authentication and OneDrive layers.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - defaulted to `ReqwestHttpClient` with `desktop-shims`
//!
//! ## Optional Dependencies
//!
//! - `SecureStore` - persists the credential cache between runs. With
//!   `desktop-shims` the keyring store is used when the `secure-store`
//!   feature is on, otherwise an in-memory store.
//! - `Clock` - defaults to the system clock
//! - `EventBus` - a fresh bus when not supplied
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{SdkConfig, UploadConfig};
//!
//! let config = SdkConfig::builder()
//!     .upload(UploadConfig::default().with_chunk_size(10 * 327_680))
//!     .build()?;
//! ```
//!
//! Without `desktop-shims`, building without an HTTP client fails with an
//! actionable `CapabilityMissing` error:
//!
//! ```ignore
//! let err = SdkConfig::builder().build().unwrap_err();
//! assert!(matches!(err, core_runtime::Error::CapabilityMissing { .. }));
//! ```

use crate::error::{Error, Result};
use crate::events::EventBus;
use bridge_traits::{Clock, HttpClient, RetryPolicy, SecureStore, SystemClock};
use std::sync::Arc;
use std::time::Duration;

/// Upload chunk sizes must be a multiple of this many bytes (320 KiB).
pub const UPLOAD_CHUNK_ALIGNMENT: u64 = 320 * 1024;

/// Default chunk size for resumable uploads (5 MiB).
pub const DEFAULT_UPLOAD_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Largest payload sent through a single PUT before switching to an upload
/// session (4 MiB).
pub const DEFAULT_SIMPLE_UPLOAD_LIMIT: u64 = 4 * 1024 * 1024;

pub const DEFAULT_MAX_UPLOAD_TRIES: u32 = 3;

/// Tunables for resumable uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    /// Bytes per chunk; a multiple of [`UPLOAD_CHUNK_ALIGNMENT`]
    pub chunk_size: u64,
    /// Full passes over the outstanding ranges before giving up
    pub max_tries: u32,
    /// Payloads up to this size use a single PUT
    pub simple_upload_limit: u64,
    /// Pass `n` waits `backoff_base * n²` before the next pass
    pub backoff_base: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
            max_tries: DEFAULT_MAX_UPLOAD_TRIES,
            simple_upload_limit: DEFAULT_SIMPLE_UPLOAD_LIMIT,
            backoff_base: Duration::from_secs(2),
        }
    }
}

impl UploadConfig {
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries;
        self
    }

    pub fn with_simple_upload_limit(mut self, limit: u64) -> Self {
        self.simple_upload_limit = limit;
        self
    }

    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_chunk_size(self.chunk_size)?;

        if self.max_tries == 0 {
            return Err(Error::Config(
                "Upload max_tries must be at least 1".to_string(),
            ));
        }

        if self.simple_upload_limit == 0 {
            return Err(Error::Config(
                "Simple upload limit must be greater than 0 bytes".to_string(),
            ));
        }

        Ok(())
    }
}

/// Check that `chunk_size` is a positive multiple of 320 KiB.
pub fn validate_chunk_size(chunk_size: u64) -> Result<()> {
    if chunk_size == 0 || chunk_size % UPLOAD_CHUNK_ALIGNMENT != 0 {
        return Err(Error::Config(format!(
            "Upload chunk size {} must be a positive multiple of {} bytes (320 KiB)",
            chunk_size, UPLOAD_CHUNK_ALIGNMENT
        )));
    }
    Ok(())
}

/// Shared configuration for the SDK.
///
/// Use [`SdkConfig::builder`] to construct instances.
#[derive(Clone)]
pub struct SdkConfig {
    pub http_client: Arc<dyn HttpClient>,
    /// Credential cache persistence; `None` keeps tokens in memory only
    pub secure_store: Option<Arc<dyn SecureStore>>,
    pub clock: Arc<dyn Clock>,
    pub event_bus: EventBus,
    pub upload: UploadConfig,
    /// Retry policy for ordinary API calls
    pub retry_policy: RetryPolicy,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for SdkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkConfig")
            .field("http_client", &"HttpClient { ... }")
            .field(
                "secure_store",
                &self.secure_store.as_ref().map(|_| "SecureStore { ... }"),
            )
            .field("event_bus", &self.event_bus)
            .field("upload", &self.upload)
            .field("retry_policy", &self.retry_policy)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl SdkConfig {
    pub fn builder() -> SdkConfigBuilder {
        SdkConfigBuilder::default()
    }

    /// Validates tunables; bridge presence is enforced by the builder.
    pub fn validate(&self) -> Result<()> {
        self.upload.validate()?;

        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than zero".to_string(),
            ));
        }

        if self.retry_policy.max_attempts == 0 {
            return Err(Error::Config(
                "Retry policy must allow at least one attempt".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_timeout(timeout).map_err(|e| Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: format!("Default reqwest client could not be created: {}", e),
    })?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "No HTTP client implementation provided. \
                  Desktop: enable the 'desktop-shims' feature to use ReqwestHttpClient. \
                  Other hosts: inject an HttpClient with .http_client()."
            .to_string(),
    })
}

#[cfg(all(feature = "desktop-shims", feature = "secure-store"))]
fn provide_default_secure_store() -> Option<Arc<dyn SecureStore>> {
    Some(Arc::new(bridge_desktop::KeyringSecureStore::new()))
}

#[cfg(all(feature = "desktop-shims", not(feature = "secure-store")))]
fn provide_default_secure_store() -> Option<Arc<dyn SecureStore>> {
    Some(Arc::new(bridge_desktop::InMemorySecureStore::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store() -> Option<Arc<dyn SecureStore>> {
    None
}

/// Builder for [`SdkConfig`].
#[derive(Default)]
pub struct SdkConfigBuilder {
    http_client: Option<Arc<dyn HttpClient>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    disable_secure_store: bool,
    clock: Option<Arc<dyn Clock>>,
    event_bus: Option<EventBus>,
    upload: Option<UploadConfig>,
    retry_policy: Option<RetryPolicy>,
    request_timeout: Option<Duration>,
}

impl SdkConfigBuilder {
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self.disable_secure_store = false;
        self
    }

    /// Keep the credential cache in memory only.
    pub fn without_secure_store(mut self) -> Self {
        self.secure_store = None;
        self.disable_secure_store = true;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn upload(mut self, upload: UploadConfig) -> Self {
        self.upload = Some(upload);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// - `CapabilityMissing` when no HTTP client is available
    /// - `Config` when a tunable is out of range
    pub fn build(self) -> Result<SdkConfig> {
        let request_timeout = self.request_timeout.unwrap_or(Duration::from_secs(30));

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(request_timeout)?,
        };

        let secure_store = match (self.secure_store, self.disable_secure_store) {
            (Some(store), _) => Some(store),
            (None, true) => None,
            (None, false) => provide_default_secure_store(),
        };

        let config = SdkConfig {
            http_client,
            secure_store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_bus: self.event_bus.unwrap_or_default(),
            upload: self.upload.unwrap_or_default(),
            retry_policy: self.retry_policy.unwrap_or_default(),
            request_timeout,
        };

        config.validate()?;

        Ok(config)
    }
}
