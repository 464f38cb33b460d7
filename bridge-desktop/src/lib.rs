//! Bridges for desktop hosts (macOS, Windows, Linux).
//!
//! [`ReqwestHttpClient`] carries the HTTP traffic. Credentials go to the OS
//! keychain through [`KeyringSecureStore`] when the `secure-store` feature
//! (on by default) is enabled, or to [`InMemorySecureStore`] otherwise.
//!
//! ```ignore
//! let config = SdkConfig::builder()
//!     .http_client(Arc::new(ReqwestHttpClient::new()?))
//!     .secure_store(Arc::new(KeyringSecureStore::new()))
//!     .build()?;
//! ```

mod http;
mod memory_store;

#[cfg(feature = "secure-store")]
mod secure_store;

pub use http::ReqwestHttpClient;
pub use memory_store::InMemorySecureStore;

#[cfg(feature = "secure-store")]
pub use secure_store::KeyringSecureStore;
