//! # OneDrive SDK
//!
//! Facade over the workspace crates. Hosts depend on `onedrive-sdk` and pick
//! platform shims with features instead of wiring each crate.
//!
//! - `desktop-shims` (default): reqwest HTTP client as the default bridge
//! - `secure-store` (default): credential cache persisted in the OS keyring
//!
//! ```ignore
//! use onedrive_sdk::auth::{OAuthAuthenticationProvider, ServiceInfo};
//! use onedrive_sdk::onedrive::{ItemLocator, OneDriveClient, QueryOptions};
//! use onedrive_sdk::runtime::SdkConfig;
//! use std::sync::Arc;
//!
//! let config = SdkConfig::builder().build()?;
//! let info = ServiceInfo::microsoft_account(APP_ID, None, ["onedrive.readwrite", "wl.offline_access"]);
//! let auth = Arc::new(OAuthAuthenticationProvider::new(info.clone(), &config)?.with_web_ui(ui));
//!
//! let client = OneDriveClient::new(&config, &info, auth);
//! let root = client.list_children(&ItemLocator::Root, &QueryOptions::new()).await?;
//! ```

pub use bridge_traits as bridge;
pub use core_auth as auth;
pub use core_runtime as runtime;
pub use provider_onedrive as onedrive;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop as desktop;

pub use core_auth::{
    AccountSession, AccountType, AuthenticationProvider, OAuthAuthenticationProvider, ServiceInfo,
    WebAuthenticationUi,
};
pub use core_runtime::{EventBus, SdkConfig, SdkEvent};
pub use provider_onedrive::{
    ChunkedUploadProvider, ChunkedUploadSessionDescriptor, ConflictBehavior, Item, ItemLocator,
    OneDriveClient, OneDriveError, QueryOptions, UploadSession,
};
