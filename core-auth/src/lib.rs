//! # Authentication
//!
//! Account sessions, credential caching and OAuth 2.0 sign-in for OneDrive.
//!
//! ## Overview
//!
//! Consumer accounts sign in through login.live.com; work and school
//! accounts sign in through Azure AD and locate their OneDrive with the
//! Office 365 discovery service. [`OAuthAuthenticationProvider`] ties the
//! pieces together and hands out sessions to the API client.
//!
//! ## Features
//!
//! - Authorization code flow with PKCE
//! - Token refresh with retry and a five minute expiry buffer
//! - Credential cache persisted through the host's secure store
//! - Host-supplied sign-in UI via [`WebAuthenticationUi`]
//! - Auth state events on the SDK event bus

pub mod credential_cache;
pub mod discovery;
pub mod error;
pub mod oauth;
pub mod provider;
pub mod query;
pub mod service_info;
pub mod types;
pub mod web_ui;

pub use credential_cache::{CacheAccess, CredentialCache};
pub use discovery::{DiscoveryClient, ServiceEndpoint};
pub use error::{AuthError, Result};
pub use oauth::{AuthorizationGrant, OAuthHelper, PkceVerifier, TokenResponse};
pub use provider::{AuthenticationProvider, OAuthAuthenticationProvider};
pub use service_info::ServiceInfo;
pub use types::{AccountSession, AccountType, CredentialCacheKey};
pub use web_ui::WebAuthenticationUi;
