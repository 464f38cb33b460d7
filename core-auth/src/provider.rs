//! # Authentication Provider
//!
//! Supplies authenticated sessions to the OneDrive client.
//!
//! ## Overview
//!
//! [`OAuthAuthenticationProvider`] resolves a session in this order:
//!
//! 1. The in-memory session, when it is not about to expire.
//! 2. The credential cache, refreshing the cached session when it is
//!    expiring and a refresh token is available.
//! 3. Interactive sign-in through the host's [`WebAuthenticationUi`].
//!
//! Business accounts sign in to the discovery resource first, look up their
//! MyFiles endpoint, then redeem the refresh token for that service.
//!
//! Sign-in and refresh are serialized: concurrent callers wait for the first
//! one and then reuse its session.
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::{AuthenticationProvider, OAuthAuthenticationProvider, ServiceInfo};
//! use core_runtime::config::SdkConfig;
//! use std::sync::Arc;
//! # use core_auth::WebAuthenticationUi;
//!
//! # async fn example(config: SdkConfig, ui: Arc<dyn WebAuthenticationUi>) -> core_auth::Result<()> {
//! let info = ServiceInfo::microsoft_account("app-id", None, ["onedrive.readwrite", "wl.offline_access"]);
//! let provider = OAuthAuthenticationProvider::new(info, &config)?.with_web_ui(ui);
//!
//! let session = provider.authenticate().await?;
//! println!("Signed in as {}", session.account_label());
//! # Ok(())
//! # }
//! ```

use crate::credential_cache::CredentialCache;
use crate::discovery::DiscoveryClient;
use crate::error::{AuthError, Result};
use crate::oauth::{AuthorizationGrant, OAuthHelper, PkceVerifier};
use crate::service_info::ServiceInfo;
use crate::types::{AccountSession, CredentialCacheKey};
use crate::web_ui::WebAuthenticationUi;
use async_trait::async_trait;
use bridge_traits::http::HttpRequest;
use bridge_traits::storage::SecureStore;
use bridge_traits::time::Clock;
use core_runtime::config::SdkConfig;
use core_runtime::events::{AuthEvent, EventBus};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Source of access tokens for API requests.
#[async_trait]
pub trait AuthenticationProvider: Send + Sync {
    /// A session that is valid for at least the expiry buffer.
    async fn authenticate(&self) -> Result<AccountSession>;

    /// Set the `Authorization` header on `request`, authenticating first
    /// when needed.
    async fn authenticate_request(&self, request: &mut HttpRequest) -> Result<()> {
        let session = self.authenticate().await?;
        request
            .headers
            .retain(|name, _| !name.eq_ignore_ascii_case("authorization"));
        request
            .headers
            .insert("Authorization".to_string(), session.authorization_header());
        Ok(())
    }

    /// The in-memory session, if any. Never triggers sign-in.
    async fn current_session(&self) -> Option<AccountSession>;

    async fn sign_out(&self) -> Result<()>;

    /// API root for requests made with this provider's sessions.
    ///
    /// Business accounts only know it after discovery has run.
    async fn base_url(&self) -> Result<String>;
}

/// OAuth 2.0 provider for Microsoft accounts and Azure AD.
pub struct OAuthAuthenticationProvider {
    service_info: RwLock<ServiceInfo>,
    oauth: OAuthHelper,
    discovery: DiscoveryClient,
    cache: Arc<CredentialCache>,
    web_ui: Option<Arc<dyn WebAuthenticationUi>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    session: RwLock<Option<AccountSession>>,
    /// Held for the whole sign-in/refresh; the flag records whether the
    /// persisted cache has been loaded.
    auth_lock: Mutex<bool>,
}

impl OAuthAuthenticationProvider {
    /// # Errors
    ///
    /// `InvalidServiceInfo` when `service_info` fails validation.
    pub fn new(service_info: ServiceInfo, config: &SdkConfig) -> Result<Self> {
        service_info.validate()?;

        Ok(Self {
            service_info: RwLock::new(service_info),
            oauth: OAuthHelper::new(config.http_client.clone()).with_clock(config.clock.clone()),
            discovery: DiscoveryClient::new(config.http_client.clone()),
            cache: Arc::new(CredentialCache::new()),
            web_ui: None,
            secure_store: config.secure_store.clone(),
            event_bus: config.event_bus.clone(),
            clock: config.clock.clone(),
            session: RwLock::new(None),
            auth_lock: Mutex::new(false),
        })
    }

    pub fn with_web_ui(mut self, web_ui: Arc<dyn WebAuthenticationUi>) -> Self {
        self.web_ui = Some(web_ui);
        self
    }

    /// Share a cache between providers, or supply one with access hooks.
    pub fn with_credential_cache(mut self, cache: Arc<CredentialCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Replace the OAuth helper, e.g. to shorten refresh backoff.
    pub fn with_oauth_helper(mut self, oauth: OAuthHelper) -> Self {
        self.oauth = oauth;
        self
    }

    pub fn credential_cache(&self) -> Arc<CredentialCache> {
        self.cache.clone()
    }

    /// Current service configuration, including discovered endpoints.
    pub async fn service_info(&self) -> ServiceInfo {
        self.service_info.read().await.clone()
    }

    fn emit(&self, event: AuthEvent) {
        self.event_bus.emit(event);
    }

    async fn usable_session(&self) -> Option<AccountSession> {
        let now = self.clock.now();
        self.session
            .read()
            .await
            .as_ref()
            .filter(|session| !session.is_expiring_at(now))
            .cloned()
    }

    async fn cached_session(&self, info: &ServiceInfo) -> Option<AccountSession> {
        match &info.user_id {
            Some(user_id) => {
                let key =
                    CredentialCacheKey::new(&info.app_id, Some(user_id.clone()), info.account_type);
                self.cache.get(&key).await
            }
            None => {
                self.cache
                    .get_for_client(&info.app_id, info.account_type)
                    .await
            }
        }
    }

    async fn load_cache(&self, client_id: &str) {
        let Some(store) = &self.secure_store else {
            return;
        };
        if let Err(e) = self.cache.load(store.as_ref(), client_id).await {
            warn!(error = %e, "Could not load credential cache, continuing without it");
        }
    }

    async fn persist_cache(&self, client_id: &str) {
        let Some(store) = &self.secure_store else {
            return;
        };
        if !self.cache.has_state_changed().await {
            return;
        }
        if let Err(e) = self.cache.persist(store.as_ref(), client_id).await {
            warn!(error = %e, "Could not persist credential cache");
        }
    }

    async fn store_session(&self, session: AccountSession) {
        let client_id = session.client_id.clone();
        *self.session.write().await = Some(session.clone());
        self.cache.add(session).await;
        self.persist_cache(&client_id).await;
    }

    async fn resolve_session(&self, cache_loaded: &mut bool) -> Result<AccountSession> {
        let info = self.service_info.read().await.clone();

        if !*cache_loaded {
            self.load_cache(&info.app_id).await;
            *cache_loaded = true;
        }

        if let Some(cached) = self.cached_session(&info).await {
            if !cached.is_expiring_at(self.clock.now()) && !info.needs_discovery() {
                debug!(account = cached.account_label(), "Using cached session");
                *self.session.write().await = Some(cached.clone());
                return Ok(cached);
            }

            if cached.can_refresh() {
                match self.refresh(&info, &cached).await {
                    Ok(session) => return Ok(session),
                    Err(e) => {
                        warn!(error = %e, "Cached session could not be refreshed, signing in again");
                        self.cache.remove(&cached.cache_key()).await;
                        self.persist_cache(&info.app_id).await;
                    }
                }
            }
        }

        self.emit(AuthEvent::SigningIn {
            account_type: info.account_type.to_string(),
        });

        let session = self.interactive_sign_in(&info).await?;
        self.store_session(session.clone()).await;

        self.emit(AuthEvent::SignedIn {
            account: session.account_label().to_string(),
            account_type: session.account_type.to_string(),
        });
        info!(account_type = %session.account_type, "Signed in");

        Ok(session)
    }

    #[instrument(skip(self, info, cached), fields(account_type = %info.account_type))]
    async fn refresh(&self, info: &ServiceInfo, cached: &AccountSession) -> Result<AccountSession> {
        let refresh_token = cached
            .refresh_token
            .as_deref()
            .ok_or(AuthError::NotAuthenticated)?;

        self.emit(AuthEvent::TokenRefreshing {
            account: cached.account_label().to_string(),
        });

        let result = if info.needs_discovery() {
            // Endpoints are not known in this process yet; rediscover them.
            match self
                .oauth
                .redeem_refresh_token(info, refresh_token, info.discovery_service_resource.as_deref())
                .await
            {
                Ok(discovery_session) => self.discover_service(info, discovery_session).await,
                Err(e) => Err(e),
            }
        } else {
            self.oauth
                .redeem_refresh_token(info, refresh_token, None)
                .await
        };

        let session = match result {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "Token refresh failed");
                self.emit(AuthEvent::AuthError {
                    account: Some(cached.account_label().to_string()),
                    message: format!("Token refresh failed: {}", e),
                    recoverable: true,
                });
                return Err(e);
            }
        };

        // A refreshed session without a user id must replace the cached one
        // under the same key.
        let session = match (&session.user_id, &cached.user_id) {
            (None, Some(user_id)) => session.with_user_id(user_id.clone()),
            _ => session,
        };

        self.store_session(session.clone()).await;

        self.emit(AuthEvent::TokenRefreshed {
            account: session.account_label().to_string(),
            expires_at: session.expires_on.timestamp(),
        });
        info!("Token refreshed");

        Ok(session)
    }

    async fn interactive_sign_in(&self, info: &ServiceInfo) -> Result<AccountSession> {
        let web_ui = self.web_ui.as_ref().ok_or_else(|| {
            AuthError::failed("Interactive sign-in requires a web authentication UI")
        })?;

        let needs_discovery = info.needs_discovery();
        let resource = if needs_discovery {
            info.discovery_service_resource.clone()
        } else {
            None
        };

        let pkce = PkceVerifier::new();
        let request_url = self
            .oauth
            .build_authorization_url(info, &pkce, resource.as_deref())?;
        let callback_url = Url::parse(&info.return_url)
            .map_err(|e| AuthError::InvalidServiceInfo(format!("Invalid return URL: {}", e)))?;

        let params = web_ui.authenticate(&request_url, &callback_url).await?;

        let session = match self
            .oauth
            .parse_authorization_response(info, &params, Some(pkce.state()))?
        {
            AuthorizationGrant::Code(code) => {
                self.oauth
                    .redeem_authorization_code(info, &code, Some(&pkce), resource.as_deref())
                    .await?
            }
            AuthorizationGrant::Session(session) => session,
        };

        if needs_discovery {
            self.discover_service(info, session).await
        } else {
            Ok(session)
        }
    }

    /// Look up the MyFiles endpoint with a discovery-resource session, then
    /// trade its refresh token for a session on the discovered service.
    async fn discover_service(
        &self,
        info: &ServiceInfo,
        discovery_session: AccountSession,
    ) -> Result<AccountSession> {
        let discovery_url = info.discovery_service_url.as_deref().ok_or_else(|| {
            AuthError::InvalidServiceInfo("Discovery service URL is not set".to_string())
        })?;

        let endpoint = self
            .discovery
            .discover_my_files(discovery_url, &discovery_session.access_token)
            .await?;

        let refresh_token = discovery_session.refresh_token.as_deref().ok_or_else(|| {
            AuthError::failed("Discovery sign-in did not return a refresh token")
        })?;

        let updated = info
            .clone()
            .with_base_url(endpoint.service_endpoint_uri)
            .with_service_resource(endpoint.service_resource_id);

        let session = self
            .oauth
            .redeem_refresh_token(&updated, refresh_token, None)
            .await?;

        *self.service_info.write().await = updated;
        Ok(session)
    }
}

#[async_trait]
impl AuthenticationProvider for OAuthAuthenticationProvider {
    async fn authenticate(&self) -> Result<AccountSession> {
        if let Some(session) = self.usable_session().await {
            return Ok(session);
        }

        let mut cache_loaded = self.auth_lock.lock().await;

        // Another caller may have finished while we waited.
        if let Some(session) = self.usable_session().await {
            return Ok(session);
        }

        match self.resolve_session(&mut cache_loaded).await {
            Ok(session) => Ok(session),
            Err(e) => {
                let recoverable = !matches!(e, AuthError::InvalidServiceInfo(_));
                self.emit(AuthEvent::AuthError {
                    account: None,
                    message: e.to_string(),
                    recoverable,
                });
                Err(e)
            }
        }
    }

    async fn current_session(&self) -> Option<AccountSession> {
        self.session.read().await.clone()
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<()> {
        let _guard = self.auth_lock.lock().await;
        let info = self.service_info.read().await.clone();
        let session = self.session.write().await.take();

        if let Some(web_ui) = &self.web_ui {
            if let Some(sign_out_url) = self.oauth.build_sign_out_url(&info)? {
                let callback_url = Url::parse(&info.return_url).map_err(|e| {
                    AuthError::InvalidServiceInfo(format!("Invalid return URL: {}", e))
                })?;
                if let Err(e) = web_ui.authenticate(&sign_out_url, &callback_url).await {
                    warn!(error = %e, "Sign-out page did not complete");
                }
            }
        }

        let account = match &session {
            Some(session) => {
                self.cache.remove(&session.cache_key()).await;
                self.persist_cache(&info.app_id).await;
                session.account_label().to_string()
            }
            None => info.app_id.clone(),
        };

        self.emit(AuthEvent::SignedOut { account });
        info!("Signed out");
        Ok(())
    }

    async fn base_url(&self) -> Result<String> {
        self.service_info.read().await.base_url.clone().ok_or_else(|| {
            AuthError::InvalidServiceInfo(
                "Base URL is unknown until discovery completes".to_string(),
            )
        })
    }
}
