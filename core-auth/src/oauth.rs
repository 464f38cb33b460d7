//! OAuth 2.0 helpers for Microsoft account and Azure AD sign-in.
//!
//! Builds authorization and sign-out URLs, interprets redirect parameters,
//! and redeems authorization codes and refresh tokens at the token endpoint.
//! PKCE (RFC 7636) is attached to every code flow.
//!
//! Tokens, codes and verifiers are never logged.
//!
//! # Example
//!
//! ```no_run
//! use core_auth::oauth::{OAuthHelper, PkceVerifier};
//! use core_auth::ServiceInfo;
//! use std::sync::Arc;
//!
//! # fn example(http_client: Arc<dyn bridge_traits::HttpClient>) -> core_auth::Result<()> {
//! let info = ServiceInfo::microsoft_account("app-id", None, ["onedrive.readwrite", "wl.offline_access"]);
//! let helper = OAuthHelper::new(http_client);
//! let pkce = PkceVerifier::new();
//!
//! let url = helper.build_authorization_url(&info, &pkce, None)?;
//! // Send the user to `url`, then feed the redirect back in...
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::query::parse_query_options;
use crate::service_info::ServiceInfo;
use crate::types::{AccountSession, AccountType};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bridge_traits::time::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

const MAX_REFRESH_ATTEMPTS: u32 = 3;

/// PKCE (Proof Key for Code Exchange) verifier plus the CSRF `state` value.
///
/// Only the challenge leaves the process during authorization; the verifier
/// is sent with the code redemption.
#[derive(Debug, Clone)]
pub struct PkceVerifier {
    verifier: String,
    state: String,
}

impl PkceVerifier {
    /// 32 random bytes for the verifier and 16 for the state, both
    /// base64url without padding.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();

        let mut verifier_bytes = [0u8; 32];
        rng.fill(&mut verifier_bytes);
        let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

        let mut state_bytes = [0u8; 16];
        rng.fill(&mut state_bytes);
        let state = URL_SAFE_NO_PAD.encode(state_bytes);

        Self { verifier, state }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// BASE64URL(SHA256(code_verifier))
    pub fn challenge(&self) -> String {
        let hash = Sha256::digest(self.verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hash)
    }
}

impl Default for PkceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

/// What the authorization redirect handed back.
#[derive(Debug, Clone)]
pub enum AuthorizationGrant {
    /// Code flow: redeem at the token endpoint.
    Code(String),
    /// Token flow: the redirect already carried an access token.
    Session(AccountSession),
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default = "default_expires_in", deserialize_with = "lenient_i64")]
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

/// AAD v1 returns numeric fields as strings.
fn lenient_i64<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(i64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl TokenResponse {
    fn from_params(params: &HashMap<String, String>) -> Result<Self> {
        let access_token = params
            .get("access_token")
            .cloned()
            .ok_or_else(|| AuthError::InvalidResponse("Missing access_token".to_string()))?;

        let expires_in = match params.get("expires_in") {
            Some(raw) => raw.parse().map_err(|_| {
                AuthError::InvalidResponse(format!("Invalid expires_in value: {}", raw))
            })?,
            None => default_expires_in(),
        };

        Ok(Self {
            access_token,
            token_type: params.get("token_type").cloned(),
            expires_in,
            refresh_token: params.get("refresh_token").cloned(),
            user_id: params.get("user_id").cloned(),
            scope: params.get("scope").cloned(),
        })
    }

    /// Turn the response into a session for `info`'s application.
    pub fn into_session(self, info: &ServiceInfo, now: DateTime<Utc>) -> AccountSession {
        let scopes = match self.scope.as_deref() {
            Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
            None => info.scopes.clone(),
        };

        let mut session = AccountSession::new(self.access_token, info.account_type, &info.app_id)
            .with_expires_in(now, self.expires_in)
            .with_scopes(scopes);

        if let Some(token_type) = self.token_type {
            session = session.with_token_type(token_type);
        }
        if let Some(refresh_token) = self.refresh_token {
            session = session.with_refresh_token(refresh_token);
        }
        if let Some(user_id) = self.user_id.or_else(|| info.user_id.clone()) {
            session = session.with_user_id(user_id);
        }
        session
    }
}

/// Talks to the OAuth authorization and token endpoints described by a
/// [`ServiceInfo`].
pub struct OAuthHelper {
    http_client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    retry_delay: Duration,
}

impl OAuthHelper {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            clock: Arc::new(SystemClock),
            retry_delay: Duration::from_millis(100),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Base delay between refresh retries; doubles per attempt.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Authorization URL for the code flow.
    ///
    /// Microsoft accounts request `scope`; Azure AD requests a `resource`,
    /// which is `resource` when given, else the service resource.
    #[instrument(skip(self, info, pkce), fields(account_type = %info.account_type))]
    pub fn build_authorization_url(
        &self,
        info: &ServiceInfo,
        pkce: &PkceVerifier,
        resource: Option<&str>,
    ) -> Result<Url> {
        let mut url = Url::parse(&info.authentication_service_url).map_err(|e| {
            AuthError::InvalidServiceInfo(format!("Invalid authentication URL: {}", e))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &info.app_id);
            query.append_pair("response_type", "code");
            query.append_pair("redirect_uri", &info.return_url);

            match info.account_type {
                AccountType::ActiveDirectory => {
                    if let Some(resource) = resource.or(info.service_resource.as_deref()) {
                        query.append_pair("resource", resource);
                    }
                }
                _ => {
                    query.append_pair("scope", &info.scopes.join(" "));
                }
            }

            if let Some(user_id) = &info.user_id {
                query.append_pair("login_hint", user_id);
            }

            query.append_pair("state", pkce.state());
            query.append_pair("code_challenge", &pkce.challenge());
            query.append_pair("code_challenge_method", "S256");
        }

        debug!("Built authorization URL");
        Ok(url)
    }

    /// Sign-out URL that returns to the application's redirect page.
    pub fn build_sign_out_url(&self, info: &ServiceInfo) -> Result<Option<Url>> {
        let Some(sign_out_url) = info.sign_out_url.as_deref() else {
            return Ok(None);
        };

        let mut url = Url::parse(sign_out_url)
            .map_err(|e| AuthError::InvalidServiceInfo(format!("Invalid sign-out URL: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            match info.account_type {
                AccountType::ActiveDirectory => {
                    query.append_pair("post_logout_redirect_uri", &info.return_url);
                }
                _ => {
                    query.append_pair("client_id", &info.app_id);
                    query.append_pair("redirect_uri", &info.return_url);
                }
            }
        }

        Ok(Some(url))
    }

    /// Interpret the parameters of an authorization redirect.
    ///
    /// - `error=access_denied` means the user cancelled.
    /// - Any other `error` fails with its description.
    /// - `state` must match when `expected_state` is given.
    /// - A `code` or an `access_token` is required.
    pub fn parse_authorization_response(
        &self,
        info: &ServiceInfo,
        params: &HashMap<String, String>,
        expected_state: Option<&str>,
    ) -> Result<AuthorizationGrant> {
        if let Some(error) = params.get("error") {
            let description = params
                .get("error_description")
                .cloned()
                .unwrap_or_else(|| error.clone());

            warn!(error = %error, "Authorization endpoint returned an error");

            return if error == "access_denied" {
                Err(AuthError::AuthenticationCancelled)
            } else {
                Err(AuthError::failed(description))
            };
        }

        if let Some(expected) = expected_state {
            let actual = params.get("state").map(String::as_str).unwrap_or_default();
            if actual != expected {
                return Err(AuthError::StateMismatch {
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }

        if let Some(code) = params.get("code") {
            return Ok(AuthorizationGrant::Code(code.clone()));
        }

        if params.contains_key("access_token") {
            let response = TokenResponse::from_params(params)?;
            return Ok(AuthorizationGrant::Session(
                response.into_session(info, self.clock.now()),
            ));
        }

        Err(AuthError::failed(
            "Authorization response contained neither a code nor a token",
        ))
    }

    /// [`parse_authorization_response`](Self::parse_authorization_response)
    /// for a full redirect URL.
    pub fn parse_redirect_url(
        &self,
        info: &ServiceInfo,
        redirect: &Url,
        expected_state: Option<&str>,
    ) -> Result<AuthorizationGrant> {
        self.parse_authorization_response(info, &parse_query_options(redirect), expected_state)
    }

    /// Exchange an authorization code for a session.
    #[instrument(skip(self, info, code, pkce), fields(account_type = %info.account_type))]
    pub async fn redeem_authorization_code(
        &self,
        info: &ServiceInfo,
        code: &str,
        pkce: Option<&PkceVerifier>,
        resource: Option<&str>,
    ) -> Result<AccountSession> {
        let mut params: Vec<(&str, &str)> = vec![
            ("client_id", info.app_id.as_str()),
            ("redirect_uri", info.return_url.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
        ];
        if let Some(pkce) = pkce {
            params.push(("code_verifier", pkce.verifier()));
        }
        if let Some(secret) = info.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }
        if info.account_type == AccountType::ActiveDirectory {
            if let Some(resource) = resource.or(info.service_resource.as_deref()) {
                params.push(("resource", resource));
            }
        }

        let request = HttpRequest::new(HttpMethod::Post, info.token_service_url.clone())
            .form(&params)?;

        let response = self.http_client.execute(request).await?;

        if !response.is_success() {
            let error_body = response
                .text()
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            warn!(status = response.status, "Authorization code redemption failed");

            return Err(AuthError::failed(format!(
                "Token endpoint returned {}: {}",
                response.status, error_body
            )));
        }

        let token_response: TokenResponse = serde_json::from_slice(&response.body)?;
        info!(expires_in = token_response.expires_in, "Redeemed authorization code");

        Ok(token_response.into_session(info, self.clock.now()))
    }

    /// Redeem a refresh token for a new session.
    ///
    /// Transport failures and 5xx responses are retried up to three times
    /// with exponential backoff. 4xx responses fail immediately. When the
    /// service does not rotate the refresh token, the old one is kept.
    #[instrument(skip(self, info, refresh_token), fields(account_type = %info.account_type))]
    pub async fn redeem_refresh_token(
        &self,
        info: &ServiceInfo,
        refresh_token: &str,
        resource: Option<&str>,
    ) -> Result<AccountSession> {
        let mut params: Vec<(&str, &str)> = vec![
            ("client_id", info.app_id.as_str()),
            ("redirect_uri", info.return_url.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        if let Some(secret) = info.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }
        if info.account_type == AccountType::ActiveDirectory {
            if let Some(resource) = resource.or(info.service_resource.as_deref()) {
                params.push(("resource", resource));
            }
        }

        let request = HttpRequest::new(HttpMethod::Post, info.token_service_url.clone())
            .form(&params)?;

        let mut attempts = 0;
        loop {
            attempts += 1;

            let failure = match self.http_client.execute(request.clone()).await {
                Ok(response) if response.is_success() => {
                    let token_response: TokenResponse = serde_json::from_slice(&response.body)?;
                    info!(expires_in = token_response.expires_in, "Refreshed access token");

                    let mut session = token_response.into_session(info, self.clock.now());
                    if !session.can_refresh() {
                        session.refresh_token = Some(refresh_token.to_string());
                    }
                    return Ok(session);
                }
                Ok(response) if response.is_client_error() => {
                    let error_body = response
                        .text()
                        .unwrap_or_else(|_| "Unable to read error response".to_string());

                    warn!(status = response.status, "Token refresh rejected");

                    return Err(AuthError::TokenRefreshFailed(format!(
                        "Token endpoint returned {}: {}",
                        response.status, error_body
                    )));
                }
                Ok(response) => format!("Token endpoint returned {}", response.status),
                Err(e) => e.to_string(),
            };

            if attempts >= MAX_REFRESH_ATTEMPTS {
                return Err(AuthError::TokenRefreshFailed(format!(
                    "Token refresh failed after {} attempts. Last error: {}",
                    attempts, failure
                )));
            }

            let delay = self.retry_delay * 2u32.pow(attempts - 1);
            warn!(
                attempts,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "Token refresh failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
