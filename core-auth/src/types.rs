use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Seconds before expiry at which a session counts as expiring.
pub const EXPIRY_BUFFER_SECS: i64 = 300;

/// The identity service an account signs in with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AccountType {
    #[default]
    None,
    /// Consumer Microsoft account (login.live.com)
    MicrosoftAccount,
    /// Azure Active Directory work or school account
    ActiveDirectory,
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountType::None => write!(f, "None"),
            AccountType::MicrosoftAccount => write!(f, "MicrosoftAccount"),
            AccountType::ActiveDirectory => write!(f, "ActiveDirectory"),
        }
    }
}

/// Access token, token type and expiry used to authorize API calls.
///
/// # Examples
///
/// ```
/// use core_auth::{AccountSession, AccountType};
/// use chrono::{Duration, Utc};
///
/// let session = AccountSession::new("token", AccountType::MicrosoftAccount, "client-id")
///     .with_expires_on(Utc::now() + Duration::hours(1))
///     .with_refresh_token("refresh");
///
/// assert!(!session.is_expiring_at(Utc::now()));
/// assert!(session.can_refresh());
/// assert_eq!(session.authorization_header(), "bearer token");
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSession {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub access_token_type: String,
    pub expires_on: DateTime<Utc>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub client_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub account_type: AccountType,
    #[serde(default)]
    pub scopes: Vec<String>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl AccountSession {
    /// New session that expires immediately until [`with_expires_on`](Self::with_expires_on)
    /// or [`with_expires_in`](Self::with_expires_in) is applied.
    pub fn new(
        access_token: impl Into<String>,
        account_type: AccountType,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            access_token_type: default_token_type(),
            expires_on: DateTime::<Utc>::UNIX_EPOCH,
            refresh_token: None,
            client_id: client_id.into(),
            user_id: None,
            account_type,
            scopes: Vec::new(),
        }
    }

    pub fn with_expires_on(mut self, expires_on: DateTime<Utc>) -> Self {
        self.expires_on = expires_on;
        self
    }

    /// Expire `expires_in` seconds after `now`.
    pub fn with_expires_in(mut self, now: DateTime<Utc>, expires_in: i64) -> Self {
        self.expires_on = now + Duration::seconds(expires_in);
        self
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.access_token_type = token_type.into();
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// True when the token expires within five minutes of `now`, or already has.
    pub fn is_expiring_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_on <= now + Duration::seconds(EXPIRY_BUFFER_SECS)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .map_or(false, |token| !token.is_empty())
    }

    /// Value for the `Authorization` header.
    pub fn authorization_header(&self) -> String {
        let token_type = if self.access_token_type.is_empty() {
            "bearer"
        } else {
            self.access_token_type.as_str()
        };
        format!("{} {}", token_type, self.access_token)
    }

    /// Name used in logs and events: the user id, else the client id.
    pub fn account_label(&self) -> &str {
        self.user_id.as_deref().unwrap_or(&self.client_id)
    }

    pub fn cache_key(&self) -> CredentialCacheKey {
        CredentialCacheKey {
            client_id: self.client_id.clone(),
            user_id: self.user_id.clone(),
            account_type: self.account_type,
        }
    }
}

impl fmt::Debug for AccountSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountSession")
            .field("access_token", &"[REDACTED]")
            .field("access_token_type", &self.access_token_type)
            .field("expires_on", &self.expires_on)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("client_id", &self.client_id)
            .field("user_id", &self.user_id)
            .field("account_type", &self.account_type)
            .finish()
    }
}

/// Identifies one cached session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialCacheKey {
    pub client_id: String,
    pub user_id: Option<String>,
    pub account_type: AccountType,
}

impl CredentialCacheKey {
    pub fn new(
        client_id: impl Into<String>,
        user_id: Option<String>,
        account_type: AccountType,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            user_id,
            account_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(expires_on: DateTime<Utc>) -> AccountSession {
        AccountSession::new("access", AccountType::MicrosoftAccount, "client")
            .with_expires_on(expires_on)
    }

    #[test]
    fn test_is_expiring_uses_five_minute_buffer() {
        let now = Utc::now();
        assert!(session(now - Duration::seconds(1)).is_expiring_at(now));
        assert!(session(now + Duration::seconds(299)).is_expiring_at(now));
        assert!(session(now + Duration::seconds(300)).is_expiring_at(now));
        assert!(!session(now + Duration::seconds(301)).is_expiring_at(now));
    }

    #[test]
    fn test_new_session_is_expired() {
        let session = AccountSession::new("a", AccountType::ActiveDirectory, "c");
        assert!(session.is_expiring_at(Utc::now()));
    }

    #[test]
    fn test_can_refresh() {
        let now = Utc::now();
        assert!(!session(now).can_refresh());
        assert!(!session(now).with_refresh_token("").can_refresh());
        assert!(session(now).with_refresh_token("r").can_refresh());
    }

    #[test]
    fn test_authorization_header() {
        let now = Utc::now();
        assert_eq!(session(now).authorization_header(), "bearer access");
        assert_eq!(
            session(now).with_token_type("Bearer").authorization_header(),
            "Bearer access"
        );
        assert_eq!(
            session(now).with_token_type("").authorization_header(),
            "bearer access"
        );
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let debug = format!(
            "{:?}",
            session(Utc::now()).with_refresh_token("refresh-secret")
        );
        assert!(!debug.contains("access\""));
        assert!(!debug.contains("refresh-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_cache_key_and_label() {
        let with_user = session(Utc::now()).with_user_id("user-1");
        assert_eq!(with_user.account_label(), "user-1");
        assert_eq!(
            with_user.cache_key(),
            CredentialCacheKey::new("client", Some("user-1".to_string()), AccountType::MicrosoftAccount)
        );
        assert_eq!(session(Utc::now()).account_label(), "client");
    }

    #[test]
    fn test_session_serde_defaults() {
        let json = r#"{
            "access_token": "a",
            "expires_on": "2030-01-01T00:00:00Z",
            "client_id": "c",
            "account_type": "ActiveDirectory"
        }"#;
        let session: AccountSession = serde_json::from_str(json).unwrap();
        assert_eq!(session.access_token_type, "bearer");
        assert!(session.refresh_token.is_none());
        assert!(session.scopes.is_empty());
    }
}
