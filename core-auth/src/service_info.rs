//! Endpoints and application identity for one OneDrive service variant.

use crate::error::{AuthError, Result};
use crate::types::AccountType;

pub const MSA_AUTHENTICATION_URL: &str = "https://login.live.com/oauth20_authorize.srf";
pub const MSA_TOKEN_URL: &str = "https://login.live.com/oauth20_token.srf";
pub const MSA_SIGN_OUT_URL: &str = "https://login.live.com/oauth20_logout.srf";
pub const MSA_DESKTOP_RETURN_URL: &str = "https://login.live.com/oauth20_desktop.srf";
pub const MSA_BASE_URL: &str = "https://api.onedrive.com/v1.0";

pub const AAD_AUTHENTICATION_URL: &str = "https://login.microsoftonline.com/common/oauth2/authorize";
pub const AAD_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/token";
pub const AAD_SIGN_OUT_URL: &str = "https://login.microsoftonline.com/common/oauth2/logout";

pub const DISCOVERY_SERVICE_URL: &str = "https://api.office.com/discovery/v2.0/me/services";
pub const DISCOVERY_SERVICE_RESOURCE: &str = "https://api.office.com/discovery/";

/// Configuration for reaching and authenticating against one OneDrive
/// service: consumer (Microsoft account) or business (Azure AD).
///
/// ```
/// use core_auth::ServiceInfo;
///
/// let info = ServiceInfo::microsoft_account("000000004C12AB34", None, ["onedrive.readwrite", "wl.offline_access"]);
/// assert_eq!(info.base_url.as_deref(), Some("https://api.onedrive.com/v1.0"));
/// assert!(info.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub account_type: AccountType,
    pub app_id: String,
    pub client_secret: Option<String>,
    pub return_url: String,
    pub scopes: Vec<String>,
    pub authentication_service_url: String,
    pub token_service_url: String,
    pub sign_out_url: Option<String>,
    /// API root; filled by discovery for business accounts
    pub base_url: Option<String>,
    /// AAD resource the access token is issued for
    pub service_resource: Option<String>,
    pub discovery_service_url: Option<String>,
    pub discovery_service_resource: Option<String>,
    /// Hint for cache lookup and `login_hint`
    pub user_id: Option<String>,
}

impl ServiceInfo {
    /// Consumer OneDrive through login.live.com.
    ///
    /// `return_url` defaults to the desktop redirect page.
    pub fn microsoft_account<I, S>(
        app_id: impl Into<String>,
        return_url: Option<String>,
        scopes: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            account_type: AccountType::MicrosoftAccount,
            app_id: app_id.into(),
            client_secret: None,
            return_url: return_url.unwrap_or_else(|| MSA_DESKTOP_RETURN_URL.to_string()),
            scopes: scopes.into_iter().map(Into::into).collect(),
            authentication_service_url: MSA_AUTHENTICATION_URL.to_string(),
            token_service_url: MSA_TOKEN_URL.to_string(),
            sign_out_url: Some(MSA_SIGN_OUT_URL.to_string()),
            base_url: Some(MSA_BASE_URL.to_string()),
            service_resource: None,
            discovery_service_url: None,
            discovery_service_resource: None,
            user_id: None,
        }
    }

    /// OneDrive for Business through Azure AD. The API root and resource are
    /// discovered after sign-in unless set explicitly.
    pub fn active_directory(app_id: impl Into<String>, return_url: impl Into<String>) -> Self {
        Self {
            account_type: AccountType::ActiveDirectory,
            app_id: app_id.into(),
            client_secret: None,
            return_url: return_url.into(),
            scopes: Vec::new(),
            authentication_service_url: AAD_AUTHENTICATION_URL.to_string(),
            token_service_url: AAD_TOKEN_URL.to_string(),
            sign_out_url: Some(AAD_SIGN_OUT_URL.to_string()),
            base_url: None,
            service_resource: None,
            discovery_service_url: Some(DISCOVERY_SERVICE_URL.to_string()),
            discovery_service_resource: Some(DISCOVERY_SERVICE_RESOURCE.to_string()),
            user_id: None,
        }
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn with_service_resource(mut self, resource: impl Into<String>) -> Self {
        self.service_resource = Some(resource.into());
        self
    }

    pub fn with_authentication_urls(
        mut self,
        authentication_service_url: impl Into<String>,
        token_service_url: impl Into<String>,
    ) -> Self {
        self.authentication_service_url = authentication_service_url.into();
        self.token_service_url = token_service_url.into();
        self
    }

    pub fn with_discovery(
        mut self,
        discovery_service_url: impl Into<String>,
        discovery_service_resource: impl Into<String>,
    ) -> Self {
        self.discovery_service_url = Some(discovery_service_url.into());
        self.discovery_service_resource = Some(discovery_service_resource.into());
        self
    }

    /// Business accounts still need the discovery round-trip.
    pub fn needs_discovery(&self) -> bool {
        self.account_type == AccountType::ActiveDirectory
            && (self.base_url.is_none() || self.service_resource.is_none())
    }

    pub fn validate(&self) -> Result<()> {
        if self.app_id.trim().is_empty() {
            return Err(AuthError::InvalidServiceInfo(
                "App id is required".to_string(),
            ));
        }

        if self.return_url.trim().is_empty() {
            return Err(AuthError::InvalidServiceInfo(
                "Return URL is required".to_string(),
            ));
        }

        match self.account_type {
            AccountType::MicrosoftAccount if self.scopes.is_empty() => {
                Err(AuthError::InvalidServiceInfo(
                    "Microsoft account sign-in requires at least one scope".to_string(),
                ))
            }
            AccountType::ActiveDirectory
                if self.needs_discovery()
                    && (self.discovery_service_url.is_none()
                        || self.discovery_service_resource.is_none()) =>
            {
                Err(AuthError::InvalidServiceInfo(
                    "Business accounts need either a base URL and service resource or a discovery endpoint"
                        .to_string(),
                ))
            }
            AccountType::None => Err(AuthError::InvalidServiceInfo(
                "Account type must be set".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_microsoft_account_defaults() {
        let info = ServiceInfo::microsoft_account("app", None, ["onedrive.readwrite"]);

        assert_eq!(info.account_type, AccountType::MicrosoftAccount);
        assert_eq!(info.return_url, MSA_DESKTOP_RETURN_URL);
        assert_eq!(info.authentication_service_url, MSA_AUTHENTICATION_URL);
        assert_eq!(info.token_service_url, MSA_TOKEN_URL);
        assert_eq!(info.sign_out_url.as_deref(), Some(MSA_SIGN_OUT_URL));
        assert!(!info.needs_discovery());
        assert!(info.validate().is_ok());
    }

    #[test]
    fn test_microsoft_account_requires_scopes() {
        let info = ServiceInfo::microsoft_account("app", None, Vec::<String>::new());
        assert!(matches!(
            info.validate(),
            Err(AuthError::InvalidServiceInfo(_))
        ));
    }

    #[test]
    fn test_active_directory_needs_discovery_until_configured() {
        let info = ServiceInfo::active_directory("app", "https://localhost/cb");
        assert!(info.needs_discovery());
        assert!(info.validate().is_ok());

        let configured = info
            .with_base_url("https://contoso-my.sharepoint.com/_api/v2.0/")
            .with_service_resource("https://contoso-my.sharepoint.com/");
        assert!(!configured.needs_discovery());
        assert_eq!(
            configured.base_url.as_deref(),
            Some("https://contoso-my.sharepoint.com/_api/v2.0")
        );
    }

    #[test]
    fn test_active_directory_without_discovery_is_invalid() {
        let mut info = ServiceInfo::active_directory("app", "https://localhost/cb");
        info.discovery_service_url = None;
        assert!(info.validate().is_err());
    }

    #[test]
    fn test_empty_app_id_is_invalid() {
        let info = ServiceInfo::microsoft_account("  ", None, ["onedrive.readonly"]);
        assert!(info.validate().is_err());
    }
}
