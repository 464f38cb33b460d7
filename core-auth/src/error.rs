use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Authentication was cancelled")]
    AuthenticationCancelled,

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("No authenticated session")]
    NotAuthenticated,

    #[error("Invalid service info: {0}")]
    InvalidServiceInfo(String),

    #[error("OAuth state mismatch: expected {expected}, got {actual}")]
    StateMismatch { expected: String, actual: String },

    #[error("No service with the MyFiles capability was found for this account")]
    MyFilesCapabilityNotFound,

    #[error("Invalid response from authentication service: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] BridgeError),

    #[error("Credential storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuthError {
    pub fn failed(reason: impl Into<String>) -> Self {
        AuthError::AuthenticationFailed {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
