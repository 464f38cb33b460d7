//! Error types for the OneDrive provider
//!
//! Service failures carry the `{"error": {...}}` body returned by the API so
//! callers can test for specific codes with [`OneDriveError::is_match`].

use bridge_traits::error::BridgeError;
use bridge_traits::http::HttpResponse;
use core_auth::AuthError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Well-known service error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    AccessDenied,
    ActivityLimitReached,
    GeneralException,
    InvalidRange,
    InvalidRequest,
    ItemNotFound,
    MalwareDetected,
    NameAlreadyExists,
    NotAllowed,
    NotSupported,
    ResourceModified,
    ResyncRequired,
    ServiceNotAvailable,
    QuotaLimitReached,
    Unauthenticated,
    AuthenticationCancelled,
    AuthenticationFailure,
    Timeout,
    MyFilesCapabilityNotFound,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AccessDenied => "accessDenied",
            ErrorCode::ActivityLimitReached => "activityLimitReached",
            ErrorCode::GeneralException => "generalException",
            ErrorCode::InvalidRange => "invalidRange",
            ErrorCode::InvalidRequest => "invalidRequest",
            ErrorCode::ItemNotFound => "itemNotFound",
            ErrorCode::MalwareDetected => "malwareDetected",
            ErrorCode::NameAlreadyExists => "nameAlreadyExists",
            ErrorCode::NotAllowed => "notAllowed",
            ErrorCode::NotSupported => "notSupported",
            ErrorCode::ResourceModified => "resourceModified",
            ErrorCode::ResyncRequired => "resyncRequired",
            ErrorCode::ServiceNotAvailable => "serviceNotAvailable",
            ErrorCode::QuotaLimitReached => "quotaLimitReached",
            ErrorCode::Unauthenticated => "unauthenticated",
            ErrorCode::AuthenticationCancelled => "authenticationCancelled",
            ErrorCode::AuthenticationFailure => "authenticationFailure",
            ErrorCode::Timeout => "timeout",
            ErrorCode::MyFilesCapabilityNotFound => "myFilesCapabilityNotFound",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for ErrorCode {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Error object from a service response. Inner errors refine the code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(
        rename = "innererror",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub inner_error: Option<Box<GraphError>>,
}

impl GraphError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            inner_error: None,
        }
    }

    pub fn with_inner(mut self, inner: GraphError) -> Self {
        self.inner_error = Some(Box::new(inner));
        self
    }

    /// True when this error or any inner error has `code`, ignoring case.
    pub fn is_match(&self, code: impl AsRef<str>) -> bool {
        let code = code.as_ref();
        let mut current = Some(self);
        while let Some(error) = current {
            if error.code.eq_ignore_ascii_case(code) {
                return true;
            }
            current = error.inner_error.as_deref();
        }
        false
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(inner) = &self.inner_error {
            write!(f, " ({})", inner.code)?;
        }
        Ok(())
    }
}

/// Wire envelope `{"error": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: GraphError,
}

/// OneDrive provider errors
#[derive(Error, Debug)]
pub enum OneDriveError {
    /// Non-success response from the service
    #[error("OneDrive service error (status {status}): {error}")]
    Service { status: u16, error: GraphError },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Network error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Malformed or out-of-bounds upload range
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Failed to parse service response: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Chunked upload gave up; `errors` holds every retried failure.
    #[error("Upload failed after {attempts} attempts ({} errors recorded)", .errors.len())]
    UploadFailed {
        attempts: u32,
        errors: Vec<OneDriveError>,
    },

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

/// Result type for OneDrive operations
pub type Result<T> = std::result::Result<T, OneDriveError>;

impl OneDriveError {
    /// Build a `Service` error from a non-success response. Bodies that do
    /// not parse become `generalException` with the status text.
    pub fn from_response(response: &HttpResponse) -> Self {
        let error = serde_json::from_slice::<ErrorResponse>(&response.body)
            .map(|parsed| parsed.error)
            .unwrap_or_else(|_| {
                GraphError::new(
                    ErrorCode::GeneralException.as_str(),
                    status_text(response.status),
                )
            });

        OneDriveError::Service {
            status: response.status,
            error,
        }
    }

    pub fn service_error(&self) -> Option<&GraphError> {
        match self {
            OneDriveError::Service { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Test for a service error code. Auth failures answer to
    /// `authenticationCancelled` / `authenticationFailure`, and a missing
    /// business endpoint to `myFilesCapabilityNotFound`.
    pub fn is_match(&self, code: impl AsRef<str>) -> bool {
        let code = code.as_ref();
        match self {
            OneDriveError::Service { error, .. } => error.is_match(code),
            OneDriveError::Auth(AuthError::AuthenticationCancelled) => {
                code.eq_ignore_ascii_case(ErrorCode::AuthenticationCancelled.as_str())
            }
            OneDriveError::Auth(AuthError::MyFilesCapabilityNotFound) => {
                code.eq_ignore_ascii_case(ErrorCode::MyFilesCapabilityNotFound.as_str())
            }
            OneDriveError::Auth(_) => {
                code.eq_ignore_ascii_case(ErrorCode::AuthenticationFailure.as_str())
            }
            OneDriveError::Bridge(BridgeError::Timeout(_)) => {
                code.eq_ignore_ascii_case(ErrorCode::Timeout.as_str())
            }
            _ => false,
        }
    }

    /// Failures a chunked upload records and retries on the next pass.
    pub fn is_transient_upload_error(&self) -> bool {
        match self {
            OneDriveError::Bridge(_) => true,
            OneDriveError::Service { .. } => {
                self.is_match(ErrorCode::GeneralException)
                    || self.is_match(ErrorCode::Timeout)
                    || self.is_match(ErrorCode::ServiceNotAvailable)
            }
            _ => false,
        }
    }
}

fn status_text(status: u16) -> String {
    let reason = match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        412 => "Precondition Failed",
        413 => "Request Entity Too Large",
        416 => "Requested Range Not Satisfiable",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        507 => "Insufficient Storage",
        _ => return format!("HTTP {}", status),
    };
    reason.to_string()
}
