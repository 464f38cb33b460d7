//! HTTP bridge.
//!
//! The SDK never talks to the network itself. Every Graph/OneDrive call, token
//! exchange and chunk PUT goes through a host-supplied [`HttpClient`]. Bearer
//! tokens are attached by the authentication provider before the request
//! reaches the bridge; pre-authenticated URLs (upload sessions, download
//! links, copy monitors) are sent bare.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outgoing request. Header names keep the case they were set with; lookups
/// through [`HttpRequest::header_value`] ignore case.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    /// Per-request deadline. `None` leaves it to the bridge.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn bearer_token(self, token: impl Into<String>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.into()))
    }

    /// Serialize `body` as the JSON payload.
    pub fn json<T: Serialize>(self, body: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| BridgeError::OperationFailed(format!("Cannot encode JSON body: {e}")))?;
        Ok(self.typed_body("application/json", bytes))
    }

    /// Serialize `body` as `application/x-www-form-urlencoded`, the encoding
    /// the OAuth token endpoints expect.
    pub fn form<T: Serialize>(self, body: &T) -> Result<Self> {
        let encoded = serde_urlencoded::to_string(body)
            .map_err(|e| BridgeError::OperationFailed(format!("Cannot encode form body: {e}")))?;
        Ok(self.typed_body("application/x-www-form-urlencoded", encoded))
    }

    /// Raw payload. The caller sets `Content-Type`.
    pub fn body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    fn typed_body(self, content_type: &str, body: impl Into<Bytes>) -> Self {
        self.header("Content-Type", content_type).body(body.into())
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| BridgeError::OperationFailed(format!("Cannot decode JSON body: {e}")))
    }

    pub fn text(&self) -> Result<String> {
        std::str::from_utf8(&self.body)
            .map(str::to_owned)
            .map_err(|e| BridgeError::OperationFailed(format!("Body is not UTF-8: {e}")))
    }

    /// Case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Throttling (429) and server-side failures (5xx).
    pub fn is_retryable(&self) -> bool {
        self.status == 429 || (500..600).contains(&self.status)
    }

    /// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
    pub fn retry_after(&self) -> Option<Duration> {
        self.header("Retry-After")?
            .trim()
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    }
}

fn find_header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find_map(|(key, value)| key.eq_ignore_ascii_case(name).then_some(value.as_str()))
}

/// How [`HttpClient::execute_with_retry`] spaces out attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound on any single wait, `Retry-After` included.
    pub max_delay: Duration,
    /// Double the delay after every failed attempt.
    pub use_exponential_backoff: bool,
}

impl RetryPolicy {
    /// A single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Wait after the zero-based `attempt` failed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if !self.use_exponential_backoff {
            return self.base_delay.min(self.max_delay);
        }
        let factor = 1u32 << attempt.min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            use_exponential_backoff: true,
        }
    }
}

/// Host HTTP stack.
///
/// `execute` reports any response the server produced, error statuses
/// included, as `Ok` so callers can read the OneDrive error body. `Err`
/// means no usable response arrived: DNS, TLS, connection reset, timeout.
///
/// ```ignore
/// let request = HttpRequest::new(HttpMethod::Get, "https://api.onedrive.com/v1.0/drive")
///     .bearer_token(token);
/// let drive: Drive = client.execute(request).await?.json()?;
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Re-send `request` while it hits throttling, 5xx or transient
    /// transport errors, up to `policy.max_attempts`. A `Retry-After` header
    /// overrides the computed delay. Once attempts run out the last outcome
    /// is returned as is.
    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let attempts = policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let final_attempt = attempt + 1 >= attempts;
            let delay = match self.execute(request.clone()).await {
                Ok(response) if response.is_retryable() && !final_attempt => response
                    .retry_after()
                    .map(|wait| wait.min(policy.max_delay))
                    .unwrap_or_else(|| policy.delay_for_attempt(attempt)),
                Err(err) if err.is_transient() && !final_attempt => {
                    policy.delay_for_attempt(attempt)
                }
                outcome => return outcome,
            };
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Stream the body at a pre-authenticated download URL. No credentials
    /// are attached.
    async fn download_stream(
        &self,
        url: String,
    ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;

    async fn is_connected(&self) -> bool {
        true
    }
}
