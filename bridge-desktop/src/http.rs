//! `HttpClient` over reqwest with rustls.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse},
};
use futures_util::TryStreamExt;
use reqwest::header::HeaderMap;
use reqwest::Client;
use std::collections::HashMap;
use std::io;
use std::time::Duration;
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("onedrive-sdk-rust/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECTIVITY_CHECK_URL: &str = "https://api.onedrive.com/v1.0/";

/// Desktop HTTP bridge.
///
/// The client-level timeout only bounds API calls that do not set their own
/// `HttpRequest::timeout`. Download streams run without a total deadline so
/// large files are not cut off; only the connect timeout applies to them.
pub struct ReqwestHttpClient {
    client: Client,
    request_timeout: Duration,
}

impl ReqwestHttpClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| BridgeError::NotAvailable(format!("reqwest client: {e}")))?;

        Ok(Self {
            client,
            request_timeout,
        })
    }

    /// Wrap a preconfigured client (proxy, custom roots).
    pub fn with_client(client: Client, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
        }
    }

    fn to_reqwest(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let builder = request.headers.into_iter().fold(
            self.client
                .request(method, &request.url)
                .timeout(request.timeout.unwrap_or(self.request_timeout)),
            |builder, (name, value)| builder.header(name, value),
        );

        match request.body {
            Some(body) => builder.body(body),
            None => builder,
        }
    }
}

/// Timeouts and broken connections are worth retrying; anything else
/// (bad URL, redirect loop, decode failure) is not.
fn transport_error(error: reqwest::Error) -> BridgeError {
    if error.is_timeout() {
        BridgeError::Timeout(error.to_string())
    } else if error.is_connect() || error.is_request() || error.is_body() {
        BridgeError::Io(io::Error::new(io::ErrorKind::ConnectionAborted, error.to_string()))
    } else {
        BridgeError::OperationFailed(error.to_string())
    }
}

/// Flatten repeated headers into one comma-separated value.
fn collect_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut collected: HashMap<String, String> = HashMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        collected
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    collected
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = request.method;
        let response = self
            .to_reqwest(request)
            .send()
            .await
            .map_err(|e| {
                warn!(%method, error = %e, "Transport failure");
                transport_error(e)
            })?;

        let status = response.status().as_u16();
        debug!(%method, status, "Response received");

        let headers = collect_headers(response.headers());
        let body = response.bytes().await.map_err(transport_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn download_stream(&self, url: String) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
        let response = self.client.get(&url).send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::OperationFailed(format!(
                "Download returned {status}"
            )));
        }

        let body = response.bytes_stream().map_err(io::Error::other);
        Ok(Box::new(StreamReader::new(body)))
    }

    async fn is_connected(&self) -> bool {
        self.client
            .get(CONNECTIVITY_CHECK_URL)
            .timeout(CONNECT_TIMEOUT)
            .send()
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn client() -> ReqwestHttpClient {
        ReqwestHttpClient::with_timeout(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn chunk_put_keeps_headers_and_body() {
        let request = HttpRequest::new(HttpMethod::Put, "https://upload.example.com/session")
            .header("Content-Range", "bytes 0-9/10")
            .body(bytes::Bytes::from_static(b"0123456789"));

        let built = client().to_reqwest(request).build().unwrap();
        assert_eq!(built.method(), reqwest::Method::PUT);
        assert_eq!(built.headers()["content-range"], "bytes 0-9/10");
        assert_eq!(built.body().and_then(|b| b.as_bytes()), Some(&b"0123456789"[..]));
    }

    #[test]
    fn request_timeout_falls_back_to_client_default() {
        let defaulted = client()
            .to_reqwest(HttpRequest::new(HttpMethod::Get, "https://api.onedrive.com/v1.0/drive"))
            .build()
            .unwrap();
        assert_eq!(defaulted.timeout(), Some(&Duration::from_secs(5)));

        let explicit = client()
            .to_reqwest(
                HttpRequest::new(HttpMethod::Delete, "https://api.onedrive.com/v1.0/drive/items/1")
                    .timeout(Duration::from_secs(90)),
            )
            .build()
            .unwrap();
        assert_eq!(explicit.method(), reqwest::Method::DELETE);
        assert_eq!(explicit.timeout(), Some(&Duration::from_secs(90)));
    }

    #[test]
    fn repeated_headers_are_joined() {
        let mut headers = HeaderMap::new();
        headers.append("www-authenticate", HeaderValue::from_static("Bearer realm=\"a\""));
        headers.append("www-authenticate", HeaderValue::from_static("Bearer realm=\"b\""));
        headers.insert("location", HeaderValue::from_static("https://monitor"));

        let collected = collect_headers(&headers);
        assert_eq!(
            collected["www-authenticate"],
            "Bearer realm=\"a\", Bearer realm=\"b\""
        );
        assert_eq!(collected["location"], "https://monitor");
    }
}
