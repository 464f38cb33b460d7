//! Office 365 discovery service lookup for business accounts.

use crate::error::{AuthError, Result};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

const MY_FILES_CAPABILITY: &str = "MyFiles";
const MY_FILES_API_VERSION: &str = "v2.0";

/// One entry of the discovery response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpoint {
    #[serde(default)]
    pub capability: String,
    #[serde(default)]
    pub service_api_version: String,
    #[serde(default)]
    pub service_endpoint_uri: String,
    #[serde(default)]
    pub service_resource_id: String,
}

#[derive(Debug, Deserialize)]
struct DiscoveryResponse {
    #[serde(default)]
    value: Vec<ServiceEndpoint>,
}

/// Finds the OneDrive for Business endpoint of the signed-in user.
pub struct DiscoveryClient {
    http_client: Arc<dyn HttpClient>,
}

impl DiscoveryClient {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }

    /// First service with the `MyFiles` capability on API `v2.0`.
    ///
    /// `access_token` must be issued for the discovery resource.
    #[instrument(skip(self, access_token))]
    pub async fn discover_my_files(
        &self,
        discovery_url: &str,
        access_token: &str,
    ) -> Result<ServiceEndpoint> {
        let request = HttpRequest::new(HttpMethod::Get, discovery_url)
            .bearer_token(access_token)
            .header("Accept", "application/json");

        let response = self.http_client.execute(request).await?;

        if !response.is_success() {
            warn!(status = response.status, "Discovery request failed");
            return Err(AuthError::InvalidResponse(format!(
                "Discovery service returned {}",
                response.status
            )));
        }

        let parsed: DiscoveryResponse = serde_json::from_slice(&response.body)?;

        let endpoint = parsed
            .value
            .into_iter()
            .find(|service| {
                service.capability.eq_ignore_ascii_case(MY_FILES_CAPABILITY)
                    && service
                        .service_api_version
                        .eq_ignore_ascii_case(MY_FILES_API_VERSION)
            })
            .ok_or(AuthError::MyFilesCapabilityNotFound)?;

        info!(
            endpoint = %endpoint.service_endpoint_uri,
            "Discovered MyFiles service"
        );
        Ok(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::HttpResponse;

    struct StaticClient(HttpResponse);

    #[async_trait::async_trait]
    impl HttpClient for StaticClient {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
            assert_eq!(request.header_value("authorization"), Some("Bearer disco-token"));
            Ok(self.0.clone())
        }

        async fn download_stream(
            &self,
            _url: String,
        ) -> BridgeResult<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
            Err(bridge_traits::BridgeError::NotAvailable("download".to_string()))
        }
    }

    fn client(status: u16, body: &'static str) -> DiscoveryClient {
        DiscoveryClient::new(Arc::new(StaticClient(HttpResponse::new(status, body))))
    }

    #[tokio::test]
    async fn test_finds_my_files_v2() {
        let body = r#"{"value":[
            {"capability":"MyFiles","serviceApiVersion":"v1.0","serviceEndpointUri":"https://contoso-my.sharepoint.com/_api/v1.0/me","serviceResourceId":"https://contoso-my.sharepoint.com/"},
            {"capability":"Contacts","serviceApiVersion":"v2.0","serviceEndpointUri":"https://outlook.office365.com/api/v2.0","serviceResourceId":"https://outlook.office365.com/"},
            {"capability":"MyFiles","serviceApiVersion":"v2.0","serviceEndpointUri":"https://contoso-my.sharepoint.com/_api/v2.0","serviceResourceId":"https://contoso-my.sharepoint.com/"}
        ]}"#;

        let endpoint = client(200, body)
            .discover_my_files("https://api.office.com/discovery/v2.0/me/services", "disco-token")
            .await
            .unwrap();

        assert_eq!(endpoint.service_endpoint_uri, "https://contoso-my.sharepoint.com/_api/v2.0");
        assert_eq!(endpoint.service_resource_id, "https://contoso-my.sharepoint.com/");
    }

    #[tokio::test]
    async fn test_missing_capability() {
        let body = r#"{"value":[{"capability":"Mail","serviceApiVersion":"v2.0"}]}"#;
        let result = client(200, body)
            .discover_my_files("https://discovery", "disco-token")
            .await;
        assert!(matches!(result, Err(AuthError::MyFilesCapabilityNotFound)));
    }

    #[tokio::test]
    async fn test_error_status() {
        let result = client(401, "")
            .discover_my_files("https://discovery", "disco-token")
            .await;
        assert!(matches!(result, Err(AuthError::InvalidResponse(_))));
    }
}
