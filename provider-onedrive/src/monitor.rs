//! Polling for long-running server-side operations.
//!
//! Copy requests return `202 Accepted` with a `Location` header pointing at a
//! monitor resource. The monitor URL is pre-authenticated.

use bridge_traits::http::{HttpMethod, HttpRequest};
use core_runtime::logging::redact_url;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::client::OneDriveClient;
use crate::error::{OneDriveError, Result};
use crate::types::{AsyncOperationStatus, Item};

/// Callback receiving each status poll.
pub type StatusCallback<'a> = &'a (dyn Fn(&AsyncOperationStatus) + Send + Sync);

/// Handle on a pending copy.
#[derive(Clone)]
pub struct AsyncMonitor {
    url: String,
    client: OneDriveClient,
}

/// One observation of the monitor resource.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorState {
    Pending(AsyncOperationStatus),
    /// The monitor answered with the finished item itself.
    Item(Item),
}

impl AsyncMonitor {
    pub(crate) fn new(url: impl Into<String>, client: OneDriveClient) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// GET the monitor once, without credentials.
    pub async fn poll(&self) -> Result<MonitorState> {
        let request = HttpRequest::new(HttpMethod::Get, self.url.clone());
        let response = self.client.http_client().execute(request).await?;
        if !response.is_success() {
            return Err(OneDriveError::from_response(&response));
        }

        let value: serde_json::Value = serde_json::from_slice(&response.body)?;
        if value.get("status").is_none() && value.get("id").is_some() {
            return Ok(MonitorState::Item(serde_json::from_value(value)?));
        }
        Ok(MonitorState::Pending(serde_json::from_value(value)?))
    }

    /// Poll every `interval` until the operation completes, then return the
    /// resulting item.
    ///
    /// # Errors
    ///
    /// `OperationFailed` when the service reports `failed`, or reports
    /// completion without a resource id.
    #[instrument(skip(self, progress), fields(url = %redact_url(&self.url)))]
    pub async fn poll_for_item(
        &self,
        interval: Duration,
        progress: Option<StatusCallback<'_>>,
    ) -> Result<Item> {
        loop {
            let status = match self.poll().await? {
                MonitorState::Item(item) => return Ok(item),
                MonitorState::Pending(status) => status,
            };

            debug!(
                status = %status.status,
                percentage = ?status.percentage_complete,
                "Async operation status"
            );
            if let Some(callback) = progress {
                callback(&status);
            }

            if status.is_completed() {
                let id = status.resource_id.ok_or_else(|| {
                    OneDriveError::OperationFailed(
                        "Operation completed without a resource id".to_string(),
                    )
                })?;
                info!(item_id = %id, "Async operation completed");
                return self.client.get_item(&id).await;
            }
            if status.is_failed() {
                return Err(OneDriveError::OperationFailed(format!(
                    "{} reported status {}",
                    status.operation.as_deref().unwrap_or("Operation"),
                    status.status
                )));
            }

            tokio::time::sleep(interval).await;
        }
    }
}
