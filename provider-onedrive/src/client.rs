//! OneDrive API client
//!
//! Item operations against a user's drive. Requests are authorized through
//! an [`AuthenticationProvider`] and sent with the configured retry policy.

use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bytes::Bytes;
use core_auth::{AuthenticationProvider, ServiceInfo};
use core_auth::query::build_query;
use core_runtime::config::{SdkConfig, UploadConfig};
use core_runtime::logging::redact_url;
use core_runtime::events::EventBus;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncSeek};
use tracing::{debug, info, instrument};

use crate::chunked_upload::{ChunkedUploadProvider, ProgressCallback};
use crate::error::{OneDriveError, Result};
use crate::monitor::AsyncMonitor;
use crate::request::{ApiFlavor, DriveRequestBuilder, ItemLocator, ItemRequestBuilder, QueryOptions};
use crate::types::{
    ChunkedUploadSessionDescriptor, ConflictBehavior, Drive, Item, ItemCollectionPage,
    ItemReference, ThumbnailSet, UploadSession, ValueList,
};

/// OneDrive API client.
///
/// Cheap to clone; clones share the HTTP client and authentication provider.
///
/// # Example
///
/// ```ignore
/// use provider_onedrive::{ItemLocator, OneDriveClient, QueryOptions};
///
/// let client = OneDriveClient::new(&config, &service_info, provider);
/// let page = client
///     .list_children(&ItemLocator::Root, &QueryOptions::new().top(100))
///     .await?;
/// for item in page.value {
///     println!("{}", item.name.unwrap_or_default());
/// }
/// ```
#[derive(Clone)]
pub struct OneDriveClient {
    http_client: Arc<dyn HttpClient>,
    auth: Arc<dyn AuthenticationProvider>,
    flavor: ApiFlavor,
    /// Fixed API root; `None` asks the provider after authenticating
    base_url: Option<String>,
    retry_policy: RetryPolicy,
    request_timeout: Duration,
    upload: UploadConfig,
    event_bus: EventBus,
}

impl OneDriveClient {
    pub fn new(
        config: &SdkConfig,
        service_info: &ServiceInfo,
        auth: Arc<dyn AuthenticationProvider>,
    ) -> Self {
        Self {
            http_client: config.http_client.clone(),
            auth,
            flavor: ApiFlavor::for_account(service_info.account_type),
            base_url: service_info.base_url.clone(),
            retry_policy: config.retry_policy.clone(),
            request_timeout: config.request_timeout,
            upload: config.upload.clone(),
            event_bus: config.event_bus.clone(),
        }
    }

    pub fn http_client(&self) -> &Arc<dyn HttpClient> {
        &self.http_client
    }

    pub fn flavor(&self) -> ApiFlavor {
        self.flavor
    }

    /// URL builder rooted at the account's drive.
    ///
    /// Business accounts learn their base URL from discovery, so without a
    /// configured one the provider signs in first.
    pub async fn drive_request(&self) -> Result<DriveRequestBuilder> {
        let base_url = match &self.base_url {
            Some(base_url) => base_url.clone(),
            None => {
                self.auth.authenticate().await?;
                self.auth.base_url().await?
            }
        };
        Ok(DriveRequestBuilder::new(base_url, self.flavor))
    }

    async fn item_request(&self, locator: &ItemLocator) -> Result<ItemRequestBuilder> {
        Ok(self.drive_request().await?.locate(locator))
    }

    /// Authorize and send `request`; non-2xx responses become errors.
    async fn send(&self, mut request: HttpRequest) -> Result<HttpResponse> {
        self.auth.authenticate_request(&mut request).await?;
        if request.timeout.is_none() {
            request = request.timeout(self.request_timeout);
        }
        debug!(method = request.method.as_str(), url = %redact_url(&request.url), "Sending request");

        let response = self
            .http_client
            .execute_with_retry(request, self.retry_policy.clone())
            .await?;
        if !response.is_success() {
            return Err(OneDriveError::from_response(&response));
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T> {
        let response = self.send(request).await?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T> {
        self.send_json(HttpRequest::new(HttpMethod::Get, url)).await
    }

    #[instrument(skip(self))]
    pub async fn get_drive(&self) -> Result<Drive> {
        let url = self.drive_request().await?.url();
        self.get_json(url).await
    }

    #[instrument(skip(self))]
    pub async fn get_root(&self) -> Result<Item> {
        let url = self.drive_request().await?.root().url().to_string();
        self.get_json(url).await
    }

    #[instrument(skip(self))]
    pub async fn get_item(&self, id: &str) -> Result<Item> {
        let url = self.drive_request().await?.item(id).url().to_string();
        self.get_json(url).await
    }

    #[instrument(skip(self))]
    pub async fn get_item_by_path(&self, path: &str) -> Result<Item> {
        let url = self.drive_request().await?.item_by_path(path).url().to_string();
        self.get_json(url).await
    }

    /// One page of `item`'s children.
    #[instrument(skip(self))]
    pub async fn list_children(
        &self,
        item: &ItemLocator,
        options: &QueryOptions,
    ) -> Result<ItemCollectionPage> {
        let url = options.apply(&self.item_request(item).await?.children());
        self.get_json(url).await
    }

    /// Follow an `@odata.nextLink`.
    pub async fn next_page(&self, next_link: &str) -> Result<ItemCollectionPage> {
        self.get_json(next_link.to_string()).await
    }

    /// Every child of `item`, following next links until exhausted.
    #[instrument(skip(self))]
    pub async fn list_all_children(
        &self,
        item: &ItemLocator,
        options: &QueryOptions,
    ) -> Result<Vec<Item>> {
        let mut page = self.list_children(item, options).await?;
        let mut items = std::mem::take(&mut page.value);
        let mut pages = 1;

        while let Some(next_link) = page.next_link.take() {
            page = self.next_page(&next_link).await?;
            items.append(&mut page.value);
            pages += 1;
        }

        info!(pages, items = items.len(), "Listed children");
        Ok(items)
    }

    #[instrument(skip(self))]
    pub async fn create_folder(
        &self,
        parent: &ItemLocator,
        name: &str,
        conflict: ConflictBehavior,
    ) -> Result<Item> {
        let url = self.item_request(parent).await?.children();
        let mut body = json!({ "name": name, "folder": {} });
        body[self.flavor.conflict_behavior_key()] = json!(conflict.as_str());

        let request = HttpRequest::new(HttpMethod::Post, url).json(&body)?;
        self.send_json(request).await
    }

    /// PATCH an item with `patch`, e.g. an [`ItemUpdate`](crate::types::ItemUpdate)
    /// to rename or move it.
    #[instrument(skip(self, patch))]
    pub async fn update_item<T: Serialize + Sync>(&self, id: &str, patch: &T) -> Result<Item> {
        let url = self.drive_request().await?.item(id).url().to_string();
        let request = HttpRequest::new(HttpMethod::Patch, url).json(patch)?;
        self.send_json(request).await
    }

    #[instrument(skip(self))]
    pub async fn delete_item(&self, id: &str) -> Result<()> {
        let url = self.drive_request().await?.item(id).url().to_string();
        self.send(HttpRequest::new(HttpMethod::Delete, url)).await?;
        info!("Item deleted");
        Ok(())
    }

    /// Full content of a file.
    #[instrument(skip(self))]
    pub async fn download(&self, id: &str) -> Result<Bytes> {
        let url = self.drive_request().await?.item(id).content();
        let response = self.send(HttpRequest::new(HttpMethod::Get, url)).await?;
        Ok(response.body)
    }

    /// Stream a file from its pre-authenticated download URL, fetching the
    /// item again when `item` does not carry one.
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    pub async fn download_stream(
        &self,
        item: &Item,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let download_url = match &item.download_url {
            Some(url) => url.clone(),
            None => self.get_item(&item.id).await?.download_url.ok_or_else(|| {
                OneDriveError::InvalidArgument(format!("Item {} has no download URL", item.id))
            })?,
        };
        Ok(self.http_client.download_stream(download_url).await?)
    }

    /// Upload a small file in one request.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when `content` exceeds the simple upload limit;
    /// use [`upload_large`](Self::upload_large) instead.
    #[instrument(skip(self, content), fields(size = content.len()))]
    pub async fn upload_small(
        &self,
        parent: &ItemLocator,
        name: &str,
        content: Bytes,
        conflict: ConflictBehavior,
    ) -> Result<Item> {
        if content.len() as u64 > self.upload.simple_upload_limit {
            return Err(OneDriveError::InvalidArgument(format!(
                "{} bytes exceeds the simple upload limit of {} bytes",
                content.len(),
                self.upload.simple_upload_limit
            )));
        }

        let content_url = self.item_request(parent).await?.child(name).content();
        let query = build_query([(self.flavor.conflict_behavior_key(), conflict.as_str())]);
        let request = HttpRequest::new(HttpMethod::Put, format!("{}?{}", content_url, query))
            .header("Content-Type", "application/octet-stream")
            .body(content);
        self.send_json(request).await
    }

    /// Open an upload session for `descriptor.name` under `parent`.
    #[instrument(skip(self))]
    pub async fn create_upload_session(
        &self,
        parent: &ItemLocator,
        descriptor: &ChunkedUploadSessionDescriptor,
    ) -> Result<UploadSession> {
        let name = descriptor.name.as_deref().ok_or_else(|| {
            OneDriveError::InvalidArgument("Upload session needs an item name".to_string())
        })?;
        let url = self
            .item_request(parent)
            .await?
            .child(name)
            .create_upload_session();

        let request = HttpRequest::new(HttpMethod::Post, url).json(&descriptor.request_body())?;
        let session: UploadSession = self.send_json(request).await?;
        debug!(expires = ?session.expiration_date_time, "Upload session created");
        Ok(session)
    }

    /// Create a session and upload `source` in chunks using the configured
    /// chunk size, tries and backoff.
    #[instrument(skip(self, source, progress))]
    pub async fn upload_large<R>(
        &self,
        parent: &ItemLocator,
        descriptor: &ChunkedUploadSessionDescriptor,
        source: R,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<Item>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send,
    {
        let session = self.create_upload_session(parent, descriptor).await?;
        let mut provider = ChunkedUploadProvider::new(
            session,
            self.http_client.clone(),
            source,
            Some(self.upload.chunk_size),
        )
        .await?
        .with_event_bus(self.event_bus.clone())
        .with_backoff_base(self.upload.backoff_base)
        .with_request_timeout(self.request_timeout);
        if let Some(name) = &descriptor.name {
            provider = provider.with_upload_id(name.clone());
        }

        provider.upload(self.upload.max_tries, progress).await
    }

    /// Start a server-side copy. Poll the returned monitor for the new item.
    #[instrument(skip(self))]
    pub async fn copy_item(
        &self,
        id: &str,
        parent_reference: &ItemReference,
        name: Option<&str>,
    ) -> Result<AsyncMonitor> {
        let url = self.drive_request().await?.item(id).copy();
        let mut body = serde_json::Map::new();
        body.insert(
            "parentReference".to_string(),
            serde_json::to_value(parent_reference)?,
        );
        if let Some(name) = name {
            body.insert("name".to_string(), json!(name));
        }

        let request = HttpRequest::new(HttpMethod::Post, url)
            .header("Prefer", "respond-async")
            .json(&body)?;
        let response = self.send(request).await?;

        let location = response.header("Location").ok_or_else(|| {
            OneDriveError::OperationFailed("Copy response has no Location header".to_string())
        })?;
        info!(monitor = %redact_url(location), "Copy started");
        Ok(AsyncMonitor::new(location, self.clone()))
    }

    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, options: &QueryOptions) -> Result<ItemCollectionPage> {
        let url = options.apply(&self.drive_request().await?.root().search(query));
        self.get_json(url).await
    }

    /// Changes under the root since `token`. `None` starts from scratch.
    #[instrument(skip(self))]
    pub async fn delta(
        &self,
        token: Option<&str>,
        options: &QueryOptions,
    ) -> Result<ItemCollectionPage> {
        let mut options = options.clone();
        if let Some(token) = token {
            options.token = Some(token.to_string());
        }
        let url = options.apply(&self.drive_request().await?.root().delta());
        self.get_json(url).await
    }

    #[instrument(skip(self))]
    pub async fn thumbnails(&self, id: &str) -> Result<Vec<ThumbnailSet>> {
        let url = self.drive_request().await?.item(id).thumbnails();
        let list: ValueList<ThumbnailSet> = self.get_json(url).await?;
        Ok(list.value)
    }
}
