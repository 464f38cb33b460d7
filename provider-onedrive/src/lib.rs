//! # OneDrive Provider
//!
//! Client for the OneDrive REST API (consumer and business) built on the
//! host bridge traits.
//!
//! ## Overview
//!
//! This crate provides:
//! - Serde models for drives, items, upload sessions and async operations
//! - The service error model with inner-error code matching
//! - URL builders that account for consumer vs Graph action names
//! - [`OneDriveClient`] for browsing, downloading, uploading, copying and
//!   delta queries
//! - [`ChunkedUploadProvider`] for resumable uploads of large files
//!
//! ## Usage
//!
//! ```ignore
//! use provider_onedrive::{ChunkedUploadSessionDescriptor, ConflictBehavior, ItemLocator, OneDriveClient};
//!
//! let client = OneDriveClient::new(&config, &service_info, auth_provider);
//! let file = tokio::fs::File::open("backup.tar").await?;
//! let descriptor = ChunkedUploadSessionDescriptor::new("backup.tar")
//!     .with_conflict_behavior(ConflictBehavior::Replace);
//!
//! let item = client
//!     .upload_large(&ItemLocator::path("/Backups"), &descriptor, file, None)
//!     .await?;
//! ```

pub mod chunked_upload;
pub mod client;
pub mod error;
pub mod monitor;
pub mod request;
pub mod types;

pub use chunked_upload::{
    ChunkUploadResult, ChunkedUploadProvider, ProgressCallback, UploadChunkRequest,
    UploadProgress,
};
pub use client::OneDriveClient;
pub use error::{ErrorCode, ErrorResponse, GraphError, OneDriveError, Result};
pub use monitor::{AsyncMonitor, MonitorState};
pub use request::{ApiFlavor, DriveRequestBuilder, ItemLocator, ItemRequestBuilder, QueryOptions};
pub use types::{
    AsyncOperationStatus, ChunkedUploadSessionDescriptor, ConflictBehavior, Deleted, Drive,
    FileFacet, FolderFacet, Hashes, Identity, IdentitySet, ImageFacet, Item, ItemCollectionPage,
    ItemReference, ItemUpdate, PhotoFacet, Quota, Thumbnail, ThumbnailSet, UploadSession,
};
