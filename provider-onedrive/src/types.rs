//! OneDrive API resource types
//!
//! Serde models for drives, items and upload sessions. Field names follow
//! the service's camelCase JSON; unknown fields are ignored so newer
//! service versions keep deserializing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's drive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drive {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<IdentitySet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<Quota>,
}

/// Storage quota in bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quota {
    #[serde(default)]
    pub total: Option<i64>,
    #[serde(default)]
    pub used: Option<i64>,
    #[serde(default)]
    pub remaining: Option<i64>,
    #[serde(default)]
    pub deleted: Option<i64>,
    /// normal, nearing, critical or exceeded
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Identity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<Identity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<Identity>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// A file or folder.
///
/// See: https://learn.microsoft.com/onedrive/developer/rest-api/resources/driveitem
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default, rename = "eTag", skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
    #[serde(default, rename = "cTag", skip_serializing_if = "Option::is_none")]
    pub c_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_date_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_reference: Option<ItemReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileFacet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<FolderFacet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageFacet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<PhotoFacet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<Deleted>,
    /// Short-lived pre-authenticated URL for the content
    #[serde(
        default,
        rename = "@content.downloadUrl",
        alias = "@microsoft.graph.downloadUrl",
        skip_serializing_if = "Option::is_none"
    )]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Item>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnails: Option<Vec<ThumbnailSet>>,
}

impl Item {
    pub fn is_folder(&self) -> bool {
        self.folder.is_some()
    }

    pub fn is_file(&self) -> bool {
        self.file.is_some()
    }
}

/// Points at an item by drive and id or path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ItemReference {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn by_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFacet {
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub hashes: Option<Hashes>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hashes {
    #[serde(default)]
    pub crc32_hash: Option<String>,
    #[serde(default)]
    pub sha1_hash: Option<String>,
    #[serde(default)]
    pub quick_xor_hash: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderFacet {
    #[serde(default)]
    pub child_count: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFacet {
    #[serde(default)]
    pub width: Option<i32>,
    #[serde(default)]
    pub height: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoFacet {
    #[serde(default)]
    pub camera_make: Option<String>,
    #[serde(default)]
    pub camera_model: Option<String>,
    #[serde(default)]
    pub taken_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exposure_numerator: Option<f64>,
    #[serde(default)]
    pub exposure_denominator: Option<f64>,
    #[serde(default)]
    pub f_number: Option<f64>,
    #[serde(default)]
    pub focal_length: Option<f64>,
    #[serde(default)]
    pub iso: Option<i32>,
}

/// Present on items returned by delta that were removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deleted {
    #[serde(default)]
    pub state: Option<String>,
}

/// One page of a children, search or delta listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemCollectionPage {
    #[serde(default)]
    pub value: Vec<Item>,
    #[serde(
        default,
        rename = "@odata.nextLink",
        skip_serializing_if = "Option::is_none"
    )]
    pub next_link: Option<String>,
    #[serde(
        default,
        rename = "@odata.deltaLink",
        skip_serializing_if = "Option::is_none"
    )]
    pub delta_link: Option<String>,
}

/// Thumbnail renditions of one item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailSet {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small: Option<Thumbnail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<Thumbnail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large: Option<Thumbnail>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub width: Option<i32>,
    #[serde(default)]
    pub height: Option<i32>,
}

/// `{"value": [...]}` wrapper for non-item collections.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ValueList<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}

/// Resumable upload state reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    /// Empty on status responses that omit it
    #[serde(default)]
    pub upload_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date_time: Option<DateTime<Utc>>,
    /// Byte ranges still missing, as `"start-end"` or `"start-"`
    #[serde(default)]
    pub next_expected_ranges: Vec<String>,
}

/// What to do when the target name already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictBehavior {
    #[default]
    Fail,
    Replace,
    Rename,
}

impl ConflictBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictBehavior::Fail => "fail",
            ConflictBehavior::Replace => "replace",
            ConflictBehavior::Rename => "rename",
        }
    }
}

/// Item properties sent when creating an upload session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkedUploadSessionDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        rename = "@microsoft.graph.conflictBehavior",
        skip_serializing_if = "Option::is_none"
    )]
    pub conflict_behavior: Option<ConflictBehavior>,
}

impl ChunkedUploadSessionDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            conflict_behavior: None,
        }
    }

    pub fn with_conflict_behavior(mut self, behavior: ConflictBehavior) -> Self {
        self.conflict_behavior = Some(behavior);
        self
    }

    /// Body for the create-session request: `{"item": {...}}`.
    pub fn request_body(&self) -> UploadSessionRequest<'_> {
        UploadSessionRequest { item: self }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadSessionRequest<'a> {
    pub item: &'a ChunkedUploadSessionDescriptor,
}

/// Progress of a long-running server-side operation such as copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncOperationStatus {
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub percentage_complete: Option<f64>,
    /// notStarted, inProgress, completed, updating, failed, deletePending,
    /// deleteFailed or waiting
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub resource_id: Option<String>,
}

impl AsyncOperationStatus {
    pub fn is_completed(&self) -> bool {
        self.status.eq_ignore_ascii_case("completed")
    }

    pub fn is_failed(&self) -> bool {
        self.status.eq_ignore_ascii_case("failed") || self.status.eq_ignore_ascii_case("deleteFailed")
    }
}

/// Fields to change with `update_item`. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_reference: Option<ItemReference>,
}

impl ItemUpdate {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            parent_reference: None,
        }
    }

    pub fn move_to(parent: ItemReference) -> Self {
        Self {
            name: None,
            parent_reference: Some(parent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_deserialization() {
        let json = r#"{
            "id": "0123456789abc!104",
            "name": "photo.jpg",
            "size": 35212,
            "eTag": "aRjRE",
            "cTag": "aYzpE",
            "createdDateTime": "2015-04-02T17:01:31.617Z",
            "lastModifiedDateTime": "2015-04-02T17:01:33.083Z",
            "parentReference": {"driveId": "0123456789abc", "id": "0123456789abc!103", "path": "/drive/root:/Pictures"},
            "file": {"mimeType": "image/jpeg", "hashes": {"sha1Hash": "ABC", "crc32Hash": "01"}},
            "image": {"width": 800, "height": 600},
            "photo": {"takenDateTime": "2015-03-28T09:00:00Z", "cameraMake": "Contoso"},
            "@content.downloadUrl": "https://public.bn1303.livefilestore.com/y2m",
            "someFutureFacet": {"x": 1}
        }"#;

        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.name.as_deref(), Some("photo.jpg"));
        assert_eq!(item.size, Some(35212));
        assert_eq!(item.e_tag.as_deref(), Some("aRjRE"));
        assert!(item.is_file());
        assert!(!item.is_folder());
        assert_eq!(
            item.file.unwrap().hashes.unwrap().sha1_hash.as_deref(),
            Some("ABC")
        );
        assert_eq!(item.image.unwrap().width, Some(800));
        assert_eq!(
            item.parent_reference.unwrap().path.as_deref(),
            Some("/drive/root:/Pictures")
        );
        assert_eq!(
            item.download_url.as_deref(),
            Some("https://public.bn1303.livefilestore.com/y2m")
        );
    }

    #[test]
    fn test_graph_download_url_alias() {
        let json = r#"{"id":"1","@microsoft.graph.downloadUrl":"https://download"}"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.download_url.as_deref(), Some("https://download"));
    }

    #[test]
    fn test_collection_page_links() {
        let json = r#"{
            "value": [{"id": "a", "folder": {"childCount": 2}}, {"id": "b"}],
            "@odata.nextLink": "https://api.onedrive.com/v1.0/drive/root/children?$skiptoken=xyz"
        }"#;
        let page: ItemCollectionPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.value.len(), 2);
        assert!(page.value[0].is_folder());
        assert!(page.next_link.unwrap().contains("skiptoken"));
        assert!(page.delta_link.is_none());
    }

    #[test]
    fn test_upload_session_deserialization() {
        let json = r#"{
            "uploadUrl": "https://sn3302.up.1drv.com/up/fe6987415ace7X4e1eF866337",
            "expirationDateTime": "2015-01-29T09:21:55.523Z",
            "nextExpectedRanges": ["0-"]
        }"#;
        let session: UploadSession = serde_json::from_str(json).unwrap();
        assert_eq!(session.next_expected_ranges, vec!["0-".to_string()]);
        assert!(session.expiration_date_time.is_some());

        let status: UploadSession =
            serde_json::from_str(r#"{"nextExpectedRanges":["12345-55232"]}"#).unwrap();
        assert!(status.upload_url.is_empty());
    }

    #[test]
    fn test_upload_session_request_body() {
        let descriptor = ChunkedUploadSessionDescriptor::new("big.bin")
            .with_conflict_behavior(ConflictBehavior::Rename);
        let json = serde_json::to_value(descriptor.request_body()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "item": {
                    "name": "big.bin",
                    "@microsoft.graph.conflictBehavior": "rename"
                }
            })
        );
    }

    #[test]
    fn test_async_operation_status() {
        let status: AsyncOperationStatus = serde_json::from_str(
            r#"{"operation":"ItemCopy","percentageComplete":42.5,"status":"inProgress"}"#,
        )
        .unwrap();
        assert_eq!(status.percentage_complete, Some(42.5));
        assert!(!status.is_completed());
        assert!(!status.is_failed());
    }

    #[test]
    fn test_item_update_skips_unset_fields() {
        let json = serde_json::to_value(ItemUpdate::rename("new.txt")).unwrap();
        assert_eq!(json, serde_json::json!({"name": "new.txt"}));

        let json = serde_json::to_value(ItemUpdate::move_to(ItemReference::by_id("folder"))).unwrap();
        assert_eq!(json, serde_json::json!({"parentReference": {"id": "folder"}}));
    }
}
