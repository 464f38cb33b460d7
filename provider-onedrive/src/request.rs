//! URL builders for drive and item resources.
//!
//! The consumer endpoint and the Graph/business endpoints name their actions
//! differently (`upload.createSession` vs `createUploadSession`), so every
//! builder carries the [`ApiFlavor`] of the account it targets.

use core_auth::query::build_query;
use core_auth::AccountType;

/// Naming scheme of the target API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFlavor {
    /// api.onedrive.com, Microsoft accounts
    Consumer,
    /// Microsoft Graph and OneDrive for Business
    Graph,
}

impl ApiFlavor {
    pub fn for_account(account_type: AccountType) -> Self {
        match account_type {
            AccountType::ActiveDirectory => ApiFlavor::Graph,
            AccountType::MicrosoftAccount | AccountType::None => ApiFlavor::Consumer,
        }
    }

    fn action(&self, consumer: &'static str, graph: &'static str) -> &'static str {
        match self {
            ApiFlavor::Consumer => consumer,
            ApiFlavor::Graph => graph,
        }
    }

    /// Property used to pick a conflict behavior on folder creation.
    pub fn conflict_behavior_key(&self) -> &'static str {
        self.action("@name.conflictBehavior", "@microsoft.graph.conflictBehavior")
    }
}

/// How an item is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemLocator {
    Root,
    Id(String),
    /// Path relative to the drive root, with or without a leading `/`
    Path(String),
}

impl ItemLocator {
    pub fn id(id: impl Into<String>) -> Self {
        ItemLocator::Id(id.into())
    }

    pub fn path(path: impl Into<String>) -> Self {
        ItemLocator::Path(path.into())
    }
}

/// Builds URLs under `{base}/drive`.
#[derive(Debug, Clone)]
pub struct DriveRequestBuilder {
    base_url: String,
    flavor: ApiFlavor,
}

impl DriveRequestBuilder {
    pub fn new(base_url: impl Into<String>, flavor: ApiFlavor) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, flavor }
    }

    pub fn url(&self) -> String {
        format!("{}/drive", self.base_url)
    }

    pub fn root(&self) -> ItemRequestBuilder {
        ItemRequestBuilder {
            url: format!("{}/root", self.url()),
            flavor: self.flavor,
        }
    }

    pub fn item(&self, id: &str) -> ItemRequestBuilder {
        ItemRequestBuilder {
            url: format!("{}/items/{}", self.url(), urlencoding::encode(id)),
            flavor: self.flavor,
        }
    }

    /// `drive/root:/{path}:`. An empty path addresses the root.
    pub fn item_by_path(&self, path: &str) -> ItemRequestBuilder {
        let encoded = encode_path(path);
        if encoded.is_empty() {
            return self.root();
        }
        ItemRequestBuilder {
            url: format!("{}/root:/{}:", self.url(), encoded),
            flavor: self.flavor,
        }
    }

    pub fn locate(&self, locator: &ItemLocator) -> ItemRequestBuilder {
        match locator {
            ItemLocator::Root => self.root(),
            ItemLocator::Id(id) => self.item(id),
            ItemLocator::Path(path) => self.item_by_path(path),
        }
    }
}

/// Builds URLs for one item and its actions.
#[derive(Debug, Clone)]
pub struct ItemRequestBuilder {
    url: String,
    flavor: ApiFlavor,
}

impl ItemRequestBuilder {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn flavor(&self) -> ApiFlavor {
        self.flavor
    }

    pub fn children(&self) -> String {
        format!("{}/children", self.url)
    }

    /// Child addressed by name, e.g. for `PUT .../content` uploads.
    pub fn child(&self, name: &str) -> ItemRequestBuilder {
        let encoded = urlencoding::encode(name);
        let url = match self.url.strip_suffix(':') {
            // already a path address: extend it
            Some(path) => format!("{}/{}:", path, encoded),
            None => format!("{}:/{}:", self.url, encoded),
        };
        ItemRequestBuilder {
            url,
            flavor: self.flavor,
        }
    }

    pub fn content(&self) -> String {
        format!("{}/content", self.url)
    }

    pub fn create_upload_session(&self) -> String {
        let action = self
            .flavor
            .action("upload.createSession", "createUploadSession");
        format!("{}/{}", self.url, action)
    }

    pub fn copy(&self) -> String {
        format!("{}/{}", self.url, self.flavor.action("action.copy", "copy"))
    }

    pub fn search(&self, query: &str) -> String {
        match self.flavor {
            ApiFlavor::Consumer => {
                format!("{}/view.search?{}", self.url, build_query([("q", query)]))
            }
            ApiFlavor::Graph => {
                let escaped = query.replace('\'', "''");
                format!(
                    "{}/search(q='{}')",
                    self.url,
                    urlencoding::encode(&escaped)
                )
            }
        }
    }

    pub fn delta(&self) -> String {
        format!("{}/{}", self.url, self.flavor.action("view.delta", "delta"))
    }

    pub fn thumbnails(&self) -> String {
        format!("{}/thumbnails", self.url)
    }
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// OData query options appended to list and get requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub expand: Option<String>,
    pub select: Option<String>,
    pub top: Option<u32>,
    pub order_by: Option<String>,
    pub skip_token: Option<String>,
    /// Delta token
    pub token: Option<String>,
    pub filter: Option<String>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expand(mut self, expand: impl Into<String>) -> Self {
        self.expand = Some(expand.into());
        self
    }

    pub fn select(mut self, select: impl Into<String>) -> Self {
        self.select = Some(select.into());
        self
    }

    pub fn top(mut self, top: u32) -> Self {
        self.top = Some(top);
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn skip_token(mut self, token: impl Into<String>) -> Self {
        self.skip_token = Some(token.into());
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Encoded query string without the leading `?`.
    pub fn to_query_string(&self) -> String {
        let top = self.top.map(|top| top.to_string());
        let pairs = [
            ("$expand", self.expand.as_deref()),
            ("$select", self.select.as_deref()),
            ("$top", top.as_deref()),
            ("$orderby", self.order_by.as_deref()),
            ("$skiptoken", self.skip_token.as_deref()),
            ("token", self.token.as_deref()),
            ("$filter", self.filter.as_deref()),
        ];
        build_query(
            pairs
                .iter()
                .filter_map(|(key, value)| value.map(|value| (*key, value))),
        )
    }

    /// Append the options to `url`, which may already carry a query.
    pub fn apply(&self, url: &str) -> String {
        if self.is_empty() {
            return url.to_string();
        }
        let separator = if url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", url, separator, self.to_query_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://api.onedrive.com/v1.0";

    #[test]
    fn test_consumer_item_urls() {
        let drive = DriveRequestBuilder::new(format!("{}/", BASE), ApiFlavor::Consumer);

        assert_eq!(drive.url(), "https://api.onedrive.com/v1.0/drive");
        assert_eq!(drive.root().url(), "https://api.onedrive.com/v1.0/drive/root");

        let item = drive.item("ABC!123");
        assert_eq!(
            item.children(),
            "https://api.onedrive.com/v1.0/drive/items/ABC%21123/children"
        );
        assert_eq!(
            item.create_upload_session(),
            "https://api.onedrive.com/v1.0/drive/items/ABC%21123/upload.createSession"
        );
        assert_eq!(
            item.copy(),
            "https://api.onedrive.com/v1.0/drive/items/ABC%21123/action.copy"
        );
        assert_eq!(
            drive.root().delta(),
            "https://api.onedrive.com/v1.0/drive/root/view.delta"
        );
        assert_eq!(
            drive.root().search("cat pics"),
            "https://api.onedrive.com/v1.0/drive/root/view.search?q=cat+pics"
        );
    }

    #[test]
    fn test_graph_action_names() {
        let drive = DriveRequestBuilder::new("https://graph.microsoft.com/v1.0/me", ApiFlavor::Graph);
        let root = drive.root();

        assert!(root.create_upload_session().ends_with("/root/createUploadSession"));
        assert!(root.copy().ends_with("/root/copy"));
        assert!(root.delta().ends_with("/root/delta"));
        assert!(root.search("o'neil").ends_with("/root/search(q='o%27%27neil')"));
        assert_eq!(ApiFlavor::Graph.conflict_behavior_key(), "@microsoft.graph.conflictBehavior");
        assert_eq!(ApiFlavor::Consumer.conflict_behavior_key(), "@name.conflictBehavior");
    }

    #[test]
    fn test_path_segments_are_encoded_separately() {
        let drive = DriveRequestBuilder::new(BASE, ApiFlavor::Consumer);
        let item = drive.item_by_path("/Documents/Q1 report#2.docx");

        assert_eq!(
            item.url(),
            "https://api.onedrive.com/v1.0/drive/root:/Documents/Q1%20report%232.docx:"
        );
        assert_eq!(
            item.content(),
            "https://api.onedrive.com/v1.0/drive/root:/Documents/Q1%20report%232.docx:/content"
        );
        assert_eq!(drive.item_by_path("/").url(), drive.root().url());
    }

    #[test]
    fn test_child_of_id_and_path() {
        let drive = DriveRequestBuilder::new(BASE, ApiFlavor::Consumer);

        assert_eq!(
            drive.item("42").child("a b.txt").content(),
            "https://api.onedrive.com/v1.0/drive/items/42:/a%20b.txt:/content"
        );
        assert_eq!(
            drive.item_by_path("Docs").child("a.txt").url(),
            "https://api.onedrive.com/v1.0/drive/root:/Docs/a.txt:"
        );
        assert_eq!(
            drive.locate(&ItemLocator::Root).child("a.txt").url(),
            "https://api.onedrive.com/v1.0/drive/root:/a.txt:"
        );
    }

    #[test]
    fn test_query_options() {
        let options = QueryOptions::new()
            .expand("thumbnails")
            .select("id,name")
            .top(50)
            .order_by("name desc");

        assert_eq!(
            options.to_query_string(),
            "%24expand=thumbnails&%24select=id%2Cname&%24top=50&%24orderby=name+desc"
        );
        assert_eq!(
            QueryOptions::new().token("abc").apply("https://x/view.search?q=a"),
            "https://x/view.search?q=a&token=abc"
        );
        assert_eq!(QueryOptions::new().apply("https://x/children"), "https://x/children");
    }
}
