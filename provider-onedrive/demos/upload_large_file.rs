//! Upload a local file to the signed-in user's OneDrive.
//!
//! ```text
//! ONEDRIVE_APP_ID=000000004C12AB34 cargo run -p provider-onedrive --example upload_large_file -- ./video.mp4 /Videos
//! ```
//!
//! Sign-in happens in the browser: open the printed URL, then paste the
//! address of the page you were redirected to.

use anyhow::{bail, Context};
use async_trait::async_trait;
use bridge_desktop::{KeyringSecureStore, ReqwestHttpClient};
use core_auth::query::parse_query_options;
use core_auth::{AuthError, OAuthAuthenticationProvider, ServiceInfo, WebAuthenticationUi};
use core_runtime::config::SdkConfig;
use core_runtime::logging::{init_logging, LoggingConfig};
use provider_onedrive::{
    ChunkedUploadSessionDescriptor, ConflictBehavior, ItemLocator, OneDriveClient, UploadProgress,
};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use url::Url;

/// Prints the sign-in URL and reads the redirect URL back from stdin.
struct ConsoleUi;

#[async_trait]
impl WebAuthenticationUi for ConsoleUi {
    async fn authenticate(
        &self,
        request_url: &Url,
        callback_url: &Url,
    ) -> core_auth::Result<HashMap<String, String>> {
        println!("Open this URL to sign in:\n\n  {}\n", request_url);
        print!("Paste the {} address you land on: ", callback_url.host_str().unwrap_or("redirect"));
        std::io::stdout().flush().ok();

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(|e| AuthError::failed(e.to_string()))?;
        if line.trim().is_empty() {
            return Err(AuthError::AuthenticationCancelled);
        }

        let redirect = Url::parse(line.trim()).map_err(|e| AuthError::failed(e.to_string()))?;
        Ok(parse_query_options(&redirect))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default().with_filter("provider_onedrive=info,core_auth=info"))?;

    let mut args = std::env::args().skip(1);
    let (Some(path), folder) = (args.next(), args.next()) else {
        bail!("usage: upload_large_file <file> [remote folder]");
    };
    let app_id = std::env::var("ONEDRIVE_APP_ID").context("ONEDRIVE_APP_ID is not set")?;

    let config = SdkConfig::builder()
        .http_client(Arc::new(ReqwestHttpClient::new()?))
        .secure_store(Arc::new(KeyringSecureStore::new()))
        .build()?;
    let info = ServiceInfo::microsoft_account(app_id, None, ["onedrive.readwrite", "wl.offline_access"]);
    let auth = OAuthAuthenticationProvider::new(info.clone(), &config)?.with_web_ui(Arc::new(ConsoleUi));
    let client = OneDriveClient::new(&config, &info, Arc::new(auth));

    let name = std::path::Path::new(&path)
        .file_name()
        .and_then(|n| n.to_str())
        .context("file has no name")?
        .to_string();
    let file = tokio::fs::File::open(&path)
        .await
        .with_context(|| format!("cannot open {}", path))?;
    let parent = folder.map(ItemLocator::path).unwrap_or(ItemLocator::Root);
    let descriptor =
        ChunkedUploadSessionDescriptor::new(name).with_conflict_behavior(ConflictBehavior::Rename);

    let report = |p: UploadProgress| {
        println!(
            "{:>5.1}%  {}/{} bytes",
            p.bytes_uploaded as f64 * 100.0 / p.total_bytes as f64,
            p.bytes_uploaded,
            p.total_bytes
        );
    };
    let item = client
        .upload_large(&parent, &descriptor, file, Some(&report))
        .await?;

    println!(
        "Uploaded {} ({} bytes): {}",
        item.name.unwrap_or_default(),
        item.size.unwrap_or_default(),
        item.web_url.unwrap_or_default()
    );
    Ok(())
}
