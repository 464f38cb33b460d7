//! Host hook for interactive sign-in.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use url::Url;

/// Shows the sign-in page to the user and captures the redirect.
///
/// Hosts implement this with a browser, an embedded web view or a loopback
/// listener. Implementations navigate to `request_url`, wait until the
/// browser is redirected to a URL starting with `callback_url`, and return
/// the decoded query and fragment parameters of that redirect
/// (see [`parse_query_options`](crate::query::parse_query_options)).
///
/// A user closing the window should surface as
/// [`AuthError::AuthenticationCancelled`](crate::AuthError::AuthenticationCancelled).
#[async_trait]
pub trait WebAuthenticationUi: Send + Sync {
    async fn authenticate(
        &self,
        request_url: &Url,
        callback_url: &Url,
    ) -> Result<HashMap<String, String>>;
}
