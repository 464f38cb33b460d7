//! Query-string helpers for OAuth redirects and request URLs.

use std::collections::HashMap;
use url::{form_urlencoded, Url};

/// Decoded key/value pairs from both the query string and the fragment.
///
/// Token-flow redirects put their parameters in the fragment, code-flow
/// redirects in the query. When a key appears in both, the fragment wins.
///
/// ```
/// use core_auth::query::parse_query_options;
/// use url::Url;
///
/// let url = Url::parse("https://login.live.com/oauth20_desktop.srf?code=M.123&lc=1033").unwrap();
/// let params = parse_query_options(&url);
/// assert_eq!(params.get("code").map(String::as_str), Some("M.123"));
/// ```
pub fn parse_query_options(url: &Url) -> HashMap<String, String> {
    let mut params: HashMap<String, String> = url.query_pairs().into_owned().collect();
    if let Some(fragment) = url.fragment() {
        params.extend(parse_query_string(fragment));
    }
    params
}

/// Decode a raw `a=1&b=2` string. A leading `?` or `#` is ignored.
pub fn parse_query_string(raw: &str) -> HashMap<String, String> {
    let trimmed = raw.trim_start_matches(['?', '#']);
    form_urlencoded::parse(trimmed.as_bytes())
        .into_owned()
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Percent-encode key/value pairs into a query string without a leading `?`.
pub fn build_query<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}
