//! Common utilities and helper functions
//!
//! Target-string helpers shared by the sweeper, the prober and the catalog.

use url::Url;

/// Scheme prefixed onto bare hosts that could not be reached at all
pub const DEFAULT_SCHEME: &str = "http";

/// Check whether a target is a fully-qualified http(s) URL with a host
pub fn is_url(target: &str) -> bool {
    match Url::parse(target) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

/// Prefix the default scheme onto a target unless it already is a URL
pub fn with_default_scheme(target: &str) -> String {
    with_scheme(target, DEFAULT_SCHEME)
}

/// Build the URL for `target` with `scheme`, leaving URLs untouched
pub fn with_scheme(target: &str, scheme: &str) -> String {
    if is_url(target) {
        target.to_string()
    } else {
        format!("{scheme}://{target}")
    }
}

/// Join a request path onto a target URL
pub fn join_path(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.is_empty() {
        return base.to_string();
    }
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Normalize one line of a target list
///
/// Returns `None` for blank lines and `#` comments.
pub fn clean_target_line(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        None
    } else {
        Some(line.trim_end_matches('/'))
    }
}

/// A target string that can never be probed or scanned
pub fn is_malformed_target(target: &str) -> bool {
    target.is_empty() || target.chars().any(char::is_whitespace)
}
