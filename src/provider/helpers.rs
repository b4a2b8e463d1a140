//! URL helpers for the context provider client.

use url::Url;

/// Path of the context document on the provider.
pub const CONTEXT_PATH: &str = "/v0/context";

/// Host the provider URL must name for the loopback fallback to apply.
const LOCALHOST: &str = "localhost";
/// Numeric loopback address used by the fallback attempt.
const LOOPBACK_V4: &str = "127.0.0.1";

/// Trims whitespace and strips every trailing `/` from a base URL.
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Builds the context document URL for a normalized base URL.
pub fn context_url(base_url: &str) -> String {
    format!("{}{}", normalize_base_url(base_url), CONTEXT_PATH)
}

/// Rewrites `url` to target `127.0.0.1` when its host is exactly `localhost`.
///
/// Returns `None` for any other host or an unparseable URL, in which case no
/// fallback attempt is made.
pub fn loopback_fallback(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    if parsed.host_str() != Some(LOCALHOST) {
        return None;
    }
    parsed.set_host(Some(LOOPBACK_V4)).ok()?;
    Some(parsed.to_string())
}
