//! Errors returned by the context provider client.

/// A failed request to the context provider.
///
/// Every variant carries the URL that was attempted.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider answered with a non-success status.
    #[error("vault-api error {status} from {url}")]
    Status { status: u16, url: String },

    /// The request did not complete within the configured timeout.
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// Connection-level failure (refused, reset, DNS...).
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The body was not a JSON document.
    #[error("invalid context document from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ProviderError {
    /// Classifies a transport-level reqwest error for `url`.
    pub fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Request {
                url: url.to_string(),
                source,
            }
        }
    }

    /// Network failures, timeouts and non-success statuses qualify for the
    /// loopback fallback; malformed documents do not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Status { .. } | Self::Timeout { .. } | Self::Request { .. }
        )
    }

    /// HTTP status returned by the provider, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// URL of the attempt that produced this error.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Status { url, .. }
            | Self::Timeout { url }
            | Self::Request { url, .. }
            | Self::Decode { url, .. } => Some(url),
            Self::Client(_) => None,
        }
    }
}
