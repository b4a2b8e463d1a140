//! HTTP client for the vault-api context document.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use super::error::ProviderError;
use super::helpers::{context_url, loopback_fallback, normalize_base_url};

/// A fetched context document.
#[derive(Clone, Debug)]
pub struct ContextDocument {
    /// Response body exactly as the provider sent it
    pub raw: String,
    /// Parsed form of `raw`
    pub value: Value,
}

/// Client for `GET <base>/v0/context`.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone, Debug)]
pub struct ContextClient {
    base_url: String,
    client: Client,
}

impl ContextClient {
    /// Creates a client whose every request is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProviderError::Client)?;

        Ok(Self {
            base_url: normalize_base_url(base_url),
            client,
        })
    }

    /// The normalized base URL this client targets.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches the context document.
    ///
    /// A failed attempt against `localhost` is retried exactly once against
    /// `127.0.0.1`; the fallback's error is returned if it fails too.
    pub async fn fetch_context(&self) -> Result<ContextDocument, ProviderError> {
        let url = context_url(&self.base_url);

        match self.fetch(&url).await {
            Ok(document) => Ok(document),
            Err(err) if err.is_retryable() => match loopback_fallback(&url) {
                Some(fallback) => {
                    warn!(error = %err, %fallback, "vault-api unreachable via localhost, retrying on loopback");
                    self.fetch(&fallback).await
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    async fn fetch(&self, url: &str) -> Result<ContextDocument, ProviderError> {
        debug!(%url, "fetching context document");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let raw = response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(url, e))?;
        let value = serde_json::from_str(&raw).map_err(|source| ProviderError::Decode {
            url: url.to_string(),
            source,
        })?;

        Ok(ContextDocument { raw, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    async fn serve(app: Router) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        port
    }

    async fn unused_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn fetches_document() {
        let app = Router::new().route(
            "/v0/context",
            get(|| async { Json(json!({ "identity": { "fullName": "Ada" } })) }),
        );
        let port = serve(app).await;

        let client =
            ContextClient::new(&format!("http://127.0.0.1:{port}/"), Duration::from_secs(2))
                .unwrap();
        let document = client.fetch_context().await.unwrap();

        assert_eq!(document.value["identity"]["fullName"], "Ada");
    }

    #[tokio::test]
    async fn keeps_body_text_verbatim() {
        const BODY: &str =
            r#"{"prefs":{"tone":"concise"},"identity":{"fullName":"Ben","big":12345678901234567890123}}"#;
        let app = Router::new().route(
            "/v0/context",
            get(|| async { ([("content-type", "application/json")], BODY) }),
        );
        let port = serve(app).await;

        let client =
            ContextClient::new(&format!("http://127.0.0.1:{port}"), Duration::from_secs(2))
                .unwrap();
        let document = client.fetch_context().await.unwrap();

        assert_eq!(document.raw, BODY);
        assert_eq!(document.value["identity"]["fullName"], "Ben");
    }

    #[tokio::test]
    async fn non_success_status_carries_status_and_url() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/v0/context",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    StatusCode::SERVICE_UNAVAILABLE
                }
            }),
        );
        let port = serve(app).await;

        let client =
            ContextClient::new(&format!("http://127.0.0.1:{port}"), Duration::from_secs(2))
                .unwrap();
        let err = client.fetch_context().await.unwrap_err();

        assert_eq!(err.status(), Some(503));
        assert_eq!(
            err.url(),
            Some(format!("http://127.0.0.1:{port}/v0/context").as_str())
        );
        // No fallback for a numeric host.
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn localhost_failure_retries_once_on_loopback() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/v0/context",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }),
        );
        let port = serve(app).await;

        let client =
            ContextClient::new(&format!("http://localhost:{port}"), Duration::from_secs(2))
                .unwrap();
        let err = client.fetch_context().await.unwrap_err();

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(err.status(), Some(500));
        assert_eq!(
            err.url(),
            Some(format!("http://127.0.0.1:{port}/v0/context").as_str())
        );
    }

    #[tokio::test]
    async fn unreachable_provider_is_a_request_error() {
        let port = unused_port().await;
        let client =
            ContextClient::new(&format!("http://127.0.0.1:{port}"), Duration::from_secs(2))
                .unwrap();

        let err = client.fetch_context().await.unwrap_err();

        assert!(matches!(err, ProviderError::Request { .. }));
        assert!(err.to_string().contains(&format!("127.0.0.1:{port}")));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let app = Router::new().route(
            "/v0/context",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({}))
            }),
        );
        let port = serve(app).await;

        let client = ContextClient::new(
            &format!("http://127.0.0.1:{port}"),
            Duration::from_millis(100),
        )
        .unwrap();
        let err = client.fetch_context().await.unwrap_err();

        assert!(matches!(err, ProviderError::Timeout { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn malformed_document_is_not_retried() {
        let app = Router::new().route("/v0/context", get(|| async { "not json" }));
        let port = serve(app).await;

        let client =
            ContextClient::new(&format!("http://127.0.0.1:{port}"), Duration::from_secs(2))
                .unwrap();
        let err = client.fetch_context().await.unwrap_err();

        assert!(matches!(err, ProviderError::Decode { .. }));
        assert!(!err.is_retryable());
    }
}
