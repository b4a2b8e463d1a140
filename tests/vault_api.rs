//! Integration tests for the vault-api provider routes

use axum::body::Body;
use axum::http::{Request, StatusCode};
use mcp_vault::router::create_vault_router;
use mcp_vault::vault::{UserContext, VaultState};
use serde_json::Value;
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot`

#[tokio::test]
async fn test_context_endpoint_serves_sample() {
    let app = create_vault_router(Arc::new(VaultState::default()), false);

    let request = Request::builder()
        .uri("/v0/context")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["identity"]["fullName"], "Ben Shoemaker");
    assert_eq!(body["comms"]["primaryEmail"], "ben@example.com");
    assert_eq!(body["prefs"]["tone"], "concise");
}

#[tokio::test]
async fn test_context_endpoint_serves_configured_document() {
    let mut context = UserContext::sample();
    context.identity.full_name = "Ada Lovelace".into();
    let app = create_vault_router(Arc::new(VaultState::new(context)), true);

    let request = Request::builder()
        .uri("/v0/context")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["identity"]["fullName"], "Ada Lovelace");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = create_vault_router(Arc::new(VaultState::default()), false);

    let request = Request::builder()
        .uri("/v1/context")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
