//! Webhook endpoint through the axum router

mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use calls_core::api::{create_router, ApiState, WEBHOOK_PATH, WEBHOOK_SECRET_HEADER};
use calls_core::{CallStatus, CallStore, MemoryCallStore, PushChannel};
use common::call_aged;

fn router(store: &MemoryCallStore, secret: Option<&str>) -> Router {
    let push = PushChannel::new(Arc::new(store.clone()));
    create_router(ApiState::new(push, secret))
}

fn webhook(body: impl Into<Body>, secret: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(WEBHOOK_PATH)
        .header("content-type", "application/json");
    if let Some(secret) = secret {
        builder = builder.header(WEBHOOK_SECRET_HEADER, secret);
    }
    builder.body(body.into()).unwrap()
}

fn ringing_event() -> String {
    json!({
        "message": {
            "type": "status-update",
            "status": "ringing",
            "call": {"id": "prov-1"}
        }
    })
    .to_string()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_wrong_secret_is_rejected() {
    let store = MemoryCallStore::new();
    let call = call_aged(CallStatus::Queued, Some("prov-1"), 10);
    store.insert_call(&call).await.unwrap();

    let app = router(&store, Some("s3cret"));

    let response = app
        .clone()
        .oneshot(webhook(ringing_event(), Some("guess")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.oneshot(webhook(ringing_event(), None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(store.get_any(&call.id).await.unwrap().status, CallStatus::Queued);
}

#[tokio::test]
async fn test_valid_secret_applies_event() {
    let store = MemoryCallStore::new();
    let call = call_aged(CallStatus::Queued, Some("prov-1"), 10);
    store.insert_call(&call).await.unwrap();

    let response = router(&store, Some("s3cret"))
        .oneshot(webhook(ringing_event(), Some("s3cret")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"ok": true}));
    assert_eq!(store.get_any(&call.id).await.unwrap().status, CallStatus::Ringing);
}

#[tokio::test]
async fn test_no_secret_configured_skips_auth() {
    let store = MemoryCallStore::new();
    let call = call_aged(CallStatus::Queued, Some("prov-1"), 10);
    store.insert_call(&call).await.unwrap();

    let response = router(&store, Some(""))
        .oneshot(webhook(ringing_event(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.get_any(&call.id).await.unwrap().status, CallStatus::Ringing);
}

#[tokio::test]
async fn test_unusable_events_are_acknowledged() {
    let store = MemoryCallStore::new();
    let app = router(&store, None);

    for body in [
        "{not json".to_string(),
        json!({"message": {"type": "hang", "call": {"id": "prov-1"}}}).to_string(),
        ringing_event(),
    ] {
        let response = app.clone().oneshot(webhook(body, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"ok": true}));
    }
}
