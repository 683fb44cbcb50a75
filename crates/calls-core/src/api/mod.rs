//! HTTP push boundary
//!
//! One route, `POST /calls/webhook`, which the provider calls for every event.
//! The shared secret is the only thing that can make it answer with anything
//! but `{"ok": true}`; everything else the provider sends is acknowledged so
//! its retry logic never kicks in for events we chose to drop.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use subtle::ConstantTimeEq;
use tracing::{debug, error, warn};

use crate::error::{CallError, ErrorKind};
use crate::ingest::PushChannel;

/// Header carrying the webhook shared secret
pub const WEBHOOK_SECRET_HEADER: &str = "x-vapi-secret";

/// Path the provider posts events to
pub const WEBHOOK_PATH: &str = "/calls/webhook";

/// Shared state for the webhook handler
#[derive(Clone)]
pub struct ApiState {
    pub push: PushChannel,
    /// `None` disables authentication (development only)
    pub webhook_secret: Option<Arc<str>>,
}

impl ApiState {
    pub fn new(push: PushChannel, webhook_secret: Option<&str>) -> Self {
        Self {
            push,
            webhook_secret: webhook_secret.filter(|s| !s.is_empty()).map(Arc::from),
        }
    }
}

/// Create the webhook router
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(handle_webhook))
        .with_state(state)
}

/// Check the presented secret against the configured one in constant time.
///
/// With no configured secret every request passes.
pub fn verify_webhook_secret(expected: Option<&str>, presented: Option<&str>) -> Result<(), CallError> {
    let Some(expected) = expected.filter(|s| !s.is_empty()) else {
        return Ok(());
    };
    let presented = presented.unwrap_or_default();
    if bool::from(expected.as_bytes().ct_eq(presented.as_bytes())) {
        Ok(())
    } else {
        Err(CallError::AuthenticationFailed)
    }
}

async fn handle_webhook(State(state): State<ApiState>, headers: HeaderMap, body: Bytes) -> Response {
    let presented = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    if let Err(err) = verify_webhook_secret(state.webhook_secret.as_deref(), presented) {
        warn!("Rejected webhook: {}", err);
        return err.into_response();
    }

    match state.push.handle_body(&body).await {
        Ok(outcome) => {
            debug!("Webhook handled: {:?}", outcome);
            Json(json!({"ok": true})).into_response()
        }
        // store failures only; the provider will retry
        Err(err) => {
            error!("Webhook processing failed: {}", err);
            err.into_response()
        }
    }
}

/// HTTP status for an error kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AdmissionDenied => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::InvalidOperation => StatusCode::BAD_REQUEST,
        ErrorKind::Provider => StatusCode::BAD_GATEWAY,
        ErrorKind::AuthenticationFailed => StatusCode::UNAUTHORIZED,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for CallError {
    fn into_response(self) -> Response {
        let status = status_for(self.kind());
        let message = match self.kind() {
            ErrorKind::Internal => "Internal server error".to_string(),
            _ => self.to_string(),
        };
        (status, Json(json!({"ok": false, "error": message}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_verification() {
        assert!(verify_webhook_secret(None, None).is_ok());
        assert!(verify_webhook_secret(Some(""), Some("anything")).is_ok());
        assert!(verify_webhook_secret(Some("s3cret"), Some("s3cret")).is_ok());
        assert!(verify_webhook_secret(Some("s3cret"), Some("s3creT")).is_err());
        assert!(verify_webhook_secret(Some("s3cret"), Some("s3cret-longer")).is_err());
        assert!(verify_webhook_secret(Some("s3cret"), None).is_err());
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            CallError::call_not_found("c1").into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            CallError::AdmissionDenied { active: 2, max: 2 }.into_response().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            CallError::provider(Some(500), "boom").into_response().status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            CallError::AuthenticationFailed.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            CallError::internal("x").into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
