//! Shared fixtures for calls-core integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;

use calls_core::provider::{OutboundCallRequest, ProviderCall, ProviderClient};
use calls_core::{Call, CallError, CallStatus, Contact, Result};

/// Scriptable stand-in for the telephony provider
#[derive(Default)]
pub struct FakeProvider {
    remote: Mutex<HashMap<String, ProviderCall>>,
    unavailable: Mutex<HashSet<String>>,
    create_error: Mutex<Option<(Option<u16>, String)>>,
    pub created: Mutex<Vec<OutboundCallRequest>>,
    pub stopped: Mutex<Vec<String>>,
    next_id: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// What `get_call(id)` should answer
    pub fn set_remote(&self, provider_call_id: &str, call: ProviderCall) {
        self.remote.lock().insert(provider_call_id.to_string(), call);
    }

    /// Make `get_call(id)` fail with a 503
    pub fn make_unavailable(&self, provider_call_id: &str) {
        self.unavailable.lock().insert(provider_call_id.to_string());
    }

    /// Make every `create_call` fail
    pub fn fail_creates(&self, status: Option<u16>, body: &str) {
        *self.create_error.lock() = Some((status, body.to_string()));
    }
}

#[async_trait]
impl ProviderClient for FakeProvider {
    async fn create_call(&self, request: &OutboundCallRequest) -> Result<ProviderCall> {
        if let Some((status, body)) = self.create_error.lock().clone() {
            return Err(CallError::provider(status, body));
        }
        self.created.lock().push(request.clone());
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ProviderCall {
            id: Some(format!("prov-{}", n)),
            status: Some("queued".into()),
            ..Default::default()
        })
    }

    async fn get_call(&self, provider_call_id: &str) -> Result<ProviderCall> {
        if self.unavailable.lock().contains(provider_call_id) {
            return Err(CallError::provider(Some(503), "unavailable"));
        }
        self.remote
            .lock()
            .get(provider_call_id)
            .cloned()
            .ok_or_else(|| CallError::provider(Some(404), "call not found"))
    }

    async fn stop_call(&self, provider_call_id: &str) -> Result<()> {
        self.stopped.lock().push(provider_call_id.to_string());
        Ok(())
    }
}

/// A call for `owner-1` in `status`, created `age_secs` ago
pub fn call_aged(status: CallStatus, provider_call_id: Option<&str>, age_secs: i64) -> Call {
    let mut call = Call::pending("owner-1", "contact-1", "assistant-1");
    call.status = status;
    call.provider_call_id = provider_call_id.map(str::to_string);
    call.created_at = Utc::now() - Duration::seconds(age_secs);
    call.updated_at = call.created_at;
    call
}

pub fn contact(id: &str, owner_id: &str) -> Contact {
    Contact {
        id: id.into(),
        owner_id: owner_id.into(),
        name: "Ada Lovelace".into(),
        phone: "+15550100".into(),
    }
}

/// Provider answer for a call that is still running
pub fn remote_live(id: &str, status: &str) -> ProviderCall {
    ProviderCall {
        id: Some(id.into()),
        status: Some(status.into()),
        ..Default::default()
    }
}

/// Provider answer for a finished call
pub fn remote_ended(id: &str, reason: &str) -> ProviderCall {
    ProviderCall {
        id: Some(id.into()),
        status: Some("ended".into()),
        ended_reason: Some(reason.into()),
        transcript: Some("AI: Hello\nUser: Hi".into()),
        started_at: Some(serde_json::json!("2025-03-01T12:00:00Z")),
        ended_at: Some(serde_json::json!("2025-03-01T12:01:05Z")),
        ..Default::default()
    }
}
