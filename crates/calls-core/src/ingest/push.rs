//! Push channel: provider webhook events
//!
//! The provider posts every event as `{"message": {"type": .., "call": {..}, ..}}`.
//! Only `status-update` and `end-of-call-report` mean anything here; every
//! other type is acknowledged and dropped.
//!
//! Nothing the provider sends is ever turned into an error: unknown ids,
//! unmapped statuses, stale transitions and malformed bodies are logged and
//! reported as [`PushOutcome::Skipped`] or [`PushOutcome::NoChange`]. Only
//! store failures propagate.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::persist_snapshot;
use crate::changeset::CallField;
use crate::normalize::{map_provider_status, PROVIDER_ENDED_STATUS};
use crate::provider::types::array_or_empty;
use crate::provider::{ProviderArtifact, ProviderCall};
use crate::snapshot::{object_or_empty, parse_timestamp, ProviderSnapshot};
use crate::status::CallStatus;
use crate::store::CallStore;
use crate::Result;

/// A webhook event, keyed by its `type` tag
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WebhookEvent {
    StatusUpdate(StatusUpdateEvent),
    EndOfCallReport(EndOfCallReport),
    /// Any event type we do not act on
    #[serde(other)]
    Other,
}

/// `status-update`: fired on every provider-side status change
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusUpdateEvent {
    pub call: Option<ProviderCall>,
    pub status: Option<String>,
    pub ended_reason: Option<String>,
    /// ISO-8601 string or epoch milliseconds
    pub timestamp: Option<Value>,
}

/// `end-of-call-report`: fired once after the call ends
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndOfCallReport {
    pub call: Option<ProviderCall>,
    pub ended_reason: Option<String>,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub analysis: Option<Value>,
    pub artifact: Option<ProviderArtifact>,
    pub recording_url: Option<String>,
    pub stereo_recording_url: Option<String>,
    pub messages: Option<Value>,
    pub cost: Option<Value>,
    pub cost_breakdown: Option<Value>,
}

/// What a webhook did to the local record
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// Fields were written
    Applied { call_id: String, changed: Vec<CallField> },
    /// The event matched a call but changed nothing (duplicate or stale)
    NoChange { call_id: String },
    /// The event was not applied to any call
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    UnhandledEvent(String),
    MissingCallId,
    UnknownCall(String),
    UnmappedStatus(String),
    Malformed(String),
}

impl WebhookEvent {
    fn call_id(&self) -> Option<&str> {
        let call = match self {
            Self::StatusUpdate(event) => event.call.as_ref(),
            Self::EndOfCallReport(report) => report.call.as_ref(),
            Self::Other => None,
        };
        call.and_then(ProviderCall::call_id)
    }
}

impl StatusUpdateEvent {
    /// Snapshot for this event, or `None` when the status is not tracked
    pub fn to_snapshot(&self) -> Option<ProviderSnapshot> {
        let status = self.status.as_deref().unwrap_or_default();
        if status == PROVIDER_ENDED_STATUS {
            return Some(ProviderSnapshot::ended(
                self.ended_reason.clone().unwrap_or_default(),
            ));
        }

        let mapped = map_provider_status(status)?;
        let mut snapshot = ProviderSnapshot::live(status);
        if mapped == CallStatus::InProgress {
            // the event time, or arrival time when the provider omits it
            snapshot.started_at = self
                .timestamp
                .as_ref()
                .and_then(parse_timestamp)
                .or_else(|| Some(Utc::now()));
        }
        Some(snapshot)
    }
}

impl EndOfCallReport {
    /// Snapshot for this report.
    ///
    /// Message-level values win over the embedded call object, except cost
    /// and cost breakdown where the call object is authoritative. Timestamps
    /// only exist on the call object.
    pub fn to_snapshot(&self) -> ProviderSnapshot {
        let call = self.call.clone().unwrap_or_default();
        let artifact = self.artifact.clone().unwrap_or_default();

        let mut snapshot =
            ProviderSnapshot::ended(self.ended_reason.clone().unwrap_or_default());
        snapshot.transcript = self.transcript.clone();
        snapshot.artifact_transcript = artifact.transcript;
        snapshot.summary = self.summary.clone();

        snapshot.analysis = object_or_empty(self.analysis.clone());
        if snapshot.analysis.is_empty() {
            snapshot.analysis = object_or_empty(call.analysis.clone());
        }
        snapshot.structured_outputs = object_or_empty(artifact.structured_outputs);

        snapshot.recording_url = first_non_empty(&self.recording_url, &call.recording_url);
        snapshot.stereo_recording_url =
            first_non_empty(&self.stereo_recording_url, &call.stereo_recording_url);

        snapshot.messages = array_or_empty(self.messages.clone());
        if snapshot.messages.is_empty() {
            snapshot.messages = array_or_empty(call.messages.clone());
        }

        snapshot.cost = call
            .cost
            .clone()
            .filter(|c| !c.is_null())
            .or_else(|| self.cost.clone());
        snapshot.cost_breakdown = call
            .cost_breakdown
            .clone()
            .filter(is_truthy)
            .or_else(|| self.cost_breakdown.clone());

        snapshot.started_at = call.started_at.as_ref().and_then(parse_timestamp);
        snapshot.ended_at = call.ended_at.as_ref().and_then(parse_timestamp);
        snapshot
    }
}

fn first_non_empty(primary: &Option<String>, fallback: &Option<String>) -> Option<String> {
    primary
        .as_ref()
        .filter(|s| !s.is_empty())
        .or(fallback.as_ref())
        .cloned()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::String(s) => !s.is_empty(),
        Value::Number(_) => true,
    }
}

/// Applies webhook events to the call store
#[derive(Clone)]
pub struct PushChannel {
    store: Arc<dyn CallStore>,
}

impl PushChannel {
    pub fn new(store: Arc<dyn CallStore>) -> Self {
        Self { store }
    }

    /// Handle a raw request body; undecodable JSON is skipped, not rejected
    pub async fn handle_body(&self, body: &[u8]) -> Result<PushOutcome> {
        match serde_json::from_slice::<Value>(body) {
            Ok(payload) => self.handle_payload(&payload).await,
            Err(e) => {
                warn!("Webhook body is not valid JSON: {}", e);
                Ok(PushOutcome::Skipped(SkipReason::Malformed(e.to_string())))
            }
        }
    }

    /// Handle a decoded webhook envelope
    pub async fn handle_payload(&self, payload: &Value) -> Result<PushOutcome> {
        let Some(message) = payload.get("message").filter(|m| m.is_object()) else {
            warn!("Webhook payload without a message object - skipping");
            return Ok(PushOutcome::Skipped(SkipReason::Malformed(
                "missing message object".into(),
            )));
        };

        let event_type = message
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let event = match WebhookEvent::deserialize(message) {
            Ok(event) => event,
            Err(e) => {
                warn!("Malformed '{}' webhook event: {}", event_type, e);
                return Ok(PushOutcome::Skipped(SkipReason::Malformed(e.to_string())));
            }
        };

        self.handle_event(event, &event_type).await
    }

    /// Dispatch one decoded event
    pub async fn handle_event(&self, event: WebhookEvent, event_type: &str) -> Result<PushOutcome> {
        let call_id = event.call_id().map(str::to_string);

        let snapshot = match &event {
            WebhookEvent::Other => {
                debug!(
                    "Ignoring provider event '{}' (call {})",
                    event_type,
                    call_id.as_deref().unwrap_or("n/a")
                );
                return Ok(PushOutcome::Skipped(SkipReason::UnhandledEvent(
                    event_type.to_string(),
                )));
            }
            WebhookEvent::StatusUpdate(update) => match update.to_snapshot() {
                Some(snapshot) => snapshot,
                None => {
                    let status = update.status.clone().unwrap_or_default();
                    debug!("Unmapped provider status '{}' - skipping", status);
                    return Ok(PushOutcome::Skipped(SkipReason::UnmappedStatus(status)));
                }
            },
            WebhookEvent::EndOfCallReport(report) => report.to_snapshot(),
        };

        let Some(provider_call_id) = call_id else {
            warn!("{} without call.id - skipping", event_type);
            return Ok(PushOutcome::Skipped(SkipReason::MissingCallId));
        };

        let Some(mut call) = self.store.find_by_provider_call_id(&provider_call_id).await? else {
            warn!("{} for unknown provider call id: {}", event_type, provider_call_id);
            return Ok(PushOutcome::Skipped(SkipReason::UnknownCall(provider_call_id)));
        };

        let changes = persist_snapshot(self.store.as_ref(), &mut call, &snapshot).await?;
        if changes.is_empty() {
            debug!("{} for call {} changed nothing", event_type, call.id);
            return Ok(PushOutcome::NoChange { call_id: call.id });
        }

        let changed = changes.changed_fields();
        info!(
            "Call {} updated via {} (status={}, fields={:?})",
            call.id,
            event_type,
            call.status,
            changed.iter().map(|f| f.as_str()).collect::<Vec<_>>()
        );
        Ok(PushOutcome::Applied { call_id: call.id, changed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotPhase;
    use serde_json::json;

    #[test]
    fn test_event_dispatch_by_tag() {
        let event: WebhookEvent = serde_json::from_value(json!({
            "type": "status-update",
            "status": "ringing",
            "call": {"id": "prov-1"}
        }))
        .unwrap();
        assert!(matches!(event, WebhookEvent::StatusUpdate(_)));
        assert_eq!(event.call_id(), Some("prov-1"));

        let event: WebhookEvent =
            serde_json::from_value(json!({"type": "transcript", "transcript": "hi"})).unwrap();
        assert!(matches!(event, WebhookEvent::Other));
    }

    #[test]
    fn test_status_update_snapshot() {
        let update = StatusUpdateEvent {
            status: Some("in-progress".into()),
            timestamp: Some(json!(1_740_830_400_000_i64)),
            ..Default::default()
        };
        let snapshot = update.to_snapshot().unwrap();
        assert_eq!(snapshot.phase, SnapshotPhase::Live("in-progress".into()));
        assert_eq!(
            snapshot.started_at.map(|t| t.timestamp_millis()),
            Some(1_740_830_400_000)
        );

        let update = StatusUpdateEvent {
            status: Some("scheduled".into()),
            ..Default::default()
        };
        assert!(update.to_snapshot().is_none());

        let update = StatusUpdateEvent {
            status: Some("ended".into()),
            ended_reason: Some("customer-busy".into()),
            ..Default::default()
        };
        assert_eq!(
            update.to_snapshot().unwrap().phase,
            SnapshotPhase::Ended { reason: "customer-busy".into() }
        );
    }

    #[test]
    fn test_end_of_call_precedence() {
        let report: EndOfCallReport = serde_json::from_value(json!({
            "endedReason": "hangup",
            "recordingUrl": "",
            "cost": 9.0,
            "costBreakdown": {"llm": 1},
            "call": {
                "id": "prov-1",
                "recordingUrl": "https://rec/call.wav",
                "cost": 0.5,
                "costBreakdown": {},
                "analysis": {"summary": "from call"},
                "startedAt": "2025-03-01T12:00:00Z"
            }
        }))
        .unwrap();

        let snapshot = report.to_snapshot();
        assert_eq!(snapshot.recording_url.as_deref(), Some("https://rec/call.wav"));
        assert_eq!(snapshot.cost, Some(json!(0.5)));
        assert_eq!(snapshot.cost_breakdown, Some(json!({"llm": 1})));
        assert_eq!(snapshot.analysis.get("summary"), Some(&json!("from call")));
        assert!(snapshot.started_at.is_some());
        assert!(snapshot.ended_at.is_none());
    }
}
