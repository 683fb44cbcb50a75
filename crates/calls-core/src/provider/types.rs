//! Provider wire types

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::normalize::PROVIDER_ENDED_STATUS;
use crate::snapshot::{object_or_empty, parse_timestamp, ProviderSnapshot, SnapshotPhase};
use crate::types::JsonMap;

/// A call as returned by the provider's REST API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderCall {
    pub id: Option<String>,
    /// Live status; `"ended"` once the call is over
    pub status: Option<String>,
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

    pub started_at: Option<Value>,
    pub ended_at: Option<Value>,
    pub metadata: Option<Value>,
}

/// Post-call artifacts nested under `artifact`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderArtifact {
    pub transcript: Option<String>,
    /// `{ id: { "name": .., "result": .. } }`
    pub structured_outputs: Option<Value>,
    pub recording: Option<Value>,
    pub messages: Option<Value>,
}

impl ProviderCall {
    /// Provider call id, if present and non-empty
    pub fn call_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn is_ended(&self) -> bool {
        self.status.as_deref() == Some(PROVIDER_ENDED_STATUS)
    }

    /// Convert a fetched call into the reconciler's input
    pub fn into_snapshot(self) -> ProviderSnapshot {
        let phase = if self.is_ended() {
            SnapshotPhase::Ended {
                reason: self.ended_reason.unwrap_or_default(),
            }
        } else {
            SnapshotPhase::Live(self.status.unwrap_or_default())
        };

        let artifact = self.artifact.unwrap_or_default();
        let mut snapshot = ProviderSnapshot::new(phase);
        snapshot.transcript = self.transcript;
        snapshot.artifact_transcript = artifact.transcript;
        snapshot.summary = self.summary;
        snapshot.analysis = object_or_empty(self.analysis);
        snapshot.structured_outputs = object_or_empty(artifact.structured_outputs);
        snapshot.recording_url = self.recording_url;
        snapshot.stereo_recording_url = self.stereo_recording_url;
        snapshot.messages = array_or_empty(self.messages);
        snapshot.cost = self.cost;
        snapshot.cost_breakdown = self.cost_breakdown;
        snapshot.started_at = self.started_at.as_ref().and_then(parse_timestamp);
        snapshot.ended_at = self.ended_at.as_ref().and_then(parse_timestamp);
        snapshot
    }

    /// Metadata echoed back by the provider
    pub fn metadata(&self) -> JsonMap {
        object_or_empty(self.metadata.clone())
    }
}

pub(crate) fn array_or_empty(value: Option<Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}
