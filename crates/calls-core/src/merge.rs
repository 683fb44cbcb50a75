//! Artifact merger
//!
//! Folds the content of a provider snapshot into a call record:
//!
//! - `transcript`, `summary`, `analysis`, `started_at`, `ended_at` are
//!   first-write-wins: written only while the local field is empty.
//! - `metadata` is a key-wise union; provider keys overwrite same-named local
//!   keys and every other local key survives.
//! - `duration_seconds` is derived once from the merged timestamps.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::changeset::ChangeSet;
use crate::snapshot::ProviderSnapshot;
use crate::types::{Call, JsonMap};

/// Metadata key for the mono recording URL
pub const META_RECORDING_URL: &str = "recordingUrl";
/// Metadata key for the stereo recording URL
pub const META_STEREO_RECORDING_URL: &str = "stereoRecordingUrl";
/// Metadata key for the conversation messages
pub const META_MESSAGES: &str = "messages";
/// Metadata key for the total call cost
pub const META_COST: &str = "cost";
/// Metadata key for the itemized call cost
pub const META_COST_BREAKDOWN: &str = "costBreakdown";
/// Analysis key under which structured outputs are stored
pub const ANALYSIS_STRUCTURED_OUTPUTS: &str = "structuredOutputs";

/// Compute content-field changes for `call` from `snapshot`.
///
/// Status is not touched here; see [`crate::reconcile`].
pub fn merge_artifacts(call: &Call, snapshot: &ProviderSnapshot) -> ChangeSet {
    let mut changes = ChangeSet::default();

    if is_blank(call.transcript.as_deref()) {
        changes.transcript = best_transcript(snapshot);
    }

    if is_blank(call.summary.as_deref()) {
        changes.summary = best_summary(snapshot);
    }

    if call.analysis.as_ref().map_or(true, |a| a.is_empty()) {
        let merged = merged_analysis(snapshot);
        if !merged.is_empty() {
            changes.analysis = Some(merged);
        }
    }

    let metadata = merged_metadata(&call.metadata, snapshot);
    if metadata != call.metadata {
        changes.metadata = Some(metadata);
    }

    if call.started_at.is_none() {
        changes.started_at = snapshot.started_at;
    }
    if call.ended_at.is_none() {
        changes.ended_at = snapshot.ended_at;
    }

    if call.duration_seconds.is_none() {
        let started = call.started_at.or(changes.started_at);
        let ended = call.ended_at.or(changes.ended_at);
        if let (Some(started), Some(ended)) = (started, ended) {
            changes.duration_seconds = Some(duration_seconds(started, ended));
        }
    }

    changes
}

/// Whole seconds between two instants, clamped at zero for clock skew
pub fn duration_seconds(started: DateTime<Utc>, ended: DateTime<Utc>) -> i64 {
    (ended - started).num_seconds().max(0)
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// The value as given, unless it is blank
fn present(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).map(str::to_string)
}

fn analysis_text<'a>(snapshot: &'a ProviderSnapshot, key: &str) -> Option<&'a str> {
    snapshot.analysis.get(key).and_then(Value::as_str)
}

/// Top-level transcript, then the artifact copy, then the analysis copy.
/// Stored verbatim.
fn best_transcript(snapshot: &ProviderSnapshot) -> Option<String> {
    present(snapshot.transcript.as_deref())
        .or_else(|| present(snapshot.artifact_transcript.as_deref()))
        .or_else(|| present(analysis_text(snapshot, "transcript")))
}

/// Top-level summary, then `analysis.summary`, then the structured outputs
fn best_summary(snapshot: &ProviderSnapshot) -> Option<String> {
    non_blank(snapshot.summary.as_deref())
        .or_else(|| non_blank(analysis_text(snapshot, "summary")))
        .or_else(|| structured_output_summary(&snapshot.structured_outputs))
}

/// First non-empty result whose name mentions "summary", falling back to the
/// first non-empty result of any name.
fn structured_output_summary(outputs: &JsonMap) -> Option<String> {
    let mut fallback = None;
    for entry in outputs.values() {
        let Some(result) = non_blank(entry.get("result").and_then(Value::as_str)) else {
            continue;
        };
        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();
        if name.contains("summary") {
            return Some(result);
        }
        if fallback.is_none() {
            fallback = Some(result);
        }
    }
    fallback
}

/// Shallow merge of the analysis object with the structured outputs
fn merged_analysis(snapshot: &ProviderSnapshot) -> JsonMap {
    let mut merged = snapshot.analysis.clone();
    if !snapshot.structured_outputs.is_empty() {
        merged.insert(
            ANALYSIS_STRUCTURED_OUTPUTS.to_string(),
            Value::Object(snapshot.structured_outputs.clone()),
        );
    }
    merged
}

fn merged_metadata(existing: &JsonMap, snapshot: &ProviderSnapshot) -> JsonMap {
    let mut metadata = existing.clone();

    if let Some(url) = non_blank(snapshot.recording_url.as_deref()) {
        metadata.insert(META_RECORDING_URL.to_string(), Value::String(url));
    }
    if let Some(url) = non_blank(snapshot.stereo_recording_url.as_deref()) {
        metadata.insert(META_STEREO_RECORDING_URL.to_string(), Value::String(url));
    }
    if !snapshot.messages.is_empty() {
        metadata.insert(META_MESSAGES.to_string(), Value::Array(snapshot.messages.clone()));
    }
    // zero is a real cost, so only null counts as absent
    if let Some(cost) = snapshot.cost.as_ref().filter(|c| !c.is_null()) {
        metadata.insert(META_COST.to_string(), cost.clone());
    }
    if let Some(breakdown) = snapshot.cost_breakdown.as_ref().filter(|b| is_present(b)) {
        metadata.insert(META_COST_BREAKDOWN.to_string(), breakdown.clone());
    }

    metadata
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::CallField;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn call() -> Call {
        Call::pending("owner-1", "contact-1", "assistant-1")
    }

    fn object(value: Value) -> JsonMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_transcript_precedence() {
        let mut snapshot = ProviderSnapshot::ended("hangup");
        snapshot.artifact_transcript = Some("from artifact".into());
        assert_eq!(
            merge_artifacts(&call(), &snapshot).transcript.as_deref(),
            Some("from artifact")
        );

        snapshot.transcript = Some("top level".into());
        assert_eq!(merge_artifacts(&call(), &snapshot).transcript.as_deref(), Some("top level"));

        snapshot.transcript = Some("   ".into());
        assert_eq!(
            merge_artifacts(&call(), &snapshot).transcript.as_deref(),
            Some("from artifact")
        );
    }

    #[test]
    fn test_transcript_kept_verbatim_summary_trimmed() {
        let mut snapshot = ProviderSnapshot::ended("hangup");
        snapshot.transcript = Some("\nAI: Hello\nUser: Hi\n".into());
        snapshot.summary = Some("  Short chat \n".into());

        let changes = merge_artifacts(&call(), &snapshot);
        assert_eq!(changes.transcript.as_deref(), Some("\nAI: Hello\nUser: Hi\n"));
        assert_eq!(changes.summary.as_deref(), Some("Short chat"));
    }

    #[test]
    fn test_transcript_first_write_wins() {
        let mut existing = call();
        existing.transcript = Some("original".into());
        let mut snapshot = ProviderSnapshot::ended("hangup");
        snapshot.transcript = Some("rewritten".into());

        let changes = merge_artifacts(&existing, &snapshot);
        assert!(changes.transcript.is_none());
        assert!(!changes.contains(CallField::Transcript));
    }

    #[test]
    fn test_summary_precedence() {
        let mut snapshot = ProviderSnapshot::ended("hangup");
        snapshot.structured_outputs = object(json!({
            "a1": { "name": "Lead Score", "result": "7" },
            "b2": { "name": "Call Summary", "result": "Customer wants a demo" },
        }));
        assert_eq!(
            merge_artifacts(&call(), &snapshot).summary.as_deref(),
            Some("Customer wants a demo")
        );

        snapshot.analysis = object(json!({ "summary": "Analysis summary" }));
        assert_eq!(
            merge_artifacts(&call(), &snapshot).summary.as_deref(),
            Some("Analysis summary")
        );

        snapshot.summary = Some("Top summary".into());
        assert_eq!(merge_artifacts(&call(), &snapshot).summary.as_deref(), Some("Top summary"));
    }

    #[test]
    fn test_summary_falls_back_to_first_structured_output() {
        let mut snapshot = ProviderSnapshot::ended("hangup");
        snapshot.structured_outputs = object(json!({
            "a1": { "name": "Empty", "result": "" },
            "b2": { "name": "Intent", "result": "callback requested" },
            "c3": { "name": "Other", "result": "ignored" },
        }));
        assert_eq!(
            merge_artifacts(&call(), &snapshot).summary.as_deref(),
            Some("callback requested")
        );
    }

    #[test]
    fn test_analysis_merge() {
        let mut snapshot = ProviderSnapshot::ended("hangup");
        snapshot.analysis = object(json!({ "successEvaluation": "true" }));
        snapshot.structured_outputs = object(json!({ "x": { "name": "n", "result": "r" } }));

        let analysis = merge_artifacts(&call(), &snapshot).analysis.unwrap();
        assert_eq!(analysis["successEvaluation"], json!("true"));
        assert_eq!(analysis["structuredOutputs"]["x"]["result"], json!("r"));

        let mut existing = call();
        existing.analysis = Some(object(json!({ "kept": true })));
        assert!(merge_artifacts(&existing, &snapshot).analysis.is_none());

        let empty = ProviderSnapshot::ended("hangup");
        assert!(merge_artifacts(&call(), &empty).analysis.is_none());
    }

    #[test]
    fn test_metadata_union_with_overwrite() {
        let mut existing = call();
        existing.metadata = object(json!({ "campaign": "spring", "cost": 0.1 }));

        let mut snapshot = ProviderSnapshot::ended("hangup");
        snapshot.recording_url = Some("https://rec/mono.wav".into());
        snapshot.cost = Some(json!(0.42));
        snapshot.cost_breakdown = Some(json!({}));
        snapshot.messages = vec![json!({ "role": "bot", "message": "hi" })];

        let metadata = merge_artifacts(&existing, &snapshot).metadata.unwrap();
        assert_eq!(metadata["campaign"], json!("spring"));
        assert_eq!(metadata["cost"], json!(0.42));
        assert_eq!(metadata["recordingUrl"], json!("https://rec/mono.wav"));
        assert_eq!(metadata["messages"].as_array().unwrap().len(), 1);
        assert!(!metadata.contains_key("costBreakdown"));
        assert!(!metadata.contains_key("stereoRecordingUrl"));
    }

    #[test]
    fn test_metadata_unchanged_is_not_reported() {
        let mut existing = call();
        existing.metadata = object(json!({ "cost": 0.42 }));
        let mut snapshot = ProviderSnapshot::ended("hangup");
        snapshot.cost = Some(json!(0.42));
        assert!(merge_artifacts(&existing, &snapshot).metadata.is_none());
    }

    #[test]
    fn test_zero_cost_is_recorded() {
        let mut snapshot = ProviderSnapshot::ended("hangup");
        snapshot.cost = Some(json!(0));
        let metadata = merge_artifacts(&call(), &snapshot).metadata.unwrap();
        assert_eq!(metadata["cost"], json!(0));
    }

    #[test]
    fn test_duration_law() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let mut snapshot = ProviderSnapshot::ended("hangup");
        snapshot.started_at = Some(t0);
        snapshot.ended_at = Some(t0 + Duration::milliseconds(95_900));

        let changes = merge_artifacts(&call(), &snapshot);
        assert_eq!(changes.started_at, Some(t0));
        assert_eq!(changes.duration_seconds, Some(95));
    }

    #[test]
    fn test_duration_clamped_on_skew() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let mut snapshot = ProviderSnapshot::ended("hangup");
        snapshot.started_at = Some(t0);
        snapshot.ended_at = Some(t0 - Duration::seconds(3));
        assert_eq!(merge_artifacts(&call(), &snapshot).duration_seconds, Some(0));
    }

    #[test]
    fn test_duration_uses_existing_start() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let mut existing = call();
        existing.started_at = Some(t0);

        let mut snapshot = ProviderSnapshot::ended("hangup");
        snapshot.started_at = Some(t0 + Duration::seconds(30));
        snapshot.ended_at = Some(t0 + Duration::seconds(60));

        let changes = merge_artifacts(&existing, &snapshot);
        assert!(changes.started_at.is_none());
        assert_eq!(changes.ended_at, Some(t0 + Duration::seconds(60)));
        assert_eq!(changes.duration_seconds, Some(60));
    }

    #[test]
    fn test_duration_computed_once() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let mut existing = call();
        existing.started_at = Some(t0);
        existing.ended_at = Some(t0 + Duration::seconds(10));
        existing.duration_seconds = Some(10);

        let mut snapshot = ProviderSnapshot::ended("hangup");
        snapshot.started_at = Some(t0);
        snapshot.ended_at = Some(t0 + Duration::seconds(99));
        assert!(merge_artifacts(&existing, &snapshot).is_empty());
    }
}
