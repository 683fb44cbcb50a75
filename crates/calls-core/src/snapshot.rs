//! Provider snapshots
//!
//! A [`ProviderSnapshot`] is everything the provider told us about a call in
//! one message, whether it came from a webhook or from polling. Both ingestion
//! channels build one and hand it to the reconciler, so the merge rules never
//! depend on how the data arrived.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crate::types::JsonMap;

/// Where the call stands according to the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotPhase {
    /// Still running; carries the provider's raw status string
    Live(String),
    /// Over; carries the provider's free-text end reason
    Ended { reason: String },
}

/// Normalized provider view of a single call
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSnapshot {
    pub phase: SnapshotPhase,

    /// Top-level transcript
    pub transcript: Option<String>,
    /// Transcript nested in the provider artifact
    pub artifact_transcript: Option<String>,
    pub summary: Option<String>,
    /// Provider analysis object (may carry its own `summary`)
    pub analysis: JsonMap,
    /// Named structured outputs: `{ id: { "name": .., "result": .. } }`
    pub structured_outputs: JsonMap,

    pub recording_url: Option<String>,
    pub stereo_recording_url: Option<String>,
    pub messages: Vec<Value>,
    pub cost: Option<Value>,
    pub cost_breakdown: Option<Value>,

    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ProviderSnapshot {
    /// An empty snapshot in the given phase
    pub fn new(phase: SnapshotPhase) -> Self {
        Self {
            phase,
            transcript: None,
            artifact_transcript: None,
            summary: None,
            analysis: JsonMap::new(),
            structured_outputs: JsonMap::new(),
            recording_url: None,
            stereo_recording_url: None,
            messages: Vec::new(),
            cost: None,
            cost_breakdown: None,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn live(status: impl Into<String>) -> Self {
        Self::new(SnapshotPhase::Live(status.into()))
    }

    pub fn ended(reason: impl Into<String>) -> Self {
        Self::new(SnapshotPhase::Ended { reason: reason.into() })
    }

    pub fn is_ended(&self) -> bool {
        matches!(self.phase, SnapshotPhase::Ended { .. })
    }
}

/// Object-valued JSON or an empty map
pub(crate) fn object_or_empty(value: Option<Value>) -> JsonMap {
    match value {
        Some(Value::Object(map)) => map,
        _ => JsonMap::new(),
    }
}

/// Best-effort timestamp parsing.
///
/// Accepts RFC 3339 strings, offset-less ISO-8601 strings (taken as UTC),
/// either with a `T` or a space between date and time, and integers as epoch
/// milliseconds. Anything else yields `None`.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_iso8601(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_timestamp_forms() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 5).unwrap();
        assert_eq!(parse_timestamp(&json!("2025-03-01T12:00:05Z")), Some(expected));
        assert_eq!(parse_timestamp(&json!("2025-03-01T14:00:05+02:00")), Some(expected));
        assert_eq!(parse_timestamp(&json!("2025-03-01T12:00:05")), Some(expected));
        assert_eq!(parse_timestamp(&json!("2025-03-01 12:00:05")), Some(expected));
        assert_eq!(parse_timestamp(&json!("2025-03-01 14:00:05+02:00")), Some(expected));
        assert_eq!(
            parse_timestamp(&json!("2025-03-01 12:00:05.250")),
            Some(expected + chrono::Duration::milliseconds(250))
        );
        assert_eq!(parse_timestamp(&json!(expected.timestamp_millis())), Some(expected));
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
        assert_eq!(parse_timestamp(&json!("")), None);
        assert_eq!(parse_timestamp(&Value::Null), None);
        assert_eq!(parse_timestamp(&json!({"at": 1})), None);
    }
}
