//! Field-level change sets produced by reconciliation

use std::fmt;

use chrono::{DateTime, Utc};

use crate::status::CallStatus;
use crate::types::{Call, JsonMap};

/// A call field the reconciler is allowed to write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallField {
    Status,
    Transcript,
    Summary,
    Analysis,
    Metadata,
    StartedAt,
    EndedAt,
    DurationSeconds,
}

impl CallField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Transcript => "transcript",
            Self::Summary => "summary",
            Self::Analysis => "analysis",
            Self::Metadata => "metadata",
            Self::StartedAt => "started_at",
            Self::EndedAt => "ended_at",
            Self::DurationSeconds => "duration_seconds",
        }
    }
}

impl fmt::Display for CallField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// New values for the fields that actually changed.
///
/// `None` means "leave the field alone"; an empty change set is a no-op and
/// must not be persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub status: Option<CallStatus>,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub analysis: Option<JsonMap>,
    pub metadata: Option<JsonMap>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changed_fields().is_empty()
    }

    /// Names of the fields this change set writes
    pub fn changed_fields(&self) -> Vec<CallField> {
        let mut fields = Vec::new();
        if self.status.is_some() {
            fields.push(CallField::Status);
        }
        if self.transcript.is_some() {
            fields.push(CallField::Transcript);
        }
        if self.summary.is_some() {
            fields.push(CallField::Summary);
        }
        if self.analysis.is_some() {
            fields.push(CallField::Analysis);
        }
        if self.metadata.is_some() {
            fields.push(CallField::Metadata);
        }
        if self.started_at.is_some() {
            fields.push(CallField::StartedAt);
        }
        if self.ended_at.is_some() {
            fields.push(CallField::EndedAt);
        }
        if self.duration_seconds.is_some() {
            fields.push(CallField::DurationSeconds);
        }
        fields
    }

    pub fn contains(&self, field: CallField) -> bool {
        self.changed_fields().contains(&field)
    }

    /// Write the changed fields into `call` and bump `updated_at`.
    ///
    /// Does nothing for an empty change set.
    pub fn apply_to(&self, call: &mut Call, updated_at: DateTime<Utc>) {
        if self.is_empty() {
            return;
        }
        if let Some(status) = self.status {
            call.status = status;
        }
        if let Some(transcript) = &self.transcript {
            call.transcript = Some(transcript.clone());
        }
        if let Some(summary) = &self.summary {
            call.summary = Some(summary.clone());
        }
        if let Some(analysis) = &self.analysis {
            call.analysis = Some(analysis.clone());
        }
        if let Some(metadata) = &self.metadata {
            call.metadata = metadata.clone();
        }
        if let Some(started_at) = self.started_at {
            call.started_at = Some(started_at);
        }
        if let Some(ended_at) = self.ended_at {
            call.ended_at = Some(ended_at);
        }
        if let Some(duration) = self.duration_seconds {
            call.duration_seconds = Some(duration);
        }
        call.updated_at = updated_at;
    }

    /// The part of this change set that may still land on `stored`.
    ///
    /// `stored` may have moved since the change set was computed. Status only
    /// moves up the lattice, so a terminal row keeps its status, and
    /// write-once fields that are already filled keep their value.
    pub fn guarded_by(&self, stored: &Call) -> ChangeSet {
        ChangeSet {
            status: self
                .status
                .filter(|status| status.order() > stored.status.order()),
            transcript: self
                .transcript
                .clone()
                .filter(|_| is_blank(stored.transcript.as_deref())),
            summary: self
                .summary
                .clone()
                .filter(|_| is_blank(stored.summary.as_deref())),
            analysis: self
                .analysis
                .clone()
                .filter(|_| stored.analysis.as_ref().map_or(true, |a| a.is_empty())),
            metadata: self.metadata.clone(),
            started_at: self.started_at.filter(|_| stored.started_at.is_none()),
            ended_at: self.ended_at.filter(|_| stored.ended_at.is_none()),
            duration_seconds: self
                .duration_seconds
                .filter(|_| stored.duration_seconds.is_none()),
        }
    }

    /// Fields of this change set whose value is what `stored` now holds
    pub fn landed_on(&self, stored: &Call) -> ChangeSet {
        ChangeSet {
            status: self.status.filter(|status| *status == stored.status),
            transcript: self
                .transcript
                .clone()
                .filter(|t| stored.transcript.as_ref() == Some(t)),
            summary: self
                .summary
                .clone()
                .filter(|s| stored.summary.as_ref() == Some(s)),
            analysis: self
                .analysis
                .clone()
                .filter(|a| stored.analysis.as_ref() == Some(a)),
            metadata: self.metadata.clone().filter(|m| *m == stored.metadata),
            started_at: self.started_at.filter(|t| stored.started_at == Some(*t)),
            ended_at: self.ended_at.filter(|t| stored.ended_at == Some(*t)),
            duration_seconds: self
                .duration_seconds
                .filter(|d| stored.duration_seconds == Some(*d)),
        }
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}
