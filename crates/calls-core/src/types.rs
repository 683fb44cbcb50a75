//! Core types for calls-core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::status::CallStatus;

/// Free-form JSON object used for analysis and metadata
pub type JsonMap = Map<String, Value>;

/// Outbound call record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub id: String,
    pub owner_id: String,
    pub contact_id: String,
    /// Applied once at creation, never re-applied by reconciliation
    pub script_id: Option<String>,

    /// Provider's id for the call; unset until the provider accepts it
    pub provider_call_id: Option<String>,
    pub assistant_id: String,
    pub phone_line_id: Option<String>,

    pub status: CallStatus,
    pub outcome: Option<String>,
    pub error_message: Option<String>,

    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub analysis: Option<JsonMap>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,

    #[serde(default)]
    pub metadata: JsonMap,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Call {
    /// Create a new call ID
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// A fresh `pending` call with no provider linkage yet
    pub fn pending(
        owner_id: impl Into<String>,
        contact_id: impl Into<String>,
        assistant_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Self::new_id(),
            owner_id: owner_id.into(),
            contact_id: contact_id.into(),
            script_id: None,
            provider_call_id: None,
            assistant_id: assistant_id.into(),
            phone_line_id: None,
            status: CallStatus::Pending,
            outcome: None,
            error_message: None,
            transcript: None,
            summary: None,
            analysis: None,
            started_at: None,
            ended_at: None,
            duration_seconds: None,
            metadata: JsonMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Provider id, if present and non-empty
    pub fn provider_id(&self) -> Option<&str> {
        self.provider_call_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// A contact, owned by the external contacts service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub phone: String,
}

/// A call script, owned by the external scripts service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallScript {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub custom_prompt: Option<String>,
    pub first_message: Option<String>,
    #[serde(default)]
    pub call_goals: Vec<CallGoal>,
}

/// One goal the assistant should pursue during a call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallGoal {
    pub name: String,
    pub description: String,
    pub success_criteria: Option<String>,
}

/// Request to place a new outbound call
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCallRequest {
    pub contact_id: String,
    pub assistant_id: String,
    pub phone_line_id: Option<String>,
    pub script_id: Option<String>,
    pub custom_prompt: Option<String>,
    pub first_message: Option<String>,
    #[serde(default)]
    pub call_goals: Vec<CallGoal>,
    #[serde(default)]
    pub metadata: JsonMap,
}
