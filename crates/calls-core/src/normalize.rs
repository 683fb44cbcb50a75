//! Outcome normalizer
//!
//! Maps provider status strings and free-text end reasons onto the canonical
//! status lattice.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::status::CallStatus;

/// Provider live status → canonical status
static PROVIDER_STATUS_MAP: Lazy<HashMap<&'static str, CallStatus>> = Lazy::new(|| {
    HashMap::from([
        ("queued", CallStatus::Queued),
        ("ringing", CallStatus::Ringing),
        ("in-progress", CallStatus::InProgress),
        // still active, just transferring
        ("forwarding", CallStatus::InProgress),
        ("ended", CallStatus::Completed),
    ])
});

/// Provider status reported once a call is over
pub const PROVIDER_ENDED_STATUS: &str = "ended";

/// Map a provider live status onto the lattice.
///
/// Returns `None` for statuses we do not track (`scheduled`, empty strings,
/// anything new the provider adds); callers treat that as "no change".
pub fn map_provider_status(provider_status: &str) -> Option<CallStatus> {
    PROVIDER_STATUS_MAP.get(provider_status).copied()
}

/// Classify a provider end reason into a terminal status.
///
/// Rules are case-insensitive substring checks applied in a fixed order;
/// `busy` must win over `error` because providers nest qualifiers
/// (e.g. `sip-busy-error`). Unrecognized reasons leave an already terminal
/// status alone and otherwise mean the call completed normally.
pub fn map_ended_reason(reason: &str, current: CallStatus) -> CallStatus {
    let reason = reason.to_lowercase().replace('-', "_");

    if reason.contains("busy") {
        CallStatus::Busy
    } else if reason.contains("no_answer") || reason.contains("did_not_answer") {
        CallStatus::NoAnswer
    } else if reason.contains("voicemail") {
        CallStatus::Voicemail
    } else if reason.contains("error") {
        CallStatus::Failed
    } else if reason.contains("silence") {
        CallStatus::Completed
    } else if current.is_terminal() {
        current
    } else {
        CallStatus::Completed
    }
}
