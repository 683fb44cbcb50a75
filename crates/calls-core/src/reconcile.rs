//! Call-state reconciler
//!
//! The single choke point every ingestion channel goes through:
//! normalize the snapshot's status, run the transition guard, then merge
//! artifacts. The result is the minimal [`ChangeSet`] to persist.

use tracing::debug;

use crate::changeset::ChangeSet;
use crate::merge::merge_artifacts;
use crate::normalize::{map_ended_reason, map_provider_status};
use crate::snapshot::{ProviderSnapshot, SnapshotPhase};
use crate::status::CallStatus;
use crate::transition::is_valid_transition;
use crate::types::Call;

/// Candidate status for `call` according to `snapshot`.
///
/// `None` when the snapshot's live status is not one we track.
pub fn candidate_status(call: &Call, snapshot: &ProviderSnapshot) -> Option<CallStatus> {
    match &snapshot.phase {
        SnapshotPhase::Live(provider_status) => map_provider_status(provider_status),
        SnapshotPhase::Ended { reason } => Some(map_ended_reason(reason, call.status)),
    }
}

/// Merge one provider snapshot into `call`.
///
/// Pure: the record is not modified. An empty change set means the snapshot
/// was stale, unmapped, or carried nothing new.
///
/// A terminal local status is never replaced, even by a different terminal
/// status; content fields may still be filled in (a final report often lands
/// after a poll or a cancel already closed the call).
pub fn reconcile(call: &Call, snapshot: &ProviderSnapshot) -> ChangeSet {
    let Some(candidate) = candidate_status(call, snapshot) else {
        debug!(
            "Unmapped provider status {:?} for call {} - skipping",
            snapshot.phase, call.id
        );
        return ChangeSet::default();
    };

    if !is_valid_transition(call.status, candidate) {
        debug!(
            "Ignoring transition {} -> {} for call {}",
            call.status, candidate, call.id
        );
        return ChangeSet::default();
    }

    let mut changes = merge_artifacts(call, snapshot);

    if candidate != call.status {
        if call.status.is_terminal() {
            debug!(
                "Call {} already {}, keeping status over {}",
                call.id, call.status, candidate
            );
        } else {
            changes.status = Some(candidate);
        }
    }

    changes
}
