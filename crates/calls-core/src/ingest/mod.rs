//! Ingestion channels
//!
//! Provider state reaches us two ways: pushed webhook events ([`push`]) and
//! polled lookups ([`poll`]). Both turn what they receive into a
//! [`ProviderSnapshot`] and persist whatever [`reconcile`] decides.

use chrono::Utc;
use tracing::debug;

use crate::changeset::ChangeSet;
use crate::reconcile::reconcile;
use crate::snapshot::ProviderSnapshot;
use crate::store::CallStore;
use crate::types::Call;
use crate::Result;

pub mod poll;
pub mod push;

pub use poll::{PollChannel, SweepReport};
pub use push::{PushChannel, PushOutcome, SkipReason, WebhookEvent};

/// Reconcile `snapshot` into `call` and write the changed fields.
///
/// `call` is replaced by the stored record and the returned change set holds
/// only what actually landed; a concurrent writer may have got there first.
/// Nothing is written when the change set is empty.
pub(crate) async fn persist_snapshot(
    store: &dyn CallStore,
    call: &mut Call,
    snapshot: &ProviderSnapshot,
) -> Result<ChangeSet> {
    let changes = reconcile(call, snapshot);
    if changes.is_empty() {
        return Ok(changes);
    }

    let stored = store.apply_changes(&call.id, &changes, Utc::now()).await?;
    let landed = changes.landed_on(&stored);
    if landed != changes {
        debug!(
            "Call {} moved concurrently; kept {} over {:?}",
            stored.id, stored.status, changes.status
        );
    }
    *call = stored;
    Ok(landed)
}
