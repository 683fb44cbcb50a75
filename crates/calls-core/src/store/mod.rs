//! Call persistence
//!
//! [`CallStore`] is the only persisted structure this crate owns: one row per
//! call. Writers never take a per-call lock; each reconciliation reads a
//! snapshot of the row and writes back only the fields its change set names.
//! The write itself re-checks the row, so a change set computed from a stale
//! read can lose a race but never move a call backwards.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::changeset::ChangeSet;
use crate::status::CallStatus;
use crate::types::Call;
use crate::Result;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryCallStore;
pub use sqlite::SqliteCallStore;

/// Storage for call records
#[async_trait]
pub trait CallStore: Send + Sync {
    /// Persist a newly created call
    async fn insert_call(&self, call: &Call) -> Result<()>;

    /// Look up a call owned by `owner_id`
    async fn get_call(&self, owner_id: &str, call_id: &str) -> Result<Option<Call>>;

    /// Look up a call by the provider's id, regardless of owner
    async fn find_by_provider_call_id(&self, provider_call_id: &str) -> Result<Option<Call>>;

    /// Write the fields named by `changes` and return the stored record.
    ///
    /// Checked against the row at write time, atomically: status is written
    /// only if it moves up the lattice, and write-once fields only while
    /// still empty. See [`ChangeSet::guarded_by`].
    async fn apply_changes(
        &self,
        call_id: &str,
        changes: &ChangeSet,
        updated_at: DateTime<Utc>,
    ) -> Result<Call>;

    /// Record the provider's id once it accepted the call
    async fn link_provider(
        &self,
        call_id: &str,
        provider_call_id: &str,
        status: CallStatus,
    ) -> Result<()>;

    /// Move a call to `failed` with a diagnostic message
    async fn mark_failed(&self, call_id: &str, error_message: &str) -> Result<()>;

    /// Overwrite the status outside reconciliation (optimistic cancel)
    async fn set_status(&self, call_id: &str, status: CallStatus) -> Result<()>;

    /// Number of non-terminal calls held by `owner_id`
    async fn count_active_calls(&self, owner_id: &str) -> Result<u64>;

    /// Calls exactly `queued`, created before `cutoff`, with a provider id
    async fn list_queued_for_sync(&self, cutoff: DateTime<Utc>) -> Result<Vec<Call>>;

    /// Fail every pending/queued call created before `cutoff`; returns the count
    async fn fail_stale_calls(&self, cutoff: DateTime<Utc>, error_message: &str) -> Result<u64>;
}
