//! Pull channel: provider lookups
//!
//! Used three ways: opportunistically when a call is read, on explicit
//! request, and by the scheduled sweep over calls stuck in `queued`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use super::persist_snapshot;
use crate::changeset::ChangeSet;
use crate::provider::ProviderClient;
use crate::store::CallStore;
use crate::sweeper::cutoff_before;
use crate::types::Call;
use crate::{CallError, Result};

/// Counts from one scheduled sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Queued calls old enough to poll
    pub examined: usize,
    /// Calls whose record actually changed
    pub synced: usize,
}

/// Polls the provider and reconciles the answer
#[derive(Clone)]
pub struct PollChannel {
    store: Arc<dyn CallStore>,
    provider: Arc<dyn ProviderClient>,
}

impl PollChannel {
    pub fn new(store: Arc<dyn CallStore>, provider: Arc<dyn ProviderClient>) -> Self {
        Self { store, provider }
    }

    /// Fetch `call` from the provider and persist the reconciled result.
    ///
    /// Provider and store errors propagate.
    pub async fn sync_call(&self, call: &mut Call) -> Result<ChangeSet> {
        let provider_call_id = call
            .provider_id()
            .ok_or_else(|| CallError::invalid_operation("Call has no provider reference to sync"))?
            .to_string();

        let snapshot = self.provider.get_call(&provider_call_id).await?.into_snapshot();
        persist_snapshot(self.store.as_ref(), call, &snapshot).await
    }

    /// Best-effort refresh of an active call; failures leave `call` as it was.
    ///
    /// Returns `true` when the record changed.
    pub async fn sync_if_active(&self, call: &mut Call) -> bool {
        if !call.status.is_active() || call.provider_id().is_none() {
            return false;
        }

        match self.sync_call(call).await {
            Ok(changes) if !changes.is_empty() => {
                info!("Auto-synced call {} on fetch -> {}", call.id, call.status);
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!("Failed to auto-sync call {} on fetch: {}", call.id, e);
                false
            }
        }
    }

    /// Poll every call queued for longer than `threshold`.
    ///
    /// A provider failure skips that call; it stays eligible for the next run.
    pub async fn sweep_queued(&self, threshold: Duration) -> Result<SweepReport> {
        let cutoff = cutoff_before(Utc::now(), threshold)?;
        let queued = self.store.list_queued_for_sync(cutoff).await?;

        let mut report = SweepReport {
            examined: queued.len(),
            synced: 0,
        };

        for mut call in queued {
            let Some(provider_call_id) = call.provider_id().map(str::to_string) else {
                continue;
            };

            let snapshot = match self.provider.get_call(&provider_call_id).await {
                Ok(remote) => remote.into_snapshot(),
                Err(e) => {
                    error!("Failed to fetch provider data for queued call {}: {}", call.id, e);
                    continue;
                }
            };

            let changes = persist_snapshot(self.store.as_ref(), &mut call, &snapshot).await?;
            if changes.is_empty() {
                continue;
            }

            report.synced += 1;
            info!(
                "Synced stale-queued call {} -> {} (via provider poll)",
                call.id, call.status
            );
        }

        if report.examined > 0 {
            info!(
                "Queued sweep: {}/{} calls synced",
                report.synced, report.examined
            );
        }
        Ok(report)
    }
}
