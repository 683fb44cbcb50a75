//! In-memory call store

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::CallStore;
use crate::changeset::ChangeSet;
use crate::status::CallStatus;
use crate::types::Call;
use crate::{CallError, Result};

/// Call store backed by a map, for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct MemoryCallStore {
    calls: Arc<RwLock<HashMap<String, Call>>>,
}

impl MemoryCallStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored call, in no particular order
    pub async fn all_calls(&self) -> Vec<Call> {
        self.calls.read().await.values().cloned().collect()
    }

    /// Fetch a call without the owner check
    pub async fn get_any(&self, call_id: &str) -> Option<Call> {
        self.calls.read().await.get(call_id).cloned()
    }
}

fn provider_id_taken(calls: &HashMap<String, Call>, call_id: &str, provider_call_id: &str) -> bool {
    calls
        .values()
        .any(|c| c.id != call_id && c.provider_call_id.as_deref() == Some(provider_call_id))
}

#[async_trait]
impl CallStore for MemoryCallStore {
    async fn insert_call(&self, call: &Call) -> Result<()> {
        let mut calls = self.calls.write().await;
        if calls.contains_key(&call.id) {
            return Err(CallError::internal(format!("Call {} already exists", call.id)));
        }
        if let Some(provider_id) = call.provider_id() {
            if provider_id_taken(&calls, &call.id, provider_id) {
                return Err(CallError::internal(format!(
                    "Provider call id {} already linked",
                    provider_id
                )));
            }
        }
        calls.insert(call.id.clone(), call.clone());
        Ok(())
    }

    async fn get_call(&self, owner_id: &str, call_id: &str) -> Result<Option<Call>> {
        let calls = self.calls.read().await;
        Ok(calls.get(call_id).filter(|c| c.owner_id == owner_id).cloned())
    }

    async fn find_by_provider_call_id(&self, provider_call_id: &str) -> Result<Option<Call>> {
        let calls = self.calls.read().await;
        Ok(calls
            .values()
            .find(|c| c.provider_call_id.as_deref() == Some(provider_call_id))
            .cloned())
    }

    async fn apply_changes(
        &self,
        call_id: &str,
        changes: &ChangeSet,
        updated_at: DateTime<Utc>,
    ) -> Result<Call> {
        let mut calls = self.calls.write().await;
        let call = calls
            .get_mut(call_id)
            .ok_or_else(|| CallError::call_not_found(call_id))?;
        changes.guarded_by(call).apply_to(call, updated_at);
        Ok(call.clone())
    }

    async fn link_provider(
        &self,
        call_id: &str,
        provider_call_id: &str,
        status: CallStatus,
    ) -> Result<()> {
        let mut calls = self.calls.write().await;
        if provider_id_taken(&calls, call_id, provider_call_id) {
            return Err(CallError::internal(format!(
                "Provider call id {} already linked",
                provider_call_id
            )));
        }
        let call = calls
            .get_mut(call_id)
            .ok_or_else(|| CallError::call_not_found(call_id))?;
        call.provider_call_id = Some(provider_call_id.to_string());
        call.status = status;
        call.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_failed(&self, call_id: &str, error_message: &str) -> Result<()> {
        let mut calls = self.calls.write().await;
        let call = calls
            .get_mut(call_id)
            .ok_or_else(|| CallError::call_not_found(call_id))?;
        call.status = CallStatus::Failed;
        call.error_message = Some(error_message.to_string());
        call.updated_at = Utc::now();
        Ok(())
    }

    async fn set_status(&self, call_id: &str, status: CallStatus) -> Result<()> {
        let mut calls = self.calls.write().await;
        let call = calls
            .get_mut(call_id)
            .ok_or_else(|| CallError::call_not_found(call_id))?;
        call.status = status;
        call.updated_at = Utc::now();
        Ok(())
    }

    async fn count_active_calls(&self, owner_id: &str) -> Result<u64> {
        let calls = self.calls.read().await;
        Ok(calls
            .values()
            .filter(|c| c.owner_id == owner_id && c.status.is_active())
            .count() as u64)
    }

    async fn list_queued_for_sync(&self, cutoff: DateTime<Utc>) -> Result<Vec<Call>> {
        let calls = self.calls.read().await;
        let mut queued: Vec<Call> = calls
            .values()
            .filter(|c| {
                c.status == CallStatus::Queued && c.created_at < cutoff && c.provider_id().is_some()
            })
            .cloned()
            .collect();
        queued.sort_by_key(|c| c.created_at);
        Ok(queued)
    }

    async fn fail_stale_calls(&self, cutoff: DateTime<Utc>, error_message: &str) -> Result<u64> {
        let mut calls = self.calls.write().await;
        let now = Utc::now();
        let mut failed = 0;
        for call in calls
            .values_mut()
            .filter(|c| c.status.is_stale_eligible() && c.created_at < cutoff)
        {
            call.status = CallStatus::Failed;
            call.error_message = Some(error_message.to_string());
            call.updated_at = now;
            failed += 1;
        }
        Ok(failed)
    }
}
