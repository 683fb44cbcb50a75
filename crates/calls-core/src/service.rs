//! Call lifecycle service
//!
//! [`CallService`] is the entry point for everything outside the push
//! boundary: placing, reading, syncing and cancelling calls, plus the
//! periodic maintenance pass.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{error, info};

use crate::admission::AdmissionGate;
use crate::config::LimitsConfig;
use crate::directory::ContactDirectory;
use crate::ingest::{PollChannel, PushChannel};
use crate::provider::{OutboundCallRequest, ProviderClient};
use crate::status::CallStatus;
use crate::store::CallStore;
use crate::sweeper::StaleSweeper;
use crate::types::{Call, CallScript, CreateCallRequest};
use crate::{CallError, Result};

/// Metadata keys added to every outbound call
pub const META_INTERNAL_CALL_ID: &str = "internalCallId";
pub const META_CONTACT_ID: &str = "contactId";
pub const META_USER_ID: &str = "userId";

/// Counts from one maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Queued calls polled from the provider
    pub examined: usize,
    /// Polled calls whose record changed
    pub synced: usize,
    /// Calls failed by the stale sweep
    pub failed: u64,
}

/// Call lifecycle operations
#[derive(Clone)]
pub struct CallService {
    store: Arc<dyn CallStore>,
    directory: Arc<dyn ContactDirectory>,
    provider: Arc<dyn ProviderClient>,
    admission: AdmissionGate,
    poll: PollChannel,
    push: PushChannel,
    sweeper: StaleSweeper,
    queued_sync_after: Duration,
}

impl CallService {
    pub fn new(
        store: Arc<dyn CallStore>,
        directory: Arc<dyn ContactDirectory>,
        provider: Arc<dyn ProviderClient>,
        limits: &LimitsConfig,
    ) -> Self {
        Self {
            admission: AdmissionGate::new(store.clone(), limits.max_active_calls),
            poll: PollChannel::new(store.clone(), provider.clone()),
            push: PushChannel::new(store.clone()),
            sweeper: StaleSweeper::new(store.clone(), limits.stale_call_threshold()),
            queued_sync_after: limits.stale_queued_sync(),
            store,
            directory,
            provider,
        }
    }

    /// Webhook entry point sharing this service's store
    pub fn push_channel(&self) -> &PushChannel {
        &self.push
    }

    pub fn store(&self) -> &Arc<dyn CallStore> {
        &self.store
    }

    /// Place a new outbound call.
    ///
    /// The call is persisted as `pending` before the provider is asked. If the
    /// provider refuses, the record is marked `failed` with the error text and
    /// the error is returned.
    pub async fn create_call(&self, owner_id: &str, request: CreateCallRequest) -> Result<Call> {
        self.admission.check(owner_id).await?;

        let contact = self
            .directory
            .get_contact(owner_id, &request.contact_id)
            .await?
            .ok_or_else(|| CallError::contact_not_found(&request.contact_id))?;

        let script = match request.script_id.as_deref().filter(|id| !id.is_empty()) {
            Some(script_id) => Some(
                self.directory
                    .get_script(owner_id, script_id)
                    .await?
                    .ok_or_else(|| CallError::script_not_found(script_id))?,
            ),
            None => None,
        };

        let mut call = Call::pending(owner_id, &contact.id, &request.assistant_id);
        call.script_id = script.as_ref().map(|s| s.id.clone());
        call.phone_line_id = request.phone_line_id.clone();
        call.metadata = request.metadata.clone();
        self.store.insert_call(&call).await?;

        let outbound = outbound_request(&call, &request, script.as_ref(), &contact.phone, &contact.name);

        let provider_call_id = match self.provider.create_call(&outbound).await {
            Ok(remote) => match remote.call_id() {
                Some(id) => id.to_string(),
                None => {
                    let err = CallError::provider(None, "Provider response carried no call id");
                    return Err(self.fail_creation(&mut call, err).await);
                }
            },
            Err(err) => return Err(self.fail_creation(&mut call, err).await),
        };

        self.store
            .link_provider(&call.id, &provider_call_id, CallStatus::Queued)
            .await?;
        call.provider_call_id = Some(provider_call_id);
        call.status = CallStatus::Queued;
        call.updated_at = Utc::now();

        info!(
            "Call {} queued with provider as {}",
            call.id,
            call.provider_id().unwrap_or_default()
        );
        Ok(call)
    }

    async fn fail_creation(&self, call: &mut Call, err: CallError) -> CallError {
        let message = err.to_string();
        if let Err(store_err) = self.store.mark_failed(&call.id, &message).await {
            error!("Failed to record creation failure for call {}: {}", call.id, store_err);
        }
        call.status = CallStatus::Failed;
        call.error_message = Some(message);
        call.updated_at = Utc::now();
        error!("Provider rejected call {}: {}", call.id, err);
        err
    }

    /// Fetch a call, refreshing it from the provider first if it is still active.
    ///
    /// A failed refresh is logged and the stored record is returned as is.
    pub async fn get_call(&self, owner_id: &str, call_id: &str) -> Result<Call> {
        let mut call = self.load(owner_id, call_id).await?;
        self.poll.sync_if_active(&mut call).await;
        Ok(call)
    }

    /// Poll the provider for `call_id` now; provider errors propagate
    pub async fn sync_call(&self, owner_id: &str, call_id: &str) -> Result<Call> {
        let mut call = self.load(owner_id, call_id).await?;
        let changes = self.poll.sync_call(&mut call).await?;
        if !changes.is_empty() {
            info!("Synced call {} with provider -> {}", call.id, call.status);
        }
        Ok(call)
    }

    /// Hang up a live call.
    ///
    /// The local record becomes `cancelled` as soon as the provider accepts
    /// the stop request; later provider events cannot move it again.
    pub async fn cancel_call(&self, owner_id: &str, call_id: &str) -> Result<Call> {
        let mut call = self.get_call(owner_id, call_id).await?;

        if call.status.is_terminal() {
            return Err(CallError::invalid_operation(
                "Cannot cancel a call that is already completed, failed, or cancelled",
            ));
        }
        let Some(provider_call_id) = call.provider_id().map(str::to_string) else {
            return Err(CallError::invalid_operation(
                "Call has no provider reference to cancel",
            ));
        };

        self.provider.stop_call(&provider_call_id).await?;
        self.store.set_status(&call.id, CallStatus::Cancelled).await?;
        call.status = CallStatus::Cancelled;
        call.updated_at = Utc::now();

        info!("Call {} cancelled", call.id);
        Ok(call)
    }

    /// Number of non-terminal calls held by `owner_id`
    pub async fn active_call_count(&self, owner_id: &str) -> Result<u64> {
        self.store.count_active_calls(owner_id).await
    }

    /// Poll long-queued calls, then fail whatever is still stale
    pub async fn run_maintenance(&self) -> Result<MaintenanceReport> {
        let sweep = self.poll.sweep_queued(self.queued_sync_after).await?;
        let failed = self.sweeper.sweep().await?;

        Ok(MaintenanceReport {
            examined: sweep.examined,
            synced: sweep.synced,
            failed,
        })
    }

    async fn load(&self, owner_id: &str, call_id: &str) -> Result<Call> {
        self.store
            .get_call(owner_id, call_id)
            .await?
            .ok_or_else(|| CallError::call_not_found(call_id))
    }
}

/// Request values win over script values; empty values count as absent
fn outbound_request(
    call: &Call,
    request: &CreateCallRequest,
    script: Option<&CallScript>,
    customer_number: &str,
    customer_name: &str,
) -> OutboundCallRequest {
    let pick = |own: &Option<String>, fallback: Option<&Option<String>>| {
        own.clone()
            .filter(|v| !v.is_empty())
            .or_else(|| fallback.and_then(|f| f.clone()).filter(|v| !v.is_empty()))
    };

    let call_goals = if request.call_goals.is_empty() {
        script.map(|s| s.call_goals.clone()).unwrap_or_default()
    } else {
        request.call_goals.clone()
    };

    let mut metadata = request.metadata.clone();
    metadata.insert(META_INTERNAL_CALL_ID.into(), Value::String(call.id.clone()));
    metadata.insert(META_CONTACT_ID.into(), Value::String(call.contact_id.clone()));
    metadata.insert(META_USER_ID.into(), Value::String(call.owner_id.clone()));

    OutboundCallRequest {
        assistant_id: call.assistant_id.clone(),
        phone_line_id: call.phone_line_id.clone(),
        customer_number: customer_number.to_string(),
        customer_name: Some(customer_name.to_string()).filter(|n| !n.is_empty()),
        custom_prompt: pick(&request.custom_prompt, script.map(|s| &s.custom_prompt)),
        first_message: pick(&request.first_message, script.map(|s| &s.first_message)),
        call_goals,
        metadata,
    }
}
