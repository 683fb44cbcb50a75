//! Admission gate
//!
//! Caps how many non-terminal calls one owner may hold. The count and the
//! subsequent insert are not atomic, so concurrent creations for the same
//! owner can overshoot the cap slightly.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::store::CallStore;
use crate::{CallError, Result};

/// Rejects call creation once an owner holds `max_active` active calls
#[derive(Clone)]
pub struct AdmissionGate {
    store: Arc<dyn CallStore>,
    max_active: u32,
}

impl AdmissionGate {
    pub fn new(store: Arc<dyn CallStore>, max_active: u32) -> Self {
        Self { store, max_active }
    }

    pub fn max_active(&self) -> u32 {
        self.max_active
    }

    /// `Ok` if `owner_id` may place another call
    pub async fn check(&self, owner_id: &str) -> Result<()> {
        let active = self.store.count_active_calls(owner_id).await?;
        if active >= u64::from(self.max_active) {
            warn!(
                "Owner {} holds {}/{} active calls - rejecting new call",
                owner_id, active, self.max_active
            );
            return Err(CallError::AdmissionDenied {
                active,
                max: self.max_active,
            });
        }
        debug!("Owner {} admitted ({}/{} active)", owner_id, active, self.max_active);
        Ok(())
    }
}
