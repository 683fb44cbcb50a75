//! Stale call sweeper
//!
//! Backstop for calls that never produced any provider signal: anything still
//! `pending` or `queued` past the hard threshold is failed in bulk, without
//! asking the provider.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::store::CallStore;
use crate::{CallError, Result};

/// Error message recorded on calls failed by the sweeper
pub const STALE_CALL_MESSAGE: &str = "Call timed out - no response from provider";

/// Instant `threshold` before `now`
pub fn cutoff_before(now: DateTime<Utc>, threshold: Duration) -> Result<DateTime<Utc>> {
    let threshold = chrono::Duration::from_std(threshold)
        .map_err(|e| CallError::config(format!("Threshold out of range: {}", e)))?;
    now.checked_sub_signed(threshold)
        .ok_or_else(|| CallError::config("Threshold reaches before the epoch"))
}

/// Fails calls stuck in a stale-eligible status
#[derive(Clone)]
pub struct StaleSweeper {
    store: Arc<dyn CallStore>,
    threshold: Duration,
}

impl StaleSweeper {
    pub fn new(store: Arc<dyn CallStore>, threshold: Duration) -> Self {
        Self { store, threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Fail every stale call; returns how many were failed
    pub async fn sweep(&self) -> Result<u64> {
        let cutoff = cutoff_before(Utc::now(), self.threshold)?;
        let failed = self.store.fail_stale_calls(cutoff, STALE_CALL_MESSAGE).await?;
        if failed > 0 {
            warn!("Marked {} stale call(s) as failed", failed);
        } else {
            debug!("No stale calls older than {:?}", self.threshold);
        }
        Ok(failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cutoff_before() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 10, 0).unwrap();
        assert_eq!(
            cutoff_before(now, Duration::from_secs(600)).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
        );
    }
}
