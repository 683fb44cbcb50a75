//! Call status lattice
//!
//! The canonical set of call statuses and the total order used when deciding
//! whether a provider-reported status may replace the local one.
//!
//! ```text
//! pending(0) → queued(1) → initiated(2) → ringing(3) → in-progress(4)
//!                                                          │
//!        completed | failed | cancelled | no-answer | busy | voicemail  (10)
//! ```
//!
//! Every terminal status shares order 10, so any of them is reachable from
//! any non-terminal status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CallError;

/// Order value shared by every terminal status
pub const TERMINAL_ORDER: u8 = 10;

/// Lifecycle status of an outbound call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Pending,
    Queued,
    Initiated,
    Ringing,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    NoAnswer,
    Busy,
    Voicemail,
}

/// Non-terminal statuses, used for admission counting
pub const ACTIVE_STATUSES: [CallStatus; 5] = [
    CallStatus::Pending,
    CallStatus::Queued,
    CallStatus::Initiated,
    CallStatus::Ringing,
    CallStatus::InProgress,
];

/// Statuses from which no further transition is permitted
pub const TERMINAL_STATUSES: [CallStatus; 6] = [
    CallStatus::Completed,
    CallStatus::Failed,
    CallStatus::Cancelled,
    CallStatus::NoAnswer,
    CallStatus::Busy,
    CallStatus::Voicemail,
];

/// Statuses the stale sweeper may fail outright
pub const STALE_ELIGIBLE_STATUSES: [CallStatus; 2] = [CallStatus::Pending, CallStatus::Queued];

impl CallStatus {
    /// Position of this status in the lifecycle order
    pub const fn order(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Queued => 1,
            Self::Initiated => 2,
            Self::Ringing => 3,
            Self::InProgress => 4,
            Self::Completed
            | Self::Failed
            | Self::Cancelled
            | Self::NoAnswer
            | Self::Busy
            | Self::Voicemail => TERMINAL_ORDER,
        }
    }

    pub const fn is_terminal(self) -> bool {
        self.order() >= TERMINAL_ORDER
    }

    /// Active means non-terminal
    pub const fn is_active(self) -> bool {
        !self.is_terminal()
    }

    pub const fn is_stale_eligible(self) -> bool {
        matches!(self, Self::Pending | Self::Queued)
    }

    /// Wire and storage representation
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Initiated => "initiated",
            Self::Ringing => "ringing",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::NoAnswer => "no-answer",
            Self::Busy => "busy",
            Self::Voicemail => "voicemail",
        }
    }

    /// Every status, in lifecycle order
    pub fn all() -> impl Iterator<Item = CallStatus> {
        ACTIVE_STATUSES.into_iter().chain(TERMINAL_STATUSES)
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallStatus {
    type Err = CallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CallStatus::all()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CallError::internal(format!("Unknown call status: {}", s)))
    }
}
