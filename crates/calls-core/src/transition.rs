//! State transition guard
//!
//! The provider gives no sequence numbers, so monotonicity under the status
//! lattice is the only ordering mechanism: a candidate status is accepted when
//! it is terminal or does not move backwards.

use crate::status::{CallStatus, TERMINAL_ORDER};

/// Whether `candidate` may replace `current`
pub fn is_valid_transition(current: CallStatus, candidate: CallStatus) -> bool {
    candidate.order() >= TERMINAL_ORDER || candidate.order() >= current.order()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhaustive_pairs() {
        for current in CallStatus::all() {
            for candidate in CallStatus::all() {
                let expected =
                    candidate.order() == TERMINAL_ORDER || candidate.order() >= current.order();
                assert_eq!(
                    is_valid_transition(current, candidate),
                    expected,
                    "{} -> {}",
                    current,
                    candidate
                );
            }
        }
    }

    #[test]
    fn test_out_of_order_rejected() {
        assert!(!is_valid_transition(CallStatus::InProgress, CallStatus::Queued));
        assert!(!is_valid_transition(CallStatus::Ringing, CallStatus::Initiated));
        assert!(!is_valid_transition(CallStatus::Completed, CallStatus::InProgress));
    }

    #[test]
    fn test_forward_equal_and_terminal_accepted() {
        assert!(is_valid_transition(CallStatus::Queued, CallStatus::Ringing));
        assert!(is_valid_transition(CallStatus::Ringing, CallStatus::Ringing));
        assert!(is_valid_transition(CallStatus::Pending, CallStatus::Voicemail));
        assert!(is_valid_transition(CallStatus::Cancelled, CallStatus::Failed));
    }
}
