//! Approval request state machine with validated transitions.
//!
//! Enforces the allowed transitions for an approval request:
//! Pending -> Approved/Rejected/Escalated/TimedOut/Cancelled
//! Escalated -> Approved/Rejected/TimedOut/Cancelled
//! Approved -> Executed

use crate::approval::ApprovalStatus;
use crate::error::ApprovalError;

/// Validate that a status transition is allowed.
pub fn validate_transition(from: ApprovalStatus, to: ApprovalStatus) -> Result<(), ApprovalError> {
    use crate::approval::ApprovalStatus::*;

    let valid = matches!(
        (from, to),
        (Pending, Approved)
            | (Pending, Rejected)
            | (Pending, Escalated)
            | (Pending, TimedOut)
            | (Pending, Cancelled)
            | (Escalated, Approved)
            | (Escalated, Rejected)
            | (Escalated, TimedOut)
            | (Escalated, Cancelled)
            | (Approved, Executed)
    );

    if valid {
        Ok(())
    } else {
        Err(ApprovalError::InvalidTransition(from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalStatus::*;

    const ALL: [ApprovalStatus; 7] = [
        Pending, Escalated, Approved, Rejected, TimedOut, Cancelled, Executed,
    ];

    #[test]
    fn test_open_states_can_resolve() {
        for from in [Pending, Escalated] {
            for to in [Approved, Rejected, TimedOut, Cancelled] {
                assert!(validate_transition(from, to).is_ok(), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_pending_to_escalated() {
        assert!(validate_transition(Pending, Escalated).is_ok());
    }

    #[test]
    fn test_escalated_to_escalated_invalid() {
        assert!(validate_transition(Escalated, Escalated).is_err());
    }

    #[test]
    fn test_approved_only_to_executed() {
        for to in ALL {
            let ok = validate_transition(Approved, to).is_ok();
            assert_eq!(ok, to == Executed, "approved -> {}", to);
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for from in [Rejected, TimedOut, Cancelled, Executed] {
            for to in ALL {
                assert!(validate_transition(from, to).is_err(), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_cannot_return_to_pending() {
        for from in ALL {
            assert!(validate_transition(from, Pending).is_err());
        }
    }

    #[test]
    fn test_error_carries_both_states() {
        let err = validate_transition(Rejected, Approved).unwrap_err();
        assert!(matches!(
            err,
            ApprovalError::InvalidTransition(Rejected, Approved)
        ));
    }
}
