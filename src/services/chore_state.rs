//! Lifecycle of an external chore request.
//!
//! ```text
//! awaiting_parent --approve--> approved --complete--> completed
//!        |
//!        +--------reject-----> rejected
//! ```
//!
//! `completed` and `rejected` are terminal. Once approved, a request can only
//! move forward to `completed`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::error::EscrowError;
use crate::models::{ApprovalDecision, ChoreStatus, ExternalChoreRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoreAction {
    Approve,
    Reject,
    Complete,
    Settle,
}

impl fmt::Display for ChoreAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChoreAction::Approve => "approve",
            ChoreAction::Reject => "reject",
            ChoreAction::Complete => "complete",
            ChoreAction::Settle => "settle",
        };
        f.write_str(s)
    }
}

/// Returns the state `action` leads to from `from`, or `InvalidStateTransition`.
///
/// `Settle` is accepted on completed requests and leaves them completed.
pub fn next_status(from: ChoreStatus, action: ChoreAction) -> Result<ChoreStatus, EscrowError> {
    match (from, action) {
        (ChoreStatus::AwaitingParent, ChoreAction::Approve) => Ok(ChoreStatus::Approved),
        (ChoreStatus::AwaitingParent, ChoreAction::Reject) => Ok(ChoreStatus::Rejected),
        (ChoreStatus::Approved, ChoreAction::Complete) => Ok(ChoreStatus::Completed),
        (ChoreStatus::Completed, ChoreAction::Settle) => Ok(ChoreStatus::Completed),
        (from, action) => Err(EscrowError::InvalidStateTransition { from, action }),
    }
}

/// Moves the request to `approved` and records the authoritative amount.
///
/// Returns `Modified` when the amount differs from what was offered.
pub fn approve(
    request: &mut ExternalChoreRequest,
    approved_amount_cents: i64,
) -> Result<ApprovalDecision, EscrowError> {
    request.status = next_status(request.status, ChoreAction::Approve)?;
    request.approved_amount_cents = Some(approved_amount_cents);

    if approved_amount_cents == request.offered_amount_cents {
        Ok(ApprovalDecision::Approved)
    } else {
        Ok(ApprovalDecision::Modified)
    }
}

pub fn reject(request: &mut ExternalChoreRequest) -> Result<(), EscrowError> {
    request.status = next_status(request.status, ChoreAction::Reject)?;
    Ok(())
}

/// Records that the work was done. Moves no money.
pub fn complete(
    request: &mut ExternalChoreRequest,
    evidence_url: String,
    completed_at: DateTime<Utc>,
) -> Result<(), EscrowError> {
    if evidence_url.trim().is_empty() {
        return Err(EscrowError::Validation(
            "Evidence is required to complete a request".to_string(),
        ));
    }

    request.status = next_status(request.status, ChoreAction::Complete)?;
    request.evidence_url = Some(evidence_url);
    request.completed_at = Some(completed_at);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentMode;
    use uuid::Uuid;

    fn request(status: ChoreStatus) -> ExternalChoreRequest {
        let now = Utc::now();
        ExternalChoreRequest {
            id: Uuid::new_v4(),
            family_id: Uuid::new_v4(),
            child_id: Uuid::new_v4(),
            contact_id: None,
            title: "Rake leaves".to_string(),
            offered_amount_cents: 1500,
            approved_amount_cents: None,
            payment_mode: PaymentMode::InApp,
            status,
            evidence_url: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_only_documented_transitions_are_legal() {
        use ChoreAction::*;
        use ChoreStatus::*;

        let legal = [
            (AwaitingParent, Approve, Approved),
            (AwaitingParent, Reject, Rejected),
            (Approved, Complete, Completed),
            (Completed, Settle, Completed),
        ];

        for from in [AwaitingParent, Approved, Completed, Rejected] {
            for action in [Approve, Reject, Complete, Settle] {
                let expected = legal
                    .iter()
                    .find(|(f, a, _)| *f == from && *a == action)
                    .map(|(_, _, to)| *to);

                match (next_status(from, action), expected) {
                    (Ok(to), Some(want)) => assert_eq!(to, want),
                    (Err(EscrowError::InvalidStateTransition { .. }), None) => {}
                    (got, want) => panic!("{:?} + {:?}: got {:?}, want {:?}", from, action, got, want),
                }
            }
        }
    }

    #[test]
    fn test_approve_records_decision_kind() {
        let mut same = request(ChoreStatus::AwaitingParent);
        assert_eq!(approve(&mut same, 1500).unwrap(), ApprovalDecision::Approved);
        assert_eq!(same.status, ChoreStatus::Approved);
        assert_eq!(same.approved_amount_cents, Some(1500));

        let mut lower = request(ChoreStatus::AwaitingParent);
        assert_eq!(approve(&mut lower, 1000).unwrap(), ApprovalDecision::Modified);

        // Parents may reward more than was offered
        let mut higher = request(ChoreStatus::AwaitingParent);
        assert_eq!(approve(&mut higher, 2000).unwrap(), ApprovalDecision::Modified);
        assert_eq!(higher.offered_amount_cents, 1500);
    }

    #[test]
    fn test_reject_after_approval_changes_nothing() {
        let mut req = request(ChoreStatus::Approved);
        req.approved_amount_cents = Some(1500);

        let err = reject(&mut req).unwrap_err();
        assert!(matches!(
            err,
            EscrowError::InvalidStateTransition {
                from: ChoreStatus::Approved,
                action: ChoreAction::Reject
            }
        ));
        assert_eq!(req.status, ChoreStatus::Approved);
    }

    #[test]
    fn test_complete_requires_evidence_and_approval() {
        let mut req = request(ChoreStatus::Approved);
        assert!(matches!(
            complete(&mut req, "  ".to_string(), Utc::now()),
            Err(EscrowError::Validation(_))
        ));
        assert_eq!(req.status, ChoreStatus::Approved);

        let mut pending = request(ChoreStatus::AwaitingParent);
        assert!(complete(&mut pending, "https://x/y.jpg".to_string(), Utc::now()).is_err());
        assert!(pending.evidence_url.is_none());

        complete(&mut req, "https://x/y.jpg".to_string(), Utc::now()).unwrap();
        assert_eq!(req.status, ChoreStatus::Completed);
        assert_eq!(req.evidence_url.as_deref(), Some("https://x/y.jpg"));
        assert!(req.completed_at.is_some());
    }
}
