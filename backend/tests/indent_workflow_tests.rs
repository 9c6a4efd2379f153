//! Requisition workflow tests
//!
//! Decision rules that run before anything is written:
//! - Only pending requisitions can be decided, and only once
//! - Approved quantities stay within what each line requested
//! - Demand is aggregated per item for the stock pre-check
//! - Line failures map to the reported failure kinds

use proptest::prelude::*;
use shared::{
    approved_demand_by_item, check_editable, check_rejection, resolve_approval, DecisionError,
    LineApproval, LineFailureKind, Quantity, RequisitionLine, RequisitionStatus,
};
use uuid::Uuid;

use RequisitionStatus::{Approved, Initiated, Partial, Pending, Rejected};

fn line(item: &str, requested: Quantity) -> RequisitionLine {
    RequisitionLine {
        id: Uuid::new_v4(),
        requisition_id: Uuid::nil(),
        position: 0,
        item: item.to_string(),
        requested_quantity: requested,
        approved_quantity: 0,
        remarks: None,
    }
}

fn approve(line: &RequisitionLine, quantity: Quantity) -> LineApproval {
    LineApproval {
        line_id: line.id,
        approved_quantity: quantity,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Requisition for 8 bolts, approved in full
    #[test]
    fn test_full_approval_of_single_line() {
        let bolts = line("bolt", 8);
        let (status, resolved) =
            resolve_approval(Pending, &[bolts.clone()], None, &[approve(&bolts, 8)]).unwrap();

        assert_eq!(status, Approved);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].approved, 8);
        assert_eq!(approved_demand_by_item(&resolved).get("bolt"), Some(&8));
    }

    #[test]
    fn test_reduced_quantity_infers_partial() {
        let bolts = line("bolt", 8);
        let nuts = line("nut", 4);
        let (status, resolved) = resolve_approval(
            Pending,
            &[bolts.clone(), nuts.clone()],
            None,
            &[approve(&bolts, 8), approve(&nuts, 2)],
        )
        .unwrap();

        assert_eq!(status, Partial);
        assert_eq!(resolved[1].approved, 2);
    }

    #[test]
    fn test_unlisted_lines_are_approved_at_zero() {
        let bolts = line("bolt", 8);
        let nuts = line("nut", 4);
        let (status, resolved) = resolve_approval(
            Pending,
            &[bolts.clone(), nuts.clone()],
            None,
            &[approve(&bolts, 8)],
        )
        .unwrap();

        assert_eq!(status, Partial);
        assert_eq!(resolved[1].approved, 0);
        let demand = approved_demand_by_item(&resolved);
        assert!(!demand.contains_key("nut"));
    }

    #[test]
    fn test_explicit_status_is_kept() {
        let bolts = line("bolt", 8);
        let (status, _) = resolve_approval(
            Pending,
            &[bolts.clone()],
            Some(Partial),
            &[approve(&bolts, 8)],
        )
        .unwrap();
        assert_eq!(status, Partial);
    }

    #[test]
    fn test_second_decision_is_refused() {
        let bolts = line("bolt", 8);
        for decided in [Approved, Partial, Rejected] {
            assert_eq!(
                resolve_approval(decided, &[bolts.clone()], None, &[approve(&bolts, 8)]),
                Err(DecisionError::NotPending(decided))
            );
            assert_eq!(check_rejection(decided), Err(DecisionError::NotPending(decided)));
        }
        assert!(check_rejection(Pending).is_ok());
    }

    #[test]
    fn test_non_decision_status_refused() {
        let bolts = line("bolt", 8);
        for target in [Pending, Rejected, Initiated] {
            assert_eq!(
                resolve_approval(Pending, &[bolts.clone()], Some(target), &[]),
                Err(DecisionError::NotADecision(target))
            );
        }
    }

    #[test]
    fn test_approval_above_request_refused() {
        let bolts = line("bolt", 8);
        assert_eq!(
            resolve_approval(Pending, &[bolts.clone()], None, &[approve(&bolts, 9)]),
            Err(DecisionError::ApprovedExceedsRequested {
                line_id: bolts.id,
                requested: 8,
                approved: 9,
            })
        );
    }

    #[test]
    fn test_foreign_and_duplicate_lines_refused() {
        let bolts = line("bolt", 8);
        let stranger = line("bolt", 1);

        assert_eq!(
            resolve_approval(Pending, &[bolts.clone()], None, &[approve(&stranger, 1)]),
            Err(DecisionError::UnknownLine(stranger.id))
        );
        assert_eq!(
            resolve_approval(
                Pending,
                &[bolts.clone()],
                None,
                &[approve(&bolts, 1), approve(&bolts, 2)]
            ),
            Err(DecisionError::DuplicateLine(bolts.id))
        );
    }

    #[test]
    fn test_lines_locked_after_decision() {
        assert!(check_editable(Pending).is_ok());
        assert_eq!(check_editable(Approved), Err(DecisionError::LinesLocked(Approved)));
    }

    #[test]
    fn test_demand_aggregates_repeated_items() {
        let first = line("bolt", 5);
        let second = line("bolt", 7);
        let (_, resolved) = resolve_approval(
            Pending,
            &[first.clone(), second.clone()],
            None,
            &[approve(&first, 5), approve(&second, 6)],
        )
        .unwrap();

        assert_eq!(approved_demand_by_item(&resolved).get("bolt"), Some(&11));
    }

    #[test]
    fn test_failure_kinds_retryability() {
        assert!(!LineFailureKind::InsufficientStock.is_retryable());
        assert!(LineFailureKind::Conflict.is_retryable());
        assert!(LineFailureKind::Storage.is_retryable());
    }

    #[test]
    fn test_status_text_round_trip() {
        for status in [Initiated, Pending, Approved, Rejected, Partial] {
            assert_eq!(RequisitionStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(RequisitionStatus::from_str("cancelled"), None);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Any approval within the requested quantities resolves, and the
        /// inferred status is `approved` exactly when nothing was cut
        #[test]
        fn prop_inferred_status_matches_quantities(
            pairs in prop::collection::vec((1i64..=100i64, 0u32..=100u32), 1..10)
        ) {
            let lines: Vec<RequisitionLine> =
                pairs.iter().map(|(req, _)| line("bolt", *req)).collect();
            let approvals: Vec<LineApproval> = lines
                .iter()
                .zip(&pairs)
                .map(|(l, (req, pct))| approve(l, req * *pct as i64 / 100))
                .collect();

            let (status, resolved) = resolve_approval(Pending, &lines, None, &approvals).unwrap();

            let all_full = resolved.iter().all(|r| r.approved == r.requested);
            prop_assert_eq!(status == Approved, all_full);
            prop_assert_eq!(status == Partial, !all_full);

            let demand: Quantity = approved_demand_by_item(&resolved).values().sum();
            let approved: Quantity = approvals.iter().map(|a| a.approved_quantity).sum();
            prop_assert_eq!(demand, approved);
        }

        /// Nothing but `pending` may be decided
        #[test]
        fn prop_only_pending_transitions(
            current in prop_oneof![
                Just(Initiated), Just(Pending), Just(Approved), Just(Rejected), Just(Partial)
            ],
            next in prop_oneof![
                Just(Initiated), Just(Pending), Just(Approved), Just(Rejected), Just(Partial)
            ]
        ) {
            let allowed = current.can_transition_to(next);
            prop_assert_eq!(allowed, current == Pending && next.is_decided());
        }
    }
}
