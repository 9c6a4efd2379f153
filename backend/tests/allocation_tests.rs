//! FIFO allocation tests
//!
//! Properties of the allocator and the lot ledger:
//! - A successful plan takes exactly the requested quantity
//! - Older lots are drained before any newer lot is touched
//! - No plan entry exceeds what its lot holds
//! - Short requests produce no plan and change nothing
//! - Committing a plan then re-purchasing restores the total
//! - A stale plan never overdraws a lot

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{allocate, AllocationError, LedgerError, Lot, LotLedger, Quantity};
use uuid::Uuid;

fn lot(item: &str, quantity: Quantity, day: i64) -> Lot {
    let acquired_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day);
    Lot {
        id: Uuid::new_v4(),
        item: item.to_string(),
        original_quantity: quantity,
        remaining_quantity: quantity,
        rate: Decimal::new(250, 2),
        supplier: None,
        reference: None,
        acquired_at,
        created_at: acquired_at,
    }
}

fn ledger_of(quantities: &[Quantity]) -> LotLedger {
    LotLedger::new(
        "bolt",
        quantities
            .iter()
            .enumerate()
            .map(|(day, q)| lot("bolt", *q, day as i64)),
    )
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Two bolt lots of 5 and 10, issue 8
    #[test]
    fn test_issue_spans_two_lots() {
        let first = lot("bolt", 5, 0);
        let second = lot("bolt", 10, 1);
        let mut ledger = LotLedger::new("bolt", vec![second.clone(), first.clone()]);

        let plan = allocate(&ledger, 8).unwrap();
        let draws: Vec<(Uuid, Quantity)> =
            plan.entries.iter().map(|e| (e.lot_id, e.quantity)).collect();
        assert_eq!(draws, vec![(first.id, 5), (second.id, 3)]);

        ledger.apply(&plan).unwrap();
        assert_eq!(ledger.lot(first.id).unwrap().remaining_quantity, 0);
        assert_eq!(ledger.lot(second.id).unwrap().remaining_quantity, 7);
        assert_eq!(ledger.total_available(), 7);
    }

    /// Issue 20 against 15 on hand
    #[test]
    fn test_short_request_reports_shortfall() {
        let ledger = ledger_of(&[5, 10]);

        match allocate(&ledger, 20) {
            Err(AllocationError::InsufficientStock(shortfall)) => {
                assert_eq!(shortfall.item, "bolt");
                assert_eq!(shortfall.requested, 20);
                assert_eq!(shortfall.available, 15);
            }
            other => panic!("expected insufficient stock, got {:?}", other),
        }
        assert_eq!(ledger.total_available(), 15);
    }

    #[test]
    fn test_unknown_item_has_nothing_available() {
        let ledger = LotLedger::new("washer", vec![lot("bolt", 5, 0)]);
        assert_eq!(ledger.total_available(), 0);
        assert!(matches!(
            allocate(&ledger, 1),
            Err(AllocationError::InsufficientStock(_))
        ));
    }

    #[test]
    fn test_zero_and_negative_requests_rejected() {
        let ledger = ledger_of(&[5]);
        assert_eq!(allocate(&ledger, 0), Err(AllocationError::InvalidQuantity(0)));
        assert_eq!(allocate(&ledger, -4), Err(AllocationError::InvalidQuantity(-4)));
    }

    #[test]
    fn test_drained_lots_are_skipped() {
        let mut drained = lot("bolt", 5, 0);
        drained.remaining_quantity = 0;
        let live = lot("bolt", 3, 1);
        let ledger = LotLedger::new("bolt", vec![drained, live.clone()]);

        let plan = allocate(&ledger, 2).unwrap();
        assert_eq!(plan.lot_count(), 1);
        assert_eq!(plan.entries[0].lot_id, live.id);
    }

    /// Two commits planned from the same snapshot: the second must not
    /// overdraw once the first has landed
    #[test]
    fn test_competing_plans_do_not_overdraw() {
        let only = lot("bolt", 5, 0);
        let mut ledger = LotLedger::new("bolt", vec![only.clone()]);

        let first = allocate(&ledger, 4).unwrap();
        let second = allocate(&ledger, 4).unwrap();

        ledger.apply(&first).unwrap();
        let err = ledger.apply(&second).unwrap_err();
        assert_eq!(
            err,
            LedgerError::Conflict {
                lot_id: only.id,
                planned: 4,
                remaining: 1,
            }
        );
        assert_eq!(ledger.lot(only.id).unwrap().remaining_quantity, 1);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    /// Lot sizes between 1 and 50 units, up to 8 lots
    fn lots_strategy() -> impl Strategy<Value = Vec<Quantity>> {
        prop::collection::vec(1i64..=50i64, 1..8)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// A successful plan sums to the request and never exceeds a lot
        #[test]
        fn prop_plan_takes_exactly_requested(
            quantities in lots_strategy(),
            fraction in 1u32..=100u32
        ) {
            let ledger = ledger_of(&quantities);
            let total = ledger.total_available();
            let requested = ((total * fraction as i64) / 100).max(1);

            let plan = allocate(&ledger, requested).unwrap();
            prop_assert_eq!(plan.total(), requested);

            for entry in &plan.entries {
                let lot = ledger.lot(entry.lot_id).unwrap();
                prop_assert!(entry.quantity > 0);
                prop_assert!(entry.quantity <= lot.remaining_quantity);
            }
        }

        /// Every lot before the last one drawn is taken in full
        #[test]
        fn prop_oldest_lots_drain_first(
            quantities in lots_strategy(),
            fraction in 1u32..=100u32
        ) {
            let ledger = ledger_of(&quantities);
            let requested = ((ledger.total_available() * fraction as i64) / 100).max(1);
            let plan = allocate(&ledger, requested).unwrap();

            let order: Vec<Uuid> = ledger.available_lots().map(|l| l.id).collect();
            let drawn: Vec<Uuid> = plan.entries.iter().map(|e| e.lot_id).collect();
            prop_assert_eq!(&order[..drawn.len()], &drawn[..]);

            let (last, earlier) = plan.entries.split_last().unwrap();
            for entry in earlier {
                let lot = ledger.lot(entry.lot_id).unwrap();
                prop_assert_eq!(entry.quantity, lot.remaining_quantity);
            }
            prop_assert!(last.quantity <= ledger.lot(last.lot_id).unwrap().remaining_quantity);
        }

        /// Requests above the total fail and leave the ledger untouched
        #[test]
        fn prop_short_request_changes_nothing(
            quantities in lots_strategy(),
            excess in 1i64..=100i64
        ) {
            let ledger = ledger_of(&quantities);
            let before = ledger.clone();
            let total = ledger.total_available();

            let result = allocate(&ledger, total + excess);
            match result {
                Err(AllocationError::InsufficientStock(shortfall)) => {
                    prop_assert_eq!(shortfall.available, total);
                    prop_assert_eq!(shortfall.requested, total + excess);
                }
                other => prop_assert!(false, "expected shortfall, got {:?}", other),
            }
            prop_assert_eq!(ledger, before);
        }

        /// Planning twice without committing yields the same plan
        #[test]
        fn prop_planning_is_read_only(
            quantities in lots_strategy(),
            fraction in 1u32..=100u32
        ) {
            let ledger = ledger_of(&quantities);
            let requested = ((ledger.total_available() * fraction as i64) / 100).max(1);

            let first = allocate(&ledger, requested).unwrap();
            let second = allocate(&ledger, requested).unwrap();
            prop_assert_eq!(first, second);
        }

        /// Committing q then purchasing q restores the total
        #[test]
        fn prop_issue_then_purchase_restores_total(
            quantities in lots_strategy(),
            fraction in 1u32..=100u32
        ) {
            let mut ledger = ledger_of(&quantities);
            let total = ledger.total_available();
            let requested = ((total * fraction as i64) / 100).max(1);

            let plan = allocate(&ledger, requested).unwrap();
            ledger.apply(&plan).unwrap();
            prop_assert_eq!(ledger.total_available(), total - requested);

            ledger.record_purchase(lot("bolt", requested, 365));
            prop_assert_eq!(ledger.total_available(), total);
        }

        /// Two plans from one snapshot: applying both never drives a lot negative
        #[test]
        fn prop_stale_plans_never_overdraw(
            quantities in lots_strategy(),
            a in 1u32..=100u32,
            b in 1u32..=100u32
        ) {
            let mut ledger = ledger_of(&quantities);
            let total = ledger.total_available();
            let first = allocate(&ledger, ((total * a as i64) / 100).max(1)).unwrap();
            let second = allocate(&ledger, ((total * b as i64) / 100).max(1)).unwrap();

            ledger.apply(&first).unwrap();
            let before_second = ledger.clone();
            if ledger.apply(&second).is_err() {
                prop_assert_eq!(&ledger, &before_second);
            }
            for lot in ledger.lots() {
                prop_assert!(lot.remaining_quantity >= 0);
            }
        }
    }
}
