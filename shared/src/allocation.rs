//! FIFO stock allocation
//!
//! Walks a ledger's available lots oldest first and takes
//! `min(still needed, lot remaining)` from each until the request is met.
//! The allocator only plans: it never mutates the ledger, and it returns
//! no plan at all when the request cannot be met in full.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::ledger::LotLedger;
use crate::types::{Quantity, StockShortfall};

/// Quantity to draw from one lot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub lot_id: Uuid,
    pub quantity: Quantity,
}

/// Ordered per-lot draw-down for one item request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub item: String,
    pub requested: Quantity,
    pub entries: Vec<PlanEntry>,
}

impl AllocationPlan {
    pub fn total(&self) -> Quantity {
        self.entries.iter().map(|e| e.quantity).sum()
    }

    pub fn lot_count(&self) -> usize {
        self.entries.len()
    }
}

/// Allocation failures. Neither leaves any state changed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AllocationError {
    #[error("requested quantity must be positive, got {0}")]
    InvalidQuantity(Quantity),

    #[error("insufficient stock: {0}")]
    InsufficientStock(StockShortfall),
}

/// Plan a FIFO draw-down of `requested` units from `ledger`
pub fn allocate(ledger: &LotLedger, requested: Quantity) -> Result<AllocationPlan, AllocationError> {
    if requested <= 0 {
        return Err(AllocationError::InvalidQuantity(requested));
    }

    let mut outstanding = requested;
    let mut entries = Vec::new();
    for lot in ledger.available_lots() {
        if outstanding == 0 {
            break;
        }
        let take = outstanding.min(lot.remaining_quantity);
        entries.push(PlanEntry {
            lot_id: lot.id,
            quantity: take,
        });
        outstanding -= take;
    }

    if outstanding > 0 {
        return Err(AllocationError::InsufficientStock(StockShortfall {
            item: ledger.item().to_string(),
            requested,
            available: ledger.total_available(),
        }));
    }

    Ok(AllocationPlan {
        item: ledger.item().to_string(),
        requested,
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Lot;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    fn bolt_lots() -> (Lot, Lot) {
        let jan = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let feb = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let lot1 = Lot {
            id: Uuid::from_u128(1),
            item: "bolt".into(),
            original_quantity: 5,
            remaining_quantity: 5,
            rate: Decimal::new(250, 2),
            supplier: None,
            reference: None,
            acquired_at: jan,
            created_at: jan,
        };
        let lot2 = Lot {
            id: Uuid::from_u128(2),
            original_quantity: 10,
            remaining_quantity: 10,
            acquired_at: feb,
            created_at: feb,
            ..lot1.clone()
        };
        (lot1, lot2)
    }

    #[test]
    fn test_splits_across_lots_oldest_first() {
        let (lot1, lot2) = bolt_lots();
        let mut ledger = LotLedger::new("bolt", vec![lot2.clone(), lot1.clone()]);

        let plan = allocate(&ledger, 8).unwrap();
        assert_eq!(
            plan.entries,
            vec![
                PlanEntry {
                    lot_id: lot1.id,
                    quantity: 5
                },
                PlanEntry {
                    lot_id: lot2.id,
                    quantity: 3
                },
            ]
        );

        ledger.apply(&plan).unwrap();
        assert_eq!(ledger.lot(lot1.id).unwrap().remaining_quantity, 0);
        assert_eq!(ledger.lot(lot2.id).unwrap().remaining_quantity, 7);
    }

    #[test]
    fn test_insufficient_stock_reports_available() {
        let (lot1, lot2) = bolt_lots();
        let ledger = LotLedger::new("bolt", vec![lot1, lot2]);
        let before = ledger.clone();

        let err = allocate(&ledger, 20).unwrap_err();
        assert_eq!(
            err,
            AllocationError::InsufficientStock(StockShortfall {
                item: "bolt".into(),
                requested: 20,
                available: 15,
            })
        );
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_exact_stock_exhausts_last_lot() {
        let (lot1, lot2) = bolt_lots();
        let ledger = LotLedger::new("bolt", vec![lot1, lot2.clone()]);
        let plan = allocate(&ledger, 15).unwrap();
        assert_eq!(plan.total(), 15);
        assert_eq!(plan.entries.last().unwrap().quantity, 10);
        assert_eq!(plan.entries.last().unwrap().lot_id, lot2.id);
    }

    #[test]
    fn test_single_lot_covers_request() {
        let (lot1, lot2) = bolt_lots();
        let ledger = LotLedger::new("bolt", vec![lot1.clone(), lot2]);
        let plan = allocate(&ledger, 3).unwrap();
        assert_eq!(plan.lot_count(), 1);
        assert_eq!(plan.entries[0].lot_id, lot1.id);
    }

    #[test]
    fn test_non_positive_request_is_invalid() {
        let ledger = LotLedger::new("bolt", Vec::new());
        assert_eq!(allocate(&ledger, 0), Err(AllocationError::InvalidQuantity(0)));
        assert_eq!(allocate(&ledger, -1), Err(AllocationError::InvalidQuantity(-1)));
    }
}
