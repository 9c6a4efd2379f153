//! In-memory lot ledger for a single item
//!
//! Lots are kept oldest first (acquisition time, then lot id). The backend
//! fills a ledger from the rows it reads inside a commit transaction and
//! keeps it in step with the guarded decrements it writes, so later lines
//! of the same call plan against what is actually left.

use thiserror::Error;
use uuid::Uuid;

use crate::allocation::AllocationPlan;
use crate::models::Lot;
use crate::types::Quantity;

/// Failure applying a plan to a ledger
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("lot {0} is not part of this ledger")]
    UnknownLot(Uuid),

    #[error("lot {lot_id} has {remaining} remaining, plan takes {planned}")]
    Conflict {
        lot_id: Uuid,
        planned: Quantity,
        remaining: Quantity,
    },

    #[error("plan is for item {plan_item}, ledger holds {ledger_item}")]
    ItemMismatch {
        ledger_item: String,
        plan_item: String,
    },
}

/// Lots of one item in FIFO order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LotLedger {
    item: String,
    lots: Vec<Lot>,
}

impl LotLedger {
    /// Build a ledger for `item`; lots of other items are ignored
    pub fn new(item: impl Into<String>, lots: impl IntoIterator<Item = Lot>) -> Self {
        let item = item.into();
        let mut lots: Vec<Lot> = lots.into_iter().filter(|l| l.item == item).collect();
        lots.sort_by_key(Lot::fifo_key);
        Self { item, lots }
    }

    pub fn item(&self) -> &str {
        &self.item
    }

    /// Lots with stock left, oldest first
    pub fn available_lots(&self) -> impl Iterator<Item = &Lot> + '_ {
        self.lots.iter().filter(|l| l.is_available())
    }

    /// Sum of remaining quantities across available lots
    pub fn total_available(&self) -> Quantity {
        self.available_lots().map(|l| l.remaining_quantity).sum()
    }

    pub fn lot(&self, lot_id: Uuid) -> Option<&Lot> {
        self.lots.iter().find(|l| l.id == lot_id)
    }

    pub fn lots(&self) -> &[Lot] {
        &self.lots
    }

    /// Add a freshly purchased lot in FIFO position
    pub fn record_purchase(&mut self, lot: Lot) {
        let key = lot.fifo_key();
        let pos = self.lots.partition_point(|l| l.fifo_key() <= key);
        self.lots.insert(pos, lot);
    }

    /// Apply a plan with a guarded decrement per lot. Either every entry
    /// applies or the ledger is left untouched.
    pub fn apply(&mut self, plan: &AllocationPlan) -> Result<(), LedgerError> {
        if plan.item != self.item {
            return Err(LedgerError::ItemMismatch {
                ledger_item: self.item.clone(),
                plan_item: plan.item.clone(),
            });
        }

        let mut positions = Vec::with_capacity(plan.entries.len());
        for entry in &plan.entries {
            let pos = self
                .lots
                .iter()
                .position(|l| l.id == entry.lot_id)
                .ok_or(LedgerError::UnknownLot(entry.lot_id))?;
            let remaining = self.lots[pos].remaining_quantity;
            if remaining < entry.quantity {
                return Err(LedgerError::Conflict {
                    lot_id: entry.lot_id,
                    planned: entry.quantity,
                    remaining,
                });
            }
            positions.push(pos);
        }

        for (pos, entry) in positions.into_iter().zip(&plan.entries) {
            self.lots[pos].remaining_quantity -= entry.quantity;
        }
        Ok(())
    }
}
