//! Lot (purchase batch) models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::types::Quantity;
use crate::validation::{item_code_not_blank, rate_not_negative};

/// A single purchase batch of an item with its own remaining-quantity counter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lot {
    pub id: Uuid,
    pub item: String,
    /// Quantity received with the purchase. Never changes.
    pub original_quantity: Quantity,
    /// Quantity still on the shelf; only committed issues decrement it
    pub remaining_quantity: Quantity,
    pub rate: Decimal,
    pub supplier: Option<String>,
    pub reference: Option<String>,
    pub acquired_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Lot {
    pub fn is_available(&self) -> bool {
        self.remaining_quantity > 0
    }

    pub fn consumed_quantity(&self) -> Quantity {
        self.original_quantity - self.remaining_quantity
    }

    /// Value of the stock still held in this lot
    pub fn remaining_value(&self) -> Decimal {
        self.rate * Decimal::from(self.remaining_quantity)
    }

    /// FIFO ordering key: acquisition time, then id for determinism
    pub fn fifo_key(&self) -> (DateTime<Utc>, Uuid) {
        (self.acquired_at, self.id)
    }
}

/// Input for recording a purchase, which creates a new lot
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecordPurchaseInput {
    #[validate(length(min = 1, max = 100), custom = "item_code_not_blank")]
    pub item: String,
    #[validate(range(min = 1))]
    pub quantity: i64,
    #[validate(custom = "rate_not_negative")]
    pub rate: Decimal,
    #[validate(length(max = 200))]
    pub supplier: Option<String>,
    #[validate(length(max = 200))]
    pub reference: Option<String>,
    /// Defaults to the time of recording
    pub acquired_at: Option<DateTime<Utc>>,
}

impl RecordPurchaseInput {
    pub fn item_code(&self) -> &str {
        self.item.trim()
    }

    pub fn total_cost(&self) -> Decimal {
        self.rate * Decimal::from(self.quantity)
    }
}
