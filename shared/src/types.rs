//! Common types used across the platform

use serde::{Deserialize, Serialize};

/// Whole units of an item. Stock is never fractional.
pub type Quantity = i64;

/// Available stock for one item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockLevel {
    pub item: String,
    pub available: Quantity,
    pub lot_count: i64,
}

/// Requested-versus-available detail attached to stock failures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockShortfall {
    pub item: String,
    pub requested: Quantity,
    pub available: Quantity,
}

impl std::fmt::Display for StockShortfall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} requested {}, available {}",
            self.item, self.requested, self.available
        )
    }
}

