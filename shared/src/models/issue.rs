//! Issue (stock dispatch) models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::types::Quantity;
use crate::validation::item_code_not_blank;

/// Immutable record of stock drawn from exactly one lot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub lot_id: Uuid,
    pub item: String,
    pub quantity: Quantity,
    /// Rate of the lot the stock was drawn from
    pub rate: Decimal,
    pub requisition_line_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Issue {
    pub fn value(&self) -> Decimal {
        self.rate * Decimal::from(self.quantity)
    }
}

/// Umbrella record tying together the issues of one user-facing action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IssueBatch {
    pub id: Uuid,
    /// Set when the batch was produced by approving a requisition
    pub requisition_id: Option<Uuid>,
    pub issued_to: Option<String>,
    pub purpose: Option<String>,
    pub issued_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Batch with its issue records, oldest lot first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueBatchWithIssues {
    #[serde(flatten)]
    pub batch: IssueBatch,
    pub issues: Vec<Issue>,
    pub total_quantity: Quantity,
    /// Cost of the issued stock at the rates of the lots it came from
    pub total_value: Decimal,
}

/// One item line of a direct issue
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IssueItemInput {
    #[validate(length(min = 1, max = 100), custom = "item_code_not_blank")]
    pub item: String,
    #[validate(range(min = 1))]
    pub quantity: i64,
}

/// Input for issuing stock directly, without a requisition
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DirectIssueInput {
    #[validate(length(min = 1, max = 100))]
    pub items: Vec<IssueItemInput>,
    #[validate(length(max = 200))]
    pub issued_to: Option<String>,
    #[validate(length(max = 500))]
    pub purpose: Option<String>,
    pub issued_by: Option<Uuid>,
}

/// Sum of issued quantities
pub fn total_quantity(issues: &[Issue]) -> Quantity {
    issues.iter().map(|i| i.quantity).sum()
}

pub fn total_value(issues: &[Issue]) -> Decimal {
    issues.iter().map(Issue::value).sum()
}
