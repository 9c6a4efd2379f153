//! Validation utilities for the Storekeeper platform

use rust_decimal::Decimal;
use validator::ValidationError;

use crate::types::Quantity;

// ============================================================================
// Stock Validations
// ============================================================================

/// Validate that a quantity to receive, request or issue is positive
pub fn validate_quantity(quantity: Quantity) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be positive");
    }
    Ok(())
}

/// Validate that a purchase rate is not negative
pub fn validate_rate(rate: Decimal) -> Result<(), &'static str> {
    if rate < Decimal::ZERO {
        return Err("Rate cannot be negative");
    }
    Ok(())
}

/// Validate an item code: non-blank, at most 100 characters, no control characters
pub fn validate_item_code(item: &str) -> Result<(), &'static str> {
    let trimmed = item.trim();
    if trimmed.is_empty() {
        return Err("Item code cannot be blank");
    }
    if trimmed.chars().count() > 100 {
        return Err("Item code must be at most 100 characters");
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err("Item code cannot contain control characters");
    }
    Ok(())
}

// ============================================================================
// validator hooks
// ============================================================================

/// `validator` custom hook wrapping [`validate_item_code`]
pub fn item_code_not_blank(item: &str) -> Result<(), ValidationError> {
    validate_item_code(item).map_err(|msg| {
        let mut err = ValidationError::new("item_code");
        err.message = Some(msg.into());
        err
    })
}

/// `validator` custom hook wrapping [`validate_rate`]
pub fn rate_not_negative(rate: &Decimal) -> Result<(), ValidationError> {
    validate_rate(*rate).map_err(|msg| {
        let mut err = ValidationError::new("rate");
        err.message = Some(msg.into());
        err
    })
}
