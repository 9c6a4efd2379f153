//! Error handling for the Storekeeper platform
//!
//! Stock failures carry requested-versus-available detail, and conflicts
//! are marked retryable so clients can tell "try again" from "cannot be done".

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::{AllocationError, DecisionError, LedgerError, StockShortfall};
use thiserror::Error;
use uuid::Uuid;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {message}")]
    Conflict { resource: String, message: String },

    // Business logic errors
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(StockShortfall),

    #[error("Stock changed while issuing {item} (lot {lot_id}), retry")]
    StockConflict { item: String, lot_id: Uuid },

    /// Deadlock or serialization failure reported by PostgreSQL
    #[error("Transaction aborted by a concurrent update: {0}")]
    TransactionConflict(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether repeating the same call may succeed without any other change
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::StockConflict { .. } | AppError::TransactionConflict(_)
        )
    }

    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        let code = err
            .as_database_error()
            .and_then(|e| e.code())
            .map(|c| c.into_owned());

        match code.as_deref() {
            // deadlock_detected, serialization_failure
            Some("40P01") | Some("40001") => AppError::TransactionConflict(err.to_string()),
            _ => AppError::DatabaseError(err),
        }
    }
}

impl From<AllocationError> for AppError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::InvalidQuantity(q) => {
                AppError::validation("quantity", format!("Quantity must be positive, got {}", q))
            }
            AllocationError::InsufficientStock(shortfall) => AppError::InsufficientStock(shortfall),
        }
    }
}

impl From<DecisionError> for AppError {
    fn from(err: DecisionError) -> Self {
        match err {
            DecisionError::NotPending(_) | DecisionError::LinesLocked(_) => {
                AppError::InvalidStateTransition(err.to_string())
            }
            DecisionError::NotADecision(_) => AppError::validation("status", err.to_string()),
            DecisionError::UnknownLine(_) | DecisionError::DuplicateLine(_) => {
                AppError::validation("lines", err.to_string())
            }
            DecisionError::NegativeApproved { .. }
            | DecisionError::ApprovedExceedsRequested { .. } => {
                AppError::validation("approved_quantity", err.to_string())
            }
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError::Internal(format!("ledger out of step with storage: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors
            .errors()
            .keys()
            .next()
            .map(|k| k.to_string())
            .unwrap_or_default();
        AppError::Validation {
            field,
            message: errors.to_string(),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock: Option<StockShortfall>,
}

impl ErrorDetail {
    fn new(code: &str, message: String) -> Self {
        Self {
            code: code.to_string(),
            message,
            field: None,
            retryable: false,
            stock: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    field: Some(field.clone()),
                    ..ErrorDetail::new("VALIDATION_ERROR", message.clone())
                },
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new("NOT_FOUND", format!("{} not found", resource)),
            ),
            AppError::Conflict { resource, message } => (
                StatusCode::CONFLICT,
                ErrorDetail {
                    field: Some(resource.clone()),
                    ..ErrorDetail::new("CONFLICT", message.clone())
                },
            ),
            AppError::InvalidStateTransition(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new("INVALID_STATE_TRANSITION", msg.clone()),
            ),
            AppError::InsufficientStock(shortfall) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail {
                    stock: Some(shortfall.clone()),
                    ..ErrorDetail::new(
                        "INSUFFICIENT_STOCK",
                        format!(
                            "Not enough {} in stock: requested {}, available {}",
                            shortfall.item, shortfall.requested, shortfall.available
                        ),
                    )
                },
            ),
            AppError::StockConflict { item, .. } => (
                StatusCode::CONFLICT,
                ErrorDetail {
                    field: Some("item".to_string()),
                    retryable: true,
                    ..ErrorDetail::new(
                        "STOCK_CONFLICT",
                        format!("Stock of {} changed while issuing, please retry", item),
                    )
                },
            ),
            AppError::TransactionConflict(_) => (
                StatusCode::CONFLICT,
                ErrorDetail {
                    retryable: true,
                    ..ErrorDetail::new(
                        "STOCK_CONFLICT",
                        "Stock changed concurrently, please retry".to_string(),
                    )
                },
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("DATABASE_ERROR", "A database error occurred".to_string()),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", "An internal server error occurred".to_string()),
            ),
        };

        // Log the error for debugging
        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
