//! HTTP handlers for purchase (lot) endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use shared::{Issue, Lot, RecordPurchaseInput};
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::LedgerService;
use crate::AppState;

/// Record a purchase as a new lot
pub async fn record_purchase(
    State(state): State<AppState>,
    Json(input): Json<RecordPurchaseInput>,
) -> AppResult<(StatusCode, Json<Lot>)> {
    let service = LedgerService::new(state.db);
    let lot = service.record_purchase(input).await?;
    Ok((StatusCode::CREATED, Json(lot)))
}

/// Get a lot
pub async fn get_purchase(
    State(state): State<AppState>,
    Path(lot_id): Path<Uuid>,
) -> AppResult<Json<Lot>> {
    let service = LedgerService::new(state.db);
    let lot = service.get_lot(lot_id).await?;
    Ok(Json(lot))
}

/// Delete a lot nothing has been issued from
pub async fn delete_purchase(
    State(state): State<AppState>,
    Path(lot_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let service = LedgerService::new(state.db);
    service.delete_purchase(lot_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Issues drawn from a lot
pub async fn get_purchase_issues(
    State(state): State<AppState>,
    Path(lot_id): Path<Uuid>,
) -> AppResult<Json<Vec<Issue>>> {
    let service = LedgerService::new(state.db);
    let issues = service.lot_issues(lot_id).await?;
    Ok(Json(issues))
}
