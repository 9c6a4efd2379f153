//! HTTP handlers for stock queries

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use shared::{Lot, StockLevel};

use crate::error::AppResult;
use crate::services::{ItemStock, LedgerService};
use crate::AppState;

/// Query parameters for an item's lots
#[derive(Debug, Deserialize)]
pub struct ItemLotsQuery {
    /// Include lots that are fully drawn
    #[serde(default)]
    pub include_drained: bool,
}

/// Available stock per item
pub async fn get_stock_summary(State(state): State<AppState>) -> AppResult<Json<Vec<StockLevel>>> {
    let service = LedgerService::new(state.db);
    let summary = service.stock_summary().await?;
    Ok(Json(summary))
}

/// Stock position of one item with its available lots in draw order
pub async fn get_item_stock(
    State(state): State<AppState>,
    Path(item): Path<String>,
) -> AppResult<Json<ItemStock>> {
    let service = LedgerService::new(state.db);
    let stock = service.item_stock(&item).await?;
    Ok(Json(stock))
}

/// Lots of one item, oldest first
pub async fn get_item_lots(
    State(state): State<AppState>,
    Path(item): Path<String>,
    Query(query): Query<ItemLotsQuery>,
) -> AppResult<Json<Vec<Lot>>> {
    let service = LedgerService::new(state.db);
    let lots = if query.include_drained {
        service.list_lots(&item).await?
    } else {
        service.available_lots(&item).await?
    };
    Ok(Json(lots))
}
