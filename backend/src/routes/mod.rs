//! Route definitions for the Storekeeper platform

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/purchases", purchase_routes())
        .nest("/stock", stock_routes())
        .nest("/issues", issue_routes())
        .nest("/indents", indent_routes())
}

/// Purchase (lot) routes
fn purchase_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::record_purchase))
        .route(
            "/:lot_id",
            get(handlers::get_purchase).delete(handlers::delete_purchase),
        )
        .route("/:lot_id/issues", get(handlers::get_purchase_issues))
}

/// Stock query routes
fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::get_stock_summary))
        .route("/:item", get(handlers::get_item_stock))
        .route("/:item/lots", get(handlers::get_item_lots))
}

/// Direct issue routes
fn issue_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::issue_stock))
        .route("/batches/:batch_id", get(handlers::get_issue_batch))
}

/// Requisition (indent) routes
fn indent_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_requisitions).post(handlers::create_requisition),
        )
        .route("/:requisition_id", get(handlers::get_requisition))
        .route("/:requisition_id/lines", put(handlers::update_requisition_lines))
        .route("/:requisition_id/approve", post(handlers::approve_requisition))
        .route("/:requisition_id/reject", post(handlers::reject_requisition))
        .route("/:requisition_id/issue", post(handlers::issue_outstanding))
}
