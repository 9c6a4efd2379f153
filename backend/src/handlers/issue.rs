//! HTTP handlers for direct stock issues

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use shared::{DirectIssueInput, IssueBatchWithIssues};
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::IssueService;
use crate::AppState;

/// Issue stock for one or more items outside the requisition workflow
pub async fn issue_stock(
    State(state): State<AppState>,
    Json(input): Json<DirectIssueInput>,
) -> AppResult<(StatusCode, Json<IssueBatchWithIssues>)> {
    let service = IssueService::new(state.db, state.config.allocation.clone());
    let batch = service.issue_stock(input).await?;
    Ok((StatusCode::CREATED, Json(batch)))
}

/// Get an issue batch with its issues
pub async fn get_issue_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> AppResult<Json<IssueBatchWithIssues>> {
    let service = IssueService::new(state.db, state.config.allocation.clone());
    let batch = service.get_batch(batch_id).await?;
    Ok(Json(batch))
}
