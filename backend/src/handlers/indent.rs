//! HTTP handlers for requisition (indent) endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::{
    ApprovalOutcome, ApproveRequisitionInput, CreateRequisitionInput, RejectRequisitionInput,
    Requisition, RequisitionStatus, RequisitionWithLines, UpdateLinesInput,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::IndentService;
use crate::AppState;

/// Query parameters for listing requisitions
#[derive(Debug, Deserialize)]
pub struct ListRequisitionsQuery {
    pub status: Option<String>,
}

fn indent_service(state: AppState) -> IndentService {
    IndentService::new(state.db, state.config.allocation.clone())
}

/// Create a requisition
pub async fn create_requisition(
    State(state): State<AppState>,
    Json(input): Json<CreateRequisitionInput>,
) -> AppResult<(StatusCode, Json<RequisitionWithLines>)> {
    let requisition = indent_service(state).create_requisition(input).await?;
    Ok((StatusCode::CREATED, Json(requisition)))
}

/// List requisitions, optionally by status
pub async fn list_requisitions(
    State(state): State<AppState>,
    Query(query): Query<ListRequisitionsQuery>,
) -> AppResult<Json<Vec<Requisition>>> {
    let status = match query.status.as_deref() {
        Some(s) => Some(RequisitionStatus::from_str(s).ok_or_else(|| {
            AppError::validation("status", format!("Unknown requisition status: {}", s))
        })?),
        None => None,
    };

    let requisitions = indent_service(state).list_requisitions(status).await?;
    Ok(Json(requisitions))
}

/// Get a requisition with its lines
pub async fn get_requisition(
    State(state): State<AppState>,
    Path(requisition_id): Path<Uuid>,
) -> AppResult<Json<RequisitionWithLines>> {
    let requisition = indent_service(state).get_requisition(requisition_id).await?;
    Ok(Json(requisition))
}

/// Replace the lines of a pending requisition
pub async fn update_requisition_lines(
    State(state): State<AppState>,
    Path(requisition_id): Path<Uuid>,
    Json(input): Json<UpdateLinesInput>,
) -> AppResult<Json<RequisitionWithLines>> {
    let requisition = indent_service(state)
        .update_lines(requisition_id, input)
        .await?;
    Ok(Json(requisition))
}

/// Approve a requisition (fully or partially) and issue its stock
pub async fn approve_requisition(
    State(state): State<AppState>,
    Path(requisition_id): Path<Uuid>,
    Json(input): Json<ApproveRequisitionInput>,
) -> AppResult<Json<ApprovalOutcome>> {
    let outcome = indent_service(state).approve(requisition_id, input).await?;
    Ok(Json(outcome))
}

/// Reject a requisition
pub async fn reject_requisition(
    State(state): State<AppState>,
    Path(requisition_id): Path<Uuid>,
    Json(input): Json<RejectRequisitionInput>,
) -> AppResult<Json<RequisitionWithLines>> {
    let requisition = indent_service(state).reject(requisition_id, input).await?;
    Ok(Json(requisition))
}

/// Issue approved stock that an earlier approval could not issue
pub async fn issue_outstanding(
    State(state): State<AppState>,
    Path(requisition_id): Path<Uuid>,
) -> AppResult<Json<ApprovalOutcome>> {
    let outcome = indent_service(state)
        .issue_outstanding(requisition_id)
        .await?;
    Ok(Json(outcome))
}
