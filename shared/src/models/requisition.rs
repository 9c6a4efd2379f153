//! Requisition (indent request) models and decision rules
//!
//! A requisition is created `pending`, decided exactly once, and never
//! edited afterwards. Approval materializes stock issues per line; the
//! rules for what a valid decision looks like live here so they can be
//! checked before any storage is touched.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use super::Issue;
use crate::types::Quantity;
use crate::validation::item_code_not_blank;

/// Requisition status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequisitionStatus {
    /// Draft state kept for legacy rows; no transition enters or leaves it
    Initiated,
    Pending,
    Approved,
    Rejected,
    Partial,
}

impl RequisitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequisitionStatus::Initiated => "initiated",
            RequisitionStatus::Pending => "pending",
            RequisitionStatus::Approved => "approved",
            RequisitionStatus::Rejected => "rejected",
            RequisitionStatus::Partial => "partial",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "initiated" => Some(RequisitionStatus::Initiated),
            "pending" => Some(RequisitionStatus::Pending),
            "approved" => Some(RequisitionStatus::Approved),
            "rejected" => Some(RequisitionStatus::Rejected),
            "partial" => Some(RequisitionStatus::Partial),
            _ => None,
        }
    }

    /// Terminal states reached by a decision
    pub fn is_decided(&self) -> bool {
        matches!(
            self,
            RequisitionStatus::Approved | RequisitionStatus::Rejected | RequisitionStatus::Partial
        )
    }

    /// Decided states whose lines are turned into stock issues
    pub fn issues_stock(&self) -> bool {
        matches!(self, RequisitionStatus::Approved | RequisitionStatus::Partial)
    }

    pub fn can_transition_to(&self, next: RequisitionStatus) -> bool {
        *self == RequisitionStatus::Pending && next.is_decided()
    }
}

impl std::fmt::Display for RequisitionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requisition priority. Informational only: it never changes allocation order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Priority::Low),
            "normal" => Some(Priority::Normal),
            "high" => Some(Priority::High),
            "urgent" => Some(Priority::Urgent),
            _ => None,
        }
    }
}

/// An internal request for stock
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Requisition {
    pub id: Uuid,
    /// Requesting department or station
    pub department: String,
    pub purpose: String,
    pub priority: Priority,
    pub status: RequisitionStatus,
    pub requested_by: Uuid,
    pub approved_by: Option<Uuid>,
    pub remarks: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// One item line of a requisition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequisitionLine {
    pub id: Uuid,
    pub requisition_id: Uuid,
    pub position: i32,
    pub item: String,
    pub requested_quantity: Quantity,
    /// Zero until the requisition is decided
    pub approved_quantity: Quantity,
    pub remarks: Option<String>,
}

/// Requisition with its lines in entry order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequisitionWithLines {
    #[serde(flatten)]
    pub requisition: Requisition,
    pub lines: Vec<RequisitionLine>,
}

/// Input line for creating or editing a requisition
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RequisitionLineInput {
    #[validate(length(min = 1, max = 100), custom = "item_code_not_blank")]
    pub item: String,
    #[validate(range(min = 1))]
    pub quantity: i64,
    #[validate(length(max = 500))]
    pub remarks: Option<String>,
}

/// Input for creating a requisition
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateRequisitionInput {
    #[validate(length(min = 1, max = 200))]
    pub department: String,
    #[validate(length(min = 1, max = 500))]
    pub purpose: String,
    pub priority: Option<Priority>,
    pub requested_by: Uuid,
    #[validate(length(max = 1000))]
    pub remarks: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub lines: Vec<RequisitionLineInput>,
}

/// Input for replacing the lines of a pending requisition
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateLinesInput {
    #[validate(length(min = 1, max = 100))]
    pub lines: Vec<RequisitionLineInput>,
}

/// Approved quantity for one line
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LineApproval {
    pub line_id: Uuid,
    #[validate(range(min = 0))]
    pub approved_quantity: i64,
}

/// Input for approving a requisition
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ApproveRequisitionInput {
    /// `approved` or `partial`; inferred from the quantities when omitted
    pub status: Option<RequisitionStatus>,
    pub approved_by: Uuid,
    #[validate(length(max = 1000))]
    pub remarks: Option<String>,
    /// Lines not listed are approved with quantity 0
    pub lines: Vec<LineApproval>,
}

/// Input for rejecting a requisition
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RejectRequisitionInput {
    pub approved_by: Uuid,
    #[validate(length(max = 1000))]
    pub remarks: Option<String>,
}

/// Reasons a decision is refused before anything is written
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecisionError {
    #[error("requisition is {0}, only pending requisitions can be decided")]
    NotPending(RequisitionStatus),

    #[error("{0} is not a decision status")]
    NotADecision(RequisitionStatus),

    #[error("requisition is {0}, lines can only be edited while pending")]
    LinesLocked(RequisitionStatus),

    #[error("line {0} does not belong to this requisition")]
    UnknownLine(Uuid),

    #[error("line {0} is listed more than once")]
    DuplicateLine(Uuid),

    #[error("line {line_id}: approved quantity {approved} is negative")]
    NegativeApproved { line_id: Uuid, approved: Quantity },

    #[error("line {line_id}: approved quantity {approved} exceeds requested {requested}")]
    ApprovedExceedsRequested {
        line_id: Uuid,
        requested: Quantity,
        approved: Quantity,
    },
}

/// A line with the quantity the approver settled on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLine {
    pub line_id: Uuid,
    pub item: String,
    pub requested: Quantity,
    pub approved: Quantity,
}

/// Check that a rejection is allowed from the current status
pub fn check_rejection(current: RequisitionStatus) -> Result<(), DecisionError> {
    if !current.can_transition_to(RequisitionStatus::Rejected) {
        return Err(DecisionError::NotPending(current));
    }
    Ok(())
}

/// Check that lines may still be replaced
pub fn check_editable(current: RequisitionStatus) -> Result<(), DecisionError> {
    if current != RequisitionStatus::Pending {
        return Err(DecisionError::LinesLocked(current));
    }
    Ok(())
}

/// Validate an approval against the stored lines and settle the target
/// status and per-line approved quantities.
pub fn resolve_approval(
    current: RequisitionStatus,
    lines: &[RequisitionLine],
    requested_status: Option<RequisitionStatus>,
    approvals: &[LineApproval],
) -> Result<(RequisitionStatus, Vec<ResolvedLine>), DecisionError> {
    if let Some(target) = requested_status {
        if !target.issues_stock() {
            return Err(DecisionError::NotADecision(target));
        }
    }
    if current != RequisitionStatus::Pending {
        return Err(DecisionError::NotPending(current));
    }

    let known: HashSet<Uuid> = lines.iter().map(|l| l.id).collect();
    let mut approved: BTreeMap<Uuid, Quantity> = BTreeMap::new();
    for approval in approvals {
        if !known.contains(&approval.line_id) {
            return Err(DecisionError::UnknownLine(approval.line_id));
        }
        if approved
            .insert(approval.line_id, approval.approved_quantity)
            .is_some()
        {
            return Err(DecisionError::DuplicateLine(approval.line_id));
        }
    }

    let mut resolved = Vec::with_capacity(lines.len());
    for line in lines {
        let qty = approved.get(&line.id).copied().unwrap_or(0);
        if qty < 0 {
            return Err(DecisionError::NegativeApproved {
                line_id: line.id,
                approved: qty,
            });
        }
        if qty > line.requested_quantity {
            return Err(DecisionError::ApprovedExceedsRequested {
                line_id: line.id,
                requested: line.requested_quantity,
                approved: qty,
            });
        }
        resolved.push(ResolvedLine {
            line_id: line.id,
            item: line.item.clone(),
            requested: line.requested_quantity,
            approved: qty,
        });
    }

    let status = requested_status.unwrap_or_else(|| infer_approval_status(&resolved));
    Ok((status, resolved))
}

/// `approved` when every line got what it asked for, `partial` otherwise
pub fn infer_approval_status(lines: &[ResolvedLine]) -> RequisitionStatus {
    if lines.iter().all(|l| l.approved == l.requested) {
        RequisitionStatus::Approved
    } else {
        RequisitionStatus::Partial
    }
}

/// Total approved quantity per item, for the pre-allocation stock check
pub fn approved_demand_by_item(lines: &[ResolvedLine]) -> BTreeMap<String, Quantity> {
    let mut demand = BTreeMap::new();
    for line in lines.iter().filter(|l| l.approved > 0) {
        *demand.entry(line.item.clone()).or_insert(0) += line.approved;
    }
    demand
}

/// Stock issued for one requisition line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineIssued {
    pub line_id: Uuid,
    pub item: String,
    pub quantity: Quantity,
    pub issues: Vec<Issue>,
}

/// Why a line's stock issue did not happen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineFailureKind {
    InsufficientStock,
    Conflict,
    Storage,
}

impl LineFailureKind {
    /// Conflicts and storage hiccups may succeed on a plain retry;
    /// insufficient stock needs a purchase first.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LineFailureKind::InsufficientStock)
    }
}

/// A line whose stock issue failed after the requisition was decided
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineFailure {
    pub line_id: Uuid,
    pub item: String,
    pub requested: Quantity,
    pub kind: LineFailureKind,
    pub available: Option<Quantity>,
    pub message: String,
}

/// Composite result of approving a requisition or re-running its issues.
///
/// The status change and the per-line stock issues commit separately, so
/// a decided requisition can carry failed lines. Those are reported here
/// and can be retried with the outstanding-issue operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalOutcome {
    pub requisition: RequisitionWithLines,
    pub batch_id: Option<Uuid>,
    pub issued: Vec<LineIssued>,
    pub failures: Vec<LineFailure>,
}

impl ApprovalOutcome {
    pub fn is_fully_issued(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn issued_quantity(&self) -> Quantity {
        self.issued.iter().map(|l| l.quantity).sum()
    }
}
