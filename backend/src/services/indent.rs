//! Indent (requisition) workflow service
//!
//! A requisition moves `pending -> approved | partial | rejected` exactly
//! once. Approval runs in two failure domains: the status change commits
//! on its own, then each line with an approved quantity is issued in its
//! own transaction. A line that fails to issue does not undo the decision;
//! it is logged, reported in the returned [`ApprovalOutcome`], and can be
//! retried with [`IndentService::issue_outstanding`].

use chrono::{DateTime, Utc};
use shared::{
    approved_demand_by_item, check_editable, check_rejection, resolve_approval,
    ApprovalOutcome, ApproveRequisitionInput, CreateRequisitionInput, LineFailure,
    LineFailureKind, LineIssued, Priority, Quantity, RejectRequisitionInput, Requisition,
    RequisitionLine, RequisitionLineInput, RequisitionStatus, RequisitionWithLines,
    StockShortfall, UpdateLinesInput,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::config::AllocationConfig;
use crate::error::{AppError, AppResult};
use crate::services::issue::{issue_item, requisition_batch, retry_on_conflict, BatchContext};
use crate::services::ledger::total_available;

/// Indent service for requisition requests and their approval
#[derive(Clone)]
pub struct IndentService {
    db: PgPool,
    allocation: AllocationConfig,
}

/// Row for requisition queries
#[derive(Debug, FromRow)]
struct RequisitionRow {
    id: Uuid,
    department: String,
    purpose: String,
    priority: String,
    status: String,
    requested_by: Uuid,
    approved_by: Option<Uuid>,
    remarks: Option<String>,
    requested_at: DateTime<Utc>,
    decided_at: Option<DateTime<Utc>>,
}

impl TryFrom<RequisitionRow> for Requisition {
    type Error = AppError;

    fn try_from(r: RequisitionRow) -> Result<Self, Self::Error> {
        let status = RequisitionStatus::from_str(&r.status).ok_or_else(|| {
            AppError::Internal(format!("requisition {} has unknown status {}", r.id, r.status))
        })?;
        let priority = Priority::from_str(&r.priority).ok_or_else(|| {
            AppError::Internal(format!("requisition {} has unknown priority {}", r.id, r.priority))
        })?;

        Ok(Requisition {
            id: r.id,
            department: r.department,
            purpose: r.purpose,
            priority,
            status,
            requested_by: r.requested_by,
            approved_by: r.approved_by,
            remarks: r.remarks,
            requested_at: r.requested_at,
            decided_at: r.decided_at,
        })
    }
}

/// Row for requisition line queries
#[derive(Debug, FromRow)]
struct RequisitionLineRow {
    id: Uuid,
    requisition_id: Uuid,
    position: i32,
    item: String,
    requested_quantity: i64,
    approved_quantity: i64,
    remarks: Option<String>,
}

impl From<RequisitionLineRow> for RequisitionLine {
    fn from(r: RequisitionLineRow) -> Self {
        RequisitionLine {
            id: r.id,
            requisition_id: r.requisition_id,
            position: r.position,
            item: r.item,
            requested_quantity: r.requested_quantity,
            approved_quantity: r.approved_quantity,
            remarks: r.remarks,
        }
    }
}

/// Locked requisition line, as far as issuing needs it
#[derive(Debug, FromRow)]
struct LockedLineRow {
    item: String,
    approved_quantity: i64,
}

async fn fetch_requisition(conn: &mut PgConnection, id: Uuid) -> AppResult<Requisition> {
    sqlx::query_as::<_, RequisitionRow>(
        r#"
        SELECT id, department, purpose, priority, status, requested_by, approved_by,
               remarks, requested_at, decided_at
        FROM requisitions
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Requisition".to_string()))?
    .try_into()
}

/// Read a requisition and hold its row lock until the transaction ends.
/// Line edits take the same lock, so lines read afterwards stay current.
async fn lock_requisition(conn: &mut PgConnection, id: Uuid) -> AppResult<Requisition> {
    sqlx::query_as::<_, RequisitionRow>(
        r#"
        SELECT id, department, purpose, priority, status, requested_by, approved_by,
               remarks, requested_at, decided_at
        FROM requisitions
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Requisition".to_string()))?
    .try_into()
}

async fn fetch_lines(conn: &mut PgConnection, requisition_id: Uuid) -> AppResult<Vec<RequisitionLine>> {
    let rows = sqlx::query_as::<_, RequisitionLineRow>(
        r#"
        SELECT id, requisition_id, position, item, requested_quantity, approved_quantity, remarks
        FROM requisition_lines
        WHERE requisition_id = $1
        ORDER BY position
        "#,
    )
    .bind(requisition_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(RequisitionLine::from).collect())
}

async fn insert_lines(
    conn: &mut PgConnection,
    requisition_id: Uuid,
    lines: &[RequisitionLineInput],
) -> AppResult<()> {
    for (position, line) in lines.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO requisition_lines (requisition_id, position, item, requested_quantity, remarks)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(requisition_id)
        .bind(position as i32)
        .bind(line.item.trim())
        .bind(line.quantity)
        .bind(&line.remarks)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

fn validate_lines(lines: &[RequisitionLineInput]) -> AppResult<()> {
    for line in lines {
        line.validate()?;
    }
    Ok(())
}

/// Turn a failed line issue into its reported form
fn line_failure(line: &RequisitionLine, err: AppError) -> LineFailure {
    let (kind, available, requested) = match &err {
        AppError::InsufficientStock(shortfall) => (
            LineFailureKind::InsufficientStock,
            Some(shortfall.available),
            shortfall.requested,
        ),
        AppError::StockConflict { .. } | AppError::TransactionConflict(_) => {
            (LineFailureKind::Conflict, None, line.approved_quantity)
        }
        _ => (LineFailureKind::Storage, None, line.approved_quantity),
    };

    LineFailure {
        line_id: line.id,
        item: line.item.clone(),
        requested,
        kind,
        available,
        message: err.to_string(),
    }
}

impl IndentService {
    /// Create a new IndentService instance
    pub fn new(db: PgPool, allocation: AllocationConfig) -> Self {
        Self { db, allocation }
    }

    /// Create a requisition in `pending` status
    pub async fn create_requisition(
        &self,
        input: CreateRequisitionInput,
    ) -> AppResult<RequisitionWithLines> {
        input.validate()?;
        validate_lines(&input.lines)?;

        let priority = input.priority.unwrap_or_default();

        let mut tx = self.db.begin().await?;

        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO requisitions (department, purpose, priority, status, requested_by, remarks)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(input.department.trim())
        .bind(&input.purpose)
        .bind(priority.as_str())
        .bind(RequisitionStatus::Pending.as_str())
        .bind(input.requested_by)
        .bind(&input.remarks)
        .fetch_one(&mut *tx)
        .await?;

        insert_lines(&mut tx, id, &input.lines).await?;

        tx.commit().await?;

        tracing::info!(
            requisition_id = %id,
            lines = input.lines.len(),
            priority = priority.as_str(),
            "Requisition created"
        );

        self.get_requisition(id).await
    }

    /// Get a requisition with its lines
    pub async fn get_requisition(&self, id: Uuid) -> AppResult<RequisitionWithLines> {
        let mut conn = self.db.acquire().await?;
        let requisition = fetch_requisition(&mut *conn, id).await?;
        let lines = fetch_lines(&mut *conn, id).await?;
        Ok(RequisitionWithLines { requisition, lines })
    }

    /// List requisitions, newest first, optionally filtered by status
    pub async fn list_requisitions(
        &self,
        status: Option<RequisitionStatus>,
    ) -> AppResult<Vec<Requisition>> {
        let rows = sqlx::query_as::<_, RequisitionRow>(
            r#"
            SELECT id, department, purpose, priority, status, requested_by, approved_by,
                   remarks, requested_at, decided_at
            FROM requisitions
            WHERE ($1::VARCHAR IS NULL OR status = $1)
            ORDER BY requested_at DESC, id
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Requisition::try_from).collect()
    }

    /// Replace the lines of a requisition that is still pending
    pub async fn update_lines(
        &self,
        id: Uuid,
        input: UpdateLinesInput,
    ) -> AppResult<RequisitionWithLines> {
        input.validate()?;
        validate_lines(&input.lines)?;

        let mut tx = self.db.begin().await?;

        // Lock the requisition so a concurrent decision waits for the edit
        let status = sqlx::query_scalar::<_, String>(
            "SELECT status FROM requisitions WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Requisition".to_string()))?;

        let status = RequisitionStatus::from_str(&status)
            .ok_or_else(|| AppError::Internal(format!("unknown requisition status {}", status)))?;
        check_editable(status)?;

        sqlx::query("DELETE FROM requisition_lines WHERE requisition_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        insert_lines(&mut tx, id, &input.lines).await?;

        tx.commit().await?;

        tracing::info!(requisition_id = %id, lines = input.lines.len(), "Requisition lines replaced");

        self.get_requisition(id).await
    }

    /// Reject a pending requisition. No stock moves.
    pub async fn reject(
        &self,
        id: Uuid,
        input: RejectRequisitionInput,
    ) -> AppResult<RequisitionWithLines> {
        input.validate()?;

        let mut tx = self.db.begin().await?;
        let current = lock_requisition(&mut tx, id).await?;
        check_rejection(current.status)?;

        self.decide(&mut tx, id, RequisitionStatus::Rejected, input.approved_by, input.remarks.as_deref())
            .await?;
        tx.commit().await?;

        tracing::info!(requisition_id = %id, approved_by = %input.approved_by, "Requisition rejected");

        self.get_requisition(id).await
    }

    /// Approve a pending requisition and issue stock for every line with an
    /// approved quantity.
    ///
    /// Before anything is written the approved quantities are checked
    /// against current stock per item; a shortfall rejects the call. After
    /// the decision commits, line issues that fail are reported in the
    /// outcome rather than returned as an error.
    pub async fn approve(
        &self,
        id: Uuid,
        input: ApproveRequisitionInput,
    ) -> AppResult<ApprovalOutcome> {
        input.validate()?;
        for line in &input.lines {
            line.validate()?;
        }

        let mut tx = self.db.begin().await?;

        let current = lock_requisition(&mut tx, id).await?;
        let lines = fetch_lines(&mut tx, id).await?;
        let (status, resolved) =
            resolve_approval(current.status, &lines, input.status, &input.lines)?;

        // Pre-check stock per item; advisory, the commits re-validate
        for (item, demand) in approved_demand_by_item(&resolved) {
            let available = total_available(&mut tx, &item).await?;
            if demand > available {
                return Err(AppError::InsufficientStock(StockShortfall {
                    item,
                    requested: demand,
                    available,
                }));
            }
        }

        self.decide(&mut tx, id, status, input.approved_by, input.remarks.as_deref())
            .await?;
        for line in &resolved {
            let updated = sqlx::query(
                "UPDATE requisition_lines SET approved_quantity = $1 WHERE id = $2 AND requisition_id = $3",
            )
            .bind(line.approved)
            .bind(line.line_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                return Err(AppError::Internal(format!(
                    "line {} of requisition {} vanished while locked",
                    line.line_id, id
                )));
            }
        }
        tx.commit().await?;

        tracing::info!(
            requisition_id = %id,
            status = status.as_str(),
            approved_by = %input.approved_by,
            "Requisition decided"
        );

        self.issue_lines(id).await
    }

    /// Issue whatever approved quantity is still unissued on an approved or
    /// partial requisition. Lines already fully issued are left alone, so
    /// calling this repeatedly never issues a line twice.
    pub async fn issue_outstanding(&self, id: Uuid) -> AppResult<ApprovalOutcome> {
        let current = self.get_requisition(id).await?;
        if !current.requisition.status.issues_stock() {
            return Err(AppError::InvalidStateTransition(format!(
                "requisition is {}, only approved or partial requisitions have stock to issue",
                current.requisition.status
            )));
        }

        self.issue_lines(id).await
    }

    /// Mark a pending requisition decided. Guarded on `pending` so two
    /// concurrent decisions cannot both succeed.
    async fn decide(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        status: RequisitionStatus,
        approved_by: Uuid,
        remarks: Option<&str>,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE requisitions
            SET status = $1, approved_by = $2, remarks = COALESCE($3, remarks), decided_at = NOW()
            WHERE id = $4 AND status = $5
            "#,
        )
        .bind(status.as_str())
        .bind(approved_by)
        .bind(remarks)
        .bind(id)
        .bind(RequisitionStatus::Pending.as_str())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::InvalidStateTransition(format!(
                "requisition {} is no longer pending",
                id
            )));
        }
        Ok(())
    }

    /// Issue every line of a decided requisition that still has outstanding
    /// approved quantity, one transaction per line.
    async fn issue_lines(&self, id: Uuid) -> AppResult<ApprovalOutcome> {
        let current = self.get_requisition(id).await?;
        let requisition = &current.requisition;

        let context = BatchContext {
            requisition_id: Some(requisition.id),
            issued_to: Some(requisition.department.as_str()),
            purpose: Some(requisition.purpose.as_str()),
            issued_by: requisition.approved_by,
        };

        let mut issued = Vec::new();
        let mut failures = Vec::new();

        for line in current.lines.iter().filter(|l| l.approved_quantity > 0) {
            let result = retry_on_conflict(self.allocation.conflict_retries, || {
                self.issue_line(line.id, &context)
            })
            .await;

            match result {
                Ok(Some(line_issued)) => issued.push(line_issued),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(
                        requisition_id = %requisition.id,
                        line_id = %line.id,
                        item = %line.item,
                        approved = line.approved_quantity,
                        retryable = err.is_retryable(),
                        error = %err,
                        "Requisition decided but line stock issue failed"
                    );
                    failures.push(line_failure(line, err));
                }
            }
        }

        let batch_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM issue_batches WHERE requisition_id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(ApprovalOutcome {
            requisition: current,
            batch_id,
            issued,
            failures,
        })
    }

    /// Issue the unissued part of one line in its own transaction.
    /// Returns `None` when nothing is outstanding.
    async fn issue_line(
        &self,
        line_id: Uuid,
        context: &BatchContext<'_>,
    ) -> AppResult<Option<LineIssued>> {
        let mut tx = self.db.begin().await?;

        // Row lock serializes concurrent issue runs for the same line
        let row = sqlx::query_as::<_, LockedLineRow>(
            "SELECT item, approved_quantity FROM requisition_lines WHERE id = $1 FOR UPDATE",
        )
        .bind(line_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Requisition line".to_string()))?;

        // Separate statement: its snapshot is taken after the lock is held,
        // so it sees issues committed by whoever held the lock before
        let issued: Quantity = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM issues WHERE requisition_line_id = $1",
        )
        .bind(line_id)
        .fetch_one(&mut *tx)
        .await?;

        let outstanding: Quantity = row.approved_quantity - issued;
        if outstanding <= 0 {
            return Ok(None);
        }

        let batch_id = requisition_batch(&mut tx, context).await?;
        let issues = issue_item(&mut tx, &row.item, outstanding, batch_id, Some(line_id)).await?;

        tx.commit().await?;

        Ok(Some(LineIssued {
            line_id,
            item: row.item,
            quantity: outstanding,
            issues,
        }))
    }
}
