//! Issue committer: applies FIFO allocation plans to stored lots
//!
//! Every lot decrement is a conditional update
//! (`remaining_quantity >= take`) whose affected-row count is checked.
//! A zero count means another commit drained the lot after this one
//! planned; the surrounding transaction is dropped, which rolls back every
//! decrement and issue row written so far, and the caller gets a
//! retryable [`AppError::StockConflict`].

use std::collections::hash_map::{Entry, HashMap};
use std::future::Future;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::{
    allocate, total_quantity, total_value, AllocationPlan, DirectIssueInput, Issue, IssueBatch,
    IssueBatchWithIssues, LedgerError, LotLedger, Quantity,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::config::AllocationConfig;
use crate::error::{AppError, AppResult};
use crate::services::ledger::load_ledger;

/// Issue service for dispatching stock
#[derive(Clone)]
pub struct IssueService {
    db: PgPool,
    allocation: AllocationConfig,
}

/// Row for issue queries
#[derive(Debug, FromRow)]
pub(crate) struct IssueRow {
    id: Uuid,
    batch_id: Uuid,
    lot_id: Uuid,
    item: String,
    quantity: i64,
    rate: Decimal,
    requisition_line_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl From<IssueRow> for Issue {
    fn from(r: IssueRow) -> Self {
        Issue {
            id: r.id,
            batch_id: r.batch_id,
            lot_id: r.lot_id,
            item: r.item,
            quantity: r.quantity,
            rate: r.rate,
            requisition_line_id: r.requisition_line_id,
            created_at: r.created_at,
        }
    }
}

/// Row for issue batch queries
#[derive(Debug, FromRow)]
pub(crate) struct IssueBatchRow {
    id: Uuid,
    requisition_id: Option<Uuid>,
    issued_to: Option<String>,
    purpose: Option<String>,
    issued_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl From<IssueBatchRow> for IssueBatch {
    fn from(r: IssueBatchRow) -> Self {
        IssueBatch {
            id: r.id,
            requisition_id: r.requisition_id,
            issued_to: r.issued_to,
            purpose: r.purpose,
            issued_by: r.issued_by,
            created_at: r.created_at,
        }
    }
}

/// Grouping details for a new issue batch
#[derive(Debug, Clone, Default)]
pub(crate) struct BatchContext<'a> {
    pub requisition_id: Option<Uuid>,
    pub issued_to: Option<&'a str>,
    pub purpose: Option<&'a str>,
    pub issued_by: Option<Uuid>,
}

/// Run `op` again while it fails with a stock conflict, up to `retries` extra times
pub(crate) async fn retry_on_conflict<T, F, Fut>(retries: u32, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(err) if err.is_retryable() && attempt < retries => {
                attempt += 1;
                tracing::warn!(error = %err, attempt, "Stock changed during commit, re-planning");
            }
            result => return result,
        }
    }
}

/// Insert a grouping record
pub(crate) async fn insert_batch(
    conn: &mut PgConnection,
    context: &BatchContext<'_>,
) -> AppResult<IssueBatch> {
    let row = sqlx::query_as::<_, IssueBatchRow>(
        r#"
        INSERT INTO issue_batches (requisition_id, issued_to, purpose, issued_by)
        VALUES ($1, $2, $3, $4)
        RETURNING id, requisition_id, issued_to, purpose, issued_by, created_at
        "#,
    )
    .bind(context.requisition_id)
    .bind(context.issued_to)
    .bind(context.purpose)
    .bind(context.issued_by)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.into())
}

/// Find the grouping record of a requisition, creating it on first use
pub(crate) async fn requisition_batch(
    conn: &mut PgConnection,
    context: &BatchContext<'_>,
) -> AppResult<Uuid> {
    let requisition_id = context
        .requisition_id
        .ok_or_else(|| AppError::Internal("requisition batch without requisition".to_string()))?;

    sqlx::query(
        r#"
        INSERT INTO issue_batches (requisition_id, issued_to, purpose, issued_by)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (requisition_id) WHERE requisition_id IS NOT NULL DO NOTHING
        "#,
    )
    .bind(requisition_id)
    .bind(context.issued_to)
    .bind(context.purpose)
    .bind(context.issued_by)
    .execute(&mut *conn)
    .await?;

    let batch_id = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM issue_batches WHERE requisition_id = $1",
    )
    .bind(requisition_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(batch_id)
}

/// Apply one plan inside the caller's transaction: guarded decrement and
/// one issue row per plan entry. `ledger` is brought in step afterwards so
/// later plans in the same transaction see what is left.
pub(crate) async fn commit_plan(
    conn: &mut PgConnection,
    ledger: &mut LotLedger,
    plan: &AllocationPlan,
    batch_id: Uuid,
    requisition_line_id: Option<Uuid>,
) -> AppResult<Vec<Issue>> {
    let mut issues = Vec::with_capacity(plan.entries.len());

    for entry in &plan.entries {
        let rate = ledger
            .lot(entry.lot_id)
            .map(|lot| lot.rate)
            .ok_or(LedgerError::UnknownLot(entry.lot_id))?;

        let updated = sqlx::query(
            r#"
            UPDATE lots
            SET remaining_quantity = remaining_quantity - $1
            WHERE id = $2 AND remaining_quantity >= $1
            "#,
        )
        .bind(entry.quantity)
        .bind(entry.lot_id)
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() == 0 {
            tracing::warn!(
                item = %plan.item,
                lot_id = %entry.lot_id,
                planned = entry.quantity,
                "Lot drained by a concurrent issue"
            );
            return Err(AppError::StockConflict {
                item: plan.item.clone(),
                lot_id: entry.lot_id,
            });
        }

        let row = sqlx::query_as::<_, IssueRow>(
            r#"
            INSERT INTO issues (batch_id, lot_id, item, quantity, rate, requisition_line_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, batch_id, lot_id, item, quantity, rate, requisition_line_id, created_at
            "#,
        )
        .bind(batch_id)
        .bind(entry.lot_id)
        .bind(&plan.item)
        .bind(entry.quantity)
        .bind(rate)
        .bind(requisition_line_id)
        .fetch_one(&mut *conn)
        .await?;

        issues.push(row.into());
    }

    ledger.apply(plan)?;

    tracing::info!(
        item = %plan.item,
        quantity = plan.total(),
        lots = plan.lot_count(),
        %batch_id,
        "Stock issued"
    );

    Ok(issues)
}

/// Plan and commit `quantity` of `item` inside the caller's transaction
pub(crate) async fn issue_item(
    conn: &mut PgConnection,
    item: &str,
    quantity: Quantity,
    batch_id: Uuid,
    requisition_line_id: Option<Uuid>,
) -> AppResult<Vec<Issue>> {
    let mut ledger = load_ledger(&mut *conn, item).await?;
    let plan = allocate(&ledger, quantity)?;
    commit_plan(conn, &mut ledger, &plan, batch_id, requisition_line_id).await
}

impl IssueService {
    /// Create a new IssueService instance
    pub fn new(db: PgPool, allocation: AllocationConfig) -> Self {
        Self { db, allocation }
    }

    /// Issue stock for one or more items under a single grouping record.
    /// All lines commit together or not at all.
    pub async fn issue_stock(&self, input: DirectIssueInput) -> AppResult<IssueBatchWithIssues> {
        input.validate()?;
        for line in &input.items {
            line.validate()?;
        }

        retry_on_conflict(self.allocation.conflict_retries, || self.try_issue_stock(&input)).await
    }

    async fn try_issue_stock(&self, input: &DirectIssueInput) -> AppResult<IssueBatchWithIssues> {
        let mut tx = self.db.begin().await?;

        let batch = insert_batch(
            &mut tx,
            &BatchContext {
                requisition_id: None,
                issued_to: input.issued_to.as_deref(),
                purpose: input.purpose.as_deref(),
                issued_by: input.issued_by,
            },
        )
        .await?;

        // Lots are locked item by item in code order, so two calls naming
        // the same items in different orders cannot deadlock
        let mut lines: Vec<(&str, Quantity)> = input
            .items
            .iter()
            .map(|line| (line.item.trim(), line.quantity))
            .collect();
        lines.sort_by(|a, b| a.0.cmp(b.0));

        // One ledger per item so repeated items plan against what earlier lines left
        let mut ledgers: HashMap<String, LotLedger> = HashMap::new();
        let mut issues = Vec::new();

        for (item, quantity) in lines {
            let ledger = match ledgers.entry(item.to_string()) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(e) => e.insert(load_ledger(&mut tx, item).await?),
            };
            let plan = allocate(ledger, quantity)?;
            issues.extend(commit_plan(&mut tx, ledger, &plan, batch.id, None).await?);
        }

        tx.commit().await?;

        Ok(IssueBatchWithIssues {
            total_quantity: total_quantity(&issues),
            total_value: total_value(&issues),
            batch,
            issues,
        })
    }

    /// Get an issue batch with its issues
    pub async fn get_batch(&self, batch_id: Uuid) -> AppResult<IssueBatchWithIssues> {
        let batch: IssueBatch = sqlx::query_as::<_, IssueBatchRow>(
            r#"
            SELECT id, requisition_id, issued_to, purpose, issued_by, created_at
            FROM issue_batches
            WHERE id = $1
            "#,
        )
        .bind(batch_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Issue batch".to_string()))?
        .into();

        let issues: Vec<Issue> = sqlx::query_as::<_, IssueRow>(
            r#"
            SELECT i.id, i.batch_id, i.lot_id, i.item, i.quantity, i.rate,
                   i.requisition_line_id, i.created_at
            FROM issues i
            JOIN lots l ON l.id = i.lot_id
            WHERE i.batch_id = $1
            ORDER BY i.item, l.acquired_at, l.id
            "#,
        )
        .bind(batch_id)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(Issue::from)
        .collect();

        Ok(IssueBatchWithIssues {
            total_quantity: total_quantity(&issues),
            total_value: total_value(&issues),
            batch,
            issues,
        })
    }
}
