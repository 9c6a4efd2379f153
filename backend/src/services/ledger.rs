//! Lot ledger service: purchase recording and stock queries

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{Issue, Lot, LotLedger, Quantity, RecordPurchaseInput, StockLevel};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::issue::IssueRow;

/// Lot ledger service for purchases and available stock
#[derive(Clone)]
pub struct LedgerService {
    db: PgPool,
}

/// Row for lot queries
#[derive(Debug, FromRow)]
pub(crate) struct LotRow {
    id: Uuid,
    item: String,
    original_quantity: i64,
    remaining_quantity: i64,
    rate: Decimal,
    supplier: Option<String>,
    reference: Option<String>,
    acquired_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<LotRow> for Lot {
    fn from(r: LotRow) -> Self {
        Lot {
            id: r.id,
            item: r.item,
            original_quantity: r.original_quantity,
            remaining_quantity: r.remaining_quantity,
            rate: r.rate,
            supplier: r.supplier,
            reference: r.reference,
            acquired_at: r.acquired_at,
            created_at: r.created_at,
        }
    }
}

/// Stock position of one item with its available lots
#[derive(Debug, Clone, Serialize)]
pub struct ItemStock {
    pub item: String,
    pub available: Quantity,
    /// Remaining stock valued at each lot's own rate
    pub value: Decimal,
    pub lots: Vec<Lot>,
}

/// Load the available lots of `item` on an open connection or transaction
pub(crate) async fn load_ledger(conn: &mut PgConnection, item: &str) -> AppResult<LotLedger> {
    let rows = sqlx::query_as::<_, LotRow>(
        r#"
        SELECT id, item, original_quantity, remaining_quantity, rate, supplier, reference,
               acquired_at, created_at
        FROM lots
        WHERE item = $1 AND remaining_quantity > 0
        ORDER BY acquired_at ASC, id ASC
        "#,
    )
    .bind(item)
    .fetch_all(&mut *conn)
    .await?;

    Ok(LotLedger::new(item, rows.into_iter().map(Lot::from)))
}

/// Sum of remaining quantities for `item`
pub(crate) async fn total_available(conn: &mut PgConnection, item: &str) -> AppResult<Quantity> {
    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(SUM(remaining_quantity), 0)::BIGINT FROM lots WHERE item = $1 AND remaining_quantity > 0",
    )
    .bind(item)
    .fetch_one(&mut *conn)
    .await?;

    Ok(total)
}

impl LedgerService {
    /// Create a new LedgerService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Record a purchase, creating a lot whose remaining quantity equals
    /// the purchased quantity
    pub async fn record_purchase(&self, input: RecordPurchaseInput) -> AppResult<Lot> {
        input.validate()?;

        let acquired_at = input.acquired_at.unwrap_or_else(Utc::now);

        let row = sqlx::query_as::<_, LotRow>(
            r#"
            INSERT INTO lots (item, original_quantity, remaining_quantity, rate, supplier, reference, acquired_at)
            VALUES ($1, $2, $2, $3, $4, $5, $6)
            RETURNING id, item, original_quantity, remaining_quantity, rate, supplier, reference,
                      acquired_at, created_at
            "#,
        )
        .bind(input.item_code())
        .bind(input.quantity)
        .bind(input.rate)
        .bind(&input.supplier)
        .bind(&input.reference)
        .bind(acquired_at)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(
            lot_id = %row.id,
            item = %row.item,
            quantity = row.original_quantity,
            cost = %input.total_cost(),
            "Purchase recorded"
        );

        Ok(row.into())
    }

    /// Get a lot by ID
    pub async fn get_lot(&self, lot_id: Uuid) -> AppResult<Lot> {
        let row = sqlx::query_as::<_, LotRow>(
            r#"
            SELECT id, item, original_quantity, remaining_quantity, rate, supplier, reference,
                   acquired_at, created_at
            FROM lots
            WHERE id = $1
            "#,
        )
        .bind(lot_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Lot".to_string()))?;

        Ok(row.into())
    }

    /// All lots of an item, drained ones included, oldest first
    pub async fn list_lots(&self, item: &str) -> AppResult<Vec<Lot>> {
        let rows = sqlx::query_as::<_, LotRow>(
            r#"
            SELECT id, item, original_quantity, remaining_quantity, rate, supplier, reference,
                   acquired_at, created_at
            FROM lots
            WHERE item = $1
            ORDER BY acquired_at ASC, id ASC
            "#,
        )
        .bind(item.trim())
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Lot::from).collect())
    }

    /// Lots of an item with stock left, in the order they will be drawn
    pub async fn available_lots(&self, item: &str) -> AppResult<Vec<Lot>> {
        let mut conn = self.db.acquire().await?;
        let ledger = load_ledger(&mut *conn, item.trim()).await?;
        Ok(ledger.available_lots().cloned().collect())
    }

    /// Total stock of an item. Advisory only: a concurrent issue may
    /// consume it before the caller acts on the number.
    pub async fn total_available(&self, item: &str) -> AppResult<Quantity> {
        let mut conn = self.db.acquire().await?;
        total_available(&mut *conn, item.trim()).await
    }

    /// Stock position for one item
    pub async fn item_stock(&self, item: &str) -> AppResult<ItemStock> {
        let mut conn = self.db.acquire().await?;
        let ledger = load_ledger(&mut *conn, item.trim()).await?;
        let lots: Vec<Lot> = ledger.available_lots().cloned().collect();
        Ok(ItemStock {
            item: ledger.item().to_string(),
            available: ledger.total_available(),
            value: lots.iter().map(Lot::remaining_value).sum(),
            lots,
        })
    }

    /// Available stock per item
    pub async fn stock_summary(&self) -> AppResult<Vec<StockLevel>> {
        let rows = sqlx::query_as::<_, (String, i64, i64)>(
            r#"
            SELECT item, SUM(remaining_quantity)::BIGINT, COUNT(*)
            FROM lots
            WHERE remaining_quantity > 0
            GROUP BY item
            ORDER BY item
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| StockLevel {
                item: r.0,
                available: r.1,
                lot_count: r.2,
            })
            .collect())
    }

    /// Delete a purchase that nothing has been issued from
    pub async fn delete_purchase(&self, lot_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM lots
            WHERE id = $1
              AND remaining_quantity = original_quantity
              AND NOT EXISTS (SELECT 1 FROM issues WHERE lot_id = $1)
            "#,
        )
        .bind(lot_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            // Tell "never existed" apart from "already drawn from"
            let lot = self.get_lot(lot_id).await?;
            return Err(AppError::Conflict {
                resource: "lot".to_string(),
                message: format!(
                    "Lot {} has {} of {} issued and cannot be deleted",
                    lot.id,
                    lot.consumed_quantity(),
                    lot.original_quantity
                ),
            });
        }

        tracing::info!(%lot_id, "Unconsumed purchase deleted");
        Ok(())
    }

    /// Issues drawn from a lot, oldest first
    pub async fn lot_issues(&self, lot_id: Uuid) -> AppResult<Vec<Issue>> {
        // Validate lot exists
        self.get_lot(lot_id).await?;

        let rows = sqlx::query_as::<_, IssueRow>(
            r#"
            SELECT id, batch_id, lot_id, item, quantity, rate, requisition_line_id, created_at
            FROM issues
            WHERE lot_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(lot_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Issue::from).collect())
    }
}
