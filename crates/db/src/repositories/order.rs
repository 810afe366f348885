use chrono::{NaiveDate, Utc};
use crewrate_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crewrate_core::domain::customer::CustomerId;
use crewrate_core::domain::order::{validate_transition, Order, OrderId, OrderStatus, OrderStatusError};
use crewrate_core::domain::worklog::{HoursEntry, HoursStatus, Invoice};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use super::{decimal_from_text, date_from_text, timestamp_from_text, RepositoryError};
use crate::DbPool;

/// Order lifecycle persistence.
///
/// `apply_status` runs the whole read-validate-write sequence in one
/// transaction so concurrent status changes cannot interleave into a
/// lost update or an off-graph transition. Check order is fixed: load,
/// structural validation, permission, completion gates, write.
pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, customer_id: &CustomerId) -> Result<Order, RepositoryError> {
        let now = Utc::now();
        let order = Order {
            id: OrderId(format!("order-{}", sqlx::types::Uuid::new_v4())),
            customer_id: customer_id.clone(),
            status: OrderStatus::Draft,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO orders (id, customer_id, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&order.id.0)
        .bind(&order.customer_id.0)
        .bind(order.status.as_str())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(order)
    }

    pub async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, customer_id, status, created_at, updated_at FROM orders WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    pub async fn apply_status<S>(
        &self,
        order_id: &OrderId,
        next: OrderStatus,
        actor: &str,
        permissions: &[String],
        sink: &S,
    ) -> Result<Order, OrderStatusError>
    where
        S: AuditSink,
    {
        let reject = |reason: &str| {
            sink.emit(
                AuditEvent::new(
                    Some(order_id.0.clone()),
                    "order.status_rejected",
                    AuditCategory::Orders,
                    actor,
                    AuditOutcome::Rejected,
                )
                .with_metadata("requested", next.as_str())
                .with_metadata("reason", reason),
            );
        };

        let mut tx = self.pool.begin().await.map_err(storage)?;

        let row = sqlx::query(
            "SELECT id, customer_id, status, created_at, updated_at FROM orders WHERE id = ?",
        )
        .bind(&order_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage)?;
        let order = row
            .as_ref()
            .map(order_from_row)
            .transpose()
            .map_err(|error| OrderStatusError::Storage(error.to_string()))?
            .ok_or_else(|| OrderStatusError::NotFound(order_id.0.clone()))?;

        let required = match validate_transition(order.status, next) {
            Ok(required) => required,
            Err(error) => {
                reject(&error.to_string());
                return Err(error.into());
            }
        };

        if !permissions.iter().any(|granted| granted == required) {
            reject("permission denied");
            return Err(OrderStatusError::PermissionDenied { required: required.to_string() });
        }

        if next == OrderStatus::Completed {
            let pending = count_hours(&mut tx, order_id, HoursStatus::Pending).await?;
            let rejected = count_hours(&mut tx, order_id, HoursStatus::Rejected).await?;
            if pending > 0 || rejected > 0 {
                reject("unresolved hours entries");
                return Err(OrderStatusError::HoursOutstanding { pending, rejected });
            }

            let invoices: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM invoices WHERE order_id = ?")
                    .bind(&order_id.0)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(storage)?;
            if invoices == 0 {
                reject("no invoice on file");
                return Err(OrderStatusError::InvoiceRequired);
            }
        }

        let now = Utc::now();
        sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?")
            .bind(next.as_str())
            .bind(now.to_rfc3339())
            .bind(&order_id.0)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        tx.commit().await.map_err(storage)?;

        sink.emit(
            AuditEvent::new(
                Some(order_id.0.clone()),
                "order.status_changed",
                AuditCategory::Orders,
                actor,
                AuditOutcome::Success,
            )
            .with_metadata("from", order.status.as_str())
            .with_metadata("to", next.as_str()),
        );

        Ok(Order { status: next, updated_at: now, ..order })
    }

    pub async fn record_hours(
        &self,
        order_id: &OrderId,
        worker_id: &str,
        status: HoursStatus,
        hours: Decimal,
        work_date: NaiveDate,
    ) -> Result<Option<HoursEntry>, RepositoryError> {
        if !self.order_exists(order_id).await? {
            return Ok(None);
        }

        let now = Utc::now();
        let entry = HoursEntry {
            id: format!("hours-{}", sqlx::types::Uuid::new_v4()),
            order_id: order_id.clone(),
            worker_id: worker_id.to_string(),
            status,
            hours,
            work_date,
            created_at: now,
        };

        sqlx::query(
            "INSERT INTO hours_entries (id, order_id, worker_id, status, hours, work_date, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&order_id.0)
        .bind(worker_id)
        .bind(status.as_str())
        .bind(hours.to_string())
        .bind(work_date.to_string())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(Some(entry))
    }

    pub async fn record_invoice(
        &self,
        order_id: &OrderId,
        total: Decimal,
    ) -> Result<Option<Invoice>, RepositoryError> {
        if !self.order_exists(order_id).await? {
            return Ok(None);
        }

        let now = Utc::now();
        let invoice = Invoice {
            id: format!("inv-{}", sqlx::types::Uuid::new_v4()),
            order_id: order_id.clone(),
            total,
            issued_at: now,
        };

        sqlx::query("INSERT INTO invoices (id, order_id, total, issued_at) VALUES (?, ?, ?, ?)")
            .bind(&invoice.id)
            .bind(&order_id.0)
            .bind(total.to_string())
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(Some(invoice))
    }

    pub async fn list_hours(&self, order_id: &OrderId) -> Result<Vec<HoursEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, order_id, worker_id, status, CAST(hours AS TEXT) AS hours_text,
                    work_date, created_at
             FROM hours_entries
             WHERE order_id = ?
             ORDER BY work_date ASC, created_at ASC",
        )
        .bind(&order_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let status_raw: String = row.try_get("status")?;
                let hours_text: String = row.try_get("hours_text")?;
                let work_date_raw: String = row.try_get("work_date")?;
                let created_at_raw: String = row.try_get("created_at")?;
                Ok(HoursEntry {
                    id: row.try_get("id")?,
                    order_id: OrderId(row.try_get("order_id")?),
                    worker_id: row.try_get("worker_id")?,
                    status: HoursStatus::parse(&status_raw).ok_or_else(|| {
                        RepositoryError::Decode(format!("unknown hours status `{status_raw}`"))
                    })?,
                    hours: decimal_from_text("hours", &hours_text)?,
                    work_date: date_from_text("work_date", &work_date_raw)?,
                    created_at: timestamp_from_text("created_at", &created_at_raw)?,
                })
            })
            .collect()
    }

    async fn order_exists(&self, order_id: &OrderId) -> Result<bool, RepositoryError> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM orders WHERE id = ?")
            .bind(&order_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(exists.is_some())
    }
}

async fn count_hours(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    order_id: &OrderId,
    status: HoursStatus,
) -> Result<i64, OrderStatusError> {
    sqlx::query_scalar("SELECT COUNT(*) FROM hours_entries WHERE order_id = ? AND status = ?")
        .bind(&order_id.0)
        .bind(status.as_str())
        .fetch_one(&mut **tx)
        .await
        .map_err(storage)
}

fn storage(error: sqlx::Error) -> OrderStatusError {
    OrderStatusError::Storage(error.to_string())
}

fn order_from_row(row: &SqliteRow) -> Result<Order, RepositoryError> {
    let status_raw: String = row.try_get("status")?;
    let created_at_raw: String = row.try_get("created_at")?;
    let updated_at_raw: String = row.try_get("updated_at")?;

    Ok(Order {
        id: OrderId(row.try_get("id")?),
        customer_id: CustomerId(row.try_get("customer_id")?),
        status: OrderStatus::parse(&status_raw).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown order status `{status_raw}`"))
        })?,
        created_at: timestamp_from_text("created_at", &created_at_raw)?,
        updated_at: timestamp_from_text("updated_at", &updated_at_raw)?,
    })
}
