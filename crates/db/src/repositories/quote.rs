use chrono::Utc;
use crewrate_core::domain::customer::CustomerId;
use crewrate_core::domain::quote::{Quote, QuoteId, QuoteLine, QuoteStatus};
use rust_decimal::Decimal;
use sqlx::Row;

use super::{decimal_from_text, timestamp_from_text, RepositoryError};
use crate::DbPool;

pub struct SqlQuoteRepository {
    pool: DbPool,
}

impl SqlQuoteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        customer_id: &CustomerId,
        title: &str,
        state_code: &str,
    ) -> Result<Quote, RepositoryError> {
        let now = Utc::now();
        let quote = Quote {
            id: QuoteId(format!("quote-{}", sqlx::types::Uuid::new_v4())),
            customer_id: customer_id.clone(),
            title: title.to_string(),
            state_code: state_code.to_string(),
            status: QuoteStatus::Draft,
            lines: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO quotes (id, customer_id, title, state_code, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&quote.id.0)
        .bind(&quote.customer_id.0)
        .bind(&quote.title)
        .bind(&quote.state_code)
        .bind(quote.status.as_str())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(quote)
    }

    /// Loads the quote with its lines ordered by trade id ascending; the
    /// ordering is part of the canonical snapshot input.
    pub async fn find_by_id(&self, id: &QuoteId) -> Result<Option<Quote>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, customer_id, title, state_code, status, created_at, updated_at
             FROM quotes WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status_raw: String = row.try_get("status")?;
        let created_at_raw: String = row.try_get("created_at")?;
        let updated_at_raw: String = row.try_get("updated_at")?;

        let mut quote = Quote {
            id: id.clone(),
            customer_id: CustomerId(row.try_get("customer_id")?),
            title: row.try_get("title")?,
            state_code: row.try_get("state_code")?,
            status: QuoteStatus::parse(&status_raw).ok_or_else(|| {
                RepositoryError::Decode(format!("unknown quote status `{status_raw}`"))
            })?,
            lines: Vec::new(),
            created_at: timestamp_from_text("created_at", &created_at_raw)?,
            updated_at: timestamp_from_text("updated_at", &updated_at_raw)?,
        };
        quote.lines = self.load_lines(id).await?;

        Ok(Some(quote))
    }

    /// Adds or replaces the line for one trade. Re-adding a trade updates
    /// `base_rate` in place; a quote never carries duplicate trades.
    pub async fn upsert_line(
        &self,
        quote_id: &QuoteId,
        trade_id: &str,
        base_rate: Decimal,
    ) -> Result<Option<QuoteLine>, RepositoryError> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM quotes WHERE id = ?")
            .bind(&quote_id.0)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Ok(None);
        }

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO quote_lines (id, quote_id, trade_id, base_rate, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (quote_id, trade_id)
            DO UPDATE SET base_rate = excluded.base_rate, updated_at = excluded.updated_at
            "#,
        )
        .bind(format!("line-{}", sqlx::types::Uuid::new_v4()))
        .bind(&quote_id.0)
        .bind(trade_id)
        .bind(base_rate.to_string())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Some(QuoteLine { trade_id: trade_id.to_string(), base_rate }))
    }

    async fn load_lines(&self, quote_id: &QuoteId) -> Result<Vec<QuoteLine>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT trade_id, CAST(base_rate AS TEXT) AS base_rate_text
             FROM quote_lines
             WHERE quote_id = ?
             ORDER BY trade_id ASC",
        )
        .bind(&quote_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let trade_id: String = row.try_get("trade_id")?;
                let base_rate_text: String = row.try_get("base_rate_text")?;
                Ok(QuoteLine {
                    trade_id,
                    base_rate: decimal_from_text("base_rate", &base_rate_text)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::Utc;
    use crewrate_core::domain::customer::CustomerId;
    use crewrate_core::domain::quote::{QuoteId, QuoteStatus};
    use rust_decimal::Decimal;

    use super::SqlQuoteRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    async fn insert_customer(pool: &DbPool, id: &str) -> CustomerId {
        sqlx::query("INSERT INTO customers (id, name, state_code, created_at) VALUES (?, ?, 'KY', ?)")
            .bind(id)
            .bind(format!("Customer {id}"))
            .bind(Utc::now().to_rfc3339())
            .execute(pool)
            .await
            .expect("insert customer");
        CustomerId(id.to_string())
    }

    fn dec(raw: &str) -> Decimal {
        Decimal::from_str(raw).expect("test decimal")
    }

    #[tokio::test]
    async fn created_quotes_round_trip_with_sorted_lines() {
        let pool = setup_pool().await;
        let repo = SqlQuoteRepository::new(pool.clone());
        let customer = insert_customer(&pool, "cust-1").await;

        let quote = repo
            .create(&customer, "Maintenance outage crew", "KY")
            .await
            .expect("create quote");
        assert_eq!(quote.status, QuoteStatus::Draft);

        repo.upsert_line(&quote.id, "millwright", dec("85")).await.expect("add line");
        repo.upsert_line(&quote.id, "electrician", dec("72.50")).await.expect("add line");

        let loaded = repo.find_by_id(&quote.id).await.expect("load").expect("quote exists");
        assert_eq!(loaded.lines.len(), 2);
        assert_eq!(loaded.lines[0].trade_id, "electrician");
        assert_eq!(loaded.lines[1].trade_id, "millwright");

        pool.close().await;
    }

    #[tokio::test]
    async fn re_adding_a_trade_updates_the_rate_in_place() {
        let pool = setup_pool().await;
        let repo = SqlQuoteRepository::new(pool.clone());
        let customer = insert_customer(&pool, "cust-2").await;
        let quote = repo.create(&customer, "Night shift", "TN").await.expect("create quote");

        repo.upsert_line(&quote.id, "millwright", dec("85")).await.expect("add line");
        repo.upsert_line(&quote.id, "millwright", dec("90")).await.expect("update line");

        let loaded = repo.find_by_id(&quote.id).await.expect("load").expect("quote exists");
        assert_eq!(loaded.lines.len(), 1, "same trade must not duplicate");
        assert_eq!(loaded.lines[0].base_rate, dec("90"));

        pool.close().await;
    }

    #[tokio::test]
    async fn upsert_against_missing_quote_reports_absence() {
        let pool = setup_pool().await;
        let repo = SqlQuoteRepository::new(pool.clone());

        let outcome = repo
            .upsert_line(&QuoteId("quote-ghost".to_string()), "laborer", dec("18.25"))
            .await
            .expect("upsert call");
        assert!(outcome.is_none());

        pool.close().await;
    }
}
