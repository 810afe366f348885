use chrono::Utc;
use crewrate_core::burden::{
    BurdenQuery, BurdenRateSource, BurdenResolver, BurdenScope, ResolvedBurdenMap,
};
use crewrate_core::domain::quote::{Quote, QuoteId, QuoteStatus};
use crewrate_core::economics::{
    compute_economics, input_hash, EconomicsError, EconomicsSnapshot, EconomicsSummary,
    LineEconomics,
};
use sqlx::{sqlite::SqliteRow, Row};

use super::{decimal_from_text, timestamp_from_text, RepositoryError, SqlQuoteRepository};
use crate::DbPool;

/// Content-addressed economics snapshot generation.
///
/// Generation order: load and validate the quote, compute the canonical
/// input hash, return any existing `(quote_id, input_hash)` snapshot
/// unchanged, otherwise resolve burden, compute line economics, and
/// persist snapshot plus quote-status flip in one transaction.
/// Idempotency under concurrency rests on the unique constraint over
/// `(quote_id, input_hash)`: the insert tolerates conflicts and the
/// refetch returns whichever row won.
pub struct SqlEconomicsRepository {
    pool: DbPool,
}

impl SqlEconomicsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn generate<S>(
        &self,
        quote_id: &QuoteId,
        resolver: &BurdenResolver<S>,
    ) -> Result<EconomicsSnapshot, EconomicsError>
    where
        S: BurdenRateSource,
    {
        let quote = self.load_quote(quote_id).await?;
        if quote.lines.is_empty() {
            return Err(EconomicsError::EmptyQuote(quote_id.0.clone()));
        }

        let hash = input_hash(&quote.id, &quote.state_code, &quote.lines)?;
        if let Some(existing) = self.find_snapshot(quote_id, &hash).await? {
            return Ok(existing);
        }

        let burden_map = resolver
            .resolve(&BurdenQuery {
                scope: BurdenScope {
                    state_code: Some(quote.state_code.clone()),
                    ..BurdenScope::default()
                },
                effective_at: Utc::now().date_naive(),
            })
            .await?;

        let (lines, summary) = compute_economics(&quote.lines, &burden_map);
        let generated_at = Utc::now();

        let burden_map_json = serde_json::to_string(&burden_map)
            .map_err(|error| EconomicsError::Encoding(error.to_string()))?;
        let lines_json = serde_json::to_string(&lines)
            .map_err(|error| EconomicsError::Encoding(error.to_string()))?;

        let mut tx = self.pool.begin().await.map_err(storage)?;
        sqlx::query(
            r#"
            INSERT INTO economics_snapshots (
                id, quote_id, input_hash, burden_map_json, lines_json,
                total_burden_percent, burden_multiplier, generated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (quote_id, input_hash) DO NOTHING
            "#,
        )
        .bind(format!("snap-{}", sqlx::types::Uuid::new_v4()))
        .bind(&quote_id.0)
        .bind(&hash)
        .bind(burden_map_json)
        .bind(lines_json)
        .bind(summary.total_burden_percent.to_string())
        .bind(summary.burden_multiplier.to_string())
        .bind(generated_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        sqlx::query("UPDATE quotes SET status = ?, updated_at = ? WHERE id = ?")
            .bind(QuoteStatus::Generated.as_str())
            .bind(generated_at.to_rfc3339())
            .bind(&quote_id.0)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        tx.commit().await.map_err(storage)?;

        // Refetch the canonical row; a concurrent generation may have won
        // the conflict and its row is the one every caller must see.
        self.find_snapshot(quote_id, &hash).await?.ok_or_else(|| {
            EconomicsError::Storage("snapshot row missing after insert".to_string())
        })
    }

    pub async fn find_snapshot(
        &self,
        quote_id: &QuoteId,
        hash: &str,
    ) -> Result<Option<EconomicsSnapshot>, EconomicsError> {
        let row = sqlx::query(
            "SELECT id, quote_id, input_hash, burden_map_json, lines_json,
                    CAST(total_burden_percent AS TEXT) AS total_burden_percent_text,
                    CAST(burden_multiplier AS TEXT) AS burden_multiplier_text,
                    generated_at
             FROM economics_snapshots
             WHERE quote_id = ? AND input_hash = ?
             LIMIT 1",
        )
        .bind(&quote_id.0)
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.as_ref().map(snapshot_from_row).transpose()
    }

    async fn load_quote(&self, quote_id: &QuoteId) -> Result<Quote, EconomicsError> {
        SqlQuoteRepository::new(self.pool.clone())
            .find_by_id(quote_id)
            .await
            .map_err(|error| match error {
                RepositoryError::Database(inner) => EconomicsError::Storage(inner.to_string()),
                RepositoryError::Decode(message) => EconomicsError::Storage(message),
            })?
            .ok_or_else(|| EconomicsError::QuoteNotFound(quote_id.0.clone()))
    }
}

fn storage(error: sqlx::Error) -> EconomicsError {
    EconomicsError::Storage(error.to_string())
}

fn snapshot_from_row(row: &SqliteRow) -> Result<EconomicsSnapshot, EconomicsError> {
    let decode = |message: String| EconomicsError::Storage(message);

    let burden_map_json: String =
        row.try_get("burden_map_json").map_err(|e| decode(e.to_string()))?;
    let lines_json: String = row.try_get("lines_json").map_err(|e| decode(e.to_string()))?;
    let total_text: String =
        row.try_get("total_burden_percent_text").map_err(|e| decode(e.to_string()))?;
    let multiplier_text: String =
        row.try_get("burden_multiplier_text").map_err(|e| decode(e.to_string()))?;
    let generated_at_raw: String =
        row.try_get("generated_at").map_err(|e| decode(e.to_string()))?;

    let burden_map: ResolvedBurdenMap = serde_json::from_str(&burden_map_json)
        .map_err(|e| decode(format!("invalid burden map payload: {e}")))?;
    let lines: Vec<LineEconomics> = serde_json::from_str(&lines_json)
        .map_err(|e| decode(format!("invalid line economics payload: {e}")))?;

    Ok(EconomicsSnapshot {
        id: row.try_get("id").map_err(|e| decode(e.to_string()))?,
        quote_id: QuoteId(row.try_get("quote_id").map_err(|e| decode(e.to_string()))?),
        input_hash: row.try_get("input_hash").map_err(|e| decode(e.to_string()))?,
        burden_map,
        lines,
        summary: EconomicsSummary {
            total_burden_percent: decimal_from_text("total_burden_percent", &total_text)
                .map_err(|e| decode(e.to_string()))?,
            burden_multiplier: decimal_from_text("burden_multiplier", &multiplier_text)
                .map_err(|e| decode(e.to_string()))?,
        },
        generated_at: timestamp_from_text("generated_at", &generated_at_raw)
            .map_err(|e| decode(e.to_string()))?,
    })
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use crewrate_core::burden::{BurdenRateSource, BurdenResolver, BurdenSourceError, RateLookup};
    use crewrate_core::domain::burden::{BurdenCategory, NewBurdenRate};
    use crewrate_core::domain::customer::CustomerId;
    use crewrate_core::domain::quote::{QuoteId, QuoteStatus};
    use crewrate_core::economics::EconomicsError;
    use rust_decimal::Decimal;

    use super::SqlEconomicsRepository;
    use crate::repositories::{SqlBurdenRateRepository, SqlQuoteRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    const ACTOR: &str = "usr-test-admin";

    async fn setup_pool() -> DbPool {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn dec(raw: &str) -> Decimal {
        Decimal::from_str(raw).expect("test decimal")
    }

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::from_str(raw).expect("test date")
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

    async fn seed_fifteen_percent_burden(pool: &DbPool) {
        let rates = SqlBurdenRateRepository::new(pool.clone());
        rates
            .create(
                NewBurdenRate::global(BurdenCategory::Fica, dec("7.65"), date("2025-01-01")),
                ACTOR,
            )
            .await
            .expect("seed fica");
        rates
            .create(
                NewBurdenRate::global(BurdenCategory::Suta, dec("7.35"), date("2025-01-01")),
                ACTOR,
            )
            .await
            .expect("seed suta");
    }

    async fn quote_with_millwright(pool: &DbPool, customer: &CustomerId) -> QuoteId {
        let quotes = SqlQuoteRepository::new(pool.clone());
        let quote = quotes.create(customer, "Outage crew", "KY").await.expect("create quote");
        quotes.upsert_line(&quote.id, "millwright", dec("85")).await.expect("add line");
        quote.id
    }

    /// Counts tier lookups so cached-return paths can prove they skip
    /// burden resolution entirely.
    struct CountingSource {
        inner: SqlBurdenRateRepository,
        lookups: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BurdenRateSource for CountingSource {
        async fn latest_effective(
            &self,
            lookup: RateLookup<'_>,
        ) -> Result<Option<Decimal>, BurdenSourceError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.latest_effective(lookup).await
        }
    }

    #[tokio::test]
    async fn generate_for_missing_quote_is_not_found() {
        let pool = setup_pool().await;
        let repo = SqlEconomicsRepository::new(pool.clone());
        let resolver = BurdenResolver::new(SqlBurdenRateRepository::new(pool.clone()));

        let error = repo
            .generate(&QuoteId("quote-ghost".to_string()), &resolver)
            .await
            .expect_err("missing quote");
        assert!(matches!(error, EconomicsError::QuoteNotFound(id) if id == "quote-ghost"));

        pool.close().await;
    }

    #[tokio::test]
    async fn generate_rejects_quotes_without_lines() {
        let pool = setup_pool().await;
        let customer = insert_customer(&pool, "cust-empty").await;
        let quote = SqlQuoteRepository::new(pool.clone())
            .create(&customer, "Empty quote", "KY")
            .await
            .expect("create quote");

        let repo = SqlEconomicsRepository::new(pool.clone());
        let resolver = BurdenResolver::new(SqlBurdenRateRepository::new(pool.clone()));
        let error = repo.generate(&quote.id, &resolver).await.expect_err("zero lines");
        assert!(matches!(error, EconomicsError::EmptyQuote(_)));

        let snapshots: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM economics_snapshots")
            .fetch_one(&pool)
            .await
            .expect("count snapshots");
        assert_eq!(snapshots, 0, "validation failures must not write partial snapshots");

        let status: String = sqlx::query_scalar("SELECT status FROM quotes WHERE id = ?")
            .bind(&quote.id.0)
            .fetch_one(&pool)
            .await
            .expect("quote status");
        assert_eq!(status, "DRAFT");

        pool.close().await;
    }

    #[tokio::test]
    async fn generate_computes_burdened_rates_and_flips_status() {
        let pool = setup_pool().await;
        seed_fifteen_percent_burden(&pool).await;
        let customer = insert_customer(&pool, "cust-gen").await;
        let quote_id = quote_with_millwright(&pool, &customer).await;

        let repo = SqlEconomicsRepository::new(pool.clone());
        let resolver = BurdenResolver::new(SqlBurdenRateRepository::new(pool.clone()));
        let snapshot = repo.generate(&quote_id, &resolver).await.expect("generate");

        assert_eq!(snapshot.summary.total_burden_percent, dec("15"));
        assert_eq!(snapshot.summary.burden_multiplier, dec("1.15"));
        assert_eq!(snapshot.lines.len(), 1);
        assert_eq!(snapshot.lines[0].burdened_reg, dec("97.75"));
        assert_eq!(snapshot.lines[0].burdened_ot, dec("146.625"));
        assert_eq!(snapshot.lines[0].burdened_dt, dec("195.5"));
        assert_eq!(snapshot.burden_map.get(BurdenCategory::Fica), dec("7.65"));

        let quote = SqlQuoteRepository::new(pool.clone())
            .find_by_id(&quote_id)
            .await
            .expect("load quote")
            .expect("quote exists");
        assert_eq!(quote.status, QuoteStatus::Generated);

        pool.close().await;
    }

    #[tokio::test]
    async fn regeneration_returns_existing_snapshot_without_resolving() {
        let pool = setup_pool().await;
        seed_fifteen_percent_burden(&pool).await;
        let customer = insert_customer(&pool, "cust-idem").await;
        let quote_id = quote_with_millwright(&pool, &customer).await;

        let repo = SqlEconomicsRepository::new(pool.clone());
        let lookups = Arc::new(AtomicUsize::new(0));
        let resolver = BurdenResolver::new(CountingSource {
            inner: SqlBurdenRateRepository::new(pool.clone()),
            lookups: lookups.clone(),
        });

        let first = repo.generate(&quote_id, &resolver).await.expect("first generate");
        let lookups_after_first = lookups.load(Ordering::SeqCst);
        assert!(lookups_after_first > 0);

        let second = repo.generate(&quote_id, &resolver).await.expect("second generate");
        assert_eq!(second.id, first.id);
        assert_eq!(second.input_hash, first.input_hash);
        assert_eq!(
            lookups.load(Ordering::SeqCst),
            lookups_after_first,
            "cached return must not re-resolve burden"
        );

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM economics_snapshots WHERE quote_id = ?")
                .bind(&quote_id.0)
                .fetch_one(&pool)
                .await
                .expect("count snapshots");
        assert_eq!(count, 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn changed_base_rate_addresses_a_new_snapshot() {
        let pool = setup_pool().await;
        seed_fifteen_percent_burden(&pool).await;
        let customer = insert_customer(&pool, "cust-rehash").await;
        let quote_id = quote_with_millwright(&pool, &customer).await;

        let repo = SqlEconomicsRepository::new(pool.clone());
        let resolver = BurdenResolver::new(SqlBurdenRateRepository::new(pool.clone()));
        let first = repo.generate(&quote_id, &resolver).await.expect("first generate");

        SqlQuoteRepository::new(pool.clone())
            .upsert_line(&quote_id, "millwright", dec("90"))
            .await
            .expect("bump base rate");
        let second = repo.generate(&quote_id, &resolver).await.expect("regenerate");

        assert_ne!(second.input_hash, first.input_hash);
        assert_ne!(second.id, first.id);

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM economics_snapshots WHERE quote_id = ?")
                .bind(&quote_id.0)
                .fetch_one(&pool)
                .await
                .expect("count snapshots");
        assert_eq!(count, 2);

        pool.close().await;
    }

    #[tokio::test]
    async fn unresolved_categories_generate_with_zero_burden() {
        let pool = setup_pool().await;
        let customer = insert_customer(&pool, "cust-zero").await;
        let quote_id = quote_with_millwright(&pool, &customer).await;

        let repo = SqlEconomicsRepository::new(pool.clone());
        let resolver = BurdenResolver::new(SqlBurdenRateRepository::new(pool.clone()));
        let snapshot = repo.generate(&quote_id, &resolver).await.expect("generate");

        assert_eq!(snapshot.summary.total_burden_percent, Decimal::ZERO);
        assert_eq!(snapshot.lines[0].burdened_reg, dec("85"));

        pool.close().await;
    }
}
