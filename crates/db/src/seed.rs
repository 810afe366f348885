use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use crewrate_core::domain::burden::{BurdenCategory, NewBurdenRate, RateAdminError};
use rust_decimal::Decimal;

use crate::repositories::{RepositoryError, SqlBurdenRateRepository};
use crate::DbPool;

/// Sentinel identity that owns seeded rates. Empty password hash plus
/// the inactive flag make it non-loginable; it exists purely so audit
/// rows have an actor.
pub const SYSTEM_ACTOR_EMAIL: &str = "system@crewrate.invalid";
pub const SYSTEM_ACTOR_NAME: &str = "Crewrate System";

const DEFAULT_EFFECTIVE_DATE: &str = "2025-01-01";

/// Baseline GLOBAL percentages per category. Site/state/worker overrides
/// are an admin concern, not a seed concern.
const DEFAULT_GLOBAL_RATES: &[(BurdenCategory, &str)] = &[
    (BurdenCategory::Fica, "7.65"),
    (BurdenCategory::Futa, "0.60"),
    (BurdenCategory::Suta, "2.70"),
    (BurdenCategory::WorkComp, "4.50"),
    (BurdenCategory::GeneralLiability, "1.25"),
    (BurdenCategory::Peo, "2.00"),
    (BurdenCategory::Overhead, "5.00"),
    (BurdenCategory::IntWeekly, "0.35"),
    (BurdenCategory::IntPayday, "0.15"),
    (BurdenCategory::Admin, "1.50"),
    (BurdenCategory::Bank, "0.10"),
];

/// Idempotent bootstrap: ensures the system actor exists, then seeds
/// GLOBAL default rates, skipping any category whose exact rate and
/// effective date already exist.
pub struct BootstrapSeed;

#[derive(Clone, Debug)]
pub struct SeedReport {
    pub system_actor_id: String,
    pub system_actor_created: bool,
    pub inserted: Vec<BurdenCategory>,
    pub skipped: Vec<BurdenCategory>,
}

#[derive(Clone, Debug)]
pub struct SeedVerification {
    pub all_present: bool,
    pub checks: Vec<(String, bool)>,
}

impl BootstrapSeed {
    pub async fn run(pool: &DbPool) -> Result<SeedReport, RepositoryError> {
        let (system_actor_id, system_actor_created) = ensure_system_actor(pool).await?;
        let effective_date = default_effective_date()?;
        let rates = SqlBurdenRateRepository::new(pool.clone());

        let mut inserted = Vec::new();
        let mut skipped = Vec::new();
        for (category, raw_rate) in DEFAULT_GLOBAL_RATES {
            let rate_percent = Decimal::from_str(raw_rate).map_err(|error| {
                RepositoryError::Decode(format!("invalid seed rate for {category}: {error}"))
            })?;

            let existing: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM burden_rates
                 WHERE category = ? AND level = 'GLOBAL' AND rate_percent = ? AND effective_date = ?",
            )
            .bind(category.as_str())
            .bind(rate_percent.to_string())
            .bind(effective_date.to_string())
            .fetch_one(pool)
            .await?;
            if existing > 0 {
                skipped.push(*category);
                continue;
            }

            rates
                .create(
                    NewBurdenRate::global(*category, rate_percent, effective_date),
                    &system_actor_id,
                )
                .await
                .map_err(seed_error)?;
            inserted.push(*category);
        }

        tracing::info!(
            event_name = "seed.bootstrap_complete",
            inserted = inserted.len(),
            skipped = skipped.len(),
            "bootstrap seed finished"
        );

        Ok(SeedReport { system_actor_id, system_actor_created, inserted, skipped })
    }

    pub async fn verify(pool: &DbPool) -> Result<SeedVerification, RepositoryError> {
        let mut checks = Vec::new();

        let actor_ok: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE email = ? AND active = 0 AND password_hash = ''",
        )
        .bind(SYSTEM_ACTOR_EMAIL)
        .fetch_one(pool)
        .await?;
        checks.push(("system-actor".to_string(), actor_ok == 1));

        for (category, _) in DEFAULT_GLOBAL_RATES {
            let present: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM burden_rates WHERE category = ? AND level = 'GLOBAL'",
            )
            .bind(category.as_str())
            .fetch_one(pool)
            .await?;
            checks.push((format!("global-rate-{}", category.as_str()), present >= 1));
        }

        let all_present = checks.iter().all(|(_, passed)| *passed);
        Ok(SeedVerification { all_present, checks })
    }
}

fn default_effective_date() -> Result<NaiveDate, RepositoryError> {
    NaiveDate::from_str(DEFAULT_EFFECTIVE_DATE)
        .map_err(|error| RepositoryError::Decode(format!("invalid seed effective date: {error}")))
}

fn seed_error(error: RateAdminError) -> RepositoryError {
    RepositoryError::Decode(format!("seed rate rejected: {error}"))
}

async fn ensure_system_actor(pool: &DbPool) -> Result<(String, bool), RepositoryError> {
    let existing: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
        .bind(SYSTEM_ACTOR_EMAIL)
        .fetch_optional(pool)
        .await?;
    if let Some(id) = existing {
        return Ok((id, false));
    }

    sqlx::query(
        r#"
        INSERT INTO users (id, email, password_hash, display_name, active, created_at)
        VALUES (?, ?, '', ?, 0, ?)
        ON CONFLICT (email) DO NOTHING
        "#,
    )
    .bind(format!("usr-{}", sqlx::types::Uuid::new_v4()))
    .bind(SYSTEM_ACTOR_EMAIL)
    .bind(SYSTEM_ACTOR_NAME)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    // Re-read so concurrent bootstraps converge on the conflict winner.
    let id: String = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
        .bind(SYSTEM_ACTOR_EMAIL)
        .fetch_one(pool)
        .await?;
    Ok((id, true))
}

#[cfg(test)]
mod tests {
    use crewrate_core::domain::burden::BurdenCategory;

    use super::{BootstrapSeed, SYSTEM_ACTOR_EMAIL};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    #[tokio::test]
    async fn first_run_inserts_every_category() {
        let pool = setup_pool().await;

        let report = BootstrapSeed::run(&pool).await.expect("seed");
        assert!(report.system_actor_created);
        assert_eq!(report.inserted.len(), BurdenCategory::ALL.len());
        assert!(report.skipped.is_empty());

        let verification = BootstrapSeed::verify(&pool).await.expect("verify");
        assert!(verification.all_present, "failed checks: {:?}", verification.checks);

        pool.close().await;
    }

    #[tokio::test]
    async fn second_run_skips_everything_and_adds_no_rows() {
        let pool = setup_pool().await;
        BootstrapSeed::run(&pool).await.expect("first seed");

        let rates_before: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM burden_rates")
            .fetch_one(&pool)
            .await
            .expect("count rates");

        let report = BootstrapSeed::run(&pool).await.expect("second seed");
        assert!(!report.system_actor_created);
        assert!(report.inserted.is_empty());
        assert_eq!(report.skipped.len(), BurdenCategory::ALL.len());

        let rates_after: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM burden_rates")
            .fetch_one(&pool)
            .await
            .expect("count rates");
        assert_eq!(rates_before, rates_after);

        pool.close().await;
    }

    #[tokio::test]
    async fn seeded_rates_are_audited_to_the_system_actor() {
        let pool = setup_pool().await;
        let report = BootstrapSeed::run(&pool).await.expect("seed");

        let attributed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM burden_rate_audits WHERE actor_user_id = ?",
        )
        .bind(&report.system_actor_id)
        .fetch_one(&pool)
        .await
        .expect("count audits");
        assert_eq!(attributed as usize, BurdenCategory::ALL.len());

        let active: i64 = sqlx::query_scalar("SELECT active FROM users WHERE email = ?")
            .bind(SYSTEM_ACTOR_EMAIL)
            .fetch_one(&pool)
            .await
            .expect("actor row");
        assert_eq!(active, 0, "system actor must not be loginable");

        pool.close().await;
    }

    #[tokio::test]
    async fn verify_reports_missing_seed_data() {
        let pool = setup_pool().await;

        let verification = BootstrapSeed::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        let failed: Vec<_> = verification
            .checks
            .iter()
            .filter(|(_, passed)| !passed)
            .map(|(check, _)| check.clone())
            .collect();
        assert!(failed.contains(&"system-actor".to_string()));

        pool.close().await;
    }
}
