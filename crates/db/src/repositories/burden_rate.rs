use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use crewrate_core::burden::{BurdenRateSource, BurdenSourceError, RateLookup};
use crewrate_core::domain::burden::{
    validate_state_code, BurdenCategory, BurdenLevel, BurdenRate, BurdenRateAudit, BurdenRateId,
    BurdenRateUpdate, NewBurdenRate, RateAdminError, RateAuditAction,
};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, Transaction};

use super::{date_from_text, timestamp_from_text};
use crate::DbPool;

/// Audited burden-rate administration.
///
/// Every mutation and its audit row commit in one transaction; a delete
/// writes its audit row before the physical delete so history survives
/// the rate itself.
pub struct SqlBurdenRateRepository {
    pool: DbPool,
}

#[derive(Clone, Debug, Default)]
pub struct RateListFilter {
    pub category: Option<BurdenCategory>,
    pub level: Option<BurdenLevel>,
    pub worker_id: Option<String>,
    pub location_id: Option<String>,
    pub state_code: Option<String>,
}

impl SqlBurdenRateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        new: NewBurdenRate,
        actor_user_id: &str,
    ) -> Result<BurdenRate, RateAdminError> {
        new.validate()?;
        let state_code = new.state_code.as_deref().map(validate_state_code).transpose()?;

        let now = Utc::now();
        let rate = BurdenRate {
            id: BurdenRateId(format!("rate-{}", sqlx::types::Uuid::new_v4())),
            category: new.category,
            level: new.level,
            worker_id: new.worker_id,
            location_id: new.location_id,
            state_code,
            rate_percent: new.rate_percent,
            effective_date: new.effective_date,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool.begin().await.map_err(storage)?;
        sqlx::query(
            r#"
            INSERT INTO burden_rates (
                id, category, level, worker_id, location_id, state_code,
                rate_percent, effective_date, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&rate.id.0)
        .bind(rate.category.as_str())
        .bind(rate.level.as_str())
        .bind(&rate.worker_id)
        .bind(&rate.location_id)
        .bind(&rate.state_code)
        .bind(rate.rate_percent.to_string())
        .bind(rate.effective_date.to_string())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        insert_audit(
            &mut tx,
            &rate.id,
            RateAuditAction::Create,
            None,
            Some(rate_json(&rate)?),
            actor_user_id,
        )
        .await?;
        tx.commit().await.map_err(storage)?;

        Ok(rate)
    }

    pub async fn update(
        &self,
        id: &BurdenRateId,
        update: BurdenRateUpdate,
        actor_user_id: &str,
    ) -> Result<BurdenRate, RateAdminError> {
        if update.is_empty() {
            return Err(RateAdminError::Validation(
                "update must supply rate_percent and/or effective_date".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await.map_err(storage)?;
        let existing = fetch_in_tx(&mut tx, id).await?.ok_or_else(|| {
            RateAdminError::NotFound(id.0.clone())
        })?;

        let next_rate = update.rate_percent.unwrap_or(existing.rate_percent);
        let next_date = update.effective_date.unwrap_or(existing.effective_date);
        if next_rate == existing.rate_percent && next_date == existing.effective_date {
            return Err(RateAdminError::Validation(
                "update does not change any field".to_string(),
            ));
        }
        if next_rate <= Decimal::ZERO {
            return Err(RateAdminError::Validation(format!(
                "rate_percent must be positive, got `{next_rate}`"
            )));
        }

        let mut updated = existing.clone();
        updated.rate_percent = next_rate;
        updated.effective_date = next_date;
        updated.updated_at = Utc::now();

        sqlx::query(
            "UPDATE burden_rates SET rate_percent = ?, effective_date = ?, updated_at = ? WHERE id = ?",
        )
        .bind(updated.rate_percent.to_string())
        .bind(updated.effective_date.to_string())
        .bind(updated.updated_at.to_rfc3339())
        .bind(&id.0)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        insert_audit(
            &mut tx,
            id,
            RateAuditAction::Update,
            Some(rate_json(&existing)?),
            Some(rate_json(&updated)?),
            actor_user_id,
        )
        .await?;
        tx.commit().await.map_err(storage)?;

        Ok(updated)
    }

    pub async fn delete(
        &self,
        id: &BurdenRateId,
        actor_user_id: &str,
    ) -> Result<(), RateAdminError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        let existing = fetch_in_tx(&mut tx, id).await?.ok_or_else(|| {
            RateAdminError::NotFound(id.0.clone())
        })?;

        // Audit first: the history row must exist even though the rate
        // row is about to be gone.
        insert_audit(
            &mut tx,
            id,
            RateAuditAction::Delete,
            Some(rate_json(&existing)?),
            None,
            actor_user_id,
        )
        .await?;

        sqlx::query("DELETE FROM burden_rates WHERE id = ?")
            .bind(&id.0)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        tx.commit().await.map_err(storage)?;

        Ok(())
    }

    pub async fn find_by_id(
        &self,
        id: &BurdenRateId,
    ) -> Result<Option<BurdenRate>, RateAdminError> {
        let row = sqlx::query(&select_rate_sql("WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.as_ref().map(rate_from_row).transpose()
    }

    pub async fn list(&self, filter: &RateListFilter) -> Result<Vec<BurdenRate>, RateAdminError> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, category, level, worker_id, location_id, state_code,
                    CAST(rate_percent AS TEXT) AS rate_percent_text,
                    effective_date, created_at, updated_at
             FROM burden_rates WHERE 1 = 1",
        );
        if let Some(category) = filter.category {
            builder.push(" AND category = ").push_bind(category.as_str());
        }
        if let Some(level) = filter.level {
            builder.push(" AND level = ").push_bind(level.as_str());
        }
        if let Some(worker_id) = &filter.worker_id {
            builder.push(" AND worker_id = ").push_bind(worker_id.clone());
        }
        if let Some(location_id) = &filter.location_id {
            builder.push(" AND location_id = ").push_bind(location_id.clone());
        }
        if let Some(state_code) = &filter.state_code {
            builder.push(" AND state_code = ").push_bind(state_code.clone());
        }
        builder.push(" ORDER BY effective_date DESC, created_at DESC");

        let rows = builder.build().fetch_all(&self.pool).await.map_err(storage)?;
        rows.iter().map(rate_from_row).collect()
    }

    pub async fn audit_history(
        &self,
        rate_id: &BurdenRateId,
    ) -> Result<Vec<BurdenRateAudit>, RateAdminError> {
        let rows = sqlx::query(
            "SELECT id, rate_id, action, before_json, after_json, actor_user_id, created_at
             FROM burden_rate_audits
             WHERE rate_id = ?
             ORDER BY created_at DESC, id DESC",
        )
        .bind(&rate_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter().map(audit_from_row).collect()
    }
}

#[async_trait]
impl BurdenRateSource for SqlBurdenRateRepository {
    async fn latest_effective(
        &self,
        lookup: RateLookup<'_>,
    ) -> Result<Option<Decimal>, BurdenSourceError> {
        let scope_column = match lookup.level {
            BurdenLevel::Worker => Some("worker_id"),
            BurdenLevel::Site => Some("location_id"),
            BurdenLevel::State => Some("state_code"),
            BurdenLevel::Global => None,
        };
        if scope_column.is_some() && lookup.scope_key.is_none() {
            return Ok(None);
        }

        let sql = match scope_column {
            Some(column) => format!(
                "SELECT CAST(rate_percent AS TEXT) AS rate_percent_text
                 FROM burden_rates
                 WHERE category = ? AND level = ? AND {column} = ? AND effective_date <= ?
                 ORDER BY effective_date DESC, created_at DESC
                 LIMIT 1"
            ),
            None => "SELECT CAST(rate_percent AS TEXT) AS rate_percent_text
                 FROM burden_rates
                 WHERE category = ? AND level = ? AND effective_date <= ?
                 ORDER BY effective_date DESC, created_at DESC
                 LIMIT 1"
                .to_string(),
        };

        let mut query =
            sqlx::query(&sql).bind(lookup.category.as_str()).bind(lookup.level.as_str());
        if let Some(scope_key) = lookup.scope_key {
            query = query.bind(scope_key);
        }
        let row = query
            .bind(lookup.effective_at.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| BurdenSourceError::Storage(error.to_string()))?;

        row.map(|row| {
            let text: String = row
                .try_get("rate_percent_text")
                .map_err(|error| BurdenSourceError::Storage(error.to_string()))?;
            Decimal::from_str(&text)
                .map_err(|error| BurdenSourceError::Storage(error.to_string()))
        })
        .transpose()
    }
}

fn storage(error: sqlx::Error) -> RateAdminError {
    RateAdminError::Storage(error.to_string())
}

fn rate_json(rate: &BurdenRate) -> Result<serde_json::Value, RateAdminError> {
    serde_json::to_value(rate).map_err(|error| RateAdminError::Storage(error.to_string()))
}

fn select_rate_sql(where_clause: &str) -> String {
    format!(
        "SELECT id, category, level, worker_id, location_id, state_code,
                CAST(rate_percent AS TEXT) AS rate_percent_text,
                effective_date, created_at, updated_at
         FROM burden_rates {where_clause}"
    )
}

async fn fetch_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    id: &BurdenRateId,
) -> Result<Option<BurdenRate>, RateAdminError> {
    let row = sqlx::query(&select_rate_sql("WHERE id = ?"))
        .bind(&id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(storage)?;
    row.as_ref().map(rate_from_row).transpose()
}

async fn insert_audit(
    tx: &mut Transaction<'_, Sqlite>,
    rate_id: &BurdenRateId,
    action: RateAuditAction,
    before: Option<serde_json::Value>,
    after: Option<serde_json::Value>,
    actor_user_id: &str,
) -> Result<(), RateAdminError> {
    sqlx::query(
        r#"
        INSERT INTO burden_rate_audits (
            id, rate_id, action, before_json, after_json, actor_user_id, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(format!("audit-{}", sqlx::types::Uuid::new_v4()))
    .bind(&rate_id.0)
    .bind(action.as_str())
    .bind(before.map(|value| value.to_string()))
    .bind(after.map(|value| value.to_string()))
    .bind(actor_user_id)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut **tx)
    .await
    .map_err(storage)?;
    Ok(())
}

fn rate_from_row(row: &SqliteRow) -> Result<BurdenRate, RateAdminError> {
    let decode = |error: String| RateAdminError::Storage(error);

    let id: String = row.try_get("id").map_err(|e| decode(e.to_string()))?;
    let category_raw: String = row.try_get("category").map_err(|e| decode(e.to_string()))?;
    let level_raw: String = row.try_get("level").map_err(|e| decode(e.to_string()))?;
    let rate_percent_text: String =
        row.try_get("rate_percent_text").map_err(|e| decode(e.to_string()))?;
    let effective_date_raw: String =
        row.try_get("effective_date").map_err(|e| decode(e.to_string()))?;
    let created_at_raw: String = row.try_get("created_at").map_err(|e| decode(e.to_string()))?;
    let updated_at_raw: String = row.try_get("updated_at").map_err(|e| decode(e.to_string()))?;

    Ok(BurdenRate {
        id: BurdenRateId(id),
        category: BurdenCategory::parse(&category_raw)
            .ok_or_else(|| decode(format!("unknown burden category `{category_raw}`")))?,
        level: BurdenLevel::parse(&level_raw)
            .ok_or_else(|| decode(format!("unknown burden level `{level_raw}`")))?,
        worker_id: row.try_get("worker_id").map_err(|e| decode(e.to_string()))?,
        location_id: row.try_get("location_id").map_err(|e| decode(e.to_string()))?,
        state_code: row.try_get("state_code").map_err(|e| decode(e.to_string()))?,
        rate_percent: Decimal::from_str(&rate_percent_text)
            .map_err(|e| decode(format!("invalid rate_percent: {e}")))?,
        effective_date: date_from_text("effective_date", &effective_date_raw)
            .map_err(|e| decode(e.to_string()))?,
        created_at: timestamp_from_text("created_at", &created_at_raw)
            .map_err(|e| decode(e.to_string()))?,
        updated_at: timestamp_from_text("updated_at", &updated_at_raw)
            .map_err(|e| decode(e.to_string()))?,
    })
}

fn audit_from_row(row: &SqliteRow) -> Result<BurdenRateAudit, RateAdminError> {
    let decode = |error: String| RateAdminError::Storage(error);

    let action_raw: String = row.try_get("action").map_err(|e| decode(e.to_string()))?;
    let before_json: Option<String> =
        row.try_get("before_json").map_err(|e| decode(e.to_string()))?;
    let after_json: Option<String> = row.try_get("after_json").map_err(|e| decode(e.to_string()))?;
    let created_at_raw: String = row.try_get("created_at").map_err(|e| decode(e.to_string()))?;

    let parse_snapshot = |raw: Option<String>| -> Result<Option<serde_json::Value>, RateAdminError> {
        raw.map(|text| {
            serde_json::from_str(&text)
                .map_err(|e| decode(format!("invalid audit snapshot json: {e}")))
        })
        .transpose()
    };

    Ok(BurdenRateAudit {
        id: row.try_get("id").map_err(|e| decode(e.to_string()))?,
        rate_id: BurdenRateId(row.try_get("rate_id").map_err(|e| decode(e.to_string()))?),
        action: RateAuditAction::parse(&action_raw)
            .ok_or_else(|| decode(format!("unknown audit action `{action_raw}`")))?,
        before: parse_snapshot(before_json)?,
        after: parse_snapshot(after_json)?,
        actor_user_id: row.try_get("actor_user_id").map_err(|e| decode(e.to_string()))?,
        created_at: timestamp_from_text("created_at", &created_at_raw)
            .map_err(|e| decode(e.to_string()))?,
    })
}
