//! Burden rate administration and resolution endpoints.
//!
//! - `POST   /api/v1/rates`             — create a rate (audited)
//! - `GET    /api/v1/rates`             — filtered listing
//! - `GET    /api/v1/rates/resolve`     — resolve the effective burden map
//! - `PATCH  /api/v1/rates/{id}`        — partial update (audited)
//! - `DELETE /api/v1/rates/{id}`        — delete (audit survives)
//! - `GET    /api/v1/rates/{id}/audit`  — mutation history

use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use chrono::{NaiveDate, Utc};
use crewrate_core::burden::{BurdenQuery, BurdenResolver, BurdenScope, ResolvedBurdenMap};
use crewrate_core::domain::burden::{
    validate_state_code, BurdenCategory, BurdenLevel, BurdenRate, BurdenRateAudit, BurdenRateId,
    BurdenRateUpdate, NewBurdenRate,
};
use crewrate_db::repositories::{RateListFilter, SqlBurdenRateRepository};
use crewrate_db::DbPool;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{caller_identity, classified_failure, failure, ApiFailure, ApiMessage, ApiState};

pub fn router(db_pool: DbPool) -> Router {
    Router::new()
        .route("/api/v1/rates", axum::routing::post(create_rate).get(list_rates))
        .route("/api/v1/rates/resolve", get(resolve_rates))
        .route(
            "/api/v1/rates/{id}",
            axum::routing::patch(update_rate).delete(delete_rate),
        )
        .route("/api/v1/rates/{id}/audit", get(audit_history))
        .with_state(ApiState { db_pool })
}

#[derive(Debug, Deserialize)]
pub struct CreateRateRequest {
    pub category: String,
    pub level: String,
    pub worker_id: Option<String>,
    pub location_id: Option<String>,
    pub state_code: Option<String>,
    pub rate_percent: Decimal,
    pub effective_date: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRateRequest {
    pub rate_percent: Option<Decimal>,
    pub effective_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRatesQuery {
    pub category: Option<String>,
    pub level: Option<String>,
    pub worker_id: Option<String>,
    pub location_id: Option<String>,
    pub state_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResolveQuery {
    pub worker_id: Option<String>,
    pub location_id: Option<String>,
    pub state_code: Option<String>,
    pub effective_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub effective_at: String,
    pub rates: ResolvedBurdenMap,
    pub total_burden_percent: Decimal,
    pub burden_multiplier: Decimal,
}

async fn create_rate(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<CreateRateRequest>,
) -> Result<Json<BurdenRate>, ApiFailure> {
    let caller = caller_identity(&headers);
    let new = NewBurdenRate {
        category: parse_category(&request.category)?,
        level: parse_level(&request.level)?,
        worker_id: request.worker_id,
        location_id: request.location_id,
        state_code: request.state_code,
        rate_percent: request.rate_percent,
        effective_date: parse_date("effective_date", &request.effective_date)?,
    };

    let rate = SqlBurdenRateRepository::new(state.db_pool)
        .create(new, &caller.user_id)
        .await
        .map_err(|error| classified_failure(&error))?;
    Ok(Json(rate))
}

async fn list_rates(
    State(state): State<ApiState>,
    Query(query): Query<ListRatesQuery>,
) -> Result<Json<Vec<BurdenRate>>, ApiFailure> {
    let filter = RateListFilter {
        category: query.category.as_deref().map(parse_category).transpose()?,
        level: query.level.as_deref().map(parse_level).transpose()?,
        worker_id: query.worker_id,
        location_id: query.location_id,
        state_code: query.state_code,
    };

    let rates = SqlBurdenRateRepository::new(state.db_pool)
        .list(&filter)
        .await
        .map_err(|error| classified_failure(&error))?;
    Ok(Json(rates))
}

async fn resolve_rates(
    State(state): State<ApiState>,
    Query(query): Query<ResolveQuery>,
) -> Result<Json<ResolveResponse>, ApiFailure> {
    let effective_at = match query.effective_at.as_deref() {
        Some(raw) => parse_date("effective_at", raw)?,
        None => Utc::now().date_naive(),
    };
    let state_code = query
        .state_code
        .as_deref()
        .map(|raw| validate_state_code(raw).map_err(|error| classified_failure(&error)))
        .transpose()?;

    let resolver = BurdenResolver::new(SqlBurdenRateRepository::new(state.db_pool));
    let rates = resolver
        .resolve(&BurdenQuery {
            scope: BurdenScope {
                worker_id: query.worker_id,
                location_id: query.location_id,
                state_code,
            },
            effective_at,
        })
        .await
        .map_err(|error| classified_failure(&error))?;

    Ok(Json(ResolveResponse {
        effective_at: effective_at.to_string(),
        total_burden_percent: rates.total_percent(),
        burden_multiplier: rates.multiplier(),
        rates,
    }))
}

async fn update_rate(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<UpdateRateRequest>,
) -> Result<Json<BurdenRate>, ApiFailure> {
    let caller = caller_identity(&headers);
    let update = BurdenRateUpdate {
        rate_percent: request.rate_percent,
        effective_date: request
            .effective_date
            .as_deref()
            .map(|raw| parse_date("effective_date", raw))
            .transpose()?,
    };

    let rate = SqlBurdenRateRepository::new(state.db_pool)
        .update(&BurdenRateId(id), update, &caller.user_id)
        .await
        .map_err(|error| classified_failure(&error))?;
    Ok(Json(rate))
}

async fn delete_rate(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ApiMessage>, ApiFailure> {
    let caller = caller_identity(&headers);
    SqlBurdenRateRepository::new(state.db_pool)
        .delete(&BurdenRateId(id.clone()), &caller.user_id)
        .await
        .map_err(|error| classified_failure(&error))?;
    Ok(Json(ApiMessage { message: format!("burden rate `{id}` deleted") }))
}

async fn audit_history(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<BurdenRateAudit>>, ApiFailure> {
    let history = SqlBurdenRateRepository::new(state.db_pool)
        .audit_history(&BurdenRateId(id))
        .await
        .map_err(|error| classified_failure(&error))?;
    Ok(Json(history))
}

fn parse_category(raw: &str) -> Result<BurdenCategory, ApiFailure> {
    BurdenCategory::parse(raw)
        .ok_or_else(|| failure(StatusCode::BAD_REQUEST, format!("unknown burden category `{raw}`")))
}

fn parse_level(raw: &str) -> Result<BurdenLevel, ApiFailure> {
    BurdenLevel::parse(raw)
        .ok_or_else(|| failure(StatusCode::BAD_REQUEST, format!("unknown burden level `{raw}`")))
}

fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, ApiFailure> {
    NaiveDate::from_str(raw).map_err(|_| {
        failure(StatusCode::BAD_REQUEST, format!("{field} must be a YYYY-MM-DD date, got `{raw}`"))
    })
}
