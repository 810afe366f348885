//! Quote management and economics generation endpoints.
//!
//! - `POST /api/v1/quotes`                — create a draft quote
//! - `GET  /api/v1/quotes/{id}`           — quote with lines (trade-sorted)
//! - `PUT  /api/v1/quotes/{id}/lines`     — upsert one trade line
//! - `POST /api/v1/quotes/{id}/generate`  — idempotent snapshot generation

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post, put};
use axum::Router;
use crewrate_core::burden::BurdenResolver;
use crewrate_core::domain::burden::validate_state_code;
use crewrate_core::domain::customer::CustomerId;
use crewrate_core::domain::quote::{Quote, QuoteId, QuoteLine};
use crewrate_core::economics::EconomicsSnapshot;
use crewrate_db::repositories::{
    SqlBurdenRateRepository, SqlCustomerRepository, SqlEconomicsRepository, SqlQuoteRepository,
};
use crewrate_db::DbPool;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{classified_failure, failure, ApiFailure, ApiState};

pub fn router(db_pool: DbPool) -> Router {
    Router::new()
        .route("/api/v1/quotes", post(create_quote))
        .route("/api/v1/quotes/{id}", get(get_quote))
        .route("/api/v1/quotes/{id}/lines", put(upsert_line))
        .route("/api/v1/quotes/{id}/generate", post(generate_snapshot))
        .with_state(ApiState { db_pool })
}

#[derive(Debug, Deserialize)]
pub struct CreateQuoteRequest {
    pub customer_id: String,
    pub title: String,
    pub state_code: String,
}

#[derive(Debug, Deserialize)]
pub struct UpsertLineRequest {
    pub trade_id: String,
    pub base_rate: Decimal,
}

async fn create_quote(
    State(state): State<ApiState>,
    Json(request): Json<CreateQuoteRequest>,
) -> Result<Json<Quote>, ApiFailure> {
    if request.title.trim().is_empty() {
        return Err(failure(StatusCode::BAD_REQUEST, "title must not be empty"));
    }
    let state_code = validate_state_code(&request.state_code)
        .map_err(|error| classified_failure(&error))?;

    let customer_id = CustomerId(request.customer_id);
    let customer = SqlCustomerRepository::new(state.db_pool.clone())
        .find_by_id(&customer_id)
        .await
        .map_err(|error| failure(StatusCode::SERVICE_UNAVAILABLE, error.to_string()))?;
    if customer.is_none() {
        return Err(failure(
            StatusCode::NOT_FOUND,
            format!("customer `{}` was not found", customer_id.0),
        ));
    }

    let quote = SqlQuoteRepository::new(state.db_pool)
        .create(&customer_id, request.title.trim(), &state_code)
        .await
        .map_err(|error| failure(StatusCode::SERVICE_UNAVAILABLE, error.to_string()))?;
    Ok(Json(quote))
}

async fn get_quote(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Quote>, ApiFailure> {
    let quote = SqlQuoteRepository::new(state.db_pool)
        .find_by_id(&QuoteId(id.clone()))
        .await
        .map_err(|error| failure(StatusCode::SERVICE_UNAVAILABLE, error.to_string()))?
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, format!("quote `{id}` was not found")))?;
    Ok(Json(quote))
}

async fn upsert_line(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<UpsertLineRequest>,
) -> Result<Json<QuoteLine>, ApiFailure> {
    if request.trade_id.trim().is_empty() {
        return Err(failure(StatusCode::BAD_REQUEST, "trade_id must not be empty"));
    }
    if request.base_rate <= Decimal::ZERO {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            format!("base_rate must be positive, got `{}`", request.base_rate),
        ));
    }

    let line = SqlQuoteRepository::new(state.db_pool)
        .upsert_line(&QuoteId(id.clone()), request.trade_id.trim(), request.base_rate)
        .await
        .map_err(|error| failure(StatusCode::SERVICE_UNAVAILABLE, error.to_string()))?
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, format!("quote `{id}` was not found")))?;
    Ok(Json(line))
}

async fn generate_snapshot(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<EconomicsSnapshot>, ApiFailure> {
    let resolver = BurdenResolver::new(SqlBurdenRateRepository::new(state.db_pool.clone()));
    let snapshot = SqlEconomicsRepository::new(state.db_pool)
        .generate(&QuoteId(id), &resolver)
        .await
        .map_err(|error| classified_failure(&error))?;
    Ok(Json(snapshot))
}

#[cfg(test)]
mod tests {
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::Json;
    use crewrate_db::repositories::SqlCustomerRepository;
    use crewrate_db::{connect_with_settings, migrations, BootstrapSeed, DbPool};
    use rust_decimal::Decimal;

    use super::{
        create_quote, generate_snapshot, upsert_line, CreateQuoteRequest, UpsertLineRequest,
    };
    use crate::api::ApiState;

    async fn setup_state() -> ApiState {
        let pool: DbPool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        ApiState { db_pool: pool }
    }

    #[tokio::test]
    async fn create_quote_rejects_bad_state_codes() {
        let state = setup_state().await;

        let result = create_quote(
            State(state),
            Json(CreateQuoteRequest {
                customer_id: "cust-any".to_string(),
                title: "Crew".to_string(),
                state_code: "KEN".to_string(),
            }),
        )
        .await;

        let (status, _) = result.expect_err("three-letter state");
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_quote_requires_an_existing_customer() {
        let state = setup_state().await;

        let result = create_quote(
            State(state),
            Json(CreateQuoteRequest {
                customer_id: "cust-ghost".to_string(),
                title: "Crew".to_string(),
                state_code: "KY".to_string(),
            }),
        )
        .await;

        let (status, _) = result.expect_err("missing customer");
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn generate_flows_end_to_end_and_is_idempotent() {
        let state = setup_state().await;
        BootstrapSeed::run(&state.db_pool).await.expect("seed rates");
        let customer = SqlCustomerRepository::new(state.db_pool.clone())
            .create("Falls City Steel", "KY")
            .await
            .expect("create customer");

        let quote = create_quote(
            State(state.clone()),
            Json(CreateQuoteRequest {
                customer_id: customer.id.0.clone(),
                title: "Turnaround crew".to_string(),
                state_code: "ky".to_string(),
            }),
        )
        .await
        .expect("create quote");

        upsert_line(
            State(state.clone()),
            Path(quote.0.id.0.clone()),
            Json(UpsertLineRequest {
                trade_id: "millwright".to_string(),
                base_rate: Decimal::new(85, 0),
            }),
        )
        .await
        .expect("add line");

        let first = generate_snapshot(State(state.clone()), Path(quote.0.id.0.clone()))
            .await
            .expect("first generation");
        let second = generate_snapshot(State(state), Path(quote.0.id.0.clone()))
            .await
            .expect("second generation");
        assert_eq!(first.0.id, second.0.id);
        assert!(first.0.summary.total_burden_percent > Decimal::ZERO);
    }

    #[tokio::test]
    async fn generate_rejects_zero_line_quotes() {
        let state = setup_state().await;
        let customer = SqlCustomerRepository::new(state.db_pool.clone())
            .create("Empty Co", "KY")
            .await
            .expect("create customer");

        let quote = create_quote(
            State(state.clone()),
            Json(CreateQuoteRequest {
                customer_id: customer.id.0.clone(),
                title: "No lines yet".to_string(),
                state_code: "KY".to_string(),
            }),
        )
        .await
        .expect("create quote");

        let result = generate_snapshot(State(state), Path(quote.0.id.0.clone())).await;
        let (status, _) = result.expect_err("zero lines");
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
