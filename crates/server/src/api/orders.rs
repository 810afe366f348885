//! Order lifecycle endpoints.
//!
//! - `POST /api/v1/orders`               — create a draft order
//! - `GET  /api/v1/orders/{id}`          — order header
//! - `POST /api/v1/orders/{id}/status`   — drive the status graph
//! - `POST /api/v1/orders/{id}/hours`    — record an hours entry
//! - `POST /api/v1/orders/{id}/invoices` — record an invoice
//!
//! Status changes require the caller's permission set via the
//! `x-permissions` header; completion additionally requires resolved
//! hours and an invoice on file.

use std::str::FromStr;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use chrono::NaiveDate;
use crewrate_core::audit::TracingAuditSink;
use crewrate_core::domain::customer::CustomerId;
use crewrate_core::domain::order::{Order, OrderId, OrderStatus};
use crewrate_core::domain::worklog::{HoursEntry, HoursStatus, Invoice};
use crewrate_db::repositories::{SqlCustomerRepository, SqlOrderRepository};
use crewrate_db::DbPool;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{caller_identity, classified_failure, failure, ApiFailure, ApiState};

pub fn router(db_pool: DbPool) -> Router {
    Router::new()
        .route("/api/v1/orders", post(create_order))
        .route("/api/v1/orders/{id}", get(get_order))
        .route("/api/v1/orders/{id}/status", post(set_status))
        .route("/api/v1/orders/{id}/hours", post(record_hours))
        .route("/api/v1/orders/{id}/invoices", post(record_invoice))
        .with_state(ApiState { db_pool })
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordHoursRequest {
    pub worker_id: String,
    pub status: Option<String>,
    pub hours: Decimal,
    pub work_date: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordInvoiceRequest {
    pub total: Decimal,
}

async fn create_order(
    State(state): State<ApiState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Json<Order>, ApiFailure> {
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

    let order = SqlOrderRepository::new(state.db_pool)
        .create(&customer_id)
        .await
        .map_err(|error| failure(StatusCode::SERVICE_UNAVAILABLE, error.to_string()))?;
    Ok(Json(order))
}

async fn get_order(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiFailure> {
    let order = SqlOrderRepository::new(state.db_pool)
        .find_by_id(&OrderId(id.clone()))
        .await
        .map_err(|error| failure(StatusCode::SERVICE_UNAVAILABLE, error.to_string()))?
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, format!("order `{id}` was not found")))?;
    Ok(Json(order))
}

async fn set_status(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<SetStatusRequest>,
) -> Result<Json<Order>, ApiFailure> {
    let next = OrderStatus::parse(&request.status).ok_or_else(|| {
        failure(StatusCode::BAD_REQUEST, format!("unknown order status `{}`", request.status))
    })?;
    let caller = caller_identity(&headers);

    let order = SqlOrderRepository::new(state.db_pool)
        .apply_status(
            &OrderId(id),
            next,
            &caller.user_id,
            &caller.permissions,
            &TracingAuditSink,
        )
        .await
        .map_err(|error| classified_failure(&error))?;
    Ok(Json(order))
}

async fn record_hours(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<RecordHoursRequest>,
) -> Result<Json<HoursEntry>, ApiFailure> {
    if request.hours <= Decimal::ZERO {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            format!("hours must be positive, got `{}`", request.hours),
        ));
    }
    let status = match request.status.as_deref() {
        None => HoursStatus::Pending,
        Some(raw) => HoursStatus::parse(raw).ok_or_else(|| {
            failure(StatusCode::BAD_REQUEST, format!("unknown hours status `{raw}`"))
        })?,
    };
    let work_date = NaiveDate::from_str(&request.work_date).map_err(|_| {
        failure(
            StatusCode::BAD_REQUEST,
            format!("work_date must be a YYYY-MM-DD date, got `{}`", request.work_date),
        )
    })?;

    let entry = SqlOrderRepository::new(state.db_pool)
        .record_hours(&OrderId(id.clone()), request.worker_id.trim(), status, request.hours, work_date)
        .await
        .map_err(|error| failure(StatusCode::SERVICE_UNAVAILABLE, error.to_string()))?
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, format!("order `{id}` was not found")))?;
    Ok(Json(entry))
}

async fn record_invoice(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<RecordInvoiceRequest>,
) -> Result<Json<Invoice>, ApiFailure> {
    if request.total <= Decimal::ZERO {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            format!("total must be positive, got `{}`", request.total),
        ));
    }

    let invoice = SqlOrderRepository::new(state.db_pool)
        .record_invoice(&OrderId(id.clone()), request.total)
        .await
        .map_err(|error| failure(StatusCode::SERVICE_UNAVAILABLE, error.to_string()))?
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, format!("order `{id}` was not found")))?;
    Ok(Json(invoice))
}
