//! Customer and contact endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use crewrate_core::domain::burden::validate_state_code;
use crewrate_core::domain::customer::{Contact, Customer, CustomerId};
use crewrate_db::repositories::SqlCustomerRepository;
use crewrate_db::DbPool;
use serde::Deserialize;

use super::{classified_failure, failure, ApiFailure, ApiState};

pub fn router(db_pool: DbPool) -> Router {
    Router::new()
        .route("/api/v1/customers", post(create_customer).get(list_customers))
        .route(
            "/api/v1/customers/{id}/contacts",
            post(add_contact).get(list_contacts),
        )
        .with_state(ApiState { db_pool })
}

#[derive(Debug, Deserialize)]
pub struct CreateCustomerRequest {
    pub name: String,
    pub state_code: String,
}

#[derive(Debug, Deserialize)]
pub struct AddContactRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

async fn create_customer(
    State(state): State<ApiState>,
    Json(request): Json<CreateCustomerRequest>,
) -> Result<Json<Customer>, ApiFailure> {
    if request.name.trim().is_empty() {
        return Err(failure(StatusCode::BAD_REQUEST, "name must not be empty"));
    }
    let state_code = validate_state_code(&request.state_code)
        .map_err(|error| classified_failure(&error))?;

    let customer = SqlCustomerRepository::new(state.db_pool)
        .create(request.name.trim(), &state_code)
        .await
        .map_err(|error| failure(StatusCode::SERVICE_UNAVAILABLE, error.to_string()))?;
    Ok(Json(customer))
}

async fn list_customers(
    State(state): State<ApiState>,
) -> Result<Json<Vec<Customer>>, ApiFailure> {
    let customers = SqlCustomerRepository::new(state.db_pool)
        .list()
        .await
        .map_err(|error| failure(StatusCode::SERVICE_UNAVAILABLE, error.to_string()))?;
    Ok(Json(customers))
}

async fn add_contact(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<AddContactRequest>,
) -> Result<Json<Contact>, ApiFailure> {
    if request.name.trim().is_empty() {
        return Err(failure(StatusCode::BAD_REQUEST, "name must not be empty"));
    }

    let contact = SqlCustomerRepository::new(state.db_pool)
        .add_contact(
            &CustomerId(id.clone()),
            request.name.trim(),
            request.email.as_deref(),
            request.phone.as_deref(),
        )
        .await
        .map_err(|error| failure(StatusCode::SERVICE_UNAVAILABLE, error.to_string()))?
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, format!("customer `{id}` was not found")))?;
    Ok(Json(contact))
}

async fn list_contacts(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Contact>>, ApiFailure> {
    let contacts = SqlCustomerRepository::new(state.db_pool)
        .list_contacts(&CustomerId(id))
        .await
        .map_err(|error| failure(StatusCode::SERVICE_UNAVAILABLE, error.to_string()))?;
    Ok(Json(contacts))
}

#[cfg(test)]
mod tests {
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::Json;
    use crewrate_db::{connect_with_settings, migrations, DbPool};

    use super::{add_contact, create_customer, AddContactRequest, CreateCustomerRequest};
    use crate::api::ApiState;

    async fn setup_state() -> ApiState {
        let pool: DbPool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        ApiState { db_pool: pool }
    }

    #[tokio::test]
    async fn customer_state_codes_are_normalized() {
        let state = setup_state().await;

        let customer = create_customer(
            State(state),
            Json(CreateCustomerRequest {
                name: "Ohio Valley Crane".to_string(),
                state_code: "oh".to_string(),
            }),
        )
        .await
        .expect("create customer");
        assert_eq!(customer.0.state_code, "OH");
    }

    #[tokio::test]
    async fn contact_for_missing_customer_is_not_found() {
        let state = setup_state().await;

        let result = add_contact(
            State(state),
            Path("cust-ghost".to_string()),
            Json(AddContactRequest { name: "Nobody".to_string(), email: None, phone: None }),
        )
        .await;
        let (status, _) = result.expect_err("missing customer");
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
