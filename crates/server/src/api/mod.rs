use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::Router;
use crewrate_core::errors::{Classified, ErrorClass};
use crewrate_db::DbPool;
use serde::Serialize;

pub mod customers;
pub mod orders;
pub mod quotes;
pub mod rates;

#[derive(Clone)]
pub struct ApiState {
    pub db_pool: DbPool,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new()
        .merge(rates::router(db_pool.clone()))
        .merge(quotes::router(db_pool.clone()))
        .merge(orders::router(db_pool.clone()))
        .merge(customers::router(db_pool))
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct ApiMessage {
    pub message: String,
}

pub type ApiFailure = (StatusCode, Json<ApiError>);

pub fn failure(status: StatusCode, message: impl Into<String>) -> ApiFailure {
    (status, Json(ApiError { error: message.into() }))
}

pub fn classified_failure<E>(error: &E) -> ApiFailure
where
    E: Classified + std::fmt::Display,
{
    let status = match error.class() {
        ErrorClass::Validation => StatusCode::BAD_REQUEST,
        ErrorClass::NotFound => StatusCode::NOT_FOUND,
        ErrorClass::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorClass::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    };
    failure(status, error.to_string())
}

/// Caller identity as supplied by the fronting identity provider. The
/// service consumes a user id and a permission set; it never
/// authenticates on its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: String,
    pub permissions: Vec<String>,
}

pub fn caller_identity(headers: &HeaderMap) -> CallerIdentity {
    let user_id = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("anonymous")
        .to_string();

    let permissions = headers
        .get("x-permissions")
        .and_then(|value| value.to_str().ok())
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();

    CallerIdentity { user_id, permissions }
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, StatusCode};

    use super::{caller_identity, failure};

    #[test]
    fn failures_serialize_to_an_error_body() {
        let (status, body) = failure(StatusCode::BAD_REQUEST, "bad input");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let value = serde_json::to_value(&body.0).expect("serialize error body");
        assert_eq!(value["error"], "bad input");
    }

    #[test]
    fn identity_defaults_to_anonymous_without_headers() {
        let identity = caller_identity(&HeaderMap::new());
        assert_eq!(identity.user_id, "anonymous");
        assert!(identity.permissions.is_empty());
    }

    #[test]
    fn identity_splits_permission_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", "usr-42".parse().expect("header value"));
        headers.insert(
            "x-permissions",
            "orders.write, rates.admin ,".parse().expect("header value"),
        );

        let identity = caller_identity(&headers);
        assert_eq!(identity.user_id, "usr-42");
        assert_eq!(identity.permissions, vec!["orders.write", "rates.admin"]);
    }
}
