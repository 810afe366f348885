use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

pub mod burden_rate;
pub mod customer;
pub mod order;
pub mod quote;
pub mod snapshot;

pub use burden_rate::{RateListFilter, SqlBurdenRateRepository};
pub use customer::SqlCustomerRepository;
pub use order::SqlOrderRepository;
pub use quote::SqlQuoteRepository;
pub use snapshot::SqlEconomicsRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

pub(crate) fn decimal_from_text(field: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value)
        .map_err(|error| RepositoryError::Decode(format!("invalid decimal for {field}: {error}")))
}

pub(crate) fn date_from_text(field: &str, value: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::from_str(value)
        .map_err(|error| RepositoryError::Decode(format!("invalid date for {field}: {error}")))
}

pub(crate) fn timestamp_from_text(
    field: &str,
    value: &str,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp for {field}: {error}")))
}
