use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::customer::CustomerId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Draft,
    NeedsToBeFilled,
    Filled,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::NeedsToBeFilled => "NEEDS_TO_BE_FILLED",
            Self::Filled => "FILLED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Some(Self::Draft),
            "NEEDS_TO_BE_FILLED" => Some(Self::NeedsToBeFilled),
            "FILLED" => Some(Self::Filled),
            "COMPLETED" => Some(Self::Completed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const ORDER_WRITE_PERMISSION: &str = "orders.write";

/// Static transition graph. COMPLETED and CANCELLED are terminal.
pub fn transition_allowed(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::{Cancelled, Completed, Draft, Filled, NeedsToBeFilled};
    matches!(
        (from, to),
        (Draft, NeedsToBeFilled)
            | (Draft, Cancelled)
            | (NeedsToBeFilled, Filled)
            | (NeedsToBeFilled, Cancelled)
            | (Filled, Completed)
    )
}

/// Permission string an actor must hold to drive a given edge. Every
/// edge currently maps to `orders.write`; the table is explicit so a
/// finer-grained string can be attached per edge later.
pub fn required_permission(_from: OrderStatus, _to: OrderStatus) -> &'static str {
    ORDER_WRITE_PERMISSION
}

/// Structural validation only. Same-state and off-graph transitions are
/// both rejected here, before any permission or completion check, so a
/// caller cannot use permission-denial timing to probe graph validity.
pub fn validate_transition(
    from: OrderStatus,
    to: OrderStatus,
) -> Result<&'static str, DomainError> {
    if from == to {
        return Err(DomainError::AlreadyInStatus(from));
    }
    if !transition_allowed(from, to) {
        return Err(DomainError::InvalidOrderTransition { from, to });
    }
    Ok(required_permission(from, to))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Failure modes of the full status-change operation, in check order:
/// load, structural validation, permission, completion gates, write.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OrderStatusError {
    #[error("order `{0}` was not found")]
    NotFound(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("missing required permission `{required}`")]
    PermissionDenied { required: String },
    #[error("order has unresolved hours entries ({pending} pending, {rejected} rejected)")]
    HoursOutstanding { pending: i64, rejected: i64 },
    #[error("order cannot be completed without an invoice")]
    InvoiceRequired,
    #[error("storage failure: {0}")]
    Storage(String),
}
