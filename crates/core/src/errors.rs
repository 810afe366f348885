use thiserror::Error;

use crate::burden::BurdenSourceError;
use crate::domain::burden::RateAdminError;
use crate::domain::order::{OrderStatus, OrderStatusError};
use crate::economics::EconomicsError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid order transition from {from:?} to {to:?}")]
    InvalidOrderTransition { from: OrderStatus, to: OrderStatus },
    #[error("order is already in status {0:?}")]
    AlreadyInStatus(OrderStatus),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Transport-facing classification of an operation error. The HTTP
/// layer maps classes to status codes; the CLI maps them to exit
/// classes. Authorization failures surface only after structural
/// validation, which the per-operation check order guarantees.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    NotFound,
    PermissionDenied,
    Unavailable,
}

pub trait Classified {
    fn class(&self) -> ErrorClass;
}

impl Classified for DomainError {
    fn class(&self) -> ErrorClass {
        ErrorClass::Validation
    }
}

impl Classified for RateAdminError {
    fn class(&self) -> ErrorClass {
        match self {
            RateAdminError::NotFound(_) => ErrorClass::NotFound,
            RateAdminError::Validation(_) => ErrorClass::Validation,
            RateAdminError::Storage(_) => ErrorClass::Unavailable,
        }
    }
}

impl Classified for OrderStatusError {
    fn class(&self) -> ErrorClass {
        match self {
            OrderStatusError::NotFound(_) => ErrorClass::NotFound,
            OrderStatusError::Domain(_) => ErrorClass::Validation,
            OrderStatusError::PermissionDenied { .. } => ErrorClass::PermissionDenied,
            OrderStatusError::HoursOutstanding { .. } | OrderStatusError::InvoiceRequired => {
                ErrorClass::Validation
            }
            OrderStatusError::Storage(_) => ErrorClass::Unavailable,
        }
    }
}

impl Classified for EconomicsError {
    fn class(&self) -> ErrorClass {
        match self {
            EconomicsError::QuoteNotFound(_) => ErrorClass::NotFound,
            EconomicsError::EmptyQuote(_) => ErrorClass::Validation,
            EconomicsError::Encoding(_)
            | EconomicsError::Burden(_)
            | EconomicsError::Storage(_) => ErrorClass::Unavailable,
        }
    }
}

impl Classified for BurdenSourceError {
    fn class(&self) -> ErrorClass {
        ErrorClass::Unavailable
    }
}
