pub mod audit;
pub mod burden;
pub mod config;
pub mod domain;
pub mod economics;
pub mod errors;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use burden::{
    BurdenQuery, BurdenRateSource, BurdenResolver, BurdenScope, BurdenSourceError, RateLookup,
    ResolvedBurdenMap,
};
pub use domain::burden::{
    BurdenCategory, BurdenLevel, BurdenRate, BurdenRateAudit, BurdenRateId, BurdenRateUpdate,
    NewBurdenRate, RateAdminError, RateAuditAction,
};
pub use domain::customer::{Contact, Customer, CustomerId};
pub use domain::order::{
    Order, OrderId, OrderStatus, OrderStatusError, ORDER_WRITE_PERMISSION,
};
pub use domain::quote::{Quote, QuoteId, QuoteLine, QuoteStatus};
pub use domain::worklog::{HoursEntry, HoursStatus, Invoice};
pub use economics::{
    EconomicsError, EconomicsSnapshot, EconomicsSummary, LineEconomics,
};
pub use errors::{Classified, DomainError, ErrorClass};
