use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed set of employer-side burden categories. Resolution treats every
/// category independently; there is no cross-category dependency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BurdenCategory {
    #[serde(rename = "FICA")]
    Fica,
    #[serde(rename = "FUTA")]
    Futa,
    #[serde(rename = "SUTA")]
    Suta,
    #[serde(rename = "WC")]
    WorkComp,
    #[serde(rename = "GL")]
    GeneralLiability,
    #[serde(rename = "PEO")]
    Peo,
    #[serde(rename = "OVERHEAD")]
    Overhead,
    #[serde(rename = "INT_W")]
    IntWeekly,
    #[serde(rename = "INT_PD")]
    IntPayday,
    #[serde(rename = "ADMIN")]
    Admin,
    #[serde(rename = "BANK")]
    Bank,
}

impl BurdenCategory {
    pub const ALL: [BurdenCategory; 11] = [
        Self::Fica,
        Self::Futa,
        Self::Suta,
        Self::WorkComp,
        Self::GeneralLiability,
        Self::Peo,
        Self::Overhead,
        Self::IntWeekly,
        Self::IntPayday,
        Self::Admin,
        Self::Bank,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fica => "FICA",
            Self::Futa => "FUTA",
            Self::Suta => "SUTA",
            Self::WorkComp => "WC",
            Self::GeneralLiability => "GL",
            Self::Peo => "PEO",
            Self::Overhead => "OVERHEAD",
            Self::IntWeekly => "INT_W",
            Self::IntPayday => "INT_PD",
            Self::Admin => "ADMIN",
            Self::Bank => "BANK",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "FICA" => Some(Self::Fica),
            "FUTA" => Some(Self::Futa),
            "SUTA" => Some(Self::Suta),
            "WC" => Some(Self::WorkComp),
            "GL" => Some(Self::GeneralLiability),
            "PEO" => Some(Self::Peo),
            "OVERHEAD" => Some(Self::Overhead),
            "INT_W" => Some(Self::IntWeekly),
            "INT_PD" => Some(Self::IntPayday),
            "ADMIN" => Some(Self::Admin),
            "BANK" => Some(Self::Bank),
            _ => None,
        }
    }
}

impl std::fmt::Display for BurdenCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Specificity tier of a rate. Resolution walks tiers most-specific-first
/// and the first tier with a match wins outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BurdenLevel {
    Worker,
    Site,
    State,
    Global,
}

impl BurdenLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Worker => "WORKER",
            Self::Site => "SITE",
            Self::State => "STATE",
            Self::Global => "GLOBAL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "WORKER" => Some(Self::Worker),
            "SITE" => Some(Self::Site),
            "STATE" => Some(Self::State),
            "GLOBAL" => Some(Self::Global),
            _ => None,
        }
    }
}

impl std::fmt::Display for BurdenLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BurdenRateId(pub String);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BurdenRate {
    pub id: BurdenRateId,
    pub category: BurdenCategory,
    pub level: BurdenLevel,
    pub worker_id: Option<String>,
    pub location_id: Option<String>,
    pub state_code: Option<String>,
    pub rate_percent: Decimal,
    pub effective_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Creation payload for a burden rate. `validate` enforces the scope-key
/// invariant: exactly the keys demanded by `level`, nothing else.
#[derive(Clone, Debug, PartialEq)]
pub struct NewBurdenRate {
    pub category: BurdenCategory,
    pub level: BurdenLevel,
    pub worker_id: Option<String>,
    pub location_id: Option<String>,
    pub state_code: Option<String>,
    pub rate_percent: Decimal,
    pub effective_date: NaiveDate,
}

impl NewBurdenRate {
    pub fn global(category: BurdenCategory, rate_percent: Decimal, effective_date: NaiveDate) -> Self {
        Self {
            category,
            level: BurdenLevel::Global,
            worker_id: None,
            location_id: None,
            state_code: None,
            rate_percent,
            effective_date,
        }
    }

    pub fn validate(&self) -> Result<(), RateAdminError> {
        validate_scope_keys(
            self.level,
            self.worker_id.as_deref(),
            self.location_id.as_deref(),
            self.state_code.as_deref(),
        )?;
        validate_rate_percent(self.rate_percent)?;
        if let Some(state_code) = self.state_code.as_deref() {
            validate_state_code(state_code)?;
        }
        Ok(())
    }
}

/// Partial update payload. Only the rate and the effective date are
/// mutable; scope and category are fixed at creation.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct BurdenRateUpdate {
    pub rate_percent: Option<Decimal>,
    pub effective_date: Option<NaiveDate>,
}

impl BurdenRateUpdate {
    pub fn is_empty(&self) -> bool {
        self.rate_percent.is_none() && self.effective_date.is_none()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateAuditAction {
    Create,
    Update,
    Delete,
}

impl RateAuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CREATE" => Some(Self::Create),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// One audit row per rate mutation. `before`/`after` carry full row
/// snapshots; deletions keep their history after the rate row is gone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BurdenRateAudit {
    pub id: String,
    pub rate_id: BurdenRateId,
    pub action: RateAuditAction,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub actor_user_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RateAdminError {
    #[error("burden rate `{0}` was not found")]
    NotFound(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

fn validate_scope_keys(
    level: BurdenLevel,
    worker_id: Option<&str>,
    location_id: Option<&str>,
    state_code: Option<&str>,
) -> Result<(), RateAdminError> {
    let present = |value: Option<&str>| value.map(|v| !v.trim().is_empty()).unwrap_or(false);
    let (want_worker, want_location, want_state) = match level {
        BurdenLevel::Worker => (true, false, false),
        BurdenLevel::Site => (false, true, false),
        BurdenLevel::State => (false, false, true),
        BurdenLevel::Global => (false, false, false),
    };

    for (name, got, want) in [
        ("worker_id", present(worker_id), want_worker),
        ("location_id", present(location_id), want_location),
        ("state_code", present(state_code), want_state),
    ] {
        if want && !got {
            return Err(RateAdminError::Validation(format!(
                "level {} requires `{name}`",
                level.as_str()
            )));
        }
        if !want && got {
            return Err(RateAdminError::Validation(format!(
                "level {} does not accept `{name}`",
                level.as_str()
            )));
        }
    }

    Ok(())
}

fn validate_rate_percent(rate_percent: Decimal) -> Result<(), RateAdminError> {
    if rate_percent <= Decimal::ZERO {
        return Err(RateAdminError::Validation(format!(
            "rate_percent must be positive, got `{rate_percent}`"
        )));
    }
    Ok(())
}

pub fn validate_state_code(raw: &str) -> Result<String, RateAdminError> {
    let trimmed = raw.trim();
    if trimmed.len() == 2 && trimmed.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return Ok(trimmed.to_ascii_uppercase());
    }
    Err(RateAdminError::Validation(format!(
        "state_code must be two letters, got `{raw}`"
    )))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::{
        BurdenCategory, BurdenLevel, BurdenRateUpdate, NewBurdenRate, RateAdminError,
        validate_state_code,
    };

    fn effective() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid date")
    }

    #[test]
    fn category_round_trips_through_wire_names() {
        for category in BurdenCategory::ALL {
            assert_eq!(BurdenCategory::parse(category.as_str()), Some(category));
        }
        assert_eq!(BurdenCategory::parse("wc"), Some(BurdenCategory::WorkComp));
        assert_eq!(BurdenCategory::parse("unknown"), None);
    }

    #[test]
    fn worker_level_requires_exactly_the_worker_key() {
        let mut rate = NewBurdenRate {
            category: BurdenCategory::Fica,
            level: BurdenLevel::Worker,
            worker_id: Some("wrk-001".to_string()),
            location_id: None,
            state_code: None,
            rate_percent: Decimal::new(765, 2),
            effective_date: effective(),
        };
        rate.validate().expect("worker scope is valid");

        rate.location_id = Some("loc-001".to_string());
        let error = rate.validate().expect_err("extra scope key must fail");
        assert!(matches!(error, RateAdminError::Validation(message) if message.contains("location_id")));
    }

    #[test]
    fn global_level_rejects_any_scope_key() {
        let rate = NewBurdenRate {
            state_code: Some("KY".to_string()),
            ..NewBurdenRate::global(BurdenCategory::Suta, Decimal::new(270, 2), effective())
        };
        let error = rate.validate().expect_err("global must carry no scope");
        assert!(matches!(error, RateAdminError::Validation(message) if message.contains("state_code")));
    }

    #[test]
    fn missing_required_scope_key_is_rejected() {
        let rate = NewBurdenRate {
            category: BurdenCategory::WorkComp,
            level: BurdenLevel::State,
            worker_id: None,
            location_id: None,
            state_code: None,
            rate_percent: Decimal::new(450, 2),
            effective_date: effective(),
        };
        let error = rate.validate().expect_err("state level without state_code");
        assert!(matches!(error, RateAdminError::Validation(message) if message.contains("state_code")));
    }

    #[test]
    fn non_positive_rates_are_rejected() {
        for raw in [Decimal::ZERO, Decimal::new(-100, 2)] {
            let rate = NewBurdenRate::global(BurdenCategory::Admin, raw, effective());
            assert!(matches!(rate.validate(), Err(RateAdminError::Validation(_))));
        }
    }

    #[test]
    fn state_code_normalizes_to_uppercase() {
        assert_eq!(validate_state_code(" ky ").expect("two letters"), "KY");
        assert!(validate_state_code("KEN").is_err());
        assert!(validate_state_code("K1").is_err());
    }

    #[test]
    fn empty_update_is_detectable() {
        assert!(BurdenRateUpdate::default().is_empty());
        let update = BurdenRateUpdate { rate_percent: Some(Decimal::ONE), effective_date: None };
        assert!(!update.is_empty());
    }
}
