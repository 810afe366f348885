//! Tiered burden-rate resolution.
//!
//! Every category in [`BurdenCategory::ALL`] resolves independently by
//! walking specificity tiers WORKER -> SITE -> STATE -> GLOBAL. The
//! first tier with a rate effective on or before the query date wins;
//! there is no blending across tiers. A category with no match at any
//! tier resolves to zero percent, not an error. Callers must treat a
//! zero category as potentially misconfigured; the resolver emits a
//! structured warning for each one.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::burden::{BurdenCategory, BurdenLevel};

/// Optional scope keys supplied by the caller. Absent keys skip their
/// tier entirely; the GLOBAL tier always applies.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BurdenScope {
    pub worker_id: Option<String>,
    pub location_id: Option<String>,
    pub state_code: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BurdenQuery {
    pub scope: BurdenScope,
    pub effective_at: NaiveDate,
}

/// A single tier lookup: the most recent rate for `category` at `level`
/// (scoped by `scope_key` unless GLOBAL) effective on or before
/// `effective_at`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLookup<'a> {
    pub category: BurdenCategory,
    pub level: BurdenLevel,
    pub scope_key: Option<&'a str>,
    pub effective_at: NaiveDate,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BurdenSourceError {
    #[error("storage failure: {0}")]
    Storage(String),
}

#[async_trait]
pub trait BurdenRateSource: Send + Sync {
    async fn latest_effective(
        &self,
        lookup: RateLookup<'_>,
    ) -> Result<Option<Decimal>, BurdenSourceError>;
}

/// Resolved percentage per category. Ephemeral: computed fresh per
/// request and never cached across requests; it is only persisted as
/// part of an economics snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedBurdenMap {
    rates: BTreeMap<BurdenCategory, Decimal>,
}

impl ResolvedBurdenMap {
    pub fn from_rates(rates: BTreeMap<BurdenCategory, Decimal>) -> Self {
        Self { rates }
    }

    pub fn get(&self, category: BurdenCategory) -> Decimal {
        self.rates.get(&category).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn iter(&self) -> impl Iterator<Item = (BurdenCategory, Decimal)> + '_ {
        self.rates.iter().map(|(category, percent)| (*category, *percent))
    }

    pub fn total_percent(&self) -> Decimal {
        self.rates.values().copied().sum()
    }

    /// `1 + total/100`, applied to base rates to produce burdened rates.
    pub fn multiplier(&self) -> Decimal {
        Decimal::ONE + self.total_percent() / Decimal::ONE_HUNDRED
    }
}

pub struct BurdenResolver<S> {
    source: S,
}

impl<S> BurdenResolver<S>
where
    S: BurdenRateSource,
{
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Resolve the full category set for one query. Pure read; callers
    /// needing idempotency must hold the result rather than re-resolve.
    pub async fn resolve(&self, query: &BurdenQuery) -> Result<ResolvedBurdenMap, BurdenSourceError> {
        let mut rates = BTreeMap::new();
        for category in BurdenCategory::ALL {
            let percent = match self.resolve_category(category, query).await? {
                Some(percent) => percent,
                None => {
                    tracing::warn!(
                        event_name = "burden.category_unresolved",
                        category = %category,
                        effective_at = %query.effective_at,
                        "no burden rate matched at any level; defaulting to zero percent"
                    );
                    Decimal::ZERO
                }
            };
            rates.insert(category, percent);
        }
        Ok(ResolvedBurdenMap { rates })
    }

    async fn resolve_category(
        &self,
        category: BurdenCategory,
        query: &BurdenQuery,
    ) -> Result<Option<Decimal>, BurdenSourceError> {
        let scope = &query.scope;
        let tiers: [(BurdenLevel, Option<&str>); 4] = [
            (BurdenLevel::Worker, scope.worker_id.as_deref()),
            (BurdenLevel::Site, scope.location_id.as_deref()),
            (BurdenLevel::State, scope.state_code.as_deref()),
            (BurdenLevel::Global, None),
        ];

        for (level, scope_key) in tiers {
            if level != BurdenLevel::Global && scope_key.is_none() {
                continue;
            }
            let lookup =
                RateLookup { category, level, scope_key, effective_at: query.effective_at };
            if let Some(percent) = self.source.latest_effective(lookup).await? {
                return Ok(Some(percent));
            }
        }

        Ok(None)
    }
}
