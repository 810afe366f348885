//! Quote economics: canonical input hashing and burdened-rate math.
//!
//! The snapshot key is a SHA-256 digest over a canonical JSON payload
//! `{"quoteId", "state", "lines": [{"tradeId", "baseRate"}, ...]}` with
//! lines ordered by trade id ascending and decimal scale normalized, so
//! the digest is sensitive to values but not to line insertion order or
//! trailing zeros. Identical inputs therefore address the same
//! snapshot; any changed base rate addresses a new one.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::burden::{BurdenSourceError, ResolvedBurdenMap};
use crate::domain::quote::{QuoteId, QuoteLine};

/// Burdened rates round half-up (midpoint away from zero) to four
/// decimal places; re-rounding an already-rounded value is a no-op.
const RATE_SCALE: u32 = 4;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EconomicsError {
    #[error("quote `{0}` was not found")]
    QuoteNotFound(String),
    #[error("quote `{0}` has no lines to price")]
    EmptyQuote(String),
    #[error("canonical input encoding failed: {0}")]
    Encoding(String),
    #[error(transparent)]
    Burden(#[from] BurdenSourceError),
    #[error("storage failure: {0}")]
    Storage(String),
}

#[derive(Serialize)]
struct CanonicalInput<'a> {
    #[serde(rename = "quoteId")]
    quote_id: &'a str,
    state: &'a str,
    lines: Vec<CanonicalLine<'a>>,
}

#[derive(Serialize)]
struct CanonicalLine<'a> {
    #[serde(rename = "tradeId")]
    trade_id: &'a str,
    #[serde(rename = "baseRate")]
    base_rate: Decimal,
}

/// Content address for a generation request.
pub fn input_hash(
    quote_id: &QuoteId,
    state_code: &str,
    lines: &[QuoteLine],
) -> Result<String, EconomicsError> {
    let mut ordered: Vec<&QuoteLine> = lines.iter().collect();
    ordered.sort_by(|a, b| a.trade_id.cmp(&b.trade_id));

    let canonical = CanonicalInput {
        quote_id: &quote_id.0,
        state: state_code,
        lines: ordered
            .iter()
            .map(|line| CanonicalLine {
                trade_id: &line.trade_id,
                base_rate: line.base_rate.normalize(),
            })
            .collect(),
    };

    let payload = serde_json::to_vec(&canonical)
        .map_err(|error| EconomicsError::Encoding(error.to_string()))?;
    Ok(sha256_hex(&payload))
}

fn sha256_hex(payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

pub fn round_rate(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(RATE_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

fn ot_multiplier() -> Decimal {
    Decimal::new(15, 1)
}

fn dt_multiplier() -> Decimal {
    Decimal::TWO
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineEconomics {
    pub trade_id: String,
    pub base_rate: Decimal,
    pub burdened_reg: Decimal,
    pub burdened_ot: Decimal,
    pub burdened_dt: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EconomicsSummary {
    pub total_burden_percent: Decimal,
    pub burden_multiplier: Decimal,
}

/// Immutable, content-addressed record of one generation. Never mutated
/// after insert; regeneration with identical inputs returns this row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EconomicsSnapshot {
    pub id: String,
    pub quote_id: QuoteId,
    pub input_hash: String,
    pub burden_map: ResolvedBurdenMap,
    pub lines: Vec<LineEconomics>,
    pub summary: EconomicsSummary,
    pub generated_at: DateTime<Utc>,
}

pub fn compute_line(line: &QuoteLine, multiplier: Decimal) -> LineEconomics {
    LineEconomics {
        trade_id: line.trade_id.clone(),
        base_rate: line.base_rate,
        burdened_reg: round_rate(line.base_rate * multiplier),
        burdened_ot: round_rate(line.base_rate * ot_multiplier() * multiplier),
        burdened_dt: round_rate(line.base_rate * dt_multiplier() * multiplier),
    }
}

pub fn compute_economics(
    lines: &[QuoteLine],
    burden_map: &ResolvedBurdenMap,
) -> (Vec<LineEconomics>, EconomicsSummary) {
    let multiplier = burden_map.multiplier();
    let economics = lines.iter().map(|line| compute_line(line, multiplier)).collect();
    let summary = EconomicsSummary {
        total_burden_percent: burden_map.total_percent(),
        burden_multiplier: multiplier,
    };
    (economics, summary)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use crate::burden::ResolvedBurdenMap;
    use crate::domain::burden::BurdenCategory;
    use crate::domain::quote::{QuoteId, QuoteLine};

    use super::{compute_economics, input_hash, round_rate};

    fn dec(raw: &str) -> Decimal {
        Decimal::from_str(raw).expect("test decimal")
    }

    fn line(trade_id: &str, base_rate: &str) -> QuoteLine {
        QuoteLine { trade_id: trade_id.to_string(), base_rate: dec(base_rate) }
    }

    #[test]
    fn hash_ignores_line_insertion_order() {
        let quote_id = QuoteId("quote-1".to_string());
        let forward = [line("electrician", "72.50"), line("millwright", "85")];
        let reversed = [line("millwright", "85"), line("electrician", "72.50")];

        let first = input_hash(&quote_id, "KY", &forward).expect("hash");
        let second = input_hash(&quote_id, "KY", &reversed).expect("hash");
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn hash_ignores_decimal_scale_but_not_value() {
        let quote_id = QuoteId("quote-1".to_string());
        let plain = [line("millwright", "85")];
        let scaled = [line("millwright", "85.00")];
        let changed = [line("millwright", "85.01")];

        let base = input_hash(&quote_id, "KY", &plain).expect("hash");
        assert_eq!(base, input_hash(&quote_id, "KY", &scaled).expect("hash"));
        assert_ne!(base, input_hash(&quote_id, "KY", &changed).expect("hash"));
    }

    #[test]
    fn hash_covers_quote_identity_and_state() {
        let lines = [line("millwright", "85")];
        let base = input_hash(&QuoteId("quote-1".to_string()), "KY", &lines).expect("hash");
        assert_ne!(base, input_hash(&QuoteId("quote-2".to_string()), "KY", &lines).expect("hash"));
        assert_ne!(base, input_hash(&QuoteId("quote-1".to_string()), "TN", &lines).expect("hash"));
    }

    #[test]
    fn rounding_is_half_up_and_idempotent() {
        assert_eq!(round_rate(dec("1.00005")), dec("1.0001"));
        assert_eq!(round_rate(dec("1.00004")), dec("1.0000"));
        let once = round_rate(dec("146.62500001"));
        assert_eq!(round_rate(once), once);
    }

    #[test]
    fn fifteen_percent_burden_on_85_matches_reference_economics() {
        let mut rates = BTreeMap::new();
        rates.insert(BurdenCategory::Fica, dec("7.65"));
        rates.insert(BurdenCategory::Suta, dec("7.35"));
        let burden_map = ResolvedBurdenMap::from_rates(rates);

        let (lines, summary) = compute_economics(&[line("millwright", "85")], &burden_map);

        assert_eq!(summary.total_burden_percent, dec("15"));
        assert_eq!(summary.burden_multiplier, dec("1.15"));
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].burdened_reg, dec("97.75"));
        assert_eq!(lines[0].burdened_ot, dec("146.625"));
        assert_eq!(lines[0].burdened_dt, dec("195.5"));
    }

    #[test]
    fn zero_burden_leaves_base_rates_untouched() {
        let burden_map = ResolvedBurdenMap::default();
        let (lines, summary) = compute_economics(&[line("laborer", "18.25")], &burden_map);

        assert_eq!(summary.burden_multiplier, Decimal::ONE);
        assert_eq!(lines[0].burdened_reg, dec("18.25"));
        assert_eq!(lines[0].burdened_ot, dec("27.375"));
        assert_eq!(lines[0].burdened_dt, dec("36.5"));
    }
}
