//! Repricing gaps per currency with NII and EVE sensitivity to a parallel
//! rate shock.
//!
//! - **RSA / RSL**: rate-sensitive assets and liabilities by repricing bucket
//! - **Gap ratio**: bucket gap over the currency's total RSA
//! - **NII impact (1y)**: gaps repricing within a year, each weighted by the
//!   share of the year remaining after the bucket midpoint
//! - **EVE impact**: gaps weighted by bucket midpoint in years (duration proxy)

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::assumptions::{AssumptionsConfig, AssumptionsManager, LiquidityScenario};
use crate::buckets::BucketSet;
use crate::config::AlmConfig;
use crate::instruments::{validate_instruments, BookType, Instrument, RiskContribution};
use crate::liquidity::projection::{project_contributions, ProjectionContext};
use crate::types::{with_metadata, ComputationOutput, Currency, Money};
use crate::AlmResult;

const BPS_PER_UNIT: Decimal = dec!(10000);
const DAYS_PER_YEAR: Decimal = dec!(365);

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateGapInput {
    pub calculation_date: NaiveDate,
    pub instruments: Vec<Instrument>,
    #[serde(default)]
    pub assumptions: AssumptionsConfig,
    /// Parallel shock per currency in basis points. Missing currencies use
    /// `config.default_shock_bps`.
    #[serde(default)]
    pub rate_shocks_bps: BTreeMap<Currency, i32>,
    #[serde(default)]
    pub target_currencies: Vec<Currency>,
    /// Only instruments of this book, when set.
    #[serde(default)]
    pub book_filter: Option<BookType>,
    #[serde(default)]
    pub config: AlmConfig,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepricingGapBucket {
    pub bucket: String,
    pub rsa: Money,
    pub rsl: Money,
    pub gap: Money,
    pub gap_ratio: Decimal,
    pub cumulative_gap: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyRateGaps {
    pub currency: Currency,
    pub buckets: Vec<RepricingGapBucket>,
    pub total_rsa: Money,
    pub total_rsl: Money,
    pub total_gap: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSensitivity {
    pub currency: Currency,
    pub shock_bps: i32,
    pub nii_impact_1y: Money,
    pub eve_impact: Money,
    pub max_abs_gap_ratio: Decimal,
    pub gap_limit_breached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateGapAnalysis {
    pub by_currency: BTreeMap<Currency, CurrencyRateGaps>,
    pub sensitivity: BTreeMap<Currency, RateSensitivity>,
    /// Sum of instrument DV01s per currency.
    pub dv01: BTreeMap<Currency, Money>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateGapOutput {
    pub calculation_date: NaiveDate,
    pub analysis: RateGapAnalysis,
    pub total_nii_impact: Money,
    pub total_eve_impact: Money,
    pub limit_breaches: Vec<Currency>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn calculate_rate_gaps(input: &RateGapInput) -> AlmResult<ComputationOutput<RateGapOutput>> {
    let start = Instant::now();
    input.config.validate()?;
    validate_instruments(&input.instruments)?;
    let manager = AssumptionsManager::from_config(&input.assumptions)?;

    let instruments = filter_book(&input.instruments, input.book_filter);
    info!(
        instruments = instruments.len(),
        book = ?input.book_filter,
        "Calculating interest rate gaps"
    );

    let analysis = analyze_rate_gaps(
        &instruments,
        &manager,
        input.calculation_date,
        &input.config,
        &input.rate_shocks_bps,
        &input.target_currencies,
    )?;

    let mut warnings = Vec::new();
    for c in &input.target_currencies {
        if !analysis.by_currency.contains_key(c) {
            warnings.push(format!("No rate-sensitive positions for target currency {c}"));
        }
    }
    let limit_breaches: Vec<Currency> = analysis
        .sensitivity
        .values()
        .filter(|s| s.gap_limit_breached)
        .map(|s| s.currency.clone())
        .collect();
    for c in &limit_breaches {
        warn!(currency = %c, limit = %input.config.gap_ratio_limit, "Gap ratio limit breached");
        warnings.push(format!(
            "{c}: gap ratio exceeds limit of {}",
            input.config.gap_ratio_limit
        ));
    }

    let output = RateGapOutput {
        calculation_date: input.calculation_date,
        total_nii_impact: analysis.sensitivity.values().map(|s| s.nii_impact_1y).sum(),
        total_eve_impact: analysis.sensitivity.values().map(|s| s.eve_impact).sum(),
        limit_breaches,
        analysis,
    };

    Ok(with_metadata(
        "Repricing gap analysis with time-weighted NII and duration-proxy EVE sensitivity",
        &json!({
            "buckets": input.config.repricing_buckets.labels(),
            "default_shock_bps": input.config.default_shock_bps,
            "rate_shocks_bps": input.rate_shocks_bps,
            "gap_ratio_limit": input.config.gap_ratio_limit.to_string(),
            "book_filter": input.book_filter,
        }),
        warnings,
        start.elapsed().as_micros() as u64,
        output,
    ))
}

pub fn filter_book(instruments: &[Instrument], book: Option<BookType>) -> Vec<Instrument> {
    match book {
        Some(b) => instruments.iter().filter(|i| i.book == b).cloned().collect(),
        None => instruments.to_vec(),
    }
}

/// Project instruments and build gaps and sensitivity per currency.
pub fn analyze_rate_gaps(
    instruments: &[Instrument],
    manager: &AssumptionsManager,
    calculation_date: NaiveDate,
    config: &AlmConfig,
    shocks_bps: &BTreeMap<Currency, i32>,
    target_currencies: &[Currency],
) -> AlmResult<RateGapAnalysis> {
    let ctx = ProjectionContext {
        calculation_date,
        scenario: LiquidityScenario::Name,
        buckets: &config.liquidity_buckets,
        horizon_days: config.horizon_cap_days,
    };
    let contributions = project_contributions(instruments, manager, &ctx)?;
    let mut by_currency = repricing_gaps(&contributions, calculation_date, &config.repricing_buckets);
    if !target_currencies.is_empty() {
        by_currency.retain(|c, _| target_currencies.contains(c));
    }

    let sensitivity = by_currency
        .iter()
        .map(|(c, gaps)| {
            let shock = shock_for(c, shocks_bps, config.default_shock_bps);
            (
                c.clone(),
                gap_sensitivity(gaps, &config.repricing_buckets, shock, config.gap_ratio_limit),
            )
        })
        .collect();

    let mut dv01: BTreeMap<Currency, Money> = BTreeMap::new();
    for rc in &contributions {
        if by_currency.contains_key(&rc.currency) {
            *dv01.entry(rc.currency.clone()).or_insert(Decimal::ZERO) += rc.dv01;
        }
    }

    Ok(RateGapAnalysis {
        by_currency,
        sensitivity,
        dv01,
    })
}

pub fn shock_for(currency: &Currency, shocks: &BTreeMap<Currency, i32>, default_bps: i32) -> i32 {
    shocks.get(currency).copied().unwrap_or(default_bps)
}

/// Bucket every repricing slice by currency. Slices dated before the
/// calculation date are not rate-sensitive any more and are skipped.
pub fn repricing_gaps(
    contributions: &[RiskContribution],
    calculation_date: NaiveDate,
    buckets: &BucketSet,
) -> BTreeMap<Currency, CurrencyRateGaps> {
    let mut sums: BTreeMap<Currency, Vec<(Money, Money)>> = BTreeMap::new();
    for rc in contributions {
        for slice in &rc.repricing {
            let days = (slice.date - calculation_date).num_days();
            if days < 0 {
                continue;
            }
            let Some(idx) = buckets.assign(days) else {
                continue;
            };
            let row = sums
                .entry(rc.currency.clone())
                .or_insert_with(|| vec![(Decimal::ZERO, Decimal::ZERO); buckets.len()]);
            if slice.amount > Decimal::ZERO {
                row[idx].0 += slice.amount;
            } else {
                row[idx].1 -= slice.amount;
            }
        }
    }
    sums.into_iter()
        .map(|(currency, rows)| {
            let gaps = build_gap_table(&currency, &rows, buckets);
            (currency, gaps)
        })
        .collect()
}

pub fn build_gap_table(currency: &Currency, rows: &[(Money, Money)], buckets: &BucketSet) -> CurrencyRateGaps {
    let total_rsa: Money = rows.iter().map(|(a, _)| *a).sum();
    let total_rsl: Money = rows.iter().map(|(_, l)| *l).sum();
    let mut cumulative = Decimal::ZERO;
    let table = rows
        .iter()
        .enumerate()
        .map(|(idx, (rsa, rsl))| {
            let gap = *rsa - *rsl;
            cumulative += gap;
            RepricingGapBucket {
                bucket: buckets.label(idx).to_string(),
                rsa: *rsa,
                rsl: *rsl,
                gap,
                gap_ratio: if total_rsa.is_zero() {
                    Decimal::ZERO
                } else {
                    gap / total_rsa
                },
                cumulative_gap: cumulative,
            }
        })
        .collect();
    CurrencyRateGaps {
        currency: currency.clone(),
        buckets: table,
        total_rsa,
        total_rsl,
        total_gap: total_rsa - total_rsl,
    }
}

/// Share of a year's income affected by a repricing in bucket `idx`.
/// Zero for buckets extending past one year.
pub fn nii_time_weight(buckets: &BucketSet, idx: usize) -> Decimal {
    match buckets.buckets[idx].end_day {
        Some(end) if end <= 365 => {
            let mid = Decimal::from(buckets.midpoint_days(idx));
            (Decimal::ONE - mid / DAYS_PER_YEAR).max(Decimal::ZERO)
        }
        _ => Decimal::ZERO,
    }
}

pub fn gap_sensitivity(
    gaps: &CurrencyRateGaps,
    buckets: &BucketSet,
    shock_bps: i32,
    gap_ratio_limit: Decimal,
) -> RateSensitivity {
    let shock = Decimal::from(shock_bps) / BPS_PER_UNIT;
    let mut nii = Decimal::ZERO;
    let mut eve = Decimal::ZERO;
    for (idx, row) in gaps.buckets.iter().enumerate() {
        nii += row.gap * shock * nii_time_weight(buckets, idx);
        eve -= row.gap * buckets.midpoint_years(idx) * shock;
    }
    let max_abs_gap_ratio = gaps
        .buckets
        .iter()
        .map(|b| b.gap_ratio.abs())
        .max()
        .unwrap_or(Decimal::ZERO);
    RateSensitivity {
        currency: gaps.currency.clone(),
        shock_bps,
        nii_impact_1y: nii,
        eve_impact: eve,
        max_abs_gap_ratio,
        gap_limit_breached: max_abs_gap_ratio > gap_ratio_limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::RepricingSlice;
    use crate::types::Side;
    use chrono::Duration;

    fn calc() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn contribution(currency: Currency, slices: &[(i64, Money)]) -> RiskContribution {
        RiskContribution {
            instrument_id: "x".into(),
            currency,
            side: Side::Asset,
            cash_flows: vec![],
            repricing: slices
                .iter()
                .map(|(d, a)| RepricingSlice {
                    date: calc() + Duration::days(*d),
                    amount: *a,
                })
                .collect(),
            duration: Decimal::ZERO,
            modified_duration: Decimal::ZERO,
            dv01: Decimal::ZERO,
        }
    }

    #[test]
    fn test_repricing_gaps_split_rsa_rsl() {
        let buckets = BucketSet::repricing_default();
        let rcs = vec![
            contribution(Currency::RUB, &[(10, dec!(1000)), (-5, dec!(999))]),
            contribution(Currency::RUB, &[(20, dec!(-400)), (400, dec!(-100))]),
        ];
        let gaps = repricing_gaps(&rcs, calc(), &buckets);
        let rub = &gaps[&Currency::RUB];
        assert_eq!(rub.buckets[0].rsa, dec!(1000));
        assert_eq!(rub.buckets[0].rsl, dec!(400));
        assert_eq!(rub.buckets[0].gap_ratio, dec!(0.6));
        assert_eq!(rub.buckets[4].rsl, dec!(100));
        assert_eq!(rub.buckets[4].cumulative_gap, dec!(500));
        assert_eq!(rub.total_gap, dec!(500));
    }

    #[test]
    fn test_nii_weights() {
        let buckets = BucketSet::repricing_default();
        // 0-1m midpoint day 15
        assert_eq!(nii_time_weight(&buckets, 0), Decimal::ONE - dec!(15) / dec!(365));
        assert_eq!(nii_time_weight(&buckets, 4), Decimal::ZERO);
    }

    #[test]
    fn test_sensitivity_signs() {
        let buckets = BucketSet::repricing_default();
        let rcs = vec![contribution(Currency::USD, &[(10, dec!(1000))])];
        let gaps = repricing_gaps(&rcs, calc(), &buckets);
        let s = gap_sensitivity(&gaps[&Currency::USD], &buckets, 100, dec!(0.2));
        assert!(s.nii_impact_1y > Decimal::ZERO);
        assert!(s.eve_impact < Decimal::ZERO);
        assert!(s.gap_limit_breached);

        let down = gap_sensitivity(&gaps[&Currency::USD], &buckets, -100, dec!(0.2));
        assert_eq!(down.nii_impact_1y, -s.nii_impact_1y);
    }

    #[test]
    fn test_shock_fallback() {
        let mut shocks = BTreeMap::new();
        shocks.insert(Currency::RUB, 200);
        assert_eq!(shock_for(&Currency::RUB, &shocks, 100), 200);
        assert_eq!(shock_for(&Currency::EUR, &shocks, 100), 100);
    }
}
