//! Survival horizon: how many days each currency's liquid-asset buffer plus
//! projected net flows stay non-negative under stress.
//!
//! The daily projection is searched for the first day the running position
//! (buffer + cumulative net flow) drops below zero. The horizon is the last
//! day still covered. With no breach inside the projection the horizon is
//! the projection cap.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::projection::{project_cash_flows, DailyLedger, ProjectionContext};
use crate::assumptions::{AssumptionsConfig, AssumptionsManager, LiquidityScenario};
use crate::buckets::BucketSet;
use crate::config::{AlmConfig, StressSeverity};
use crate::error::AlmError;
use crate::instruments::{validate_instruments, Instrument};
use crate::types::{with_metadata, ComputationOutput, Currency, Money};
use crate::AlmResult;

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurvivalHorizonInput {
    pub calculation_date: NaiveDate,
    pub instruments: Vec<Instrument>,
    #[serde(default)]
    pub assumptions: AssumptionsConfig,
    #[serde(default)]
    pub scenario: LiquidityScenario,
    #[serde(default)]
    pub stress: StressSeverity,
    /// High-quality liquid assets available per currency.
    #[serde(default)]
    pub liquid_assets_buffer: BTreeMap<Currency, Money>,
    #[serde(default)]
    pub config: AlmConfig,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurvivalBucket {
    pub bucket: String,
    pub inflows: Money,
    pub outflows: Money,
    pub net_flow: Money,
    pub cumulative_gap: Money,
    /// Buffer plus cumulative gap at bucket end.
    pub position: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencySurvival {
    pub currency: Currency,
    pub horizon_days: i64,
    pub horizon_date: NaiveDate,
    pub breached: bool,
    /// Bucket of the first negative day, or the ladder's tail label if none.
    pub critical_bucket: String,
    pub liquid_assets_buffer: Money,
    pub min_position: Money,
    pub min_position_day: i64,
    pub buckets: Vec<SurvivalBucket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurvivalHorizonOutput {
    pub calculation_date: NaiveDate,
    pub scenario: LiquidityScenario,
    pub stress: StressSeverity,
    pub overall_horizon_days: i64,
    pub critical_currency: Option<Currency>,
    pub by_currency: BTreeMap<Currency, CurrencySurvival>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn calculate_survival_horizon(
    input: &SurvivalHorizonInput,
) -> AlmResult<ComputationOutput<SurvivalHorizonOutput>> {
    let start = Instant::now();
    validate_input(input)?;
    let manager = AssumptionsManager::from_config(&input.assumptions)?;
    let config = &input.config;
    let factors = config.stress_factors(input.stress);

    info!(
        instruments = input.instruments.len(),
        scenario = input.scenario.as_str(),
        stress = ?input.stress,
        "Calculating survival horizon"
    );

    let ctx = ProjectionContext {
        calculation_date: input.calculation_date,
        scenario: input.scenario,
        buckets: &config.liquidity_buckets,
        horizon_days: config.horizon_cap_days,
    };
    let mut ledgers = project_cash_flows(&input.instruments, &manager, &ctx)?.ledgers;
    for currency in input.liquid_assets_buffer.keys() {
        ledgers
            .entry(currency.clone())
            .or_insert_with(|| DailyLedger::new(currency.clone(), config.horizon_cap_days));
    }

    let mut warnings = Vec::new();
    let mut by_currency = BTreeMap::new();
    for (currency, ledger) in &ledgers {
        let stressed = ledger.stressed(factors.inflow_factor, factors.outflow_factor);
        let buffer = input
            .liquid_assets_buffer
            .get(currency)
            .copied()
            .unwrap_or(Decimal::ZERO);
        let result = survival_from_ledger(&stressed, buffer, &config.liquidity_buckets, input.calculation_date);
        info!(
            currency = %currency,
            horizon_days = result.horizon_days,
            breached = result.breached,
            "Survival horizon"
        );
        if result.breached && result.horizon_days < 30 {
            warnings.push(format!(
                "{currency}: survival horizon of {} days is below one month",
                result.horizon_days
            ));
        }
        by_currency.insert(currency.clone(), result);
    }

    let (overall_horizon_days, critical_currency) = overall_horizon(&by_currency, config.horizon_cap_days);

    let output = SurvivalHorizonOutput {
        calculation_date: input.calculation_date,
        scenario: input.scenario,
        stress: input.stress,
        overall_horizon_days,
        critical_currency,
        by_currency,
    };

    Ok(with_metadata(
        "Survival horizon: daily search over stressed cumulative liquidity position",
        &json!({
            "scenario": input.scenario.as_str(),
            "stress": input.stress,
            "inflow_factor": factors.inflow_factor.to_string(),
            "outflow_factor": factors.outflow_factor.to_string(),
            "horizon_cap_days": config.horizon_cap_days,
        }),
        warnings,
        start.elapsed().as_micros() as u64,
        output,
    ))
}

/// Minimum horizon across currencies and the currency that sets it.
pub fn overall_horizon(
    by_currency: &BTreeMap<Currency, CurrencySurvival>,
    cap: i64,
) -> (i64, Option<Currency>) {
    by_currency
        .values()
        .min_by_key(|r| r.horizon_days)
        .map(|r| (r.horizon_days, Some(r.currency.clone())))
        .unwrap_or((cap, None))
}

/// Run the daily search on an already-stressed ledger.
pub fn survival_from_ledger(
    ledger: &DailyLedger,
    buffer: Money,
    buckets: &BucketSet,
    calculation_date: NaiveDate,
) -> CurrencySurvival {
    let cap = ledger.horizon_days();
    let mut position = buffer;
    let mut min_position = buffer;
    let mut min_position_day = 0;
    let mut breach_day: Option<i64> = None;

    for (slot, (inflow, outflow)) in ledger.inflows.iter().zip(&ledger.outflows).enumerate() {
        let day = slot as i64 + 1;
        position += *inflow - *outflow;
        if position < min_position {
            min_position = position;
            min_position_day = day;
        }
        if breach_day.is_none() && position < Decimal::ZERO {
            breach_day = Some(day);
        }
    }

    let (horizon_days, critical_bucket) = match breach_day {
        Some(day) => {
            let bucket = buckets
                .assign(day)
                .map(|i| buckets.label(i).to_string())
                .unwrap_or_else(|| buckets.tail_label());
            (day - 1, bucket)
        }
        None => (cap, buckets.tail_label()),
    };

    let mut cumulative = Decimal::ZERO;
    let rows = ledger
        .bucket_flows(buckets)
        .into_iter()
        .enumerate()
        .map(|(idx, f)| {
            let net = f.inflows - f.outflows;
            cumulative += net;
            SurvivalBucket {
                bucket: buckets.label(idx).to_string(),
                inflows: f.inflows,
                outflows: f.outflows,
                net_flow: net,
                cumulative_gap: cumulative,
                position: buffer + cumulative,
            }
        })
        .collect();

    CurrencySurvival {
        currency: ledger.currency.clone(),
        horizon_days,
        horizon_date: calculation_date + Duration::days(horizon_days),
        breached: breach_day.is_some(),
        critical_bucket,
        liquid_assets_buffer: buffer,
        min_position,
        min_position_day,
        buckets: rows,
    }
}

fn validate_input(input: &SurvivalHorizonInput) -> AlmResult<()> {
    input.config.validate()?;
    validate_instruments(&input.instruments)?;
    for (currency, buffer) in &input.liquid_assets_buffer {
        if *buffer < Decimal::ZERO {
            return Err(AlmError::invalid(
                format!("liquid_assets_buffer.{currency}"),
                "Liquid asset buffer must be non-negative",
            ));
        }
    }
    if input.instruments.is_empty() && input.liquid_assets_buffer.is_empty() {
        return Err(AlmError::InsufficientData(
            "Survival horizon needs at least one instrument or liquid asset buffer".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buckets::TimeBucket;
    use rust_decimal_macros::dec;

    fn calc() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn test_breach_on_first_negative_day() {
        let buckets = BucketSet::liquidity_default();
        let mut ledger = DailyLedger::new(Currency::RUB, 1095);
        ledger.add(3, dec!(-60));
        ledger.add(10, dec!(-60));
        let r = survival_from_ledger(&ledger, dec!(100), &buckets, calc());
        assert!(r.breached);
        assert_eq!(r.horizon_days, 9);
        assert_eq!(r.critical_bucket, "8-14d");
        assert_eq!(r.min_position, dec!(-20));
        assert_eq!(r.min_position_day, 10);
        assert_eq!(r.horizon_date, calc() + Duration::days(9));
    }

    #[test]
    fn test_day_one_breach_gives_zero_horizon() {
        let buckets = BucketSet::liquidity_default();
        let mut ledger = DailyLedger::new(Currency::RUB, 1095);
        ledger.add(1, dec!(-1));
        let r = survival_from_ledger(&ledger, Decimal::ZERO, &buckets, calc());
        assert_eq!(r.horizon_days, 0);
        assert_eq!(r.critical_bucket, "overnight");
    }

    #[test]
    fn test_no_breach_reports_cap() {
        let buckets = BucketSet::liquidity_default();
        let mut ledger = DailyLedger::new(Currency::RUB, 1095);
        ledger.add(5, dec!(-10));
        let r = survival_from_ledger(&ledger, dec!(10), &buckets, calc());
        assert!(!r.breached);
        assert_eq!(r.horizon_days, 1095);
        assert_eq!(r.critical_bucket, "2y+");
        assert_eq!(r.buckets[1].position, Decimal::ZERO);
    }

    #[test]
    fn test_breach_past_closed_ladder_uses_tail_label() {
        let buckets = BucketSet::new(vec![
            TimeBucket::closed("0-30d", 30),
            TimeBucket::closed("30-90d", 90),
        ])
        .unwrap();
        let mut ledger = DailyLedger::new(Currency::RUB, 365);
        ledger.add(200, dec!(-5));
        let r = survival_from_ledger(&ledger, Decimal::ZERO, &buckets, calc());
        assert_eq!(r.horizon_days, 199);
        assert_eq!(r.critical_bucket, "30-90d+");

        let quiet = DailyLedger::new(Currency::RUB, 365);
        let r = survival_from_ledger(&quiet, Decimal::ZERO, &buckets, calc());
        assert_eq!(r.critical_bucket, "30-90d+");
    }

    #[test]
    fn test_overall_horizon_picks_minimum() {
        let buckets = BucketSet::liquidity_default();
        let mut short = DailyLedger::new(Currency::USD, 1095);
        short.add(2, dec!(-1));
        let long = DailyLedger::new(Currency::RUB, 1095);
        let mut map = BTreeMap::new();
        map.insert(Currency::USD, survival_from_ledger(&short, Decimal::ZERO, &buckets, calc()));
        map.insert(Currency::RUB, survival_from_ledger(&long, Decimal::ZERO, &buckets, calc()));
        assert_eq!(overall_horizon(&map, 1095), (1, Some(Currency::USD)));
        assert_eq!(overall_horizon(&BTreeMap::new(), 1095), (1095, None));
    }
}
