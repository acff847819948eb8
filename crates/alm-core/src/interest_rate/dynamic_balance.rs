//! Interest-rate risk on a dynamic balance sheet: repricing gaps and
//! sensitivity before and after deposit volumes react to the rate shock.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::elasticity::{
    analyze_elasticity_impact, default_elasticity_table, DepositVolumeChange, ElasticityEngine,
    ElasticityTable, SegmentImpact,
};
use super::gaps::{analyze_rate_gaps, filter_book, RateGapAnalysis};
use crate::assumptions::{AssumptionsConfig, AssumptionsManager};
use crate::config::AlmConfig;
use crate::error::AlmError;
use crate::instruments::{validate_instruments, BookType, Instrument};
use crate::types::{with_metadata, ComputationOutput, Currency, Money};
use crate::AlmResult;

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicIrrInput {
    pub calculation_date: NaiveDate,
    pub instruments: Vec<Instrument>,
    #[serde(default)]
    pub rate_shocks_bps: BTreeMap<Currency, i32>,
    #[serde(default)]
    pub book_filter: Option<BookType>,
    #[serde(default)]
    pub elasticity_table: Option<ElasticityTable>,
    #[serde(default)]
    pub assumptions: AssumptionsConfig,
    #[serde(default)]
    pub config: AlmConfig,
}

/// Several named shock vectors over the same portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiScenarioIrrInput {
    #[serde(flatten)]
    pub base: DynamicIrrInput,
    pub scenarios: BTreeMap<String, BTreeMap<Currency, i32>>,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketDifference {
    pub bucket: String,
    pub rsa_diff: Money,
    pub rsl_diff: Money,
    pub gap_diff: Money,
    pub gap_ratio_diff: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyComparison {
    pub buckets: Vec<BucketDifference>,
    pub nii_impact_difference: Money,
    pub eve_impact_difference: Money,
    pub mean_abs_gap_ratio_change: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicIrrResult {
    pub static_balance: RateGapAnalysis,
    pub dynamic_balance: RateGapAnalysis,
    pub volume_changes: Vec<DepositVolumeChange>,
    pub elasticity_summary: Vec<SegmentImpact>,
    /// Dynamic minus static, per currency.
    pub comparison: BTreeMap<Currency, CurrencyComparison>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn calculate_dynamic_irr(input: &DynamicIrrInput) -> AlmResult<ComputationOutput<DynamicIrrResult>> {
    let start = Instant::now();
    let (manager, table) = prepare(input)?;
    let result = run_dynamic_irr(input, &manager, &table, &input.rate_shocks_bps)?;

    let mut warnings = Vec::new();
    if result.volume_changes.is_empty() {
        warnings.push("No deposit volumes changed; static and dynamic balances coincide".to_string());
    }

    Ok(with_metadata(
        "Static vs dynamic balance repricing gaps with deposit elasticity",
        &assumptions_json(input),
        warnings,
        start.elapsed().as_micros() as u64,
        result,
    ))
}

pub fn calculate_multiple_scenarios(
    input: &MultiScenarioIrrInput,
) -> AlmResult<ComputationOutput<BTreeMap<String, DynamicIrrResult>>> {
    let start = Instant::now();
    if input.scenarios.is_empty() {
        return Err(AlmError::invalid("scenarios", "At least one scenario is required"));
    }
    let (manager, table) = prepare(&input.base)?;
    let mut results = BTreeMap::new();
    for (name, shocks) in &input.scenarios {
        info!(scenario = %name, "Dynamic IRR scenario");
        results.insert(name.clone(), run_dynamic_irr(&input.base, &manager, &table, shocks)?);
    }

    let mut assumptions = assumptions_json(&input.base);
    assumptions["scenarios"] = json!(input.scenarios);
    Ok(with_metadata(
        "Static vs dynamic balance repricing gaps across rate scenarios",
        &assumptions,
        Vec::new(),
        start.elapsed().as_micros() as u64,
        results,
    ))
}

fn prepare(input: &DynamicIrrInput) -> AlmResult<(AssumptionsManager, ElasticityTable)> {
    input.config.validate()?;
    validate_instruments(&input.instruments)?;
    let table = input.elasticity_table.clone().unwrap_or_else(default_elasticity_table);
    table.validate()?;
    let manager = AssumptionsManager::from_config(&input.assumptions)?;
    Ok((manager, table))
}

fn assumptions_json(input: &DynamicIrrInput) -> serde_json::Value {
    json!({
        "rate_shocks_bps": input.rate_shocks_bps,
        "default_shock_bps": input.config.default_shock_bps,
        "book_filter": input.book_filter,
        "buckets": input.config.repricing_buckets.labels(),
        "custom_elasticity_table": input.elasticity_table.is_some(),
    })
}

fn run_dynamic_irr(
    input: &DynamicIrrInput,
    manager: &AssumptionsManager,
    table: &ElasticityTable,
    shocks: &BTreeMap<Currency, i32>,
) -> AlmResult<DynamicIrrResult> {
    let instruments = filter_book(&input.instruments, input.book_filter);
    let config = &input.config;
    let calc = input.calculation_date;

    info!(instruments = instruments.len(), "Calculating static balance IRR");
    let static_balance = analyze_rate_gaps(&instruments, manager, calc, config, shocks, &[])?;

    let engine = ElasticityEngine {
        calculation_date: calc,
        table,
        manager,
        buckets: &config.liquidity_buckets,
        default_shock_bps: config.default_shock_bps,
    };
    let (dynamic_instruments, volume_changes) = engine.create_dynamic_balance_sheet(&instruments, shocks);

    info!(changed = volume_changes.len(), "Calculating dynamic balance IRR");
    let dynamic_balance = analyze_rate_gaps(&dynamic_instruments, manager, calc, config, shocks, &[])?;

    let comparison = compare_static_dynamic(&static_balance, &dynamic_balance);

    Ok(DynamicIrrResult {
        elasticity_summary: analyze_elasticity_impact(&volume_changes),
        static_balance,
        dynamic_balance,
        volume_changes,
        comparison,
    })
}

pub fn compare_static_dynamic(
    static_balance: &RateGapAnalysis,
    dynamic_balance: &RateGapAnalysis,
) -> BTreeMap<Currency, CurrencyComparison> {
    let mut out = BTreeMap::new();
    for (currency, s) in &static_balance.by_currency {
        let Some(d) = dynamic_balance.by_currency.get(currency) else {
            continue;
        };
        let buckets: Vec<BucketDifference> = s
            .buckets
            .iter()
            .zip(&d.buckets)
            .map(|(sb, db)| BucketDifference {
                bucket: sb.bucket.clone(),
                rsa_diff: db.rsa - sb.rsa,
                rsl_diff: db.rsl - sb.rsl,
                gap_diff: db.gap - sb.gap,
                gap_ratio_diff: db.gap_ratio - sb.gap_ratio,
            })
            .collect();
        let mean_abs_gap_ratio_change = if buckets.is_empty() {
            Decimal::ZERO
        } else {
            buckets.iter().map(|b| b.gap_ratio_diff.abs()).sum::<Decimal>() / Decimal::from(buckets.len())
        };
        let (nii_diff, eve_diff) = match (
            static_balance.sensitivity.get(currency),
            dynamic_balance.sensitivity.get(currency),
        ) {
            (Some(ss), Some(ds)) => (ds.nii_impact_1y - ss.nii_impact_1y, ds.eve_impact - ss.eve_impact),
            _ => (Decimal::ZERO, Decimal::ZERO),
        };
        out.insert(
            currency.clone(),
            CurrencyComparison {
                buckets,
                nii_impact_difference: nii_diff,
                eve_impact_difference: eve_diff,
                mean_abs_gap_ratio_change,
            },
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::InstrumentKind;
    use crate::types::Side;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn calc() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn portfolio() -> Vec<Instrument> {
        let loan = Instrument::new("L1", InstrumentKind::Loan, Side::Asset, dec!(1_000_000), Currency::RUB)
            .with_maturity(calc() + Duration::days(20))
            .with_rate(dec!(0.12));
        let dep = Instrument::new("D1", InstrumentKind::Deposit, Side::Liability, dec!(800_000), Currency::RUB)
            .with_maturity(calc() + Duration::days(20))
            .with_counterparty(None, "corporate");
        let mut trading = Instrument::new("T1", InstrumentKind::Bond, Side::Asset, dec!(50_000), Currency::RUB)
            .with_maturity(calc() + Duration::days(20));
        trading.book = BookType::Trading;
        vec![loan, dep, trading]
    }

    fn input() -> DynamicIrrInput {
        let mut shocks = BTreeMap::new();
        shocks.insert(Currency::RUB, 200);
        DynamicIrrInput {
            calculation_date: calc(),
            instruments: portfolio(),
            rate_shocks_bps: shocks,
            book_filter: Some(BookType::Banking),
            elasticity_table: None,
            assumptions: AssumptionsConfig::default(),
            config: AlmConfig::default(),
        }
    }

    #[test]
    fn test_dynamic_gap_reflects_deposit_outflow() {
        let out = calculate_dynamic_irr(&input()).unwrap().result;
        let s = &out.static_balance.by_currency[&Currency::RUB];
        let d = &out.dynamic_balance.by_currency[&Currency::RUB];
        // trading bond filtered out
        assert_eq!(s.total_rsa, dec!(1_000_000));
        assert_eq!(s.buckets[0].rsl, dec!(800_000));
        // corporate short-term: -2.16% volume
        assert_eq!(d.buckets[0].rsl, dec!(782_720));
        let cmp = &out.comparison[&Currency::RUB];
        assert_eq!(cmp.buckets[0].gap_diff, dec!(17_280));
        assert!(cmp.nii_impact_difference > Decimal::ZERO);
        assert_eq!(out.volume_changes.len(), 1);
    }

    #[test]
    fn test_multiple_scenarios_requires_one() {
        let multi = MultiScenarioIrrInput {
            base: input(),
            scenarios: BTreeMap::new(),
        };
        assert!(calculate_multiple_scenarios(&multi).is_err());
    }

    #[test]
    fn test_multiple_scenarios_run_each() {
        let mut scenarios = BTreeMap::new();
        scenarios.insert("up".to_string(), BTreeMap::from([(Currency::RUB, 100)]));
        scenarios.insert("down".to_string(), BTreeMap::from([(Currency::RUB, -100)]));
        let multi = MultiScenarioIrrInput {
            base: input(),
            scenarios,
        };
        let out = calculate_multiple_scenarios(&multi).unwrap().result;
        assert_eq!(out.len(), 2);
        let up = &out["up"].comparison[&Currency::RUB];
        let down = &out["down"].comparison[&Currency::RUB];
        assert!(up.buckets[0].gap_diff > Decimal::ZERO);
        assert!(down.buckets[0].gap_diff < Decimal::ZERO);
    }
}
