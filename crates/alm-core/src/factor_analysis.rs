//! Factor analysis of a risk metric between two reporting dates.
//!
//! The change from the base date (t-1) to the comparison date (t) splits
//! into:
//! - **Aging effect**: instruments present on both dates, as they stood at
//!   t-1, re-measured at t. Captures time decay and deals that matured.
//! - **New-deal effect**: the full portfolio at t against the aged one.
//!   Captures new deals and balance changes on existing ones.
//!
//! `aging + new_deals = total` holds per currency.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::assumptions::{AssumptionsConfig, AssumptionsManager, LiquidityScenario};
use crate::config::AlmConfig;
use crate::error::AlmError;
use crate::instruments::{validate_instruments, Instrument, InstrumentKind};
use crate::interest_rate::gaps::analyze_rate_gaps;
use crate::liquidity::gaps::gaps_from_ledger;
use crate::liquidity::projection::{project_cash_flows, ProjectionContext};
use crate::liquidity::survival_horizon::survival_from_ledger;
use crate::types::{with_metadata, ComputationOutput, Currency, Money};
use crate::AlmResult;

/// Metric value per currency.
pub type MetricValue = BTreeMap<Currency, Decimal>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorMetric {
    /// Survival horizon in days.
    #[default]
    SurvivalHorizon,
    /// One-year NII impact of the rate shock.
    NiiImpact,
    /// Projected inflows minus outflows.
    NetLiquidityGap,
}

impl FactorMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactorMetric::SurvivalHorizon => "survival_horizon",
            FactorMetric::NiiImpact => "nii_impact",
            FactorMetric::NetLiquidityGap => "net_liquidity_gap",
        }
    }
}

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorAnalysisInput {
    pub base_date: NaiveDate,
    pub comparison_date: NaiveDate,
    pub base_instruments: Vec<Instrument>,
    pub comparison_instruments: Vec<Instrument>,
    #[serde(default)]
    pub metric: FactorMetric,
    #[serde(default)]
    pub assumptions: AssumptionsConfig,
    #[serde(default)]
    pub liquid_assets_buffer: BTreeMap<Currency, Money>,
    #[serde(default)]
    pub rate_shocks_bps: BTreeMap<Currency, i32>,
    /// Keep only the N largest new-deal impacts.
    #[serde(default)]
    pub top_n: Option<usize>,
    #[serde(default)]
    pub config: AlmConfig,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDealImpact {
    pub instrument_id: String,
    pub kind: InstrumentKind,
    pub currency: Currency,
    pub balance: Money,
    pub impact: MetricValue,
    /// Sum of absolute per-currency impacts; the sort key.
    pub magnitude: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorAnalysisOutput {
    pub metric: FactorMetric,
    pub base_date: NaiveDate,
    pub comparison_date: NaiveDate,
    pub metric_base: MetricValue,
    pub metric_aged: MetricValue,
    pub metric_full: MetricValue,
    pub aging_effect: MetricValue,
    pub new_deals_effect: MetricValue,
    pub total_change: MetricValue,
    pub existing_count: usize,
    pub new_count: usize,
    pub matured_count: usize,
    pub new_instrument_ids: Vec<String>,
    pub new_deal_impacts: Vec<NewDealImpact>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn calculate_factor_analysis(
    input: &FactorAnalysisInput,
) -> AlmResult<ComputationOutput<FactorAnalysisOutput>> {
    let start = Instant::now();
    validate_input(input)?;
    let manager = AssumptionsManager::from_config(&input.assumptions)?;
    let measure = |instruments: &[Instrument], date: NaiveDate| measure_metric(input, &manager, instruments, date);

    let base_ids: BTreeSet<&str> = input.base_instruments.iter().map(|i| i.id.as_str()).collect();
    let comparison_ids: BTreeSet<&str> = input.comparison_instruments.iter().map(|i| i.id.as_str()).collect();

    let aged: Vec<Instrument> = input
        .base_instruments
        .iter()
        .filter(|i| comparison_ids.contains(i.id.as_str()))
        .cloned()
        .collect();
    let new_deals: Vec<&Instrument> = input
        .comparison_instruments
        .iter()
        .filter(|i| !base_ids.contains(i.id.as_str()))
        .collect();

    info!(
        metric = input.metric.as_str(),
        existing = aged.len(),
        new = new_deals.len(),
        matured = input.base_instruments.len() - aged.len(),
        "Running factor analysis"
    );

    let metric_base = measure(&input.base_instruments, input.base_date)?;
    let metric_aged = measure(&aged, input.comparison_date)?;
    let metric_full = measure(&input.comparison_instruments, input.comparison_date)?;

    let mut impacts = Vec::with_capacity(new_deals.len());
    for deal in &new_deals {
        let mut with_deal = aged.clone();
        with_deal.push((*deal).clone());
        let impact = delta(&measure(&with_deal, input.comparison_date)?, &metric_aged);
        let magnitude = impact.values().map(|v| v.abs()).sum();
        debug!(instrument = %deal.id, %magnitude, "New deal impact");
        impacts.push(NewDealImpact {
            instrument_id: deal.id.clone(),
            kind: deal.kind,
            currency: deal.currency.clone(),
            balance: deal.balance,
            impact,
            magnitude,
        });
    }
    impacts.sort_by(|a, b| b.magnitude.cmp(&a.magnitude).then_with(|| a.instrument_id.cmp(&b.instrument_id)));
    if let Some(n) = input.top_n {
        impacts.truncate(n);
    }

    let mut new_instrument_ids: Vec<String> = new_deals.iter().map(|d| d.id.clone()).collect();
    new_instrument_ids.sort();

    let output = FactorAnalysisOutput {
        metric: input.metric,
        base_date: input.base_date,
        comparison_date: input.comparison_date,
        aging_effect: delta(&metric_aged, &metric_base),
        new_deals_effect: delta(&metric_full, &metric_aged),
        total_change: delta(&metric_full, &metric_base),
        existing_count: aged.len(),
        new_count: new_deals.len(),
        matured_count: input.base_instruments.len() - aged.len(),
        new_instrument_ids,
        new_deal_impacts: impacts,
        metric_base,
        metric_aged,
        metric_full,
    };

    Ok(with_metadata(
        "Factor analysis: aging of existing deals vs new deals",
        &json!({
            "metric": input.metric.as_str(),
            "days_between": (input.comparison_date - input.base_date).num_days(),
            "top_n": input.top_n,
        }),
        Vec::new(),
        start.elapsed().as_micros() as u64,
        output,
    ))
}

/// `new - old` over the union of currencies; missing values count as zero.
pub fn delta(new: &MetricValue, old: &MetricValue) -> MetricValue {
    let currencies: BTreeSet<&Currency> = new.keys().chain(old.keys()).collect();
    currencies
        .into_iter()
        .map(|c| {
            let n = new.get(c).copied().unwrap_or(Decimal::ZERO);
            let o = old.get(c).copied().unwrap_or(Decimal::ZERO);
            (c.clone(), n - o)
        })
        .collect()
}

fn measure_metric(
    input: &FactorAnalysisInput,
    manager: &AssumptionsManager,
    instruments: &[Instrument],
    date: NaiveDate,
) -> AlmResult<MetricValue> {
    let config = &input.config;
    match input.metric {
        FactorMetric::NiiImpact => {
            let analysis = analyze_rate_gaps(instruments, manager, date, config, &input.rate_shocks_bps, &[])?;
            Ok(analysis
                .sensitivity
                .into_iter()
                .map(|(c, s)| (c, s.nii_impact_1y))
                .collect())
        }
        FactorMetric::SurvivalHorizon | FactorMetric::NetLiquidityGap => {
            let ctx = ProjectionContext {
                calculation_date: date,
                scenario: LiquidityScenario::Name,
                buckets: &config.liquidity_buckets,
                horizon_days: config.horizon_cap_days,
            };
            let ledgers = project_cash_flows(instruments, manager, &ctx)?.ledgers;
            Ok(ledgers
                .iter()
                .map(|(c, ledger)| {
                    let value = if input.metric == FactorMetric::SurvivalHorizon {
                        let buffer = input.liquid_assets_buffer.get(c).copied().unwrap_or(Decimal::ZERO);
                        Decimal::from(survival_from_ledger(ledger, buffer, &config.liquidity_buckets, date).horizon_days)
                    } else {
                        gaps_from_ledger(ledger, &config.liquidity_buckets).net_position
                    };
                    (c.clone(), value)
                })
                .collect())
        }
    }
}

fn validate_input(input: &FactorAnalysisInput) -> AlmResult<()> {
    input.config.validate()?;
    if input.comparison_date < input.base_date {
        return Err(AlmError::DateError(format!(
            "Comparison date {} is before base date {}",
            input.comparison_date, input.base_date
        )));
    }
    validate_instruments(&input.base_instruments)?;
    validate_instruments(&input.comparison_instruments)?;
    if input.base_instruments.is_empty() && input.comparison_instruments.is_empty() {
        return Err(AlmError::InsufficientData(
            "Factor analysis needs instruments on at least one date".into(),
        ));
    }
    if input.top_n == Some(0) {
        return Err(AlmError::invalid("top_n", "Must be at least 1 when set"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn base_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn comparison_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()
    }

    fn loan(id: &str, balance: Money, maturity_days: i64) -> Instrument {
        Instrument::new(id, InstrumentKind::Loan, Side::Asset, balance, Currency::RUB)
            .with_maturity(base_date() + Duration::days(maturity_days))
    }

    fn deposit(id: &str, balance: Money, maturity_days: i64) -> Instrument {
        Instrument::new(id, InstrumentKind::Deposit, Side::Liability, balance, Currency::RUB)
            .with_maturity(base_date() + Duration::days(maturity_days))
    }

    fn input(metric: FactorMetric) -> FactorAnalysisInput {
        FactorAnalysisInput {
            base_date: base_date(),
            comparison_date: comparison_date(),
            base_instruments: vec![
                loan("L1", dec!(1000), 100),
                deposit("D1", dec!(500), 50),
                deposit("D0", dec!(200), 10),
            ],
            comparison_instruments: vec![
                loan("L1", dec!(1000), 100),
                deposit("D1", dec!(500), 50),
                deposit("N1", dec!(300), 40),
                loan("N2", dec!(50), 40),
            ],
            metric,
            assumptions: AssumptionsConfig::default(),
            liquid_assets_buffer: BTreeMap::from([(Currency::RUB, dec!(700))]),
            rate_shocks_bps: BTreeMap::new(),
            top_n: None,
            config: AlmConfig::default(),
        }
    }

    #[test]
    fn test_counts_and_ids() {
        let out = calculate_factor_analysis(&input(FactorMetric::NetLiquidityGap)).unwrap().result;
        assert_eq!(out.existing_count, 2);
        assert_eq!(out.new_count, 2);
        assert_eq!(out.matured_count, 1);
        assert_eq!(out.new_instrument_ids, vec!["N1".to_string(), "N2".to_string()]);
    }

    #[test]
    fn test_effects_add_up() {
        let out = calculate_factor_analysis(&input(FactorMetric::NetLiquidityGap)).unwrap().result;
        let rub = Currency::RUB;
        // base: 1000 - 500 - 200; aged: 1000 - 500; full: 1000 - 500 - 300 + 50
        assert_eq!(out.metric_base[&rub], dec!(300));
        assert_eq!(out.metric_aged[&rub], dec!(500));
        assert_eq!(out.metric_full[&rub], dec!(250));
        assert_eq!(out.aging_effect[&rub], dec!(200));
        assert_eq!(out.new_deals_effect[&rub], dec!(-250));
        assert_eq!(out.total_change[&rub], out.aging_effect[&rub] + out.new_deals_effect[&rub]);
    }

    #[test]
    fn test_new_deal_impacts_sorted_and_truncated() {
        let mut inp = input(FactorMetric::NetLiquidityGap);
        inp.top_n = Some(1);
        let out = calculate_factor_analysis(&inp).unwrap().result;
        assert_eq!(out.new_deal_impacts.len(), 1);
        assert_eq!(out.new_deal_impacts[0].instrument_id, "N1");
        assert_eq!(out.new_deal_impacts[0].impact[&Currency::RUB], dec!(-300));
        assert_eq!(out.new_deal_impacts[0].magnitude, dec!(300));
    }

    #[test]
    fn test_survival_horizon_metric() {
        let out = calculate_factor_analysis(&input(FactorMetric::SurvivalHorizon)).unwrap().result;
        let rub = Currency::RUB;
        // 700 buffer covers D0 and D1 at t-1
        assert_eq!(out.metric_base[&rub], dec!(1095));
        // at t: N1 and N2 settle on day 10, D1 on day 20 takes the position to -50
        assert_eq!(out.metric_full[&rub], dec!(19));
        assert_eq!(out.new_deals_effect[&rub], dec!(-1076));
    }

    #[test]
    fn test_rejects_reversed_dates() {
        let mut inp = input(FactorMetric::NiiImpact);
        inp.comparison_date = base_date() - Duration::days(1);
        assert!(matches!(calculate_factor_analysis(&inp), Err(AlmError::DateError(_))));
    }

    #[test]
    fn test_delta_over_currency_union() {
        let a = BTreeMap::from([(Currency::RUB, dec!(5))]);
        let b = BTreeMap::from([(Currency::USD, dec!(2))]);
        let d = delta(&a, &b);
        assert_eq!(d[&Currency::RUB], dec!(5));
        assert_eq!(d[&Currency::USD], dec!(-2));
    }
}
