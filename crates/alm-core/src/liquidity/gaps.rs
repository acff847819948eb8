//! Liquidity gap tables per currency and bucket, with coverage ratios and
//! alerting.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::projection::{project_cash_flows, BucketFlows, DailyLedger, ProjectionContext};
use crate::assumptions::{AssumptionsConfig, AssumptionsManager, LiquidityScenario};
use crate::buckets::BucketSet;
use crate::config::AlmConfig;
use crate::instruments::{validate_instruments, Instrument};
use crate::types::{with_metadata, ComputationOutput, Currency, Money};
use crate::AlmResult;

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityGapInput {
    pub calculation_date: NaiveDate,
    pub instruments: Vec<Instrument>,
    #[serde(default)]
    pub assumptions: AssumptionsConfig,
    #[serde(default)]
    pub scenario: LiquidityScenario,
    /// Restrict output to these currencies. Empty = every currency present.
    #[serde(default)]
    pub target_currencies: Vec<Currency>,
    #[serde(default)]
    pub config: AlmConfig,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityGapBucket {
    pub bucket: String,
    pub inflows: Money,
    pub outflows: Money,
    pub net_gap: Money,
    pub cumulative_gap: Money,
    /// inflows / outflows. `None` when there are inflows but no outflows
    /// (unbounded coverage).
    pub coverage_ratio: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyLiquidityGaps {
    pub currency: Currency,
    pub buckets: Vec<LiquidityGapBucket>,
    pub total_inflows: Money,
    pub total_outflows: Money,
    pub net_position: Money,
    pub min_cumulative_gap: Money,
    pub min_cumulative_gap_bucket: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityAlert {
    pub currency: Currency,
    pub severity: AlertSeverity,
    pub buckets: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub buckets_below_one: Vec<String>,
    pub min_coverage_ratio: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiquidityGapAnalysis {
    /// Currencies whose cumulative gap turns negative somewhere.
    pub critical_currencies: Vec<Currency>,
    pub low_coverage: BTreeMap<Currency, CoverageSummary>,
    pub alerts: Vec<LiquidityAlert>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityGapOutput {
    pub calculation_date: NaiveDate,
    pub scenario: LiquidityScenario,
    pub by_currency: BTreeMap<Currency, CurrencyLiquidityGaps>,
    pub analysis: LiquidityGapAnalysis,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn calculate_liquidity_gaps(
    input: &LiquidityGapInput,
) -> AlmResult<ComputationOutput<LiquidityGapOutput>> {
    let start = Instant::now();
    input.config.validate()?;
    validate_instruments(&input.instruments)?;
    let manager = AssumptionsManager::from_config(&input.assumptions)?;
    let buckets = &input.config.liquidity_buckets;

    info!(
        instruments = input.instruments.len(),
        scenario = input.scenario.as_str(),
        "Calculating liquidity gaps"
    );

    let ctx = ProjectionContext {
        calculation_date: input.calculation_date,
        scenario: input.scenario,
        buckets,
        horizon_days: input.config.horizon_cap_days,
    };
    let projection = project_cash_flows(&input.instruments, &manager, &ctx)?;

    let mut warnings = Vec::new();
    let mut by_currency = BTreeMap::new();
    for currency in &input.target_currencies {
        if !projection.ledgers.contains_key(currency) {
            warnings.push(format!("No cash flows found for target currency {currency}"));
            by_currency.insert(
                currency.clone(),
                gaps_from_ledger(&DailyLedger::new(currency.clone(), ctx.horizon_days), buckets),
            );
        }
    }
    for (currency, ledger) in &projection.ledgers {
        if input.target_currencies.is_empty() || input.target_currencies.contains(currency) {
            let spilled = ledger.unbucketed_flows(buckets);
            if spilled != BucketFlows::default() {
                warnings.push(format!(
                    "{currency}: inflows {} and outflows {} fall after the last bucket and are not in the gap table",
                    spilled.inflows, spilled.outflows
                ));
            }
            by_currency.insert(currency.clone(), gaps_from_ledger(ledger, buckets));
        }
    }

    let analysis = analyze_gaps(&by_currency, input.config.coverage_alert_threshold);
    for alert in &analysis.alerts {
        warn!(currency = %alert.currency, "{}", alert.message);
    }

    let output = LiquidityGapOutput {
        calculation_date: input.calculation_date,
        scenario: input.scenario,
        by_currency,
        analysis,
    };

    Ok(with_metadata(
        "Contractual and behavioral liquidity gaps by currency and bucket",
        &json!({
            "scenario": input.scenario.as_str(),
            "buckets": buckets.labels(),
            "horizon_cap_days": input.config.horizon_cap_days,
            "coverage_alert_threshold": input.config.coverage_alert_threshold.to_string(),
        }),
        warnings,
        start.elapsed().as_micros() as u64,
        output,
    ))
}

/// Gap table for one ledger.
pub fn gaps_from_ledger(ledger: &DailyLedger, buckets: &BucketSet) -> CurrencyLiquidityGaps {
    let flows = ledger.bucket_flows(buckets);
    let mut cumulative = Decimal::ZERO;
    let mut rows = Vec::with_capacity(flows.len());
    let mut min_gap: Option<(Money, usize)> = None;

    for (idx, f) in flows.iter().enumerate() {
        let net = f.inflows - f.outflows;
        cumulative += net;
        if min_gap.map_or(true, |(m, _)| cumulative < m) {
            min_gap = Some((cumulative, idx));
        }
        rows.push(LiquidityGapBucket {
            bucket: buckets.label(idx).to_string(),
            inflows: f.inflows,
            outflows: f.outflows,
            net_gap: net,
            cumulative_gap: cumulative,
            coverage_ratio: coverage_ratio(f.inflows, f.outflows),
        });
    }

    let total_inflows: Money = flows.iter().map(|f| f.inflows).sum();
    let total_outflows: Money = flows.iter().map(|f| f.outflows).sum();
    let (min_cumulative_gap, min_idx) = min_gap.unwrap_or((Decimal::ZERO, 0));

    CurrencyLiquidityGaps {
        currency: ledger.currency.clone(),
        buckets: rows,
        total_inflows,
        total_outflows,
        net_position: total_inflows - total_outflows,
        min_cumulative_gap,
        min_cumulative_gap_bucket: buckets.label(min_idx).to_string(),
    }
}

/// `None` stands for an unbounded ratio (inflows without outflows).
pub fn coverage_ratio(inflows: Money, outflows: Money) -> Option<Decimal> {
    if outflows > Decimal::ZERO {
        Some(inflows / outflows)
    } else if inflows > Decimal::ZERO {
        None
    } else {
        Some(Decimal::ONE)
    }
}

pub fn analyze_gaps(
    by_currency: &BTreeMap<Currency, CurrencyLiquidityGaps>,
    alert_threshold: Decimal,
) -> LiquidityGapAnalysis {
    let mut analysis = LiquidityGapAnalysis::default();

    for (currency, gaps) in by_currency {
        if gaps.min_cumulative_gap < Decimal::ZERO {
            analysis.critical_currencies.push(currency.clone());
            analysis.alerts.push(LiquidityAlert {
                currency: currency.clone(),
                severity: AlertSeverity::Warning,
                buckets: vec![gaps.min_cumulative_gap_bucket.clone()],
                message: format!(
                    "{currency}: negative cumulative gap {} in bucket {}",
                    gaps.min_cumulative_gap.round_dp(0),
                    gaps.min_cumulative_gap_bucket
                ),
            });
        }

        let low: Vec<(&str, Decimal)> = gaps
            .buckets
            .iter()
            .filter_map(|b| match b.coverage_ratio {
                Some(r) if r < Decimal::ONE => Some((b.bucket.as_str(), r)),
                _ => None,
            })
            .collect();
        let Some(min_ratio) = low.iter().map(|(_, r)| *r).min() else {
            continue;
        };
        let names: Vec<String> = low.iter().map(|(b, _)| b.to_string()).collect();
        if min_ratio < alert_threshold {
            analysis.alerts.push(LiquidityAlert {
                currency: currency.clone(),
                severity: AlertSeverity::Critical,
                buckets: names.clone(),
                message: format!(
                    "{currency}: critical coverage ratio {} in buckets {}",
                    min_ratio.round_dp(2),
                    names.join(", ")
                ),
            });
        }
        analysis.low_coverage.insert(
            currency.clone(),
            CoverageSummary {
                buckets_below_one: names,
                min_coverage_ratio: min_ratio,
            },
        );
    }
    analysis
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_coverage_ratio_edge_cases() {
        assert_eq!(coverage_ratio(dec!(50), dec!(100)), Some(dec!(0.5)));
        assert_eq!(coverage_ratio(dec!(50), Decimal::ZERO), None);
        assert_eq!(coverage_ratio(Decimal::ZERO, Decimal::ZERO), Some(Decimal::ONE));
        assert_eq!(coverage_ratio(Decimal::ZERO, dec!(10)), Some(Decimal::ZERO));
    }

    #[test]
    fn test_gaps_from_ledger_cumulates() {
        let buckets = BucketSet::liquidity_default();
        let mut ledger = DailyLedger::new(Currency::RUB, 1095);
        ledger.add(1, dec!(-100));
        ledger.add(5, dec!(30));
        ledger.add(20, dec!(200));
        let gaps = gaps_from_ledger(&ledger, &buckets);
        assert_eq!(gaps.buckets[0].cumulative_gap, dec!(-100));
        assert_eq!(gaps.buckets[1].cumulative_gap, dec!(-70));
        assert_eq!(gaps.buckets[3].cumulative_gap, dec!(130));
        assert_eq!(gaps.min_cumulative_gap, dec!(-100));
        assert_eq!(gaps.min_cumulative_gap_bucket, "overnight");
        assert_eq!(gaps.net_position, dec!(130));
        assert_eq!(gaps.buckets[0].coverage_ratio, Some(Decimal::ZERO));
        assert_eq!(gaps.buckets[1].coverage_ratio, None);
    }

    #[test]
    fn test_analysis_flags_negative_gap_and_low_coverage() {
        let buckets = BucketSet::liquidity_default();
        let mut ledger = DailyLedger::new(Currency::USD, 365);
        ledger.add(1, dec!(-100));
        ledger.add(1, dec!(50));
        let mut map = BTreeMap::new();
        map.insert(Currency::USD, gaps_from_ledger(&ledger, &buckets));
        let analysis = analyze_gaps(&map, dec!(0.8));
        assert_eq!(analysis.critical_currencies, vec![Currency::USD]);
        assert_eq!(analysis.alerts.len(), 2);
        assert_eq!(analysis.alerts[1].severity, AlertSeverity::Critical);
        assert_eq!(analysis.low_coverage[&Currency::USD].min_coverage_ratio, dec!(0.5));
    }
}
