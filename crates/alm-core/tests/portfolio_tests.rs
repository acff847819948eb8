#![cfg(all(feature = "scenarios", feature = "factor_analysis", feature = "mock_data"))]

use alm_core::assumptions::{resolve_assumptions, ResolveAssumptionsInput};
use alm_core::buckets::BucketSet;
use alm_core::factor_analysis::{calculate_factor_analysis, FactorAnalysisInput, FactorMetric};
use alm_core::mock_data::{generate_mock_portfolio, MockPortfolio, MockPortfolioInput, PortfolioMix};
use alm_core::scenarios::{compare_scenarios, CompareScenariosInput};
use alm_core::types::Side;
use chrono::NaiveDate;
use rust_decimal::Decimal;

// ===========================================================================
// Fixtures
// ===========================================================================

fn calc() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn portfolio(seed: u64) -> MockPortfolio {
    generate_mock_portfolio(&MockPortfolioInput {
        calculation_date: calc(),
        seed: Some(seed),
        mix: PortfolioMix::default(),
    })
    .unwrap()
    .result
}

// ===========================================================================
// Generated portfolio through the engines
// ===========================================================================

#[test]
fn test_generated_rule_set_resolves() {
    let p = portfolio(7);
    let out = resolve_assumptions(&ResolveAssumptionsInput {
        calculation_date: p.calculation_date,
        instruments: p.instruments.clone(),
        assumptions: p.assumptions.clone(),
        buckets: BucketSet::liquidity_default(),
    })
    .unwrap()
    .result;
    assert_eq!(out.assignments.len(), p.instruments.len());
    let assigned: usize = out.hits.values().sum();
    assert_eq!(assigned + out.unassigned, p.instruments.len());
}

#[test]
fn test_standard_scenarios_on_generated_portfolio() {
    let p = portfolio(11);
    let liabilities: Decimal = p
        .instruments
        .iter()
        .filter(|i| i.side == Side::Liability)
        .map(|i| i.balance)
        .sum();
    let out = compare_scenarios(&CompareScenariosInput {
        calculation_date: p.calculation_date,
        instruments: p.instruments,
        assumptions: p.assumptions,
        scenarios: vec![],
        liquid_assets_buffer: p.liquid_assets_buffer,
        config: Default::default(),
    })
    .unwrap()
    .result;

    let names: Vec<&str> = out.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Baseline", "IR Shock +200bp", "Deposit Run 20%", "Combined Stress"]);
    assert_eq!(out[0].total_liabilities, liabilities);
    // A deposit run only removes liabilities
    assert!(out[2].total_liabilities < out[0].total_liabilities);
    assert_eq!(out[2].total_assets, out[0].total_assets);
    assert!(out[0].fx_exposure_total >= Decimal::ZERO);
}

#[test]
fn test_factor_analysis_between_generated_portfolios() {
    let base = portfolio(1);
    let mut comparison = base.instruments.clone();
    // Drop the first five positions and add a different generated book
    comparison.drain(..5);
    let extra = portfolio(2);
    comparison.extend(
        extra
            .instruments
            .into_iter()
            .take(3)
            .map(|mut i| {
                i.id = format!("NEW_{}", i.id);
                i
            }),
    );

    let out = calculate_factor_analysis(&FactorAnalysisInput {
        base_date: calc(),
        comparison_date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
        base_instruments: base.instruments.clone(),
        comparison_instruments: comparison,
        metric: FactorMetric::NetLiquidityGap,
        assumptions: base.assumptions.clone(),
        liquid_assets_buffer: base.liquid_assets_buffer.clone(),
        rate_shocks_bps: Default::default(),
        top_n: Some(2),
        config: Default::default(),
    })
    .unwrap()
    .result;

    assert_eq!(out.matured_count, 5);
    assert_eq!(out.new_count, 3);
    assert_eq!(out.existing_count, base.instruments.len() - 5);
    assert!(out.new_deal_impacts.len() <= 2);
    for (currency, total) in &out.total_change {
        let aging = out.aging_effect.get(currency).copied().unwrap_or_default();
        let new_deals = out.new_deals_effect.get(currency).copied().unwrap_or_default();
        assert_eq!(*total, aging + new_deals);
    }
}
