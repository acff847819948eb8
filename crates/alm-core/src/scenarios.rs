//! Stress scenarios over the whole balance sheet.
//!
//! A scenario shocks a copy of the portfolio (rates, deposit balances,
//! credit-line utilisation), projects it through the assumptions engine and
//! aggregates liquidity, interest-rate and FX metrics. Presets cover the
//! usual baseline / rate shock / deposit run / combined set.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::assumptions::{AssumptionsConfig, AssumptionsManager, LiquidityScenario};
use crate::config::{AlmConfig, StressSeverity};
use crate::error::AlmError;
use crate::instruments::{validate_instruments, Instrument, InstrumentKind, RiskContribution};
use crate::interest_rate::gaps::{gap_sensitivity, repricing_gaps, RateSensitivity};
use crate::liquidity::gaps::{gaps_from_ledger, CurrencyLiquidityGaps};
use crate::liquidity::projection::{build_ledgers, project_contributions, ProjectionContext};
use crate::liquidity::survival_horizon::{overall_horizon, survival_from_ledger};
use crate::types::{with_metadata, CashFlow, ComputationOutput, Currency, Money, Side};
use crate::AlmResult;

const BPS_PER_UNIT: Decimal = dec!(10000);
const PERCENT: Decimal = dec!(100);

// ---------------------------------------------------------------------------
// Scenario definition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioParameters {
    pub name: String,
    /// Added to instrument rates, per currency.
    #[serde(default)]
    pub ir_shocks_bps: BTreeMap<Currency, i32>,
    /// Percentage move of each currency against the reporting currency.
    #[serde(default)]
    pub fx_shock_pct: BTreeMap<Currency, Decimal>,
    /// Immediate loss of deposit balances, in percent.
    #[serde(default)]
    pub deposit_runoff_pct: Decimal,
    /// Share of undrawn committed lines drawn on day one, in percent.
    #[serde(default)]
    pub credit_line_drawdown_pct: Decimal,
    #[serde(default)]
    pub liquidity_scenario: LiquidityScenario,
    #[serde(default)]
    pub stress: StressSeverity,
}

impl ScenarioParameters {
    pub fn baseline() -> Self {
        ScenarioParameters {
            name: "Baseline".into(),
            ir_shocks_bps: BTreeMap::new(),
            fx_shock_pct: BTreeMap::new(),
            deposit_runoff_pct: Decimal::ZERO,
            credit_line_drawdown_pct: Decimal::ZERO,
            liquidity_scenario: LiquidityScenario::Name,
            stress: StressSeverity::Base,
        }
    }

    /// Full shock on RUB, half on USD and EUR.
    pub fn interest_rate_shock(shock_bps: i32) -> Self {
        ScenarioParameters {
            name: format!("IR Shock {shock_bps:+}bp"),
            ir_shocks_bps: BTreeMap::from([
                (Currency::RUB, shock_bps),
                (Currency::USD, shock_bps / 2),
                (Currency::EUR, shock_bps / 2),
            ]),
            ..Self::baseline()
        }
    }

    pub fn deposit_run(runoff_pct: Decimal) -> Self {
        ScenarioParameters {
            name: format!("Deposit Run {runoff_pct}%"),
            deposit_runoff_pct: runoff_pct,
            liquidity_scenario: LiquidityScenario::Name,
            ..Self::baseline()
        }
    }

    pub fn combined_stress() -> Self {
        ScenarioParameters {
            name: "Combined Stress".into(),
            ir_shocks_bps: BTreeMap::from([(Currency::RUB, 300), (Currency::USD, 150), (Currency::EUR, 150)]),
            fx_shock_pct: BTreeMap::from([
                (Currency::USD, dec!(30)),
                (Currency::EUR, dec!(25)),
                (Currency::CNY, dec!(35)),
            ]),
            deposit_runoff_pct: dec!(30),
            credit_line_drawdown_pct: dec!(50),
            liquidity_scenario: LiquidityScenario::Combo,
            stress: StressSeverity::Severe,
        }
    }

    /// Baseline, +200bp, 20% deposit run and combined stress.
    pub fn standard_set() -> Vec<Self> {
        vec![
            Self::baseline(),
            Self::interest_rate_shock(200),
            Self::deposit_run(dec!(20)),
            Self::combined_stress(),
        ]
    }

    pub fn validate(&self) -> AlmResult<()> {
        for (field, pct) in [
            ("deposit_runoff_pct", self.deposit_runoff_pct),
            ("credit_line_drawdown_pct", self.credit_line_drawdown_pct),
        ] {
            if pct < Decimal::ZERO || pct > PERCENT {
                return Err(AlmError::invalid(
                    format!("scenario.{}.{field}", self.name),
                    "Percentage must be between 0 and 100",
                ));
            }
        }
        if self.fx_shock_pct.values().any(|p| *p <= -PERCENT) {
            return Err(AlmError::invalid(
                format!("scenario.{}.fx_shock_pct", self.name),
                "FX shock must be above -100%",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Input / output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioInput {
    pub calculation_date: NaiveDate,
    pub instruments: Vec<Instrument>,
    #[serde(default)]
    pub assumptions: AssumptionsConfig,
    pub scenario: ScenarioParameters,
    /// Missing currencies survive on flows alone.
    #[serde(default)]
    pub liquid_assets_buffer: BTreeMap<Currency, Money>,
    #[serde(default)]
    pub config: AlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareScenariosInput {
    pub calculation_date: NaiveDate,
    pub instruments: Vec<Instrument>,
    #[serde(default)]
    pub assumptions: AssumptionsConfig,
    /// Empty runs the standard set.
    #[serde(default)]
    pub scenarios: Vec<ScenarioParameters>,
    #[serde(default)]
    pub liquid_assets_buffer: BTreeMap<Currency, Money>,
    #[serde(default)]
    pub config: AlmConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxPosition {
    pub currency: Currency,
    /// Assets minus liabilities.
    pub net_position: Money,
    pub shock_pct: Decimal,
    pub shocked_position: Money,
    pub revaluation: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario: ScenarioParameters,
    pub calculation_date: NaiveDate,
    pub liquidity_gaps: BTreeMap<Currency, CurrencyLiquidityGaps>,
    pub survival_horizon_days: BTreeMap<Currency, i64>,
    pub min_survival_horizon_days: i64,
    pub repricing_gap_by_currency: BTreeMap<Currency, Money>,
    pub repricing_gap_total: Money,
    pub rate_sensitivity: BTreeMap<Currency, RateSensitivity>,
    /// D_A - (L / A) × D_L, amount-weighted.
    pub duration_gap: Decimal,
    pub dv01_total: Money,
    pub fx_positions: BTreeMap<Currency, FxPosition>,
    pub fx_exposure_total: Money,
    pub total_assets: Money,
    pub total_liabilities: Money,
    pub net_position: Money,
}

/// One row per scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub name: String,
    pub min_survival_horizon_days: i64,
    pub survival_horizon_days: BTreeMap<Currency, i64>,
    pub repricing_gap_total: Money,
    pub nii_impact_total: Money,
    pub eve_impact_total: Money,
    pub duration_gap: Decimal,
    pub dv01_total: Money,
    pub fx_exposure_total: Money,
    pub total_assets: Money,
    pub total_liabilities: Money,
    pub net_position: Money,
}

impl From<&ScenarioResult> for ScenarioSummary {
    fn from(r: &ScenarioResult) -> Self {
        ScenarioSummary {
            name: r.scenario.name.clone(),
            min_survival_horizon_days: r.min_survival_horizon_days,
            survival_horizon_days: r.survival_horizon_days.clone(),
            repricing_gap_total: r.repricing_gap_total,
            nii_impact_total: r.rate_sensitivity.values().map(|s| s.nii_impact_1y).sum(),
            eve_impact_total: r.rate_sensitivity.values().map(|s| s.eve_impact).sum(),
            duration_gap: r.duration_gap,
            dv01_total: r.dv01_total,
            fx_exposure_total: r.fx_exposure_total,
            total_assets: r.total_assets,
            total_liabilities: r.total_liabilities,
            net_position: r.net_position,
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn calculate_scenario(input: &ScenarioInput) -> AlmResult<ComputationOutput<ScenarioResult>> {
    let start = Instant::now();
    input.config.validate()?;
    validate_instruments(&input.instruments)?;
    let manager = AssumptionsManager::from_config(&input.assumptions)?;

    let result = run_scenario(
        &input.instruments,
        &manager,
        input.calculation_date,
        &input.config,
        &input.scenario,
        &input.liquid_assets_buffer,
    )?;

    let mut warnings = Vec::new();
    if result.min_survival_horizon_days < 30 {
        warnings.push(format!(
            "{}: survival horizon of {} days is below one month",
            result.scenario.name, result.min_survival_horizon_days
        ));
    }

    Ok(with_metadata(
        "Balance-sheet stress scenario: shocked positions, liquidity, repricing and FX aggregation",
        &json!({
            "scenario": input.scenario.name,
            "liquidity_scenario": input.scenario.liquidity_scenario.as_str(),
            "stress": input.scenario.stress,
            "horizon_cap_days": input.config.horizon_cap_days,
        }),
        warnings,
        start.elapsed().as_micros() as u64,
        result,
    ))
}

pub fn compare_scenarios(input: &CompareScenariosInput) -> AlmResult<ComputationOutput<Vec<ScenarioSummary>>> {
    let start = Instant::now();
    input.config.validate()?;
    validate_instruments(&input.instruments)?;
    let manager = AssumptionsManager::from_config(&input.assumptions)?;

    let scenarios = if input.scenarios.is_empty() {
        ScenarioParameters::standard_set()
    } else {
        input.scenarios.clone()
    };

    let mut rows = Vec::with_capacity(scenarios.len());
    for scenario in &scenarios {
        let result = run_scenario(
            &input.instruments,
            &manager,
            input.calculation_date,
            &input.config,
            scenario,
            &input.liquid_assets_buffer,
        )?;
        rows.push(ScenarioSummary::from(&result));
    }

    Ok(with_metadata(
        "Side-by-side comparison of balance-sheet stress scenarios",
        &json!({
            "scenarios": scenarios.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            "standard_set": input.scenarios.is_empty(),
        }),
        Vec::new(),
        start.elapsed().as_micros() as u64,
        rows,
    ))
}

/// Shocked copies of the instruments plus the day-one drawdown per
/// instrument id.
pub fn apply_scenario_stress(
    instruments: &[Instrument],
    scenario: &ScenarioParameters,
) -> (Vec<Instrument>, BTreeMap<String, Money>) {
    let runoff = Decimal::ONE - scenario.deposit_runoff_pct / PERCENT;
    let drawdown_share = scenario.credit_line_drawdown_pct / PERCENT;
    let mut drawdowns = BTreeMap::new();

    let stressed = instruments
        .iter()
        .map(|inst| {
            let mut s = inst.clone();
            if let Some(bps) = scenario.ir_shocks_bps.get(&s.currency) {
                s.interest_rate += Decimal::from(*bps) / BPS_PER_UNIT;
            }
            if s.kind == InstrumentKind::Deposit && s.side == Side::Liability {
                s.balance *= runoff;
            }
            if s.kind == InstrumentKind::CreditLine && s.side == Side::Asset && !drawdown_share.is_zero() {
                let drawn = s.undrawn_amount * drawdown_share;
                s.undrawn_amount -= drawn;
                s.balance += drawn;
                drawdowns.insert(s.id.clone(), drawn);
            }
            s
        })
        .collect();
    (stressed, drawdowns)
}

fn run_scenario(
    instruments: &[Instrument],
    manager: &AssumptionsManager,
    calculation_date: NaiveDate,
    config: &AlmConfig,
    scenario: &ScenarioParameters,
    buffers: &BTreeMap<Currency, Money>,
) -> AlmResult<ScenarioResult> {
    scenario.validate()?;
    info!(scenario = %scenario.name, instruments = instruments.len(), "Calculating scenario");

    let (stressed, drawdowns) = apply_scenario_stress(instruments, scenario);
    let ctx = ProjectionContext {
        calculation_date,
        scenario: scenario.liquidity_scenario,
        buckets: &config.liquidity_buckets,
        horizon_days: config.horizon_cap_days,
    };
    let mut contributions = project_contributions(&stressed, manager, &ctx)?;
    for rc in contributions.iter_mut() {
        if let Some(drawn) = drawdowns.get(&rc.instrument_id) {
            rc.cash_flows.push(CashFlow::new(
                calculation_date + Duration::days(1),
                -*drawn,
                "scenario_drawdown",
            ));
        }
    }

    // Liquidity
    let factors = config.stress_factors(scenario.stress);
    let mut liquidity_gaps = BTreeMap::new();
    let mut survival = BTreeMap::new();
    for (currency, ledger) in build_ledgers(&contributions, calculation_date, config.horizon_cap_days) {
        let stressed_ledger = ledger.stressed(factors.inflow_factor, factors.outflow_factor);
        let buffer = buffers.get(&currency).copied().unwrap_or(Decimal::ZERO);
        survival.insert(
            currency.clone(),
            survival_from_ledger(&stressed_ledger, buffer, &config.liquidity_buckets, calculation_date),
        );
        liquidity_gaps.insert(currency, gaps_from_ledger(&stressed_ledger, &config.liquidity_buckets));
    }
    let (min_survival_horizon_days, _) = overall_horizon(&survival, config.horizon_cap_days);
    let survival_horizon_days = survival.into_iter().map(|(c, s)| (c, s.horizon_days)).collect();

    // Interest rate
    let gaps = repricing_gaps(&contributions, calculation_date, &config.repricing_buckets);
    let repricing_gap_by_currency: BTreeMap<Currency, Money> =
        gaps.iter().map(|(c, g)| (c.clone(), g.total_gap)).collect();
    let rate_sensitivity = gaps
        .iter()
        .map(|(c, g)| {
            let shock = scenario.ir_shocks_bps.get(c).copied().unwrap_or(0);
            (
                c.clone(),
                gap_sensitivity(g, &config.repricing_buckets, shock, config.gap_ratio_limit),
            )
        })
        .collect();
    let dv01_total = contributions.iter().map(|rc| rc.dv01).sum();
    let duration_gap = duration_gap(&stressed, &contributions);

    // FX and totals
    let fx_positions = fx_positions(&stressed, &scenario.fx_shock_pct);
    let fx_exposure_total = fx_positions.values().map(|p| p.shocked_position.abs()).sum();
    let total_assets: Money = stressed
        .iter()
        .filter(|i| i.side == Side::Asset)
        .map(|i| i.balance)
        .sum();
    let total_liabilities: Money = stressed
        .iter()
        .filter(|i| i.side == Side::Liability)
        .map(|i| i.balance)
        .sum();

    info!(
        scenario = %scenario.name,
        %total_assets,
        %total_liabilities,
        min_horizon = min_survival_horizon_days,
        "Scenario aggregated"
    );

    Ok(ScenarioResult {
        scenario: scenario.clone(),
        calculation_date,
        liquidity_gaps,
        survival_horizon_days,
        min_survival_horizon_days,
        repricing_gap_total: repricing_gap_by_currency.values().copied().sum(),
        repricing_gap_by_currency,
        rate_sensitivity,
        duration_gap,
        dv01_total,
        fx_positions,
        fx_exposure_total,
        total_assets,
        total_liabilities,
        net_position: total_assets - total_liabilities,
    })
}

/// Amount-weighted duration gap. Contributions must be in instrument order.
pub fn duration_gap(instruments: &[Instrument], contributions: &[RiskContribution]) -> Decimal {
    let mut assets = (Decimal::ZERO, Decimal::ZERO);
    let mut liabilities = (Decimal::ZERO, Decimal::ZERO);
    for (inst, rc) in instruments.iter().zip(contributions) {
        let acc = match inst.side {
            Side::Asset => &mut assets,
            Side::Liability => &mut liabilities,
        };
        acc.0 += inst.balance;
        acc.1 += inst.balance * rc.duration;
    }
    if assets.0.is_zero() {
        return Decimal::ZERO;
    }
    let d_a = assets.1 / assets.0;
    let d_l = if liabilities.0.is_zero() {
        Decimal::ZERO
    } else {
        liabilities.1 / liabilities.0
    };
    d_a - liabilities.0 / assets.0 * d_l
}

pub fn fx_positions(
    instruments: &[Instrument],
    shocks_pct: &BTreeMap<Currency, Decimal>,
) -> BTreeMap<Currency, FxPosition> {
    let mut net: BTreeMap<Currency, Money> = BTreeMap::new();
    for inst in instruments {
        *net.entry(inst.currency.clone()).or_insert(Decimal::ZERO) += inst.side.sign() * inst.balance;
    }
    net.into_iter()
        .map(|(currency, position)| {
            let shock_pct = shocks_pct.get(&currency).copied().unwrap_or(Decimal::ZERO);
            let shocked = position * (Decimal::ONE + shock_pct / PERCENT);
            (
                currency.clone(),
                FxPosition {
                    currency,
                    net_position: position,
                    shock_pct,
                    shocked_position: shocked,
                    revaluation: shocked - position,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calc() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn portfolio() -> Vec<Instrument> {
        let mut line = Instrument::new("CL1", InstrumentKind::CreditLine, Side::Asset, dec!(0), Currency::RUB)
            .with_maturity(calc() + Duration::days(365));
        line.undrawn_amount = dec!(200);
        vec![
            Instrument::new("L1", InstrumentKind::Loan, Side::Asset, dec!(1000), Currency::RUB)
                .with_maturity(calc() + Duration::days(60))
                .with_rate(dec!(0.10)),
            Instrument::new("D1", InstrumentKind::Deposit, Side::Liability, dec!(800), Currency::RUB)
                .with_maturity(calc() + Duration::days(10))
                .with_rate(dec!(0.08)),
            Instrument::new("B1", InstrumentKind::Bond, Side::Asset, dec!(100), Currency::USD)
                .with_maturity(calc() + Duration::days(700))
                .with_rate(dec!(0.05)),
            line,
        ]
    }

    fn input(scenario: ScenarioParameters) -> ScenarioInput {
        ScenarioInput {
            calculation_date: calc(),
            instruments: portfolio(),
            assumptions: AssumptionsConfig::default(),
            scenario,
            liquid_assets_buffer: BTreeMap::new(),
            config: AlmConfig::default(),
        }
    }

    #[test]
    fn test_presets() {
        let ir = ScenarioParameters::interest_rate_shock(200);
        assert_eq!(ir.ir_shocks_bps[&Currency::USD], 100);
        assert_eq!(ir.name, "IR Shock +200bp");
        let combined = ScenarioParameters::combined_stress();
        assert_eq!(combined.fx_shock_pct[&Currency::CNY], dec!(35));
        assert_eq!(ScenarioParameters::standard_set().len(), 4);
    }

    #[test]
    fn test_stress_copies_instruments() {
        let portfolio = portfolio();
        let mut scenario = ScenarioParameters::deposit_run(dec!(20));
        scenario.credit_line_drawdown_pct = dec!(50);
        scenario.ir_shocks_bps.insert(Currency::RUB, 100);
        let (stressed, drawdowns) = apply_scenario_stress(&portfolio, &scenario);
        assert_eq!(stressed[1].balance, dec!(640));
        assert_eq!(stressed[0].interest_rate, dec!(0.11));
        assert_eq!(stressed[2].interest_rate, dec!(0.05));
        assert_eq!(stressed[3].balance, dec!(100));
        assert_eq!(stressed[3].undrawn_amount, dec!(100));
        assert_eq!(drawdowns["CL1"], dec!(100));
        // originals untouched
        assert_eq!(portfolio[1].balance, dec!(800));
    }

    #[test]
    fn test_baseline_aggregation() {
        let r = calculate_scenario(&input(ScenarioParameters::baseline())).unwrap().result;
        assert_eq!(r.total_assets, dec!(1100));
        assert_eq!(r.total_liabilities, dec!(800));
        assert_eq!(r.net_position, dec!(300));
        // deposit leaves on day 10, loan repays on day 60
        assert_eq!(r.survival_horizon_days[&Currency::RUB], 9);
        assert_eq!(r.survival_horizon_days[&Currency::USD], 1095);
        assert_eq!(r.min_survival_horizon_days, 9);
        assert_eq!(r.repricing_gap_by_currency[&Currency::RUB], dec!(200));
        assert_eq!(r.fx_positions[&Currency::USD].revaluation, Decimal::ZERO);
        assert!(r.duration_gap > Decimal::ZERO);
    }

    #[test]
    fn test_drawdown_and_runoff_shorten_horizon() {
        let mut scenario = ScenarioParameters::baseline();
        scenario.credit_line_drawdown_pct = dec!(50);
        let mut with_buffer = input(scenario);
        with_buffer.liquid_assets_buffer.insert(Currency::RUB, dec!(850));
        let r = calculate_scenario(&with_buffer).unwrap().result;
        // 850 - 100 drawn on day 1 - 800 on day 10
        assert_eq!(r.survival_horizon_days[&Currency::RUB], 9);

        let mut no_draw = with_buffer.clone();
        no_draw.scenario.credit_line_drawdown_pct = Decimal::ZERO;
        let r = calculate_scenario(&no_draw).unwrap().result;
        assert!(r.survival_horizon_days[&Currency::RUB] > 9);
    }

    #[test]
    fn test_fx_shock_revalues_open_position() {
        let mut scenario = ScenarioParameters::baseline();
        scenario.fx_shock_pct.insert(Currency::USD, dec!(30));
        let r = calculate_scenario(&input(scenario)).unwrap().result;
        let usd = &r.fx_positions[&Currency::USD];
        assert_eq!(usd.net_position, dec!(100));
        assert_eq!(usd.shocked_position, dec!(130));
        assert_eq!(usd.revaluation, dec!(30));
    }

    #[test]
    fn test_invalid_percentage_rejected() {
        let mut scenario = ScenarioParameters::baseline();
        scenario.deposit_runoff_pct = dec!(120);
        assert!(calculate_scenario(&input(scenario)).is_err());
    }

    #[test]
    fn test_compare_defaults_to_standard_set() {
        let cmp = CompareScenariosInput {
            calculation_date: calc(),
            instruments: portfolio(),
            assumptions: AssumptionsConfig::default(),
            scenarios: vec![],
            liquid_assets_buffer: BTreeMap::new(),
            config: AlmConfig::default(),
        };
        let rows = compare_scenarios(&cmp).unwrap().result;
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].name, "Baseline");
        assert!(rows[1].nii_impact_total != Decimal::ZERO);
        assert!(rows[2].total_liabilities < rows[0].total_liabilities);
    }
}
