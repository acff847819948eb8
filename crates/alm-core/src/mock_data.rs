//! Synthetic multi-currency balance sheet for demos and load tests.
//!
//! Balances are log-normal per counterparty segment, currencies follow a
//! RUB-heavy mix, and rates are a currency base rate plus a segment spread.
//! A fixed `seed` reproduces the same portfolio.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::json;
use statrs::distribution::LogNormal;
use tracing::info;

use crate::assumptions::{
    AssumptionRule, AssumptionRuleType, AssumptionsConfig, AttributeValue, BehavioralParams, Condition,
    ConditionOperator, CounterpartyAssumption, ElasticityOverlay, Operand,
};
use crate::error::AlmError;
use crate::instruments::{BookType, Instrument, InstrumentKind, RateType};
use crate::types::{with_metadata, ComputationOutput, Currency, Money, Rate, Side};
use crate::AlmResult;

const MAX_INSTRUMENTS: usize = 1_000_000;
const ANCHOR_CLIENT: &str = "Northwind Holdings";

// ---------------------------------------------------------------------------
// Input / output types
// ---------------------------------------------------------------------------

/// Instruments to generate per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioMix {
    pub loans: usize,
    pub deposits: usize,
    pub current_accounts: usize,
    pub bonds: usize,
    pub interbank: usize,
    pub credit_lines: usize,
}

impl Default for PortfolioMix {
    fn default() -> Self {
        PortfolioMix {
            loans: 40,
            deposits: 40,
            current_accounts: 15,
            bonds: 10,
            interbank: 10,
            credit_lines: 5,
        }
    }
}

impl PortfolioMix {
    pub fn total(&self) -> usize {
        self.loans + self.deposits + self.current_accounts + self.bonds + self.interbank + self.credit_lines
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockPortfolioInput {
    pub calculation_date: NaiveDate,
    /// Random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub mix: PortfolioMix,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockPortfolio {
    pub calculation_date: NaiveDate,
    pub instruments: Vec<Instrument>,
    pub assumptions: AssumptionsConfig,
    /// 10% of liabilities per currency.
    pub liquid_assets_buffer: BTreeMap<Currency, Money>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn generate_mock_portfolio(input: &MockPortfolioInput) -> AlmResult<ComputationOutput<MockPortfolio>> {
    let start = Instant::now();
    let total = input.mix.total();
    if total == 0 {
        return Err(AlmError::invalid("mix", "At least one instrument must be requested"));
    }
    if total > MAX_INSTRUMENTS {
        return Err(AlmError::invalid(
            "mix",
            format!("At most {MAX_INSTRUMENTS} instruments can be generated"),
        ));
    }

    let mut rng = match input.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let mut generator = Generator::new(&mut rng, input.calculation_date)?;
    let mut instruments = Vec::with_capacity(total);
    for i in 0..input.mix.loans {
        instruments.push(generator.loan(i));
    }
    for i in 0..input.mix.deposits {
        instruments.push(generator.deposit(i));
    }
    for i in 0..input.mix.current_accounts {
        instruments.push(generator.current_account(i));
    }
    for i in 0..input.mix.bonds {
        instruments.push(generator.bond(i));
    }
    for i in 0..input.mix.interbank {
        instruments.push(generator.interbank(i));
    }
    for i in 0..input.mix.credit_lines {
        instruments.push(generator.credit_line(i));
    }

    let mut liabilities: BTreeMap<Currency, Money> = BTreeMap::new();
    for inst in instruments.iter().filter(|i| i.side == Side::Liability) {
        *liabilities.entry(inst.currency.clone()).or_insert(Decimal::ZERO) += inst.balance;
    }
    let liquid_assets_buffer = liabilities
        .into_iter()
        .map(|(c, l)| (c, (l * dec!(0.10)).round_dp(2)))
        .collect();

    info!(instruments = instruments.len(), seed = ?input.seed, "Generated mock portfolio");

    let output = MockPortfolio {
        calculation_date: input.calculation_date,
        instruments,
        assumptions: sample_assumptions_config(),
        liquid_assets_buffer,
    };
    Ok(with_metadata(
        "Synthetic balance sheet: log-normal balances, RUB-heavy currency mix",
        &json!({
            "seed": input.seed,
            "mix": input.mix,
        }),
        Vec::new(),
        start.elapsed().as_micros() as u64,
        output,
    ))
}

/// Rules and counterparty overrides matching the generated portfolio.
pub fn sample_assumptions_config() -> AssumptionsConfig {
    let text = |s: &str| Condition::Equals(AttributeValue::text(s));
    let rules = vec![
        AssumptionRule::new("large_corporate_deposits", AssumptionRuleType::AmountThreshold, 60)
            .with_condition("kind", text("deposit"))
            .with_condition("counterparty_type", text("corporate"))
            .with_condition(
                "amount",
                Condition::Operators(BTreeMap::from([(
                    ConditionOperator::Gte,
                    Operand::One(AttributeValue::Number(dec!(100_000_000))),
                )])),
            )
            .with_assumptions(BehavioralParams {
                early_withdrawal_probability: Some(dec!(0.30)),
                early_withdrawal_portion: Some(dec!(0.50)),
                elasticity: Some(ElasticityOverlay {
                    enabled: true,
                    base_elasticity: Some(dec!(-1.2)),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        AssumptionRule::new("mortgage_prepayment", AssumptionRuleType::InstrumentSubclass, 50)
            .with_condition("instrument_subclass", text("mortgage"))
            .with_assumptions(BehavioralParams {
                prepayment_rate: Some(dec!(0.08)),
                ..Default::default()
            }),
        AssumptionRule::new("retail_loan_prepayment", AssumptionRuleType::Combined, 40)
            .with_condition("kind", text("loan"))
            .with_condition("counterparty_type", text("retail"))
            .with_assumptions(BehavioralParams {
                prepayment_rate: Some(dec!(0.12)),
                ..Default::default()
            }),
        AssumptionRule::new("committed_lines", AssumptionRuleType::InstrumentClass, 30)
            .with_condition("instrument_class", text("credit_line"))
            .with_assumptions(BehavioralParams {
                drawdown_rate: Some(dec!(0.10)),
                ..Default::default()
            }),
    ];
    let anchor = CounterpartyAssumption {
        counterparty_name: ANCHOR_CLIENT.into(),
        counterparty_type: Some("corporate".into()),
        full_outflow: true,
        notes: Some("Single large client; assume it leaves on day one".into()),
        ..Default::default()
    };
    AssumptionsConfig {
        rules,
        counterparty_assumptions: BTreeMap::from([(ANCHOR_CLIENT.to_string(), anchor)]),
        use_class_defaults: true,
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

struct Generator<'r> {
    rng: &'r mut StdRng,
    calc: NaiveDate,
    retail: LogNormal,
    sme: LogNormal,
    corporate: LogNormal,
    wholesale: LogNormal,
    anchor_assigned: bool,
}

fn lognormal(mu: f64, sigma: f64) -> AlmResult<LogNormal> {
    LogNormal::new(mu, sigma).map_err(|e| AlmError::invalid("distribution", format!("Invalid LogNormal parameters: {e}")))
}

fn base_rate(currency: &Currency) -> Rate {
    match currency {
        Currency::RUB => dec!(0.16),
        Currency::USD => dec!(0.05),
        Currency::EUR => dec!(0.035),
        Currency::CNY => dec!(0.03),
        _ => dec!(0.04),
    }
}

impl<'r> Generator<'r> {
    fn new(rng: &'r mut StdRng, calc: NaiveDate) -> AlmResult<Self> {
        Ok(Generator {
            rng,
            calc,
            retail: lognormal(12.5, 1.5)?,
            sme: lognormal(15.0, 1.8)?,
            corporate: lognormal(17.0, 1.5)?,
            wholesale: lognormal(17.0, 1.2)?,
            anchor_assigned: false,
        })
    }

    fn amount(&mut self, segment: &str) -> Money {
        let dist = match segment {
            "retail" => &self.retail,
            "sme" => &self.sme,
            "bank" => &self.wholesale,
            _ => &self.corporate,
        };
        let v: f64 = self.rng.sample(dist);
        Decimal::from_f64(v).map(|d| d.round_dp(2)).unwrap_or(Decimal::ONE)
    }

    fn pick<T: Copy>(&mut self, weighted: &[(T, f64)]) -> T {
        let r: f64 = self.rng.gen();
        let mut acc = 0.0;
        for (item, w) in weighted {
            acc += w;
            if r < acc {
                return *item;
            }
        }
        weighted[weighted.len() - 1].0
    }

    fn currency(&mut self) -> Currency {
        match self.pick(&[(0u8, 0.70), (1, 0.15), (2, 0.10), (3, 0.05)]) {
            0 => Currency::RUB,
            1 => Currency::USD,
            2 => Currency::EUR,
            _ => Currency::CNY,
        }
    }

    /// `base` plus a uniform spread given in percentage points.
    fn rate(&mut self, base: Rate, lo_pp: f64, hi_pp: f64) -> Rate {
        let spread = Decimal::from_f64(self.rng.gen_range(lo_pp..hi_pp)).unwrap_or_default() / dec!(100);
        (base + spread).max(Decimal::ZERO).round_dp(4)
    }

    fn days(&mut self, lo: i64, hi: i64) -> i64 {
        self.rng.gen_range(lo..hi)
    }

    fn loan(&mut self, i: usize) -> Instrument {
        let segment = self.pick(&[("retail", 0.5), ("corporate", 0.3), ("sme", 0.2)]);
        let currency = self.currency();
        let mortgage = segment == "retail" && self.rng.gen_bool(0.3);
        let maturity = match (segment, mortgage) {
            (_, true) => self.days(3650, 10950),
            ("retail", _) => self.days(180, 1825),
            ("corporate", _) => self.days(365, 3650),
            _ => self.days(180, 1825),
        };
        let spread = match segment {
            "retail" => (2.0, 8.0),
            "sme" => (1.0, 5.0),
            _ => (0.0, 2.0),
        };
        let base = base_rate(&currency);
        let mut loan = Instrument::new(
            &format!("LOAN_{i:06}"),
            InstrumentKind::Loan,
            Side::Asset,
            self.amount(segment),
            currency,
        )
        .with_maturity(self.calc + Duration::days(maturity))
        .with_counterparty(None, segment);
        loan.interest_rate = self.rate(base, spread.0, spread.1);
        if mortgage {
            loan.instrument_subclass = Some("mortgage".into());
        }
        if self.rng.gen_bool(0.3) {
            let reset = [90, 180, 365].choose(&mut *self.rng).copied().unwrap_or(90);
            loan.rate_type = RateType::Floating;
            loan.repricing_date = Some(self.calc + Duration::days(reset.min(maturity)));
        }
        loan
    }

    fn deposit(&mut self, i: usize) -> Instrument {
        let segment = self.pick(&[("retail", 0.6), ("corporate", 0.4)]);
        let currency = self.currency();
        let base = base_rate(&currency);
        let mut dep = Instrument::new(
            &format!("DEP_{i:06}"),
            InstrumentKind::Deposit,
            Side::Liability,
            self.amount(segment),
            currency,
        );
        let name = if segment == "corporate" && !self.anchor_assigned {
            self.anchor_assigned = true;
            Some(ANCHOR_CLIENT)
        } else {
            None
        };
        dep = dep.with_counterparty(name, segment);
        if self.rng.gen_bool(0.3) {
            dep.is_demand = true;
            dep.interest_rate = self.rate(Decimal::ZERO, 0.0, 1.0);
        } else {
            let term = if segment == "retail" {
                self.pick(&[(90, 0.3), (180, 0.3), (365, 0.25), (730, 0.1), (1095, 0.05)])
            } else {
                self.pick(&[(30, 0.2), (90, 0.4), (180, 0.3), (365, 0.1)])
            };
            let remaining = self.days(1, term + 1);
            dep.maturity_date = Some(self.calc + Duration::days(remaining));
            dep.interest_rate = self.rate(base, -4.0, -1.0);
            dep.early_withdrawal_allowed = segment == "retail";
        }
        dep
    }

    fn current_account(&mut self, i: usize) -> Instrument {
        let segment = self.pick(&[("retail", 0.5), ("corporate", 0.5)]);
        let currency = self.currency();
        let amount = self.amount(segment);
        Instrument::new(
            &format!("CA_{i:06}"),
            InstrumentKind::CurrentAccount,
            Side::Liability,
            amount,
            currency,
        )
        .with_counterparty(None, segment)
        .demand()
    }

    fn bond(&mut self, i: usize) -> Instrument {
        let issuer = self.pick(&[("government", 0.6), ("corporate", 0.4)]);
        let currency = self.pick(&[(0u8, 0.8), (1, 0.2)]);
        let currency = if currency == 0 { Currency::RUB } else { Currency::USD };
        let base = base_rate(&currency);
        let amount = self.amount("corporate");
        let maturity = self.days(365, 3650);
        let mut bond = Instrument::new(&format!("BOND_{i:06}"), InstrumentKind::Bond, Side::Asset, amount, currency)
            .with_maturity(self.calc + Duration::days(maturity))
            .with_counterparty(None, issuer);
        bond.interest_rate = self.rate(base, -1.0, 1.5);
        bond.coupon_rate = Some(bond.interest_rate);
        bond.coupon_frequency_days = Some(182);
        if self.rng.gen_bool(0.4) {
            bond.book = BookType::Trading;
        }
        bond
    }

    fn interbank(&mut self, i: usize) -> Instrument {
        let side = if self.rng.gen_bool(0.5) { Side::Asset } else { Side::Liability };
        let currency = match self.pick(&[(0u8, 0.7), (1, 0.2), (2, 0.1)]) {
            0 => Currency::RUB,
            1 => Currency::USD,
            _ => Currency::EUR,
        };
        let base = base_rate(&currency);
        let term = self.pick(&[(1, 0.15), (7, 0.20), (14, 0.15), (30, 0.20), (90, 0.15), (180, 0.10), (365, 0.05)]);
        let amount = self.amount("bank");
        let mut ib = Instrument::new(&format!("IBL_{i:06}"), InstrumentKind::Interbank, side, amount, currency)
            .with_maturity(self.calc + Duration::days(term))
            .with_counterparty(None, "bank");
        ib.interest_rate = self.rate(base, -0.5, 1.5);
        ib
    }

    fn credit_line(&mut self, i: usize) -> Instrument {
        let drawn = self.amount("sme");
        let undrawn = self.amount("corporate");
        let maturity = self.days(365, 1095);
        let mut line = Instrument::new(
            &format!("CL_{i:06}"),
            InstrumentKind::CreditLine,
            Side::Asset,
            drawn,
            Currency::RUB,
        )
        .with_maturity(self.calc + Duration::days(maturity))
        .with_counterparty(None, "corporate");
        line.undrawn_amount = undrawn;
        line.interest_rate = self.rate(base_rate(&Currency::RUB), 1.0, 3.0);
        line
    }
}
