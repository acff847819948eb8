//! Risk contribution of a single instrument: dated cash flows for liquidity,
//! repricing slices for interest-rate gaps, and duration/DV01.

use chrono::{Duration, NaiveDate};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::instrument::{Instrument, InstrumentKind};
use crate::assumptions::{BehavioralParams, LiquidityScenario};
use crate::buckets::BucketSet;
use crate::error::AlmError;
use crate::types::{CashFlow, Currency, Money, Side};
use crate::AlmResult;

const DAYS_PER_YEAR: Decimal = dec!(365);
const PREPAYMENT_STEP_DAYS: i64 = 30;
/// Day on which unstable demand balances not covered by a runoff table leave.
const RUNOFF_REMAINDER_DAY: i64 = 30;
const ONE_BP: Decimal = dec!(0.0001);

/// Inputs shared by every instrument in a projection run.
#[derive(Debug, Clone, Copy)]
pub struct ContributionContext<'a> {
    pub calculation_date: NaiveDate,
    pub scenario: LiquidityScenario,
    pub liquidity_buckets: &'a BucketSet,
}

/// Amount that reprices on a date. Signed like cash flows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepricingSlice {
    pub date: NaiveDate,
    pub amount: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskContribution {
    pub instrument_id: String,
    pub currency: Currency,
    pub side: Side,
    /// Signed: inflows positive, outflows negative.
    pub cash_flows: Vec<CashFlow>,
    pub repricing: Vec<RepricingSlice>,
    /// Years to repricing, weighted by discounted repricing amounts.
    pub duration: Decimal,
    pub modified_duration: Decimal,
    /// Value change for a 1bp parallel rise. Signed from the bank's view.
    pub dv01: Money,
}

impl RiskContribution {
    pub fn total_inflows(&self) -> Money {
        self.cash_flows
            .iter()
            .filter(|cf| cf.amount > Decimal::ZERO)
            .map(|cf| cf.amount)
            .sum()
    }

    pub fn total_outflows(&self) -> Money {
        self.cash_flows
            .iter()
            .filter(|cf| cf.amount < Decimal::ZERO)
            .map(|cf| -cf.amount)
            .sum()
    }
}

/// Collects unsigned flows; the instrument's side is applied at the end.
struct FlowBuilder {
    calc: NaiveDate,
    flows: Vec<CashFlow>,
    repricing: Vec<RepricingSlice>,
}

impl FlowBuilder {
    fn at(&self, days: i64) -> NaiveDate {
        self.calc + Duration::days(days)
    }

    fn flow_on(&mut self, date: NaiveDate, amount: Money, label: &str) {
        if !amount.is_zero() {
            self.flows.push(CashFlow::new(date, amount, label));
        }
    }

    fn flow(&mut self, days: i64, amount: Money, label: &str) {
        let date = self.at(days);
        self.flow_on(date, amount, label);
    }

    fn reprice_on(&mut self, date: NaiveDate, amount: Money) {
        if !amount.is_zero() {
            self.repricing.push(RepricingSlice { date, amount });
        }
    }

    fn reprice(&mut self, days: i64, amount: Money) {
        let date = self.at(days);
        self.reprice_on(date, amount);
    }
}

impl Instrument {
    /// Project this instrument's cash flows and repricing profile under the
    /// given behavioral parameters.
    pub fn risk_contribution(
        &self,
        ctx: &ContributionContext<'_>,
        params: &BehavioralParams,
    ) -> AlmResult<RiskContribution> {
        let calc = ctx.calculation_date;
        let mut b = FlowBuilder {
            calc,
            flows: Vec::new(),
            repricing: Vec::new(),
        };

        // Overrides act on the full balance before any contractual logic.
        let mut balance = self.balance;
        if let Some(days) = params.maturity_override_days {
            b.flow(days, balance, "maturity_override");
            b.reprice(days, balance);
            balance = Decimal::ZERO;
        } else if let Some(share) = params.runoff_override {
            let amount = balance * share.min(Decimal::ONE);
            b.flow(1, amount, "runoff_override");
            b.reprice(1, amount);
            balance -= amount;
        }

        // Drawdowns are outflows whichever side the line sits on.
        let drawdown = match (self.kind, params.drawdown_rate) {
            (InstrumentKind::CreditLine, Some(rate)) => self.undrawn_amount * rate,
            _ => Decimal::ZERO,
        };

        if balance > Decimal::ZERO {
            if !self.repayment_schedule.is_empty() {
                self.scheduled_flows(&mut b, balance);
            } else if self.is_non_maturity() {
                self.behavioral_flows(&mut b, ctx, params, balance)?;
            } else if let Some(maturity) = self.maturity_date {
                if maturity < calc {
                    warn!(instrument = %self.id, %maturity, "Instrument matured before calculation date");
                } else {
                    self.term_flows(&mut b, params, balance, maturity);
                }
            }
            self.repricing_profile(&mut b, params, balance);
        }

        let sign = self.side.sign();
        let mut cash_flows: Vec<CashFlow> = b
            .flows
            .into_iter()
            .map(|cf| CashFlow {
                amount: cf.amount * sign,
                ..cf
            })
            .collect();
        if !drawdown.is_zero() {
            cash_flows.insert(0, CashFlow::new(calc + Duration::days(1), -drawdown, "drawdown"));
        }
        let repricing: Vec<RepricingSlice> = b
            .repricing
            .into_iter()
            .map(|s| RepricingSlice {
                amount: s.amount * sign,
                ..s
            })
            .collect();

        let duration = repricing_duration(calc, &repricing, self.interest_rate);
        let modified_duration = if self.interest_rate > dec!(-1) {
            duration / (Decimal::ONE + self.interest_rate)
        } else {
            duration
        };
        let dv01 = -sign * self.balance * modified_duration * ONE_BP;

        debug!(
            instrument = %self.id,
            flows = cash_flows.len(),
            slices = repricing.len(),
            "Computed risk contribution"
        );

        Ok(RiskContribution {
            instrument_id: self.id.clone(),
            currency: self.currency.clone(),
            side: self.side,
            cash_flows,
            repricing,
            duration,
            modified_duration,
            dv01,
        })
    }

    fn scheduled_flows(&self, b: &mut FlowBuilder, balance: Money) {
        let scale = if self.balance.is_zero() {
            Decimal::ONE
        } else {
            balance / self.balance
        };
        for payment in &self.repayment_schedule {
            if payment.date >= b.calc {
                b.flow_on(payment.date, payment.amount * scale, "scheduled");
            }
        }
    }

    fn term_flows(&self, b: &mut FlowBuilder, params: &BehavioralParams, balance: Money, maturity: NaiveDate) {
        let days = (maturity - b.calc).num_days();
        let mut principal = balance;

        if self.side == Side::Liability
            && (self.early_withdrawal_allowed || self.kind == InstrumentKind::Deposit)
        {
            if let (Some(prob), Some(portion)) =
                (params.early_withdrawal_probability, params.early_withdrawal_portion)
            {
                if days > 1 {
                    let early = principal * prob * portion;
                    b.flow(1, early, "early_withdrawal");
                    principal -= early;
                }
            }
        }

        if self.kind == InstrumentKind::Loan && self.side == Side::Asset {
            if let Some(cpr) = params.prepayment_rate.filter(|c| *c > Decimal::ZERO) {
                let smm = single_monthly_mortality(cpr);
                let mut step = PREPAYMENT_STEP_DAYS;
                while step < days {
                    let prepaid = principal * smm;
                    b.flow(step, prepaid, "prepayment");
                    principal -= prepaid;
                    step += PREPAYMENT_STEP_DAYS;
                }
            }
        }

        if self.kind == InstrumentKind::Bond {
            if let (Some(coupon), Some(freq)) = (self.coupon_rate, self.coupon_frequency_days) {
                let amount = balance * coupon * Decimal::from(freq) / DAYS_PER_YEAR;
                let mut date = maturity;
                while date > b.calc {
                    b.flow_on(date, amount, "coupon");
                    date -= Duration::days(freq);
                }
            }
        }

        b.flow_on(maturity, principal, "principal");
    }

    fn behavioral_flows(
        &self,
        b: &mut FlowBuilder,
        ctx: &ContributionContext<'_>,
        params: &BehavioralParams,
        balance: Money,
    ) -> AlmResult<()> {
        let (stable, avg_life) = self.stable_split(params, balance);
        let mut unstable = balance - stable;
        let mut budget = params.maximum_outflow.unwrap_or(unstable).min(unstable);

        let parked = match params.runoff_for(ctx.scenario) {
            Some(table) => {
                let buckets = ctx.liquidity_buckets;
                if let Some(unknown) = table.keys().find(|l| buckets.index_of(l).is_none()) {
                    return Err(AlmError::Configuration(format!(
                        "Runoff bucket '{}' for '{}' is not in the liquidity bucket set",
                        unknown, self.id
                    )));
                }
                for idx in 0..buckets.len() {
                    let Some(rate) = table.get(buckets.label(idx)) else {
                        continue;
                    };
                    let amount = (unstable * *rate).min(budget);
                    b.flow(buckets.midpoint_days(idx), amount, "runoff");
                    unstable -= amount;
                    budget -= amount;
                }
                let rest = unstable.min(budget);
                b.flow(RUNOFF_REMAINDER_DAY, rest, "runoff");
                unstable - rest
            }
            None => {
                let out = unstable.min(budget);
                b.flow(1, out, "runoff");
                unstable - out
            }
        };

        // Whatever the outflow cap held back behaves like the stable part.
        b.flow(avg_life, stable + parked, "stable");
        Ok(())
    }

    /// Stable amount and the day it leaves, for non-maturity balances.
    fn stable_split(&self, params: &BehavioralParams, balance: Money) -> (Money, i64) {
        let is_ca = self.kind == InstrumentKind::CurrentAccount;
        let portion = params
            .stable_portion
            .unwrap_or(if is_ca { dec!(0.3) } else { Decimal::ZERO });
        let avg_life = params.avg_life_days.unwrap_or(if is_ca { 180 } else { 1095 });
        let mut stable = balance * portion;
        if let Some(floor) = params.minimum_balance {
            stable = stable.max(floor.min(balance));
        }
        (stable, avg_life)
    }

    fn repricing_profile(&self, b: &mut FlowBuilder, params: &BehavioralParams, balance: Money) {
        let adjust = params.repricing_adjustment_days.unwrap_or(0);
        if let Some(date) = self.repricing_date {
            let date = (date + Duration::days(adjust)).max(b.calc);
            b.reprice_on(date, balance);
            return;
        }
        if self.is_non_maturity() {
            let (stable, avg_life) = self.stable_split(params, balance);
            b.reprice(1, balance - stable);
            b.reprice(avg_life + adjust, stable);
            return;
        }
        if self.rate_type == super::RateType::Floating {
            b.reprice(1, balance);
            return;
        }
        if !self.repayment_schedule.is_empty() {
            let scheduled: Vec<(NaiveDate, Money)> = b
                .flows
                .iter()
                .filter(|cf| cf.label.as_deref() == Some("scheduled"))
                .map(|cf| (cf.date, cf.amount))
                .collect();
            for (date, amount) in scheduled {
                b.reprice_on(date, amount);
            }
            return;
        }
        if let Some(maturity) = self.maturity_date.filter(|m| *m >= b.calc) {
            let principal: Vec<(NaiveDate, Money)> = b
                .flows
                .iter()
                .filter(|cf| {
                    matches!(
                        cf.label.as_deref(),
                        Some("principal" | "prepayment" | "early_withdrawal")
                    )
                })
                .map(|cf| (cf.date, cf.amount))
                .collect();
            if principal.is_empty() {
                b.reprice_on(maturity, balance);
            }
            for (date, amount) in principal {
                b.reprice_on(date, amount);
            }
        }
    }
}

/// SMM = 1 - (1 - CPR)^(1/12)
pub fn single_monthly_mortality(cpr: Decimal) -> Decimal {
    if cpr >= Decimal::ONE {
        return Decimal::ONE;
    }
    Decimal::ONE - (Decimal::ONE - cpr).powd(Decimal::ONE / dec!(12))
}

fn repricing_duration(calc: NaiveDate, slices: &[RepricingSlice], rate: Decimal) -> Decimal {
    let mut weighted = Decimal::ZERO;
    let mut total = Decimal::ZERO;
    let base = Decimal::ONE + rate.max(Decimal::ZERO);
    for s in slices {
        let t = Decimal::from((s.date - calc).num_days().max(0)) / DAYS_PER_YEAR;
        let pv = s.amount.abs() / base.powd(t);
        weighted += t * pv;
        total += pv;
    }
    if total.is_zero() {
        Decimal::ZERO
    } else {
        weighted / total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::ScheduledPayment;
    use crate::types::Currency;

    fn calc() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn ctx(buckets: &BucketSet) -> ContributionContext<'_> {
        ContributionContext {
            calculation_date: calc(),
            scenario: LiquidityScenario::Name,
            liquidity_buckets: buckets,
        }
    }

    fn sum(rc: &RiskContribution) -> Money {
        rc.cash_flows.iter().map(|cf| cf.amount).sum()
    }

    #[test]
    fn test_term_loan_pays_at_maturity() {
        let buckets = BucketSet::liquidity_default();
        let loan = Instrument::new("L", InstrumentKind::Loan, Side::Asset, dec!(1000), Currency::RUB)
            .with_maturity(calc() + Duration::days(45));
        let rc = loan.risk_contribution(&ctx(&buckets), &BehavioralParams::default()).unwrap();
        assert_eq!(rc.cash_flows.len(), 1);
        assert_eq!(rc.cash_flows[0].amount, dec!(1000));
        assert_eq!(rc.repricing.len(), 1);
        assert!(rc.duration > Decimal::ZERO);
        assert!(rc.dv01 < Decimal::ZERO);
    }

    #[test]
    fn test_matured_instrument_has_no_flows() {
        let buckets = BucketSet::liquidity_default();
        let loan = Instrument::new("L", InstrumentKind::Loan, Side::Asset, dec!(1000), Currency::RUB)
            .with_maturity(calc() - Duration::days(1));
        let rc = loan.risk_contribution(&ctx(&buckets), &BehavioralParams::default()).unwrap();
        assert!(rc.cash_flows.is_empty());
        assert!(rc.repricing.is_empty());
    }

    #[test]
    fn test_demand_deposit_runoff_is_sequential() {
        let buckets = BucketSet::liquidity_default();
        let dep = Instrument::new("D", InstrumentKind::Deposit, Side::Liability, dec!(1000), Currency::RUB);
        let params = BehavioralParams {
            stable_portion: Some(dec!(0.5)),
            avg_life_days: Some(180),
            ..Default::default()
        }
        .with_runoff(LiquidityScenario::Name, &[("overnight", dec!(0.1)), ("2-7d", dec!(0.2))]);
        let rc = dep.risk_contribution(&ctx(&buckets), &params).unwrap();
        let amounts: Vec<Money> = rc.cash_flows.iter().map(|cf| cf.amount).collect();
        // unstable 500: 50 overnight, 90 in 2-7d, 360 remainder at day 30, stable 500
        assert_eq!(amounts, vec![dec!(-50), dec!(-90), dec!(-360), dec!(-500)]);
        assert_eq!(rc.cash_flows[1].date, calc() + Duration::days(4));
        assert_eq!(rc.cash_flows[3].date, calc() + Duration::days(180));
        assert_eq!(sum(&rc), dec!(-1000));
    }

    #[test]
    fn test_runoff_remainder_leaves_on_day_thirty() {
        let buckets = BucketSet::liquidity_default();
        let dep = Instrument::new("D", InstrumentKind::Deposit, Side::Liability, dec!(1000), Currency::RUB);
        let params = BehavioralParams {
            stable_portion: Some(dec!(0.5)),
            avg_life_days: Some(365),
            ..Default::default()
        }
        .with_runoff(LiquidityScenario::Name, &[("overnight", dec!(0.2)), ("30-90d", dec!(0.5))]);
        let rc = dep.risk_contribution(&ctx(&buckets), &params).unwrap();
        let flows: Vec<(i64, Money)> = rc
            .cash_flows
            .iter()
            .map(|cf| ((cf.date - calc()).num_days(), cf.amount))
            .collect();
        // unstable 500: 100 overnight, 200 at the 30-90d midpoint, 200 remainder on day 30
        assert_eq!(
            flows,
            vec![(1, dec!(-100)), (60, dec!(-200)), (30, dec!(-200)), (365, dec!(-500))]
        );
    }

    #[test]
    fn test_maximum_outflow_caps_runoff() {
        let buckets = BucketSet::liquidity_default();
        let dep = Instrument::new("D", InstrumentKind::Deposit, Side::Liability, dec!(1000), Currency::RUB);
        let params = BehavioralParams {
            maximum_outflow: Some(dec!(100)),
            avg_life_days: Some(365),
            ..Default::default()
        };
        let rc = dep.risk_contribution(&ctx(&buckets), &params).unwrap();
        assert_eq!(rc.cash_flows[0].amount, dec!(-100));
        assert_eq!(rc.cash_flows[1].amount, dec!(-900));
    }

    #[test]
    fn test_unknown_runoff_bucket_is_configuration_error() {
        let buckets = BucketSet::liquidity_default();
        let dep = Instrument::new("D", InstrumentKind::Deposit, Side::Liability, dec!(1000), Currency::RUB);
        let params = BehavioralParams::default().with_runoff(LiquidityScenario::Name, &[("8-30d", dec!(0.1))]);
        let err = dep.risk_contribution(&ctx(&buckets), &params).unwrap_err();
        assert!(matches!(err, AlmError::Configuration(_)));
    }

    #[test]
    fn test_overnight_override() {
        let buckets = BucketSet::liquidity_default();
        let dep = Instrument::new("D", InstrumentKind::Deposit, Side::Liability, dec!(700), Currency::RUB)
            .with_maturity(calc() + Duration::days(365));
        let params = BehavioralParams {
            maturity_override_days: Some(1),
            ..Default::default()
        };
        let rc = dep.risk_contribution(&ctx(&buckets), &params).unwrap();
        assert_eq!(rc.cash_flows.len(), 1);
        assert_eq!(rc.cash_flows[0].amount, dec!(-700));
        assert_eq!(rc.cash_flows[0].date, calc() + Duration::days(1));
    }

    #[test]
    fn test_early_withdrawal_split() {
        let buckets = BucketSet::liquidity_default();
        let dep = Instrument::new("D", InstrumentKind::Deposit, Side::Liability, dec!(1000), Currency::RUB)
            .with_maturity(calc() + Duration::days(90));
        let params = BehavioralParams {
            early_withdrawal_probability: Some(dec!(0.2)),
            early_withdrawal_portion: Some(dec!(0.5)),
            ..Default::default()
        };
        let rc = dep.risk_contribution(&ctx(&buckets), &params).unwrap();
        assert_eq!(rc.cash_flows[0].amount, dec!(-100));
        assert_eq!(rc.cash_flows[1].amount, dec!(-900));
    }

    #[test]
    fn test_prepayment_reduces_principal() {
        let buckets = BucketSet::liquidity_default();
        let loan = Instrument::new("L", InstrumentKind::Loan, Side::Asset, dec!(1000), Currency::RUB)
            .with_maturity(calc() + Duration::days(100));
        let params = BehavioralParams {
            prepayment_rate: Some(dec!(0.12)),
            ..Default::default()
        };
        let rc = loan.risk_contribution(&ctx(&buckets), &params).unwrap();
        // three monthly prepayments (days 30, 60, 90) plus principal
        assert_eq!(rc.cash_flows.len(), 4);
        assert!((sum(&rc) - dec!(1000)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_credit_line_drawdown_is_outflow() {
        let buckets = BucketSet::liquidity_default();
        let mut line = Instrument::new("CL", InstrumentKind::CreditLine, Side::Asset, Decimal::ZERO, Currency::RUB);
        line.undrawn_amount = dec!(1000);
        let params = BehavioralParams {
            drawdown_rate: Some(dec!(0.3)),
            ..Default::default()
        };
        let rc = line.risk_contribution(&ctx(&buckets), &params).unwrap();
        assert_eq!(rc.cash_flows.len(), 1);
        assert_eq!(rc.cash_flows[0].amount, dec!(-300));
    }

    #[test]
    fn test_liability_credit_line_drawdown_is_outflow() {
        let buckets = BucketSet::liquidity_default();
        let mut line =
            Instrument::new("CL", InstrumentKind::CreditLine, Side::Liability, Decimal::ZERO, Currency::RUB);
        line.undrawn_amount = dec!(1000);
        let params = BehavioralParams {
            drawdown_rate: Some(dec!(0.3)),
            ..Default::default()
        };
        let rc = line.risk_contribution(&ctx(&buckets), &params).unwrap();
        assert_eq!(rc.cash_flows.len(), 1);
        assert_eq!(rc.cash_flows[0].amount, dec!(-300));
        assert_eq!(rc.cash_flows[0].date, calc() + Duration::days(1));
        assert_eq!(rc.total_inflows(), Decimal::ZERO);
    }

    #[test]
    fn test_scheduled_payments_before_calc_date_ignored() {
        let buckets = BucketSet::liquidity_default();
        let mut loan = Instrument::new("L", InstrumentKind::Loan, Side::Asset, dec!(200), Currency::RUB);
        loan.repayment_schedule = vec![
            ScheduledPayment { date: calc() - Duration::days(10), amount: dec!(100) },
            ScheduledPayment { date: calc() + Duration::days(10), amount: dec!(100) },
        ];
        let rc = loan.risk_contribution(&ctx(&buckets), &BehavioralParams::default()).unwrap();
        assert_eq!(rc.cash_flows.len(), 1);
        assert_eq!(rc.repricing.len(), 1);
    }

    #[test]
    fn test_bond_coupons() {
        let buckets = BucketSet::liquidity_default();
        let mut bond = Instrument::new("B", InstrumentKind::Bond, Side::Asset, dec!(1000), Currency::USD)
            .with_maturity(calc() + Duration::days(365));
        bond.coupon_rate = Some(dec!(0.073));
        bond.coupon_frequency_days = Some(365);
        let rc = bond.risk_contribution(&ctx(&buckets), &BehavioralParams::default()).unwrap();
        assert_eq!(sum(&rc), dec!(1073));
        // coupons do not reprice
        assert_eq!(rc.repricing.len(), 1);
    }

    #[test]
    fn test_smm() {
        assert_eq!(single_monthly_mortality(Decimal::ZERO), Decimal::ZERO);
        let smm = single_monthly_mortality(dec!(0.12));
        assert!(smm > dec!(0.0105) && smm < dec!(0.0107));
    }
}
