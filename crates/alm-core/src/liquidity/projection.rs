//! Daily cash-flow projection per currency.
//!
//! Every instrument is resolved against the assumptions engine, projected to
//! dated flows, and accumulated into a day-indexed ledger (day 1 = the day
//! after the calculation date). Flows dated on or before the calculation
//! date count on day 1; flows past the horizon are kept as a single
//! beyond-horizon total.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::assumptions::{AssumptionsManager, LiquidityScenario};
use crate::buckets::BucketSet;
use crate::error::AlmError;
use crate::instruments::{ContributionContext, Instrument, RiskContribution};
use crate::types::{Currency, Money};
use crate::AlmResult;

#[derive(Debug, Clone, Copy)]
pub struct ProjectionContext<'a> {
    pub calculation_date: NaiveDate,
    pub scenario: LiquidityScenario,
    pub buckets: &'a BucketSet,
    pub horizon_days: i64,
}

impl<'a> ProjectionContext<'a> {
    fn contribution_context(&self) -> ContributionContext<'a> {
        ContributionContext {
            calculation_date: self.calculation_date,
            scenario: self.scenario,
            liquidity_buckets: self.buckets,
        }
    }
}

/// Gross inflows and outflows of one currency, one slot per day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLedger {
    pub currency: Currency,
    /// `inflows[d - 1]` holds day `d`.
    pub inflows: Vec<Money>,
    pub outflows: Vec<Money>,
    pub beyond_horizon_inflows: Money,
    pub beyond_horizon_outflows: Money,
}

/// Gross flows of one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BucketFlows {
    pub inflows: Money,
    pub outflows: Money,
}

impl DailyLedger {
    pub fn new(currency: Currency, horizon_days: i64) -> Self {
        let len = horizon_days.max(0) as usize;
        DailyLedger {
            currency,
            inflows: vec![Decimal::ZERO; len],
            outflows: vec![Decimal::ZERO; len],
            beyond_horizon_inflows: Decimal::ZERO,
            beyond_horizon_outflows: Decimal::ZERO,
        }
    }

    pub fn horizon_days(&self) -> i64 {
        self.inflows.len() as i64
    }

    /// Record a signed flow `day` days after the calculation date.
    pub fn add(&mut self, day: i64, amount: Money) {
        let day = day.max(1);
        if day > self.horizon_days() {
            if amount > Decimal::ZERO {
                self.beyond_horizon_inflows += amount;
            } else {
                self.beyond_horizon_outflows -= amount;
            }
            return;
        }
        let slot = (day - 1) as usize;
        if amount > Decimal::ZERO {
            self.inflows[slot] += amount;
        } else {
            self.outflows[slot] -= amount;
        }
    }

    pub fn total_inflows(&self) -> Money {
        self.inflows.iter().sum::<Money>() + self.beyond_horizon_inflows
    }

    pub fn total_outflows(&self) -> Money {
        self.outflows.iter().sum::<Money>() + self.beyond_horizon_outflows
    }

    /// Multiply every inflow and outflow by the given factors.
    pub fn stressed(&self, inflow_factor: Decimal, outflow_factor: Decimal) -> DailyLedger {
        DailyLedger {
            currency: self.currency.clone(),
            inflows: self.inflows.iter().map(|v| *v * inflow_factor).collect(),
            outflows: self.outflows.iter().map(|v| *v * outflow_factor).collect(),
            beyond_horizon_inflows: self.beyond_horizon_inflows * inflow_factor,
            beyond_horizon_outflows: self.beyond_horizon_outflows * outflow_factor,
        }
    }

    /// Aggregate days into buckets. Beyond-horizon flows go to an open final
    /// bucket; with no open bucket see [`DailyLedger::unbucketed_flows`].
    pub fn bucket_flows(&self, buckets: &BucketSet) -> Vec<BucketFlows> {
        let horizon = self.horizon_days();
        (0..buckets.len())
            .map(|idx| {
                let from = buckets.start_day(idx) + 1;
                let to = buckets.horizon_days(idx, horizon).min(horizon);
                let mut flows = BucketFlows::default();
                for day in from..=to {
                    let slot = (day - 1) as usize;
                    flows.inflows += self.inflows[slot];
                    flows.outflows += self.outflows[slot];
                }
                if buckets.buckets[idx].end_day.is_none() {
                    flows.inflows += self.beyond_horizon_inflows;
                    flows.outflows += self.beyond_horizon_outflows;
                }
                flows
            })
            .collect()
    }

    /// Flows falling after the last bucket of a ladder without an open-ended
    /// bucket. Always zero when the ladder ends with an open bucket.
    pub fn unbucketed_flows(&self, buckets: &BucketSet) -> BucketFlows {
        let mut flows = BucketFlows::default();
        let Some(last_end) = buckets.buckets.last().and_then(|b| b.end_day) else {
            return flows;
        };
        for day in (last_end + 1)..=self.horizon_days() {
            let slot = (day - 1) as usize;
            flows.inflows += self.inflows[slot];
            flows.outflows += self.outflows[slot];
        }
        flows.inflows += self.beyond_horizon_inflows;
        flows.outflows += self.beyond_horizon_outflows;
        flows
    }
}

/// Output of a projection run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashFlowProjection {
    pub ledgers: BTreeMap<Currency, DailyLedger>,
    pub contributions: Vec<RiskContribution>,
}

/// Resolve assumptions for and project every instrument.
pub fn project_contributions(
    instruments: &[Instrument],
    manager: &AssumptionsManager,
    ctx: &ProjectionContext<'_>,
) -> AlmResult<Vec<RiskContribution>> {
    let cctx = ctx.contribution_context();
    instruments
        .iter()
        .map(|inst| {
            let attrs = inst.attributes(ctx.calculation_date, ctx.buckets);
            let resolved = manager.resolve(&attrs, ctx.buckets);
            debug!(instrument = %inst.id, source = ?resolved.source, "Projecting instrument");
            inst.risk_contribution(&cctx, &resolved.params)
        })
        .collect()
}

/// Fold contributions into one ledger per currency.
pub fn build_ledgers(
    contributions: &[RiskContribution],
    calculation_date: NaiveDate,
    horizon_days: i64,
) -> BTreeMap<Currency, DailyLedger> {
    let mut ledgers: BTreeMap<Currency, DailyLedger> = BTreeMap::new();
    for rc in contributions {
        let ledger = ledgers
            .entry(rc.currency.clone())
            .or_insert_with(|| DailyLedger::new(rc.currency.clone(), horizon_days));
        for cf in &rc.cash_flows {
            ledger.add((cf.date - calculation_date).num_days(), cf.amount);
        }
    }
    ledgers
}

pub fn project_cash_flows(
    instruments: &[Instrument],
    manager: &AssumptionsManager,
    ctx: &ProjectionContext<'_>,
) -> AlmResult<CashFlowProjection> {
    if ctx.horizon_days <= 0 {
        return Err(AlmError::invalid("horizon_days", "Projection horizon must be positive"));
    }
    let contributions = project_contributions(instruments, manager, ctx)?;
    let ledgers = build_ledgers(&contributions, ctx.calculation_date, ctx.horizon_days);
    info!(
        instruments = instruments.len(),
        currencies = ledgers.len(),
        scenario = ctx.scenario.as_str(),
        "Projected cash flows"
    );
    Ok(CashFlowProjection {
        ledgers,
        contributions,
    })
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

    #[test]
    fn test_ledger_clamps_and_spills() {
        let mut ledger = DailyLedger::new(Currency::RUB, 10);
        ledger.add(0, dec!(5));
        ledger.add(-3, dec!(-2));
        ledger.add(11, dec!(7));
        assert_eq!(ledger.inflows[0], dec!(5));
        assert_eq!(ledger.outflows[0], dec!(2));
        assert_eq!(ledger.beyond_horizon_inflows, dec!(7));
        assert_eq!(ledger.total_inflows(), dec!(12));
    }

    #[test]
    fn test_bucket_flows_cover_every_day() {
        let buckets = BucketSet::liquidity_default();
        let mut ledger = DailyLedger::new(Currency::RUB, 1095);
        ledger.add(1, dec!(1));
        ledger.add(7, dec!(2));
        ledger.add(8, dec!(4));
        ledger.add(731, dec!(8));
        ledger.add(2000, dec!(16));
        let flows = ledger.bucket_flows(&buckets);
        assert_eq!(flows[0].inflows, dec!(1));
        assert_eq!(flows[1].inflows, dec!(2));
        assert_eq!(flows[2].inflows, dec!(4));
        assert_eq!(flows[8].inflows, dec!(24));
        let total: Money = flows.iter().map(|f| f.inflows).sum();
        assert_eq!(total, ledger.total_inflows());
    }

    #[test]
    fn test_unbucketed_flows_past_closed_ladder() {
        let closed = BucketSet::new(vec![
            crate::buckets::TimeBucket::closed("0-30d", 30),
            crate::buckets::TimeBucket::closed("30-90d", 90),
        ])
        .unwrap();
        let mut ledger = DailyLedger::new(Currency::RUB, 120);
        ledger.add(90, dec!(1));
        ledger.add(100, dec!(2));
        ledger.add(500, dec!(-4));
        let spilled = ledger.unbucketed_flows(&closed);
        assert_eq!(spilled.inflows, dec!(2));
        assert_eq!(spilled.outflows, dec!(4));
        assert_eq!(ledger.bucket_flows(&closed)[1].inflows, dec!(1));

        let open = ledger.unbucketed_flows(&BucketSet::liquidity_default());
        assert_eq!(open, BucketFlows::default());
    }

    #[test]
    fn test_project_groups_by_currency() {
        let buckets = BucketSet::liquidity_default();
        let ctx = ProjectionContext {
            calculation_date: calc(),
            scenario: LiquidityScenario::Name,
            buckets: &buckets,
            horizon_days: 365,
        };
        let instruments = vec![
            Instrument::new("L1", InstrumentKind::Loan, Side::Asset, dec!(100), Currency::RUB)
                .with_maturity(calc() + Duration::days(10)),
            Instrument::new("D1", InstrumentKind::Deposit, Side::Liability, dec!(40), Currency::USD)
                .with_maturity(calc() + Duration::days(3)),
        ];
        let p = project_cash_flows(&instruments, &AssumptionsManager::new(), &ctx).unwrap();
        assert_eq!(p.ledgers.len(), 2);
        assert_eq!(p.ledgers[&Currency::RUB].inflows[9], dec!(100));
        assert_eq!(p.ledgers[&Currency::USD].outflows[2], dec!(40));
    }
}
