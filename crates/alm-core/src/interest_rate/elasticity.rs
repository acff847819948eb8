//! Deposit elasticity: volume response of customer deposits to rate changes.
//!
//! Elasticity is the percentage change in volume per percentage point of rate
//! change, so an elasticity of -0.5 and a +2pp shock give a -1% volume change
//! before speed, competition and limits are applied:
//!
//! - **Asymmetric** parameters pick an elasticity by shock direction
//! - **Threshold** parameters pick one by shock size
//! - otherwise the **linear** base elasticity applies
//!
//! The chosen elasticity is clamped to its ceiling/floor, the volume change to
//! `±max_volume_change`, and the new volume is floored at
//! `min_remaining_volume` of the original.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use super::gaps::shock_for;
use crate::assumptions::{AssumptionSource, AssumptionsConfig, AssumptionsManager, ElasticityOverlay};
use crate::buckets::BucketSet;
use crate::config::AlmConfig;
use crate::error::AlmError;
use crate::instruments::{validate_instruments, Instrument};
use crate::types::{with_metadata, ComputationOutput, Currency, Money, Rate};
use crate::AlmResult;

const PP_PER_BP: Decimal = dec!(100);
const PERCENT: Decimal = dec!(100);

// ---------------------------------------------------------------------------
// Segments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerSegment {
    Retail,
    Corporate,
    Sme,
    Government,
    Bank,
}

impl CustomerSegment {
    /// Segment from a free-form counterparty type. Unknown types count as
    /// retail.
    pub fn from_counterparty_type(cp_type: Option<&str>) -> Self {
        let t = cp_type.unwrap_or_default().to_ascii_lowercase();
        if t.contains("retail") {
            CustomerSegment::Retail
        } else if t.contains("corporate") {
            CustomerSegment::Corporate
        } else if t.contains("sme") {
            CustomerSegment::Sme
        } else if t.contains("gov") {
            CustomerSegment::Government
        } else if t.contains("bank") {
            CustomerSegment::Bank
        } else {
            CustomerSegment::Retail
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositType {
    Demand,
    /// Up to 90 days.
    ShortTerm,
    /// 91 to 365 days.
    MediumTerm,
    LongTerm,
}

impl DepositType {
    pub fn classify(instrument: &Instrument, calculation_date: NaiveDate) -> Self {
        if instrument.is_non_maturity() {
            return DepositType::Demand;
        }
        match instrument.days_to_maturity(calculation_date) {
            Some(d) if d <= 90 => DepositType::ShortTerm,
            Some(d) if d <= 365 => DepositType::MediumTerm,
            Some(_) => DepositType::LongTerm,
            None => DepositType::Demand,
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

fn one() -> Decimal {
    Decimal::ONE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElasticityParameters {
    pub customer_segment: CustomerSegment,
    pub deposit_type: DepositType,
    #[serde(default)]
    pub base_elasticity: Decimal,
    #[serde(default)]
    pub elasticity_ceiling: Option<Decimal>,
    #[serde(default)]
    pub elasticity_floor: Option<Decimal>,
    /// Shock size in percentage points separating the two threshold regimes.
    #[serde(default)]
    pub threshold_pp: Option<Decimal>,
    #[serde(default)]
    pub below_threshold_elasticity: Option<Decimal>,
    #[serde(default)]
    pub above_threshold_elasticity: Option<Decimal>,
    #[serde(default)]
    pub asymmetric: bool,
    #[serde(default)]
    pub positive_shock_elasticity: Option<Decimal>,
    #[serde(default)]
    pub negative_shock_elasticity: Option<Decimal>,
    /// Share of the long-run response realised in the period (0-1).
    #[serde(default = "one")]
    pub adjustment_speed: Rate,
    #[serde(default)]
    pub lag_days: i64,
    /// Above 1 in more competitive markets.
    #[serde(default = "one")]
    pub competitive_factor: Decimal,
    #[serde(default)]
    pub max_volume_change: Option<Rate>,
    #[serde(default)]
    pub min_remaining_volume: Option<Rate>,
}

impl ElasticityParameters {
    pub fn linear(segment: CustomerSegment, deposit_type: DepositType, base: Decimal) -> Self {
        ElasticityParameters {
            customer_segment: segment,
            deposit_type,
            base_elasticity: base,
            elasticity_ceiling: None,
            elasticity_floor: None,
            threshold_pp: None,
            below_threshold_elasticity: None,
            above_threshold_elasticity: None,
            asymmetric: false,
            positive_shock_elasticity: None,
            negative_shock_elasticity: None,
            adjustment_speed: Decimal::ONE,
            lag_days: 0,
            competitive_factor: Decimal::ONE,
            max_volume_change: None,
            min_remaining_volume: None,
        }
    }

    /// Retail demand deposits: sticky, slow, stronger reaction to falling
    /// rates.
    pub fn retail_demand() -> Self {
        ElasticityParameters {
            asymmetric: true,
            positive_shock_elasticity: Some(dec!(-0.2)),
            negative_shock_elasticity: Some(dec!(-0.4)),
            adjustment_speed: dec!(0.5),
            lag_days: 30,
            max_volume_change: Some(dec!(0.15)),
            min_remaining_volume: Some(dec!(0.60)),
            ..Self::linear(CustomerSegment::Retail, DepositType::Demand, dec!(-0.3))
        }
    }

    pub fn retail_term(deposit_type: DepositType) -> Self {
        ElasticityParameters {
            asymmetric: true,
            positive_shock_elasticity: Some(dec!(-0.6)),
            negative_shock_elasticity: Some(dec!(-0.4)),
            threshold_pp: Some(dec!(1.0)),
            below_threshold_elasticity: Some(dec!(-0.3)),
            above_threshold_elasticity: Some(dec!(-0.8)),
            adjustment_speed: dec!(0.7),
            lag_days: 7,
            max_volume_change: Some(dec!(0.25)),
            min_remaining_volume: Some(dec!(0.50)),
            ..Self::linear(CustomerSegment::Retail, deposit_type, dec!(-0.5))
        }
    }

    pub fn retail_long_term() -> Self {
        ElasticityParameters {
            adjustment_speed: dec!(0.3),
            lag_days: 90,
            max_volume_change: Some(dec!(0.10)),
            min_remaining_volume: Some(dec!(0.70)),
            ..Self::linear(CustomerSegment::Retail, DepositType::LongTerm, dec!(-0.3))
        }
    }

    pub fn corporate(deposit_type: DepositType) -> Self {
        ElasticityParameters {
            adjustment_speed: dec!(0.9),
            lag_days: 1,
            competitive_factor: dec!(1.5),
            max_volume_change: Some(dec!(0.40)),
            min_remaining_volume: Some(dec!(0.30)),
            ..Self::linear(CustomerSegment::Corporate, deposit_type, dec!(-0.8))
        }
    }

    pub fn sme_short_term() -> Self {
        ElasticityParameters {
            adjustment_speed: dec!(0.8),
            lag_days: 3,
            max_volume_change: Some(dec!(0.30)),
            min_remaining_volume: Some(dec!(0.40)),
            ..Self::linear(CustomerSegment::Sme, DepositType::ShortTerm, dec!(-0.6))
        }
    }

    /// Layer a rule-engine overlay on top of these parameters.
    pub fn with_overlay(&self, overlay: &ElasticityOverlay) -> Self {
        let mut p = self.clone();
        if let Some(base) = overlay.base_elasticity {
            p.base_elasticity = base;
        }
        if overlay.asymmetric {
            p.asymmetric = true;
            p.positive_shock_elasticity = overlay.positive_shock_elasticity.or(p.positive_shock_elasticity);
            p.negative_shock_elasticity = overlay.negative_shock_elasticity.or(p.negative_shock_elasticity);
        }
        if let Some(t) = overlay.threshold_pp {
            p.threshold_pp = Some(t);
        }
        if let Some(s) = overlay.adjustment_speed {
            p.adjustment_speed = s;
        }
        if let Some(m) = overlay.max_change {
            p.max_volume_change = Some(m);
        }
        p
    }

    /// Elasticity applicable to a shock of `delta_pp` percentage points.
    pub fn elasticity_for(&self, delta_pp: Decimal) -> Decimal {
        let mut e = if self.asymmetric {
            if delta_pp > Decimal::ZERO {
                self.positive_shock_elasticity.unwrap_or(self.base_elasticity)
            } else if delta_pp < Decimal::ZERO {
                self.negative_shock_elasticity.unwrap_or(self.base_elasticity)
            } else {
                self.base_elasticity
            }
        } else if let (Some(t), Some(below), Some(above)) = (
            self.threshold_pp,
            self.below_threshold_elasticity,
            self.above_threshold_elasticity,
        ) {
            if delta_pp.abs() < t {
                below
            } else {
                above
            }
        } else {
            self.base_elasticity
        };
        if let Some(c) = self.elasticity_ceiling {
            e = e.min(c);
        }
        if let Some(f) = self.elasticity_floor {
            e = e.max(f);
        }
        e
    }

    /// New volume for `original` after a shock of `shock_bps`. Returns the
    /// elasticity used and the new amount.
    pub fn apply(&self, original: Money, shock_bps: i32) -> (Decimal, Money) {
        let delta_pp = Decimal::from(shock_bps) / PP_PER_BP;
        let elasticity = self.elasticity_for(delta_pp);
        let mut change = elasticity * delta_pp / PERCENT * self.adjustment_speed * self.competitive_factor;
        if let Some(max) = self.max_volume_change {
            change = change.max(-max).min(max);
        }
        let mut new_amount = original * (Decimal::ONE + change);
        if let Some(min_share) = self.min_remaining_volume {
            new_amount = new_amount.max(original * min_share);
        }
        (elasticity, new_amount)
    }

    pub fn validate(&self, field: &str) -> AlmResult<()> {
        for (name, v) in [
            ("adjustment_speed", Some(self.adjustment_speed)),
            ("max_volume_change", self.max_volume_change),
            ("min_remaining_volume", self.min_remaining_volume),
        ] {
            if v.is_some_and(|v| v < Decimal::ZERO || v > Decimal::ONE) {
                return Err(AlmError::invalid(format!("{field}.{name}"), "Must be between 0 and 1"));
            }
        }
        if self.lag_days < 0 {
            return Err(AlmError::invalid(format!("{field}.lag_days"), "Lag must be non-negative"));
        }
        if self.competitive_factor < Decimal::ZERO {
            return Err(AlmError::invalid(
                format!("{field}.competitive_factor"),
                "Competitive factor must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Elasticity parameters keyed by segment and deposit type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElasticityTable {
    pub entries: Vec<ElasticityParameters>,
}

impl ElasticityTable {
    /// Exact match, else the segment's demand entry.
    pub fn get(&self, segment: CustomerSegment, deposit_type: DepositType) -> Option<&ElasticityParameters> {
        let find = |dt: DepositType| {
            self.entries
                .iter()
                .find(|p| p.customer_segment == segment && p.deposit_type == dt)
        };
        find(deposit_type).or_else(|| find(DepositType::Demand))
    }

    pub fn validate(&self) -> AlmResult<()> {
        for (i, p) in self.entries.iter().enumerate() {
            p.validate(&format!("elasticity_table[{i}]"))?;
        }
        Ok(())
    }
}

pub fn default_elasticity_table() -> ElasticityTable {
    let mut entries = vec![
        ElasticityParameters::retail_demand(),
        ElasticityParameters::retail_term(DepositType::ShortTerm),
        ElasticityParameters::retail_term(DepositType::MediumTerm),
        ElasticityParameters::retail_long_term(),
    ];
    for dt in [
        DepositType::Demand,
        DepositType::ShortTerm,
        DepositType::MediumTerm,
        DepositType::LongTerm,
    ] {
        entries.push(ElasticityParameters::corporate(dt));
    }
    entries.push(ElasticityParameters::sme_short_term());
    ElasticityTable { entries }
}

// ---------------------------------------------------------------------------
// Volume changes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElasticitySource {
    Table,
    Rule { rule_id: String },
    Counterparty { name: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositVolumeChange {
    pub instrument_id: String,
    pub currency: Currency,
    pub customer_segment: CustomerSegment,
    pub deposit_type: DepositType,
    pub original_amount: Money,
    pub new_amount: Money,
    pub volume_change: Money,
    pub volume_change_pct: Decimal,
    pub rate_change_bps: i32,
    pub elasticity_used: Decimal,
    pub effective_date: NaiveDate,
    pub source: ElasticitySource,
}

/// Applies elasticity to deposit-like liabilities.
pub struct ElasticityEngine<'a> {
    pub calculation_date: NaiveDate,
    pub table: &'a ElasticityTable,
    pub manager: &'a AssumptionsManager,
    pub buckets: &'a BucketSet,
    pub default_shock_bps: i32,
}

impl<'a> ElasticityEngine<'a> {
    fn parameters_for(
        &self,
        inst: &Instrument,
        segment: CustomerSegment,
        deposit_type: DepositType,
    ) -> Option<(ElasticityParameters, ElasticitySource)> {
        let table_entry = self.table.get(segment, deposit_type);
        let resolved = self
            .manager
            .resolve(&inst.attributes(self.calculation_date, self.buckets), self.buckets);
        if let Some(overlay) = resolved.params.active_elasticity() {
            let base = table_entry
                .cloned()
                .unwrap_or_else(|| ElasticityParameters::linear(segment, deposit_type, Decimal::ZERO));
            let source = match resolved.source {
                AssumptionSource::Rule { rule_id } => ElasticitySource::Rule { rule_id },
                AssumptionSource::Counterparty { name } => ElasticitySource::Counterparty { name },
                _ => ElasticitySource::Table,
            };
            return Some((base.with_overlay(overlay), source));
        }
        table_entry.map(|p| (p.clone(), ElasticitySource::Table))
    }

    pub fn calculate_volume_changes(
        &self,
        instruments: &[Instrument],
        shocks_bps: &BTreeMap<Currency, i32>,
    ) -> Vec<DepositVolumeChange> {
        let mut changes = Vec::new();
        for inst in instruments.iter().filter(|i| i.is_deposit_like()) {
            let shock = shock_for(&inst.currency, shocks_bps, self.default_shock_bps);
            if shock == 0 || inst.balance.is_zero() {
                continue;
            }
            let segment = CustomerSegment::from_counterparty_type(inst.counterparty_type.as_deref());
            let deposit_type = DepositType::classify(inst, self.calculation_date);
            let Some((params, source)) = self.parameters_for(inst, segment, deposit_type) else {
                warn!(
                    instrument = %inst.id,
                    segment = ?segment,
                    deposit_type = ?deposit_type,
                    "No elasticity parameters, skipping"
                );
                continue;
            };
            let (elasticity, new_amount) = params.apply(inst.balance, shock);
            let volume_change = new_amount - inst.balance;
            debug!(instrument = %inst.id, %elasticity, %volume_change, "Deposit volume change");
            changes.push(DepositVolumeChange {
                instrument_id: inst.id.clone(),
                currency: inst.currency.clone(),
                customer_segment: segment,
                deposit_type,
                original_amount: inst.balance,
                new_amount,
                volume_change,
                volume_change_pct: volume_change / inst.balance,
                rate_change_bps: shock,
                elasticity_used: elasticity,
                effective_date: self.calculation_date + Duration::days(params.lag_days),
                source,
            });
        }
        info!(
            changed = changes.len(),
            total_change = %changes.iter().map(|c| c.volume_change).sum::<Money>(),
            "Calculated deposit volume changes"
        );
        changes
    }

    /// Copy of the portfolio with elasticity-adjusted deposit balances.
    pub fn create_dynamic_balance_sheet(
        &self,
        instruments: &[Instrument],
        shocks_bps: &BTreeMap<Currency, i32>,
    ) -> (Vec<Instrument>, Vec<DepositVolumeChange>) {
        let changes = self.calculate_volume_changes(instruments, shocks_bps);
        let by_id: BTreeMap<&str, &DepositVolumeChange> =
            changes.iter().map(|c| (c.instrument_id.as_str(), c)).collect();
        let dynamic = instruments
            .iter()
            .map(|inst| {
                let mut copy = inst.clone();
                if let Some(change) = by_id.get(inst.id.as_str()) {
                    // Scheduled repayments shrink or grow with the balance.
                    if !inst.balance.is_zero() {
                        let factor = change.new_amount / inst.balance;
                        for payment in &mut copy.repayment_schedule {
                            payment.amount *= factor;
                        }
                    }
                    copy.balance = change.new_amount;
                }
                copy
            })
            .collect();
        (dynamic, changes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentImpact {
    pub customer_segment: CustomerSegment,
    pub deposit_type: DepositType,
    pub deposits: usize,
    pub original_amount: Money,
    pub new_amount: Money,
    pub volume_change: Money,
    pub mean_volume_change_pct: Decimal,
    pub mean_elasticity: Decimal,
    /// (new - original) / original over the whole group.
    pub aggregate_change_pct: Decimal,
}

pub fn analyze_elasticity_impact(changes: &[DepositVolumeChange]) -> Vec<SegmentImpact> {
    let mut groups: BTreeMap<(CustomerSegment, DepositType), Vec<&DepositVolumeChange>> = BTreeMap::new();
    for c in changes {
        groups.entry((c.customer_segment, c.deposit_type)).or_default().push(c);
    }
    groups
        .into_iter()
        .map(|((segment, deposit_type), items)| {
            let n = Decimal::from(items.len());
            let original: Money = items.iter().map(|c| c.original_amount).sum();
            let new: Money = items.iter().map(|c| c.new_amount).sum();
            SegmentImpact {
                customer_segment: segment,
                deposit_type,
                deposits: items.len(),
                original_amount: original,
                new_amount: new,
                volume_change: new - original,
                mean_volume_change_pct: items.iter().map(|c| c.volume_change_pct).sum::<Decimal>() / n,
                mean_elasticity: items.iter().map(|c| c.elasticity_used).sum::<Decimal>() / n,
                aggregate_change_pct: if original.is_zero() {
                    Decimal::ZERO
                } else {
                    (new - original) / original
                },
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Top-level calculation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositElasticityInput {
    pub calculation_date: NaiveDate,
    pub instruments: Vec<Instrument>,
    #[serde(default)]
    pub rate_shocks_bps: BTreeMap<Currency, i32>,
    /// Defaults to the built-in segment table.
    #[serde(default)]
    pub elasticity_table: Option<ElasticityTable>,
    #[serde(default)]
    pub assumptions: AssumptionsConfig,
    #[serde(default)]
    pub config: AlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositElasticityOutput {
    pub changes: Vec<DepositVolumeChange>,
    pub by_segment: Vec<SegmentImpact>,
    pub total_original: Money,
    pub total_new: Money,
    pub total_change: Money,
}

pub fn calculate_deposit_elasticity(
    input: &DepositElasticityInput,
) -> AlmResult<ComputationOutput<DepositElasticityOutput>> {
    let start = Instant::now();
    input.config.validate()?;
    validate_instruments(&input.instruments)?;
    let table = input.elasticity_table.clone().unwrap_or_else(default_elasticity_table);
    table.validate()?;
    let manager = AssumptionsManager::from_config(&input.assumptions)?;

    let engine = ElasticityEngine {
        calculation_date: input.calculation_date,
        table: &table,
        manager: &manager,
        buckets: &input.config.liquidity_buckets,
        default_shock_bps: input.config.default_shock_bps,
    };
    let changes = engine.calculate_volume_changes(&input.instruments, &input.rate_shocks_bps);

    let deposits = input.instruments.iter().filter(|i| i.is_deposit_like()).count();
    let mut warnings = Vec::new();
    if deposits > changes.len() {
        warnings.push(format!(
            "{} deposit(s) unchanged: zero shock, zero balance or no elasticity parameters",
            deposits - changes.len()
        ));
    }

    let total_original: Money = changes.iter().map(|c| c.original_amount).sum();
    let total_new: Money = changes.iter().map(|c| c.new_amount).sum();
    let output = DepositElasticityOutput {
        by_segment: analyze_elasticity_impact(&changes),
        total_original,
        total_new,
        total_change: total_new - total_original,
        changes,
    };

    Ok(with_metadata(
        "Deposit volume elasticity to rate shocks (asymmetric / threshold / linear)",
        &json!({
            "rate_shocks_bps": input.rate_shocks_bps,
            "default_shock_bps": input.config.default_shock_bps,
            "custom_table": input.elasticity_table.is_some(),
            "elasticity_units": "% volume change per pp of rate change",
        }),
        warnings,
        start.elapsed().as_micros() as u64,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assumptions::{AssumptionRule, AssumptionRuleType, AttributeValue, BehavioralParams, Condition};
    use crate::instruments::InstrumentKind;
    use crate::types::Side;

    fn calc() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn deposit(id: &str, cp_type: &str, days: Option<i64>) -> Instrument {
        let mut d = Instrument::new(id, InstrumentKind::Deposit, Side::Liability, dec!(1_000_000), Currency::RUB)
            .with_counterparty(None, cp_type);
        match days {
            Some(n) => d.maturity_date = Some(calc() + Duration::days(n)),
            None => d.is_demand = true,
        }
        d
    }

    #[test]
    fn test_segment_and_type_classification() {
        assert_eq!(CustomerSegment::from_counterparty_type(Some("Corporate")), CustomerSegment::Corporate);
        assert_eq!(CustomerSegment::from_counterparty_type(Some("government")), CustomerSegment::Government);
        assert_eq!(CustomerSegment::from_counterparty_type(None), CustomerSegment::Retail);
        assert_eq!(DepositType::classify(&deposit("a", "retail", Some(90)), calc()), DepositType::ShortTerm);
        assert_eq!(DepositType::classify(&deposit("a", "retail", Some(91)), calc()), DepositType::MediumTerm);
        assert_eq!(DepositType::classify(&deposit("a", "retail", Some(400)), calc()), DepositType::LongTerm);
        assert_eq!(DepositType::classify(&deposit("a", "retail", None), calc()), DepositType::Demand);
    }

    #[test]
    fn test_elasticity_selection() {
        let demand = ElasticityParameters::retail_demand();
        assert_eq!(demand.elasticity_for(dec!(2)), dec!(-0.2));
        assert_eq!(demand.elasticity_for(dec!(-2)), dec!(-0.4));
        assert_eq!(demand.elasticity_for(Decimal::ZERO), dec!(-0.3));

        let mut threshold = ElasticityParameters::retail_term(DepositType::ShortTerm);
        threshold.asymmetric = false;
        assert_eq!(threshold.elasticity_for(dec!(0.5)), dec!(-0.3));
        assert_eq!(threshold.elasticity_for(dec!(1.0)), dec!(-0.8));

        let mut capped = ElasticityParameters::corporate(DepositType::Demand);
        capped.elasticity_floor = Some(dec!(-0.5));
        assert_eq!(capped.elasticity_for(dec!(1)), dec!(-0.5));
    }

    #[test]
    fn test_apply_linear_corporate() {
        // -0.8 × 2pp / 100 × 0.9 × 1.5 = -0.0216
        let p = ElasticityParameters::corporate(DepositType::ShortTerm);
        let (e, new_amount) = p.apply(dec!(1000), 200);
        assert_eq!(e, dec!(-0.8));
        assert_eq!(new_amount, dec!(978.4));
    }

    #[test]
    fn test_apply_clamps_and_floors() {
        let mut p = ElasticityParameters::linear(CustomerSegment::Bank, DepositType::Demand, dec!(-50));
        p.max_volume_change = Some(dec!(0.3));
        let (_, new_amount) = p.apply(dec!(1000), 100);
        assert_eq!(new_amount, dec!(700));
        p.min_remaining_volume = Some(dec!(0.8));
        let (_, floored) = p.apply(dec!(1000), 100);
        assert_eq!(floored, dec!(800));
    }

    #[test]
    fn test_table_falls_back_to_demand() {
        let table = default_elasticity_table();
        let p = table.get(CustomerSegment::Corporate, DepositType::LongTerm).unwrap();
        assert_eq!(p.deposit_type, DepositType::LongTerm);
        assert!(table.get(CustomerSegment::Sme, DepositType::Demand).is_none());
        assert!(table.get(CustomerSegment::Sme, DepositType::ShortTerm).is_some());
        assert!(table.get(CustomerSegment::Government, DepositType::ShortTerm).is_none());
    }

    #[test]
    fn test_engine_skips_zero_shock_and_non_deposits() {
        let table = default_elasticity_table();
        let manager = AssumptionsManager::new();
        let buckets = BucketSet::liquidity_default();
        let engine = ElasticityEngine {
            calculation_date: calc(),
            table: &table,
            manager: &manager,
            buckets: &buckets,
            default_shock_bps: 0,
        };
        let loan = Instrument::new("L", InstrumentKind::Loan, Side::Asset, dec!(10), Currency::RUB);
        let mut shocks = BTreeMap::new();
        shocks.insert(Currency::RUB, 200);
        let changes = engine.calculate_volume_changes(
            &[loan, deposit("D1", "retail", Some(30)), deposit("D2", "government", Some(30))],
            &shocks,
        );
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].instrument_id, "D1");
        assert_eq!(changes[0].effective_date, calc() + Duration::days(7));

        let none = engine.calculate_volume_changes(&[deposit("D1", "retail", Some(30))], &BTreeMap::new());
        assert!(none.is_empty());
    }

    #[test]
    fn test_rule_overlay_takes_precedence() {
        let table = default_elasticity_table();
        let mut manager = AssumptionsManager::new();
        manager
            .add_rule(
                AssumptionRule::new("vip", AssumptionRuleType::CounterpartyType, 10)
                    .with_condition("counterparty_type", Condition::Equals(AttributeValue::text("retail")))
                    .with_assumptions(BehavioralParams {
                        elasticity: Some(ElasticityOverlay {
                            enabled: true,
                            base_elasticity: Some(dec!(-1)),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
            )
            .unwrap();
        let buckets = BucketSet::liquidity_default();
        let engine = ElasticityEngine {
            calculation_date: calc(),
            table: &table,
            manager: &manager,
            buckets: &buckets,
            default_shock_bps: 100,
        };
        let changes = engine.calculate_volume_changes(&[deposit("D1", "retail", Some(400))], &BTreeMap::new());
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].elasticity_used, dec!(-1));
        assert_eq!(changes[0].source, ElasticitySource::Rule { rule_id: "vip".into() });
    }

    #[test]
    fn test_dynamic_balance_sheet_and_summary() {
        let table = default_elasticity_table();
        let manager = AssumptionsManager::new();
        let buckets = BucketSet::liquidity_default();
        let engine = ElasticityEngine {
            calculation_date: calc(),
            table: &table,
            manager: &manager,
            buckets: &buckets,
            default_shock_bps: 200,
        };
        let portfolio = vec![
            deposit("C1", "corporate", Some(30)),
            deposit("C2", "corporate", Some(60)),
        ];
        let (dynamic, changes) = engine.create_dynamic_balance_sheet(&portfolio, &BTreeMap::new());
        assert_eq!(dynamic.len(), 2);
        assert_eq!(dynamic[0].balance, dec!(978400));
        let summary = analyze_elasticity_impact(&changes);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].deposits, 2);
        assert_eq!(summary[0].aggregate_change_pct, dec!(-0.0216));
    }

    #[test]
    fn test_dynamic_balance_sheet_rescales_repayment_schedule() {
        use crate::instruments::ScheduledPayment;
        let table = default_elasticity_table();
        let manager = AssumptionsManager::new();
        let buckets = BucketSet::liquidity_default();
        let engine = ElasticityEngine {
            calculation_date: calc(),
            table: &table,
            manager: &manager,
            buckets: &buckets,
            default_shock_bps: 200,
        };
        let mut amortizing = deposit("C1", "corporate", Some(30));
        amortizing.repayment_schedule = vec![
            ScheduledPayment { date: calc() + Duration::days(10), amount: dec!(500_000) },
            ScheduledPayment { date: calc() + Duration::days(30), amount: dec!(500_000) },
        ];
        let (dynamic, _) = engine.create_dynamic_balance_sheet(&[amortizing], &BTreeMap::new());
        assert_eq!(dynamic[0].balance, dec!(978400));
        let amounts: Vec<Money> = dynamic[0].repayment_schedule.iter().map(|p| p.amount).collect();
        assert_eq!(amounts, vec![dec!(489200), dec!(489200)]);
    }
}
