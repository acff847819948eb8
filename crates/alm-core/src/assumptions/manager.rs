use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::params::LiquidityScenario::{Combo, Market, Name};
use super::params::{BehavioralParams, CounterpartyAssumption, LiquidityScenario, RunoffTable};
use super::rules::AssumptionRule;
use crate::buckets::BucketSet;
use crate::error::AlmError;
use crate::instruments::{InstrumentAttributes, InstrumentKind};
use crate::AlmResult;

fn default_true() -> bool {
    true
}

/// Serialized form of a rule set, as loaded from a JSON/YAML document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssumptionsConfig {
    #[serde(default)]
    pub rules: Vec<AssumptionRule>,
    #[serde(default)]
    pub counterparty_assumptions: BTreeMap<String, CounterpartyAssumption>,
    /// Fall back to built-in deposit / current account parameters when no
    /// rule matches.
    #[serde(default = "default_true")]
    pub use_class_defaults: bool,
}

impl Default for AssumptionsConfig {
    fn default() -> Self {
        AssumptionsConfig {
            rules: Vec::new(),
            counterparty_assumptions: BTreeMap::new(),
            use_class_defaults: true,
        }
    }
}

/// Where a resolved parameter set came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssumptionSource {
    Counterparty { name: String },
    Rule { rule_id: String },
    ClassDefault { class: String },
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAssumptions {
    pub source: AssumptionSource,
    pub params: BehavioralParams,
}

impl ResolvedAssumptions {
    pub fn none() -> Self {
        ResolvedAssumptions {
            source: AssumptionSource::None,
            params: BehavioralParams::default(),
        }
    }
}

/// Priority-ordered rule engine assigning behavioral parameters to
/// instruments.
#[derive(Debug, Clone)]
pub struct AssumptionsManager {
    rules: Vec<AssumptionRule>,
    counterparty_assumptions: BTreeMap<String, CounterpartyAssumption>,
    use_class_defaults: bool,
}

impl Default for AssumptionsManager {
    fn default() -> Self {
        AssumptionsManager {
            rules: Vec::new(),
            counterparty_assumptions: BTreeMap::new(),
            use_class_defaults: true,
        }
    }
}

impl AssumptionsManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &AssumptionsConfig) -> AlmResult<Self> {
        let mut manager = Self::new();
        manager.load_from_config(config)?;
        Ok(manager)
    }

    pub fn rules(&self) -> &[AssumptionRule] {
        &self.rules
    }

    pub fn counterparty_assumptions(&self) -> &BTreeMap<String, CounterpartyAssumption> {
        &self.counterparty_assumptions
    }

    /// Insert a rule keeping the list sorted by priority, highest first.
    /// Rules of equal priority keep insertion order.
    pub fn add_rule(&mut self, rule: AssumptionRule) -> AlmResult<()> {
        rule.validate()?;
        if self.rules.iter().any(|r| r.rule_id == rule.rule_id) {
            return Err(AlmError::Configuration(format!(
                "Duplicate rule id '{}'",
                rule.rule_id
            )));
        }
        let pos = self
            .rules
            .iter()
            .position(|r| r.priority < rule.priority)
            .unwrap_or(self.rules.len());
        self.rules.insert(pos, rule);
        Ok(())
    }

    pub fn add_counterparty_assumption(&mut self, assumption: CounterpartyAssumption) -> AlmResult<()> {
        if assumption.counterparty_name.trim().is_empty() {
            return Err(AlmError::invalid(
                "counterparty_assumptions.counterparty_name",
                "Counterparty name must not be empty",
            ));
        }
        assumption.to_params().validate(&format!(
            "counterparty_assumptions[{}]",
            assumption.counterparty_name
        ))?;
        self.counterparty_assumptions
            .insert(assumption.counterparty_name.clone(), assumption);
        Ok(())
    }

    /// Merge a config document into the manager. Counterparty entries keyed
    /// by map key when the record itself carries no name.
    pub fn load_from_config(&mut self, config: &AssumptionsConfig) -> AlmResult<()> {
        for rule in &config.rules {
            self.add_rule(rule.clone())?;
        }
        for (name, cp) in &config.counterparty_assumptions {
            let mut cp = cp.clone();
            if cp.counterparty_name.is_empty() {
                cp.counterparty_name = name.clone();
            }
            self.add_counterparty_assumption(cp)?;
        }
        self.use_class_defaults = config.use_class_defaults;
        debug!(
            rules = self.rules.len(),
            counterparties = self.counterparty_assumptions.len(),
            "Loaded assumptions config"
        );
        Ok(())
    }

    pub fn to_config(&self) -> AssumptionsConfig {
        AssumptionsConfig {
            rules: self.rules.clone(),
            counterparty_assumptions: self.counterparty_assumptions.clone(),
            use_class_defaults: self.use_class_defaults,
        }
    }

    /// Counterparty override, then the first matching rule, then class
    /// defaults. Class-default runoff is laid onto `liquidity_buckets`.
    pub fn resolve(&self, attrs: &InstrumentAttributes, liquidity_buckets: &BucketSet) -> ResolvedAssumptions {
        if let Some(name) = attrs.counterparty_name.as_deref() {
            if let Some(cp) = self.counterparty_assumptions.get(name) {
                debug!(instrument = %attrs.instrument_id, counterparty = name, "Counterparty override");
                return ResolvedAssumptions {
                    source: AssumptionSource::Counterparty {
                        name: name.to_string(),
                    },
                    params: cp.to_params(),
                };
            }
        }

        if let Some(rule) = self.rules.iter().find(|r| r.matches(attrs)) {
            debug!(instrument = %attrs.instrument_id, rule = %rule.rule_id, "Rule matched");
            return ResolvedAssumptions {
                source: AssumptionSource::Rule {
                    rule_id: rule.rule_id.clone(),
                },
                params: rule.assumptions.clone(),
            };
        }

        if self.use_class_defaults {
            if let Some((class, params)) = class_defaults(attrs, liquidity_buckets) {
                return ResolvedAssumptions {
                    source: AssumptionSource::ClassDefault {
                        class: class.to_string(),
                    },
                    params,
                };
            }
        }
        ResolvedAssumptions::none()
    }
}

fn class_matches(attrs: &InstrumentAttributes, kind: InstrumentKind, needle: &str) -> bool {
    attrs.kind == kind
        || attrs
            .instrument_class
            .as_deref()
            .is_some_and(|c| c.to_ascii_lowercase().contains(needle))
}

/// Default runoff as `(last day, rate)` tiers per scenario, applied in order
/// to the remaining unstable balance.
type RunoffTiers = [(LiquidityScenario, [(i64, Decimal); 3]); 3];

const RETAIL_RUNOFF: RunoffTiers = [
    (Name, [(1, dec!(0.05)), (7, dec!(0.10)), (14, dec!(0.15))]),
    (Market, [(1, dec!(0.10)), (7, dec!(0.15)), (14, dec!(0.20))]),
    (Combo, [(1, dec!(0.15)), (7, dec!(0.20)), (14, dec!(0.25))]),
];

const CORPORATE_RUNOFF: RunoffTiers = [
    (Name, [(1, dec!(0.10)), (7, dec!(0.15)), (14, dec!(0.20))]),
    (Market, [(1, dec!(0.20)), (7, dec!(0.25)), (14, dec!(0.30))]),
    (Combo, [(1, dec!(0.30)), (7, dec!(0.35)), (14, dec!(0.40))]),
];

const CURRENT_ACCOUNT_RUNOFF: RunoffTiers = [
    (Name, [(1, dec!(0.20)), (7, dec!(0.30)), (14, Decimal::ZERO)]),
    (Market, [(1, dec!(0.30)), (7, dec!(0.40)), (14, Decimal::ZERO)]),
    (Combo, [(1, dec!(0.40)), (7, dec!(0.50)), (14, Decimal::ZERO)]),
];

/// Map day tiers onto a bucket ladder. Tiers sharing a bucket compound, so
/// the share gone by the last tier day is the same on every ladder.
fn runoff_table_for(tiers: &[(i64, Decimal)], buckets: &BucketSet) -> RunoffTable {
    let mut table = RunoffTable::new();
    for (day, rate) in tiers.iter().filter(|(_, r)| !r.is_zero()) {
        let Some(idx) = buckets.assign(*day).or_else(|| buckets.len().checked_sub(1)) else {
            continue;
        };
        let entry = table.entry(buckets.label(idx).to_string()).or_insert(Decimal::ZERO);
        *entry = Decimal::ONE - (Decimal::ONE - *entry) * (Decimal::ONE - *rate);
    }
    table
}

fn with_default_runoff(mut params: BehavioralParams, tiers: &RunoffTiers, buckets: &BucketSet) -> BehavioralParams {
    for (scenario, rates) in tiers {
        params.runoff_rates.insert(*scenario, runoff_table_for(rates, buckets));
    }
    params
}

/// Built-in parameters for deposits and current accounts.
fn class_defaults(attrs: &InstrumentAttributes, buckets: &BucketSet) -> Option<(&'static str, BehavioralParams)> {
    if attrs.side == crate::types::Side::Liability
        && class_matches(attrs, InstrumentKind::Deposit, "deposit")
    {
        match attrs.counterparty_type.as_deref() {
            Some("retail") => {
                let params = BehavioralParams {
                    stable_portion: Some(dec!(0.6)),
                    avg_life_days: Some(180),
                    ..Default::default()
                };
                return Some(("deposit_retail", with_default_runoff(params, &RETAIL_RUNOFF, buckets)));
            }
            Some("corporate") => {
                let params = BehavioralParams {
                    stable_portion: Some(dec!(0.4)),
                    avg_life_days: Some(90),
                    ..Default::default()
                };
                return Some(("deposit_corporate", with_default_runoff(params, &CORPORATE_RUNOFF, buckets)));
            }
            _ => {}
        }
    }

    if attrs.side == crate::types::Side::Liability
        && class_matches(attrs, InstrumentKind::CurrentAccount, "current")
    {
        let params = BehavioralParams {
            stable_portion: Some(dec!(0.3)),
            avg_life_days: Some(30),
            ..Default::default()
        };
        return Some(("current_account", with_default_runoff(params, &CURRENT_ACCOUNT_RUNOFF, buckets)));
    }
    None
}
