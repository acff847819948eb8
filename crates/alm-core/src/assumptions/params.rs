use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AlmError;
use crate::types::{Money, Rate};
use crate::AlmResult;

/// Liquidity stress scenario a runoff table is calibrated for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LiquidityScenario {
    /// Idiosyncratic (name-specific) stress.
    #[default]
    #[serde(rename = "NAME")]
    Name,
    #[serde(rename = "MARKET")]
    Market,
    /// Name and market stress together.
    #[serde(rename = "COMBO")]
    Combo,
}

impl LiquidityScenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiquidityScenario::Name => "NAME",
            LiquidityScenario::Market => "MARKET",
            LiquidityScenario::Combo => "COMBO",
        }
    }
}

/// Bucket label → fractional runoff within that bucket.
pub type RunoffTable = BTreeMap<String, Rate>;

/// Elasticity parameters attached to a rule. Unset fields fall back to the
/// segment table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticityOverlay {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_elasticity: Option<Decimal>,
    pub asymmetric: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positive_shock_elasticity: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_shock_elasticity: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_pp: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjustment_speed: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_change: Option<Rate>,
}

/// Behavioral parameters assigned to an instrument. Every field is optional;
/// absent fields mean "use the contractual behaviour".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehavioralParams {
    /// Share of a demand balance that stays until `avg_life_days`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stable_portion: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_life_days: Option<i64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub runoff_rates: BTreeMap<LiquidityScenario, RunoffTable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_balance: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_outflow: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub early_withdrawal_probability: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub early_withdrawal_portion: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maturity_override_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runoff_override: Option<Rate>,
    /// Annual constant prepayment rate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prepayment_rate: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repricing_adjustment_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drawdown_rate: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elasticity: Option<ElasticityOverlay>,
}

impl BehavioralParams {
    pub fn is_empty(&self) -> bool {
        *self == BehavioralParams::default()
    }

    pub fn runoff_for(&self, scenario: LiquidityScenario) -> Option<&RunoffTable> {
        self.runoff_rates.get(&scenario).filter(|t| !t.is_empty())
    }

    pub fn with_runoff(mut self, scenario: LiquidityScenario, rates: &[(&str, Rate)]) -> Self {
        let table = rates
            .iter()
            .map(|(label, rate)| (label.to_string(), *rate))
            .collect();
        self.runoff_rates.insert(scenario, table);
        self
    }

    /// Elasticity overlay, if present and switched on.
    pub fn active_elasticity(&self) -> Option<&ElasticityOverlay> {
        self.elasticity.as_ref().filter(|e| e.enabled)
    }

    pub fn validate(&self, field: &str) -> AlmResult<()> {
        let fractions = [
            ("stable_portion", self.stable_portion),
            ("early_withdrawal_probability", self.early_withdrawal_probability),
            ("early_withdrawal_portion", self.early_withdrawal_portion),
            ("runoff_override", self.runoff_override),
            ("prepayment_rate", self.prepayment_rate),
            ("drawdown_rate", self.drawdown_rate),
        ];
        for (name, value) in fractions {
            if let Some(v) = value {
                check_fraction(&format!("{field}.{name}"), v)?;
            }
        }
        for (scenario, table) in &self.runoff_rates {
            for (bucket, rate) in table {
                check_fraction(
                    &format!("{field}.runoff_rates.{}.{bucket}", scenario.as_str()),
                    *rate,
                )?;
            }
        }
        if let Some(days) = self.avg_life_days {
            if days <= 0 {
                return Err(AlmError::invalid(
                    format!("{field}.avg_life_days"),
                    "Average life must be positive",
                ));
            }
        }
        if let Some(days) = self.maturity_override_days {
            if days < 1 {
                return Err(AlmError::invalid(
                    format!("{field}.maturity_override_days"),
                    "Maturity override must be at least one day",
                ));
            }
        }
        for (name, value) in [
            ("minimum_balance", self.minimum_balance),
            ("maximum_outflow", self.maximum_outflow),
        ] {
            if value.is_some_and(|v| v < Decimal::ZERO) {
                return Err(AlmError::invalid(
                    format!("{field}.{name}"),
                    "Amount must be non-negative",
                ));
            }
        }
        if let Some(overlay) = &self.elasticity {
            for (name, value) in [
                ("adjustment_speed", overlay.adjustment_speed),
                ("max_change", overlay.max_change),
            ] {
                if let Some(v) = value {
                    check_fraction(&format!("{field}.elasticity.{name}"), v)?;
                }
            }
        }
        Ok(())
    }
}

fn check_fraction(field: &str, value: Rate) -> AlmResult<()> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(AlmError::invalid(field, "Must be between 0 and 1"));
    }
    Ok(())
}

/// Named override for a single counterparty. Takes precedence over every
/// rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterpartyAssumption {
    pub counterparty_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterparty_type: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub runoff_rates: BTreeMap<LiquidityScenario, RunoffTable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stable_portion: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_life_days: Option<i64>,
    /// Treat every balance of this counterparty as maturing overnight.
    pub overnight_treatment: bool,
    /// Assume the whole balance leaves on day one.
    pub full_outflow: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elasticity: Option<ElasticityOverlay>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl CounterpartyAssumption {
    pub fn to_params(&self) -> BehavioralParams {
        BehavioralParams {
            stable_portion: self.stable_portion,
            avg_life_days: self.avg_life_days,
            runoff_rates: self.runoff_rates.clone(),
            maturity_override_days: self.overnight_treatment.then_some(1),
            runoff_override: self.full_outflow.then_some(Decimal::ONE),
            elasticity: self.elasticity.clone(),
            ..BehavioralParams::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_runoff_table_keys_by_scenario_code() {
        let params: BehavioralParams = serde_json::from_str(
            r#"{"runoff_rates": {"NAME": {"overnight": "0.05"}, "COMBO": {}}}"#,
        )
        .unwrap();
        let name = params.runoff_for(LiquidityScenario::Name).unwrap();
        assert_eq!(name.get("overnight"), Some(&dec!(0.05)));
        assert!(params.runoff_for(LiquidityScenario::Combo).is_none());
        assert!(params.runoff_for(LiquidityScenario::Market).is_none());
    }

    #[test]
    fn test_validate_rejects_out_of_range_fraction() {
        let params = BehavioralParams {
            stable_portion: Some(dec!(1.2)),
            ..Default::default()
        };
        assert!(params.validate("p").is_err());
        let params = BehavioralParams::default()
            .with_runoff(LiquidityScenario::Name, &[("overnight", dec!(-0.1))]);
        assert!(params.validate("p").is_err());
    }

    #[test]
    fn test_counterparty_flags_map_to_overrides() {
        let cp = CounterpartyAssumption {
            counterparty_name: "Big Corp".into(),
            overnight_treatment: true,
            full_outflow: true,
            ..Default::default()
        };
        let params = cp.to_params();
        assert_eq!(params.maturity_override_days, Some(1));
        assert_eq!(params.runoff_override, Some(Decimal::ONE));
        assert!(CounterpartyAssumption::default().to_params().is_empty());
    }
}
