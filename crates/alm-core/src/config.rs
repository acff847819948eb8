//! Calculation parameters shared by every ALM computation.
//!
//! Every field has a default so inputs may carry a partial `config` object
//! (or none at all).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::buckets::BucketSet;
use crate::error::AlmError;
use crate::AlmResult;

/// Inflow/outflow multipliers applied to projected cash flows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressFactors {
    pub inflow_factor: Decimal,
    pub outflow_factor: Decimal,
}

/// Severity of the liquidity stress overlay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressSeverity {
    #[default]
    Base,
    Moderate,
    Severe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlmConfig {
    pub liquidity_buckets: BucketSet,
    pub repricing_buckets: BucketSet,
    /// Projection horizon in days; also the horizon reported when no
    /// shortfall occurs.
    pub horizon_cap_days: i64,
    pub moderate_stress: StressFactors,
    pub severe_stress: StressFactors,
    /// |gap / RSA| above this breaches the repricing gap limit.
    pub gap_ratio_limit: Decimal,
    /// Shock used for currencies without an explicit one.
    pub default_shock_bps: i32,
    /// Coverage ratios below this raise a critical alert.
    pub coverage_alert_threshold: Decimal,
}

impl Default for AlmConfig {
    fn default() -> Self {
        AlmConfig {
            liquidity_buckets: BucketSet::liquidity_default(),
            repricing_buckets: BucketSet::repricing_default(),
            horizon_cap_days: 1095,
            moderate_stress: StressFactors {
                inflow_factor: dec!(0.80),
                outflow_factor: dec!(1.10),
            },
            severe_stress: StressFactors {
                inflow_factor: dec!(0.60),
                outflow_factor: dec!(1.30),
            },
            gap_ratio_limit: dec!(0.20),
            default_shock_bps: 100,
            coverage_alert_threshold: dec!(0.8),
        }
    }
}

impl AlmConfig {
    pub fn stress_factors(&self, severity: StressSeverity) -> StressFactors {
        match severity {
            StressSeverity::Base => StressFactors {
                inflow_factor: Decimal::ONE,
                outflow_factor: Decimal::ONE,
            },
            StressSeverity::Moderate => self.moderate_stress.clone(),
            StressSeverity::Severe => self.severe_stress.clone(),
        }
    }

    pub fn validate(&self) -> AlmResult<()> {
        self.liquidity_buckets.validate()?;
        self.repricing_buckets.validate()?;
        if self.horizon_cap_days <= 0 {
            return Err(AlmError::invalid(
                "config.horizon_cap_days",
                "Horizon cap must be positive",
            ));
        }
        let last_closed = self
            .liquidity_buckets
            .buckets
            .iter()
            .filter_map(|b| b.end_day)
            .max()
            .unwrap_or(0);
        if self.horizon_cap_days < last_closed {
            return Err(AlmError::invalid(
                "config.horizon_cap_days",
                format!("Horizon cap must reach the last closed liquidity bucket (day {last_closed})"),
            ));
        }
        for (name, f) in [
            ("config.moderate_stress", &self.moderate_stress),
            ("config.severe_stress", &self.severe_stress),
        ] {
            if f.inflow_factor < Decimal::ZERO || f.outflow_factor < Decimal::ZERO {
                return Err(AlmError::invalid(name, "Stress factors must be non-negative"));
            }
        }
        if self.gap_ratio_limit <= Decimal::ZERO {
            return Err(AlmError::invalid(
                "config.gap_ratio_limit",
                "Gap ratio limit must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let cfg: AlmConfig = serde_json::from_str(r#"{ "horizon_cap_days": 730 }"#).unwrap();
        assert_eq!(cfg.horizon_cap_days, 730);
        assert_eq!(cfg.default_shock_bps, 100);
        assert_eq!(cfg.liquidity_buckets, BucketSet::liquidity_default());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_stress_factors_by_severity() {
        let cfg = AlmConfig::default();
        let severe = cfg.stress_factors(StressSeverity::Severe);
        assert_eq!(severe.inflow_factor, dec!(0.60));
        assert_eq!(severe.outflow_factor, dec!(1.30));
        let base = cfg.stress_factors(StressSeverity::Base);
        assert_eq!(base.inflow_factor, Decimal::ONE);
    }

    #[test]
    fn test_horizon_cap_must_cover_closed_buckets() {
        let cfg: AlmConfig = serde_json::from_str(r#"{ "horizon_cap_days": 365 }"#).unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, AlmError::InvalidInput { ref field, .. } if field == "config.horizon_cap_days"));
    }
}
