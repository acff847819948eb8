use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use alm_core::scenarios::{self, CompareScenariosInput, ScenarioInput, ScenarioParameters};

use crate::input;

/// Arguments for stress scenarios.
///
/// An input with a single `scenario` object returns the full result for it;
/// otherwise every entry of `scenarios` (or the standard set when empty) is
/// run and summarised side by side.
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct ScenariosArgs {
    /// Path to JSON/YAML input file
    #[arg(long)]
    pub input: Option<String>,

    /// Add a parallel rate shock scenario (bps; half applied to USD/EUR)
    #[arg(long)]
    pub ir_shock_bps: Option<i32>,

    /// Add a deposit run scenario with this runoff percentage
    #[arg(long)]
    pub deposit_run_pct: Option<Decimal>,
}

pub fn run_scenarios(args: ScenariosArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let data = input::read_value(args.input.as_deref(), "scenario analysis")?;

    if data.get("scenario").is_some() {
        let single: ScenarioInput = serde_json::from_value(data)?;
        let result = scenarios::calculate_scenario(&single)?;
        return Ok(serde_json::to_value(result)?);
    }

    let mut compare: CompareScenariosInput = serde_json::from_value(data)?;
    let mut extra = Vec::new();
    if let Some(bps) = args.ir_shock_bps {
        extra.push(ScenarioParameters::interest_rate_shock(bps));
    }
    if let Some(pct) = args.deposit_run_pct {
        extra.push(ScenarioParameters::deposit_run(pct));
    }
    if !extra.is_empty() {
        if compare.scenarios.is_empty() {
            compare.scenarios.push(ScenarioParameters::baseline());
        }
        compare.scenarios.extend(extra);
    }

    let result = scenarios::compare_scenarios(&compare)?;
    Ok(serde_json::to_value(result)?)
}
