use clap::Args;
use serde_json::Value;

use alm_core::liquidity::gaps::{self, LiquidityGapInput};
use alm_core::liquidity::survival_horizon::{self, SurvivalHorizonInput};

use super::{ScenarioArg, StressArg};
use crate::input;

/// Arguments for the survival horizon calculation
#[derive(Args)]
pub struct SurvivalHorizonArgs {
    /// Path to JSON/YAML input file
    #[arg(long)]
    pub input: Option<String>,

    /// Override the liquidity scenario in the input
    #[arg(long)]
    pub scenario: Option<ScenarioArg>,

    /// Override the stress severity in the input
    #[arg(long)]
    pub stress: Option<StressArg>,
}

/// Arguments for the liquidity gap table
#[derive(Args)]
pub struct LiquidityGapsArgs {
    /// Path to JSON/YAML input file
    #[arg(long)]
    pub input: Option<String>,

    /// Override the liquidity scenario in the input
    #[arg(long)]
    pub scenario: Option<ScenarioArg>,
}

pub fn run_survival_horizon(args: SurvivalHorizonArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut sh_input: SurvivalHorizonInput = input::read_input(args.input.as_deref(), "survival horizon")?;
    if let Some(scenario) = args.scenario {
        sh_input.scenario = scenario.into();
    }
    if let Some(stress) = args.stress {
        sh_input.stress = stress.into();
    }
    let result = survival_horizon::calculate_survival_horizon(&sh_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_liquidity_gaps(args: LiquidityGapsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut gap_input: LiquidityGapInput = input::read_input(args.input.as_deref(), "liquidity gaps")?;
    if let Some(scenario) = args.scenario {
        gap_input.scenario = scenario.into();
    }
    let result = gaps::calculate_liquidity_gaps(&gap_input)?;
    Ok(serde_json::to_value(result)?)
}
