use clap::Args;
use serde_json::Value;

use alm_core::instruments::BookType;
use alm_core::interest_rate::dynamic_balance::{self, DynamicIrrInput, MultiScenarioIrrInput};
use alm_core::interest_rate::elasticity::{self, DepositElasticityInput};
use alm_core::interest_rate::gaps::{self, RateGapInput};

use crate::input;

/// Arguments for repricing gap analysis
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct RateGapsArgs {
    /// Path to JSON/YAML input file
    #[arg(long)]
    pub input: Option<String>,

    /// Shock for currencies without an explicit one, in basis points
    #[arg(long)]
    pub default_shock_bps: Option<i32>,

    /// Restrict to the banking book
    #[arg(long)]
    pub banking_book: bool,
}

/// Arguments for deposit elasticity
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct DepositElasticityArgs {
    /// Path to JSON/YAML input file
    #[arg(long)]
    pub input: Option<String>,

    /// Shock for currencies without an explicit one, in basis points
    #[arg(long)]
    pub default_shock_bps: Option<i32>,
}

/// Arguments for static vs dynamic interest-rate risk. An input carrying a
/// `scenarios` map runs every named shock vector.
#[derive(Args)]
pub struct DynamicIrrArgs {
    /// Path to JSON/YAML input file
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_rate_gaps(args: RateGapsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut gap_input: RateGapInput = input::read_input(args.input.as_deref(), "rate gaps")?;
    if let Some(bps) = args.default_shock_bps {
        gap_input.config.default_shock_bps = bps;
    }
    if args.banking_book {
        gap_input.book_filter = Some(BookType::Banking);
    }
    let result = gaps::calculate_rate_gaps(&gap_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_deposit_elasticity(args: DepositElasticityArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut el_input: DepositElasticityInput =
        input::read_input(args.input.as_deref(), "deposit elasticity")?;
    if let Some(bps) = args.default_shock_bps {
        el_input.config.default_shock_bps = bps;
    }
    let result = elasticity::calculate_deposit_elasticity(&el_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_dynamic_irr(args: DynamicIrrArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let data = input::read_value(args.input.as_deref(), "dynamic IRR")?;
    if data.get("scenarios").is_some() {
        let multi: MultiScenarioIrrInput = serde_json::from_value(data)?;
        let result = dynamic_balance::calculate_multiple_scenarios(&multi)?;
        return Ok(serde_json::to_value(result)?);
    }
    let irr_input: DynamicIrrInput = serde_json::from_value(data)?;
    let result = dynamic_balance::calculate_dynamic_irr(&irr_input)?;
    Ok(serde_json::to_value(result)?)
}
