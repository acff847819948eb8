use chrono::NaiveDate;
use clap::Args;
use serde_json::Value;

use alm_core::assumptions::{self, ResolveAssumptionsInput};
use alm_core::factor_analysis::{self, FactorAnalysisInput};
use alm_core::mock_data::{self, MockPortfolioInput, PortfolioMix};

use crate::input;

/// Arguments for factor analysis between two portfolio snapshots
#[derive(Args)]
pub struct FactorAnalysisArgs {
    /// Path to JSON/YAML input file
    #[arg(long)]
    pub input: Option<String>,

    /// Keep only the N largest new-deal impacts
    #[arg(long)]
    pub top_n: Option<usize>,
}

/// Arguments for auditing a behavioral assumption rule set
#[derive(Args)]
pub struct ResolveAssumptionsArgs {
    /// Path to JSON/YAML input file
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for synthetic portfolio generation
#[derive(Args)]
pub struct MockPortfolioArgs {
    /// Calculation date (YYYY-MM-DD)
    #[arg(long)]
    pub calculation_date: NaiveDate,

    /// RNG seed for a reproducible portfolio
    #[arg(long)]
    pub seed: Option<u64>,

    /// Optional JSON/YAML file with the instrument mix
    #[arg(long)]
    pub mix: Option<String>,
}

pub fn run_factor_analysis(args: FactorAnalysisArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut fa_input: FactorAnalysisInput = input::read_input(args.input.as_deref(), "factor analysis")?;
    if args.top_n.is_some() {
        fa_input.top_n = args.top_n;
    }
    let result = factor_analysis::calculate_factor_analysis(&fa_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_resolve_assumptions(args: ResolveAssumptionsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let ra_input: ResolveAssumptionsInput =
        input::read_input(args.input.as_deref(), "assumption resolution")?;
    let result = assumptions::resolve_assumptions(&ra_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_mock_portfolio(args: MockPortfolioArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mix: PortfolioMix = match args.mix.as_deref() {
        Some(path) => input::file::read_document(path)?,
        None => PortfolioMix::default(),
    };
    let result = mock_data::generate_mock_portfolio(&MockPortfolioInput {
        calculation_date: args.calculation_date,
        seed: args.seed,
        mix,
    })?;
    Ok(serde_json::to_value(result)?)
}
