mod commands;
mod input;
mod logging;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::analysis::{FactorAnalysisArgs, MockPortfolioArgs, ResolveAssumptionsArgs};
use commands::interest_rate::{DepositElasticityArgs, DynamicIrrArgs, RateGapsArgs};
use commands::liquidity::{LiquidityGapsArgs, SurvivalHorizonArgs};
use commands::scenarios::ScenariosArgs;
use logging::LogFormat;

/// Asset-liability management calculations
#[derive(Parser)]
#[command(
    name = "alm",
    version,
    about = "Asset-liability management calculations",
    long_about = "A CLI for bank balance-sheet risk with decimal precision. Supports \
                  behavioral assumption rules, liquidity gaps, survival horizon, \
                  repricing gaps with NII/EVE sensitivity, deposit elasticity, \
                  stress scenarios and factor analysis. Inputs are JSON or YAML \
                  files, or JSON on stdin."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Log format written to stderr
    #[arg(long, default_value = "pretty", global = true)]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Days each currency survives on its liquid buffer under stress
    SurvivalHorizon(SurvivalHorizonArgs),
    /// Liquidity gap table per currency and time bucket
    LiquidityGaps(LiquidityGapsArgs),
    /// Repricing gaps with NII and EVE sensitivity
    RateGaps(RateGapsArgs),
    /// Deposit volume response to rate shocks
    DepositElasticity(DepositElasticityArgs),
    /// Static vs dynamic balance-sheet interest-rate risk
    DynamicIrr(DynamicIrrArgs),
    /// Run and compare stress scenarios
    Scenarios(ScenariosArgs),
    /// Attribute metric changes to aging and new deals
    FactorAnalysis(FactorAnalysisArgs),
    /// Show which behavioral assumptions each instrument receives
    ResolveAssumptions(ResolveAssumptionsArgs),
    /// Generate a synthetic portfolio with sample assumptions
    MockPortfolio(MockPortfolioArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    let cli = Cli::parse();
    logging::init(&cli.log_level, &cli.log_format);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::SurvivalHorizon(args) => commands::liquidity::run_survival_horizon(args),
        Commands::LiquidityGaps(args) => commands::liquidity::run_liquidity_gaps(args),
        Commands::RateGaps(args) => commands::interest_rate::run_rate_gaps(args),
        Commands::DepositElasticity(args) => commands::interest_rate::run_deposit_elasticity(args),
        Commands::DynamicIrr(args) => commands::interest_rate::run_dynamic_irr(args),
        Commands::Scenarios(args) => commands::scenarios::run_scenarios(args),
        Commands::FactorAnalysis(args) => commands::analysis::run_factor_analysis(args),
        Commands::ResolveAssumptions(args) => commands::analysis::run_resolve_assumptions(args),
        Commands::MockPortfolio(args) => commands::analysis::run_mock_portfolio(args),
        Commands::Version => {
            println!("alm {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            tracing::error!(error = %e, "Calculation failed");
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
