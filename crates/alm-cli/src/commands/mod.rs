pub mod analysis;
pub mod interest_rate;
pub mod liquidity;
pub mod scenarios;

use clap::ValueEnum;

use alm_core::assumptions::LiquidityScenario;
use alm_core::config::StressSeverity;

/// `--scenario` override for liquidity commands.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ScenarioArg {
    Name,
    Market,
    Combo,
}

impl From<ScenarioArg> for LiquidityScenario {
    fn from(arg: ScenarioArg) -> Self {
        match arg {
            ScenarioArg::Name => LiquidityScenario::Name,
            ScenarioArg::Market => LiquidityScenario::Market,
            ScenarioArg::Combo => LiquidityScenario::Combo,
        }
    }
}

/// `--stress` override for liquidity commands.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StressArg {
    Base,
    Moderate,
    Severe,
}

impl From<StressArg> for StressSeverity {
    fn from(arg: StressArg) -> Self {
        match arg {
            StressArg::Base => StressSeverity::Base,
            StressArg::Moderate => StressSeverity::Moderate,
            StressArg::Severe => StressSeverity::Severe,
        }
    }
}
