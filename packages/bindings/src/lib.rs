use napi::Result as NapiResult;
use napi_derive::napi;
use serde::de::DeserializeOwned;
use serde::Serialize;

use alm_core::assumptions::{self, ResolveAssumptionsInput};
use alm_core::factor_analysis::{self, FactorAnalysisInput};
use alm_core::interest_rate::dynamic_balance::{self, DynamicIrrInput, MultiScenarioIrrInput};
use alm_core::interest_rate::elasticity::{self, DepositElasticityInput};
use alm_core::interest_rate::gaps::{self, RateGapInput};
use alm_core::liquidity::gaps::{self as liquidity_gaps, LiquidityGapInput};
use alm_core::liquidity::survival_horizon::{self, SurvivalHorizonInput};
use alm_core::mock_data::{self, MockPortfolioInput};
use alm_core::scenarios::{self, CompareScenariosInput, ScenarioInput};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

fn parse<T: DeserializeOwned>(input_json: &str) -> NapiResult<T> {
    serde_json::from_str(input_json).map_err(to_napi_error)
}

fn render<T: Serialize>(output: &T) -> NapiResult<String> {
    serde_json::to_string(output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Behavioral assumptions
// ---------------------------------------------------------------------------

#[napi]
pub fn resolve_assumptions(input_json: String) -> NapiResult<String> {
    let input: ResolveAssumptionsInput = parse(&input_json)?;
    let output = assumptions::resolve_assumptions(&input).map_err(to_napi_error)?;
    render(&output)
}

// ---------------------------------------------------------------------------
// Liquidity
// ---------------------------------------------------------------------------

#[napi]
pub fn calculate_survival_horizon(input_json: String) -> NapiResult<String> {
    let input: SurvivalHorizonInput = parse(&input_json)?;
    let output = survival_horizon::calculate_survival_horizon(&input).map_err(to_napi_error)?;
    render(&output)
}

#[napi]
pub fn calculate_liquidity_gaps(input_json: String) -> NapiResult<String> {
    let input: LiquidityGapInput = parse(&input_json)?;
    let output = liquidity_gaps::calculate_liquidity_gaps(&input).map_err(to_napi_error)?;
    render(&output)
}

// ---------------------------------------------------------------------------
// Interest rate
// ---------------------------------------------------------------------------

#[napi]
pub fn calculate_rate_gaps(input_json: String) -> NapiResult<String> {
    let input: RateGapInput = parse(&input_json)?;
    let output = gaps::calculate_rate_gaps(&input).map_err(to_napi_error)?;
    render(&output)
}

#[napi]
pub fn calculate_deposit_elasticity(input_json: String) -> NapiResult<String> {
    let input: DepositElasticityInput = parse(&input_json)?;
    let output = elasticity::calculate_deposit_elasticity(&input).map_err(to_napi_error)?;
    render(&output)
}

#[napi]
pub fn calculate_dynamic_irr(input_json: String) -> NapiResult<String> {
    let input: DynamicIrrInput = parse(&input_json)?;
    let output = dynamic_balance::calculate_dynamic_irr(&input).map_err(to_napi_error)?;
    render(&output)
}

#[napi]
pub fn calculate_dynamic_irr_scenarios(input_json: String) -> NapiResult<String> {
    let input: MultiScenarioIrrInput = parse(&input_json)?;
    let output = dynamic_balance::calculate_multiple_scenarios(&input).map_err(to_napi_error)?;
    render(&output)
}

// ---------------------------------------------------------------------------
// Scenarios and attribution
// ---------------------------------------------------------------------------

#[napi]
pub fn calculate_scenario(input_json: String) -> NapiResult<String> {
    let input: ScenarioInput = parse(&input_json)?;
    let output = scenarios::calculate_scenario(&input).map_err(to_napi_error)?;
    render(&output)
}

#[napi]
pub fn compare_scenarios(input_json: String) -> NapiResult<String> {
    let input: CompareScenariosInput = parse(&input_json)?;
    let output = scenarios::compare_scenarios(&input).map_err(to_napi_error)?;
    render(&output)
}

#[napi]
pub fn calculate_factor_analysis(input_json: String) -> NapiResult<String> {
    let input: FactorAnalysisInput = parse(&input_json)?;
    let output = factor_analysis::calculate_factor_analysis(&input).map_err(to_napi_error)?;
    render(&output)
}

#[napi]
pub fn generate_mock_portfolio(input_json: String) -> NapiResult<String> {
    let input: MockPortfolioInput = parse(&input_json)?;
    let output = mock_data::generate_mock_portfolio(&input).map_err(to_napi_error)?;
    render(&output)
}
