pub mod gaps;

#[cfg(feature = "elasticity")]
pub mod dynamic_balance;
#[cfg(feature = "elasticity")]
pub mod elasticity;

pub use gaps::{calculate_rate_gaps, RateGapAnalysis, RateGapInput, RateGapOutput};

#[cfg(feature = "elasticity")]
pub use dynamic_balance::{
    calculate_dynamic_irr, calculate_multiple_scenarios, DynamicIrrInput, DynamicIrrResult, MultiScenarioIrrInput,
};
#[cfg(feature = "elasticity")]
pub use elasticity::{
    calculate_deposit_elasticity, default_elasticity_table, DepositElasticityInput, DepositElasticityOutput,
    ElasticityEngine, ElasticityTable,
};
