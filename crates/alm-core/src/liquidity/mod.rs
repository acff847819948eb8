pub mod gaps;
pub mod projection;
pub mod survival_horizon;

pub use gaps::{calculate_liquidity_gaps, LiquidityGapInput, LiquidityGapOutput};
pub use projection::{project_cash_flows, CashFlowProjection, DailyLedger, ProjectionContext};
pub use survival_horizon::{calculate_survival_horizon, SurvivalHorizonInput, SurvivalHorizonOutput};
