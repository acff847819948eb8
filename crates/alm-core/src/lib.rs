pub mod assumptions;
pub mod buckets;
pub mod config;
pub mod error;
pub mod instruments;
pub mod types;

#[cfg(feature = "liquidity")]
pub mod liquidity;

#[cfg(feature = "interest_rate")]
pub mod interest_rate;

#[cfg(feature = "scenarios")]
pub mod scenarios;

#[cfg(feature = "factor_analysis")]
pub mod factor_analysis;

#[cfg(feature = "mock_data")]
pub mod mock_data;

pub use error::AlmError;
pub use types::*;

/// Standard result type for all ALM operations
pub type AlmResult<T> = Result<T, AlmError>;
