//! Balance-sheet instrument records and their per-instrument risk
//! contribution.

pub mod contribution;
pub mod instrument;

pub use contribution::{single_monthly_mortality, ContributionContext, RepricingSlice, RiskContribution};
pub use instrument::{
    validate_instruments, BookType, Instrument, InstrumentAttributes, InstrumentKind, RateType,
    ScheduledPayment,
};
