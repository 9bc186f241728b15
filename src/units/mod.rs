//! Amount and fee arithmetic.
//!
//! # Data Flow
//! ```text
//! user input ("0.00105", "50G")
//!     → amount.rs (denominations, decimal parsing, scaling)
//!     → fee.rs (FeeSpec, rate ⇄ absolute fee, ceiling check)
//!     → absolute fee in base units (U256), the only form stored or compared
//! ```
//!
//! # Design Decisions
//! - Integer arithmetic on the smallest denomination only, never floats
//! - Anything that must round does so toward the larger fee

pub mod amount;
pub mod fee;

pub use amount::{convert, format_amount, parse_amount, Unit, UnitError, UnitTable};
pub use fee::{
    check_bound, describe_fee, fee_from_rate, min_replacement_fee, rate_from_fee, AdjustmentFactor, FeeQuote,
    FeeSpec, FeeTooLarge, WorkEstimate,
};
