//! Relative and absolute fees.
//!
//! # Responsibilities
//! - Convert a per-unit-of-work rate into an absolute fee and back
//! - Parse user fee specifications ("0.00105", "50G")
//! - Gate every fee against the configured ceiling
//! - Compute the minimum fee a replacement transaction must pay

use std::fmt;
use std::str::FromStr;

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::units::amount::{format_amount, parse_amount, UnitError, UnitTable};

/// Abstract resource estimate (gas for account chains, bytes for UTXO chains).
pub type WorkEstimate = u64;

/// Replacement fee must be at least `BUMP_NUMERATOR / BUMP_DENOMINATOR` of the original.
pub const BUMP_NUMERATOR: u64 = 1101;
pub const BUMP_DENOMINATOR: u64 = 1000;

/// Returned by [`check_bound`] when a fee is above the ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transaction fee {fee} exceeds the maximum fee {ceiling}")]
pub struct FeeTooLarge {
    pub fee: U256,
    pub ceiling: U256,
}

/// `rate * work`, exact.
pub fn fee_from_rate(rate: U256, work: WorkEstimate) -> Result<U256, UnitError> {
    rate.checked_mul(U256::from(work)).ok_or(UnitError::Overflow)
}

/// `fee / work`, floored.
pub fn rate_from_fee(fee: U256, work: WorkEstimate) -> Result<U256, UnitError> {
    if work == 0 {
        return Err(UnitError::ZeroWork);
    }
    Ok(fee / U256::from(work))
}

/// The single gate against runaway fees. Must pass before anything is broadcast.
pub fn check_bound(fee: U256, ceiling: U256, override_disabled: bool) -> Result<(), FeeTooLarge> {
    if !override_disabled && fee > ceiling {
        return Err(FeeTooLarge { fee, ceiling });
    }
    Ok(())
}

pub(crate) fn ceil_div(value: U256, divisor: U256) -> U256 {
    let quotient = value / divisor;
    if value % divisor == U256::ZERO {
        quotient
    } else {
        quotient + U256::from(1u64)
    }
}

/// Smallest fee a replacement for a transaction paying `fee` may pay.
pub fn min_replacement_fee(fee: U256) -> Result<U256, UnitError> {
    let scaled = fee
        .checked_mul(U256::from(BUMP_NUMERATOR))
        .ok_or(UnitError::Overflow)?;
    Ok(ceil_div(scaled, U256::from(BUMP_DENOMINATOR)))
}

/// How the user asked for the fee to be chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FeeSpec {
    /// Absolute fee in base units.
    Absolute(U256),
    /// Rate in base units per unit of work.
    Rate(U256),
    /// Ask the network for a rate estimate.
    Network,
}

impl FeeSpec {
    /// Parse a fee spec: a bare decimal is an absolute fee in the coin unit,
    /// a decimal followed by a unit letter is a rate in that unit.
    pub fn parse(spec: &str, table: &UnitTable) -> Result<Self, UnitError> {
        let spec = spec.trim();
        match spec.chars().last() {
            None => Err(UnitError::InvalidAmount(spec.to_string())),
            Some(letter) if letter.is_ascii_alphabetic() => {
                let unit = table.by_letter(letter)?;
                let rate = parse_amount(&spec[..spec.len() - 1], unit)?;
                Ok(FeeSpec::Rate(rate))
            }
            Some(_) => Ok(FeeSpec::Absolute(parse_amount(spec, table.coin())?)),
        }
    }
}

/// A resolved fee: absolute amount, the rate it implies and the work it was computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    pub fee: U256,
    pub rate: U256,
    pub work: WorkEstimate,
}

impl FeeQuote {
    pub fn from_rate(rate: U256, work: WorkEstimate) -> Result<Self, UnitError> {
        Ok(Self {
            fee: fee_from_rate(rate, work)?,
            rate,
            work,
        })
    }

    pub fn from_fee(fee: U256, work: WorkEstimate) -> Result<Self, UnitError> {
        Ok(Self {
            fee,
            rate: rate_from_fee(fee, work)?,
            work,
        })
    }
}

/// Multiplier applied to network fee estimates, kept as a rational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AdjustmentFactor {
    numerator: u64,
    denominator: u64,
}

impl AdjustmentFactor {
    pub const ONE: AdjustmentFactor = AdjustmentFactor {
        numerator: 1,
        denominator: 1,
    };

    pub fn new(numerator: u64, denominator: u64) -> Result<Self, UnitError> {
        if numerator == 0 || denominator == 0 {
            return Err(UnitError::InvalidFactor(format!("{}/{}", numerator, denominator)));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// `fee * factor`, rounded up.
    pub fn apply(&self, fee: U256) -> Result<U256, UnitError> {
        let scaled = fee
            .checked_mul(U256::from(self.numerator))
            .ok_or(UnitError::Overflow)?;
        Ok(ceil_div(scaled, U256::from(self.denominator)))
    }
}

impl Default for AdjustmentFactor {
    fn default() -> Self {
        Self::ONE
    }
}

impl FromStr for AdjustmentFactor {
    type Err = UnitError;

    /// Accepts `"6/5"` or a decimal such as `"1.2"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || UnitError::InvalidFactor(s.to_string());
        if let Some((n, d)) = s.split_once('/') {
            let n = n.trim().parse().map_err(|_| invalid())?;
            let d = d.trim().parse().map_err(|_| invalid())?;
            return Self::new(n, d);
        }

        let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
        if frac_part.len() > 9 {
            return Err(invalid());
        }
        let digits = format!("{}{}", int_part, frac_part);
        let numerator = digits.parse().map_err(|_| invalid())?;
        Self::new(numerator, 10u64.pow(frac_part.len() as u32))
    }
}

impl TryFrom<String> for AdjustmentFactor {
    type Error = UnitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AdjustmentFactor> for String {
    fn from(factor: AdjustmentFactor) -> Self {
        factor.to_string()
    }
}

impl fmt::Display for AdjustmentFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Human form of a fee for log lines: "0.00105 ETH".
pub fn describe_fee(fee: U256, table: &UnitTable) -> String {
    let coin = table.coin();
    format!("{} {}", format_amount(fee, coin), coin.name)
}
