//! Denominations and decimal amount handling.

use alloy::primitives::U256;
use thiserror::Error;

use crate::chain::ChainFamily;

/// Errors from unit conversion and amount parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    #[error("unknown unit '{0}'")]
    UnknownUnit(String),

    #[error("invalid amount '{0}'")]
    InvalidAmount(String),

    #[error("'{value}' has more decimal places than {unit} allows")]
    TooPrecise { value: String, unit: &'static str },

    #[error("{amount} {from} cannot be expressed exactly in {to}")]
    Precision {
        amount: U256,
        from: &'static str,
        to: &'static str,
    },

    #[error("amount overflow")]
    Overflow,

    #[error("work estimate must be greater than zero")]
    ZeroWork,

    #[error("invalid fee adjustment factor '{0}'")]
    InvalidFactor(String),
}

/// A named denomination: `decimals` is the power of ten relative to the base unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unit {
    pub name: &'static str,
    pub letter: char,
    pub decimals: u8,
}

const ETH_UNITS: &[Unit] = &[
    Unit { name: "wei", letter: 'w', decimals: 0 },
    Unit { name: "Kwei", letter: 'K', decimals: 3 },
    Unit { name: "Mwei", letter: 'M', decimals: 6 },
    Unit { name: "Gwei", letter: 'G', decimals: 9 },
    Unit { name: "szabo", letter: 's', decimals: 12 },
    Unit { name: "finney", letter: 'f', decimals: 15 },
    Unit { name: "ETH", letter: 'E', decimals: 18 },
];

const BTC_UNITS: &[Unit] = &[
    Unit { name: "satoshi", letter: 's', decimals: 0 },
    Unit { name: "BTC", letter: 'B', decimals: 8 },
];

/// The denominations known for one chain family. The last entry is the coin unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitTable {
    units: &'static [Unit],
}

impl UnitTable {
    /// Ether denominations, wei through ETH.
    pub const ETH: UnitTable = UnitTable { units: ETH_UNITS };

    /// Bitcoin denominations, satoshi and BTC.
    pub const BTC: UnitTable = UnitTable { units: BTC_UNITS };

    pub fn for_family(family: ChainFamily) -> Self {
        match family {
            ChainFamily::Account => Self::ETH,
            ChainFamily::Utxo => Self::BTC,
        }
    }

    /// The smallest denomination.
    pub fn base(&self) -> Unit {
        self.units[0]
    }

    /// The denomination amounts are quoted in by default.
    pub fn coin(&self) -> Unit {
        self.units[self.units.len() - 1]
    }

    /// Look up a unit by name (case-insensitive).
    pub fn lookup(&self, name: &str) -> Result<Unit, UnitError> {
        self.units
            .iter()
            .copied()
            .find(|u| u.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| UnitError::UnknownUnit(name.to_string()))
    }

    /// Look up a unit by its fee-spec letter (case-sensitive: `M` is Mwei, not finney).
    pub fn by_letter(&self, letter: char) -> Result<Unit, UnitError> {
        self.units
            .iter()
            .copied()
            .find(|u| u.letter == letter)
            .ok_or_else(|| UnitError::UnknownUnit(letter.to_string()))
    }

    /// Convert between two units named in this table.
    pub fn convert(&self, amount: U256, from: &str, to: &str) -> Result<U256, UnitError> {
        convert(amount, self.lookup(from)?, self.lookup(to)?)
    }
}

fn pow10(decimals: u8) -> U256 {
    U256::from(10u64).pow(U256::from(decimals))
}

/// Rescale `amount` from one denomination to another.
///
/// Scaling down must be exact; a conversion that would drop digits fails
/// instead of truncating.
pub fn convert(amount: U256, from: Unit, to: Unit) -> Result<U256, UnitError> {
    if from.decimals >= to.decimals {
        amount
            .checked_mul(pow10(from.decimals - to.decimals))
            .ok_or(UnitError::Overflow)
    } else {
        let factor = pow10(to.decimals - from.decimals);
        if amount % factor != U256::ZERO {
            return Err(UnitError::Precision {
                amount,
                from: from.name,
                to: to.name,
            });
        }
        Ok(amount / factor)
    }
}

/// Parse a non-negative decimal string denominated in `unit` into base units.
pub fn parse_amount(value: &str, unit: Unit) -> Result<U256, UnitError> {
    let value = value.trim();
    let invalid = || UnitError::InvalidAmount(value.to_string());

    let (int_part, frac_part) = match value.split_once('.') {
        Some((i, f)) => (i, f),
        None => (value, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }
    if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if frac_part.len() > unit.decimals as usize {
        return Err(UnitError::TooPrecise {
            value: value.to_string(),
            unit: unit.name,
        });
    }

    let digits = format!(
        "{}{:0<width$}",
        if int_part.is_empty() { "0" } else { int_part },
        frac_part,
        width = unit.decimals as usize
    );
    U256::from_str_radix(&digits, 10).map_err(|_| invalid())
}

/// Render base units as a decimal string in `unit`, trailing zeros trimmed.
pub fn format_amount(amount: U256, unit: Unit) -> String {
    let digits = amount.to_string();
    let decimals = unit.decimals as usize;
    if decimals == 0 {
        return digits;
    }

    let padded = format!("{:0>width$}", digits, width = decimals + 1);
    let (int_part, frac_part) = padded.split_at(padded.len() - decimals);
    let frac_part = frac_part.trim_end_matches('0');
    if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{}.{}", int_part, frac_part)
    }
}
