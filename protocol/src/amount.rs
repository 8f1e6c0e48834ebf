//! # Amounts
//!
//! An [`Amount`] is a non-negative integer count of base units. One coin is
//! `10^18` base units, same as wei to ether, so `Amount::parse_coins("1.0")`
//! is the ledger's equivalent of `parseEther("1.0")`.
//!
//! Arithmetic is always checked. There is no wrapping add and no saturating
//! subtract anywhere in this type, because either one silently invents or
//! destroys money.
//!
//! On the wire an amount is a decimal string of base units (`"1500000000000000000"`),
//! since JSON numbers stop being exact long before `u128` runs out.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::{AMOUNT_DECIMALS, COIN_SYMBOL, UNITS_PER_COIN};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while parsing an amount.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    /// The input was empty or contained something other than digits and a
    /// single decimal point.
    #[error("invalid amount: {0:?}")]
    Invalid(String),

    /// More fractional digits than the denomination supports.
    #[error("too many decimal places: {got} (max {max})")]
    TooPrecise {
        /// Fractional digits supplied.
        got: usize,
        /// Fractional digits supported.
        max: u32,
    },

    /// The value does not fit in 128 bits of base units.
    #[error("amount overflow")]
    Overflow,
}

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

/// A quantity of value in base units.
///
/// # Examples
///
/// ```
/// use custody_protocol::Amount;
///
/// let one_and_a_half = Amount::parse_coins("1.5").unwrap();
/// assert_eq!(one_and_a_half, Amount::from_coins(1).checked_add(Amount::parse_coins("0.5").unwrap()).unwrap());
/// assert_eq!(one_and_a_half.format_coins(), "1.5");
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Amount(u128);

impl Amount {
    /// Zero base units.
    pub const ZERO: Amount = Amount(0);

    /// The largest representable amount.
    pub const MAX: Amount = Amount(u128::MAX);

    /// Wraps a raw base-unit count.
    pub const fn from_units(units: u128) -> Self {
        Self(units)
    }

    /// Returns the raw base-unit count.
    pub const fn units(&self) -> u128 {
        self.0
    }

    /// Whole coins to base units.
    ///
    /// `u64` coins always fit: `u64::MAX * 10^18 < u128::MAX`.
    pub const fn from_coins(coins: u64) -> Self {
        Self(coins as u128 * UNITS_PER_COIN)
    }

    /// Parses a decimal coin amount such as `"2"`, `"1.5"` or `"0.000001"`.
    pub fn parse_coins(s: &str) -> Result<Self, AmountError> {
        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };

        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty())
            || !all_digits(whole)
            || !all_digits(frac)
            || (s.ends_with('.'))
        {
            return Err(AmountError::Invalid(s.to_string()));
        }

        if frac.len() > AMOUNT_DECIMALS as usize {
            return Err(AmountError::TooPrecise {
                got: frac.len(),
                max: AMOUNT_DECIMALS,
            });
        }

        let whole_units = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u128>()
                .map_err(|_| AmountError::Overflow)?
                .checked_mul(UNITS_PER_COIN)
                .ok_or(AmountError::Overflow)?
        };

        let frac_units = if frac.is_empty() {
            0
        } else {
            let scale = 10u128.pow(AMOUNT_DECIMALS - frac.len() as u32);
            // At most 18 digits, so this parse cannot overflow.
            frac.parse::<u128>()
                .map_err(|_| AmountError::Invalid(s.to_string()))?
                * scale
        };

        whole_units
            .checked_add(frac_units)
            .map(Self)
            .ok_or(AmountError::Overflow)
    }

    /// Renders the amount in whole coins, keeping at least one fractional
    /// digit: `"2.0"`, `"1.5"`, `"0.000000000000000001"`.
    pub fn format_coins(&self) -> String {
        let whole = self.0 / UNITS_PER_COIN;
        let frac = self.0 % UNITS_PER_COIN;
        let digits = format!("{:0>width$}", frac, width = AMOUNT_DECIMALS as usize);
        let trimmed = digits.trim_end_matches('0');
        if trimmed.is_empty() {
            format!("{}.0", whole)
        } else {
            format!("{}.{}", whole, trimmed)
        }
    }

    /// Formatted coins with the ticker, e.g. `"1.5 ETH"`.
    pub fn display_coins(&self) -> String {
        format!("{} {}", self.format_coins(), COIN_SYMBOL)
    }

    /// Approximate whole-coin value for gauges and dashboards. Lossy.
    pub fn as_coins_f64(&self) -> f64 {
        self.0 as f64 / UNITS_PER_COIN as f64
    }

    /// Returns `true` if this is zero base units.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// `self + rhs`, or `None` on overflow.
    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    /// `self - rhs`, or `None` if `rhs > self`.
    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({})", self.0)
    }
}

/// Parses a base-unit integer string. Use [`Amount::parse_coins`] for
/// decimal coin notation.
impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AmountError::Invalid(s.to_string()));
        }
        s.parse::<u128>().map(Amount).map_err(|_| AmountError::Overflow)
    }
}

impl From<u64> for Amount {
    fn from(units: u64) -> Self {
        Self(units as u128)
    }
}

impl Serialize for Amount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.0.to_string())
        } else {
            serializer.serialize_u128(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl serde::de::Visitor<'_> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a base-unit amount as a decimal string or integer")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Amount, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Amount, E> {
                Ok(Amount::from(v))
            }

            fn visit_u128<E: serde::de::Error>(self, v: u128) -> Result<Amount, E> {
                Ok(Amount(v))
            }
        }

        if deserializer.is_human_readable() {
            deserializer.deserialize_any(AmountVisitor)
        } else {
            deserializer.deserialize_u128(AmountVisitor)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
