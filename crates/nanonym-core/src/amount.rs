//! Ledger amounts in raw units.
//!
//! The ledger's total supply is below 2^128 raw, so a `u128` holds any
//! balance exactly. Amounts always travel as decimal strings.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::str::FromStr;

use crate::constants::{RAW_PER_XNO, XNO_DECIMALS};
use crate::error::AmountError;

/// An amount in raw (1 XNO = 10^30 raw).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Raw(pub u128);

impl Raw {
    pub const ZERO: Raw = Raw(0);

    /// Whole XNO amount. Fails past `u128::MAX` raw (about 3.4 * 10^8 XNO).
    pub fn xno(whole: u64) -> Result<Self, AmountError> {
        u128::from(whole)
            .checked_mul(RAW_PER_XNO)
            .map(Raw)
            .ok_or(AmountError::Overflow)
    }

    /// Parse a decimal XNO string such as `"1.25"`.
    pub fn from_xno_str(s: &str) -> Result<Self, AmountError> {
        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(AmountError::Invalid(s.to_string()));
        }
        if frac.len() > XNO_DECIMALS {
            return Err(AmountError::Invalid(format!("more than {XNO_DECIMALS} decimals")));
        }
        let all_digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
        if !all_digits(whole) || !all_digits(frac) {
            return Err(AmountError::Invalid(s.to_string()));
        }

        let whole_raw = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u128>()
                .map_err(|_| AmountError::Overflow)?
                .checked_mul(RAW_PER_XNO)
                .ok_or(AmountError::Overflow)?
        };
        let frac_raw = if frac.is_empty() {
            0
        } else {
            let padded = format!("{frac:0<width$}", width = XNO_DECIMALS);
            padded.parse::<u128>().map_err(|_| AmountError::Overflow)?
        };
        whole_raw
            .checked_add(frac_raw)
            .map(Raw)
            .ok_or(AmountError::Overflow)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Raw) -> Option<Raw> {
        self.0.checked_add(other.0).map(Raw)
    }

    pub fn checked_sub(self, other: Raw) -> Option<Raw> {
        self.0.checked_sub(other.0).map(Raw)
    }

    pub fn saturating_add(self, other: Raw) -> Raw {
        Raw(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Raw) -> Raw {
        Raw(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Raw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Raw {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(AmountError::Invalid(s.to_string()));
        }
        s.parse::<u128>().map(Raw).map_err(|_| AmountError::Overflow)
    }
}

impl From<u128> for Raw {
    fn from(v: u128) -> Self {
        Raw(v)
    }
}

impl Sum for Raw {
    fn sum<I: Iterator<Item = Raw>>(iter: I) -> Self {
        iter.fold(Raw::ZERO, Raw::saturating_add)
    }
}

impl Serialize for Raw {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Raw {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
