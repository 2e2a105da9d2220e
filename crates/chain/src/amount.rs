//! Arbitrary-precision token amounts and fixed-point fractions.
//!
//! `Amount` is persisted as a base-10 string so stored records stay readable
//! and never lose precision. `Dec` carries 18 fractional digits and cannot be
//! negative.

use crate::error::{LedgerError, Result};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

/// Number of fractional digits held by `Dec`.
pub const DEC_PRECISION: u32 = 18;

fn dec_scale() -> BigUint {
    BigUint::from(10u64).pow(DEC_PRECISION)
}

// ════════════════════════════════════════════════════════════════════════════
// AMOUNT
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(BigUint);

impl Amount {
    pub fn zero() -> Self { Amount(BigUint::zero()) }
    pub fn is_zero(&self) -> bool { self.0.is_zero() }
    pub fn as_biguint(&self) -> &BigUint { &self.0 }

    /// Subtraction that fails instead of wrapping below zero.
    pub fn checked_sub(&self, rhs: &Amount) -> Option<Amount> {
        if self.0 < rhs.0 {
            None
        } else {
            Some(Amount(&self.0 - &rhs.0))
        }
    }

    /// Token amount of `power` units of voting power.
    /// Negative power carries no stake.
    pub fn from_power(power: i64, power_reduction: &Amount) -> Amount {
        if power <= 0 {
            return Amount::zero();
        }
        Amount(BigUint::from(power as u64) * &power_reduction.0)
    }

    /// Voting power represented by this amount, truncating.
    pub fn to_power(&self, power_reduction: &Amount) -> i64 {
        if power_reduction.is_zero() {
            return 0;
        }
        (&self.0 / &power_reduction.0).to_i64().unwrap_or(i64::MAX)
    }
}

impl From<u64> for Amount {
    fn from(v: u64) -> Self { Amount(BigUint::from(v)) }
}

impl From<u128> for Amount {
    fn from(v: u128) -> Self { Amount(BigUint::from(v)) }
}

impl From<BigUint> for Amount {
    fn from(v: BigUint) -> Self { Amount(v) }
}

impl FromStr for Amount {
    type Err = LedgerError;

    /// Only plain ASCII digits are accepted: no sign, no separators.
    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(LedgerError::invalid(format!("malformed amount: {:?}", s)));
        }
        BigUint::parse_bytes(s.as_bytes(), 10)
            .map(Amount)
            .ok_or_else(|| LedgerError::invalid(format!("malformed amount: {:?}", s)))
    }
}

impl Add for Amount {
    type Output = Amount;
    fn add(self, rhs: Amount) -> Amount { Amount(self.0 + rhs.0) }
}

impl<'a> Add<&'a Amount> for &'a Amount {
    type Output = Amount;
    fn add(self, rhs: &'a Amount) -> Amount { Amount(&self.0 + &rhs.0) }
}

impl AddAssign<&Amount> for Amount {
    fn add_assign(&mut self, rhs: &Amount) { self.0 += &rhs.0; }
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

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where S: Serializer {
        serializer.serialize_str(&self.0.to_str_radix(10))
    }
}
impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Amount, D::Error>
    where D: Deserializer<'de> {
        let s = String::deserialize(deserializer)?;
        Amount::from_str(&s).map_err(serde::de::Error::custom)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// DEC
// ════════════════════════════════════════════════════════════════════════════

/// Non-negative decimal with 18 fractional digits, stored as a scaled integer.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Dec(BigUint);

impl Dec {
    pub fn zero() -> Self { Dec(BigUint::zero()) }
    pub fn one() -> Self { Dec(dec_scale()) }

    /// Build from the raw scaled integer (`1e18` == 1.0).
    pub fn from_raw(raw: u64) -> Self { Dec(BigUint::from(raw)) }

    pub fn is_zero(&self) -> bool { self.0.is_zero() }

    /// `trunc(amount × self)`
    pub fn mul_trunc(&self, amount: &Amount) -> Amount {
        Amount(&amount.0 * &self.0 / dec_scale())
    }

    /// `round(n × self)`, halves rounded up.
    pub fn mul_round_u64(&self, n: u64) -> u64 {
        let scale = dec_scale();
        let half = &scale / BigUint::from(2u64);
        ((BigUint::from(n) * &self.0 + half) / scale)
            .to_u64()
            .unwrap_or(u64::MAX)
    }
}

impl FromStr for Dec {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || LedgerError::invalid(format!("malformed decimal: {:?}", s));
        if s.starts_with('-') {
            return Err(LedgerError::invalid(format!("negative decimal: {}", s)));
        }
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(bad());
        }
        let digits_ok = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
        if !digits_ok(int_part) || !digits_ok(frac_part) {
            return Err(bad());
        }
        if frac_part.len() > DEC_PRECISION as usize {
            return Err(LedgerError::invalid(format!(
                "decimal {} exceeds {} fractional digits",
                s, DEC_PRECISION
            )));
        }
        let mut padded = String::with_capacity(int_part.len() + DEC_PRECISION as usize);
        padded.push_str(if int_part.is_empty() { "0" } else { int_part });
        padded.push_str(frac_part);
        for _ in frac_part.len()..DEC_PRECISION as usize {
            padded.push('0');
        }
        BigUint::parse_bytes(padded.as_bytes(), 10).map(Dec).ok_or_else(bad)
    }
}

impl fmt::Display for Dec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = dec_scale();
        let int = &self.0 / &scale;
        let frac = &self.0 % &scale;
        write!(f, "{}.{:0>18}", int, frac.to_str_radix(10))
    }
}
impl fmt::Debug for Dec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dec({})", self)
    }
}

impl Serialize for Dec {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where S: Serializer {
        serializer.serialize_str(&self.to_string())
    }
}
impl<'de> Deserialize<'de> for Dec {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Dec, D::Error>
    where D: Deserializer<'de> {
        let s = String::deserialize(deserializer)?;
        Dec::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(s: &str) -> Amount { Amount::from_str(s).unwrap() }
    fn dec(s: &str) -> Dec { Dec::from_str(s).unwrap() }

    #[test]
    fn test_amount_exact_addition() {
        assert_eq!((amt("5") + amt("8")).to_string(), "13");
        let big = amt("340282366920938463463374607431768211456");
        assert_eq!((&big + &amt("1")).to_string(), "340282366920938463463374607431768211457");
    }

    #[test]
    fn test_amount_rejects_non_digits() {
        assert!(Amount::from_str("").is_err());
        assert!(Amount::from_str("-5").is_err());
        assert!(Amount::from_str("1e3").is_err());
        assert!(Amount::from_str("12 ").is_err());
    }

    #[test]
    fn test_amount_checked_sub() {
        assert_eq!(amt("10").checked_sub(&amt("4")), Some(amt("6")));
        assert_eq!(amt("4").checked_sub(&amt("10")), None);
    }

    #[test]
    fn test_power_conversion() {
        let reduction = amt("1000000000000000000");
        let a = Amount::from_power(100, &reduction);
        assert_eq!(a.to_string(), "100000000000000000000");
        assert_eq!(a.to_power(&reduction), 100);
        // truncates partial units
        assert_eq!(amt("1999999999999999999").to_power(&reduction), 1);
        assert!(Amount::from_power(-3, &reduction).is_zero());
    }

    #[test]
    fn test_dec_parse_and_display() {
        assert_eq!(dec("0.10").to_string(), "0.100000000000000000");
        assert_eq!(dec("1").to_string(), "1.000000000000000000");
        assert_eq!(dec(".5"), dec("0.5"));
        assert_eq!(dec("0.5"), Dec::from_raw(500_000_000_000_000_000));
    }

    #[test]
    fn test_dec_rejects_negative_and_garbage() {
        assert!(Dec::from_str("-0.1").is_err());
        assert!(Dec::from_str("abc").is_err());
        assert!(Dec::from_str(".").is_err());
        assert!(Dec::from_str("0.1234567890123456789").is_err());
    }

    #[test]
    fn test_dec_mul_trunc() {
        assert_eq!(dec("0.10").mul_trunc(&amt("100")), amt("10"));
        assert_eq!(dec("0.333333333333333333").mul_trunc(&amt("10")), amt("3"));
        assert_eq!(dec("0.01").mul_trunc(&amt("99")), amt("0"));
    }

    #[test]
    fn test_dec_mul_round() {
        assert_eq!(dec("0.5").mul_round_u64(100), 50);
        assert_eq!(dec("0.5").mul_round_u64(5), 3);
        assert_eq!(dec("0.05").mul_round_u64(10), 1);
    }
}
