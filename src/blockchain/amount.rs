use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use std::fmt;

/// Largest representable amount in hundredths. Kept below 2^53 so every value
/// survives the round trip through a JSON number.
pub const MAX_CENTS: u64 = 9_000_000_000_000_000;

/// Errors that can occur when parsing an amount
#[derive(Debug, Error, PartialEq)]
pub enum AmountError {
    #[error("Amount must be a finite number: {0}")]
    NotFinite(f64),

    #[error("Amount must not be negative: {0}")]
    Negative(f64),

    #[error("Amount is too large: {0}")]
    TooLarge(f64),

    #[error("Amount of {0} hundredths is out of range")]
    OutOfRange(u64),
}

/// A non-negative amount of coins with exactly two decimals.
///
/// Stored as an integer count of hundredths so that balance arithmetic and
/// the signed message rendering never drift apart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u64);

impl Amount {
    /// Creates an amount from a count of hundredths, up to `MAX_CENTS`
    pub fn from_cents(cents: u64) -> Result<Self, AmountError> {
        if cents > MAX_CENTS {
            return Err(AmountError::OutOfRange(cents));
        }
        Ok(Amount(cents))
    }

    /// Creates an amount from a whole number of coins; any `u32` fits
    pub fn from_whole(coins: u32) -> Self {
        Amount(u64::from(coins) * 100)
    }

    /// Parses a decimal value, rounding to the nearest hundredth
    pub fn from_decimal(value: f64) -> Result<Self, AmountError> {
        if !value.is_finite() {
            return Err(AmountError::NotFinite(value));
        }
        if value < 0.0 {
            return Err(AmountError::Negative(value));
        }

        Amount::from_cents((value * 100.0).round() as u64).map_err(|_| AmountError::TooLarge(value))
    }

    pub fn cents(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Amount::from_decimal(value).map_err(de::Error::custom)
    }
}

/// A signed balance in hundredths, as derived from replaying a chain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Balance(i64);

impl Balance {
    pub const ZERO: Balance = Balance(0);

    pub fn from_cents(cents: i64) -> Self {
        Balance(cents)
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    pub fn credit(self, amount: Amount) -> Balance {
        Balance(self.0.saturating_add(amount.cents() as i64))
    }

    /// Saturates at `i64::MIN`, so an overdrawn balance never wraps to positive
    pub fn debit(self, amount: Amount) -> Balance {
        Balance(self.0.saturating_sub(amount.cents() as i64))
    }

    /// Whether spending `amount` leaves the balance non-negative
    pub fn covers(self, amount: Amount) -> bool {
        self.0 >= amount.cents() as i64
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Serialize for Balance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_decimal_rounds_to_hundredths() {
        assert_eq!(Amount::from_decimal(12.345).unwrap().cents(), 1235);
        assert_eq!(Amount::from_decimal(50.0).unwrap().cents(), 5000);
        assert_eq!(Amount::from_decimal(0.1 + 0.2).unwrap().cents(), 30);
    }

    #[test]
    fn test_from_decimal_rejects_bad_values() {
        assert_eq!(Amount::from_decimal(-1.0), Err(AmountError::Negative(-1.0)));
        assert!(matches!(Amount::from_decimal(f64::NAN), Err(AmountError::NotFinite(_))));
        assert!(matches!(Amount::from_decimal(1e20), Err(AmountError::TooLarge(_))));
    }

    #[test]
    fn test_display_uses_two_decimals() {
        assert_eq!(Amount::from_whole(50).to_string(), "50.00");
        assert_eq!(Amount::from_cents(1205).unwrap().to_string(), "12.05");
        assert_eq!(Balance::from_cents(-5).to_string(), "-0.05");
    }

    #[test]
    fn test_json_round_trip() {
        let amount: Amount = serde_json::from_str("12.5").unwrap();
        assert_eq!(amount.cents(), 1250);
        assert_eq!(serde_json::to_string(&amount).unwrap(), "12.5");
        assert!(serde_json::from_str::<Amount>("-3").is_err());
    }

    #[test]
    fn test_balance_covers() {
        let balance = Balance::ZERO.credit(Amount::from_whole(100));
        assert!(balance.covers(Amount::from_whole(100)));
        assert!(!balance.covers(Amount::from_cents(10_001).unwrap()));
        assert!(balance.debit(Amount::from_whole(150)).is_negative());
    }

    #[test]
    fn test_from_cents_rejects_out_of_range() {
        assert_eq!(Amount::from_cents(MAX_CENTS).unwrap().cents(), MAX_CENTS);
        assert_eq!(Amount::from_cents(MAX_CENTS + 1), Err(AmountError::OutOfRange(MAX_CENTS + 1)));
        assert_eq!(Amount::from_whole(u32::MAX).cents(), u64::from(u32::MAX) * 100);
    }

    #[test]
    fn test_debit_never_wraps() {
        let max = Amount::from_cents(MAX_CENTS).unwrap();
        let mut balance = Balance::ZERO;
        for _ in 0..2_000 {
            balance = balance.debit(max);
        }
        assert_eq!(balance, Balance::from_cents(i64::MIN));
        assert!(!balance.covers(Amount::from_whole(1)));
    }
}
