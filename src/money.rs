//! Fixed-point monetary amounts.
//!
//! All amounts carry exactly two fractional digits. They are stored in the
//! database as integer cents and serialised to JSON as decimal strings, e.g.
//! `"50.00"`. Floating-point arithmetic is never used for balances.

use std::fmt::Display;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Error;

/// The number of fractional digits in every amount.
const SCALE: u32 = 2;

/// The largest magnitude an amount or balance may have, 9,999,999,999.99.
const MAX_CENTS: i64 = 999_999_999_999;

/// An amount of money with two fractional digits, held as whole cents.
///
/// To create a `Money` from user input, use [Money::new], which rejects
/// amounts with more than two fractional digits or a magnitude above
/// 9,999,999,999.99. Arithmetic goes through [Money::checked_add] and
/// [Money::checked_sub], which keep results inside the same range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(i64);

impl Money {
    /// Create an amount from a decimal.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidInput] if `amount` has more than two
    /// significant fractional digits or its magnitude is above
    /// 9,999,999,999.99.
    pub fn new(amount: Decimal) -> Result<Self, Error> {
        let mut amount = amount.normalize();

        if amount.scale() > SCALE {
            return Err(Error::InvalidInput(format!(
                "the amount {amount} has more than {SCALE} decimal places"
            )));
        }

        amount.rescale(SCALE);

        i64::try_from(amount.mantissa())
            .ok()
            .and_then(Self::checked_from_cents)
            .ok_or_else(|| Error::InvalidInput(format!("the amount {amount} is too large")))
    }

    /// Create an amount from a whole number of cents.
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    fn checked_from_cents(cents: i64) -> Option<Self> {
        (-MAX_CENTS..=MAX_CENTS).contains(&cents).then_some(Self(cents))
    }

    /// The amount of zero.
    pub fn zero() -> Self {
        Self(0)
    }

    /// The amount as a whole number of cents.
    pub fn as_cents(&self) -> i64 {
        self.0
    }

    /// Whether the amount is strictly greater than zero.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// The amount as a decimal with two fractional digits.
    pub fn as_decimal(&self) -> Decimal {
        Decimal::new(self.0, SCALE)
    }

    /// Add two amounts, returning `None` if the sum is out of range.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).and_then(Self::checked_from_cents)
    }

    /// Subtract `rhs`, returning `None` if the difference is out of range.
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).and_then(Self::checked_from_cents)
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_decimal().fmt(f)
    }
}

impl Serialize for Money {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let amount = <Decimal as Deserialize>::deserialize(deserializer)?;
        Money::new(amount).map_err(serde::de::Error::custom)
    }
}

impl ToSql for Money {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}

impl FromSql for Money {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let cents = value.as_i64()?;
        Money::checked_from_cents(cents).ok_or(FromSqlError::OutOfRange(cents))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use crate::{Error, money::Money};

    #[test]
    fn new_pads_to_two_decimal_places() {
        let money = Money::new(dec!(50)).unwrap();

        assert_eq!(money.to_string(), "50.00");
        assert_eq!(money.as_cents(), 5000);
    }

    #[test]
    fn new_accepts_trailing_zeros_beyond_two_places() {
        let money = Money::new(dec!(1.2300)).unwrap();

        assert_eq!(money, Money::from_cents(123));
    }

    #[test]
    fn new_rejects_fractions_of_a_cent() {
        let result = Money::new(dec!(0.001));

        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn new_accepts_largest_amount() {
        let largest = Money::new(dec!(9999999999.99)).unwrap();
        let smallest = Money::new(dec!(-9999999999.99)).unwrap();

        assert_eq!(largest.as_cents(), 999_999_999_999);
        assert_eq!(smallest.as_cents(), -999_999_999_999);
    }

    #[test]
    fn new_rejects_amounts_too_large() {
        for amount in [
            dec!(10000000000.00),
            dec!(-10000000000.00),
            dec!(92233720368547758.07),
        ] {
            let result = Money::new(amount);

            assert!(
                matches!(result, Err(Error::InvalidInput(_))),
                "{amount} should be rejected, got {result:?}"
            );
        }
    }

    #[test]
    fn arithmetic_is_exact() {
        let total = (0..1000).fold(Money::zero(), |total, _| {
            total.checked_add(Money::from_cents(10)).unwrap()
        });

        assert_eq!(total, Money::from_cents(10_000));
        assert_eq!(
            total.checked_sub(Money::from_cents(10_001)),
            Some(Money::from_cents(-1))
        );
    }

    #[test]
    fn arithmetic_out_of_range_is_none() {
        let largest = Money::from_cents(999_999_999_999);

        assert_eq!(largest.checked_add(Money::from_cents(1)), None);
        assert_eq!(
            Money::from_cents(-999_999_999_999).checked_sub(Money::from_cents(1)),
            None
        );
        assert_eq!(Money::from_cents(i64::MAX).checked_add(largest), None);
        assert_eq!(largest.checked_sub(largest), Some(Money::zero()));
    }

    #[test]
    fn deserialises_from_string_and_number() {
        let from_string: Money = serde_json::from_str(r#""12.30""#).unwrap();
        let from_number: Money = serde_json::from_str("12.3").unwrap();

        assert_eq!(from_string, Money::from_cents(1230));
        assert_eq!(from_number, Money::from_cents(1230));
    }

    #[test]
    fn deserialise_rejects_fractions_of_a_cent() {
        let result = serde_json::from_str::<Money>(r#""1.005""#);

        assert!(result.is_err());
    }

    #[test]
    fn deserialise_rejects_amounts_too_large() {
        let result = serde_json::from_str::<Money>(r#""92233720368547758.07""#);

        assert!(result.is_err());
    }

    #[test]
    fn serialises_as_decimal_string() {
        let json = serde_json::to_string(&Money::from_cents(-2000)).unwrap();

        assert_eq!(json, r#""-20.00""#);
    }
}
