//! Monetary types for MarketSettle.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// A monetary amount with currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// The amount value (high precision decimal).
    pub value: Decimal,
    /// ISO 4217 currency code.
    pub currency: Currency,
}

impl Money {
    /// Create a new Money instance.
    pub fn new(value: Decimal, currency: Currency) -> Self {
        Self { value, currency }
    }

    /// Create from a string value.
    pub fn from_str(value: &str, currency: Currency) -> Result<Self, rust_decimal::Error> {
        Ok(Self {
            value: value.parse()?,
            currency,
        })
    }

    /// Create a zero amount in the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self {
            value: Decimal::ZERO,
            currency,
        }
    }

    /// Check if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.value > Decimal::ZERO
    }

    /// Check if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// Check if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.value < Decimal::ZERO
    }

    /// Check whether this amount covers `other` (same currency, `self >= other`).
    pub fn covers(&self, other: &Money) -> Result<bool, CurrencyMismatchError> {
        self.ensure_same_currency(other)?;
        Ok(self.value >= other.value)
    }

    /// Fail unless `other` is in the same currency.
    pub fn ensure_same_currency(&self, other: &Money) -> Result<(), CurrencyMismatchError> {
        if self.currency != other.currency {
            return Err(CurrencyMismatchError {
                expected: self.currency.clone(),
                actual: other.currency.clone(),
            });
        }
        Ok(())
    }

    /// Round to the currency's standard decimal places.
    pub fn round(&self) -> Self {
        let places = self.currency.decimal_places();
        Self {
            value: self.value.round_dp(places),
            currency: self.currency.clone(),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.currency)
    }
}

impl Add for Money {
    type Output = Result<Money, MoneyError>;

    fn add(self, other: Money) -> Self::Output {
        self.ensure_same_currency(&other)?;
        let value = self
            .value
            .checked_add(other.value)
            .ok_or_else(|| MoneyError::Overflow {
                left: self.clone(),
                op: '+',
                right: other.clone(),
            })?;
        Ok(Money {
            value,
            currency: self.currency,
        })
    }
}

impl Sub for Money {
    type Output = Result<Money, MoneyError>;

    fn sub(self, other: Money) -> Self::Output {
        self.ensure_same_currency(&other)?;
        let value = self
            .value
            .checked_sub(other.value)
            .ok_or_else(|| MoneyError::Overflow {
                left: self.clone(),
                op: '-',
                right: other.clone(),
            })?;
        Ok(Money {
            value,
            currency: self.currency,
        })
    }
}

/// Failure of a monetary operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error(transparent)]
    CurrencyMismatch(#[from] CurrencyMismatchError),

    /// Result does not fit in a `Decimal`.
    #[error("Amount overflow: {left} {op} {right}")]
    Overflow { left: Money, op: char, right: Money },
}

/// Error when attempting operations on different currencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyMismatchError {
    pub expected: Currency,
    pub actual: Currency,
}

impl fmt::Display for CurrencyMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Currency mismatch: expected {}, got {}",
            self.expected, self.actual
        )
    }
}

impl std::error::Error for CurrencyMismatchError {}

/// ISO 4217 currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Create a new currency from code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_uppercase())
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Get the standard decimal places for this currency.
    pub fn decimal_places(&self) -> u32 {
        match self.0.as_str() {
            "JPY" | "KRW" | "VND" => 0,
            "BHD" | "KWD" | "OMR" => 3,
            _ => 2,
        }
    }

    /// Common currencies
    pub fn usd() -> Self {
        Self::new("USD")
    }

    pub fn eur() -> Self {
        Self::new("EUR")
    }

    pub fn jpy() -> Self {
        Self::new("JPY")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Currency {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Currency {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}
