//! Bank account records.

use marketsettle_common::{AccountId, BankId, Currency, MarketError, Money, ParticipantId, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A monetary account owned by exactly one participant and indexed by one
/// bank. The balance never goes below zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccount {
    /// Unique account identifier.
    pub id: AccountId,
    /// Owning participant.
    pub owner: ParticipantId,
    /// Bank indexing this account.
    pub bank: BankId,
    /// Current balance.
    pub balance: Money,
    /// When the account was last updated.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl BankAccount {
    /// Create a new account.
    pub fn new(
        id: impl Into<AccountId>,
        owner: impl Into<ParticipantId>,
        bank: impl Into<BankId>,
        balance: Money,
    ) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            bank: bank.into(),
            balance,
            updated_at: Utc::now(),
        }
    }

    /// Account currency.
    pub fn currency(&self) -> &Currency {
        &self.balance.currency
    }

    /// Ownership check by identifier.
    pub fn is_owned_by(&self, participant: &ParticipantId) -> bool {
        &self.owner == participant
    }

    /// Back-link check by identifier.
    pub fn belongs_to(&self, bank: &BankId) -> bool {
        &self.bank == bank
    }

    /// Withdraw `amount`. Refused if the balance would go negative.
    pub fn debit(&mut self, amount: &Money) -> Result<()> {
        if !self.balance.covers(amount)? {
            return Err(MarketError::InsufficientFunds {
                required: amount.clone(),
                available: self.balance.clone(),
            });
        }
        self.balance = (self.balance.clone() - amount.clone())?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Deposit `amount`.
    pub fn credit(&mut self, amount: &Money) -> Result<()> {
        if amount.is_negative() {
            return Err(MarketError::InvariantViolation(format!(
                "negative credit {} on account {}",
                amount, self.id
            )));
        }
        self.balance = (self.balance.clone() + amount.clone())?;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn usd(value: rust_decimal::Decimal) -> Money {
        Money::new(value, Currency::usd())
    }

    #[test]
    fn test_debit_and_credit() {
        let mut account = BankAccount::new("alice_account", "alice", "bank", usd(dec!(1000)));

        account.debit(&usd(dec!(500))).unwrap();
        assert_eq!(account.balance, usd(dec!(500)));

        account.credit(&usd(dec!(250))).unwrap();
        assert_eq!(account.balance, usd(dec!(750)));
    }

    #[test]
    fn test_debit_never_goes_negative() {
        let mut account = BankAccount::new("alice_account", "alice", "bank", usd(dec!(100)));

        let err = account.debit(&usd(dec!(500))).unwrap_err();
        assert_eq!(err.error_code(), "INSUFFICIENT_FUNDS");
        assert_eq!(account.balance, usd(dec!(100)));

        // Exact balance is allowed
        account.debit(&usd(dec!(100))).unwrap();
        assert!(account.balance.is_zero());
    }

    #[test]
    fn test_currency_mismatch_refused() {
        let mut account = BankAccount::new("alice_account", "alice", "bank", usd(dec!(100)));
        let err = account
            .credit(&Money::new(dec!(1), Currency::eur()))
            .unwrap_err();
        assert_eq!(err.error_code(), "CURRENCY_MISMATCH");
    }

    #[test]
    fn test_credit_overflow_refused() {
        let mut account =
            BankAccount::new("bob_account", "bob", "bank", usd(rust_decimal::Decimal::MAX));

        let err = account.credit(&usd(dec!(1))).unwrap_err();
        assert_eq!(err.error_code(), "AMOUNT_OVERFLOW");
        assert_eq!(account.balance, usd(rust_decimal::Decimal::MAX));
    }

    #[test]
    fn test_ownership_by_identifier() {
        let account = BankAccount::new("bob_account", "bob", "bank", usd(dec!(0)));
        assert!(account.is_owned_by(&ParticipantId::new(String::from("bob"))));
        assert!(!account.is_owned_by(&ParticipantId::new("alice")));
        assert!(account.belongs_to(&BankId::new("bank")));
    }
}
