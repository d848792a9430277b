//! Journal entry types for double-entry bookkeeping.

use marketsettle_common::{AccountId, Currency, TradeId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type of journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    /// Money leaves the account.
    Debit,
    /// Money enters the account.
    Credit,
}

/// A single journal entry in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Unique entry ID.
    pub id: Uuid,
    /// Trade this entry belongs to.
    pub trade_id: TradeId,
    /// Account affected.
    pub account_id: AccountId,
    /// Entry type (debit or credit).
    pub entry_type: EntryType,
    /// Amount.
    pub amount: Decimal,
    /// Currency.
    pub currency: Currency,
    /// Balance after this entry.
    pub balance_after: Decimal,
    /// When this entry was created.
    pub created_at: DateTime<Utc>,
}

impl JournalEntry {
    /// Create a debit entry.
    pub fn debit(
        trade_id: TradeId,
        account_id: AccountId,
        amount: Decimal,
        currency: Currency,
        balance_after: Decimal,
    ) -> Self {
        Self::new(trade_id, account_id, EntryType::Debit, amount, currency, balance_after)
    }

    /// Create a credit entry.
    pub fn credit(
        trade_id: TradeId,
        account_id: AccountId,
        amount: Decimal,
        currency: Currency,
        balance_after: Decimal,
    ) -> Self {
        Self::new(trade_id, account_id, EntryType::Credit, amount, currency, balance_after)
    }

    fn new(
        trade_id: TradeId,
        account_id: AccountId,
        entry_type: EntryType,
        amount: Decimal,
        currency: Currency,
        balance_after: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            trade_id,
            account_id,
            entry_type,
            amount,
            currency,
            balance_after,
            created_at: Utc::now(),
        }
    }

    /// Signed effect on the account balance.
    pub fn signed_amount(&self) -> Decimal {
        match self.entry_type {
            EntryType::Debit => -self.amount,
            EntryType::Credit => self.amount,
        }
    }
}

/// A batch of journal entries that must be committed together.
#[derive(Debug, Clone)]
pub struct JournalBatch {
    /// Entries in the batch.
    pub entries: Vec<JournalEntry>,
    /// Trade ID for the batch.
    pub trade_id: TradeId,
}

impl JournalBatch {
    /// Create a new batch.
    pub fn new(trade_id: TradeId) -> Self {
        Self {
            entries: Vec::new(),
            trade_id,
        }
    }

    /// Add an entry to the batch.
    pub fn add_entry(&mut self, entry: JournalEntry) {
        self.entries.push(entry);
    }

    /// Verify the batch is balanced (debits == credits per currency).
    pub fn is_balanced(&self) -> bool {
        use std::collections::HashMap;

        let mut balances: HashMap<&str, Decimal> = HashMap::new();

        for entry in &self.entries {
            *balances
                .entry(entry.currency.code())
                .or_insert(Decimal::ZERO) += entry.signed_amount();
        }

        balances.values().all(|balance| balance.is_zero())
    }

    /// Get total debits.
    pub fn total_debits(&self) -> Decimal {
        self.entries
            .iter()
            .filter(|e| e.entry_type == EntryType::Debit)
            .map(|e| e.amount)
            .sum()
    }

    /// Get total credits.
    pub fn total_credits(&self) -> Decimal {
        self.entries
            .iter()
            .filter(|e| e.entry_type == EntryType::Credit)
            .map(|e| e.amount)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_balanced_batch() {
        let trade_id = TradeId::new();
        let mut batch = JournalBatch::new(trade_id);

        batch.add_entry(JournalEntry::debit(
            trade_id,
            AccountId::new("alice_account"),
            dec!(500),
            Currency::usd(),
            dec!(500),
        ));
        batch.add_entry(JournalEntry::credit(
            trade_id,
            AccountId::new("bob_account"),
            dec!(500),
            Currency::usd(),
            dec!(500),
        ));

        assert!(batch.is_balanced());
        assert_eq!(batch.total_debits(), dec!(500));
        assert_eq!(batch.total_credits(), dec!(500));
    }

    #[test]
    fn test_unbalanced_batch() {
        let trade_id = TradeId::new();
        let mut batch = JournalBatch::new(trade_id);

        batch.add_entry(JournalEntry::debit(
            trade_id,
            AccountId::new("alice_account"),
            dec!(500),
            Currency::usd(),
            dec!(500),
        ));

        assert!(!batch.is_balanced());
    }

    #[test]
    fn test_currencies_balance_separately() {
        let trade_id = TradeId::new();
        let mut batch = JournalBatch::new(trade_id);

        batch.add_entry(JournalEntry::debit(
            trade_id,
            AccountId::new("a"),
            dec!(10),
            Currency::usd(),
            dec!(0),
        ));
        batch.add_entry(JournalEntry::credit(
            trade_id,
            AccountId::new("b"),
            dec!(10),
            Currency::eur(),
            dec!(10),
        ));

        assert!(!batch.is_balanced());
    }
}
