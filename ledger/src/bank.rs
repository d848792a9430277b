//! Bank records.

use marketsettle_common::{AccountId, BankId};
use serde::{Deserialize, Serialize};

/// A bank indexes accounts; it does not own their balances.
///
/// Account order is significant: the validator resolves the first account
/// of each participant in this order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bank {
    pub id: BankId,
    pub name: String,
    #[serde(default)]
    pub accounts: Vec<AccountId>,
}

impl Bank {
    /// Create a bank with no accounts.
    pub fn new(id: impl Into<BankId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            accounts: Vec::new(),
        }
    }

    /// Builder-style account linking.
    pub fn with_accounts<I, A>(mut self, accounts: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<AccountId>,
    {
        for account in accounts {
            self.link(account.into());
        }
        self
    }

    /// Append an account reference. Returns `false` if already linked.
    pub fn link(&mut self, account: AccountId) -> bool {
        if self.holds(&account) {
            return false;
        }
        self.accounts.push(account);
        true
    }

    pub fn holds(&self, account: &AccountId) -> bool {
        self.accounts.contains(account)
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
