//! Market setup loaded into registries at startup.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::info;

use marketsettle_common::{EntityRef, Money, MoneyError};
use marketsettle_ledger::{Bank, BankAccount, Participant, Product};

use crate::entity::Entity;
use crate::error::{RegistryError, RegistryResult};
use crate::registry::Registries;

/// Participants, banks, accounts and products making up a market.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub banks: Vec<Bank>,
    #[serde(default)]
    pub accounts: Vec<BankAccount>,
    #[serde(default)]
    pub products: Vec<Product>,
}

impl Fixture {
    /// Parse a fixture from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Check identifiers and cross-record links.
    ///
    /// Every account a bank lists must exist and link back to that bank,
    /// balances must be non-negative, prices positive, and product owners
    /// must be known participants.
    pub fn verify(&self) -> RegistryResult<()> {
        let invalid = |entity: EntityRef, reason: &str| RegistryError::InvalidEntity {
            entity,
            reason: reason.to_string(),
        };

        let participants: HashSet<_> = self.participants.iter().map(|p| &p.id).collect();
        let accounts: HashMap<_, _> = self.accounts.iter().map(|a| (&a.id, a)).collect();

        for participant in &self.participants {
            if !participant.id.is_valid() {
                return Err(invalid(participant.entity_ref(), "malformed identifier"));
            }
        }

        for account in &self.accounts {
            if !account.id.is_valid() {
                return Err(invalid(account.entity_ref(), "malformed identifier"));
            }
            if account.balance.is_negative() {
                return Err(invalid(account.entity_ref(), "negative balance"));
            }
            if !participants.contains(&account.owner) {
                return Err(invalid(account.entity_ref(), "owner is not a known participant"));
            }
        }

        for bank in &self.banks {
            if !bank.id.is_valid() {
                return Err(invalid(bank.entity_ref(), "malformed identifier"));
            }
            for account_id in &bank.accounts {
                match accounts.get(account_id) {
                    None => return Err(RegistryError::NotFound(BankAccount::ref_for(account_id))),
                    Some(account) if !account.belongs_to(&bank.id) => {
                        return Err(invalid(account.entity_ref(), "does not link back to its bank"))
                    }
                    Some(_) => {}
                }
            }
        }

        for product in &self.products {
            if !product.id.is_valid() {
                return Err(invalid(product.entity_ref(), "malformed identifier"));
            }
            if !product.price.is_positive() {
                return Err(invalid(product.entity_ref(), "price must be positive"));
            }
            if !participants.contains(&product.owner) {
                return Err(invalid(product.entity_ref(), "owner is not a known participant"));
            }
        }

        Ok(())
    }

    /// Verify, then add every record to the registries.
    pub async fn load_into(&self, registries: &Registries) -> RegistryResult<()> {
        self.verify()?;

        registries.participants.add_all(self.participants.clone()).await?;
        registries.accounts.add_all(self.accounts.clone()).await?;
        registries.banks.add_all(self.banks.clone()).await?;
        registries.products.add_all(self.products.clone()).await?;

        info!(
            participants = self.participants.len(),
            banks = self.banks.len(),
            accounts = self.accounts.len(),
            products = self.products.len(),
            "Fixture loaded"
        );
        Ok(())
    }

    /// Sum of all account balances per currency code.
    pub fn total_money(&self) -> Result<HashMap<String, Money>, MoneyError> {
        total_money(&self.accounts)
    }
}

/// Sum balances per currency code. Fails if a total leaves the decimal range.
pub fn total_money(accounts: &[BankAccount]) -> Result<HashMap<String, Money>, MoneyError> {
    let mut totals: HashMap<String, Money> = HashMap::new();
    for account in accounts {
        let code = account.currency().code().to_string();
        let total = match totals.remove(&code) {
            Some(sum) => (sum + account.balance.clone())?,
            None => account.balance.clone(),
        };
        totals.insert(code, total);
    }
    Ok(totals)
}
