//! Settlement applier: the state transition of a validated trade.

use chrono::Utc;
use tracing::{debug, info};

use marketsettle_common::{MarketError, Money, Result, SettlementReceipt, TradeId};
use marketsettle_ledger::{BankAccount, JournalBatch, JournalEntry, Participant, Product};
use marketsettle_registry::{CommitError, Registries};

use crate::validator::ResolvedTrade;

/// Post-images of every record one settlement writes.
#[derive(Debug, Clone)]
pub struct SettlementPlan {
    pub trade_id: TradeId,
    pub price: Money,
    pub product: Product,
    pub buyer_account: BankAccount,
    pub seller_account: BankAccount,
    /// Buyer and seller records, present when ownership history is kept.
    pub participants: Option<(Participant, Participant)>,
    pub journal: JournalBatch,
}

/// Computes and persists settlements.
pub struct SettlementApplier {
    registries: Registries,
}

impl SettlementApplier {
    pub fn new(registries: Registries) -> Self {
        Self { registries }
    }

    /// Compute the post-settlement records.
    ///
    /// Pure: the buyer pays the price to the seller, the product changes
    /// owner, and when `participants` is given the buyer's acquired and
    /// seller's sold lists are appended. Fails with `InvariantViolation` if
    /// money would not be conserved.
    pub fn plan(
        resolved: &ResolvedTrade,
        participants: Option<(Participant, Participant)>,
    ) -> Result<SettlementPlan> {
        let price = resolved.product.price.clone();

        let mut buyer_account = resolved.buyer_account.clone();
        let mut seller_account = resolved.seller_account.clone();
        buyer_account.debit(&price)?;
        seller_account.credit(&price)?;

        // Compared as per-account deltas so large balances cannot overflow a sum
        let paid = (resolved.buyer_account.balance.clone() - buyer_account.balance.clone())?;
        let received = (seller_account.balance.clone() - resolved.seller_account.balance.clone())?;
        if paid != price || received != price {
            return Err(MarketError::InvariantViolation(format!(
                "trade {} moves {} but buyer paid {} and seller received {}",
                resolved.trade_id, price, paid, received
            )));
        }

        let mut product = resolved.product.clone();
        product.transfer_to(&resolved.buyer);

        let participants = participants
            .map(|(buyer, seller)| record_history(resolved, buyer, seller))
            .transpose()?;

        let mut journal = JournalBatch::new(resolved.trade_id);
        journal.add_entry(JournalEntry::debit(
            resolved.trade_id,
            buyer_account.id.clone(),
            price.value,
            price.currency.clone(),
            buyer_account.balance.value,
        ));
        journal.add_entry(JournalEntry::credit(
            resolved.trade_id,
            seller_account.id.clone(),
            price.value,
            price.currency.clone(),
            seller_account.balance.value,
        ));
        if !journal.is_balanced() {
            return Err(MarketError::InvariantViolation(format!(
                "journal for trade {} is unbalanced",
                resolved.trade_id
            )));
        }

        debug!(
            trade_id = %resolved.trade_id,
            price = %price,
            buyer_balance = %buyer_account.balance,
            seller_balance = %seller_account.balance,
            "Settlement planned"
        );

        Ok(SettlementPlan {
            trade_id: resolved.trade_id,
            price,
            product,
            buyer_account,
            seller_account,
            participants,
            journal,
        })
    }

    /// Write the plan through one host transaction.
    ///
    /// Either every record is updated or, on failure, the host transaction
    /// has restored the ones already written.
    pub async fn apply(&self, plan: SettlementPlan) -> std::result::Result<SettlementReceipt, CommitError> {
        let SettlementPlan {
            trade_id,
            price,
            product,
            buyer_account,
            seller_account,
            participants,
            ..
        } = plan;

        let receipt_base = SettlementReceipt {
            trade_id,
            product: product.id.clone(),
            new_owner: product.owner.clone(),
            price,
            buyer_account: buyer_account.id.clone(),
            buyer_balance: buyer_account.balance.clone(),
            seller_account: seller_account.id.clone(),
            seller_balance: seller_account.balance.clone(),
            updated: Vec::new(),
            settled_at: Utc::now(),
        };

        let mut tx = self.registries.begin();
        tx.stage(product);
        tx.stage(buyer_account);
        tx.stage(seller_account);
        if let Some((buyer, seller)) = participants {
            tx.stage(buyer);
            tx.stage(seller);
        }

        let updated = tx.commit().await?;

        info!(trade_id = %trade_id, updated = updated.len(), "Settlement committed");

        Ok(SettlementReceipt {
            updated,
            settled_at: Utc::now(),
            ..receipt_base
        })
    }
}

fn record_history(
    resolved: &ResolvedTrade,
    mut buyer: Participant,
    mut seller: Participant,
) -> Result<(Participant, Participant)> {
    if buyer.id != resolved.buyer || seller.id != resolved.seller {
        return Err(MarketError::Internal(format!(
            "participant records {} / {} do not match trade {}",
            buyer.id, seller.id, resolved.trade_id
        )));
    }

    buyer.record_acquired(&resolved.product.id);
    seller.record_sold(&resolved.product.id);
    Ok((buyer, seller))
}
