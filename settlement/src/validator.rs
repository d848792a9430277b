//! Trade validation: bind a trade to concrete accounts and check it can settle.

use tracing::debug;

use marketsettle_common::{BankId, MarketError, ParticipantId, Result, Trade, TradeId};
use marketsettle_ledger::{Bank, BankAccount, Product};

use crate::config::SettlementConfig;

/// Consistent view of the records one trade reads.
#[derive(Debug, Clone)]
pub struct TradeSnapshot {
    pub bank: Bank,
    /// The bank's accounts, in the bank's collection order.
    pub accounts: Vec<BankAccount>,
    pub product: Product,
}

/// A validated trade bound to concrete accounts and product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTrade {
    pub trade_id: TradeId,
    pub buyer: ParticipantId,
    pub seller: ParticipantId,
    pub bank: BankId,
    pub buyer_account: BankAccount,
    pub seller_account: BankAccount,
    pub product: Product,
}

/// Stateless trade validator.
#[derive(Debug, Clone)]
pub struct TradeValidator {
    enforce_seller_ownership: bool,
}

impl TradeValidator {
    pub fn new(config: &SettlementConfig) -> Self {
        Self {
            enforce_seller_ownership: config.enforce_seller_ownership,
        }
    }

    /// Resolve the trade's accounts and check it can settle.
    ///
    /// Checks short-circuit in a fixed order, so the same inputs always
    /// produce the same error. Nothing is mutated.
    pub fn validate(&self, trade: &Trade, snapshot: &TradeSnapshot) -> Result<ResolvedTrade> {
        self.check_inputs(trade, snapshot)?;

        let (buyer_account, seller_account) = resolve_accounts(trade, snapshot)?;
        let price = &snapshot.product.price;

        let buyer_account =
            buyer_account.ok_or_else(|| MarketError::AccountNotFound(trade.buyer.clone()))?;
        let seller_account =
            seller_account.ok_or_else(|| MarketError::AccountNotFound(trade.seller.clone()))?;

        price.ensure_same_currency(&buyer_account.balance)?;
        price.ensure_same_currency(&seller_account.balance)?;

        if !buyer_account.balance.covers(price)? {
            return Err(MarketError::InsufficientFunds {
                required: price.clone(),
                available: buyer_account.balance.clone(),
            });
        }

        debug!(
            trade_id = %trade.id,
            buyer_account = %buyer_account.id,
            seller_account = %seller_account.id,
            "Trade resolved"
        );

        Ok(ResolvedTrade {
            trade_id: trade.id,
            buyer: trade.buyer.clone(),
            seller: trade.seller.clone(),
            bank: trade.bank.clone(),
            buyer_account: buyer_account.clone(),
            seller_account: seller_account.clone(),
            product: snapshot.product.clone(),
        })
    }

    fn check_inputs(&self, trade: &Trade, snapshot: &TradeSnapshot) -> Result<()> {
        let product = &snapshot.product;

        if snapshot.bank.id != trade.bank || product.id != trade.product {
            return Err(MarketError::Internal(format!(
                "snapshot of bank {} / product {} does not match trade {}",
                snapshot.bank.id, product.id, trade.id
            )));
        }

        if trade.buyer == trade.seller {
            return Err(MarketError::SameParticipant(trade.buyer.clone()));
        }

        if snapshot.accounts.is_empty() {
            return Err(MarketError::EmptyBank(trade.bank.clone()));
        }

        if !product.price.is_positive() {
            return Err(MarketError::InvalidPrice(product.id.clone()));
        }

        if !product.is_listed() {
            return Err(MarketError::ProductNotListed(product.id.clone()));
        }

        if self.enforce_seller_ownership && !product.is_owned_by(&trade.seller) {
            return Err(MarketError::NotOwner {
                product: product.id.clone(),
                seller: trade.seller.clone(),
            });
        }

        Ok(())
    }
}

impl Default for TradeValidator {
    fn default() -> Self {
        Self::new(&SettlementConfig::default())
    }
}

/// One pass over the bank's accounts; the first account owned by each side wins.
fn resolve_accounts<'a>(
    trade: &Trade,
    snapshot: &'a TradeSnapshot,
) -> Result<(Option<&'a BankAccount>, Option<&'a BankAccount>)> {
    let mut buyer_account = None;
    let mut seller_account = None;

    for account in &snapshot.accounts {
        if !account.belongs_to(&snapshot.bank.id) {
            return Err(MarketError::BankMismatch {
                account: account.id.clone(),
                bank: snapshot.bank.id.clone(),
            });
        }

        if buyer_account.is_none() && account.is_owned_by(&trade.buyer) {
            buyer_account = Some(account);
        } else if seller_account.is_none() && account.is_owned_by(&trade.seller) {
            seller_account = Some(account);
        }
    }

    Ok((buyer_account, seller_account))
}
