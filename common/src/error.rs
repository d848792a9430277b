//! Error types for MarketSettle.

use crate::{
    AccountId, BankId, Currency, CurrencyMismatchError, EntityRef, Money, MoneyError, ParticipantId,
    ProductId, TradeId, TradeStatus,
};
use thiserror::Error;

/// Main error type for MarketSettle operations.
///
/// Cloneable so that a terminal trade outcome can be replayed to a caller
/// resubmitting the same trade.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    /// The bank holds no account owned by this participant.
    #[error("No account owned by {0} in bank")]
    AccountNotFound(ParticipantId),

    /// Buyer balance is below the product price.
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Money, available: Money },

    /// A registry update failed after validation passed.
    #[error("Persistence error on {entity}: {cause}")]
    Persistence { entity: EntityRef, cause: String },

    /// Referenced entity does not exist.
    #[error("Not found: {0}")]
    NotFound(EntityRef),

    /// Bank has no accounts.
    #[error("Bank {0} has no accounts")]
    EmptyBank(BankId),

    /// Buyer and seller are the same participant.
    #[error("Buyer and seller must differ: {0}")]
    SameParticipant(ParticipantId),

    /// Product price is not strictly positive.
    #[error("Product {0} has a non-positive price")]
    InvalidPrice(ProductId),

    /// Product is not listed for sale.
    #[error("Product {0} is not listed")]
    ProductNotListed(ProductId),

    /// Seller does not currently own the product.
    #[error("Seller {seller} does not own product {product}")]
    NotOwner {
        product: ProductId,
        seller: ParticipantId,
    },

    /// Account referenced by a bank does not reference that bank back.
    #[error("Account {account} is not linked to bank {bank}")]
    BankMismatch { account: AccountId, bank: BankId },

    /// Amounts in different currencies.
    #[error("Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: Currency, actual: Currency },

    /// Invalid state transition.
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: TradeStatus, to: TradeStatus },

    /// Trade identifier already in flight.
    #[error("Duplicate trade: {0}")]
    DuplicateTrade(TradeId),

    /// Entity locks could not be acquired in time.
    #[error("Lock conflict for trade {trade_id} on {entity}")]
    LockConflict { trade_id: TradeId, entity: EntityRef },

    /// Settler is not accepting trades.
    #[error("Settler is not accepting trades")]
    SettlerUnavailable,

    /// An amount does not fit in the decimal range.
    #[error("{0}")]
    AmountOverflow(String),

    /// A ledger invariant would be broken.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MarketError {
    /// Check if a brand-new trade with the same content may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MarketError::LockConflict { .. }
                | MarketError::SettlerUnavailable
                | MarketError::Persistence { .. }
        )
    }

    /// Whether the error was raised by validation (no mutation attempted).
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            MarketError::Persistence { .. }
                | MarketError::InvalidTransition { .. }
                | MarketError::DuplicateTrade(_)
                | MarketError::LockConflict { .. }
                | MarketError::SettlerUnavailable
                | MarketError::Configuration(_)
        )
    }

    /// Stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            MarketError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            MarketError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            MarketError::Persistence { .. } => "PERSISTENCE_ERROR",
            MarketError::NotFound(_) => "NOT_FOUND",
            MarketError::EmptyBank(_) => "EMPTY_BANK",
            MarketError::SameParticipant(_) => "SAME_PARTICIPANT",
            MarketError::InvalidPrice(_) => "INVALID_PRICE",
            MarketError::ProductNotListed(_) => "PRODUCT_NOT_LISTED",
            MarketError::NotOwner { .. } => "NOT_OWNER",
            MarketError::BankMismatch { .. } => "BANK_MISMATCH",
            MarketError::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            MarketError::InvalidTransition { .. } => "INVALID_TRANSITION",
            MarketError::DuplicateTrade(_) => "DUPLICATE_TRADE",
            MarketError::LockConflict { .. } => "LOCK_CONFLICT",
            MarketError::SettlerUnavailable => "SETTLER_UNAVAILABLE",
            MarketError::AmountOverflow(_) => "AMOUNT_OVERFLOW",
            MarketError::InvariantViolation(_) => "INVARIANT_VIOLATION",
            MarketError::Configuration(_) => "CONFIGURATION_ERROR",
            MarketError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<CurrencyMismatchError> for MarketError {
    fn from(e: CurrencyMismatchError) -> Self {
        MarketError::CurrencyMismatch {
            expected: e.expected,
            actual: e.actual,
        }
    }
}

impl From<MoneyError> for MarketError {
    fn from(e: MoneyError) -> Self {
        match e {
            MoneyError::CurrencyMismatch(mismatch) => mismatch.into(),
            overflow @ MoneyError::Overflow { .. } => {
                MarketError::AmountOverflow(overflow.to_string())
            }
        }
    }
}

/// Result type alias for MarketSettle operations.
pub type Result<T> = std::result::Result<T, MarketError>;
