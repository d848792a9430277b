//! Trade request, lifecycle state machine and settlement receipt.

use crate::{AccountId, BankId, EntityRef, MarketError, Money, ParticipantId, ProductId, TradeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trade status representing the lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    /// Trade request received.
    Submitted,
    /// Participant accounts are being resolved and checked.
    Validating,
    /// All validation checks passed.
    Validated,
    /// Registry updates are being issued.
    Applying,
    /// All updates committed.
    Settled,
    /// Validation failed, nothing was mutated.
    Rejected,
    /// Persistence failed after validation, host rolled back.
    Faulted,
}

impl TradeStatus {
    /// Check if this is a final state.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            TradeStatus::Settled | TradeStatus::Rejected | TradeStatus::Faulted
        )
    }

    /// Check if the trade is in progress.
    pub fn is_in_progress(&self) -> bool {
        !self.is_final()
    }

    /// Get valid next states from current state.
    pub fn valid_transitions(&self) -> &[TradeStatus] {
        match self {
            TradeStatus::Submitted => &[TradeStatus::Validating],
            TradeStatus::Validating => &[TradeStatus::Validated, TradeStatus::Rejected],
            TradeStatus::Validated => &[TradeStatus::Applying],
            TradeStatus::Applying => &[TradeStatus::Settled, TradeStatus::Faulted],
            TradeStatus::Settled => &[],
            TradeStatus::Rejected => &[],
            TradeStatus::Faulted => &[],
        }
    }

    /// Check if transition to given state is valid.
    pub fn can_transition_to(&self, next: TradeStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// A one-time request to exchange a product for money between a buyer and
/// a seller through accounts held at one bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    #[serde(default)]
    pub id: TradeId,
    pub product: ProductId,
    pub buyer: ParticipantId,
    pub seller: ParticipantId,
    pub bank: BankId,
    #[serde(default = "Utc::now")]
    pub submitted_at: DateTime<Utc>,
}

impl Trade {
    /// Create a new trade request with a fresh identifier.
    pub fn new(
        product: impl Into<ProductId>,
        buyer: impl Into<ParticipantId>,
        seller: impl Into<ParticipantId>,
        bank: impl Into<BankId>,
    ) -> Self {
        Self {
            id: TradeId::new(),
            product: product.into(),
            buyer: buyer.into(),
            seller: seller.into(),
            bank: bank.into(),
            submitted_at: Utc::now(),
        }
    }

    /// Same request content under a brand-new identifier.
    pub fn resubmit(&self) -> Self {
        Self {
            id: TradeId::new(),
            submitted_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Parse a trade request from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Outcome of a successful settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub trade_id: TradeId,
    pub product: ProductId,
    pub new_owner: ParticipantId,
    pub price: Money,
    pub buyer_account: AccountId,
    pub buyer_balance: Money,
    pub seller_account: AccountId,
    pub seller_balance: Money,
    /// Every record written by the settlement, in commit order.
    pub updated: Vec<EntityRef>,
    pub settled_at: DateTime<Utc>,
}

/// Timing metrics for a trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeTiming {
    pub submitted_at: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub faulted_at: Option<DateTime<Utc>>,
}

impl TradeTiming {
    /// Create new timing with the given submission time.
    pub fn new(submitted_at: DateTime<Utc>) -> Self {
        Self {
            submitted_at,
            validated_at: None,
            settled_at: None,
            rejected_at: None,
            faulted_at: None,
        }
    }

    /// Get total duration in milliseconds (if settled).
    pub fn total_duration_ms(&self) -> Option<i64> {
        self.settled_at
            .map(|settled| (settled - self.submitted_at).num_milliseconds())
    }
}

/// Why a trade ended in `Rejected` or `Faulted`.
#[derive(Debug, Clone)]
pub struct TradeFailure {
    pub error: MarketError,
    /// Records that had been written before the failure and were rolled back.
    pub rolled_back: Vec<EntityRef>,
    pub failed_at: DateTime<Utc>,
}

impl TradeFailure {
    pub fn new(error: MarketError) -> Self {
        Self {
            error,
            rolled_back: Vec::new(),
            failed_at: Utc::now(),
        }
    }

    pub fn with_rolled_back(mut self, rolled_back: Vec<EntityRef>) -> Self {
        self.rolled_back = rolled_back;
        self
    }
}

/// Processing record of one trade.
#[derive(Debug, Clone)]
pub struct TradeRecord {
    pub trade: Trade,
    pub status: TradeStatus,
    pub timing: TradeTiming,
    pub receipt: Option<SettlementReceipt>,
    pub failure: Option<TradeFailure>,
}

impl TradeRecord {
    /// Create a record for a freshly submitted trade.
    pub fn new(trade: Trade) -> Self {
        let timing = TradeTiming::new(trade.submitted_at);
        Self {
            trade,
            status: TradeStatus::Submitted,
            timing,
            receipt: None,
            failure: None,
        }
    }

    pub fn id(&self) -> TradeId {
        self.trade.id
    }

    /// Transition to a new status.
    pub fn transition_to(&mut self, new_status: TradeStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(new_status) {
            return Err(InvalidTransition {
                from: self.status,
                to: new_status,
            });
        }

        self.status = new_status;

        let now = Utc::now();
        match new_status {
            TradeStatus::Validated => self.timing.validated_at = Some(now),
            TradeStatus::Settled => self.timing.settled_at = Some(now),
            TradeStatus::Rejected => self.timing.rejected_at = Some(now),
            TradeStatus::Faulted => self.timing.faulted_at = Some(now),
            _ => {}
        }

        Ok(())
    }

    /// Mark the trade as rejected during validation.
    pub fn reject(&mut self, error: MarketError) -> Result<(), InvalidTransition> {
        self.transition_to(TradeStatus::Rejected)?;
        self.failure = Some(TradeFailure::new(error));
        Ok(())
    }

    /// Mark the trade as faulted while applying.
    pub fn fault(&mut self, failure: TradeFailure) -> Result<(), InvalidTransition> {
        self.transition_to(TradeStatus::Faulted)?;
        self.failure = Some(failure);
        Ok(())
    }

    /// Mark the trade as settled.
    pub fn settle(&mut self, receipt: SettlementReceipt) -> Result<(), InvalidTransition> {
        self.transition_to(TradeStatus::Settled)?;
        self.receipt = Some(receipt);
        Ok(())
    }

    /// Fault a trade whose processing stopped before reaching an outcome.
    ///
    /// Allowed from any in-progress status.
    pub fn abandon(&mut self, error: MarketError) -> Result<(), InvalidTransition> {
        if self.status.is_final() {
            return Err(InvalidTransition {
                from: self.status,
                to: TradeStatus::Faulted,
            });
        }
        self.status = TradeStatus::Faulted;
        self.timing.faulted_at = Some(Utc::now());
        self.failure = Some(TradeFailure::new(error));
        Ok(())
    }

    /// Terminal outcome, `None` while the trade is still in flight.
    pub fn outcome(&self) -> Option<Result<SettlementReceipt, MarketError>> {
        match self.status {
            TradeStatus::Settled => self.receipt.clone().map(Ok),
            TradeStatus::Rejected | TradeStatus::Faulted => {
                self.failure.as_ref().map(|f| Err(f.error.clone()))
            }
            _ => None,
        }
    }
}

/// Error when attempting invalid state transition.
#[derive(Debug, Clone)]
pub struct InvalidTransition {
    pub from: TradeStatus,
    pub to: TradeStatus,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Invalid state transition from {:?} to {:?}",
            self.from, self.to
        )
    }
}

impl std::error::Error for InvalidTransition {}

impl From<InvalidTransition> for MarketError {
    fn from(t: InvalidTransition) -> Self {
        MarketError::InvalidTransition {
            from: t.from,
            to: t.to,
        }
    }
}
