//! MarketSettle Settlement
//!
//! Settles one-time trades that exchange a product for money between a
//! buyer and a seller holding accounts at the same bank. A trade either
//! moves the price from buyer to seller and hands the product to the buyer
//! in one host transaction, or changes nothing at all.

pub mod settler;
pub mod config;
pub mod processor;
pub mod validator;
pub mod applier;
pub mod lock_manager;
pub mod state;
pub mod metrics;

#[cfg(test)]
pub(crate) mod testing;

pub use settler::Settler;
pub use config::{LockConfig, SettlementConfig, SettlerConfig};
pub use validator::{ResolvedTrade, TradeSnapshot, TradeValidator};
pub use applier::{SettlementApplier, SettlementPlan};
pub use state::SettlerState;
pub use metrics::MetricsSnapshot;
