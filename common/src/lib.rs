//! MarketSettle Common Types
//!
//! Shared types used across the MarketSettle workspace: entity identifiers,
//! monetary amounts, the trade request and its lifecycle, and the error
//! taxonomy surfaced to callers.

pub mod identifiers;
pub mod monetary;
pub mod trade;
pub mod error;

pub use identifiers::*;
pub use monetary::*;
pub use trade::*;
pub use error::*;
