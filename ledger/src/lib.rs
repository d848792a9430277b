//! MarketSettle Ledger Records
//!
//! The long-lived records a trade settlement reads and mutates, plus the
//! double-entry journal produced for every settled trade. Records link to
//! each other by identifier only.

pub mod participant;
pub mod account;
pub mod bank;
pub mod product;
pub mod journal;

pub use participant::{Participant, ParticipantRole};
pub use account::BankAccount;
pub use bank::Bank;
pub use product::{Product, ProductStatus};
pub use journal::{EntryType, JournalBatch, JournalEntry};
