//! MarketSettle Registries
//!
//! The keyed-storage capability through which trade settlement reads and
//! writes ledger records, together with the host-side pieces the core
//! relies on but does not implement itself:
//!
//! - [`InMemoryRegistry`], a `dashmap`-backed registry with fault injection
//! - [`Transaction`], the all-or-nothing commit boundary
//! - [`Fixture`], a JSON-describable market setup
//!
//! # Example
//!
//! ```rust,ignore
//! use marketsettle_registry::{InMemoryLedger, Fixture};
//!
//! let ledger = InMemoryLedger::new();
//! Fixture::from_json(json)?.load_into(&ledger.registries()).await?;
//! let product = ledger.registries().products.get(&"product1".into()).await?;
//! ```

pub mod entity;
pub mod error;
pub mod registry;
pub mod memory;
pub mod transaction;
pub mod fixture;

pub use entity::Entity;
pub use error::{RegistryError, RegistryResult};
pub use registry::{Registries, Registry};
pub use memory::{InMemoryLedger, InMemoryRegistry};
pub use transaction::{CommitError, StagedUpdate, Transaction};
pub use fixture::Fixture;
