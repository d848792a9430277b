//! Registry capability trait.

use std::sync::Arc;

use async_trait::async_trait;
use marketsettle_ledger::{Bank, BankAccount, Participant, Product};

use crate::entity::Entity;
use crate::error::RegistryResult;
use crate::transaction::Transaction;

/// Keyed storage for one entity kind, supplied by the host ledger.
#[async_trait]
pub trait Registry<E: Entity>: Send + Sync {
    /// Get a record by identifier.
    async fn get(&self, id: &E::Id) -> RegistryResult<E>;

    /// Get every record.
    async fn get_all(&self) -> RegistryResult<Vec<E>>;

    /// Check whether a record exists.
    async fn exists(&self, id: &E::Id) -> RegistryResult<bool>;

    /// Replace an existing record.
    async fn update(&self, entity: E) -> RegistryResult<()>;

    /// Add a new record. Setup-time only.
    async fn add(&self, entity: E) -> RegistryResult<()>;

    /// Add several new records. Setup-time only.
    async fn add_all(&self, entities: Vec<E>) -> RegistryResult<()> {
        for entity in entities {
            self.add(entity).await?;
        }
        Ok(())
    }
}

/// The registries one trade settlement touches.
#[derive(Clone)]
pub struct Registries {
    pub participants: Arc<dyn Registry<Participant>>,
    pub accounts: Arc<dyn Registry<BankAccount>>,
    pub banks: Arc<dyn Registry<Bank>>,
    pub products: Arc<dyn Registry<Product>>,
}

impl Registries {
    /// Open a host transaction over these registries.
    pub fn begin(&self) -> Transaction {
        Transaction::new(self.clone())
    }
}
