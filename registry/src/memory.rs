//! In-memory host ledger.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use marketsettle_ledger::{Bank, BankAccount, Participant, Product};

use crate::entity::Entity;
use crate::error::{RegistryError, RegistryResult};
use crate::registry::{Registries, Registry};

/// Thread-safe registry keeping records in memory.
///
/// `get_all` returns records in insertion order. Updates for selected ids
/// can be made to fail, which is how host-side persistence faults are
/// simulated.
pub struct InMemoryRegistry<E: Entity> {
    records: DashMap<E::Id, E>,
    order: RwLock<Vec<E::Id>>,
    update_faults: DashMap<E::Id, String>,
    writes: AtomicU64,
}

impl<E: Entity> InMemoryRegistry<E> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            order: RwLock::new(Vec::new()),
            update_faults: DashMap::new(),
            writes: AtomicU64::new(0),
        }
    }

    /// Make every further `update` of `id` fail with `cause`.
    pub fn fail_updates_for(&self, id: E::Id, cause: impl Into<String>) {
        self.update_faults.insert(id, cause.into());
    }

    /// Remove all injected faults.
    pub fn clear_faults(&self) {
        self.update_faults.clear();
    }

    /// Number of successful `update` calls so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<E: Entity> Default for InMemoryRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E: Entity> Registry<E> for InMemoryRegistry<E> {
    async fn get(&self, id: &E::Id) -> RegistryResult<E> {
        debug!(entity = %E::ref_for(id), "Registry read");
        self.records
            .get(id)
            .map(|r| r.clone())
            .ok_or_else(|| RegistryError::NotFound(E::ref_for(id)))
    }

    async fn get_all(&self) -> RegistryResult<Vec<E>> {
        let order = self.order.read();
        Ok(order
            .iter()
            .filter_map(|id| self.records.get(id).map(|r| r.clone()))
            .collect())
    }

    async fn exists(&self, id: &E::Id) -> RegistryResult<bool> {
        Ok(self.records.contains_key(id))
    }

    async fn update(&self, entity: E) -> RegistryResult<()> {
        let id = entity.id().clone();

        if let Some(cause) = self.update_faults.get(&id) {
            return Err(RegistryError::Unavailable {
                entity: entity.entity_ref(),
                cause: cause.clone(),
            });
        }

        match self.records.get_mut(&id) {
            Some(mut record) => {
                *record = entity;
                self.writes.fetch_add(1, Ordering::Relaxed);
                debug!(entity = %E::ref_for(&id), "Registry update");
                Ok(())
            }
            None => Err(RegistryError::NotFound(E::ref_for(&id))),
        }
    }

    async fn add(&self, entity: E) -> RegistryResult<()> {
        let id = entity.id().clone();
        let mut order = self.order.write();

        if self.records.contains_key(&id) {
            return Err(RegistryError::AlreadyExists(entity.entity_ref()));
        }

        self.records.insert(id.clone(), entity);
        order.push(id);
        Ok(())
    }

    async fn add_all(&self, entities: Vec<E>) -> RegistryResult<()> {
        let mut order = self.order.write();

        // Refuse the whole batch if any id is taken or repeated.
        let mut seen = std::collections::HashSet::new();
        for entity in &entities {
            if self.records.contains_key(entity.id()) || !seen.insert(entity.id().clone()) {
                return Err(RegistryError::AlreadyExists(entity.entity_ref()));
            }
        }

        for entity in entities {
            let id = entity.id().clone();
            self.records.insert(id.clone(), entity);
            order.push(id);
        }
        Ok(())
    }
}

/// One in-memory registry per entity kind.
///
/// Keeps the concrete handles so tests and tools can inject faults and
/// inspect write counts, and hands out the trait-object view via
/// [`InMemoryLedger::registries`].
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    pub participants: Arc<InMemoryRegistry<Participant>>,
    pub accounts: Arc<InMemoryRegistry<BankAccount>>,
    pub banks: Arc<InMemoryRegistry<Bank>>,
    pub products: Arc<InMemoryRegistry<Product>>,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry capability view of this ledger.
    pub fn registries(&self) -> Registries {
        Registries {
            participants: self.participants.clone(),
            accounts: self.accounts.clone(),
            banks: self.banks.clone(),
            products: self.products.clone(),
        }
    }

    /// Total successful updates across all registries.
    pub fn write_count(&self) -> u64 {
        self.participants.write_count()
            + self.accounts.write_count()
            + self.banks.write_count()
            + self.products.write_count()
    }

    /// Remove all injected faults.
    pub fn clear_faults(&self) {
        self.participants.clear_faults();
        self.accounts.clear_faults();
        self.banks.clear_faults();
        self.products.clear_faults();
    }
}
