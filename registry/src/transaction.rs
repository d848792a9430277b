//! Host transaction: the all-or-nothing boundary around one settlement.

use marketsettle_common::{EntityRef, MarketError};
use marketsettle_ledger::{Bank, BankAccount, Participant, Product};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::entity::Entity;
use crate::error::RegistryResult;
use crate::registry::Registries;

/// A record write waiting for commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagedUpdate {
    Participant(Participant),
    Account(BankAccount),
    Bank(Bank),
    Product(Product),
}

impl StagedUpdate {
    pub fn entity_ref(&self) -> EntityRef {
        match self {
            StagedUpdate::Participant(p) => p.entity_ref(),
            StagedUpdate::Account(a) => a.entity_ref(),
            StagedUpdate::Bank(b) => b.entity_ref(),
            StagedUpdate::Product(p) => p.entity_ref(),
        }
    }
}

impl From<Participant> for StagedUpdate {
    fn from(p: Participant) -> Self {
        StagedUpdate::Participant(p)
    }
}

impl From<BankAccount> for StagedUpdate {
    fn from(a: BankAccount) -> Self {
        StagedUpdate::Account(a)
    }
}

impl From<Bank> for StagedUpdate {
    fn from(b: Bank) -> Self {
        StagedUpdate::Bank(b)
    }
}

impl From<Product> for StagedUpdate {
    fn from(p: Product) -> Self {
        StagedUpdate::Product(p)
    }
}

/// A commit that did not go through.
#[derive(Debug, Clone, Error)]
#[error("Commit failed on {failed}: {cause}")]
pub struct CommitError {
    /// Record whose write failed.
    pub failed: EntityRef,
    /// Cause reported by the registry.
    pub cause: String,
    /// Records that had been written and were restored.
    pub rolled_back: Vec<EntityRef>,
    /// Records that had been written and could not be restored.
    pub rollback_failed: Vec<EntityRef>,
}

impl CommitError {
    /// True when nothing from the transaction remains visible.
    pub fn is_clean(&self) -> bool {
        self.rollback_failed.is_empty()
    }
}

impl From<CommitError> for MarketError {
    fn from(e: CommitError) -> Self {
        MarketError::Persistence {
            entity: e.failed,
            cause: e.cause,
        }
    }
}

/// Unit of work over a set of registries.
///
/// Updates are only staged until [`Transaction::commit`], which writes them
/// in staging order. If any write fails, every write already made by this
/// transaction is restored to its pre-image in reverse order.
pub struct Transaction {
    registries: Registries,
    staged: Vec<StagedUpdate>,
}

impl Transaction {
    pub(crate) fn new(registries: Registries) -> Self {
        Self {
            registries,
            staged: Vec::new(),
        }
    }

    /// Stage a record write.
    pub fn stage(&mut self, update: impl Into<StagedUpdate>) {
        self.staged.push(update.into());
    }

    /// References of the staged records, in commit order.
    pub fn staged_refs(&self) -> Vec<EntityRef> {
        self.staged.iter().map(StagedUpdate::entity_ref).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Write every staged update, or none of them.
    pub async fn commit(self) -> Result<Vec<EntityRef>, CommitError> {
        let mut pre_images: Vec<StagedUpdate> = Vec::with_capacity(self.staged.len());
        let mut committed = Vec::with_capacity(self.staged.len());

        for update in self.staged.iter().cloned() {
            let entity = update.entity_ref();

            let pre_image = match self.read_current(&update).await {
                Ok(pre_image) => pre_image,
                Err(e) => return Err(self.abort(entity, e.to_string(), pre_images).await),
            };

            if let Err(e) = self.write(update).await {
                return Err(self.abort(entity, e.to_string(), pre_images).await);
            }

            debug!(entity = %entity, "Staged update written");
            pre_images.push(pre_image);
            committed.push(entity);
        }

        Ok(committed)
    }

    async fn read_current(&self, update: &StagedUpdate) -> RegistryResult<StagedUpdate> {
        Ok(match update {
            StagedUpdate::Participant(p) => self.registries.participants.get(&p.id).await?.into(),
            StagedUpdate::Account(a) => self.registries.accounts.get(&a.id).await?.into(),
            StagedUpdate::Bank(b) => self.registries.banks.get(&b.id).await?.into(),
            StagedUpdate::Product(p) => self.registries.products.get(&p.id).await?.into(),
        })
    }

    async fn write(&self, update: StagedUpdate) -> RegistryResult<()> {
        match update {
            StagedUpdate::Participant(p) => self.registries.participants.update(p).await,
            StagedUpdate::Account(a) => self.registries.accounts.update(a).await,
            StagedUpdate::Bank(b) => self.registries.banks.update(b).await,
            StagedUpdate::Product(p) => self.registries.products.update(p).await,
        }
    }

    async fn abort(
        &self,
        failed: EntityRef,
        cause: String,
        pre_images: Vec<StagedUpdate>,
    ) -> CommitError {
        warn!(entity = %failed, cause = %cause, written = pre_images.len(), "Commit failed, rolling back");

        let mut rolled_back = Vec::new();
        let mut rollback_failed = Vec::new();

        for pre_image in pre_images.into_iter().rev() {
            let entity = pre_image.entity_ref();
            match self.write(pre_image).await {
                Ok(()) => rolled_back.push(entity),
                Err(e) => {
                    error!(entity = %entity, error = %e, "Rollback write failed");
                    rollback_failed.push(entity);
                }
            }
        }

        CommitError {
            failed,
            cause,
            rolled_back,
            rollback_failed,
        }
    }
}
