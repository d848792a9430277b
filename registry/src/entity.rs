//! Entities that can live in a registry.

use std::fmt::Display;
use std::hash::Hash;

use marketsettle_common::{AccountId, BankId, EntityKind, EntityRef, ParticipantId, ProductId};
use marketsettle_ledger::{Bank, BankAccount, Participant, Product};

/// A record keyed by a stable identifier.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Identifier type.
    type Id: Clone + Eq + Hash + Display + Send + Sync + 'static;

    /// Kind reported in errors and logs.
    const KIND: EntityKind;

    fn id(&self) -> &Self::Id;

    fn entity_ref(&self) -> EntityRef {
        EntityRef::new(Self::KIND, self.id().to_string())
    }

    fn ref_for(id: &Self::Id) -> EntityRef {
        EntityRef::new(Self::KIND, id.to_string())
    }
}

impl Entity for Participant {
    type Id = ParticipantId;
    const KIND: EntityKind = EntityKind::Participant;

    fn id(&self) -> &ParticipantId {
        &self.id
    }
}

impl Entity for BankAccount {
    type Id = AccountId;
    const KIND: EntityKind = EntityKind::Account;

    fn id(&self) -> &AccountId {
        &self.id
    }
}

impl Entity for Bank {
    type Id = BankId;
    const KIND: EntityKind = EntityKind::Bank;

    fn id(&self) -> &BankId {
        &self.id
    }
}

impl Entity for Product {
    type Id = ProductId;
    const KIND: EntityKind = EntityKind::Product;

    fn id(&self) -> &ProductId {
        &self.id
    }
}
