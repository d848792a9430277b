//! Traded product records.

use marketsettle_common::{Money, ParticipantId, ProductId};
use serde::{Deserialize, Serialize};

/// Product listing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Listed,
    Sold,
}

/// The traded asset. Settlement only ever changes `owner`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub owner: ParticipantId,
    /// Participant that originally listed the product.
    pub seller: ParticipantId,
    pub status: ProductStatus,
}

impl Product {
    /// List a new product owned by `seller`.
    pub fn listed(
        id: impl Into<ProductId>,
        name: impl Into<String>,
        price: Money,
        seller: impl Into<ParticipantId>,
    ) -> Self {
        let seller = seller.into();
        Self {
            id: id.into(),
            name: name.into(),
            price,
            owner: seller.clone(),
            seller,
            status: ProductStatus::Listed,
        }
    }

    pub fn is_owned_by(&self, participant: &ParticipantId) -> bool {
        &self.owner == participant
    }

    pub fn is_listed(&self) -> bool {
        self.status == ProductStatus::Listed
    }

    /// Hand ownership to `buyer`.
    pub fn transfer_to(&mut self, buyer: &ParticipantId) {
        self.owner = buyer.clone();
    }
}
