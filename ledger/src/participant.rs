//! Buyer and seller records.

use marketsettle_common::{ParticipantId, ProductId};
use serde::{Deserialize, Serialize};

/// Role a participant was registered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Buyer,
    Seller,
}

/// Identity-bearing actor in a trade. Holds no monetary state; its money
/// lives in bank accounts that reference it by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub role: ParticipantRole,
    pub first_name: String,
    pub last_name: String,
    /// Products bought, oldest first.
    #[serde(default)]
    pub acquired: Vec<ProductId>,
    /// Products sold, oldest first.
    #[serde(default)]
    pub sold: Vec<ProductId>,
    /// Products currently offered.
    #[serde(default)]
    pub listed: Vec<ProductId>,
}

impl Participant {
    /// Create a new participant with empty history.
    pub fn new(
        id: impl Into<ParticipantId>,
        role: ParticipantRole,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            role,
            first_name: first_name.into(),
            last_name: last_name.into(),
            acquired: Vec::new(),
            sold: Vec::new(),
            listed: Vec::new(),
        }
    }

    pub fn buyer(
        id: impl Into<ParticipantId>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self::new(id, ParticipantRole::Buyer, first_name, last_name)
    }

    pub fn seller(
        id: impl Into<ParticipantId>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self::new(id, ParticipantRole::Seller, first_name, last_name)
    }

    /// Human-readable name.
    pub fn display_name(&self) -> String {
        match (self.first_name.is_empty(), self.last_name.is_empty()) {
            (false, false) => format!("{} {}", self.first_name, self.last_name),
            (false, true) => self.first_name.clone(),
            (true, false) => self.last_name.clone(),
            (true, true) => self.id.to_string(),
        }
    }

    /// Offer a product. Returns `false` if it was already listed.
    pub fn list_product(&mut self, product: &ProductId) -> bool {
        push_unique(&mut self.listed, product)
    }

    /// Append to the acquired list. Returns `false` on a duplicate.
    pub fn record_acquired(&mut self, product: &ProductId) -> bool {
        push_unique(&mut self.acquired, product)
    }

    /// Append to the sold list and drop the product from `listed`.
    /// Returns `false` if it was already recorded as sold.
    pub fn record_sold(&mut self, product: &ProductId) -> bool {
        self.listed.retain(|p| p != product);
        push_unique(&mut self.sold, product)
    }
}

fn push_unique(list: &mut Vec<ProductId>, product: &ProductId) -> bool {
    if list.contains(product) {
        return false;
    }
    list.push(product.clone());
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        assert_eq!(Participant::buyer("alice", "Alice", "A").display_name(), "Alice A");
        assert_eq!(Participant::seller("bob", "", "").display_name(), "bob");
    }

    #[test]
    fn test_history_appends_without_duplicates() {
        let mut alice = Participant::buyer("alice", "Alice", "A");
        let p1 = ProductId::new("product1");
        let p2 = ProductId::new("product2");

        assert!(alice.record_acquired(&p1));
        assert!(alice.record_acquired(&p2));
        assert!(!alice.record_acquired(&p1));
        assert_eq!(alice.acquired, vec![p1, p2]);
    }

    #[test]
    fn test_record_sold_removes_listing() {
        let mut bob = Participant::seller("bob", "Bob", "B");
        let p1 = ProductId::new("product1");
        bob.list_product(&p1);
        bob.list_product(&ProductId::new("product2"));

        assert!(bob.record_sold(&p1));
        assert_eq!(bob.sold, vec![p1.clone()]);
        assert_eq!(bob.listed, vec![ProductId::new("product2")]);
        assert!(!bob.record_sold(&p1));
    }
}
