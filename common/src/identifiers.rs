//! Identifier types for MarketSettle entities.
//!
//! Every cross-entity link is stored as one of these identifiers and
//! resolved through a registry lookup. Two records are the same entity iff
//! their identifiers are equal.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a trade request.
/// Uses UUID v7 for time-ordered identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TradeId(Uuid);

impl TradeId {
    /// Create a new trade ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TradeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an entity lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockId(Uuid);

impl LockId {
    /// Create a new lock ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for LockId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Validate the identifier format.
            pub fn is_valid(&self) -> bool {
                is_valid_identifier(&self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identifier of a buyer or seller.
    ParticipantId
);

string_id!(
    /// Identifier of a bank account.
    AccountId
);

string_id!(
    /// Identifier of a bank.
    BankId
);

string_id!(
    /// Identifier of a traded product.
    ProductId
);

/// Non-empty, at most 64 chars, alphanumeric plus `_`, `-` and `.`.
fn is_valid_identifier(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
}

/// Kind of a persisted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Participant,
    Account,
    Bank,
    Product,
}

impl EntityKind {
    /// Registry name of this kind.
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Participant => "Participant",
            EntityKind::Account => "BankAccount",
            EntityKind::Bank => "Bank",
            EntityKind::Product => "Product",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fully qualified reference to an entity: kind plus identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    /// Create a new entity reference.
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn participant(id: &ParticipantId) -> Self {
        Self::new(EntityKind::Participant, id.as_str())
    }

    pub fn account(id: &AccountId) -> Self {
        Self::new(EntityKind::Account, id.as_str())
    }

    pub fn bank(id: &BankId) -> Self {
        Self::new(EntityKind::Bank, id.as_str())
    }

    pub fn product(id: &ProductId) -> Self {
        Self::new(EntityKind::Product, id.as_str())
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_id_creation() {
        let id1 = TradeId::new();
        let id2 = TradeId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_trade_id_parse() {
        let uuid_str = "019456ab-1234-7def-8901-234567890abc";
        let id = TradeId::parse(uuid_str).unwrap();
        assert_eq!(id.to_string(), uuid_str);
    }

    #[test]
    fn test_identifier_validation() {
        assert!(ParticipantId::new("alice").is_valid());
        assert!(AccountId::new("alice_account").is_valid());
        assert!(ProductId::new("product-1.v2").is_valid());
        assert!(!BankId::new("").is_valid());
        assert!(!BankId::new("bank with space").is_valid());
        assert!(!BankId::new("x".repeat(65)).is_valid());
    }

    #[test]
    fn test_equality_is_by_identifier() {
        let a = ParticipantId::new(String::from("alice"));
        let b = ParticipantId::from("alice");
        assert_eq!(a, b);
        assert_ne!(a, ParticipantId::new("bob"));
    }

    #[test]
    fn test_entity_ref_display() {
        let r = EntityRef::product(&ProductId::new("product1"));
        assert_eq!(r.to_string(), "Product#product1");
        let r = EntityRef::account(&AccountId::new("alice_account"));
        assert_eq!(r.to_string(), "BankAccount#alice_account");
    }

    #[test]
    fn test_string_id_serializes_transparently() {
        let json = serde_json::to_string(&ProductId::new("product1")).unwrap();
        assert_eq!(json, "\"product1\"");
    }
}
