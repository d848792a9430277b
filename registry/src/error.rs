//! Registry error types.

use marketsettle_common::{EntityRef, MarketError};
use thiserror::Error;

/// Errors that can occur in a registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No record with this identifier.
    #[error("Not found: {0}")]
    NotFound(EntityRef),

    /// A record with this identifier already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(EntityRef),

    /// The backing store refused the operation.
    #[error("Registry unavailable for {entity}: {cause}")]
    Unavailable { entity: EntityRef, cause: String },

    /// The record breaks a ledger invariant.
    #[error("Invalid {entity}: {reason}")]
    InvalidEntity { entity: EntityRef, reason: String },
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

impl From<RegistryError> for MarketError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(entity) => MarketError::NotFound(entity),
            RegistryError::AlreadyExists(entity) => MarketError::Persistence {
                entity,
                cause: "already exists".to_string(),
            },
            RegistryError::Unavailable { entity, cause } => {
                MarketError::Persistence { entity, cause }
            }
            RegistryError::InvalidEntity { entity, reason } => {
                MarketError::InvariantViolation(format!("{entity}: {reason}"))
            }
        }
    }
}
