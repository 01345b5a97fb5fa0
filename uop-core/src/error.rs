//! Error types for UOP client operations

use crate::{AssocKind, EntityType};
use thiserror::Error;

/// Backing store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity_type:?} with id {id}")]
    NotFound { entity_type: EntityType, id: String },

    #[error("Insert failed for {entity_type:?}: {reason}")]
    InsertFailed { entity_type: EntityType, reason: String },

    #[error("Update failed for {entity_type:?} with id {id}: {reason}")]
    UpdateFailed {
        entity_type: EntityType,
        id: String,
        reason: String,
    },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("No transaction is open on the store")]
    NoTransaction,

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Injected failure at {point}")]
    Injected { point: String },
}

/// Association index errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssocError {
    #[error("No {kind} definition named {name}")]
    NotFound { kind: AssocKind, name: String },

    #[error("{name} is neither a role name nor a reverse role name")]
    InvalidRoleName { name: String },

    #[error("Role name {name} is already in use")]
    DuplicateRoleName { name: String },

    #[error("Inconsistent {kind} index: {reason}")]
    InconsistentState { kind: AssocKind, reason: String },
}

/// Transaction lifecycle errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Operation requires an open transaction")]
    NotActive,

    #[error("A transaction is already open")]
    AlreadyActive,
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Unknown class: {name}")]
    UnknownClass { name: String },

    #[error("Expected a {expected:?} definition, got {got:?}")]
    WrongKind { expected: EntityType, got: EntityType },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all UOP client errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UopError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Association error: {0}")]
    Assoc(#[from] AssocError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl From<serde_json::Error> for UopError {
    fn from(err: serde_json::Error) -> Self {
        UopError::Validation(ValidationError::Serialization {
            reason: err.to_string(),
        })
    }
}

/// Result type alias for UOP client operations.
pub type UopResult<T> = Result<T, UopError>;

// =============================================================================
// TESTS
// =============================================================================
