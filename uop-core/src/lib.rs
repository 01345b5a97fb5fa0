//! UOP Core - Records, Identifiers and Errors
//!
//! Plain data types shared by the storage layer and the client cache.
//! This crate holds no caching or persistence logic.

pub mod config;
pub mod diff;
pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;

pub use config::ClientConfig;
pub use diff::{apply_changes, field_diff, FieldChanges};
pub use entities::{
    Assoc, AttributeDef, ClassDef, MetaDef, MetaEntity, MetaRecord, MetaSnapshot, ObjectRecord,
    QueryDef, RoleEdge,
};
pub use enums::{AssocKind, AttrType, EntityType, TxnState};
pub use error::{
    AssocError, ConfigError, StorageError, TransactionError, UopError, UopResult, ValidationError,
};
pub use identity::{MetaId, ObjectId};

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
