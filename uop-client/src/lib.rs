//! UOP Client - Transactional Object Graph Cache
//!
//! Keeps a client-side view of objects, meta definitions and the three
//! association kinds (tags, groups and roles) on top of a [`BackingStore`].
//!
//! - [`AssociationIndex`]: dual `by_subject` / `by_name` index per kind,
//!   populated lazily from the store
//! - [`MetaContext`]: class, attribute and query lookups by name
//! - [`ClientState`]: owns the caches and indices and drives
//!   begin / commit / abort
//!
//! # Example
//!
//! ```ignore
//! let mut client = ClientState::new(MockStore::new(), ClientConfig::default())?;
//! client.begin_transaction()?;
//! let book = client.add_object(ObjectRecord::new().with("title", "Dune"), true)?;
//! client.tag(book, "to-read")?;
//! client.commit()?;
//! ```

pub mod assoc;
pub mod meta_context;
pub mod state;

pub use assoc::{
    AssociationIndex, AssociationVariant, GroupIndex, GroupVariant, Members, RoleIndex,
    RoleVariant, SubjectAssocs, TagIndex, TagVariant,
};
pub use meta_context::MetaContext;
pub use state::{ChangeSet, ClientState};

pub use uop_core::{
    Assoc, AssocKind, ClientConfig, EntityType, MetaDef, MetaEntity, MetaId, ObjectId,
    ObjectRecord, TxnState, UopError, UopResult,
};
pub use uop_storage::{BackingStore, MockStore};
