//! Client side caches with a remembered baseline.
//!
//! [`SnapshotCache`] keeps the current value of every record next to the value
//! it had at the last synchronization point, so pending changes can be
//! computed as inserts, field level modifications and deletes at commit time.
//!
//! [`NameIdIndex`] is the small bidirectional id/name lookup used for every
//! meta definition kind.
//!
//! # Example
//!
//! ```ignore
//! let mut cache: SnapshotCache<ObjectId, ObjectRecord> = SnapshotCache::new();
//! cache.load_original(record.id, record.clone());
//! cache.get_mut(&record.id).unwrap().set("title", "changed");
//!
//! let diff = cache.compute_diff()?;
//! assert_eq!(diff.modified.len(), 1);
//! cache.synchronize();
//! assert!(!cache.has_changes());
//! ```

pub mod name_index;
pub mod snapshot;

pub use name_index::NameIdIndex;
pub use snapshot::{CacheDiff, SnapshotCache};
