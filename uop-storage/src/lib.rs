//! UOP Storage - Backing Store Trait and Mock Implementation
//!
//! Defines the narrow interface the client cache needs from the persistence
//! layer, an in-memory transactional implementation for tests, and the
//! snapshot caches the client keeps on its side.

pub mod cache;

pub use cache::{CacheDiff, NameIdIndex, SnapshotCache};

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};
use uop_core::{
    apply_changes, AssocError, AssocKind, AttributeDef, ClassDef, EntityType, FieldChanges,
    MetaDef, MetaEntity, MetaId, MetaSnapshot, ObjectId, ObjectRecord, QueryDef, RoleEdge,
    StorageError, UopError, UopResult, ValidationError,
};

// ============================================================================
// BACKING STORE TRAIT
// ============================================================================

/// Backing store for objects, meta definitions and associations.
///
/// Writes made between `begin_transaction` and `commit` become durable only
/// at `commit`; `abort` discards them. Reads inside a transaction see the
/// transaction's own writes.
pub trait BackingStore: Send + Sync {
    // === Transactions ===

    /// Open a transaction.
    fn begin_transaction(&self) -> UopResult<()>;

    /// Make the open transaction's writes durable.
    fn commit(&self) -> UopResult<()>;

    /// Discard the open transaction's writes.
    fn abort(&self) -> UopResult<()>;

    // === Object Operations ===

    /// Get an object by ID.
    fn get_object(&self, id: ObjectId) -> UopResult<Option<ObjectRecord>>;

    /// Insert (or replace) an object.
    fn add_object(&self, record: &ObjectRecord) -> UopResult<()>;

    /// Apply field changes to an existing object.
    fn modify_object(&self, id: ObjectId, changes: &FieldChanges) -> UopResult<()>;

    /// Delete an object together with every association edge touching it.
    /// Deleting a missing object is a no-op.
    fn delete_object(&self, id: ObjectId) -> UopResult<()>;

    // === Meta Operations ===

    /// All meta definitions, by kind.
    fn meta_map(&self) -> UopResult<MetaSnapshot>;

    /// Association definitions of one kind.
    fn meta_definitions(&self, kind: AssocKind) -> UopResult<Vec<MetaEntity>> {
        Ok(self.meta_map()?.of_kind(kind).to_vec())
    }

    /// Return the tag or group definition named `name`, creating it if
    /// needed. For roles, resolves a forward or reverse name and fails with
    /// `InvalidRoleName` when neither matches.
    fn ensure_meta_named(&self, kind: AssocKind, name: &str) -> UopResult<MetaEntity>;

    /// Return the role `name`/`reverse_name`, creating it if needed.
    fn ensure_role(&self, name: &str, reverse_name: &str) -> UopResult<MetaEntity>;

    /// Insert (or replace) a meta definition.
    fn meta_insert(&self, def: &MetaDef) -> UopResult<()>;

    /// Apply field changes to a meta definition.
    fn meta_modify(&self, kind: EntityType, id: MetaId, changes: &FieldChanges) -> UopResult<()>;

    /// Delete a meta definition; association definitions take their edges
    /// with them. Deleting a missing definition is a no-op.
    fn meta_delete(&self, kind: EntityType, id: MetaId) -> UopResult<()>;

    /// Every reverse role name.
    fn reverse_role_names(&self) -> UopResult<HashSet<String>> {
        Ok(self
            .meta_definitions(AssocKind::Role)?
            .into_iter()
            .filter_map(|role| role.reverse_name)
            .collect())
    }

    // === Association Operations ===

    /// Subjects carrying the tag or group `meta_id` (for roles: subjects of
    /// forward edges).
    fn get_members(&self, kind: AssocKind, meta_id: MetaId) -> UopResult<HashSet<ObjectId>>;

    /// Every edge of role `role_id`.
    fn get_role_edges(&self, role_id: MetaId) -> UopResult<Vec<RoleEdge>>;

    /// Definitions of `kind` the object participates in.
    fn get_object_assocs(&self, kind: AssocKind, id: ObjectId) -> UopResult<Vec<MetaId>>;

    /// Role edges where the object is either subject or object.
    fn get_object_roles(&self, id: ObjectId) -> UopResult<Vec<RoleEdge>>;

    /// Persist an association edge. Idempotent.
    fn associate(
        &self,
        kind: AssocKind,
        subject: ObjectId,
        meta_id: MetaId,
        object: Option<ObjectId>,
    ) -> UopResult<()>;

    /// Remove an association edge. Removing a missing edge is a no-op.
    fn disassociate(
        &self,
        kind: AssocKind,
        subject: ObjectId,
        meta_id: MetaId,
        object: Option<ObjectId>,
    ) -> UopResult<()>;
}

// ============================================================================
// STORE DATA
// ============================================================================

/// Everything a [`MockStore`] holds: records plus association edge sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreData {
    pub objects: HashMap<ObjectId, ObjectRecord>,
    pub tags: HashMap<MetaId, MetaEntity>,
    pub groups: HashMap<MetaId, MetaEntity>,
    pub roles: HashMap<MetaId, MetaEntity>,
    pub classes: HashMap<MetaId, ClassDef>,
    pub attributes: HashMap<MetaId, AttributeDef>,
    pub queries: HashMap<MetaId, QueryDef>,
    pub tagged: HashSet<(MetaId, ObjectId)>,
    pub grouped: HashSet<(MetaId, ObjectId)>,
    pub related: HashSet<RoleEdge>,
}

impl StoreData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Association definitions of one kind.
    pub fn metas(&self, kind: AssocKind) -> &HashMap<MetaId, MetaEntity> {
        match kind {
            AssocKind::Tag => &self.tags,
            AssocKind::Group => &self.groups,
            AssocKind::Role => &self.roles,
        }
    }

    fn metas_mut(&mut self, kind: AssocKind) -> &mut HashMap<MetaId, MetaEntity> {
        match kind {
            AssocKind::Tag => &mut self.tags,
            AssocKind::Group => &mut self.groups,
            AssocKind::Role => &mut self.roles,
        }
    }

    fn labels_mut(&mut self, kind: AssocKind) -> Option<&mut HashSet<(MetaId, ObjectId)>> {
        match kind {
            AssocKind::Tag => Some(&mut self.tagged),
            AssocKind::Group => Some(&mut self.grouped),
            AssocKind::Role => None,
        }
    }

    fn labels(&self, kind: AssocKind) -> Option<&HashSet<(MetaId, ObjectId)>> {
        match kind {
            AssocKind::Tag => Some(&self.tagged),
            AssocKind::Group => Some(&self.grouped),
            AssocKind::Role => None,
        }
    }

    /// Definition of `kind` named `name`. Roles also match on reverse name.
    pub fn meta_named(&self, kind: AssocKind, name: &str) -> Option<&MetaEntity> {
        self.metas(kind)
            .values()
            .find(|m| m.name == name || m.reverse_name.as_deref() == Some(name))
    }

    /// Whether `id` carries the tag `name`.
    pub fn has_tag(&self, name: &str, id: ObjectId) -> bool {
        self.has_label(AssocKind::Tag, name, id)
    }

    /// Whether `id` is in the group `name`.
    pub fn has_group(&self, name: &str, id: ObjectId) -> bool {
        self.has_label(AssocKind::Group, name, id)
    }

    fn has_label(&self, kind: AssocKind, name: &str, id: ObjectId) -> bool {
        match (self.meta_named(kind, name), self.labels(kind)) {
            (Some(meta), Some(labels)) => labels.contains(&(meta.id, id)),
            _ => false,
        }
    }

    /// Whether `subject --name--> object` holds, `name` being either role name.
    pub fn has_role(&self, name: &str, subject: ObjectId, object: ObjectId) -> bool {
        let Some(role) = self.meta_named(AssocKind::Role, name) else {
            return false;
        };
        let (subject, object) = if role.name == name {
            (subject, object)
        } else {
            (object, subject)
        };
        self.related.contains(&RoleEdge {
            role_id: role.id,
            subject,
            object,
        })
    }

    /// Whether `id` appears anywhere: as an object or on any association edge.
    pub fn mentions_object(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
            || self.tagged.iter().any(|(_, o)| *o == id)
            || self.grouped.iter().any(|(_, o)| *o == id)
            || self.related.iter().any(|e| e.subject == id || e.object == id)
    }

    fn purge_object(&mut self, id: ObjectId) {
        self.objects.remove(&id);
        self.tagged.retain(|(_, o)| *o != id);
        self.grouped.retain(|(_, o)| *o != id);
        self.related.retain(|e| e.subject != id && e.object != id);
    }

    fn purge_meta(&mut self, kind: AssocKind, meta_id: MetaId) {
        if kind == AssocKind::Role {
            self.related.retain(|e| e.role_id != meta_id);
        } else if let Some(labels) = self.labels_mut(kind) {
            labels.retain(|(m, _)| *m != meta_id);
        }
    }

    fn snapshot(&self) -> MetaSnapshot {
        MetaSnapshot {
            tags: self.tags.values().cloned().collect(),
            groups: self.groups.values().cloned().collect(),
            roles: self.roles.values().cloned().collect(),
            classes: self.classes.values().cloned().collect(),
            attributes: self.attributes.values().cloned().collect(),
            queries: self.queries.values().cloned().collect(),
        }
    }
}

// ============================================================================
// MOCK STORE
// ============================================================================

/// Operations a [`MockStore`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Begin,
    Commit,
    Abort,
    AddObject,
    ModifyObject,
    DeleteObject,
    MetaInsert,
    MetaModify,
    MetaDelete,
    Associate,
    Disassociate,
}

impl fmt::Display for FailPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Default)]
struct MockState {
    committed: StoreData,
    working: Option<StoreData>,
    fail_points: HashSet<FailPoint>,
    writes: u64,
    commits: u64,
}

impl MockState {
    fn check(&self, point: FailPoint) -> UopResult<()> {
        if self.fail_points.contains(&point) {
            return Err(UopError::Storage(StorageError::Injected {
                point: point.to_string(),
            }));
        }
        Ok(())
    }

    fn view(&self) -> &StoreData {
        self.working.as_ref().unwrap_or(&self.committed)
    }
}

/// In-memory transactional store for testing.
///
/// Clones share the same underlying data, so a test can hand one handle to a
/// client session and keep another to inspect what was committed. Writes
/// outside a transaction are applied directly.
#[derive(Debug, Clone, Default)]
pub struct MockStore {
    state: Arc<RwLock<MockState>>,
}

impl MockStore {
    /// Create an empty mock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock store already holding `data` as committed state.
    pub fn with_data(data: StoreData) -> Self {
        let store = Self::new();
        if let Ok(mut state) = store.state.write() {
            state.committed = data;
        }
        store
    }

    /// Make every later call of `point` fail until [`Self::clear_failures`].
    ///
    /// [`clear_failures`]: MockStore::clear_failures
    pub fn fail_on(&self, point: FailPoint) -> UopResult<()> {
        self.lock_write()?.fail_points.insert(point);
        Ok(())
    }

    pub fn clear_failures(&self) -> UopResult<()> {
        self.lock_write()?.fail_points.clear();
        Ok(())
    }

    /// Copy of the committed data.
    pub fn committed(&self) -> UopResult<StoreData> {
        Ok(self.lock_read()?.committed.clone())
    }

    /// Whether a transaction is open.
    pub fn in_transaction(&self) -> UopResult<bool> {
        Ok(self.lock_read()?.working.is_some())
    }

    /// Number of successful write calls so far.
    pub fn write_count(&self) -> UopResult<u64> {
        Ok(self.lock_read()?.writes)
    }

    /// Number of successful commits so far.
    pub fn commit_count(&self) -> UopResult<u64> {
        Ok(self.lock_read()?.commits)
    }

    fn lock_read(&self) -> UopResult<std::sync::RwLockReadGuard<'_, MockState>> {
        self.state
            .read()
            .map_err(|_| UopError::Storage(StorageError::LockPoisoned))
    }

    fn lock_write(&self) -> UopResult<std::sync::RwLockWriteGuard<'_, MockState>> {
        self.state
            .write()
            .map_err(|_| UopError::Storage(StorageError::LockPoisoned))
    }

    fn read<R>(&self, f: impl FnOnce(&StoreData) -> R) -> UopResult<R> {
        let state = self.lock_read()?;
        Ok(f(state.view()))
    }

    fn write<R>(
        &self,
        point: FailPoint,
        f: impl FnOnce(&mut StoreData) -> UopResult<R>,
    ) -> UopResult<R> {
        let mut guard = self.lock_write()?;
        guard.check(point)?;
        let state = &mut *guard;
        let data = match state.working.as_mut() {
            Some(working) => working,
            None => &mut state.committed,
        };
        let result = f(data)?;
        state.writes += 1;
        Ok(result)
    }
}

fn missing(entity_type: EntityType, id: impl ToString) -> UopError {
    UopError::Storage(StorageError::NotFound {
        entity_type,
        id: id.to_string(),
    })
}

fn role_needs_object() -> UopError {
    UopError::Validation(ValidationError::InvalidValue {
        field: "object".to_string(),
        reason: "a role association needs an object".to_string(),
    })
}

fn modified<T>(record: &T, changes: &FieldChanges, entity_type: EntityType, id: MetaId) -> UopResult<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    apply_changes(record, changes).map_err(|err| {
        UopError::Storage(StorageError::UpdateFailed {
            entity_type,
            id: id.to_string(),
            reason: err.to_string(),
        })
    })
}

impl BackingStore for MockStore {
    // === Transactions ===

    fn begin_transaction(&self) -> UopResult<()> {
        let mut state = self.lock_write()?;
        state.check(FailPoint::Begin)?;
        if state.working.is_some() {
            return Err(UopError::Storage(StorageError::TransactionFailed {
                reason: "transaction already open".to_string(),
            }));
        }
        state.working = Some(state.committed.clone());
        Ok(())
    }

    fn commit(&self) -> UopResult<()> {
        let mut state = self.lock_write()?;
        state.check(FailPoint::Commit)?;
        let working = state
            .working
            .take()
            .ok_or(UopError::Storage(StorageError::NoTransaction))?;
        state.committed = working;
        state.commits += 1;
        Ok(())
    }

    fn abort(&self) -> UopResult<()> {
        let mut state = self.lock_write()?;
        state.check(FailPoint::Abort)?;
        state.working = None;
        Ok(())
    }

    // === Object Operations ===

    fn get_object(&self, id: ObjectId) -> UopResult<Option<ObjectRecord>> {
        self.read(|data| data.objects.get(&id).cloned())
    }

    fn add_object(&self, record: &ObjectRecord) -> UopResult<()> {
        self.write(FailPoint::AddObject, |data| {
            data.objects.insert(record.id, record.clone());
            Ok(())
        })
    }

    fn modify_object(&self, id: ObjectId, changes: &FieldChanges) -> UopResult<()> {
        self.write(FailPoint::ModifyObject, |data| {
            let object = data
                .objects
                .get_mut(&id)
                .ok_or_else(|| missing(EntityType::Object, id))?;
            *object = apply_changes(&*object, changes).map_err(|err| {
                UopError::Storage(StorageError::UpdateFailed {
                    entity_type: EntityType::Object,
                    id: id.to_string(),
                    reason: err.to_string(),
                })
            })?;
            Ok(())
        })
    }

    fn delete_object(&self, id: ObjectId) -> UopResult<()> {
        self.write(FailPoint::DeleteObject, |data| {
            data.purge_object(id);
            Ok(())
        })
    }

    // === Meta Operations ===

    fn meta_map(&self) -> UopResult<MetaSnapshot> {
        self.read(StoreData::snapshot)
    }

    fn meta_definitions(&self, kind: AssocKind) -> UopResult<Vec<MetaEntity>> {
        self.read(|data| data.metas(kind).values().cloned().collect())
    }

    fn ensure_meta_named(&self, kind: AssocKind, name: &str) -> UopResult<MetaEntity> {
        if let Some(meta) = self.read(|data| data.meta_named(kind, name).cloned())? {
            return Ok(meta);
        }
        if kind == AssocKind::Role {
            return Err(UopError::Assoc(AssocError::InvalidRoleName {
                name: name.to_string(),
            }));
        }
        self.write(FailPoint::MetaInsert, |data| {
            if let Some(meta) = data.meta_named(kind, name) {
                return Ok(meta.clone());
            }
            let meta = MetaEntity::new(kind, name);
            data.metas_mut(kind).insert(meta.id, meta.clone());
            Ok(meta)
        })
    }

    fn ensure_role(&self, name: &str, reverse_name: &str) -> UopResult<MetaEntity> {
        if name == reverse_name {
            return Err(UopError::Validation(ValidationError::InvalidValue {
                field: "reverse_name".to_string(),
                reason: "a role's reverse name must differ from its name".to_string(),
            }));
        }
        self.write(FailPoint::MetaInsert, |data| {
            for role in data.roles.values() {
                let reverse = role.reverse_name.as_deref();
                if role.name == name && reverse == Some(reverse_name) {
                    return Ok(role.clone());
                }
                for candidate in [name, reverse_name] {
                    if role.name == candidate || reverse == Some(candidate) {
                        return Err(UopError::Assoc(AssocError::DuplicateRoleName {
                            name: candidate.to_string(),
                        }));
                    }
                }
            }
            let role = MetaEntity::role(name, reverse_name);
            data.roles.insert(role.id, role.clone());
            Ok(role)
        })
    }

    fn meta_insert(&self, def: &MetaDef) -> UopResult<()> {
        self.write(FailPoint::MetaInsert, |data| {
            match def {
                MetaDef::Tag(m) | MetaDef::Group(m) | MetaDef::Role(m) => {
                    data.metas_mut(m.kind).insert(m.id, m.clone());
                }
                MetaDef::Class(c) => {
                    data.classes.insert(c.id, c.clone());
                }
                MetaDef::Attribute(a) => {
                    data.attributes.insert(a.id, a.clone());
                }
                MetaDef::Query(q) => {
                    data.queries.insert(q.id, q.clone());
                }
            }
            Ok(())
        })
    }

    fn meta_modify(&self, kind: EntityType, id: MetaId, changes: &FieldChanges) -> UopResult<()> {
        self.write(FailPoint::MetaModify, |data| {
            match kind {
                EntityType::Tag | EntityType::Group | EntityType::Role => {
                    let assoc = kind.assoc_kind().ok_or_else(|| missing(kind, id))?;
                    let meta = data
                        .metas_mut(assoc)
                        .get_mut(&id)
                        .ok_or_else(|| missing(kind, id))?;
                    *meta = modified(&*meta, changes, kind, id)?;
                }
                EntityType::Class => {
                    let class = data.classes.get_mut(&id).ok_or_else(|| missing(kind, id))?;
                    *class = modified(&*class, changes, kind, id)?;
                }
                EntityType::Attribute => {
                    let attr = data
                        .attributes
                        .get_mut(&id)
                        .ok_or_else(|| missing(kind, id))?;
                    *attr = modified(&*attr, changes, kind, id)?;
                }
                EntityType::Query => {
                    let query = data.queries.get_mut(&id).ok_or_else(|| missing(kind, id))?;
                    *query = modified(&*query, changes, kind, id)?;
                }
                EntityType::Object => {
                    return Err(UopError::Validation(ValidationError::WrongKind {
                        expected: EntityType::Class,
                        got: EntityType::Object,
                    }))
                }
            }
            Ok(())
        })
    }

    fn meta_delete(&self, kind: EntityType, id: MetaId) -> UopResult<()> {
        self.write(FailPoint::MetaDelete, |data| {
            match kind {
                EntityType::Tag | EntityType::Group | EntityType::Role => {
                    if let Some(assoc) = kind.assoc_kind() {
                        data.metas_mut(assoc).remove(&id);
                        data.purge_meta(assoc, id);
                    }
                }
                EntityType::Class => {
                    data.classes.remove(&id);
                }
                EntityType::Attribute => {
                    data.attributes.remove(&id);
                }
                EntityType::Query => {
                    data.queries.remove(&id);
                }
                EntityType::Object => {
                    return Err(UopError::Validation(ValidationError::WrongKind {
                        expected: EntityType::Class,
                        got: EntityType::Object,
                    }))
                }
            }
            Ok(())
        })
    }

    // === Association Operations ===

    fn get_members(&self, kind: AssocKind, meta_id: MetaId) -> UopResult<HashSet<ObjectId>> {
        self.read(|data| match data.labels(kind) {
            Some(labels) => labels
                .iter()
                .filter(|(m, _)| *m == meta_id)
                .map(|(_, o)| *o)
                .collect(),
            None => data
                .related
                .iter()
                .filter(|e| e.role_id == meta_id)
                .map(|e| e.subject)
                .collect(),
        })
    }

    fn get_role_edges(&self, role_id: MetaId) -> UopResult<Vec<RoleEdge>> {
        self.read(|data| {
            data.related
                .iter()
                .filter(|e| e.role_id == role_id)
                .copied()
                .collect()
        })
    }

    fn get_object_assocs(&self, kind: AssocKind, id: ObjectId) -> UopResult<Vec<MetaId>> {
        self.read(|data| match data.labels(kind) {
            Some(labels) => labels
                .iter()
                .filter(|(_, o)| *o == id)
                .map(|(m, _)| *m)
                .collect(),
            None => {
                let ids: HashSet<MetaId> = data
                    .related
                    .iter()
                    .filter(|e| e.subject == id || e.object == id)
                    .map(|e| e.role_id)
                    .collect();
                ids.into_iter().collect()
            }
        })
    }

    fn get_object_roles(&self, id: ObjectId) -> UopResult<Vec<RoleEdge>> {
        self.read(|data| {
            data.related
                .iter()
                .filter(|e| e.subject == id || e.object == id)
                .copied()
                .collect()
        })
    }

    fn associate(
        &self,
        kind: AssocKind,
        subject: ObjectId,
        meta_id: MetaId,
        object: Option<ObjectId>,
    ) -> UopResult<()> {
        self.write(FailPoint::Associate, |data| {
            if !data.metas(kind).contains_key(&meta_id) {
                return Err(missing(kind.entity_type(), meta_id));
            }
            if kind != AssocKind::Role {
                if let Some(labels) = data.labels_mut(kind) {
                    labels.insert((meta_id, subject));
                }
                return Ok(());
            }
            let object = object.ok_or_else(role_needs_object)?;
            data.related.insert(RoleEdge {
                role_id: meta_id,
                subject,
                object,
            });
            Ok(())
        })
    }

    fn disassociate(
        &self,
        kind: AssocKind,
        subject: ObjectId,
        meta_id: MetaId,
        object: Option<ObjectId>,
    ) -> UopResult<()> {
        self.write(FailPoint::Disassociate, |data| {
            if kind != AssocKind::Role {
                if let Some(labels) = data.labels_mut(kind) {
                    labels.remove(&(meta_id, subject));
                }
                return Ok(());
            }
            let object = object.ok_or_else(role_needs_object)?;
            data.related.remove(&RoleEdge {
                role_id: meta_id,
                subject,
                object,
            });
            Ok(())
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
