//! Client state: snapshot caches, association indices and the transaction
//! lifecycle.
//!
//! Association edits are written to the store as they happen, inside the
//! store transaction. Record edits (objects and meta definitions) stay in the
//! snapshot caches until `commit`, which pushes their diffs and commits the
//! store transaction.

use crate::assoc::{GroupIndex, Members, RoleIndex, SubjectAssocs, TagIndex};
use crate::meta_context::MetaContext;
use std::collections::{HashSet, VecDeque};
use uop_core::{
    apply_changes, Assoc, AssocError, AssocKind, AttributeDef, ClassDef, ClientConfig, EntityType,
    FieldChanges, MetaDef, MetaEntity, MetaId, ObjectId, ObjectRecord, QueryDef, StorageError,
    TransactionError, TxnState, UopError, UopResult, ValidationError,
};
use uop_storage::{BackingStore, CacheDiff, SnapshotCache};
use uuid::Uuid;

/// Run `$body` with `$index` bound to the association index for `$kind`.
macro_rules! with_index {
    (ref $state:expr, $kind:expr, |$index:ident| $body:expr) => {
        match $kind {
            AssocKind::Tag => {
                let $index = &$state.tag_index;
                $body
            }
            AssocKind::Group => {
                let $index = &$state.group_index;
                $body
            }
            AssocKind::Role => {
                let $index = &$state.role_index;
                $body
            }
        }
    };
    ($state:expr, $kind:expr, |$index:ident| $body:expr) => {
        match $kind {
            AssocKind::Tag => {
                let $index = &mut $state.tag_index;
                $body
            }
            AssocKind::Group => {
                let $index = &mut $state.group_index;
                $body
            }
            AssocKind::Role => {
                let $index = &mut $state.role_index;
                $body
            }
        }
    };
}

// ============================================================================
// CHANGE SET
// ============================================================================

/// Pending changes of every cache, in push order.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub tags: CacheDiff<MetaId, MetaEntity>,
    pub groups: CacheDiff<MetaId, MetaEntity>,
    pub roles: CacheDiff<MetaId, MetaEntity>,
    pub classes: CacheDiff<MetaId, ClassDef>,
    pub attributes: CacheDiff<MetaId, AttributeDef>,
    pub queries: CacheDiff<MetaId, QueryDef>,
    pub objects: CacheDiff<ObjectId, ObjectRecord>,
}

fn tally<K: Eq + std::hash::Hash, V>(diff: &CacheDiff<K, V>) -> [usize; 3] {
    [diff.inserted.len(), diff.modified.len(), diff.deleted.len()]
}

impl ChangeSet {
    /// Inserted, modified and deleted counts over every cache.
    pub fn counts(&self) -> [usize; 3] {
        [
            tally(&self.tags),
            tally(&self.groups),
            tally(&self.roles),
            tally(&self.classes),
            tally(&self.attributes),
            tally(&self.queries),
            tally(&self.objects),
        ]
        .into_iter()
        .fold([0; 3], |acc, t| [acc[0] + t[0], acc[1] + t[1], acc[2] + t[2]])
    }

    pub fn len(&self) -> usize {
        self.counts().iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// CLIENT STATE
// ============================================================================

fn object_persisted(objects: &SnapshotCache<ObjectId, ObjectRecord>, id: ObjectId) -> bool {
    !objects.is_known(&id) || objects.is_original(&id)
}

fn reset<K, V>(cache: &mut SnapshotCache<K, V>, entries: impl IntoIterator<Item = (K, V)>)
where
    K: Eq + std::hash::Hash + Clone,
    V: Clone + PartialEq + serde::Serialize,
{
    cache.clear();
    cache.load_originals(entries);
}

fn not_found(entity_type: EntityType, id: impl ToString) -> UopError {
    UopError::Storage(StorageError::NotFound {
        entity_type,
        id: id.to_string(),
    })
}

fn name_taken(field: &str, name: &str) -> UopError {
    UopError::Validation(ValidationError::InvalidValue {
        field: field.to_string(),
        reason: format!("{name} is already defined"),
    })
}

fn push_meta<S, T>(
    store: &S,
    kind: EntityType,
    diff: &CacheDiff<MetaId, T>,
    wrap: fn(T) -> MetaDef,
) -> UopResult<()>
where
    S: BackingStore + ?Sized,
    T: Clone,
{
    for value in diff.inserted.values() {
        store.meta_insert(&wrap(value.clone()))?;
    }
    for (id, changes) in &diff.modified {
        store.meta_modify(kind, *id, changes)?;
    }
    for id in diff.deleted.keys() {
        store.meta_delete(kind, *id)?;
    }
    Ok(())
}

fn updated<T>(
    cache: &SnapshotCache<MetaId, T>,
    kind: EntityType,
    id: MetaId,
    changes: &FieldChanges,
) -> UopResult<(T, T)>
where
    T: Clone + PartialEq + serde::Serialize + serde::de::DeserializeOwned,
{
    let old = cache.get(&id).cloned().ok_or_else(|| not_found(kind, id))?;
    if let Some(field) = ["id", "kind"].into_iter().find(|f| changes.contains_key(*f)) {
        return Err(UopError::Validation(ValidationError::InvalidValue {
            field: field.to_string(),
            reason: format!("definition {field} cannot change"),
        }));
    }
    let new = apply_changes(&old, changes)?;
    Ok((old, new))
}

/// Transactional client cache over a [`BackingStore`].
#[derive(Debug)]
pub struct ClientState<S: BackingStore> {
    store: S,
    config: ClientConfig,
    txn: TxnState,
    objects: SnapshotCache<ObjectId, ObjectRecord>,
    tags: SnapshotCache<MetaId, MetaEntity>,
    groups: SnapshotCache<MetaId, MetaEntity>,
    roles: SnapshotCache<MetaId, MetaEntity>,
    classes: SnapshotCache<MetaId, ClassDef>,
    attributes: SnapshotCache<MetaId, AttributeDef>,
    queries: SnapshotCache<MetaId, QueryDef>,
    tag_index: TagIndex,
    group_index: GroupIndex,
    role_index: RoleIndex,
    meta: MetaContext,
}

impl<S: BackingStore> ClientState<S> {
    /// Create a client over `store`, loading every meta definition.
    pub fn new(store: S, config: ClientConfig) -> UopResult<Self> {
        config.validate()?;
        let mut state = Self {
            store,
            config,
            txn: TxnState::Idle,
            objects: SnapshotCache::new(),
            tags: SnapshotCache::new(),
            groups: SnapshotCache::new(),
            roles: SnapshotCache::new(),
            classes: SnapshotCache::new(),
            attributes: SnapshotCache::new(),
            queries: SnapshotCache::new(),
            tag_index: TagIndex::new(),
            group_index: GroupIndex::new(),
            role_index: RoleIndex::new(),
            meta: MetaContext::new(),
        };
        state.reload_meta()?;
        tracing::info!(
            tags = state.tags.len(),
            groups = state.groups.len(),
            roles = state.roles.len(),
            classes = state.classes.len(),
            "Client state loaded"
        );
        Ok(state)
    }

    // === Transaction Lifecycle ===

    pub fn state(&self) -> TxnState {
        self.txn
    }

    pub fn in_transaction(&self) -> bool {
        self.txn == TxnState::InTransaction
    }

    pub fn begin_transaction(&mut self) -> UopResult<()> {
        if self.in_transaction() {
            return Err(TransactionError::AlreadyActive.into());
        }
        self.store.begin_transaction()?;
        self.txn = TxnState::InTransaction;
        tracing::info!("Transaction started");
        Ok(())
    }

    /// Push every pending change, commit the store and re-baseline.
    ///
    /// On failure nothing is synchronized and the transaction stays open, so
    /// the caller can retry or abort.
    pub fn commit(&mut self) -> UopResult<()> {
        self.require_transaction()?;
        if self.config.verify_on_commit {
            if let Err(err) = self.verify() {
                tracing::warn!(error = %err, "Index verification failed, commit refused");
                return Err(err);
            }
        }

        let changes = self.pending_changes()?;
        if let Err(err) = self
            .push_changes(&changes)
            .and_then(|()| self.store.commit())
        {
            tracing::warn!(error = %err, pending = changes.len(), "Commit failed, transaction left open");
            return Err(err);
        }

        self.objects.synchronize();
        self.tags.synchronize();
        self.groups.synchronize();
        self.roles.synchronize();
        self.classes.synchronize();
        self.attributes.synchronize();
        self.queries.synchronize();
        self.clear_indices();
        self.txn = TxnState::Idle;
        self.reload_meta()?;

        let [inserted, modified, deleted] = changes.counts();
        tracing::info!(inserted, modified, deleted, "Transaction committed");
        Ok(())
    }

    /// Discard every in-memory edit, abort the store transaction and reload
    /// meta definitions. Also valid outside a transaction.
    pub fn abort(&mut self) -> UopResult<()> {
        let was_active = self.in_transaction();
        self.store.abort()?;
        self.objects.clear();
        self.clear_indices();
        self.txn = TxnState::Idle;
        self.reload_meta()?;
        tracing::info!(was_active, "Transaction aborted");
        Ok(())
    }

    // === Associations ===

    /// Record an association of any kind.
    pub fn associate(&mut self, assoc: &Assoc) -> UopResult<()> {
        self.require_transaction()?;
        if self.meta_definition(assoc.kind, &assoc.name).is_none() {
            self.flush_deleted_definitions(assoc.kind, &[assoc.name.as_str()])?;
        }
        let objects = &self.objects;
        let store = &self.store;
        let persisted = |id: ObjectId| object_persisted(objects, id);
        with_index!(self, assoc.kind, |index| index.associate(
            store,
            persisted,
            assoc.subject,
            &assoc.name,
            assoc.object
        ))?;
        self.track_definitions(assoc.kind);
        Ok(())
    }

    /// Remove an association of any kind.
    pub fn disassociate(&mut self, assoc: &Assoc) -> UopResult<()> {
        self.require_transaction()?;
        let store = &self.store;
        with_index!(self, assoc.kind, |index| index.disassociate(
            store,
            assoc.subject,
            &assoc.name,
            assoc.object
        ))
    }

    pub fn tag(&mut self, id: ObjectId, name: &str) -> UopResult<()> {
        self.associate(&Assoc::tag(id, name))
    }

    pub fn untag(&mut self, id: ObjectId, name: &str) -> UopResult<()> {
        self.disassociate(&Assoc::tag(id, name))
    }

    pub fn group(&mut self, id: ObjectId, name: &str) -> UopResult<()> {
        self.associate(&Assoc::group(id, name))
    }

    pub fn ungroup(&mut self, id: ObjectId, name: &str) -> UopResult<()> {
        self.disassociate(&Assoc::group(id, name))
    }

    /// Relate `subject` to `object`; `role` may be a forward or reverse name.
    pub fn relate(&mut self, subject: ObjectId, role: &str, object: ObjectId) -> UopResult<()> {
        self.associate(&Assoc::role(subject, role, object))
    }

    pub fn unrelate(&mut self, subject: ObjectId, role: &str, object: ObjectId) -> UopResult<()> {
        self.disassociate(&Assoc::role(subject, role, object))
    }

    pub fn add_assocs(&mut self, assocs: &[Assoc]) -> UopResult<()> {
        for assoc in assocs {
            self.associate(assoc)?;
        }
        Ok(())
    }

    pub fn remove_assocs(&mut self, assocs: &[Assoc]) -> UopResult<()> {
        for assoc in assocs {
            self.disassociate(assoc)?;
        }
        Ok(())
    }

    /// Whether the association holds, loading whatever it touches.
    pub fn assoc_present(&mut self, assoc: &Assoc) -> UopResult<bool> {
        let objects = &self.objects;
        let store = &self.store;
        let persisted = |id: ObjectId| object_persisted(objects, id);
        with_index!(self, assoc.kind, |index| index.edge_state(
            store,
            persisted,
            assoc.subject,
            &assoc.name,
            assoc.object
        ))
    }

    /// Whether every association holds.
    pub fn assocs_present(&mut self, assocs: &[Assoc]) -> UopResult<bool> {
        for assoc in assocs {
            if !self.assoc_present(assoc)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether none of the associations holds.
    pub fn assocs_not_present(&mut self, assocs: &[Assoc]) -> UopResult<bool> {
        for assoc in assocs {
            if self.assoc_present(assoc)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether `id` appears in any loaded association index.
    pub fn assoc_obj_present(&self, id: ObjectId) -> bool {
        self.tag_index.object_present(id)
            || self.group_index.object_present(id)
            || self.role_index.object_present(id)
    }

    /// Associations of one kind for an object, loaded on first access.
    pub fn for_object(&mut self, kind: AssocKind, id: ObjectId) -> UopResult<&SubjectAssocs> {
        let objects = &self.objects;
        let store = &self.store;
        let persisted = |id: ObjectId| object_persisted(objects, id);
        with_index!(self, kind, |index| index.for_subject(store, persisted, id))
    }

    /// Sorted association names of one kind for an object.
    pub fn object_assoc_names(&mut self, kind: AssocKind, id: ObjectId) -> UopResult<Vec<String>> {
        let mut names: Vec<String> = self.for_object(kind, id)?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Everything filed under an association name. `None` for unknown names.
    pub fn for_meta(&mut self, kind: AssocKind, name: &str) -> UopResult<Option<&Members>> {
        let store = &self.store;
        with_index!(self, kind, |index| index.for_meta(store, name))
    }

    /// Every loaded association of one kind.
    pub fn all_assocs(&self, kind: AssocKind) -> Vec<Assoc> {
        with_index!(ref self, kind, |index| index.all_assocs())
    }

    /// Check every association index for internal consistency.
    pub fn verify(&self) -> UopResult<()> {
        self.tag_index.verify()?;
        self.group_index.verify()?;
        self.role_index.verify()
    }

    // === Objects ===

    /// The object's current value, read from the store on first access.
    pub fn get_object(&mut self, id: ObjectId) -> UopResult<Option<&ObjectRecord>> {
        if !self.objects.is_known(&id) {
            if let Some(record) = self.store.get_object(id)? {
                tracing::debug!(object = %id, "Loaded object");
                self.objects.load_original(id, record);
            }
        }
        Ok(self.objects.get(&id))
    }

    pub fn ensure_object(&mut self, id: ObjectId) -> UopResult<&ObjectRecord> {
        self.get_object(id)?
            .ok_or_else(|| not_found(EntityType::Object, id))
    }

    pub fn object_present(&mut self, id: ObjectId) -> UopResult<bool> {
        Ok(self.get_object(id)?.is_some())
    }

    /// Load objects from the store, plus their associations when
    /// `load_associations` is set. Returns how many were read.
    pub fn load_objects(&mut self, ids: impl IntoIterator<Item = ObjectId>) -> UopResult<usize> {
        let mut loaded = 0;
        for id in ids {
            if self.objects.is_known(&id) {
                continue;
            }
            let Some(record) = self.store.get_object(id)? else {
                continue;
            };
            self.objects.load_original(id, record);
            loaded += 1;
            if self.config.load_associations {
                for kind in AssocKind::ALL {
                    self.for_object(kind, id)?;
                }
            }
        }
        tracing::debug!(loaded, "Loaded objects");
        Ok(loaded)
    }

    /// Seed the cache with records already known to be persisted.
    pub fn load_instances(&mut self, records: impl IntoIterator<Item = ObjectRecord>) -> usize {
        let mut count = 0;
        for record in records {
            self.objects.load_original(record.id, record);
            count += 1;
        }
        count
    }

    /// Put an object in the cache: as a pending insert when `is_new`, as a
    /// persisted record otherwise.
    pub fn add_object(&mut self, record: ObjectRecord, is_new: bool) -> UopResult<ObjectId> {
        self.require_transaction()?;
        let id = record.id;
        if is_new || self.objects.is_known(&id) {
            self.objects.set(id, record);
        } else {
            self.objects.load_original(id, record);
        }
        Ok(id)
    }

    /// Create an instance of `class_name` with default attribute values.
    pub fn create_instance(&mut self, class_name: &str) -> UopResult<ObjectId> {
        self.require_transaction()?;
        let class = self.meta.class(class_name).ok_or_else(|| {
            UopError::Validation(ValidationError::UnknownClass {
                name: class_name.to_string(),
            })
        })?;
        let mut record = ObjectRecord::of_class(class.id);
        for attr in self.meta.attributes_of(class) {
            record.set(attr.name.clone(), attr.attr_type.default_value());
        }
        let id = record.id;
        self.objects.set(id, record);
        tracing::debug!(object = %id, class = class_name, "Created instance");
        Ok(id)
    }

    /// Set attributes of an object. A null value removes the attribute.
    pub fn update_object(
        &mut self,
        id: ObjectId,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> UopResult<()> {
        self.require_transaction()?;
        if let Some(reserved) = fields.keys().find(|k| *k == "id" || *k == "class_id") {
            return Err(UopError::Validation(ValidationError::InvalidValue {
                field: reserved.clone(),
                reason: "reserved field cannot be set as an attribute".to_string(),
            }));
        }
        self.ensure_object(id)?;
        let record = self
            .objects
            .get_mut(&id)
            .ok_or_else(|| not_found(EntityType::Object, id))?;
        for (key, value) in fields {
            if value.is_null() {
                record.attributes.remove(&key);
            } else {
                record.attributes.insert(key, value);
            }
        }
        Ok(())
    }

    /// Delete an object and every association it takes part in.
    pub fn delete_object(&mut self, id: ObjectId) -> UopResult<()> {
        self.require_transaction()?;
        self.ensure_object(id)?;

        for kind in AssocKind::ALL {
            let assocs: Vec<(String, HashSet<ObjectId>)> = self
                .for_object(kind, id)?
                .iter()
                .map(|(name, peers)| (name.clone(), peers.clone()))
                .collect();
            for (name, peers) in assocs {
                if kind.is_directed() {
                    for peer in peers {
                        self.disassociate(&Assoc::role(id, name.as_str(), peer))?;
                    }
                } else {
                    self.disassociate(&Assoc {
                        kind,
                        subject: id,
                        name,
                        object: None,
                    })?;
                }
            }
        }

        self.objects.delete(&id);
        self.tag_index.delete_subject(id);
        self.group_index.delete_subject(id);
        self.role_index.delete_subject(id);
        tracing::debug!(object = %id, "Deleted object");
        Ok(())
    }

    /// An object with every association it takes part in.
    pub fn get_object_and_associations(
        &mut self,
        id: ObjectId,
    ) -> UopResult<Option<(ObjectRecord, Vec<Assoc>)>> {
        let Some(record) = self.get_object(id)?.cloned() else {
            return Ok(None);
        };
        let mut assocs = Vec::new();
        for kind in AssocKind::ALL {
            for (name, peers) in self.for_object(kind, id)? {
                if kind.is_directed() {
                    assocs.extend(peers.iter().map(|peer| Assoc::role(id, name.as_str(), *peer)));
                } else {
                    assocs.push(Assoc {
                        kind,
                        subject: id,
                        name: name.clone(),
                        object: None,
                    });
                }
            }
        }
        Ok(Some((record, assocs)))
    }

    // === Meta Definitions ===

    /// Return the role `name`/`reverse_name`, creating it if needed.
    pub fn define_role(&mut self, name: &str, reverse_name: &str) -> UopResult<MetaEntity> {
        self.require_transaction()?;
        self.flush_deleted_definitions(AssocKind::Role, &[name, reverse_name])?;
        let role = self.role_index.define_role(&self.store, name, reverse_name)?;
        self.track_definitions(AssocKind::Role);
        Ok(role)
    }

    /// Add a meta definition. Association definitions go to the store at
    /// once so edges can refer to them; the rest are pushed at commit.
    pub fn add_meta(&mut self, def: MetaDef) -> UopResult<MetaId> {
        self.require_transaction()?;
        let id = def.id();
        match &def {
            MetaDef::Tag(meta) | MetaDef::Group(meta) | MetaDef::Role(meta) => {
                let kind = meta.kind;
                if kind.entity_type() != def.entity_type() {
                    return Err(UopError::Validation(ValidationError::WrongKind {
                        expected: def.entity_type(),
                        got: kind.entity_type(),
                    }));
                }
                self.check_assoc_names(meta, None)?;
                let names: Vec<&str> = std::iter::once(meta.name.as_str())
                    .chain(meta.reverse_name.as_deref())
                    .collect();
                self.flush_deleted_definitions(kind, &names)?;
                self.store.meta_insert(&def)?;
                self.assoc_cache_mut(kind).load_original(meta.id, meta.clone());
                with_index!(self, kind, |index| index.add_definition(meta.clone()));
            }
            MetaDef::Class(class) => {
                if self.meta.class(&class.name).is_some() {
                    return Err(name_taken("name", &class.name));
                }
                self.classes.set(class.id, class.clone());
                self.meta.insert(&def);
            }
            MetaDef::Attribute(attr) => {
                if self.meta.attribute(&attr.name).is_some() {
                    return Err(name_taken("name", &attr.name));
                }
                self.attributes.set(attr.id, attr.clone());
                self.meta.insert(&def);
            }
            MetaDef::Query(query) => {
                if self.meta.query(&query.name).is_some() {
                    return Err(name_taken("name", &query.name));
                }
                self.queries.set(query.id, query.clone());
                self.meta.insert(&def);
            }
        }
        tracing::debug!(kind = %def.entity_type(), name = def.name(), %id, "Added definition");
        Ok(id)
    }

    /// Apply field changes to a meta definition.
    pub fn update_meta(
        &mut self,
        kind: EntityType,
        id: MetaId,
        changes: &FieldChanges,
    ) -> UopResult<()> {
        self.require_transaction()?;
        match kind {
            EntityType::Tag | EntityType::Group | EntityType::Role => {
                let assoc_kind = kind.assoc_kind().ok_or_else(|| not_found(kind, id))?;
                let (old, new) = updated(self.assoc_cache(assoc_kind), kind, id, changes)?;
                self.check_assoc_names(&new, Some(&old))?;
                self.assoc_cache_mut(assoc_kind).set(id, new.clone());
                with_index!(self, assoc_kind, |index| index.replace_meta(&old, &new));
            }
            EntityType::Class => {
                let (_, new) = updated(&self.classes, kind, id, changes)?;
                self.classes.set(id, new.clone());
                self.meta.insert(&MetaDef::Class(new));
            }
            EntityType::Attribute => {
                let (_, new) = updated(&self.attributes, kind, id, changes)?;
                self.attributes.set(id, new.clone());
                self.meta.insert(&MetaDef::Attribute(new));
            }
            EntityType::Query => {
                let (_, new) = updated(&self.queries, kind, id, changes)?;
                self.queries.set(id, new.clone());
                self.meta.insert(&MetaDef::Query(new));
            }
            EntityType::Object => {
                return Err(UopError::Validation(ValidationError::WrongKind {
                    expected: EntityType::Class,
                    got: EntityType::Object,
                }))
            }
        }
        tracing::debug!(%kind, %id, fields = changes.len(), "Updated definition");
        Ok(())
    }

    /// Delete a meta definition. Association definitions take their loaded
    /// buckets with them; the store drops the edges at commit.
    pub fn delete_meta(&mut self, kind: EntityType, id: MetaId) -> UopResult<()> {
        self.require_transaction()?;
        match kind {
            EntityType::Tag | EntityType::Group | EntityType::Role => {
                let assoc_kind = kind.assoc_kind().ok_or_else(|| not_found(kind, id))?;
                let meta = self
                    .assoc_cache_mut(assoc_kind)
                    .delete(&id)
                    .ok_or_else(|| not_found(kind, id))?;
                with_index!(self, assoc_kind, |index| index.remove_meta(&meta));
            }
            EntityType::Class => {
                self.classes.delete(&id).ok_or_else(|| not_found(kind, id))?;
                self.meta.remove(kind, id);
            }
            EntityType::Attribute => {
                self.attributes.delete(&id).ok_or_else(|| not_found(kind, id))?;
                self.meta.remove(kind, id);
            }
            EntityType::Query => {
                self.queries.delete(&id).ok_or_else(|| not_found(kind, id))?;
                self.meta.remove(kind, id);
            }
            EntityType::Object => {
                return Err(UopError::Validation(ValidationError::WrongKind {
                    expected: EntityType::Class,
                    got: EntityType::Object,
                }))
            }
        }
        tracing::debug!(%kind, %id, "Deleted definition");
        Ok(())
    }

    pub fn metacontext(&self) -> &MetaContext {
        &self.meta
    }

    /// Sorted names of one meta kind (forward names, for roles).
    pub fn meta_names(&self, kind: EntityType) -> Vec<String> {
        match kind.assoc_kind() {
            Some(assoc_kind) => {
                let mut names: Vec<String> =
                    with_index!(ref self, assoc_kind, |index| index
                        .names()
                        .map(str::to_string)
                        .collect());
                names.sort();
                names
            }
            None => self.meta.names(kind),
        }
    }

    /// Association definition for a name (either name, for roles).
    pub fn meta_definition(&self, kind: AssocKind, name: &str) -> Option<&MetaEntity> {
        with_index!(ref self, kind, |index| index.meta(name))
    }

    // === Groups ===

    /// Every group nested under `id`, at any depth up to `max_group_depth`.
    pub fn group_children(&self, id: MetaId) -> UopResult<Vec<MetaEntity>> {
        let root = self
            .groups
            .get(&id)
            .ok_or_else(|| not_found(EntityType::Group, id))?;

        let mut visited: HashSet<&str> = HashSet::from([root.name.as_str()]);
        let mut frontier: VecDeque<(&str, usize)> = VecDeque::from([(root.name.as_str(), 0)]);
        let mut children = Vec::new();
        while let Some((parent, depth)) = frontier.pop_front() {
            if depth >= self.config.max_group_depth {
                continue;
            }
            for group in self.groups.values() {
                let nested = group.contained_in.iter().any(|p| p == parent);
                if nested && visited.insert(group.name.as_str()) {
                    children.push(group.clone());
                    frontier.push_back((group.name.as_str(), depth + 1));
                }
            }
        }
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    /// Groups `id` could be placed in without creating a cycle.
    pub fn possible_group_parents(&self, id: MetaId) -> UopResult<Vec<MetaEntity>> {
        let excluded: HashSet<MetaId> = self
            .group_children(id)?
            .into_iter()
            .map(|group| group.id)
            .chain([id])
            .collect();
        let mut parents: Vec<MetaEntity> = self
            .groups
            .values()
            .filter(|group| !excluded.contains(&group.id))
            .cloned()
            .collect();
        parents.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(parents)
    }

    /// Members of a group and of every group nested under it. Empty for
    /// unknown names.
    pub fn group_members_recursive(&mut self, name: &str) -> UopResult<HashSet<ObjectId>> {
        let Some(group) = self.group_index.meta(name) else {
            return Ok(HashSet::new());
        };
        let mut names = vec![group.name.clone()];
        names.extend(
            self.group_children(group.id)?
                .into_iter()
                .map(|child| child.name),
        );

        let mut members = HashSet::new();
        for group_name in names {
            if let Some(found) = self.for_meta(AssocKind::Group, &group_name)? {
                members.extend(found.subjects());
            }
        }
        Ok(members)
    }

    // === Inspection ===

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Whether any cache differs from its baseline.
    pub fn has_changes(&self) -> bool {
        self.objects.has_changes()
            || self.tags.has_changes()
            || self.groups.has_changes()
            || self.roles.has_changes()
            || self.classes.has_changes()
            || self.attributes.has_changes()
            || self.queries.has_changes()
    }

    /// Whether a record is known to exist in the store.
    pub fn is_persisted(&self, kind: EntityType, id: Uuid) -> bool {
        let meta_id = MetaId::from_uuid(id);
        match kind {
            EntityType::Object => self.objects.is_original(&ObjectId::from_uuid(id)),
            EntityType::Tag => self.tags.is_original(&meta_id),
            EntityType::Group => self.groups.is_original(&meta_id),
            EntityType::Role => self.roles.is_original(&meta_id),
            EntityType::Class => self.classes.is_original(&meta_id),
            EntityType::Attribute => self.attributes.is_original(&meta_id),
            EntityType::Query => self.queries.is_original(&meta_id),
        }
    }

    /// Diffs of every cache against its baseline.
    pub fn pending_changes(&self) -> UopResult<ChangeSet> {
        Ok(ChangeSet {
            tags: self.tags.compute_diff()?,
            groups: self.groups.compute_diff()?,
            roles: self.roles.compute_diff()?,
            classes: self.classes.compute_diff()?,
            attributes: self.attributes.compute_diff()?,
            queries: self.queries.compute_diff()?,
            objects: self.objects.compute_diff()?,
        })
    }

    // === Internals ===

    fn require_transaction(&self) -> UopResult<()> {
        match self.txn {
            TxnState::InTransaction => Ok(()),
            TxnState::Idle => Err(TransactionError::NotActive.into()),
        }
    }

    fn assoc_cache(&self, kind: AssocKind) -> &SnapshotCache<MetaId, MetaEntity> {
        match kind {
            AssocKind::Tag => &self.tags,
            AssocKind::Group => &self.groups,
            AssocKind::Role => &self.roles,
        }
    }

    fn assoc_cache_mut(&mut self, kind: AssocKind) -> &mut SnapshotCache<MetaId, MetaEntity> {
        match kind {
            AssocKind::Tag => &mut self.tags,
            AssocKind::Group => &mut self.groups,
            AssocKind::Role => &mut self.roles,
        }
    }

    /// Reject names already used by another definition of the same kind.
    fn check_assoc_names(&self, meta: &MetaEntity, replacing: Option<&MetaEntity>) -> UopResult<()> {
        if meta.kind != AssocKind::Role {
            let clash = self
                .meta_definition(meta.kind, &meta.name)
                .is_some_and(|existing| existing.id != meta.id);
            return if clash {
                Err(name_taken("name", &meta.name))
            } else {
                Ok(())
            };
        }

        let reverse = meta.reverse_name.as_deref().ok_or_else(|| {
            UopError::Validation(ValidationError::InvalidValue {
                field: "reverse_name".to_string(),
                reason: format!("role {} needs a reverse name", meta.name),
            })
        })?;
        if reverse == meta.name {
            return Err(UopError::Validation(ValidationError::InvalidValue {
                field: "reverse_name".to_string(),
                reason: "a role's reverse name must differ from its name".to_string(),
            }));
        }
        for name in [meta.name.as_str(), reverse] {
            if self.role_index.name_taken(name, replacing) {
                return Err(UopError::Assoc(AssocError::DuplicateRoleName {
                    name: name.to_string(),
                }));
            }
        }
        Ok(())
    }

    /// Mirror definitions the indices learned from the store into the meta
    /// caches as persisted records. Pending deletes are left alone.
    fn track_definitions(&mut self, kind: AssocKind) {
        let definitions: Vec<MetaEntity> =
            with_index!(ref self, kind, |index| index.definitions().cloned().collect());
        let cache = self.assoc_cache_mut(kind);
        for meta in definitions {
            if !cache.is_known(&meta.id) {
                cache.load_original(meta.id, meta);
            }
        }
    }

    /// Push the pending deletes of definitions using any of `names`, so the
    /// store cannot hand a deleted definition back before commit.
    fn flush_deleted_definitions(&mut self, kind: AssocKind, names: &[&str]) -> UopResult<()> {
        let deleted = self.assoc_cache(kind).compute_diff()?.deleted;
        for (id, meta) in deleted {
            let uses_name = names.iter().any(|name| {
                meta.name == *name || meta.reverse_name.as_deref() == Some(*name)
            });
            if !uses_name {
                continue;
            }
            self.store.meta_delete(kind.entity_type(), id)?;
            self.assoc_cache_mut(kind).forget(&id);
            tracing::debug!(%kind, name = %meta.name, %id, "Pushed pending definition delete");
        }
        Ok(())
    }

    fn push_changes(&self, changes: &ChangeSet) -> UopResult<()> {
        push_meta(&self.store, EntityType::Tag, &changes.tags, MetaDef::Tag)?;
        push_meta(&self.store, EntityType::Group, &changes.groups, MetaDef::Group)?;
        push_meta(&self.store, EntityType::Role, &changes.roles, MetaDef::Role)?;
        push_meta(&self.store, EntityType::Class, &changes.classes, MetaDef::Class)?;
        push_meta(&self.store, EntityType::Attribute, &changes.attributes, MetaDef::Attribute)?;
        push_meta(&self.store, EntityType::Query, &changes.queries, MetaDef::Query)?;

        let objects = &changes.objects;
        for record in objects.inserted.values() {
            self.store.add_object(record)?;
        }
        for (id, fields) in &objects.modified {
            self.store.modify_object(*id, fields)?;
        }
        for id in objects.deleted.keys() {
            self.store.delete_object(*id)?;
        }
        tracing::debug!(changes = changes.len(), "Pushed pending changes");
        Ok(())
    }

    fn clear_indices(&mut self) {
        self.tag_index.clear();
        self.group_index.clear();
        self.role_index.clear();
    }

    fn reload_meta(&mut self) -> UopResult<()> {
        let snapshot = self.store.meta_map()?;
        reset(&mut self.tags, snapshot.tags.iter().map(|m| (m.id, m.clone())));
        reset(&mut self.groups, snapshot.groups.iter().map(|m| (m.id, m.clone())));
        reset(&mut self.roles, snapshot.roles.iter().map(|m| (m.id, m.clone())));
        reset(&mut self.classes, snapshot.classes.iter().map(|c| (c.id, c.clone())));
        reset(&mut self.attributes, snapshot.attributes.iter().map(|a| (a.id, a.clone())));
        reset(&mut self.queries, snapshot.queries.iter().map(|q| (q.id, q.clone())));
        self.tag_index.load_definitions(snapshot.tags);
        self.group_index.load_definitions(snapshot.groups);
        self.role_index.load_definitions(snapshot.roles);
        self.meta = MetaContext::from_definitions(
            snapshot.classes,
            snapshot.attributes,
            snapshot.queries,
        );
        tracing::debug!("Reloaded meta definitions");
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
