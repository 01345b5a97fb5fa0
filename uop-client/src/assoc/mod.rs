//! Association indices
//!
//! Every association kind is indexed twice:
//!
//! - `by_subject`: subject → association name → peer objects
//! - `by_name`: association name → [`Members`]
//!
//! Both maps are populated lazily from the backing store. A key present in
//! either map means the bucket is loaded (possibly empty); an absent key
//! means it has not been read yet. Writes go to the store first and then to
//! every loaded bucket, so the two views never disagree.
//!
//! For tags and groups the peers of a subject are the other subjects carrying
//! the same label, and the presence of the name key is the association
//! itself. For roles the peers are the related objects, and each edge is
//! recorded under its forward name for the subject and under its reverse name
//! for the object.

pub mod role;
pub mod variant;

pub use role::RoleVariant;
pub use variant::{AssociationVariant, GroupVariant, Resolved, SubjectEdge, TagVariant};

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use uop_core::{
    Assoc, AssocError, MetaEntity, MetaId, ObjectId, UopError, UopResult, ValidationError,
};
use uop_storage::{BackingStore, NameIdIndex};

/// Association index over tags.
pub type TagIndex = AssociationIndex<TagVariant>;
/// Association index over groups.
pub type GroupIndex = AssociationIndex<GroupVariant>;
/// Association index over roles.
pub type RoleIndex = AssociationIndex<RoleVariant>;

/// Associations of one subject: name → peers.
pub type SubjectAssocs = HashMap<String, HashSet<ObjectId>>;

// ============================================================================
// MEMBERS
// ============================================================================

/// Everything filed under one association name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Members {
    /// Subjects carrying a tag or group.
    Set(HashSet<ObjectId>),
    /// Subject → related objects, for one direction of a role.
    Related(HashMap<ObjectId, HashSet<ObjectId>>),
}

impl Members {
    /// Whether the bucket holds `subject` (related to `object`, for roles).
    pub fn contains(&self, subject: ObjectId, object: Option<ObjectId>) -> bool {
        match (self, object) {
            (Members::Set(set), _) => set.contains(&subject),
            (Members::Related(map), Some(object)) => {
                map.get(&subject).is_some_and(|objects| objects.contains(&object))
            }
            (Members::Related(map), None) => map.contains_key(&subject),
        }
    }

    /// Every subject in the bucket.
    pub fn subjects(&self) -> HashSet<ObjectId> {
        match self {
            Members::Set(set) => set.clone(),
            Members::Related(map) => map.keys().copied().collect(),
        }
    }

    /// Every `(subject, object)` pair in the bucket.
    pub fn edges(&self) -> Vec<(ObjectId, Option<ObjectId>)> {
        match self {
            Members::Set(set) => set.iter().map(|s| (*s, None)).collect(),
            Members::Related(map) => map
                .iter()
                .flat_map(|(s, objects)| objects.iter().map(move |o| (*s, Some(*o))))
                .collect(),
        }
    }

    /// Number of edges.
    pub fn len(&self) -> usize {
        match self {
            Members::Set(set) => set.len(),
            Members::Related(map) => map.values().map(HashSet::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `id` appears on either side of any edge.
    pub fn mentions(&self, id: ObjectId) -> bool {
        match self {
            Members::Set(set) => set.contains(&id),
            Members::Related(map) => {
                map.contains_key(&id) || map.values().any(|objects| objects.contains(&id))
            }
        }
    }

    fn insert(&mut self, subject: ObjectId, object: Option<ObjectId>) {
        match (self, object) {
            (Members::Set(set), _) => {
                set.insert(subject);
            }
            (Members::Related(map), Some(object)) => {
                map.entry(subject).or_default().insert(object);
            }
            (Members::Related(_), None) => {}
        }
    }

    fn remove(&mut self, subject: ObjectId, object: Option<ObjectId>) {
        match (self, object) {
            (Members::Set(set), _) => {
                set.remove(&subject);
            }
            (Members::Related(map), Some(object)) => {
                if let Some(objects) = map.get_mut(&subject) {
                    objects.remove(&object);
                    if objects.is_empty() {
                        map.remove(&subject);
                    }
                }
            }
            (Members::Related(map), None) => {
                map.remove(&subject);
            }
        }
    }

    fn remove_object(&mut self, id: ObjectId) {
        match self {
            Members::Set(set) => {
                set.remove(&id);
            }
            Members::Related(map) => {
                map.remove(&id);
                for objects in map.values_mut() {
                    objects.remove(&id);
                }
                map.retain(|_, objects| !objects.is_empty());
            }
        }
    }
}

// ============================================================================
// ASSOCIATION INDEX
// ============================================================================

/// An edge with its name resolved and, for roles, oriented forward.
#[derive(Debug, Clone)]
struct Edge {
    meta: MetaEntity,
    subject: ObjectId,
    object: Option<ObjectId>,
}

impl Edge {
    fn forward_name(&self) -> &str {
        &self.meta.name
    }

    fn reverse_name(&self) -> Option<&str> {
        self.meta.reverse_name.as_deref()
    }
}

fn bucket_names(meta: &MetaEntity) -> Vec<String> {
    std::iter::once(meta.name.clone())
        .chain(meta.reverse_name.clone())
        .collect()
}

/// Dual index over one association kind.
#[derive(Debug, Clone)]
pub struct AssociationIndex<V: AssociationVariant> {
    pub(crate) names: NameIdIndex<MetaEntity>,
    by_subject: HashMap<ObjectId, SubjectAssocs>,
    by_name: HashMap<String, Members>,
    _variant: PhantomData<V>,
}

impl<V: AssociationVariant> Default for AssociationIndex<V> {
    fn default() -> Self {
        Self {
            names: NameIdIndex::new(),
            by_subject: HashMap::new(),
            by_name: HashMap::new(),
            _variant: PhantomData,
        }
    }
}

impl<V: AssociationVariant> AssociationIndex<V> {
    pub fn new() -> Self {
        Self::default()
    }

    // === Definitions ===

    /// Return the definition for `name`, creating it in the store if needed.
    ///
    /// Roles are never created here; an unknown role name is
    /// `InvalidRoleName`.
    pub fn ensure_meta<S>(&mut self, store: &S, name: &str) -> UopResult<MetaEntity>
    where
        S: BackingStore + ?Sized,
    {
        if let Some(found) = V::resolve(&self.names, name) {
            return Ok(found.meta.clone());
        }
        let meta = store.ensure_meta_named(V::KIND, name)?;
        tracing::debug!(kind = %V::KIND, name = %meta.name, id = %meta.id, "Resolved definition from store");
        self.names.add(meta.clone());
        Ok(meta)
    }

    /// Definition for a forward name (or a reverse name, for roles).
    pub fn meta(&self, name: &str) -> Option<&MetaEntity> {
        V::resolve(&self.names, name).map(|found| found.meta)
    }

    pub fn meta_by_id(&self, id: MetaId) -> Option<&MetaEntity> {
        self.names.by_id(id)
    }

    /// Forward names of every known definition.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.names()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &MetaEntity> {
        self.names.records()
    }

    /// Replace every known definition with the store's current set.
    pub fn reload_meta<S>(&mut self, store: &S) -> UopResult<()>
    where
        S: BackingStore + ?Sized,
    {
        self.load_definitions(store.meta_definitions(V::KIND)?);
        Ok(())
    }

    /// Replace every known definition with `definitions`.
    pub fn load_definitions(&mut self, definitions: impl IntoIterator<Item = MetaEntity>) {
        self.names = NameIdIndex::from_records(definitions);
    }

    /// Make a definition known without touching the store.
    pub fn add_definition(&mut self, meta: MetaEntity) {
        self.names.add(meta);
    }

    /// Forget a definition and every bucket filed under its names.
    pub fn remove_meta(&mut self, meta: &MetaEntity) {
        self.names.remove_id(meta.id);
        for name in bucket_names(meta) {
            self.by_name.remove(&name);
            for assocs in self.by_subject.values_mut() {
                assocs.remove(&name);
            }
        }
    }

    /// Swap `old` for `new` (same id), moving buckets to the new names.
    ///
    /// Every old bucket is taken out before any is filed again, so a role
    /// whose name and reverse name trade places keeps both directions.
    pub fn replace_meta(&mut self, old: &MetaEntity, new: &MetaEntity) {
        self.names.add(new.clone());
        let moves: Vec<(String, String)> = bucket_names(old)
            .into_iter()
            .zip(bucket_names(new))
            .filter(|(from, to)| from != to)
            .collect();

        let members: Vec<(String, Members)> = moves
            .iter()
            .filter_map(|(from, to)| self.by_name.remove(from).map(|m| (to.clone(), m)))
            .collect();
        self.by_name.extend(members);

        for assocs in self.by_subject.values_mut() {
            let peers: Vec<(String, HashSet<ObjectId>)> = moves
                .iter()
                .filter_map(|(from, to)| assocs.remove(from).map(|p| (to.clone(), p)))
                .collect();
            assocs.extend(peers);
        }
    }

    // === Mutation ===

    /// Record `subject --name--> object` in the store and in both indices.
    ///
    /// `persisted` tells whether a subject may already have associations in
    /// the store. Associating an existing edge is a no-op.
    pub fn associate<S>(
        &mut self,
        store: &S,
        persisted: impl Fn(ObjectId) -> bool,
        subject: ObjectId,
        name: &str,
        object: Option<ObjectId>,
    ) -> UopResult<()>
    where
        S: BackingStore + ?Sized,
    {
        self.ensure_meta(store, name)?;
        let edge = self
            .edge(subject, name, object)?
            .ok_or_else(|| V::unknown_name(name))?;
        self.load_edge(store, &persisted, &edge)?;
        if self.checks(&edge).into_iter().all(|present| present) {
            return Ok(());
        }

        store.associate(V::KIND, edge.subject, edge.meta.id, edge.object)?;
        self.insert_edge(&edge);
        tracing::debug!(
            kind = %V::KIND,
            subject = %edge.subject,
            name = edge.forward_name(),
            object = ?edge.object,
            "Associated"
        );
        Ok(())
    }

    /// Remove `subject --name--> object` from the store and both indices.
    /// Removing a missing edge is a no-op.
    pub fn disassociate<S>(
        &mut self,
        store: &S,
        subject: ObjectId,
        name: &str,
        object: Option<ObjectId>,
    ) -> UopResult<()>
    where
        S: BackingStore + ?Sized,
    {
        let edge = self
            .edge(subject, name, object)?
            .ok_or_else(|| V::unknown_name(name))?;

        store.disassociate(V::KIND, edge.subject, edge.meta.id, edge.object)?;
        self.remove_edge(&edge);
        tracing::debug!(
            kind = %V::KIND,
            subject = %edge.subject,
            name = edge.forward_name(),
            object = ?edge.object,
            "Disassociated"
        );
        Ok(())
    }

    /// Drop `id` from every bucket, on either side of any edge.
    pub fn delete_subject(&mut self, id: ObjectId) {
        self.by_subject.remove(&id);
        let directed = V::KIND.is_directed();
        for assocs in self.by_subject.values_mut() {
            for peers in assocs.values_mut() {
                peers.remove(&id);
            }
            if directed {
                assocs.retain(|_, peers| !peers.is_empty());
            }
        }
        for members in self.by_name.values_mut() {
            members.remove_object(id);
        }
    }

    /// Drop every loaded bucket. Definitions stay known.
    pub fn clear(&mut self) {
        self.by_subject.clear();
        self.by_name.clear();
    }

    // === Queries ===

    /// In-memory presence check: every index entry for the edge is present.
    pub fn is_present(&self, subject: ObjectId, name: &str, object: Option<ObjectId>) -> bool {
        match self.edge(subject, name, object) {
            Ok(Some(edge)) => self.checks(&edge).into_iter().all(|present| present),
            _ => false,
        }
    }

    /// Load the buckets an edge touches and report whether it is present.
    ///
    /// Fails with `InconsistentState` when only some of the index entries
    /// for the edge exist.
    pub fn edge_state<S>(
        &mut self,
        store: &S,
        persisted: impl Fn(ObjectId) -> bool,
        subject: ObjectId,
        name: &str,
        object: Option<ObjectId>,
    ) -> UopResult<bool>
    where
        S: BackingStore + ?Sized,
    {
        let Some(edge) = self.edge(subject, name, object)? else {
            return Ok(false);
        };
        self.load_edge(store, &persisted, &edge)?;
        let checks = self.checks(&edge);
        let found = checks.iter().filter(|present| **present).count();
        if found == checks.len() {
            Ok(true)
        } else if found == 0 {
            Ok(false)
        } else {
            Err(self.inconsistent(format!(
                "{found} of {} index entries present for {} on {}",
                checks.len(),
                name,
                subject
            )))
        }
    }

    /// Associations of `subject`, loaded on first access.
    ///
    /// Subjects for which `persisted` is false get an empty entry without a
    /// store round trip.
    pub fn for_subject<S>(
        &mut self,
        store: &S,
        persisted: impl Fn(ObjectId) -> bool,
        subject: ObjectId,
    ) -> UopResult<&SubjectAssocs>
    where
        S: BackingStore + ?Sized,
    {
        self.load_subject(store, &persisted, subject)?;
        Ok(&*self.by_subject.entry(subject).or_default())
    }

    /// Members filed under `name`, loaded on first access. `None` for
    /// unknown names.
    pub fn for_meta<S>(&mut self, store: &S, name: &str) -> UopResult<Option<&Members>>
    where
        S: BackingStore + ?Sized,
    {
        let Some(found) = V::resolve(&self.names, name) else {
            return Ok(None);
        };
        let meta = found.meta.clone();
        self.load_meta_buckets(store, &meta)?;
        Ok(self.by_name.get(name))
    }

    /// Every loaded association. Roles are listed under both names.
    pub fn all_assocs(&self) -> Vec<Assoc> {
        let mut assocs = Vec::new();
        for (name, members) in &self.by_name {
            for (subject, object) in members.edges() {
                assocs.push(self.assoc(subject, name, object));
            }
        }
        for (subject, by_name) in &self.by_subject {
            for (name, peers) in by_name {
                if self.by_name.contains_key(name) {
                    continue;
                }
                if V::KIND.is_directed() {
                    for peer in peers {
                        assocs.push(self.assoc(*subject, name, Some(*peer)));
                    }
                } else {
                    assocs.push(self.assoc(*subject, name, None));
                }
            }
        }
        assocs
    }

    /// Whether `id` appears anywhere in the loaded index.
    pub fn object_present(&self, id: ObjectId) -> bool {
        self.by_subject.get(&id).is_some_and(|assocs| !assocs.is_empty())
            || self
                .by_subject
                .values()
                .any(|assocs| assocs.values().any(|peers| peers.contains(&id)))
            || self.by_name.values().any(|members| members.mentions(id))
    }

    /// Walk both indices and check that they describe the same edges.
    pub fn verify(&self) -> UopResult<()> {
        let directed = V::KIND.is_directed();

        for (subject, assocs) in &self.by_subject {
            for (name, peers) in assocs {
                let found = V::resolve(&self.names, name).ok_or_else(|| {
                    self.inconsistent(format!("subject {subject} files under unknown name {name}"))
                })?;
                if directed {
                    let other = found.meta.other_name(name).unwrap_or_default();
                    for peer in peers {
                        if let Some(members) = self.by_name.get(name) {
                            if !members.contains(*subject, Some(*peer)) {
                                return Err(self.inconsistent(format!(
                                    "{subject} {name} {peer} missing from name index"
                                )));
                            }
                        }
                        if let Some(peer_assocs) = self.by_subject.get(peer) {
                            if !peer_assocs.get(other).is_some_and(|p| p.contains(subject)) {
                                return Err(self.inconsistent(format!(
                                    "{peer} {other} {subject} missing from subject index"
                                )));
                            }
                        }
                    }
                } else if let Some(members) = self.by_name.get(name) {
                    if !members.contains(*subject, None) {
                        return Err(self.inconsistent(format!(
                            "{subject} missing from members of {name}"
                        )));
                    }
                    let mut expected = members.subjects();
                    expected.remove(subject);
                    if &expected != peers {
                        return Err(self.inconsistent(format!(
                            "co-members of {subject} under {name} are stale"
                        )));
                    }
                }
            }
        }

        for (name, members) in &self.by_name {
            for (subject, object) in members.edges() {
                if let Some(assocs) = self.by_subject.get(&subject) {
                    let filed = match object {
                        Some(object) => assocs.get(name).is_some_and(|p| p.contains(&object)),
                        None => assocs.contains_key(name),
                    };
                    if !filed {
                        return Err(self.inconsistent(format!(
                            "{subject} under {name} missing from subject index"
                        )));
                    }
                }
                if let Some(object) = object {
                    let other = V::resolve(&self.names, name)
                        .and_then(|found| found.meta.other_name(name));
                    let mirrored = other
                        .and_then(|other| self.by_name.get(other))
                        .is_some_and(|m| m.contains(object, Some(subject)));
                    if !mirrored {
                        return Err(self.inconsistent(format!(
                            "reverse of {subject} {name} {object} missing from name index"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    // === Internals ===

    fn assoc(&self, subject: ObjectId, name: &str, object: Option<ObjectId>) -> Assoc {
        Assoc {
            kind: V::KIND,
            subject,
            name: name.to_string(),
            object,
        }
    }

    fn inconsistent(&self, reason: String) -> UopError {
        UopError::Assoc(AssocError::InconsistentState {
            kind: V::KIND,
            reason,
        })
    }

    /// Resolve `name` and orient the edge forward. `Ok(None)` for unknown
    /// names.
    fn edge(
        &self,
        subject: ObjectId,
        name: &str,
        object: Option<ObjectId>,
    ) -> UopResult<Option<Edge>> {
        let Some(found) = V::resolve(&self.names, name) else {
            return Ok(None);
        };
        let meta = found.meta.clone();
        if !V::KIND.is_directed() {
            return Ok(Some(Edge {
                meta,
                subject,
                object: None,
            }));
        }
        let object = object.ok_or_else(|| {
            UopError::Validation(ValidationError::InvalidValue {
                field: "object".to_string(),
                reason: format!("role {name} needs an object"),
            })
        })?;
        Ok(Some(if found.forward {
            Edge {
                meta,
                subject,
                object: Some(object),
            }
        } else {
            Edge {
                meta,
                subject: object,
                object: Some(subject),
            }
        }))
    }

    /// Presence of every index entry an edge implies.
    fn checks(&self, edge: &Edge) -> Vec<bool> {
        let forward = edge.forward_name();
        match (edge.object, edge.reverse_name()) {
            (Some(object), Some(reverse)) => vec![
                self.subject_has(edge.subject, forward, Some(object)),
                self.name_has(forward, edge.subject, Some(object)),
                self.subject_has(object, reverse, Some(edge.subject)),
                self.name_has(reverse, object, Some(edge.subject)),
            ],
            _ => vec![
                self.subject_has(edge.subject, forward, None),
                self.name_has(forward, edge.subject, None),
            ],
        }
    }

    fn subject_has(&self, subject: ObjectId, name: &str, peer: Option<ObjectId>) -> bool {
        self.by_subject
            .get(&subject)
            .and_then(|assocs| assocs.get(name))
            .is_some_and(|peers| peer.map_or(true, |p| peers.contains(&p)))
    }

    fn name_has(&self, name: &str, subject: ObjectId, object: Option<ObjectId>) -> bool {
        self.by_name
            .get(name)
            .is_some_and(|members| members.contains(subject, object))
    }

    fn load_edge<S>(
        &mut self,
        store: &S,
        persisted: &impl Fn(ObjectId) -> bool,
        edge: &Edge,
    ) -> UopResult<()>
    where
        S: BackingStore + ?Sized,
    {
        self.load_meta_buckets(store, &edge.meta)?;
        self.load_subject(store, persisted, edge.subject)?;
        if let Some(object) = edge.object {
            self.load_subject(store, persisted, object)?;
        }
        Ok(())
    }

    fn load_meta_buckets<S>(&mut self, store: &S, meta: &MetaEntity) -> UopResult<()>
    where
        S: BackingStore + ?Sized,
    {
        if self.by_name.contains_key(&meta.name) {
            return Ok(());
        }
        let buckets = V::load_members(store, meta)?;
        tracing::debug!(kind = %V::KIND, name = %meta.name, "Loaded members");
        for (name, members) in buckets {
            self.by_name.entry(name).or_insert(members);
        }
        Ok(())
    }

    fn load_subject<S>(
        &mut self,
        store: &S,
        persisted: &impl Fn(ObjectId) -> bool,
        subject: ObjectId,
    ) -> UopResult<()>
    where
        S: BackingStore + ?Sized,
    {
        if self.by_subject.contains_key(&subject) {
            return Ok(());
        }
        let mut assocs = SubjectAssocs::new();
        if persisted(subject) {
            for edge in V::subject_edges(store, subject)? {
                let Some(meta) = self.names.by_id(edge.meta_id).cloned() else {
                    continue;
                };
                let name = if edge.forward {
                    meta.name.clone()
                } else {
                    match meta.reverse_name.clone() {
                        Some(reverse) => reverse,
                        None => continue,
                    }
                };
                match edge.peer {
                    Some(peer) => {
                        assocs.entry(name).or_default().insert(peer);
                    }
                    None => {
                        self.load_meta_buckets(store, &meta)?;
                        let co_members = self.co_members(&name, subject);
                        assocs.insert(name, co_members);
                    }
                }
            }
            tracing::debug!(kind = %V::KIND, %subject, names = assocs.len(), "Loaded subject");
        }
        self.by_subject.insert(subject, assocs);
        Ok(())
    }

    fn co_members(&self, name: &str, subject: ObjectId) -> HashSet<ObjectId> {
        self.by_name
            .get(name)
            .map(|members| {
                let mut others = members.subjects();
                others.remove(&subject);
                others
            })
            .unwrap_or_default()
    }

    fn insert_edge(&mut self, edge: &Edge) {
        let forward = edge.forward_name().to_string();
        match (edge.object, edge.reverse_name().map(str::to_string)) {
            (Some(object), Some(reverse)) => {
                self.by_name
                    .entry(forward.clone())
                    .or_insert_with(V::empty_members)
                    .insert(edge.subject, Some(object));
                self.by_name
                    .entry(reverse.clone())
                    .or_insert_with(V::empty_members)
                    .insert(object, Some(edge.subject));
                self.by_subject
                    .entry(edge.subject)
                    .or_default()
                    .entry(forward)
                    .or_default()
                    .insert(object);
                self.by_subject
                    .entry(object)
                    .or_default()
                    .entry(reverse)
                    .or_default()
                    .insert(edge.subject);
            }
            _ => {
                let co_members = self.co_members(&forward, edge.subject);
                for member in &co_members {
                    if let Some(assocs) = self.by_subject.get_mut(member) {
                        assocs
                            .entry(forward.clone())
                            .or_default()
                            .insert(edge.subject);
                    }
                }
                self.by_subject
                    .entry(edge.subject)
                    .or_default()
                    .entry(forward.clone())
                    .or_default()
                    .extend(co_members);
                self.by_name
                    .entry(forward)
                    .or_insert_with(V::empty_members)
                    .insert(edge.subject, None);
            }
        }
    }

    fn remove_edge(&mut self, edge: &Edge) {
        let forward = edge.forward_name().to_string();
        match (edge.object, edge.reverse_name().map(str::to_string)) {
            (Some(object), Some(reverse)) => {
                if let Some(members) = self.by_name.get_mut(&forward) {
                    members.remove(edge.subject, Some(object));
                }
                if let Some(members) = self.by_name.get_mut(&reverse) {
                    members.remove(object, Some(edge.subject));
                }
                self.drop_peer(edge.subject, &forward, object);
                self.drop_peer(object, &reverse, edge.subject);
            }
            _ => {
                if let Some(members) = self.by_name.get_mut(&forward) {
                    members.remove(edge.subject, None);
                }
                if let Some(assocs) = self.by_subject.get_mut(&edge.subject) {
                    assocs.remove(&forward);
                }
                for (member, assocs) in self.by_subject.iter_mut() {
                    if *member == edge.subject {
                        continue;
                    }
                    if let Some(peers) = assocs.get_mut(&forward) {
                        peers.remove(&edge.subject);
                    }
                }
            }
        }
    }

    fn drop_peer(&mut self, subject: ObjectId, name: &str, peer: ObjectId) {
        if let Some(assocs) = self.by_subject.get_mut(&subject) {
            if let Some(peers) = assocs.get_mut(name) {
                peers.remove(&peer);
                if peers.is_empty() {
                    assocs.remove(name);
                }
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uop_core::{AssocKind, StorageError};
    use uop_storage::{FailPoint, MockStore};

    fn persisted(_: ObjectId) -> bool {
        true
    }

    fn unpersisted(_: ObjectId) -> bool {
        false
    }

    #[test]
    fn test_tag_associate_then_disassociate() {
        let store = MockStore::new();
        let mut index = TagIndex::new();
        let id = ObjectId::new();

        index.associate(&store, persisted, id, "urgent", None).unwrap();
        assert!(index.is_present(id, "urgent", None));
        assert!(store.committed().unwrap().has_tag("urgent", id));

        index.disassociate(&store, id, "urgent", None).unwrap();
        assert!(!index.is_present(id, "urgent", None));
        let assocs = index.for_subject(&store, persisted, id).unwrap();
        assert!(!assocs.contains_key("urgent"));
        index.verify().unwrap();
    }

    #[test]
    fn test_associate_twice_is_noop() {
        let store = MockStore::new();
        let mut index = GroupIndex::new();
        let id = ObjectId::new();

        index.associate(&store, persisted, id, "work", None).unwrap();
        let writes = store.write_count().unwrap();
        index.associate(&store, persisted, id, "work", None).unwrap();
        assert_eq!(store.write_count().unwrap(), writes);
        assert_eq!(store.meta_definitions(AssocKind::Group).unwrap().len(), 1);
    }

    #[test]
    fn test_co_members_tracked_for_loaded_subjects() {
        let store = MockStore::new();
        let mut index = TagIndex::new();
        let (a, b, c) = (ObjectId::new(), ObjectId::new(), ObjectId::new());

        index.associate(&store, persisted, a, "urgent", None).unwrap();
        index.associate(&store, persisted, b, "urgent", None).unwrap();
        index.associate(&store, persisted, c, "urgent", None).unwrap();

        let for_a = index.for_subject(&store, persisted, a).unwrap();
        assert_eq!(for_a.get("urgent"), Some(&HashSet::from([b, c])));

        index.disassociate(&store, b, "urgent", None).unwrap();
        let for_a = index.for_subject(&store, persisted, a).unwrap();
        assert_eq!(for_a.get("urgent"), Some(&HashSet::from([c])));
        index.verify().unwrap();
    }

    #[test]
    fn test_unknown_names() {
        let store = MockStore::new();
        let mut index = TagIndex::new();
        let id = ObjectId::new();

        assert!(!index.is_present(id, "missing", None));
        assert!(index.for_meta(&store, "missing").unwrap().is_none());
        assert!(!index.edge_state(&store, persisted, id, "missing", None).unwrap());
        assert!(matches!(
            index.disassociate(&store, id, "missing", None),
            Err(UopError::Assoc(AssocError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_lazy_loading_from_store() {
        let store = MockStore::new();
        let tag = store.ensure_meta_named(AssocKind::Tag, "urgent").unwrap();
        let (a, b) = (ObjectId::new(), ObjectId::new());
        store.associate(AssocKind::Tag, a, tag.id, None).unwrap();
        store.associate(AssocKind::Tag, b, tag.id, None).unwrap();

        let mut index = TagIndex::new();
        index.reload_meta(&store).unwrap();
        assert!(!index.is_present(a, "urgent", None));

        let members = index.for_meta(&store, "urgent").unwrap().unwrap();
        assert_eq!(members.subjects(), HashSet::from([a, b]));
        assert!(index.edge_state(&store, persisted, a, "urgent", None).unwrap());
        assert!(index.is_present(a, "urgent", None));
        index.verify().unwrap();
    }

    #[test]
    fn test_unpersisted_subject_skips_store() {
        let store = MockStore::new();
        let tag = store.ensure_meta_named(AssocKind::Tag, "urgent").unwrap();
        let id = ObjectId::new();
        store.associate(AssocKind::Tag, id, tag.id, None).unwrap();

        let mut index = TagIndex::new();
        index.reload_meta(&store).unwrap();
        assert!(index.for_subject(&store, unpersisted, id).unwrap().is_empty());
    }

    #[test]
    fn test_partial_state_is_inconsistent() {
        let store = MockStore::new();
        let mut index = TagIndex::new();
        let id = ObjectId::new();
        index.associate(&store, persisted, id, "urgent", None).unwrap();

        // Drop the name bucket entry behind the index's back.
        if let Some(Members::Set(set)) = index.by_name.get_mut("urgent") {
            set.remove(&id);
        }
        assert!(matches!(
            index.edge_state(&store, persisted, id, "urgent", None),
            Err(UopError::Assoc(AssocError::InconsistentState { .. }))
        ));
        assert!(index.verify().is_err());
    }

    #[test]
    fn test_store_failure_leaves_index_untouched() {
        let store = MockStore::new();
        let mut index = TagIndex::new();
        let id = ObjectId::new();
        index.ensure_meta(&store, "urgent").unwrap();
        store.fail_on(FailPoint::Associate).unwrap();

        assert!(matches!(
            index.associate(&store, persisted, id, "urgent", None),
            Err(UopError::Storage(StorageError::Injected { .. }))
        ));
        assert!(!index.is_present(id, "urgent", None));
        index.verify().unwrap();
    }

    #[test]
    fn test_delete_subject_removes_all_traces() {
        let store = MockStore::new();
        let mut tags = TagIndex::new();
        let mut roles = RoleIndex::new();
        roles.define_role(&store, "parent-of", "child-of").unwrap();
        let (a, b, c) = (ObjectId::new(), ObjectId::new(), ObjectId::new());

        tags.associate(&store, persisted, a, "urgent", None).unwrap();
        tags.associate(&store, persisted, b, "urgent", None).unwrap();
        roles.associate(&store, persisted, c, "parent-of", Some(a)).unwrap();
        roles.associate(&store, persisted, a, "parent-of", Some(b)).unwrap();

        tags.delete_subject(a);
        roles.delete_subject(a);

        assert!(!tags.object_present(a));
        assert!(!roles.object_present(a));
        assert!(tags.object_present(b));
        assert!(roles.for_subject(&store, persisted, c).unwrap().is_empty());
        tags.verify().unwrap();
        roles.verify().unwrap();
    }

    #[test]
    fn test_rename_moves_buckets() {
        let store = MockStore::new();
        let mut index = TagIndex::new();
        let id = ObjectId::new();
        index.associate(&store, persisted, id, "urgent", None).unwrap();

        let old = index.meta("urgent").unwrap().clone();
        let mut new = old.clone();
        new.name = "critical".to_string();
        index.replace_meta(&old, &new);

        assert!(index.is_present(id, "critical", None));
        assert!(!index.is_present(id, "urgent", None));
        index.verify().unwrap();

        index.remove_meta(&new);
        assert!(!index.object_present(id));
        assert!(index.meta("critical").is_none());
    }

    #[test]
    fn test_swapping_role_names_keeps_both_directions() {
        let store = MockStore::new();
        let mut index = RoleIndex::new();
        index.define_role(&store, "parent-of", "child-of").unwrap();
        let (a, b) = (ObjectId::new(), ObjectId::new());
        index.associate(&store, persisted, a, "parent-of", Some(b)).unwrap();

        let old = index.meta("parent-of").unwrap().clone();
        let mut new = old.clone();
        new.name = "child-of".to_string();
        new.reverse_name = Some("parent-of".to_string());
        index.replace_meta(&old, &new);

        assert!(index.is_present(a, "child-of", Some(b)));
        assert!(index.is_present(b, "parent-of", Some(a)));
        assert!(!index.is_present(a, "parent-of", Some(b)));
        index.verify().unwrap();
    }

    #[test]
    fn test_all_assocs_lists_roles_under_both_names() {
        let store = MockStore::new();
        let mut index = RoleIndex::new();
        index.define_role(&store, "parent-of", "child-of").unwrap();
        let (a, b) = (ObjectId::new(), ObjectId::new());
        index.associate(&store, persisted, a, "parent-of", Some(b)).unwrap();

        let assocs = index.all_assocs();
        assert_eq!(assocs.len(), 2);
        assert!(assocs.contains(&Assoc::role(a, "parent-of", b)));
        assert!(assocs.contains(&Assoc::role(b, "child-of", a)));
    }

    #[test]
    fn test_clear_then_reload_reproduces_state() {
        let store = MockStore::new();
        let mut index = GroupIndex::new();
        let (a, b) = (ObjectId::new(), ObjectId::new());
        index.associate(&store, persisted, a, "work", None).unwrap();
        index.associate(&store, persisted, b, "home", None).unwrap();

        index.clear();
        assert!(!index.is_present(a, "work", None));
        assert!(index.edge_state(&store, persisted, a, "work", None).unwrap());
        assert!(index.edge_state(&store, persisted, b, "home", None).unwrap());
        assert!(!index.edge_state(&store, persisted, a, "home", None).unwrap());
    }

    #[test]
    fn test_members_helpers() {
        let (a, b) = (ObjectId::new(), ObjectId::new());
        let mut related = Members::Related(HashMap::new());
        related.insert(a, Some(b));
        assert!(related.contains(a, Some(b)));
        assert!(related.contains(a, None));
        assert!(related.mentions(b));
        assert_eq!(related.len(), 1);

        related.remove_object(b);
        assert!(related.is_empty());
        assert!(!related.mentions(a));
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use uop_storage::MockStore;

    #[derive(Debug, Clone)]
    enum Op {
        Tag(usize, usize),
        Untag(usize, usize),
        Relate(usize, usize),
        Unrelate(usize, usize),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..4, 0usize..3).prop_map(|(o, t)| Op::Tag(o, t)),
            (0usize..4, 0usize..3).prop_map(|(o, t)| Op::Untag(o, t)),
            (0usize..4, 0usize..4).prop_map(|(s, o)| Op::Relate(s, o)),
            (0usize..4, 0usize..4).prop_map(|(s, o)| Op::Unrelate(s, o)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Any sequence of writes keeps both views in agreement with each
        /// other, with a plain model, and with a fresh load from the store.
        #[test]
        fn prop_indices_stay_consistent(ops in prop::collection::vec(arb_op(), 1..40)) {
            let store = MockStore::new();
            let objects: Vec<ObjectId> = (0..4).map(|_| ObjectId::new()).collect();
            let labels = ["red", "green", "blue"];
            let mut tags = TagIndex::new();
            let mut roles = RoleIndex::new();
            roles.define_role(&store, "parent-of", "child-of").unwrap();
            let mut tag_model: HashSet<(usize, usize)> = HashSet::new();
            let mut role_model: HashSet<(usize, usize)> = HashSet::new();
            let persisted = |_: ObjectId| true;

            for op in &ops {
                match *op {
                    Op::Tag(o, t) => {
                        tags.associate(&store, persisted, objects[o], labels[t], None).unwrap();
                        tag_model.insert((o, t));
                    }
                    Op::Untag(o, t) => {
                        if tags.meta(labels[t]).is_some() {
                            tags.disassociate(&store, objects[o], labels[t], None).unwrap();
                        }
                        tag_model.remove(&(o, t));
                    }
                    Op::Relate(s, o) => {
                        roles.associate(&store, persisted, objects[s], "parent-of", Some(objects[o])).unwrap();
                        role_model.insert((s, o));
                    }
                    Op::Unrelate(s, o) => {
                        roles.disassociate(&store, objects[o], "child-of", Some(objects[s])).unwrap();
                        role_model.remove(&(s, o));
                    }
                }
                prop_assert!(tags.verify().is_ok());
                prop_assert!(roles.verify().is_ok());
            }

            let mut fresh_tags = TagIndex::new();
            let mut fresh_roles = RoleIndex::new();
            fresh_tags.reload_meta(&store).unwrap();
            fresh_roles.reload_meta(&store).unwrap();
            for (o, object) in objects.iter().enumerate() {
                for (t, label) in labels.iter().enumerate() {
                    let expected = tag_model.contains(&(o, t));
                    prop_assert_eq!(tags.is_present(*object, label, None), expected);
                    prop_assert_eq!(
                        fresh_tags.edge_state(&store, persisted, *object, label, None).unwrap(),
                        expected
                    );
                }
                for (p, peer) in objects.iter().enumerate() {
                    let expected = role_model.contains(&(o, p));
                    prop_assert_eq!(roles.is_present(*object, "parent-of", Some(*peer)), expected);
                    prop_assert_eq!(roles.is_present(*peer, "child-of", Some(*object)), expected);
                    prop_assert_eq!(
                        fresh_roles.edge_state(&store, persisted, *object, "parent-of", Some(*peer)).unwrap(),
                        expected
                    );
                }
            }
            prop_assert!(fresh_tags.verify().is_ok());
            prop_assert!(fresh_roles.verify().is_ok());
        }
    }
}
