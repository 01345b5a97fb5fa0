//! Roles: directed edges addressed by a forward or a reverse name.
//!
//! A role edge `s --parent-of--> o` is indexed twice: under `parent-of` with
//! `s` as subject and under `child-of` with `o` as subject. The store only
//! ever sees the forward edge.

use super::variant::{AssociationVariant, Resolved, SubjectEdge};
use super::{AssociationIndex, Members};
use std::collections::{HashMap, HashSet};
use uop_core::{
    AssocError, AssocKind, MetaEntity, MetaRecord, ObjectId, UopError, UopResult,
};
use uop_storage::{BackingStore, NameIdIndex};

/// Directed, named relationships.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleVariant;

impl AssociationVariant for RoleVariant {
    const KIND: AssocKind = AssocKind::Role;

    fn resolve<'a>(names: &'a NameIdIndex<MetaEntity>, name: &str) -> Option<Resolved<'a>> {
        if let Some(meta) = names.by_name(name) {
            return Some(Resolved {
                meta,
                forward: true,
            });
        }
        names
            .records()
            .find(|meta| meta.reverse_name.as_deref() == Some(name))
            .map(|meta| Resolved {
                meta,
                forward: false,
            })
    }

    fn unknown_name(name: &str) -> UopError {
        UopError::Assoc(AssocError::InvalidRoleName {
            name: name.to_string(),
        })
    }

    fn empty_members() -> Members {
        Members::Related(HashMap::new())
    }

    fn load_members<S>(store: &S, meta: &MetaEntity) -> UopResult<Vec<(String, Members)>>
    where
        S: BackingStore + ?Sized,
    {
        let reverse = reverse_name(meta)?;
        let mut forward: HashMap<ObjectId, HashSet<ObjectId>> = HashMap::new();
        let mut backward: HashMap<ObjectId, HashSet<ObjectId>> = HashMap::new();
        for edge in store.get_role_edges(meta.id)? {
            forward.entry(edge.subject).or_default().insert(edge.object);
            backward.entry(edge.object).or_default().insert(edge.subject);
        }
        Ok(vec![
            (meta.name.clone(), Members::Related(forward)),
            (reverse.to_string(), Members::Related(backward)),
        ])
    }

    fn subject_edges<S>(store: &S, subject: ObjectId) -> UopResult<Vec<SubjectEdge>>
    where
        S: BackingStore + ?Sized,
    {
        let mut edges = Vec::new();
        for edge in store.get_object_roles(subject)? {
            if edge.subject == subject {
                edges.push(SubjectEdge {
                    meta_id: edge.role_id,
                    forward: true,
                    peer: Some(edge.object),
                });
            }
            if edge.object == subject {
                edges.push(SubjectEdge {
                    meta_id: edge.role_id,
                    forward: false,
                    peer: Some(edge.subject),
                });
            }
        }
        Ok(edges)
    }
}

pub(crate) fn reverse_name(meta: &MetaEntity) -> UopResult<&str> {
    meta.reverse_name.as_deref().ok_or_else(|| {
        UopError::Assoc(AssocError::InconsistentState {
            kind: AssocKind::Role,
            reason: format!("role {} has no reverse name", meta.name),
        })
    })
}

impl AssociationIndex<RoleVariant> {
    /// Return the role `name`/`reverse_name`, creating it in the store if
    /// neither name is taken yet.
    pub fn define_role<S>(&mut self, store: &S, name: &str, reverse_name: &str) -> UopResult<MetaEntity>
    where
        S: BackingStore + ?Sized,
    {
        if let Some(existing) = RoleVariant::resolve(&self.names, name) {
            let meta = existing.meta;
            if existing.forward && meta.reverse_name.as_deref() == Some(reverse_name) {
                return Ok(meta.clone());
            }
            return Err(UopError::Assoc(AssocError::DuplicateRoleName {
                name: name.to_string(),
            }));
        }
        if RoleVariant::resolve(&self.names, reverse_name).is_some() {
            return Err(UopError::Assoc(AssocError::DuplicateRoleName {
                name: reverse_name.to_string(),
            }));
        }

        let role = store.ensure_role(name, reverse_name)?;
        tracing::debug!(role = %role.name, reverse = reverse_name, "Defined role");
        self.names.add(role.clone());
        Ok(role)
    }

    /// The other direction's name for either name of a known role.
    pub fn reverse_of(&self, name: &str) -> Option<&str> {
        RoleVariant::resolve(&self.names, name).and_then(|found| found.meta.other_name(name))
    }

    /// Every reverse role name.
    pub fn reverse_names(&self) -> HashSet<&str> {
        self.names
            .records()
            .filter_map(|meta| meta.reverse_name.as_deref())
            .collect()
    }

    /// Whether `name` is in use as a forward or reverse name of any role
    /// other than `except`.
    pub fn name_taken(&self, name: &str, except: Option<&MetaEntity>) -> bool {
        RoleVariant::resolve(&self.names, name)
            .is_some_and(|found| except.map_or(true, |m| m.meta_id() != found.meta.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assoc::RoleIndex;
    use uop_storage::MockStore;

    fn persisted(_: ObjectId) -> bool {
        true
    }

    fn store_with_role() -> (MockStore, RoleIndex) {
        let store = MockStore::new();
        let mut index = RoleIndex::new();
        index.define_role(&store, "parent-of", "child-of").unwrap();
        (store, index)
    }

    #[test]
    fn test_define_role_is_idempotent() {
        let (store, mut index) = store_with_role();
        let again = index.define_role(&store, "parent-of", "child-of").unwrap();
        assert_eq!(again.reverse_name.as_deref(), Some("child-of"));
        assert_eq!(index.names().count(), 1);
    }

    #[test]
    fn test_define_role_rejects_taken_names() {
        let (store, mut index) = store_with_role();
        assert!(matches!(
            index.define_role(&store, "parent-of", "offspring-of"),
            Err(UopError::Assoc(AssocError::DuplicateRoleName { .. }))
        ));
        assert!(matches!(
            index.define_role(&store, "guardian-of", "child-of"),
            Err(UopError::Assoc(AssocError::DuplicateRoleName { .. }))
        ));
    }

    #[test]
    fn test_reverse_lookup() {
        let (_, index) = store_with_role();
        assert_eq!(index.reverse_of("parent-of"), Some("child-of"));
        assert_eq!(index.reverse_of("child-of"), Some("parent-of"));
        assert_eq!(index.reverse_of("sibling-of"), None);
        assert_eq!(index.reverse_names(), HashSet::from(["child-of"]));
        assert!(index.name_taken("child-of", None));
        assert!(!index.name_taken("sibling-of", None));
    }

    #[test]
    fn test_associate_creates_both_directions() {
        let (store, mut index) = store_with_role();
        let (a, b) = (ObjectId::new(), ObjectId::new());

        index.associate(&store, persisted, a, "parent-of", Some(b)).unwrap();

        assert!(index.is_present(a, "parent-of", Some(b)));
        assert!(index.is_present(b, "child-of", Some(a)));
        assert!(!index.is_present(b, "parent-of", Some(a)));
        assert!(store.committed().unwrap().has_role("parent-of", a, b));
    }

    #[test]
    fn test_associate_by_reverse_name_stores_forward_edge() {
        let (store, mut index) = store_with_role();
        let (a, b) = (ObjectId::new(), ObjectId::new());

        index.associate(&store, persisted, b, "child-of", Some(a)).unwrap();

        let data = store.committed().unwrap();
        assert!(data.has_role("parent-of", a, b));
        assert!(index.is_present(a, "parent-of", Some(b)));
    }

    #[test]
    fn test_disassociate_removes_both_directions() {
        let (store, mut index) = store_with_role();
        let (a, b) = (ObjectId::new(), ObjectId::new());
        index.associate(&store, persisted, a, "parent-of", Some(b)).unwrap();

        index.disassociate(&store, b, "child-of", Some(a)).unwrap();

        assert!(!index.is_present(a, "parent-of", Some(b)));
        assert!(!index.is_present(b, "child-of", Some(a)));
        assert!(index.for_subject(&store, persisted, a).unwrap().is_empty());
        assert!(store.committed().unwrap().related.is_empty());
    }

    #[test]
    fn test_unknown_role_name() {
        let (store, mut index) = store_with_role();
        let (a, b) = (ObjectId::new(), ObjectId::new());
        assert!(matches!(
            index.associate(&store, persisted, a, "sibling-of", Some(b)),
            Err(UopError::Assoc(AssocError::InvalidRoleName { .. }))
        ));
        assert!(matches!(
            index.disassociate(&store, a, "sibling-of", Some(b)),
            Err(UopError::Assoc(AssocError::InvalidRoleName { .. }))
        ));
        assert!(!index.is_present(a, "sibling-of", Some(b)));
    }

    #[test]
    fn test_lazy_load_reads_both_directions() {
        let store = MockStore::new();
        let role = store.ensure_role("parent-of", "child-of").unwrap();
        let (a, b) = (ObjectId::new(), ObjectId::new());
        store.associate(AssocKind::Role, a, role.id, Some(b)).unwrap();

        let mut index = RoleIndex::new();
        index.reload_meta(&store).unwrap();

        let for_b = index.for_subject(&store, persisted, b).unwrap();
        assert_eq!(for_b.get("child-of"), Some(&HashSet::from([a])));

        let members = index.for_meta(&store, "parent-of").unwrap().unwrap();
        assert!(members.contains(a, Some(b)));
        assert!(index.edge_state(&store, persisted, a, "parent-of", Some(b)).unwrap());
        index.verify().unwrap();
    }

    #[test]
    fn test_self_edge() {
        let (store, mut index) = store_with_role();
        let a = ObjectId::new();
        index.associate(&store, persisted, a, "parent-of", Some(a)).unwrap();
        assert!(index.is_present(a, "child-of", Some(a)));

        let mut fresh = RoleIndex::new();
        fresh.reload_meta(&store).unwrap();
        let assocs = fresh.for_subject(&store, persisted, a).unwrap();
        assert_eq!(assocs.len(), 2);
        fresh.verify().unwrap();
    }
}
