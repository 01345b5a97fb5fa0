//! Per-kind behavior plugged into [`AssociationIndex`](super::AssociationIndex).

use super::Members;
use std::collections::HashSet;
use std::fmt;
use uop_core::{AssocError, AssocKind, MetaEntity, MetaId, ObjectId, UopError, UopResult};
use uop_storage::{BackingStore, NameIdIndex};

/// A name resolved against the known definitions of one kind.
#[derive(Debug, Clone, Copy)]
pub struct Resolved<'a> {
    pub meta: &'a MetaEntity,
    /// False when the name was the reverse name of a role.
    pub forward: bool,
}

/// One association of a subject as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubjectEdge {
    pub meta_id: MetaId,
    pub forward: bool,
    /// The other end of a role edge; `None` for tags and groups.
    pub peer: Option<ObjectId>,
}

/// What differs between tag, group and role indices.
pub trait AssociationVariant: fmt::Debug + Default + Clone + Send + Sync + 'static {
    const KIND: AssocKind;

    /// Look up `name` among the known definitions.
    fn resolve<'a>(names: &'a NameIdIndex<MetaEntity>, name: &str) -> Option<Resolved<'a>>;

    /// Error for a write addressed to a name with no definition.
    fn unknown_name(name: &str) -> UopError;

    /// Empty bucket of the shape this kind stores under `by_name`.
    fn empty_members() -> Members;

    /// Every `by_name` bucket for one definition, loaded from the store.
    fn load_members<S>(store: &S, meta: &MetaEntity) -> UopResult<Vec<(String, Members)>>
    where
        S: BackingStore + ?Sized;

    /// Every association of `subject`, loaded from the store.
    fn subject_edges<S>(store: &S, subject: ObjectId) -> UopResult<Vec<SubjectEdge>>
    where
        S: BackingStore + ?Sized;
}

macro_rules! label_variant {
    ($(#[$doc:meta])* $name:ident, $kind:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl AssociationVariant for $name {
            const KIND: AssocKind = $kind;

            fn resolve<'a>(
                names: &'a NameIdIndex<MetaEntity>,
                name: &str,
            ) -> Option<Resolved<'a>> {
                names.by_name(name).map(|meta| Resolved {
                    meta,
                    forward: true,
                })
            }

            fn unknown_name(name: &str) -> UopError {
                UopError::Assoc(AssocError::NotFound {
                    kind: $kind,
                    name: name.to_string(),
                })
            }

            fn empty_members() -> Members {
                Members::Set(HashSet::new())
            }

            fn load_members<S>(store: &S, meta: &MetaEntity) -> UopResult<Vec<(String, Members)>>
            where
                S: BackingStore + ?Sized,
            {
                let members = store.get_members($kind, meta.id)?;
                Ok(vec![(meta.name.clone(), Members::Set(members))])
            }

            fn subject_edges<S>(store: &S, subject: ObjectId) -> UopResult<Vec<SubjectEdge>>
            where
                S: BackingStore + ?Sized,
            {
                Ok(store
                    .get_object_assocs($kind, subject)?
                    .into_iter()
                    .map(|meta_id| SubjectEdge {
                        meta_id,
                        forward: true,
                        peer: None,
                    })
                    .collect())
            }
        }
    };
}

label_variant!(
    /// Undirected labels.
    TagVariant,
    AssocKind::Tag
);

label_variant!(
    /// Undirected labels arranged in a containment hierarchy.
    GroupVariant,
    AssocKind::Group
);
