//! UOP Test Utilities
//!
//! Shared test infrastructure for the UOP workspace:
//! - Proptest generators for ids, labels, records and role names
//! - A seeded dataset fixture backed by a `MockStore`
//! - Assertions comparing client state with committed store data
//! - One-time tracing setup for tests

// Re-export mock storage from its source crate
pub use uop_storage::{BackingStore, FailPoint, MockStore, StoreData};

// Re-export core types for convenience
pub use uop_core::{
    Assoc, AssocKind, AttrType, AttributeDef, ClassDef, ClientConfig, EntityType, MetaEntity,
    MetaId, ObjectId, ObjectRecord, RoleEdge, UopError, UopResult,
};

use proptest::prelude::*;
use std::sync::Once;
use uuid::Uuid;

// ============================================================================
// TRACING
// ============================================================================

static TRACING: Once = Once::new();

/// Install a fmt subscriber filtered by `RUST_LOG` (default `warn`), once per
/// test binary.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// GENERATORS
// ============================================================================

/// Generate an arbitrary object id.
pub fn arb_object_id() -> impl Strategy<Value = ObjectId> {
    any::<u128>().prop_map(|n| ObjectId::from_uuid(Uuid::from_u128(n)))
}

/// Generate a tag, group or role name.
pub fn arb_label() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,15}"
}

/// Generate an attribute value.
pub fn arb_attr_value() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        any::<i64>().prop_map(serde_json::Value::from),
        any::<bool>().prop_map(serde_json::Value::from),
        "[a-zA-Z0-9 ]{0,24}".prop_map(serde_json::Value::from),
    ]
}

/// Generate a classless object. Attribute names never collide with the
/// record's own `id` and `class_id` fields.
pub fn arb_object_record() -> impl Strategy<Value = ObjectRecord> {
    (
        arb_object_id(),
        prop::collection::btree_map("f_[a-z]{1,8}", arb_attr_value(), 0..6),
    )
        .prop_map(|(id, fields)| {
            let mut record = ObjectRecord::with_id(id);
            for (key, value) in fields {
                record.set(key, value);
            }
            record
        })
}

/// Generate a distinct forward/reverse role name pair.
pub fn arb_role_pair() -> impl Strategy<Value = (String, String)> {
    arb_label().prop_map(|label| (format!("{label}-of"), format!("{label}-by")))
}

/// Generate a dataset with up to 8 objects and random associations.
pub fn arb_dataset() -> impl Strategy<Value = Dataset> {
    (1usize..8)
        .prop_flat_map(|n| {
            (
                Just(n),
                prop::collection::vec((0..n, 0usize..3), 0..12),
                prop::collection::vec((0..n, 0usize..4), 0..12),
                prop::collection::vec((0usize..2, 0..n, 0..n), 0..12),
            )
        })
        .prop_map(|(n, tags, groups, roles)| Dataset::build(n, &tags, &groups, &roles))
}

// ============================================================================
// FIXTURES
// ============================================================================

/// A small library: books and notes, a few tags, nested groups and two
/// roles, committed to a fresh [`MockStore`].
///
/// Vocabulary:
/// - tags: `urgent`, `later`, `archived`
/// - groups: `library` ⊃ `fiction` ⊃ `sci-fi`, and `work`
/// - roles: `parent-of`/`child-of`, `cites`/`cited-by`
/// - classes: `Book` (title, pages), `Note` (title, read)
#[derive(Debug, Clone)]
pub struct Dataset {
    pub store: MockStore,
    pub objects: Vec<ObjectId>,
    pub classes: Vec<ClassDef>,
    pub attributes: Vec<AttributeDef>,
    pub tags: Vec<MetaEntity>,
    pub groups: Vec<MetaEntity>,
    pub roles: Vec<MetaEntity>,
}

impl Dataset {
    /// Six objects with a fixed set of associations.
    pub fn sample() -> Self {
        Self::build(
            6,
            &[(0, 0), (1, 0), (2, 1), (3, 2)],
            &[(0, 1), (1, 2), (2, 2), (4, 3)],
            &[(0, 0, 1), (0, 1, 2), (0, 2, 3), (1, 4, 0)],
        )
    }

    /// Build a dataset from index-based edges: `(object, tag)`,
    /// `(object, group)` and `(role, subject, object)`. Indices wrap around.
    pub fn build(
        object_count: usize,
        tag_edges: &[(usize, usize)],
        group_edges: &[(usize, usize)],
        role_edges: &[(usize, usize, usize)],
    ) -> Self {
        let title = AttributeDef::new("title", AttrType::String);
        let pages = AttributeDef::new("pages", AttrType::Integer);
        let read = AttributeDef::new("read", AttrType::Boolean);
        let book = ClassDef::new("Book", vec![title.id, pages.id]);
        let note = ClassDef::new("Note", vec![title.id, read.id]);

        let tags = vec![
            MetaEntity::tag("urgent"),
            MetaEntity::tag("later"),
            MetaEntity::tag("archived"),
        ];
        let groups = vec![
            MetaEntity::group("library"),
            MetaEntity::group("fiction").within("library"),
            MetaEntity::group("sci-fi").within("fiction"),
            MetaEntity::group("work"),
        ];
        let roles = vec![
            MetaEntity::role("parent-of", "child-of"),
            MetaEntity::role("cites", "cited-by"),
        ];

        let mut data = StoreData::new();
        let mut objects = Vec::with_capacity(object_count);
        for i in 0..object_count.max(1) {
            let class = if i % 2 == 0 { &book } else { &note };
            let record = ObjectRecord::of_class(class.id).with("title", format!("Object {i}"));
            objects.push(record.id);
            data.objects.insert(record.id, record);
        }
        let object = |i: usize| objects[i % objects.len()];

        for (o, t) in tag_edges {
            data.tagged.insert((tags[t % tags.len()].id, object(*o)));
        }
        for (o, g) in group_edges {
            data.grouped.insert((groups[g % groups.len()].id, object(*o)));
        }
        for (r, s, o) in role_edges {
            data.related.insert(RoleEdge {
                role_id: roles[r % roles.len()].id,
                subject: object(*s),
                object: object(*o),
            });
        }

        for attr in [&title, &pages, &read] {
            data.attributes.insert(attr.id, attr.clone());
        }
        for class in [&book, &note] {
            data.classes.insert(class.id, class.clone());
        }
        data.tags = tags.iter().map(|m| (m.id, m.clone())).collect();
        data.groups = groups.iter().map(|m| (m.id, m.clone())).collect();
        data.roles = roles.iter().map(|m| (m.id, m.clone())).collect();

        Self {
            store: MockStore::with_data(data),
            objects,
            classes: vec![book, note],
            attributes: vec![title, pages, read],
            tags,
            groups,
            roles,
        }
    }

    /// Committed store contents.
    pub fn data(&self) -> UopResult<StoreData> {
        self.store.committed()
    }

    pub fn tag_named(&self, name: &str) -> Option<&MetaEntity> {
        self.tags.iter().find(|m| m.name == name)
    }

    pub fn group_named(&self, name: &str) -> Option<&MetaEntity> {
        self.groups.iter().find(|m| m.name == name)
    }

    pub fn role_named(&self, name: &str) -> Option<&MetaEntity> {
        self.roles.iter().find(|m| m.name == name)
    }

    /// Every committed association, roles in the forward direction only.
    pub fn expected_assocs(&self) -> UopResult<Vec<Assoc>> {
        let data = self.data()?;
        Ok(store_assocs(&data))
    }
}

/// Every association in `data`, roles in the forward direction only.
pub fn store_assocs(data: &StoreData) -> Vec<Assoc> {
    let mut assocs = Vec::new();
    for (meta_id, object) in &data.tagged {
        if let Some(tag) = data.tags.get(meta_id) {
            assocs.push(Assoc::tag(*object, tag.name.clone()));
        }
    }
    for (meta_id, object) in &data.grouped {
        if let Some(group) = data.groups.get(meta_id) {
            assocs.push(Assoc::group(*object, group.name.clone()));
        }
    }
    for edge in &data.related {
        if let Some(role) = data.roles.get(&edge.role_id) {
            assocs.push(Assoc::role(edge.subject, role.name.clone(), edge.object));
        }
    }
    assocs
}

// ============================================================================
// ASSERTIONS
// ============================================================================

/// Assert that every association an index reports is committed in `data`.
/// Role associations may use either name.
pub fn assert_index_consistent(data: &StoreData, assocs: &[Assoc]) {
    for assoc in assocs {
        let stored = match (assoc.kind, assoc.object) {
            (AssocKind::Tag, _) => data.has_tag(&assoc.name, assoc.subject),
            (AssocKind::Group, _) => data.has_group(&assoc.name, assoc.subject),
            (AssocKind::Role, Some(object)) => data.has_role(&assoc.name, assoc.subject, object),
            (AssocKind::Role, None) => false,
        };
        assert!(stored, "association not in store: {:?}", assoc);
    }
}

/// Assert that `id` is gone from the store: no record and no edge.
pub fn assert_no_trace(data: &StoreData, id: ObjectId) {
    assert!(
        !data.mentions_object(id),
        "object {} still present in store",
        id
    );
}
