//! Core record structures: objects, meta definitions and association labels

use crate::{AssocKind, AttrType, EntityType, MetaId, ObjectId};
use serde::{Deserialize, Serialize};

/// A record that can be looked up both by id and by name.
pub trait MetaRecord: Clone {
    /// Entity type of this definition.
    fn entity_type(&self) -> EntityType;

    /// Unique id within the definition's kind.
    fn meta_id(&self) -> MetaId;

    /// Unique name within the definition's kind.
    fn name(&self) -> &str;
}

/// Definition of a tag, group or role.
///
/// `reverse_name` is only set for roles, `contained_in` is only meaningful for
/// groups (names of the parent groups).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaEntity {
    pub id: MetaId,
    pub kind: AssocKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse_name: Option<String>,
    #[serde(default)]
    pub contained_in: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MetaEntity {
    /// New tag definition.
    pub fn tag(name: impl Into<String>) -> Self {
        Self::new(AssocKind::Tag, name)
    }

    /// New top level group definition.
    pub fn group(name: impl Into<String>) -> Self {
        Self::new(AssocKind::Group, name)
    }

    /// New role definition with its reverse name.
    pub fn role(name: impl Into<String>, reverse_name: impl Into<String>) -> Self {
        let mut meta = Self::new(AssocKind::Role, name);
        meta.reverse_name = Some(reverse_name.into());
        meta
    }

    /// New definition of the given kind with a fresh id.
    pub fn new(kind: AssocKind, name: impl Into<String>) -> Self {
        Self {
            id: MetaId::new(),
            kind,
            name: name.into(),
            reverse_name: None,
            contained_in: Vec::new(),
            description: None,
        }
    }

    /// Place a group inside a parent group.
    pub fn within(mut self, parent: impl Into<String>) -> Self {
        self.contained_in.push(parent.into());
        self
    }

    /// The name of the other direction of a role, given either of its names.
    pub fn other_name(&self, name: &str) -> Option<&str> {
        let reverse = self.reverse_name.as_deref()?;
        if name == self.name {
            Some(reverse)
        } else if name == reverse {
            Some(&self.name)
        } else {
            None
        }
    }
}

impl MetaRecord for MetaEntity {
    fn entity_type(&self) -> EntityType {
        self.kind.entity_type()
    }

    fn meta_id(&self) -> MetaId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Class definition: the attributes an instance carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDef {
    pub id: MetaId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superclass: Option<MetaId>,
    #[serde(default)]
    pub attributes: Vec<MetaId>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>, attributes: Vec<MetaId>) -> Self {
        Self {
            id: MetaId::new(),
            name: name.into(),
            superclass: None,
            attributes,
        }
    }
}

impl MetaRecord for ClassDef {
    fn entity_type(&self) -> EntityType {
        EntityType::Class
    }

    fn meta_id(&self) -> MetaId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Attribute definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub id: MetaId,
    pub name: String,
    pub attr_type: AttrType,
    #[serde(default)]
    pub required: bool,
}

impl AttributeDef {
    pub fn new(name: impl Into<String>, attr_type: AttrType) -> Self {
        Self {
            id: MetaId::new(),
            name: name.into(),
            attr_type,
            required: false,
        }
    }
}

impl MetaRecord for AttributeDef {
    fn entity_type(&self) -> EntityType {
        EntityType::Attribute
    }

    fn meta_id(&self) -> MetaId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Saved query definition. The expression is opaque to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDef {
    pub id: MetaId,
    pub name: String,
    pub expression: serde_json::Value,
}

impl QueryDef {
    pub fn new(name: impl Into<String>, expression: serde_json::Value) -> Self {
        Self {
            id: MetaId::new(),
            name: name.into(),
            expression,
        }
    }
}

impl MetaRecord for QueryDef {
    fn entity_type(&self) -> EntityType {
        EntityType::Query
    }

    fn meta_id(&self) -> MetaId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Any meta definition, as pushed to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaDef {
    Tag(MetaEntity),
    Group(MetaEntity),
    Role(MetaEntity),
    Class(ClassDef),
    Attribute(AttributeDef),
    Query(QueryDef),
}

impl MetaDef {
    /// Wrap an association definition under the variant matching its kind.
    pub fn assoc(meta: MetaEntity) -> Self {
        match meta.kind {
            AssocKind::Tag => MetaDef::Tag(meta),
            AssocKind::Group => MetaDef::Group(meta),
            AssocKind::Role => MetaDef::Role(meta),
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            MetaDef::Tag(_) => EntityType::Tag,
            MetaDef::Group(_) => EntityType::Group,
            MetaDef::Role(_) => EntityType::Role,
            MetaDef::Class(_) => EntityType::Class,
            MetaDef::Attribute(_) => EntityType::Attribute,
            MetaDef::Query(_) => EntityType::Query,
        }
    }

    pub fn id(&self) -> MetaId {
        match self {
            MetaDef::Tag(m) | MetaDef::Group(m) | MetaDef::Role(m) => m.id,
            MetaDef::Class(c) => c.id,
            MetaDef::Attribute(a) => a.id,
            MetaDef::Query(q) => q.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            MetaDef::Tag(m) | MetaDef::Group(m) | MetaDef::Role(m) => &m.name,
            MetaDef::Class(c) => &c.name,
            MetaDef::Attribute(a) => &a.name,
            MetaDef::Query(q) => &q.name,
        }
    }
}

/// All meta definitions known to the store, by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaSnapshot {
    pub tags: Vec<MetaEntity>,
    pub groups: Vec<MetaEntity>,
    pub roles: Vec<MetaEntity>,
    pub classes: Vec<ClassDef>,
    pub attributes: Vec<AttributeDef>,
    pub queries: Vec<QueryDef>,
}

impl MetaSnapshot {
    /// Association definitions of one kind.
    pub fn of_kind(&self, kind: AssocKind) -> &[MetaEntity] {
        match kind {
            AssocKind::Tag => &self.tags,
            AssocKind::Group => &self.groups,
            AssocKind::Role => &self.roles,
        }
    }
}

/// A persisted object: its id, optional class and flat attribute map.
///
/// Attributes are flattened on serialization so that field level diffs see
/// every attribute as its own field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub id: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<MetaId>,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl ObjectRecord {
    /// New classless object with a fresh id.
    pub fn new() -> Self {
        Self::with_id(ObjectId::new())
    }

    pub fn with_id(id: ObjectId) -> Self {
        Self {
            id,
            class_id: None,
            attributes: serde_json::Map::new(),
        }
    }

    pub fn of_class(class_id: MetaId) -> Self {
        let mut record = Self::new();
        record.class_id = Some(class_id);
        record
    }

    /// Builder style attribute setter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.attributes.insert(key.into(), value.into());
    }
}

impl Default for ObjectRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// A directed role edge as stored: `subject --role--> object`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleEdge {
    pub role_id: MetaId,
    pub subject: ObjectId,
    pub object: ObjectId,
}

/// A labeled association, addressed by name.
///
/// For tags and groups `object` is `None`. For roles `name` may be either the
/// forward or the reverse role name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assoc {
    pub kind: AssocKind,
    pub subject: ObjectId,
    pub name: String,
    pub object: Option<ObjectId>,
}

impl Assoc {
    pub fn tag(subject: ObjectId, name: impl Into<String>) -> Self {
        Self {
            kind: AssocKind::Tag,
            subject,
            name: name.into(),
            object: None,
        }
    }

    pub fn group(subject: ObjectId, name: impl Into<String>) -> Self {
        Self {
            kind: AssocKind::Group,
            subject,
            name: name.into(),
            object: None,
        }
    }

    pub fn role(subject: ObjectId, name: impl Into<String>, object: ObjectId) -> Self {
        Self {
            kind: AssocKind::Role,
            subject,
            name: name.into(),
            object: Some(object),
        }
    }
}
