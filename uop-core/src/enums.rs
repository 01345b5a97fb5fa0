//! Enum types used across the client cache

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity type discriminator for records held by the store and the caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Object,
    Tag,
    Group,
    Role,
    Class,
    Attribute,
    Query,
}

impl EntityType {
    /// Meta kinds in the order their definitions must reach the store.
    pub const META_KINDS: [EntityType; 6] = [
        EntityType::Tag,
        EntityType::Group,
        EntityType::Role,
        EntityType::Class,
        EntityType::Attribute,
        EntityType::Query,
    ];

    /// Whether this is a meta definition kind (everything but `Object`).
    pub fn is_meta(&self) -> bool {
        !matches!(self, EntityType::Object)
    }

    /// The association kind this entity type defines, if any.
    pub fn assoc_kind(&self) -> Option<AssocKind> {
        match self {
            EntityType::Tag => Some(AssocKind::Tag),
            EntityType::Group => Some(AssocKind::Group),
            EntityType::Role => Some(AssocKind::Role),
            _ => None,
        }
    }
}

/// The three association kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssocKind {
    /// Undirected label on a subject.
    Tag,
    /// Undirected label that may be nested inside other groups.
    Group,
    /// Directed, named edge between two subjects with a reverse name.
    Role,
}

impl AssocKind {
    pub const ALL: [AssocKind; 3] = [AssocKind::Tag, AssocKind::Group, AssocKind::Role];

    /// The entity type of this kind's meta definitions.
    pub fn entity_type(&self) -> EntityType {
        match self {
            AssocKind::Tag => EntityType::Tag,
            AssocKind::Group => EntityType::Group,
            AssocKind::Role => EntityType::Role,
        }
    }

    /// Roles carry a second endpoint and a reverse edge.
    pub fn is_directed(&self) -> bool {
        matches!(self, AssocKind::Role)
    }
}

/// Attribute value types known to the meta model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AttrType {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
    Date,
    Json,
}

impl AttrType {
    /// Value a freshly created instance gets for an attribute of this type.
    pub fn default_value(&self) -> serde_json::Value {
        match self {
            AttrType::String | AttrType::Date => serde_json::Value::String(String::new()),
            AttrType::Integer => serde_json::Value::from(0i64),
            AttrType::Float => serde_json::Value::from(0.0f64),
            AttrType::Boolean => serde_json::Value::Bool(false),
            AttrType::Json => serde_json::Value::Null,
        }
    }
}

/// Transaction state of a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TxnState {
    /// No open transaction; caches reflect the last synchronized snapshot.
    #[default]
    Idle,
    /// Mutations are accepted and tracked against the snapshot.
    InTransaction,
}

// ============================================================================
// STRING CONVERSIONS
// ============================================================================

fn normalize_token(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            EntityType::Object => "Object",
            EntityType::Tag => "Tag",
            EntityType::Group => "Group",
            EntityType::Role => "Role",
            EntityType::Class => "Class",
            EntityType::Attribute => "Attribute",
            EntityType::Query => "Query",
        };
        write!(f, "{}", value)
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "object" | "objects" => Ok(EntityType::Object),
            "tag" | "tags" => Ok(EntityType::Tag),
            "group" | "groups" => Ok(EntityType::Group),
            "role" | "roles" => Ok(EntityType::Role),
            "class" | "classes" => Ok(EntityType::Class),
            "attribute" | "attributes" => Ok(EntityType::Attribute),
            "query" | "queries" => Ok(EntityType::Query),
            _ => Err(format!("Invalid EntityType: {}", s)),
        }
    }
}

impl fmt::Display for AssocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            AssocKind::Tag => "tags",
            AssocKind::Group => "groups",
            AssocKind::Role => "roles",
        };
        write!(f, "{}", value)
    }
}

impl FromStr for AssocKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "tag" | "tags" => Ok(AssocKind::Tag),
            "group" | "groups" => Ok(AssocKind::Group),
            "role" | "roles" | "relationship" | "relationships" => Ok(AssocKind::Role),
            _ => Err(format!("Invalid AssocKind: {}", s)),
        }
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            AttrType::String => "String",
            AttrType::Integer => "Integer",
            AttrType::Float => "Float",
            AttrType::Boolean => "Boolean",
            AttrType::Date => "Date",
            AttrType::Json => "Json",
        };
        write!(f, "{}", value)
    }
}

impl FromStr for AttrType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "string" | "str" | "text" => Ok(AttrType::String),
            "integer" | "int" => Ok(AttrType::Integer),
            "float" | "double" => Ok(AttrType::Float),
            "boolean" | "bool" => Ok(AttrType::Boolean),
            "date" | "datetime" => Ok(AttrType::Date),
            "json" | "object" => Ok(AttrType::Json),
            _ => Err(format!("Invalid AttrType: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_roundtrip_through_strings() {
        for kind in EntityType::META_KINDS {
            let parsed: EntityType = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert_eq!("objects".parse::<EntityType>().unwrap(), EntityType::Object);
        assert!("widget".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_assoc_kind_parse_accepts_plural_and_aliases() {
        assert_eq!("Tags".parse::<AssocKind>().unwrap(), AssocKind::Tag);
        assert_eq!("relationship".parse::<AssocKind>().unwrap(), AssocKind::Role);
        assert!("labels".parse::<AssocKind>().is_err());
    }

    #[test]
    fn test_only_roles_are_directed() {
        assert!(AssocKind::Role.is_directed());
        assert!(!AssocKind::Tag.is_directed());
        assert!(!AssocKind::Group.is_directed());
        for kind in AssocKind::ALL {
            assert_eq!(kind.entity_type().assoc_kind(), Some(kind));
        }
        assert_eq!(EntityType::Class.assoc_kind(), None);
    }

    #[test]
    fn test_attr_type_defaults() {
        assert_eq!(AttrType::Integer.default_value(), serde_json::json!(0));
        assert_eq!(AttrType::Boolean.default_value(), serde_json::json!(false));
        assert_eq!(AttrType::String.default_value(), serde_json::json!(""));
        assert!(AttrType::Json.default_value().is_null());
    }
}
