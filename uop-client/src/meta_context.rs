//! Name lookups for classes, attributes and saved queries.

use uop_core::{AttributeDef, ClassDef, EntityType, MetaDef, MetaId, QueryDef};
use uop_storage::NameIdIndex;

/// Class, attribute and query definitions by id and by name.
#[derive(Debug, Clone, Default)]
pub struct MetaContext {
    classes: NameIdIndex<ClassDef>,
    attributes: NameIdIndex<AttributeDef>,
    queries: NameIdIndex<QueryDef>,
}

impl MetaContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from full definition lists.
    pub fn from_definitions(
        classes: impl IntoIterator<Item = ClassDef>,
        attributes: impl IntoIterator<Item = AttributeDef>,
        queries: impl IntoIterator<Item = QueryDef>,
    ) -> Self {
        Self {
            classes: NameIdIndex::from_records(classes),
            attributes: NameIdIndex::from_records(attributes),
            queries: NameIdIndex::from_records(queries),
        }
    }

    /// Add or replace a definition. Association definitions are ignored.
    pub fn insert(&mut self, def: &MetaDef) {
        match def {
            MetaDef::Class(class) => self.classes.add(class.clone()),
            MetaDef::Attribute(attr) => self.attributes.add(attr.clone()),
            MetaDef::Query(query) => self.queries.add(query.clone()),
            MetaDef::Tag(_) | MetaDef::Group(_) | MetaDef::Role(_) => {}
        }
    }

    pub fn remove(&mut self, kind: EntityType, id: MetaId) {
        match kind {
            EntityType::Class => {
                self.classes.remove_id(id);
            }
            EntityType::Attribute => {
                self.attributes.remove_id(id);
            }
            EntityType::Query => {
                self.queries.remove_id(id);
            }
            _ => {}
        }
    }

    pub fn class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.by_name(name)
    }

    pub fn class_by_id(&self, id: MetaId) -> Option<&ClassDef> {
        self.classes.by_id(id)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.by_name(name)
    }

    pub fn attribute_by_id(&self, id: MetaId) -> Option<&AttributeDef> {
        self.attributes.by_id(id)
    }

    pub fn query(&self, name: &str) -> Option<&QueryDef> {
        self.queries.by_name(name)
    }

    /// Attributes of `class`, inherited ones first. Unknown ids are skipped.
    pub fn attributes_of(&self, class: &ClassDef) -> Vec<&AttributeDef> {
        let mut chain = vec![class];
        let mut parent = class.superclass;
        while let Some(id) = parent {
            match self.classes.by_id(id) {
                Some(superclass) if !chain.iter().any(|c| c.id == superclass.id) => {
                    chain.push(superclass);
                    parent = superclass.superclass;
                }
                _ => break,
            }
        }

        let mut attributes: Vec<&AttributeDef> = Vec::new();
        for class in chain.into_iter().rev() {
            for id in &class.attributes {
                if let Some(attr) = self.attributes.by_id(*id) {
                    if !attributes.iter().any(|a| a.id == attr.id) {
                        attributes.push(attr);
                    }
                }
            }
        }
        attributes
    }

    /// Sorted names of one kind; empty for association kinds.
    pub fn names(&self, kind: EntityType) -> Vec<String> {
        let mut names: Vec<String> = match kind {
            EntityType::Class => self.classes.names().map(str::to_string).collect(),
            EntityType::Attribute => self.attributes.names().map(str::to_string).collect(),
            EntityType::Query => self.queries.names().map(str::to_string).collect(),
            _ => Vec::new(),
        };
        names.sort();
        names
    }
}
