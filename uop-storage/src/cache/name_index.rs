//! Bidirectional id/name lookup over one kind of meta definition.

use std::collections::HashMap;
use uop_core::{MetaId, MetaRecord};

/// Four parallel mappings (id→record, name→record, id→name, name→id) kept in
/// step by `add` and `remove`. Lookups return `None` for unknown keys.
#[derive(Debug, Clone)]
pub struct NameIdIndex<M> {
    by_id: HashMap<MetaId, M>,
    by_name: HashMap<String, M>,
    id_to_name: HashMap<MetaId, String>,
    name_to_id: HashMap<String, MetaId>,
}

impl<M> Default for NameIdIndex<M> {
    fn default() -> Self {
        Self {
            by_id: HashMap::new(),
            by_name: HashMap::new(),
            id_to_name: HashMap::new(),
            name_to_id: HashMap::new(),
        }
    }
}

impl<M: MetaRecord> NameIdIndex<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index over `records`.
    pub fn from_records(records: impl IntoIterator<Item = M>) -> Self {
        let mut index = Self::new();
        for record in records {
            index.add(record);
        }
        index
    }

    /// Insert or overwrite `record` in all four mappings. A record re-added
    /// under a new name loses its old name.
    pub fn add(&mut self, record: M) {
        let id = record.meta_id();
        let name = record.name().to_string();

        if let Some(old_name) = self.id_to_name.get(&id) {
            if *old_name != name {
                let old_name = old_name.clone();
                self.by_name.remove(&old_name);
                self.name_to_id.remove(&old_name);
            }
        }

        self.by_name.insert(name.clone(), record.clone());
        self.by_id.insert(id, record);
        self.id_to_name.insert(id, name.clone());
        self.name_to_id.insert(name, id);
    }

    /// Remove `record` from all four mappings.
    pub fn remove(&mut self, record: &M) -> Option<M> {
        self.remove_id(record.meta_id())
    }

    /// Remove the record with `id` from all four mappings.
    pub fn remove_id(&mut self, id: MetaId) -> Option<M> {
        let removed = self.by_id.remove(&id)?;
        if let Some(name) = self.id_to_name.remove(&id) {
            self.by_name.remove(&name);
            self.name_to_id.remove(&name);
        }
        Some(removed)
    }

    pub fn by_id(&self, id: MetaId) -> Option<&M> {
        self.by_id.get(&id)
    }

    pub fn by_name(&self, name: &str) -> Option<&M> {
        self.by_name.get(name)
    }

    pub fn id_for(&self, name: &str) -> Option<MetaId> {
        self.name_to_id.get(name).copied()
    }

    pub fn name_for(&self, id: MetaId) -> Option<&str> {
        self.id_to_name.get(&id).map(String::as_str)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.name_to_id.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.name_to_id.keys().map(String::as_str)
    }

    pub fn records(&self) -> impl Iterator<Item = &M> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_name.clear();
        self.id_to_name.clear();
        self.name_to_id.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uop_core::{ClassDef, MetaEntity};

    fn assert_mappings_agree<M: MetaRecord + PartialEq + std::fmt::Debug>(index: &NameIdIndex<M>) {
        assert_eq!(index.by_id.len(), index.by_name.len());
        assert_eq!(index.id_to_name.len(), index.name_to_id.len());
        for (id, record) in &index.by_id {
            let name = index.name_for(*id).unwrap();
            assert_eq!(record.name(), name);
            assert_eq!(index.id_for(name), Some(*id));
            assert_eq!(index.by_name(name), Some(record));
        }
    }

    #[test]
    fn test_add_and_lookup() {
        let urgent = MetaEntity::tag("urgent");
        let index = NameIdIndex::from_records([urgent.clone(), MetaEntity::tag("later")]);

        assert_eq!(index.len(), 2);
        assert_eq!(index.by_id(urgent.id), Some(&urgent));
        assert_eq!(index.by_name("urgent"), Some(&urgent));
        assert_eq!(index.id_for("urgent"), Some(urgent.id));
        assert_eq!(index.name_for(urgent.id), Some("urgent"));
        assert_mappings_agree(&index);
    }

    #[test]
    fn test_unknown_lookups_are_none() {
        let index: NameIdIndex<MetaEntity> = NameIdIndex::new();
        assert!(index.by_name("missing").is_none());
        assert!(index.by_id(MetaId::new()).is_none());
        assert!(index.id_for("missing").is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn test_remove_clears_all_four_mappings() {
        let urgent = MetaEntity::tag("urgent");
        let mut index = NameIdIndex::from_records([urgent.clone()]);

        assert_eq!(index.remove(&urgent), Some(urgent.clone()));
        assert!(!index.contains_name("urgent"));
        assert!(index.name_for(urgent.id).is_none());
        assert!(index.remove(&urgent).is_none());
        assert_mappings_agree(&index);
    }

    #[test]
    fn test_readd_under_new_name_drops_old_name() {
        let urgent = MetaEntity::tag("urgent");
        let mut index = NameIdIndex::from_records([urgent.clone()]);

        let mut renamed = urgent.clone();
        renamed.name = "critical".to_string();
        index.add(renamed.clone());

        assert!(index.by_name("urgent").is_none());
        assert_eq!(index.by_name("critical"), Some(&renamed));
        assert_eq!(index.len(), 1);
        assert_mappings_agree(&index);
    }

    #[test]
    fn test_generic_over_class_definitions() {
        let book = ClassDef::new("Book", vec![]);
        let index = NameIdIndex::from_records([book.clone()]);
        assert_eq!(index.id_for("Book"), Some(book.id));
        assert_eq!(index.names().collect::<Vec<_>>(), vec!["Book"]);
    }
}
