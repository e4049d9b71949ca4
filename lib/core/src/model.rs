//! Relational model produced by ingestion and held by a store
//!
//! One entity table, one link table per multi-valued attribute group, and a
//! geography table in one of its two shapes.

use crate::geography::GeographyTable;
use crate::{EntityId, Entity, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One (entity, label) row of a link table
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkPair {
    pub entity_id: EntityId,
    pub label: String,
}

impl LinkPair {
    pub fn new(entity_id: EntityId, label: impl Into<String>) -> Self {
        Self {
            entity_id,
            label: label.into(),
        }
    }
}

/// Many-to-many relation between entities and the labels of one group.
/// Pairs are unique; iteration order is (id, label).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkTable {
    pairs: BTreeSet<LinkPair>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pair, returning `false` if it was already present
    pub fn insert(&mut self, entity_id: EntityId, label: &str) -> bool {
        self.pairs.insert(LinkPair::new(entity_id, label))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LinkPair> {
        self.pairs.iter()
    }

    pub fn to_vec(&self) -> Vec<LinkPair> {
        self.pairs.iter().cloned().collect()
    }
}

impl FromIterator<LinkPair> for LinkTable {
    fn from_iter<I: IntoIterator<Item = LinkPair>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

/// Complete content of a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationalModel {
    /// Entity rows ordered by id
    pub entities: Vec<Entity>,
    /// Link tables keyed by attribute group name
    pub links: BTreeMap<String, LinkTable>,
    pub geography: GeographyTable,
}

impl Default for RelationalModel {
    fn default() -> Self {
        Self {
            entities: Vec::new(),
            links: BTreeMap::new(),
            geography: GeographyTable::Direct(Vec::new()),
        }
    }
}

impl RelationalModel {
    pub fn entity_ids(&self) -> BTreeSet<EntityId> {
        self.entities.iter().map(|e| e.id).collect()
    }

    pub fn link_count(&self) -> usize {
        self.links.values().map(LinkTable::len).sum()
    }

    /// Check the invariants every store relies on:
    /// unique entity ids, link and geography rows referencing known
    /// entities, trimmed non-empty labels, names and scopes.
    pub fn check_integrity(&self) -> Result<()> {
        let mut ids = BTreeSet::new();
        for entity in &self.entities {
            if !ids.insert(entity.id) {
                return Err(Error::Integrity(format!("duplicate entity id {}", entity.id)));
            }
        }

        for (group, table) in &self.links {
            for pair in table.iter() {
                if !ids.contains(&pair.entity_id) {
                    return Err(Error::Integrity(format!(
                        "link table '{}' references unknown entity {}",
                        group, pair.entity_id
                    )));
                }
                if !is_clean_label(&pair.label) {
                    return Err(Error::Integrity(format!(
                        "link table '{}' has blank or untrimmed label {:?} for entity {}",
                        group, pair.label, pair.entity_id
                    )));
                }
            }
        }

        match &self.geography {
            GeographyTable::Direct(entries) => {
                for entry in entries {
                    if !ids.contains(&entry.entity_id) {
                        return Err(Error::Integrity(format!(
                            "geography entry references unknown entity {}",
                            entry.entity_id
                        )));
                    }
                    if !is_clean_label(&entry.scope) || !is_clean_label(&entry.name) {
                        return Err(Error::Integrity(format!(
                            "geography entry for entity {} has a blank scope or name",
                            entry.entity_id
                        )));
                    }
                }
            }
            GeographyTable::Legacy(rows) => {
                for row in rows {
                    if !ids.contains(&row.entity_id) {
                        return Err(Error::Integrity(format!(
                            "geography row references unknown entity {}",
                            row.entity_id
                        )));
                    }
                    if !is_clean_label(&row.name) {
                        return Err(Error::Integrity(format!(
                            "geography row for entity {} has a blank name",
                            row.entity_id
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

fn is_clean_label(label: &str) -> bool {
    !label.is_empty() && label.trim() == label
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geography::LegacyAreaRow;

    fn model() -> RelationalModel {
        let mut sectors = LinkTable::new();
        sectors.insert(EntityId(1), "Water");
        sectors.insert(EntityId(2), "Health");

        RelationalModel {
            entities: vec![Entity::new(EntityId(1)), Entity::new(EntityId(2))],
            links: BTreeMap::from([("Sector Focus".to_string(), sectors)]),
            geography: GeographyTable::Legacy(vec![LegacyAreaRow::new(EntityId(2), "Italy")]),
        }
    }

    #[test]
    fn test_link_table_deduplicates() {
        let mut table = LinkTable::new();
        assert!(table.insert(EntityId(1), "Water"));
        assert!(!table.insert(EntityId(1), "Water"));
        assert!(table.insert(EntityId(1), "water"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_integrity_ok() {
        model().check_integrity().unwrap();
    }

    #[test]
    fn test_integrity_rejects_dangling_link() {
        let mut model = model();
        model.links.get_mut("Sector Focus").unwrap().insert(EntityId(9), "Energy");
        assert!(matches!(model.check_integrity(), Err(Error::Integrity(_))));
    }

    #[test]
    fn test_integrity_rejects_blank_label() {
        let mut model = model();
        model.links.get_mut("Sector Focus").unwrap().insert(EntityId(1), " ");
        assert!(matches!(model.check_integrity(), Err(Error::Integrity(_))));
    }

    #[test]
    fn test_integrity_rejects_duplicate_entity() {
        let mut model = model();
        model.entities.push(Entity::new(EntityId(1)));
        assert!(matches!(model.check_integrity(), Err(Error::Integrity(_))));
    }
}
