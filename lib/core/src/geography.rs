//! Two-level geography: scope (Global, Continent, Region, Country,
//! Subnational) and a free-text place name.
//!
//! The source arrives in one of two shapes, kept apart as [`GeographyTable`]
//! variants. Legacy rows carry only a name and borrow the owning entity's
//! primary scope when resolved; resolved entries remember which way they
//! were derived.

use crate::catalog::{sort_labels, FacetCatalog};
use crate::filter::GeographySelection;
use crate::{Entity, EntityId, Result};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

/// How a geography entry got its scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Scope and name were both present in the source
    Direct,
    /// Name from the source, scope copied from the entity's primary scope
    InferredFromPrimaryScope,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GeographyEntry {
    pub entity_id: EntityId,
    pub scope: String,
    pub name: String,
    pub provenance: Provenance,
}

impl GeographyEntry {
    pub fn direct(entity_id: EntityId, scope: &str, name: &str) -> Self {
        Self {
            entity_id,
            scope: scope.to_string(),
            name: name.to_string(),
            provenance: Provenance::Direct,
        }
    }
}

/// Name-only geography row of the legacy shape
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LegacyAreaRow {
    pub entity_id: EntityId,
    pub name: String,
}

impl LegacyAreaRow {
    pub fn new(entity_id: EntityId, name: &str) -> Self {
        Self {
            entity_id,
            name: name.to_string(),
        }
    }
}

/// Stored geography relation, in exactly one of the two known shapes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeographyTable {
    Direct(Vec<GeographyEntry>),
    Legacy(Vec<LegacyAreaRow>),
}

impl GeographyTable {
    pub fn len(&self) -> usize {
        match self {
            GeographyTable::Direct(entries) => entries.len(),
            GeographyTable::Legacy(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve to (id, scope, name) entries. Legacy rows are joined against
    /// each entity's primary scope; rows whose entity has no scope are dropped.
    pub fn entries<'a>(&self, entities: impl IntoIterator<Item = &'a Entity>) -> Vec<GeographyEntry> {
        match self {
            GeographyTable::Direct(entries) => entries.clone(),
            GeographyTable::Legacy(rows) => {
                let scopes: AHashMap<EntityId, &str> = entities
                    .into_iter()
                    .filter_map(|e| e.area_scope.as_deref().map(|scope| (e.id, scope)))
                    .collect();

                let resolved: BTreeSet<GeographyEntry> = rows
                    .iter()
                    .filter_map(|row| {
                        scopes.get(&row.entity_id).map(|scope| GeographyEntry {
                            entity_id: row.entity_id,
                            scope: scope.to_string(),
                            name: row.name.clone(),
                            provenance: Provenance::InferredFromPrimaryScope,
                        })
                    })
                    .collect();
                resolved.into_iter().collect()
            }
        }
    }
}

/// Read-side geography index held by a catalog snapshot
#[derive(Debug, Clone, Default)]
pub struct GeographyIndex {
    entries: Vec<GeographyEntry>,
    scopes: Vec<String>,
}

impl GeographyIndex {
    pub fn new(entries: Vec<GeographyEntry>) -> Self {
        let mut scopes: Vec<String> = entries
            .iter()
            .map(|e| e.scope.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        sort_labels(&mut scopes);
        Self { entries, scopes }
    }

    pub fn entries(&self) -> &[GeographyEntry] {
        &self.entries
    }

    /// Distinct scopes, case-insensitive order
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Names offered for the given scope selection; every name when the
    /// selection is empty.
    pub fn names_for(&self, scopes: &BTreeSet<String>) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|e| scopes.is_empty() || scopes.contains(&e.scope))
            .map(|e| e.name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        sort_labels(&mut names);
        names
    }

    /// Names of one entity, case-insensitive order
    pub fn names_of(&self, id: EntityId) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.entity_id == id)
            .map(|e| e.name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        sort_labels(&mut names);
        names
    }

    /// Ids with an entry matching the selection. Each non-empty axis must
    /// match; an empty axis matches anything.
    pub fn matching_ids(&self, selection: &GeographySelection) -> BTreeSet<EntityId> {
        self.entries
            .iter()
            .filter(|e| selection.scopes.is_empty() || selection.scopes.contains(&e.scope))
            .filter(|e| selection.names.is_empty() || selection.names.contains(&e.name))
            .map(|e| e.entity_id)
            .collect()
    }

    pub fn inferred_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.provenance == Provenance::InferredFromPrimaryScope)
            .count()
    }
}

/// Cascading scope → name resolver over the catalog's current snapshot
pub struct GeographyResolver {
    catalog: Arc<FacetCatalog>,
}

impl GeographyResolver {
    pub fn new(catalog: Arc<FacetCatalog>) -> Self {
        Self { catalog }
    }

    /// Selectable scopes. Empty when geography data is unavailable.
    pub fn scopes(&self) -> Vec<String> {
        match self.catalog.snapshot() {
            Ok(snapshot) => snapshot
                .geography()
                .map(|g| g.scopes().to_vec())
                .unwrap_or_default(),
            Err(e) => {
                warn!("Geography scopes unavailable: {}", e);
                Vec::new()
            }
        }
    }

    /// Selectable names, narrowed to the selected scopes if any are selected
    pub fn names_for(&self, scopes: &BTreeSet<String>) -> Vec<String> {
        match self.catalog.snapshot() {
            Ok(snapshot) => snapshot
                .geography()
                .map(|g| g.names_for(scopes))
                .unwrap_or_default(),
            Err(e) => {
                warn!("Geography names unavailable: {}", e);
                Vec::new()
            }
        }
    }

    /// Entity ids admitted by a geography selection, or `None` when the
    /// selection imposes no constraint. Unavailable geography data admits
    /// nothing.
    pub fn matching_ids(&self, selection: &GeographySelection) -> Result<Option<BTreeSet<EntityId>>> {
        if selection.is_empty() {
            return Ok(None);
        }
        let snapshot = self.catalog.snapshot()?;
        Ok(Some(
            snapshot
                .geography()
                .map(|g| g.matching_ids(selection))
                .unwrap_or_default(),
        ))
    }
}
