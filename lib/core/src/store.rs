use crate::geography::{GeographyEntry, GeographyTable};
use crate::model::{LinkPair, RelationalModel};
use crate::{Entity, EntityId, Error, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use toolcat_schema::EntityField;
use tracing::info;

/// Persistence boundary between ingestion and the query side.
///
/// `replace_all` is the only write and must be atomic: readers see either the
/// previous complete model or the new one.
pub trait SchemaStore: Send + Sync {
    /// Replace every table with the content of `model`
    fn replace_all(&self, model: RelationalModel) -> Result<()>;

    /// All entity rows ordered by id
    fn entities(&self) -> Result<Vec<Entity>>;

    /// Pairs of one link group. Fails with [`Error::FacetUnavailable`] when
    /// the group's table is missing or unreadable.
    fn link_pairs(&self, group: &str) -> Result<Vec<LinkPair>>;

    /// Stored geography relation in its stored shape
    fn geography_table(&self) -> Result<GeographyTable>;

    /// Entities, the given groups' link pairs and geography, all taken from
    /// the same committed model. Only a failed entity read fails the call; a
    /// broken link table or geography table is reported in place.
    fn read_contents(&self, groups: &[&str]) -> Result<StoreContents>;

    fn all_entity_ids(&self) -> Result<BTreeSet<EntityId>> {
        Ok(self.entities()?.into_iter().map(|e| e.id).collect())
    }

    /// Geography resolved to (id, scope, name) entries
    fn geography_entries(&self) -> Result<Vec<GeographyEntry>> {
        let table = self.geography_table()?;
        let entities = self.entities()?;
        Ok(table.entries(&entities))
    }

    /// (id, value) for one single-valued entity column
    fn entity_column(&self, field: EntityField) -> Result<Vec<(EntityId, Option<String>)>> {
        Ok(self
            .entities()?
            .into_iter()
            .map(|e| (e.id, e.field(field).map(str::to_string)))
            .collect())
    }
}

/// One consistent read of a store
#[derive(Debug)]
pub struct StoreContents {
    /// Entity rows ordered by id
    pub entities: Vec<Entity>,
    /// Pairs per requested group, or why the group's table could not be read
    pub links: BTreeMap<String, Result<Vec<LinkPair>>>,
    pub geography: Result<GeographyTable>,
}

/// In-process store. The model is swapped in one reference update.
pub struct MemoryStore {
    model: RwLock<Arc<RelationalModel>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            model: RwLock::new(Arc::new(RelationalModel::default())),
        }
    }

    /// Store pre-loaded with `model` (integrity is checked)
    pub fn with_model(model: RelationalModel) -> Result<Self> {
        let store = Self::new();
        store.replace_all(model)?;
        Ok(store)
    }

    /// Current model
    pub fn model(&self) -> Arc<RelationalModel> {
        self.model.read().clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaStore for MemoryStore {
    fn replace_all(&self, model: RelationalModel) -> Result<()> {
        model.check_integrity()?;
        let entities = model.entities.len();
        let pairs = model.link_count();
        *self.model.write() = Arc::new(model);
        info!("Memory store replaced: {} entities, {} link pairs", entities, pairs);
        Ok(())
    }

    fn entities(&self) -> Result<Vec<Entity>> {
        Ok(self.model().entities.clone())
    }

    fn link_pairs(&self, group: &str) -> Result<Vec<LinkPair>> {
        self.model()
            .links
            .get(group)
            .map(|table| table.to_vec())
            .ok_or_else(|| Error::FacetUnavailable(format!("no link table for group '{}'", group)))
    }

    fn geography_table(&self) -> Result<GeographyTable> {
        Ok(self.model().geography.clone())
    }

    fn read_contents(&self, groups: &[&str]) -> Result<StoreContents> {
        let model = self.model();
        let links = groups
            .iter()
            .map(|&group| {
                let pairs = model
                    .links
                    .get(group)
                    .map(|table| table.to_vec())
                    .ok_or_else(|| Error::FacetUnavailable(format!("no link table for group '{}'", group)));
                (group.to_string(), pairs)
            })
            .collect();

        Ok(StoreContents {
            entities: model.entities.clone(),
            links,
            geography: Ok(model.geography.clone()),
        })
    }
}
