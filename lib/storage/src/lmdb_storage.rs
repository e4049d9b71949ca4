// LMDB-backed schema store
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use heed::byteorder::BE;
use heed::types::{Bytes, Str, I64};
use heed::{Database, Env, EnvOpenOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use toolcat_core::{
    Entity, EntityId, Error, GeographyTable, LinkPair, LinkTable, RelationalModel, SchemaStore,
    StoreContents,
};
use tracing::info;
use uuid::Uuid;

const DB_ENTITIES: &str = "entities";
const DB_LINKS: &str = "links";
const DB_GEOGRAPHY: &str = "geography";
const DB_META: &str = "meta";

const GEOGRAPHY_KEY: &str = "table";
const META_BUILD: &str = "build";

/// Description of the build currently held by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub build_id: String,
    pub built_at: String,
    pub entities: usize,
    pub link_groups: usize,
    pub link_pairs: usize,
    pub geography_rows: usize,
}

/// One database per relation. Entities are keyed by id, link tables by group
/// name, and the geography table is stored whole under a single key. Every
/// value is bincode.
pub struct LmdbStore {
    env: Arc<Env>,
    entities_db: Database<I64<BE>, Bytes>,
    links_db: Database<Str, Bytes>,
    geography_db: Database<Str, Bytes>,
    meta_db: Database<Str, Str>,
}

impl LmdbStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_map_size(path, 1024 * 1024 * 1024) // 1GB default
    }

    pub fn with_map_size<P: AsRef<Path>>(path: P, map_size: usize) -> Result<Self> {
        std::fs::create_dir_all(&path)?;

        let env = Arc::new(unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(8)
                .open(path.as_ref())
                .with_context(|| format!("opening LMDB environment at {}", path.as_ref().display()))?
        });

        let mut wtxn = env.write_txn()?;
        let entities_db = env.create_database(&mut wtxn, Some(DB_ENTITIES))?;
        let links_db = env.create_database(&mut wtxn, Some(DB_LINKS))?;
        let geography_db = env.create_database(&mut wtxn, Some(DB_GEOGRAPHY))?;
        let meta_db = env.create_database(&mut wtxn, Some(DB_META))?;
        wtxn.commit()?;

        Ok(Self {
            env,
            entities_db,
            links_db,
            geography_db,
            meta_db,
        })
    }

    /// Replace every relation in one write transaction
    pub fn write_model(&self, model: &RelationalModel) -> Result<BuildInfo> {
        let info = BuildInfo {
            build_id: Uuid::new_v4().to_string(),
            built_at: Utc::now().to_rfc3339(),
            entities: model.entities.len(),
            link_groups: model.links.len(),
            link_pairs: model.link_count(),
            geography_rows: model.geography.len(),
        };

        let mut wtxn = self.env.write_txn()?;
        self.entities_db.clear(&mut wtxn)?;
        self.links_db.clear(&mut wtxn)?;
        self.geography_db.clear(&mut wtxn)?;

        for entity in &model.entities {
            let data = bincode::serialize(entity)?;
            self.entities_db.put(&mut wtxn, &entity.id.0, &data)?;
        }
        for (group, table) in &model.links {
            let data = bincode::serialize(&table.to_vec())?;
            self.links_db.put(&mut wtxn, group, &data)?;
        }
        let geography = bincode::serialize(&model.geography)?;
        self.geography_db.put(&mut wtxn, GEOGRAPHY_KEY, &geography)?;
        self.meta_db
            .put(&mut wtxn, META_BUILD, &serde_json::to_string(&info)?)?;

        // nothing is visible to readers before this point
        wtxn.commit()?;
        Ok(info)
    }

    pub fn read_entities(&self) -> Result<Vec<Entity>> {
        let rtxn = self.env.read_txn()?;
        let mut entities = Vec::new();
        for result in self.entities_db.iter(&rtxn)? {
            let (id, data) = result?;
            let entity: Entity =
                bincode::deserialize(data).with_context(|| format!("decoding entity {}", id))?;
            entities.push(entity);
        }
        // big-endian keys put negative ids last
        entities.sort_by_key(|e| e.id);
        Ok(entities)
    }

    pub fn read_entity(&self, id: EntityId) -> Result<Option<Entity>> {
        let rtxn = self.env.read_txn()?;
        match self.entities_db.get(&rtxn, &id.0)? {
            Some(data) => Ok(Some(bincode::deserialize(data)?)),
            None => Ok(None),
        }
    }

    pub fn read_link_pairs(&self, group: &str) -> Result<Option<Vec<LinkPair>>> {
        let rtxn = self.env.read_txn()?;
        match self.links_db.get(&rtxn, group)? {
            Some(data) => {
                let pairs = bincode::deserialize(data)
                    .with_context(|| format!("decoding link table '{}'", group))?;
                Ok(Some(pairs))
            }
            None => Ok(None),
        }
    }

    pub fn list_link_groups(&self) -> Result<Vec<String>> {
        let rtxn = self.env.read_txn()?;
        let mut groups = Vec::new();
        for result in self.links_db.iter(&rtxn)? {
            let (key, _) = result?;
            groups.push(key.to_string());
        }
        Ok(groups)
    }

    pub fn read_geography(&self) -> Result<GeographyTable> {
        let rtxn = self.env.read_txn()?;
        decode_geography(self.geography_db.get(&rtxn, GEOGRAPHY_KEY)?)
    }

    pub fn build_info(&self) -> Result<Option<BuildInfo>> {
        let rtxn = self.env.read_txn()?;
        match self.meta_db.get(&rtxn, META_BUILD)? {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    /// The whole stored model, read in one transaction
    pub fn read_model(&self) -> Result<RelationalModel> {
        let rtxn = self.env.read_txn()?;

        let mut entities = Vec::new();
        for result in self.entities_db.iter(&rtxn)? {
            let (_, data) = result?;
            entities.push(bincode::deserialize::<Entity>(data)?);
        }
        entities.sort_by_key(|e| e.id);

        let mut links = std::collections::BTreeMap::new();
        for result in self.links_db.iter(&rtxn)? {
            let (group, data) = result?;
            let pairs: Vec<LinkPair> = bincode::deserialize(data)
                .map_err(|e| anyhow!("decoding link table '{}': {}", group, e))?;
            links.insert(group.to_string(), pairs.into_iter().collect::<LinkTable>());
        }

        let geography = decode_geography(self.geography_db.get(&rtxn, GEOGRAPHY_KEY)?)?;
        Ok(RelationalModel {
            entities,
            links,
            geography,
        })
    }
}

fn decode_geography(data: Option<&[u8]>) -> Result<GeographyTable> {
    match data {
        Some(data) => Ok(bincode::deserialize(data).context("decoding geography table")?),
        // never built
        None => Ok(GeographyTable::Direct(Vec::new())),
    }
}

fn storage_error(e: anyhow::Error) -> Error {
    Error::Storage(format!("{:#}", e))
}

impl SchemaStore for LmdbStore {
    fn replace_all(&self, model: RelationalModel) -> toolcat_core::Result<()> {
        model.check_integrity()?;
        let info = self.write_model(&model).map_err(storage_error)?;
        info!(
            "LMDB store replaced (build {}): {} entities, {} link pairs in {} groups, {} geography rows",
            info.build_id, info.entities, info.link_pairs, info.link_groups, info.geography_rows
        );
        Ok(())
    }

    fn entities(&self) -> toolcat_core::Result<Vec<Entity>> {
        self.read_entities().map_err(storage_error)
    }

    fn link_pairs(&self, group: &str) -> toolcat_core::Result<Vec<LinkPair>> {
        match self.read_link_pairs(group) {
            Ok(Some(pairs)) => Ok(pairs),
            Ok(None) => Err(Error::FacetUnavailable(format!("no link table for group '{}'", group))),
            Err(e) => Err(Error::FacetUnavailable(format!("{:#}", e))),
        }
    }

    fn geography_table(&self) -> toolcat_core::Result<GeographyTable> {
        self.read_geography().map_err(storage_error)
    }

    fn read_contents(&self, groups: &[&str]) -> toolcat_core::Result<StoreContents> {
        let rtxn = self.env.read_txn().map_err(|e| storage_error(e.into()))?;

        let mut entities = Vec::new();
        let rows = self.entities_db.iter(&rtxn).map_err(|e| storage_error(e.into()))?;
        for result in rows {
            let (id, data) = result.map_err(|e| storage_error(e.into()))?;
            let entity: Entity = bincode::deserialize(data)
                .map_err(|e| Error::Storage(format!("decoding entity {}: {}", id, e)))?;
            entities.push(entity);
        }
        entities.sort_by_key(|e| e.id);

        let mut links = std::collections::BTreeMap::new();
        for &group in groups {
            let pairs = match self.links_db.get(&rtxn, group) {
                Ok(Some(data)) => bincode::deserialize::<Vec<LinkPair>>(data).map_err(|e| {
                    Error::FacetUnavailable(format!("decoding link table '{}': {}", group, e))
                }),
                Ok(None) => Err(Error::FacetUnavailable(format!("no link table for group '{}'", group))),
                Err(e) => Err(Error::FacetUnavailable(format!("reading link table '{}': {}", group, e))),
            };
            links.insert(group.to_string(), pairs);
        }

        let geography = self
            .geography_db
            .get(&rtxn, GEOGRAPHY_KEY)
            .map_err(anyhow::Error::from)
            .and_then(decode_geography)
            .map_err(storage_error);

        Ok(StoreContents {
            entities,
            links,
            geography,
        })
    }
}
