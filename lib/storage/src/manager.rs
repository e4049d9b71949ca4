use crate::lmdb_storage::{BuildInfo, LmdbStore};
use crate::snapshot::{SnapshotDescription, SnapshotManager};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use toolcat_core::{
    AttributeSchema, Error, FacetCatalog, GeographyResolver, QueryEngine, Result, SchemaStore,
    DEFAULT_TTL,
};
use toolcat_ingest::{NormalizeReport, Normalizer, SourceExtract};
use tracing::{error, info, warn};

/// Owns the on-disk store and the read side built over it
pub struct StorageManager {
    data_dir: PathBuf,
    schema: Arc<AttributeSchema>,
    store: Arc<LmdbStore>,
    snapshots: Arc<SnapshotManager>,
    catalog: Arc<FacetCatalog>,
    rebuild_lock: Mutex<()>,
}

impl StorageManager {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        Self::open(data_dir, Arc::new(AttributeSchema::tool_catalog()), DEFAULT_TTL)
    }

    pub fn open<P: AsRef<Path>>(data_dir: P, schema: Arc<AttributeSchema>, cache_ttl: Duration) -> Result<Self> {
        schema.validate()?;
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let lmdb_path = data_dir.join("lmdb");
        let store = Arc::new(LmdbStore::new(&lmdb_path).map_err(|e| Error::Storage(format!("{:#}", e)))?);

        let snapshot_dir = data_dir.join("snapshots");
        let snapshots =
            Arc::new(SnapshotManager::new(&snapshot_dir).map_err(|e| Error::Storage(format!("{:#}", e)))?);

        let catalog = Arc::new(FacetCatalog::with_ttl(
            Arc::clone(&schema),
            Arc::clone(&store) as Arc<dyn SchemaStore>,
            cache_ttl,
        ));

        match store.build_info() {
            Ok(Some(build)) => info!(
                "Opened store at {} (build {}, {} entities)",
                data_dir.display(),
                build.build_id,
                build.entities
            ),
            Ok(None) => info!("Opened empty store at {}", data_dir.display()),
            Err(e) => warn!("Build info unreadable: {:#}", e),
        }

        Ok(Self {
            data_dir,
            schema,
            store,
            snapshots,
            catalog,
            rebuild_lock: Mutex::new(()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn schema(&self) -> &Arc<AttributeSchema> {
        &self.schema
    }

    pub fn store(&self) -> &Arc<LmdbStore> {
        &self.store
    }

    pub fn catalog(&self) -> &Arc<FacetCatalog> {
        &self.catalog
    }

    pub fn engine(&self) -> QueryEngine {
        QueryEngine::new(Arc::clone(&self.catalog))
    }

    pub fn geography(&self) -> GeographyResolver {
        GeographyResolver::new(Arc::clone(&self.catalog))
    }

    pub fn build_info(&self) -> Result<Option<BuildInfo>> {
        self.store
            .build_info()
            .map_err(|e| Error::Storage(format!("{:#}", e)))
    }

    /// Normalize `extract` and swap it in.
    ///
    /// The previous build is snapshotted first. Nothing is replaced unless the
    /// whole extract normalizes cleanly.
    pub fn rebuild(&self, extract: &SourceExtract) -> Result<NormalizeReport> {
        let _guard = self.rebuild_lock.lock();

        let normalized = Normalizer::new(Arc::clone(&self.schema))
            .normalize(extract)
            .map_err(|e| {
                if e.is_fatal_for_rebuild() {
                    error!("Rebuild aborted, store left untouched: {}", e);
                }
                e
            })?;

        if self.build_info()?.is_some() {
            let backup = self.create_snapshot()?;
            info!("Previous build saved as {}", backup.name);
        }

        self.store.replace_all(normalized.model)?;
        self.catalog.invalidate();
        Ok(normalized.report)
    }

    /// Snapshot the current store content
    pub fn create_snapshot(&self) -> Result<SnapshotDescription> {
        let model = self
            .store
            .read_model()
            .map_err(|e| Error::Storage(format!("{:#}", e)))?;
        let build = self.build_info()?;
        self.snapshots
            .create(&model, build)
            .map_err(|e| Error::Storage(format!("{:#}", e)))
    }

    pub fn list_snapshots(&self) -> Result<Vec<SnapshotDescription>> {
        self.snapshots
            .list()
            .map_err(|e| Error::Storage(format!("{:#}", e)))
    }

    /// Replace the store content with a snapshot's model
    pub fn restore_snapshot(&self, name: &str) -> Result<BuildInfo> {
        let _guard = self.rebuild_lock.lock();

        let data = self
            .snapshots
            .load(name)
            .map_err(|e| Error::Storage(format!("{:#}", e)))?;
        self.store.replace_all(data.model)?;
        self.catalog.invalidate();

        let build = self
            .build_info()?
            .ok_or_else(|| Error::Storage("restored store has no build record".to_string()))?;
        info!("Restored snapshot {} as build {}", name, build.build_id);
        Ok(build)
    }

    pub fn delete_snapshot(&self, name: &str) -> Result<bool> {
        self.snapshots
            .delete(name)
            .map_err(|e| Error::Storage(format!("{:#}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolcat_core::{EntityId, FilterRequest};
    use toolcat_ingest::{SourceRecord, SourceTable};

    fn extract(rows: &[(&str, &str, &str)]) -> SourceExtract {
        let schema = AttributeSchema::tool_catalog();
        let header = schema.required_columns().into_iter().map(str::to_string).collect();
        let records = rows
            .iter()
            .map(|(id, name, sectors)| {
                SourceRecord::new()
                    .with("tool_id", id)
                    .with("tool_name", name)
                    .with("sector", sectors)
            })
            .collect();
        SourceExtract::new(SourceTable::new(header, records))
    }

    #[test]
    fn test_rebuild_and_query() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StorageManager::new(dir.path()).unwrap();

        let report = manager
            .rebuild(&extract(&[("1", "Alpha", "Health,Water"), ("2", "Beta", "Water")]))
            .unwrap();
        assert_eq!(report.entities, 2);

        let water = FilterRequest::new().select("Sector Focus", ["Water"]);
        assert_eq!(manager.engine().resolve(&water).unwrap().len(), 2);
        // first build has nothing to back up
        assert!(manager.list_snapshots().unwrap().is_empty());
    }

    #[test]
    fn test_rebuild_backs_up_and_restores() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StorageManager::new(dir.path()).unwrap();
        manager.rebuild(&extract(&[("1", "Alpha", "Health")])).unwrap();
        manager
            .rebuild(&extract(&[("1", "Alpha", "Water"), ("2", "Beta", "Water")]))
            .unwrap();

        let snapshots = manager.list_snapshots().unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(manager.catalog().snapshot().unwrap().entity_count(), 2);

        manager.restore_snapshot(&snapshots[0].name).unwrap();
        let snapshot = manager.catalog().snapshot().unwrap();
        assert_eq!(snapshot.entity_count(), 1);
        assert_eq!(snapshot.ids_for("Sector Focus", "Health").into_iter().collect::<Vec<_>>(), vec![EntityId(1)]);
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_build() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StorageManager::new(dir.path()).unwrap();
        manager.rebuild(&extract(&[("1", "Alpha", "Health")])).unwrap();
        let before = manager.build_info().unwrap().unwrap();

        let err = manager.rebuild(&extract(&[("one", "Alpha", "Health")])).unwrap_err();
        assert!(matches!(err, Error::RecordIngestion { .. }));
        assert_eq!(manager.build_info().unwrap().unwrap(), before);
        assert!(manager.list_snapshots().unwrap().is_empty());
    }

    #[test]
    fn test_reopen_serves_previous_build() {
        let dir = tempfile::tempdir().unwrap();
        {
            let manager = StorageManager::new(dir.path()).unwrap();
            manager.rebuild(&extract(&[("7", "Gamma", "Energy")])).unwrap();
        }
        let manager = StorageManager::new(dir.path()).unwrap();
        assert_eq!(manager.catalog().values_for("Sector Focus"), vec!["Energy"]);
    }
}
