// Catalog snapshots: gzip-compressed JSON with a SHA-256 sidecar
use anyhow::{anyhow, bail, Context, Result};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use toolcat_core::RelationalModel;
use tracing::{debug, info};

use crate::lmdb_storage::BuildInfo;

const SNAPSHOT_EXTENSION: &str = "snapshot";
const CHECKSUM_EXTENSION: &str = "sha256";
const SNAPSHOT_PREFIX: &str = "catalog";

/// Snapshot description for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDescription {
    pub name: String,
    pub creation_time: Option<String>,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Stored content of one snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshotData {
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildInfo>,
    pub model: RelationalModel,
}

pub struct SnapshotManager {
    snapshot_dir: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_dir: P) -> Result<Self> {
        let snapshot_dir = snapshot_dir.as_ref().to_path_buf();
        fs::create_dir_all(&snapshot_dir)?;
        Ok(Self { snapshot_dir })
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    /// Generate snapshot filename with timestamp
    fn generate_snapshot_name(now: DateTime<Utc>) -> String {
        format!(
            "{}-{}.{}",
            SNAPSHOT_PREFIX,
            now.format("%Y-%m-%d-%H-%M-%S-%3f"),
            SNAPSHOT_EXTENSION
        )
    }

    fn checksum_path(snapshot_path: &Path) -> PathBuf {
        snapshot_path.with_extension(format!("{}.{}", SNAPSHOT_EXTENSION, CHECKSUM_EXTENSION))
    }

    /// Resolve a snapshot name, refusing anything that is not a plain file name
    fn snapshot_path(&self, name: &str) -> Result<PathBuf> {
        let is_plain = Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name);
        if !is_plain || !name.ends_with(SNAPSHOT_EXTENSION) {
            bail!("invalid snapshot name '{}'", name);
        }
        Ok(self.snapshot_dir.join(name))
    }

    /// Write a snapshot of `model`
    pub fn create(&self, model: &RelationalModel, build: Option<BuildInfo>) -> Result<SnapshotDescription> {
        let now = Utc::now();
        let data = ModelSnapshotData {
            created_at: now.to_rfc3339(),
            build,
            model: model.clone(),
        };

        let snapshot_name = Self::generate_snapshot_name(now);
        let snapshot_path = self.snapshot_dir.join(&snapshot_name);

        // Serialize to JSON and compress with gzip
        let json_data = serde_json::to_vec(&data)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json_data)?;
        let compressed = encoder.finish()?;
        let checksum = format!("{:x}", Sha256::digest(&compressed));

        AtomicFile::new(&snapshot_path, OverwriteBehavior::DisallowOverwrite)
            .write(|f| f.write_all(&compressed))
            .with_context(|| format!("writing snapshot {}", snapshot_path.display()))?;
        AtomicFile::new(Self::checksum_path(&snapshot_path), OverwriteBehavior::AllowOverwrite)
            .write(|f| f.write_all(checksum.as_bytes()))
            .context("writing snapshot checksum")?;

        info!(
            "Snapshot {} written: {} entities, {} bytes",
            snapshot_name,
            model.entities.len(),
            compressed.len()
        );

        Ok(SnapshotDescription {
            name: snapshot_name,
            creation_time: Some(data.created_at),
            size: compressed.len() as u64,
            checksum: Some(checksum),
        })
    }

    /// List snapshots, newest first
    pub fn list(&self) -> Result<Vec<SnapshotDescription>> {
        if !self.snapshot_dir.exists() {
            return Ok(Vec::new());
        }

        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&self.snapshot_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some(SNAPSHOT_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            let metadata = fs::metadata(&path)?;
            let creation_time = metadata
                .modified()
                .ok()
                .map(|t| DateTime::<Utc>::from(t).format("%Y-%m-%dT%H:%M:%SZ").to_string());
            let checksum = fs::read_to_string(Self::checksum_path(&path))
                .ok()
                .map(|s| s.trim().to_string());

            snapshots.push(SnapshotDescription {
                name: name.to_string(),
                creation_time,
                size: metadata.len(),
                checksum,
            });
        }

        // Sort by name (which includes timestamp)
        snapshots.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(snapshots)
    }

    /// Load and verify a snapshot
    pub fn load(&self, name: &str) -> Result<ModelSnapshotData> {
        let snapshot_path = self.snapshot_path(name)?;
        if !snapshot_path.exists() {
            return Err(anyhow!("Snapshot '{}' not found", name));
        }

        let compressed = fs::read(&snapshot_path)?;
        match fs::read_to_string(Self::checksum_path(&snapshot_path)) {
            Ok(expected) => {
                let actual = format!("{:x}", Sha256::digest(&compressed));
                if actual != expected.trim() {
                    bail!(
                        "Checksum mismatch for '{}': expected {}, got {}",
                        name,
                        expected.trim(),
                        actual
                    );
                }
            }
            Err(_) => debug!("Snapshot {} has no checksum file", name),
        }

        let mut decoder = GzDecoder::new(compressed.as_slice());
        let mut json_data = Vec::new();
        decoder.read_to_end(&mut json_data)?;

        let data: ModelSnapshotData = serde_json::from_slice(&json_data)
            .with_context(|| format!("decoding snapshot '{}'", name))?;
        Ok(data)
    }

    /// Load snapshot from a file path, without checksum verification
    pub fn load_from_path(path: &Path) -> Result<ModelSnapshotData> {
        let file = File::open(path)?;
        let mut decoder = GzDecoder::new(BufReader::new(file));
        let mut json_data = Vec::new();
        decoder.read_to_end(&mut json_data)?;
        Ok(serde_json::from_slice(&json_data)?)
    }

    /// Delete a snapshot and its checksum
    pub fn delete(&self, name: &str) -> Result<bool> {
        let snapshot_path = self.snapshot_path(name)?;
        if !snapshot_path.exists() {
            return Ok(false);
        }
        fs::remove_file(&snapshot_path)?;
        let checksum_path = Self::checksum_path(&snapshot_path);
        if checksum_path.exists() {
            fs::remove_file(checksum_path)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use toolcat_core::{Entity, EntityField, EntityId, GeographyTable, LegacyAreaRow, LinkPair};

    fn model() -> RelationalModel {
        RelationalModel {
            entities: vec![Entity::new(EntityId(3))
                .with(EntityField::Name, "FloodMapper")
                .with(EntityField::AreaScope, "Country")],
            links: BTreeMap::from([(
                "Sector Focus".to_string(),
                [LinkPair::new(EntityId(3), "Water")].into_iter().collect(),
            )]),
            geography: GeographyTable::Legacy(vec![LegacyAreaRow::new(EntityId(3), "Chile")]),
        }
    }

    #[test]
    fn test_create_list_load() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = SnapshotManager::new(dir.path()).unwrap();

        let description = snapshots.create(&model(), None).unwrap();
        assert!(description.name.starts_with("catalog-"));
        assert!(description.name.ends_with(".snapshot"));

        let listed = snapshots.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, description.name);
        assert_eq!(listed[0].checksum, description.checksum);

        let data = snapshots.load(&description.name).unwrap();
        assert_eq!(data.model, model());
        assert_eq!(SnapshotManager::load_from_path(&dir.path().join(&description.name)).unwrap(), data);
    }

    #[test]
    fn test_corrupted_snapshot_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = SnapshotManager::new(dir.path()).unwrap();
        let description = snapshots.create(&model(), None).unwrap();

        let path = dir.path().join(&description.name);
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        let err = snapshots.load(&description.name).unwrap_err();
        assert!(err.to_string().contains("Checksum mismatch"));
    }

    #[test]
    fn test_delete_and_bad_names() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = SnapshotManager::new(dir.path()).unwrap();
        let description = snapshots.create(&model(), None).unwrap();

        assert!(snapshots.load("../etc/passwd.snapshot").is_err());
        assert!(snapshots.load("missing.snapshot").is_err());

        assert!(snapshots.delete(&description.name).unwrap());
        assert!(!snapshots.delete(&description.name).unwrap());
        assert!(snapshots.list().unwrap().is_empty());
    }
}
