pub mod lmdb_storage;
pub mod manager;
pub mod snapshot;

pub use lmdb_storage::{BuildInfo, LmdbStore};
pub use manager::StorageManager;
pub use snapshot::{ModelSnapshotData, SnapshotDescription, SnapshotManager};
