//! # toolcat
//!
//! A faceted tool catalog. A wide, denormalized source extract (one row per
//! tool, multi-valued attributes as comma-separated text) is normalized into
//! an entity table plus one link table per attribute group, and filter
//! requests are resolved against a cached index of those tables.
//!
//! ## Quick Start
//!
//! ### From the command line
//!
//! ```bash
//! toolcat build --source inventory.csv
//! toolcat query --select "Sector Focus=Water" --select "Cost=Free" --text erosion
//! toolcat serve --http-port 6380
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use toolcat::prelude::*;
//! use std::path::Path;
//!
//! let storage = StorageManager::new("./data").unwrap();
//! let extract = SourceExtract::from_paths(Path::new("inventory.csv"), None).unwrap();
//! let report = storage.rebuild(&extract).unwrap();
//! println!("{} tools loaded", report.entities);
//!
//! let request = FilterRequest::new()
//!     .select("Sector Focus", ["Water"])
//!     .with_scopes(["Country"])
//!     .with_text("flood");
//! let ids = storage.engine().resolve_ordered(&request).unwrap();
//! ```
//!
//! ## Crate Structure
//!
//! - `toolcat-schema` - Versioned attribute schema
//! - `toolcat-core` - Relational model, facet catalog, query engine, geography cascade
//! - `toolcat-ingest` - CSV/JSON source readers and the normalizer
//! - `toolcat-storage` - LMDB store and snapshots
//! - `toolcat-api` - REST API

// Re-export core types
pub use toolcat_core::{
    AttributeGroup, AttributeSchema, Entity, EntityField, EntityId, Error, FacetCatalog,
    FilterRequest, FullView, GeographyLayout, GeographyResolver, GeographySelection,
    MemoryStore, QueryEngine, RelationalModel, Result, SchemaStore,
};

// Re-export ingestion
pub use toolcat_ingest::{NormalizeReport, Normalizer, SourceExtract, SourceRecord, SourceTable};

// Re-export storage
pub use toolcat_storage::{LmdbStore, StorageManager};

// Re-export API
pub use toolcat_api::RestApi;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        AttributeSchema, Entity, EntityId, Error, FacetCatalog, FilterRequest, GeographyResolver,
        NormalizeReport, Normalizer, QueryEngine, Result, SourceExtract, StorageManager,
    };
}
