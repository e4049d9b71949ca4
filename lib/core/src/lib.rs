//! # Toolcat Core
//!
//! Core library for the toolcat faceted catalog.
//!
//! This crate provides the relational model and the read side:
//!
//! - [`Entity`] - A catalog item with its single-valued fields
//! - [`RelationalModel`] - Entity table, link tables and geography table
//! - [`SchemaStore`] - Persistence boundary, with the in-memory [`MemoryStore`]
//! - [`FacetCatalog`] - TTL-cached bidirectional label index
//! - [`QueryEngine`] - OR-within / AND-across filter resolution
//! - [`GeographyResolver`] - Scope → name cascade
//!
//! ## Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//! use toolcat_core::{
//!     AttributeSchema, Entity, EntityId, FacetCatalog, FilterRequest, GeographyTable, LinkPair,
//!     MemoryStore, QueryEngine, RelationalModel,
//! };
//!
//! let sectors = [
//!     LinkPair::new(EntityId(1), "Health"),
//!     LinkPair::new(EntityId(1), "Water"),
//!     LinkPair::new(EntityId(2), "Water"),
//! ];
//! let model = RelationalModel {
//!     entities: vec![Entity::new(EntityId(1)), Entity::new(EntityId(2))],
//!     links: BTreeMap::from([("Sector Focus".to_string(), sectors.into_iter().collect())]),
//!     geography: GeographyTable::Direct(Vec::new()),
//! };
//!
//! let store = Arc::new(MemoryStore::with_model(model).unwrap());
//! let catalog = Arc::new(FacetCatalog::new(Arc::new(AttributeSchema::tool_catalog()), store));
//! let engine = QueryEngine::new(catalog);
//!
//! let request = FilterRequest::new().select("Sector Focus", ["Health"]);
//! assert_eq!(engine.resolve(&request).unwrap().len(), 1);
//! ```

pub mod catalog;
pub mod entity;
pub mod error;
pub mod filter;
pub mod geography;
pub mod model;
pub mod query;
pub mod store;
pub mod view;

pub use catalog::{
    label_cmp, sort_labels, Clock, FacetCatalog, FacetIndex, FacetSnapshot, GroupFacet, ManualClock,
    SystemClock, DEFAULT_TTL,
};
pub use entity::{Entity, EntityId};
pub use error::{Error, Result};
pub use filter::{FilterRequest, GeographySelection};
pub use geography::{
    GeographyEntry, GeographyIndex, GeographyResolver, GeographyTable, LegacyAreaRow, Provenance,
};
pub use model::{LinkPair, LinkTable, RelationalModel};
pub use query::{resolve_in, QueryEngine};
pub use store::{MemoryStore, SchemaStore, StoreContents};
pub use view::FullView;

pub use toolcat_schema::{AttributeGroup, AttributeSchema, EntityField, GeographyLayout, GroupKind};
