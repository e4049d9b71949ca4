//! # toolcat Schema
//!
//! Declarative description of the tool catalog.
//!
//! ## Overview
//!
//! Every tool is one row of a wide source extract. Most classification
//! attributes are multi-valued and arrive as comma-delimited text; a few are
//! single values stored on the tool itself. The schema names each attribute
//! group, the source column(s) it is read from, and whether it becomes a link
//! table or stays an entity column.
//!
//! ```rust
//! use toolcat_schema::{AttributeSchema, AttributeGroup, EntityField, GeographyLayout};
//!
//! let mut schema = AttributeSchema::tool_catalog();
//! schema.groups.push(AttributeGroup::linked("Funding Body", &["funding", "co_funding"]));
//! schema.groups.push(AttributeGroup::entity_column("Licence", EntityField::Cost));
//! schema.geography = GeographyLayout::direct();
//! schema.validate().unwrap();
//! ```
//!
//! ## Geography
//!
//! ```text
//! Legacy:  tools.primary_area_of_focus ──split──> names ──join──> tools.primary_area_scope
//! Direct:  areas(tool_id, scope, name)  ─────────────────────────> entries
//! ```

pub mod schema;

pub use schema::{
    AttributeSchema,
    AttributeGroup,
    GroupKind,
    EntityField,
    EntityColumns,
    GeographyLayout,
    SchemaError,
    SCHEMA_VERSION,
    MULTI_VALUE_DELIMITER,
    KNOWN_AREA_SCOPES,
};
