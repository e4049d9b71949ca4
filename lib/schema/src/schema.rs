//! Attribute schema definitions
//!
//! Declares the columns of the source extract, every attribute group of the
//! catalog, and the shape geography takes in the source. The schema is pure
//! data: ingestion and the query engine read it, nothing mutates it at runtime.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

/// Current schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Delimiter used by every multi-valued source column
pub const MULTI_VALUE_DELIMITER: char = ',';

/// Geography scopes the source vocabulary is expected to use
pub const KNOWN_AREA_SCOPES: [&str; 5] = ["Global", "Continent", "Region", "Country", "Subnational"];

/// Versioned description of the catalog's source columns and attribute groups
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttributeSchema {
    /// Schema version for future compatibility
    #[serde(default = "default_version")]
    pub version: u32,

    /// Source columns backing the entity table
    pub entity: EntityColumns,

    /// Attribute groups in display order
    pub groups: Vec<AttributeGroup>,

    /// How geography is laid out in the source extract
    #[serde(default)]
    pub geography: GeographyLayout,
}

fn default_version() -> u32 {
    SCHEMA_VERSION
}

impl AttributeSchema {
    /// The tool inventory schema (version 1).
    pub fn tool_catalog() -> Self {
        let linked = |name: &str, column: &str| AttributeGroup::linked(name, &[column]);
        let column = |name: &str, field: EntityField| AttributeGroup::entity_column(name, field);

        Self {
            version: SCHEMA_VERSION,
            entity: EntityColumns::default(),
            groups: vec![
                linked("User Group", "user_group"),
                linked("Sector Focus", "sector"),
                linked("Tool Type", "tool_type"),
                linked("Target Scale (Political)", "political_scale"),
                linked("Target Scale (Physical)", "physical_scale"),
                linked("Temporal Scale", "temporal_scale"),
                linked("Temporal Resolution", "temporal_resolution"),
                linked("Methodological Approach", "methodological_approach"),
                linked("Data Utilization", "data_utilization"),
                linked("Output Type", "output_type"),
                linked("Accessibility & Usability", "accessibility_and_usability"),
                column("Multi-language Support", EntityField::MultiLanguage),
                linked("Languages", "language"),
                column("Customizability", EntityField::Customizability),
                column("Integration Capability", EntityField::Integration),
                column("Validation & Reliability", EntityField::Validation),
                column("Cost", EntityField::Cost),
                linked("Maintenance", "maintenance"),
                linked("Support", "support"),
            ],
            geography: GeographyLayout::Legacy,
        }
    }

    /// Parse a schema from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let schema: Self = serde_json::from_str(json).map_err(|e| SchemaError::Parse(e.to_string()))?;
        schema.validate()?;
        Ok(schema)
    }

    /// Validate the schema
    /// - Group names must be unique and non-empty
    /// - Linked groups need at least one non-empty source column
    /// - Every entity column must be named
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.version != SCHEMA_VERSION {
            return Err(SchemaError::UnsupportedVersion(self.version));
        }
        if self.groups.is_empty() {
            return Err(SchemaError::EmptySchema);
        }

        for field in EntityField::ALL {
            if self.entity.column(field).trim().is_empty() {
                return Err(SchemaError::EmptyColumnName(format!("entity field {:?}", field)));
            }
        }
        if self.entity.id.trim().is_empty() {
            return Err(SchemaError::EmptyColumnName("entity id".to_string()));
        }

        let mut seen = AHashSet::new();
        for group in &self.groups {
            if group.name.trim().is_empty() {
                return Err(SchemaError::EmptyGroupName);
            }
            if !seen.insert(group.name.as_str()) {
                return Err(SchemaError::DuplicateGroup(group.name.clone()));
            }
            if let GroupKind::Linked { columns } = &group.kind {
                if columns.is_empty() {
                    return Err(SchemaError::NoSourceColumns(group.name.clone()));
                }
                if columns.iter().any(|c| c.trim().is_empty()) {
                    return Err(SchemaError::EmptyColumnName(group.name.clone()));
                }
            }
        }

        if let GeographyLayout::Direct { id_column, scope_column, name_column } = &self.geography {
            for column in [id_column, scope_column, name_column] {
                if column.trim().is_empty() {
                    return Err(SchemaError::EmptyColumnName("geography".to_string()));
                }
            }
        }

        Ok(())
    }

    /// Get a group by name
    pub fn group(&self, name: &str) -> Option<&AttributeGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Groups backed by a link table
    pub fn linked_groups(&self) -> impl Iterator<Item = &AttributeGroup> {
        self.groups.iter().filter(|g| g.is_linked())
    }

    /// Groups backed by a single-valued entity column
    pub fn column_groups(&self) -> impl Iterator<Item = &AttributeGroup> {
        self.groups.iter().filter(|g| !g.is_linked())
    }

    /// Every column the primary source table must carry, in declaration order
    /// and without duplicates.
    pub fn required_columns(&self) -> Vec<&str> {
        let mut seen = AHashSet::new();
        let mut columns = Vec::new();

        let entity_columns = std::iter::once(self.entity.id.as_str())
            .chain(EntityField::ALL.into_iter().map(|f| self.entity.column(f)));
        let group_columns = self.linked_groups().flat_map(|g| g.source_columns());

        for column in entity_columns.chain(group_columns) {
            if seen.insert(column) {
                columns.push(column);
            }
        }
        columns
    }

    /// Columns the areas table must carry, if the layout uses one
    pub fn area_columns(&self) -> Vec<&str> {
        match &self.geography {
            GeographyLayout::Legacy => Vec::new(),
            GeographyLayout::Direct { id_column, scope_column, name_column } => {
                vec![id_column.as_str(), scope_column.as_str(), name_column.as_str()]
            }
        }
    }
}

impl Default for AttributeSchema {
    fn default() -> Self {
        Self::tool_catalog()
    }
}

/// A named classification axis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttributeGroup {
    /// Group name, used as the selection key in filter requests
    pub name: String,

    #[serde(flatten)]
    pub kind: GroupKind,
}

impl AttributeGroup {
    /// A multi-valued group read from one or more delimited source columns
    pub fn linked(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind: GroupKind::Linked {
                columns: columns.iter().map(|c| c.to_string()).collect(),
            },
        }
    }

    /// A single-valued group read from an entity column
    pub fn entity_column(name: &str, field: EntityField) -> Self {
        Self {
            name: name.to_string(),
            kind: GroupKind::EntityColumn { field },
        }
    }

    pub fn is_linked(&self) -> bool {
        matches!(self.kind, GroupKind::Linked { .. })
    }

    /// Source columns of a linked group (empty for entity-column groups)
    pub fn source_columns(&self) -> impl Iterator<Item = &str> {
        let columns: &[String] = match &self.kind {
            GroupKind::Linked { columns } => columns,
            GroupKind::EntityColumn { .. } => &[],
        };
        columns.iter().map(String::as_str)
    }
}

/// Storage kind of an attribute group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GroupKind {
    /// Many-to-many link table built from delimited source columns
    Linked { columns: Vec<String> },
    /// Single value stored on the entity row
    EntityColumn { field: EntityField },
}

/// Single-valued descriptive fields of an entity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EntityField {
    Name,
    Description,
    Highlight1,
    Highlight2,
    Highlight3,
    Cost,
    Maintenance,
    Support,
    Validation,
    Customizability,
    Integration,
    MultiLanguage,
    AreaScope,
    AreaOfFocus,
    Link,
}

impl EntityField {
    pub const ALL: [EntityField; 15] = [
        EntityField::Name,
        EntityField::Description,
        EntityField::Highlight1,
        EntityField::Highlight2,
        EntityField::Highlight3,
        EntityField::Cost,
        EntityField::Maintenance,
        EntityField::Support,
        EntityField::Validation,
        EntityField::Customizability,
        EntityField::Integration,
        EntityField::MultiLanguage,
        EntityField::AreaScope,
        EntityField::AreaOfFocus,
        EntityField::Link,
    ];

    /// Fields searched by free-text queries
    pub const SEARCHABLE: [EntityField; 5] = [
        EntityField::Name,
        EntityField::Description,
        EntityField::Highlight1,
        EntityField::Highlight2,
        EntityField::Highlight3,
    ];
}

/// Source column names of the entity table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntityColumns {
    pub id: String,
    pub name: String,
    pub description: String,
    pub highlight1: String,
    pub highlight2: String,
    pub highlight3: String,
    pub cost: String,
    pub maintenance: String,
    pub support: String,
    pub validation: String,
    pub customizability: String,
    pub integration: String,
    pub multi_language: String,
    pub area_scope: String,
    pub area_of_focus: String,
    pub link: String,
}

impl EntityColumns {
    /// Source column of a descriptive field
    pub fn column(&self, field: EntityField) -> &str {
        match field {
            EntityField::Name => &self.name,
            EntityField::Description => &self.description,
            EntityField::Highlight1 => &self.highlight1,
            EntityField::Highlight2 => &self.highlight2,
            EntityField::Highlight3 => &self.highlight3,
            EntityField::Cost => &self.cost,
            EntityField::Maintenance => &self.maintenance,
            EntityField::Support => &self.support,
            EntityField::Validation => &self.validation,
            EntityField::Customizability => &self.customizability,
            EntityField::Integration => &self.integration,
            EntityField::MultiLanguage => &self.multi_language,
            EntityField::AreaScope => &self.area_scope,
            EntityField::AreaOfFocus => &self.area_of_focus,
            EntityField::Link => &self.link,
        }
    }
}

impl Default for EntityColumns {
    fn default() -> Self {
        Self {
            id: "tool_id".to_string(),
            name: "tool_name".to_string(),
            description: "tool_description".to_string(),
            highlight1: "bullet1".to_string(),
            highlight2: "bullet2".to_string(),
            highlight3: "bullet3".to_string(),
            cost: "cost".to_string(),
            maintenance: "maintenance".to_string(),
            support: "support".to_string(),
            validation: "validation_and_reliability".to_string(),
            customizability: "customizability".to_string(),
            integration: "integration_capability".to_string(),
            multi_language: "is_multi_language".to_string(),
            area_scope: "primary_area_scope".to_string(),
            area_of_focus: "primary_area_of_focus".to_string(),
            link: "link".to_string(),
        }
    }
}

/// Shape of geography data in the source extract
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum GeographyLayout {
    /// Place names come from the entity's area-of-focus column and inherit
    /// the entity's primary scope.
    #[default]
    Legacy,
    /// A separate areas table carries one (id, scope, name) row per place.
    Direct {
        id_column: String,
        scope_column: String,
        name_column: String,
    },
}

impl GeographyLayout {
    /// Direct layout with the conventional column names
    pub fn direct() -> Self {
        GeographyLayout::Direct {
            id_column: "tool_id".to_string(),
            scope_column: "scope".to_string(),
            name_column: "name".to_string(),
        }
    }
}

/// Errors that can occur during schema validation
#[derive(Debug, Clone, thiserror::Error)]
pub enum SchemaError {
    #[error("Schema declares no attribute groups")]
    EmptySchema,

    #[error("Unsupported schema version {0}")]
    UnsupportedVersion(u32),

    #[error("Attribute group with an empty name")]
    EmptyGroupName,

    #[error("Attribute group '{0}' is declared twice")]
    DuplicateGroup(String),

    #[error("Attribute group '{0}' has no source columns")]
    NoSourceColumns(String),

    #[error("Empty column name in {0}")]
    EmptyColumnName(String),

    #[error("Invalid schema document: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_catalog_is_valid() {
        let schema = AttributeSchema::tool_catalog();
        schema.validate().unwrap();
        assert_eq!(schema.linked_groups().count(), 14);
        assert_eq!(schema.column_groups().count(), 5);
        assert!(schema.group("Sector Focus").unwrap().is_linked());
        assert!(!schema.group("Cost").unwrap().is_linked());
    }

    #[test]
    fn test_required_columns_are_deduplicated() {
        let schema = AttributeSchema::tool_catalog();
        let columns = schema.required_columns();

        assert_eq!(columns[0], "tool_id");
        assert_eq!(columns[1], "tool_name");
        // maintenance is both an entity column and a link column
        assert_eq!(columns.iter().filter(|c| **c == "maintenance").count(), 1);
        assert!(columns.contains(&"sector"));
        assert!(columns.contains(&"language"));
    }

    #[test]
    fn test_duplicate_group_rejected() {
        let mut schema = AttributeSchema::tool_catalog();
        schema.groups.push(AttributeGroup::linked("Sector Focus", &["sector_2"]));
        assert!(matches!(schema.validate(), Err(SchemaError::DuplicateGroup(name)) if name == "Sector Focus"));
    }

    #[test]
    fn test_linked_group_without_columns_rejected() {
        let mut schema = AttributeSchema::tool_catalog();
        schema.groups.push(AttributeGroup::linked("Empty", &[]));
        assert!(matches!(schema.validate(), Err(SchemaError::NoSourceColumns(_))));
    }

    #[test]
    fn test_from_json_with_direct_geography() {
        let json = r#"{
            "entity": {
                "id": "id", "name": "name", "description": "description",
                "highlight1": "b1", "highlight2": "b2", "highlight3": "b3",
                "cost": "cost", "maintenance": "maintenance", "support": "support",
                "validation": "validation", "customizability": "customizability",
                "integration": "integration", "multi_language": "multi_language",
                "area_scope": "scope", "area_of_focus": "focus", "link": "link"
            },
            "groups": [
                {"name": "Sector Focus", "kind": "linked", "columns": ["sector", "sector_extra"]},
                {"name": "Cost", "kind": "entity_column", "field": "cost"}
            ],
            "geography": {"layout": "direct", "id_column": "id", "scope_column": "scope", "name_column": "place"}
        }"#;

        let schema = AttributeSchema::from_json(json).unwrap();
        assert_eq!(schema.version, SCHEMA_VERSION);
        let sector: Vec<_> = schema.group("Sector Focus").unwrap().source_columns().collect();
        assert_eq!(sector, vec!["sector", "sector_extra"]);
        assert_eq!(schema.area_columns(), vec!["id", "scope", "place"]);
    }

    #[test]
    fn test_from_json_rejects_unknown_version() {
        let mut schema = AttributeSchema::tool_catalog();
        schema.version = 7;
        let json = serde_json::to_string(&schema).unwrap();
        assert!(matches!(AttributeSchema::from_json(&json), Err(SchemaError::UnsupportedVersion(7))));
    }
}
