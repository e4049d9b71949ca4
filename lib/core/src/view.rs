//! Denormalized QA view: one row per entity, every link group's labels
//! joined back into a single cell.

use crate::catalog::FacetSnapshot;
use serde::Serialize;
use toolcat_schema::{AttributeSchema, EntityField};

/// Separator between labels in a joined cell
pub const LABEL_SEPARATOR: &str = ", ";

/// Header of the geography column
pub const AREAS_HEADER: &str = "areas";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FullView {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl FullView {
    /// Build the view from one snapshot. Rows are ordered by id; columns are
    /// the entity's source columns followed by one column per link group and
    /// the entity's geography names.
    pub fn build(snapshot: &FacetSnapshot, schema: &AttributeSchema) -> Self {
        let linked: Vec<&str> = schema.linked_groups().map(|g| g.name.as_str()).collect();

        let mut headers = vec![schema.entity.id.clone()];
        headers.extend(EntityField::ALL.into_iter().map(|f| schema.entity.column(f).to_string()));
        headers.extend(linked.iter().map(|g| g.to_string()));
        headers.push(AREAS_HEADER.to_string());

        let rows = snapshot
            .entities()
            .map(|entity| {
                let mut row = Vec::with_capacity(headers.len());
                row.push(entity.id.to_string());
                row.extend(
                    EntityField::ALL
                        .into_iter()
                        .map(|f| entity.field(f).unwrap_or_default().to_string()),
                );
                for group in &linked {
                    row.push(snapshot.labels_for(group, entity.id).join(LABEL_SEPARATOR));
                }
                let areas = snapshot
                    .geography()
                    .map(|g| g.names_of(entity.id))
                    .unwrap_or_default();
                row.push(areas.join(LABEL_SEPARATOR));
                row
            })
            .collect();

        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell of `row` under `header`
    pub fn cell(&self, row: usize, header: &str) -> Option<&str> {
        let column = self.headers.iter().position(|h| h == header)?;
        self.rows.get(row).and_then(|r| r.get(column)).map(String::as_str)
    }
}
