use crate::source::{SourceExtract, SourceTable};
use ahash::AHashSet;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use toolcat_core::{
    Entity, EntityField, EntityId, Error, GeographyEntry, GeographyLayout, GeographyTable,
    LegacyAreaRow, LinkTable, Provenance, RelationalModel, Result, SchemaStore,
};
use toolcat_schema::{AttributeSchema, GroupKind, KNOWN_AREA_SCOPES, MULTI_VALUE_DELIMITER};
use tracing::{info, warn};

/// Split a multi-valued cell on the delimiter, trimming parts and dropping
/// empty ones. No case folding.
pub fn split_multi(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(MULTI_VALUE_DELIMITER)
        .map(str::trim)
        .filter(|part| !part.is_empty())
}

/// Counters describing one normalization run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeReport {
    pub entities: usize,
    /// Pairs kept per link group
    pub pairs_per_group: BTreeMap<String, usize>,
    pub duplicate_pairs_dropped: usize,
    pub geography_entries: usize,
    /// Entries whose scope was borrowed from the entity's primary scope
    pub inferred_scope_entries: usize,
    /// Legacy names dropped because their entity has no primary scope
    pub unscoped_names_dropped: usize,
    /// Area rows dropped for an empty scope or name
    pub blank_area_rows_dropped: usize,
    /// Entries kept whose scope is outside the known vocabulary
    pub unknown_scope_entries: usize,
}

impl NormalizeReport {
    pub fn link_pairs(&self) -> usize {
        self.pairs_per_group.values().sum()
    }
}

/// Output of a successful run: the staged model and its report
#[derive(Debug, Clone)]
pub struct Normalized {
    pub model: RelationalModel,
    pub report: NormalizeReport,
}

/// Turns a wide source extract into the relational model.
///
/// Every table is staged in memory; nothing reaches a store unless the whole
/// extract is valid.
pub struct Normalizer {
    schema: Arc<AttributeSchema>,
}

impl Normalizer {
    pub fn new(schema: Arc<AttributeSchema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &AttributeSchema {
        &self.schema
    }

    /// Normalize the extract and replace the store's content with the result
    pub fn rebuild(&self, extract: &SourceExtract, store: &dyn SchemaStore) -> Result<NormalizeReport> {
        let Normalized { model, report } = self.normalize(extract)?;
        store.replace_all(model)?;
        Ok(report)
    }

    /// Validate and normalize the extract without touching any store
    pub fn normalize(&self, extract: &SourceExtract) -> Result<Normalized> {
        let started = Instant::now();
        self.schema.validate()?;
        self.check_columns(extract)?;

        let mut report = NormalizeReport::default();
        let entities = self.entities(&extract.tools)?;
        report.entities = entities.len();

        let ids: AHashSet<EntityId> = entities.iter().map(|e| e.id).collect();
        let links = self.links(&extract.tools, &mut report);

        let geography = match &self.schema.geography {
            GeographyLayout::Legacy => self.legacy_geography(&entities, &mut report),
            GeographyLayout::Direct {
                id_column,
                scope_column,
                name_column,
            } => {
                let areas = extract.areas.as_ref().ok_or_else(|| {
                    Error::SchemaConfiguration("direct geography layout needs an areas table".to_string())
                })?;
                direct_geography(areas, [id_column, scope_column, name_column], &ids, &mut report)?
            }
        };

        let model = RelationalModel {
            entities,
            links,
            geography,
        };
        model.check_integrity()?;

        if report.inferred_scope_entries > 0 {
            warn!(
                "{} geography entries inferred from primary scope, {} unscoped names dropped",
                report.inferred_scope_entries, report.unscoped_names_dropped
            );
        }
        if report.unknown_scope_entries > 0 {
            warn!(
                "{} geography entries use a scope outside {:?}",
                report.unknown_scope_entries, KNOWN_AREA_SCOPES
            );
        }
        info!(
            "Normalized {} entities, {} link pairs ({} duplicates dropped), {} geography entries in {:?}",
            report.entities,
            report.link_pairs(),
            report.duplicate_pairs_dropped,
            report.geography_entries,
            started.elapsed()
        );

        Ok(Normalized { model, report })
    }

    /// Fail fast when the header lacks any declared column
    fn check_columns(&self, extract: &SourceExtract) -> Result<()> {
        let missing = extract.tools.missing_columns(self.schema.required_columns());
        if !missing.is_empty() {
            return Err(Error::SchemaConfiguration(format!(
                "source is missing columns: {}",
                missing.join(", ")
            )));
        }

        if let Some(areas) = &extract.areas {
            if matches!(self.schema.geography, GeographyLayout::Legacy) {
                return Err(Error::SchemaConfiguration(
                    "legacy geography layout takes no areas table; declare the direct layout to use one"
                        .to_string(),
                ));
            }
            let missing = areas.missing_columns(self.schema.area_columns());
            if !missing.is_empty() {
                return Err(Error::SchemaConfiguration(format!(
                    "areas table is missing columns: {}",
                    missing.join(", ")
                )));
            }
        }
        Ok(())
    }

    fn entities(&self, tools: &SourceTable) -> Result<Vec<Entity>> {
        let columns = &self.schema.entity;
        let mut seen = AHashSet::with_capacity(tools.len());
        let mut entities = Vec::with_capacity(tools.len());

        for (idx, record) in tools.records.iter().enumerate() {
            let row = idx + 1;
            let raw = record.get(&columns.id);
            let id = EntityId::parse(raw).ok_or_else(|| Error::RecordIngestion {
                row,
                message: format!("identifier {:?} is not an integer", raw),
            })?;
            if !seen.insert(id) {
                return Err(Error::RecordIngestion {
                    row,
                    message: format!("identifier {} appears more than once", id),
                });
            }

            let mut entity = Entity::new(id);
            for field in EntityField::ALL {
                let value = record.get(columns.column(field));
                entity.set_field(field, Some(value.to_string()));
            }
            entities.push(entity);
        }

        entities.sort_by_key(|e| e.id);
        Ok(entities)
    }

    fn links(&self, tools: &SourceTable, report: &mut NormalizeReport) -> BTreeMap<String, LinkTable> {
        let id_column = &self.schema.entity.id;
        let mut links = BTreeMap::new();

        for group in self.schema.linked_groups() {
            let GroupKind::Linked { columns } = &group.kind else {
                continue;
            };
            let mut table = LinkTable::new();
            for record in &tools.records {
                // ids were validated while building the entity table
                let Some(id) = EntityId::parse(record.get(id_column)) else {
                    continue;
                };
                for column in columns {
                    for label in split_multi(record.get(column)) {
                        if !table.insert(id, label) {
                            report.duplicate_pairs_dropped += 1;
                        }
                    }
                }
            }
            report.pairs_per_group.insert(group.name.clone(), table.len());
            links.insert(group.name.clone(), table);
        }
        links
    }

    fn legacy_geography(&self, entities: &[Entity], report: &mut NormalizeReport) -> GeographyTable {
        let mut rows = BTreeSet::new();

        for entity in entities {
            let Some(names) = entity.area_of_focus.as_deref() else {
                continue;
            };
            let names: Vec<&str> = split_multi(names).collect();
            match entity.area_scope.as_deref() {
                None => report.unscoped_names_dropped += names.len(),
                Some(scope) => {
                    let known = is_known_scope(scope);
                    for name in names {
                        if rows.insert(LegacyAreaRow::new(entity.id, name)) && !known {
                            report.unknown_scope_entries += 1;
                        }
                    }
                }
            }
        }

        report.geography_entries = rows.len();
        report.inferred_scope_entries = rows.len();
        GeographyTable::Legacy(rows.into_iter().collect())
    }
}

fn direct_geography(
    areas: &SourceTable,
    [id_column, scope_column, name_column]: [&String; 3],
    ids: &AHashSet<EntityId>,
    report: &mut NormalizeReport,
) -> Result<GeographyTable> {
    let mut entries = BTreeSet::new();

    for (idx, record) in areas.records.iter().enumerate() {
        let row = idx + 1;
        let raw = record.get(id_column);
        let id = EntityId::parse(raw).ok_or_else(|| Error::RecordIngestion {
            row,
            message: format!("area identifier {:?} is not an integer", raw),
        })?;
        if !ids.contains(&id) {
            return Err(Error::RecordIngestion {
                row,
                message: format!("area row references unknown entity {}", id),
            });
        }

        let (scope, name) = (record.get(scope_column), record.get(name_column));
        if scope.is_empty() || name.is_empty() {
            report.blank_area_rows_dropped += 1;
            continue;
        }
        let entry = GeographyEntry {
            entity_id: id,
            scope: scope.to_string(),
            name: name.to_string(),
            provenance: Provenance::Direct,
        };
        if entries.insert(entry) && !is_known_scope(scope) {
            report.unknown_scope_entries += 1;
        }
    }

    report.geography_entries = entries.len();
    Ok(GeographyTable::Direct(entries.into_iter().collect()))
}

fn is_known_scope(scope: &str) -> bool {
    KNOWN_AREA_SCOPES.contains(&scope)
}
