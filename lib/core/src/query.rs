use crate::catalog::{FacetCatalog, FacetSnapshot, GroupFacet};
use crate::filter::FilterRequest;
use crate::{EntityId, Error, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use toolcat_schema::AttributeSchema;
use tracing::debug;

/// Resolves filter requests to entity id sets.
///
/// OR within a group, AND across groups, geography next, free text last.
/// Every call reads one snapshot from start to finish.
pub struct QueryEngine {
    catalog: Arc<FacetCatalog>,
}

impl QueryEngine {
    pub fn new(catalog: Arc<FacetCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<FacetCatalog> {
        &self.catalog
    }

    /// Ids of every entity satisfying the request
    pub fn resolve(&self, request: &FilterRequest) -> Result<BTreeSet<EntityId>> {
        let snapshot = self.catalog.snapshot()?;
        resolve_in(&snapshot, self.catalog.schema(), request)
    }

    /// Same ids as [`resolve`](Self::resolve), in display order
    pub fn resolve_ordered(&self, request: &FilterRequest) -> Result<Vec<EntityId>> {
        let snapshot = self.catalog.snapshot()?;
        let ids = resolve_in(&snapshot, self.catalog.schema(), request)?;
        Ok(snapshot.order_for_display(ids))
    }
}

/// Resolve a request against one snapshot
pub fn resolve_in(
    snapshot: &FacetSnapshot,
    schema: &AttributeSchema,
    request: &FilterRequest,
) -> Result<BTreeSet<EntityId>> {
    // reject unknown vocabulary before touching any index
    for (group, _) in request.active_groups() {
        if schema.group(group).is_none() {
            return Err(Error::UnknownGroup(group.to_string()));
        }
    }

    let mut result = snapshot.universe();

    // linked groups first, then entity columns
    let ordered = schema
        .linked_groups()
        .chain(schema.column_groups())
        .filter_map(|g| request.selections.get(&g.name).map(|labels| (g, labels)))
        .filter(|(_, labels)| !labels.is_empty());

    for (group, labels) in ordered {
        let eligible = match snapshot.group(&group.name) {
            Some(GroupFacet::Available(index)) => index.union_of(labels),
            Some(GroupFacet::Unavailable { reason }) => {
                debug!("Group '{}' unavailable ({}), failing closed", group.name, reason);
                return Ok(BTreeSet::new());
            }
            None => return Ok(BTreeSet::new()),
        };
        result = result.intersection(&eligible).copied().collect();
        if result.is_empty() {
            return Ok(result);
        }
    }

    if !request.geography.is_empty() {
        let eligible = match snapshot.geography() {
            Some(geography) => geography.matching_ids(&request.geography),
            None => {
                debug!("Geography unavailable, failing closed");
                return Ok(BTreeSet::new());
            }
        };
        result = result.intersection(&eligible).copied().collect();
    }

    let needle = request.text.trim().to_lowercase();
    if !needle.is_empty() {
        result.retain(|id| snapshot.entity(*id).is_some_and(|e| e.matches_text(&needle)));
    }

    Ok(result)
}
