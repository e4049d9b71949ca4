use crate::geography::GeographyIndex;
use crate::model::LinkPair;
use crate::store::SchemaStore;
use crate::{Entity, EntityId, Result};
use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use toolcat_schema::{AttributeGroup, AttributeSchema, GroupKind};
use tracing::{debug, info, warn};

/// Default snapshot lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

const MAX_LOAD_ATTEMPTS: usize = 3;

/// Case-insensitive label order, byte order on ties
pub fn label_cmp(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

pub fn sort_labels(labels: &mut [String]) {
    labels.sort_by(|a, b| label_cmp(a, b));
}

/// Time source for snapshot expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock()
    }
}

/// Bidirectional index of one attribute group
#[derive(Debug, Clone, Default)]
pub struct FacetIndex {
    values: Vec<String>,
    by_entity: BTreeMap<EntityId, Vec<String>>,
    by_label: AHashMap<String, BTreeSet<EntityId>>,
}

impl FacetIndex {
    /// Build both directions from the same (id, label) pairs
    pub fn from_pairs(pairs: impl IntoIterator<Item = (EntityId, String)>) -> Self {
        let mut by_label: AHashMap<String, BTreeSet<EntityId>> = AHashMap::new();
        let mut labels_of: BTreeMap<EntityId, BTreeSet<String>> = BTreeMap::new();

        for (id, label) in pairs {
            labels_of.entry(id).or_default().insert(label.clone());
            by_label.entry(label).or_default().insert(id);
        }

        let by_entity = labels_of
            .into_iter()
            .map(|(id, labels)| {
                let mut labels: Vec<String> = labels.into_iter().collect();
                sort_labels(&mut labels);
                (id, labels)
            })
            .collect();

        let mut values: Vec<String> = by_label.keys().cloned().collect();
        sort_labels(&mut values);

        Self {
            values,
            by_entity,
            by_label,
        }
    }

    /// Distinct labels, case-insensitive order
    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn ids(&self, label: &str) -> Option<&BTreeSet<EntityId>> {
        self.by_label.get(label)
    }

    /// Labels of one entity, case-insensitive order
    pub fn labels(&self, id: EntityId) -> &[String] {
        self.by_entity.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Union of the ids of every given label; unknown labels contribute nothing
    pub fn union_of<'a>(&self, labels: impl IntoIterator<Item = &'a String>) -> BTreeSet<EntityId> {
        labels
            .into_iter()
            .filter_map(|label| self.by_label.get(label))
            .flatten()
            .copied()
            .collect()
    }
}

/// Index state of one group within a snapshot
#[derive(Debug, Clone)]
pub enum GroupFacet {
    Available(FacetIndex),
    /// Backing data could not be loaded; selections in this group match nothing
    Unavailable { reason: String },
}

impl GroupFacet {
    pub fn index(&self) -> Option<&FacetIndex> {
        match self {
            GroupFacet::Available(index) => Some(index),
            GroupFacet::Unavailable { .. } => None,
        }
    }
}

/// Immutable view of the store at one point in time
pub struct FacetSnapshot {
    version: u64,
    loaded_at: Instant,
    entities: BTreeMap<EntityId, Entity>,
    groups: AHashMap<String, GroupFacet>,
    geography: Option<GeographyIndex>,
}

impl FacetSnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.loaded_at) >= ttl
    }

    /// Every known entity id
    pub fn universe(&self) -> BTreeSet<EntityId> {
        self.entities.keys().copied().collect()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn group(&self, name: &str) -> Option<&GroupFacet> {
        self.groups.get(name)
    }

    /// Geography index, `None` when the geography table was unreadable
    pub fn geography(&self) -> Option<&GeographyIndex> {
        self.geography.as_ref()
    }

    pub fn values_for(&self, group: &str) -> &[String] {
        self.index(group).map(FacetIndex::values).unwrap_or(&[])
    }

    pub fn ids_for(&self, group: &str, label: &str) -> BTreeSet<EntityId> {
        self.index(group)
            .and_then(|index| index.ids(label))
            .cloned()
            .unwrap_or_default()
    }

    pub fn labels_for(&self, group: &str, id: EntityId) -> &[String] {
        self.index(group).map(|index| index.labels(id)).unwrap_or(&[])
    }

    /// Sort ids into display order (name case-insensitively, unnamed last)
    pub fn order_for_display(&self, ids: impl IntoIterator<Item = EntityId>) -> Vec<EntityId> {
        let mut rows: Vec<&Entity> = ids.into_iter().filter_map(|id| self.entities.get(&id)).collect();
        rows.sort_by(|a, b| a.display_cmp(b));
        rows.into_iter().map(|e| e.id).collect()
    }

    fn index(&self, group: &str) -> Option<&FacetIndex> {
        self.groups.get(group).and_then(GroupFacet::index)
    }
}

impl fmt::Debug for FacetSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FacetSnapshot")
            .field("version", &self.version)
            .field("entities", &self.entities.len())
            .field("groups", &self.groups.len())
            .field("geography", &self.geography.as_ref().map(|g| g.entries().len()))
            .finish()
    }
}

/// Read-through cache of the store's attribute data.
///
/// Snapshots live for a fixed TTL. The first read after expiry reloads from
/// the store and swaps the new snapshot in with a single reference update;
/// concurrent readers keep whichever `Arc` they already hold.
pub struct FacetCatalog {
    schema: Arc<AttributeSchema>,
    store: Arc<dyn SchemaStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    current: RwLock<Option<Arc<FacetSnapshot>>>,
    reload: Mutex<()>,
    loads: AtomicU64,
    epoch: AtomicU64,
}

impl FacetCatalog {
    pub fn new(schema: Arc<AttributeSchema>, store: Arc<dyn SchemaStore>) -> Self {
        Self::with_clock(schema, store, Arc::new(SystemClock), DEFAULT_TTL)
    }

    pub fn with_ttl(schema: Arc<AttributeSchema>, store: Arc<dyn SchemaStore>, ttl: Duration) -> Self {
        Self::with_clock(schema, store, Arc::new(SystemClock), ttl)
    }

    pub fn with_clock(
        schema: Arc<AttributeSchema>,
        store: Arc<dyn SchemaStore>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            schema,
            store,
            clock,
            ttl,
            current: RwLock::new(None),
            reload: Mutex::new(()),
            loads: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn schema(&self) -> &AttributeSchema {
        &self.schema
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current snapshot, reloading it first if it has expired
    pub fn snapshot(&self) -> Result<Arc<FacetSnapshot>> {
        let cached = self.current.read().clone();
        if let Some(snapshot) = &cached {
            if !snapshot.is_expired(self.clock.now(), self.ttl) {
                return Ok(Arc::clone(snapshot));
            }
        }

        let _guard = match self.reload.try_lock() {
            Some(guard) => guard,
            None => match &cached {
                // another reader is reloading; the stale snapshot is still whole
                Some(stale) => return Ok(Arc::clone(stale)),
                None => self.reload.lock(),
            },
        };

        if let Some(snapshot) = self.current.read().clone() {
            if !snapshot.is_expired(self.clock.now(), self.ttl) {
                return Ok(snapshot);
            }
        }

        let mut attempts = 0;
        let loaded = loop {
            attempts += 1;
            let epoch = self.epoch.load(AtomicOrdering::Acquire);
            let snapshot = match self.load() {
                Ok(snapshot) => Arc::new(snapshot),
                Err(e) => break Err(e),
            };

            let mut current = self.current.write();
            if self.epoch.load(AtomicOrdering::Acquire) == epoch {
                *current = Some(Arc::clone(&snapshot));
                break Ok(snapshot);
            }
            drop(current);
            // invalidated while loading: the data may predate the change
            debug!("Discarding snapshot v{} loaded across an invalidation", snapshot.version());
            if attempts == MAX_LOAD_ATTEMPTS {
                break Ok(snapshot);
            }
        };

        match loaded {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => match cached {
                Some(stale) => {
                    warn!("Catalog reload failed, serving snapshot v{}: {}", stale.version(), e);
                    Ok(stale)
                }
                None => Err(e),
            },
        }
    }

    /// Drop the current snapshot so the next read reloads
    pub fn invalidate(&self) {
        let mut current = self.current.write();
        self.epoch.fetch_add(1, AtomicOrdering::AcqRel);
        *current = None;
        debug!("Catalog snapshot invalidated");
    }

    /// Number of completed loads from the store
    pub fn load_count(&self) -> u64 {
        self.loads.load(AtomicOrdering::Acquire)
    }

    /// Distinct labels of a group. Empty if the group is unknown or unavailable.
    pub fn values_for(&self, group: &str) -> Vec<String> {
        match self.snapshot() {
            Ok(snapshot) => snapshot.values_for(group).to_vec(),
            Err(e) => {
                warn!("Options for '{}' unavailable: {}", group, e);
                Vec::new()
            }
        }
    }

    /// Ids carrying `label` in `group`. Empty if unknown or unavailable.
    pub fn ids_for(&self, group: &str, label: &str) -> BTreeSet<EntityId> {
        match self.snapshot() {
            Ok(snapshot) => snapshot.ids_for(group, label),
            Err(e) => {
                warn!("Membership for '{}' unavailable: {}", group, e);
                BTreeSet::new()
            }
        }
    }

    /// Labels of one entity in `group`
    pub fn labels_for(&self, group: &str, id: EntityId) -> Vec<String> {
        match self.snapshot() {
            Ok(snapshot) => snapshot.labels_for(group, id).to_vec(),
            Err(e) => {
                warn!("Labels for '{}' unavailable: {}", group, e);
                Vec::new()
            }
        }
    }

    fn load(&self) -> Result<FacetSnapshot> {
        let started = Instant::now();
        let linked: Vec<&str> = self.schema.linked_groups().map(|g| g.name.as_str()).collect();
        let mut contents = self.store.read_contents(&linked)?;

        let entities: BTreeMap<EntityId, Entity> =
            contents.entities.into_iter().map(|e| (e.id, e)).collect();

        let sources: Vec<(&AttributeGroup, Option<Result<Vec<LinkPair>>>)> = self
            .schema
            .groups
            .iter()
            .map(|group| (group, contents.links.remove(&group.name)))
            .collect();

        let groups: Vec<(String, GroupFacet)> = sources
            .into_par_iter()
            .map(|(group, pairs)| {
                let facet = match (&group.kind, pairs) {
                    (GroupKind::Linked { .. }, Some(Ok(pairs))) => GroupFacet::Available(FacetIndex::from_pairs(
                        pairs.into_iter().map(|p| (p.entity_id, p.label)),
                    )),
                    (GroupKind::Linked { .. }, Some(Err(e))) => {
                        warn!("Attribute group '{}' unavailable: {}", group.name, e);
                        GroupFacet::Unavailable { reason: e.to_string() }
                    }
                    (GroupKind::Linked { .. }, None) => GroupFacet::Unavailable {
                        reason: format!("store returned no table for '{}'", group.name),
                    },
                    (GroupKind::EntityColumn { field }, _) => GroupFacet::Available(FacetIndex::from_pairs(
                        entities
                            .values()
                            .filter_map(|e| e.field(*field).map(|v| (e.id, v.to_string()))),
                    )),
                };
                (group.name.clone(), facet)
            })
            .collect();

        let geography = match contents.geography {
            Ok(table) => Some(GeographyIndex::new(table.entries(entities.values()))),
            Err(e) => {
                warn!("Geography unavailable: {}", e);
                None
            }
        };

        let version = self.loads.fetch_add(1, AtomicOrdering::AcqRel) + 1;
        let unavailable = groups
            .iter()
            .filter(|(_, facet)| matches!(facet, GroupFacet::Unavailable { .. }))
            .count();
        info!(
            "Catalog snapshot v{} loaded in {:?}: {} entities, {} groups ({} unavailable), {} geography entries ({} with inferred scope)",
            version,
            started.elapsed(),
            entities.len(),
            groups.len(),
            unavailable,
            geography.as_ref().map_or(0, |g| g.entries().len()),
            geography.as_ref().map_or(0, GeographyIndex::inferred_count)
        );

        Ok(FacetSnapshot {
            version,
            loaded_at: self.clock.now(),
            entities,
            groups: groups.into_iter().collect(),
            geography,
        })
    }
}
