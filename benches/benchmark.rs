// Resolve throughput over a synthetic catalog
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::collections::BTreeMap;
use toolcat::{
    AttributeSchema, Entity, EntityField, EntityId, FacetCatalog, FilterRequest, MemoryStore, QueryEngine,
    RelationalModel,
};
use toolcat_core::{GeographyTable, LinkTable};

const SECTORS: [&str; 8] = ["Agriculture", "Energy", "Health", "Water", "Climate", "Urban", "Coastal", "Forestry"];
const COSTS: [&str; 3] = ["Free", "Subscription-based", "One-time purchase"];
const WORDS: [&str; 6] = ["flood", "erosion", "drought", "heat", "yield", "storm"];

fn synthetic_model(size: usize, rng: &mut StdRng) -> RelationalModel {
    let schema = AttributeSchema::tool_catalog();
    let mut entities = Vec::with_capacity(size);
    let mut sectors = LinkTable::new();

    for i in 0..size {
        let id = EntityId(i as i64);
        let word = WORDS[rng.random_range(0..WORDS.len())];
        entities.push(
            Entity::new(id)
                .with(EntityField::Name, &format!("tool {}", i))
                .with(EntityField::Description, &format!("models {} risk", word))
                .with(EntityField::Cost, COSTS[rng.random_range(0..COSTS.len())]),
        );
        let count = rng.random_range(1..4);
        for sector in SECTORS.choose_multiple(rng, count) {
            sectors.insert(id, sector);
        }
    }

    let mut links: BTreeMap<String, LinkTable> = schema
        .linked_groups()
        .map(|g| (g.name.clone(), LinkTable::new()))
        .collect();
    links.insert("Sector Focus".to_string(), sectors);

    RelationalModel {
        entities,
        links,
        geography: GeographyTable::Legacy(Vec::new()),
    }
}

fn engine(size: usize) -> QueryEngine {
    let mut rng = StdRng::seed_from_u64(42);
    let store = MemoryStore::with_model(synthetic_model(size, &mut rng)).unwrap();
    let catalog = FacetCatalog::new(Arc::new(AttributeSchema::tool_catalog()), Arc::new(store));
    QueryEngine::new(Arc::new(catalog))
}

fn benchmark_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    for size in [1_000, 10_000, 50_000].iter() {
        let engine = engine(*size);
        // warm the cache so the timing covers set algebra only
        engine.resolve(&FilterRequest::new()).unwrap();

        let facets = FilterRequest::new()
            .select("Sector Focus", ["Water", "Health"])
            .select("Cost", ["Free"]);
        group.bench_with_input(BenchmarkId::new("facets", size), size, |b, _| {
            b.iter(|| black_box(engine.resolve(black_box(&facets)).unwrap()));
        });

        let text = facets.clone().with_text("erosion");
        group.bench_with_input(BenchmarkId::new("facets_and_text", size), size, |b, _| {
            b.iter(|| black_box(engine.resolve(black_box(&text)).unwrap()));
        });

        group.bench_with_input(BenchmarkId::new("ordered", size), size, |b, _| {
            b.iter(|| black_box(engine.resolve_ordered(black_box(&facets)).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_snapshot_load(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let store = Arc::new(MemoryStore::with_model(synthetic_model(10_000, &mut rng)).unwrap());
    let catalog = FacetCatalog::new(Arc::new(AttributeSchema::tool_catalog()), store);

    c.bench_function("snapshot_reload_10000", |b| {
        b.iter(|| {
            catalog.invalidate();
            black_box(catalog.snapshot().unwrap())
        });
    });
}

criterion_group!(benches, benchmark_resolve, benchmark_snapshot_load);
criterion_main!(benches);

