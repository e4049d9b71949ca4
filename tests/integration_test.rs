// Integration tests for toolcat
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use toolcat::prelude::*;
use toolcat::{FullView, GeographyLayout};

fn write_tools_csv(path: &Path, rows: &[HashMap<&str, &str>]) {
    let schema = AttributeSchema::tool_catalog();
    let header = schema.required_columns();

    let mut writer = csv::Writer::from_path(path).unwrap();
    writer.write_record(&header).unwrap();
    for row in rows {
        let record: Vec<&str> = header
            .iter()
            .map(|column| row.get(column).copied().unwrap_or(""))
            .collect();
        writer.write_record(&record).unwrap();
    }
    writer.flush().unwrap();
}

fn inventory() -> Vec<HashMap<&'static str, &'static str>> {
    vec![
        HashMap::from([
            ("tool_id", "1"),
            ("tool_name", "Alpha"),
            ("tool_description", "Soil erosion model for river basins"),
            ("sector", "Health, Water"),
            ("cost", "Free"),
            ("primary_area_scope", "Country"),
            ("primary_area_of_focus", "Kenya, Uganda"),
        ]),
        HashMap::from([
            ("tool_id", "2"),
            ("tool_name", "beta"),
            ("tool_description", "Flood early warning"),
            ("sector", "Water"),
            ("cost", "Subscription-based"),
            ("primary_area_scope", "Continent"),
            ("primary_area_of_focus", "Africa"),
        ]),
        HashMap::from([
            ("tool_id", "3"),
            ("tool_name", "FloodMapper"),
            ("tool_description", "Maps coastal erosion"),
            ("bullet2", "Open data"),
            ("sector", "Agriculture"),
            ("cost", "Free"),
        ]),
    ]
}

fn built_storage(dir: &Path) -> StorageManager {
    let source = dir.join("tools.csv");
    write_tools_csv(&source, &inventory());

    let storage = StorageManager::new(dir.join("data")).unwrap();
    let extract = SourceExtract::from_paths(&source, None).unwrap();
    let report = storage.rebuild(&extract).unwrap();
    assert_eq!(report.entities, 3);
    storage
}

fn ids(raw: &[i64]) -> BTreeSet<EntityId> {
    raw.iter().copied().map(EntityId).collect()
}

#[test]
fn test_or_within_and_across_groups() {
    let dir = tempfile::tempdir().unwrap();
    let storage = built_storage(dir.path());
    let engine = storage.engine();

    let water = FilterRequest::new().select("Sector Focus", ["Water"]);
    assert_eq!(engine.resolve(&water).unwrap(), ids(&[1, 2]));

    let water_or_agri = FilterRequest::new().select("Sector Focus", ["Water", "Agriculture"]);
    assert_eq!(engine.resolve(&water_or_agri).unwrap(), ids(&[1, 2, 3]));

    let water_and_free = water.clone().select("Cost", ["Free"]);
    assert_eq!(engine.resolve(&water_and_free).unwrap(), ids(&[1]));

    let energy = FilterRequest::new().select("Sector Focus", ["Energy"]);
    assert!(engine.resolve(&energy).unwrap().is_empty());
}

#[test]
fn test_free_text_is_case_insensitive() {
    let dir = tempfile::tempdir().unwrap();
    let storage = built_storage(dir.path());
    let engine = storage.engine();

    let lower = FilterRequest::new().with_text("erosion");
    let mixed = FilterRequest::new().with_text("  ERosIon ");
    assert_eq!(engine.resolve(&lower).unwrap(), ids(&[1, 3]));
    assert_eq!(engine.resolve(&mixed).unwrap(), ids(&[1, 3]));

    let narrowed = lower.select("Sector Focus", ["Water"]);
    assert_eq!(engine.resolve(&narrowed).unwrap(), ids(&[1]));
}

#[test]
fn test_results_in_display_order() {
    let dir = tempfile::tempdir().unwrap();
    let storage = built_storage(dir.path());

    let all = storage.engine().resolve_ordered(&FilterRequest::new()).unwrap();
    // names compare case-insensitively: Alpha, beta, FloodMapper
    assert_eq!(all, vec![EntityId(1), EntityId(2), EntityId(3)]);
}

#[test]
fn test_geography_cascade() {
    let dir = tempfile::tempdir().unwrap();
    let storage = built_storage(dir.path());
    let geography = storage.geography();

    assert_eq!(geography.scopes(), vec!["Continent", "Country"]);
    assert_eq!(
        geography.names_for(&BTreeSet::from(["Country".to_string()])),
        vec!["Kenya", "Uganda"]
    );
    assert_eq!(geography.names_for(&BTreeSet::new()), vec!["Africa", "Kenya", "Uganda"]);

    let engine = storage.engine();
    let by_scope = FilterRequest::new().with_scopes(["Country"]);
    assert_eq!(engine.resolve(&by_scope).unwrap(), ids(&[1]));

    let by_name = FilterRequest::new().with_names(["Africa"]);
    assert_eq!(engine.resolve(&by_name).unwrap(), ids(&[2]));

    let mismatched = FilterRequest::new().with_scopes(["Continent"]).with_names(["Kenya"]);
    assert!(engine.resolve(&mismatched).unwrap().is_empty());
}

#[test]
fn test_unknown_group_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let storage = built_storage(dir.path());

    let request = FilterRequest::new().select("Colour", ["Blue"]);
    let err = storage.engine().resolve(&request).unwrap_err();
    assert!(matches!(err, Error::UnknownGroup(group) if group == "Colour"));
}

#[test]
fn test_reopen_serves_persisted_build() {
    let dir = tempfile::tempdir().unwrap();
    drop(built_storage(dir.path()));

    let storage = StorageManager::new(dir.path().join("data")).unwrap();
    assert_eq!(
        storage.catalog().values_for("Sector Focus"),
        vec!["Agriculture", "Health", "Water"]
    );
    assert_eq!(storage.build_info().unwrap().unwrap().entities, 3);
}

#[test]
fn test_rebuild_is_picked_up_after_invalidation() {
    let dir = tempfile::tempdir().unwrap();
    let storage = built_storage(dir.path());
    assert_eq!(storage.catalog().snapshot().unwrap().entity_count(), 3);

    let source = dir.path().join("smaller.csv");
    write_tools_csv(
        &source,
        &[HashMap::from([("tool_id", "9"), ("tool_name", "Delta"), ("sector", "Energy")])],
    );
    storage
        .rebuild(&SourceExtract::from_paths(&source, None).unwrap())
        .unwrap();

    let energy = FilterRequest::new().select("Sector Focus", ["Energy"]);
    assert_eq!(storage.engine().resolve(&energy).unwrap(), ids(&[9]));
    assert_eq!(storage.list_snapshots().unwrap().len(), 1);
}

#[test]
fn test_direct_geography_layout() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("tools.csv");
    write_tools_csv(&source, &inventory());

    let areas = dir.path().join("areas.csv");
    std::fs::write(
        &areas,
        "tool_id,scope,name\n1,Country,Kenya\n1,Region,East Africa\n3,Global,Global\n",
    )
    .unwrap();

    let mut schema = AttributeSchema::tool_catalog();
    schema.geography = GeographyLayout::direct();
    let storage =
        StorageManager::open(dir.path().join("data"), Arc::new(schema), Duration::from_secs(60)).unwrap();
    storage
        .rebuild(&SourceExtract::from_paths(&source, Some(&areas)).unwrap())
        .unwrap();

    let geography = storage.geography();
    assert_eq!(geography.scopes(), vec!["Country", "Global", "Region"]);

    let region = FilterRequest::new().with_scopes(["Region"]);
    assert_eq!(storage.engine().resolve(&region).unwrap(), ids(&[1]));
}

#[test]
fn test_full_view_flattens_labels() {
    let dir = tempfile::tempdir().unwrap();
    let storage = built_storage(dir.path());

    let snapshot = storage.catalog().snapshot().unwrap();
    let view = FullView::build(&snapshot, storage.schema());
    assert_eq!(view.len(), 3);
    assert_eq!(view.cell(0, "Sector Focus"), Some("Health, Water"));
    assert_eq!(view.cell(0, "areas"), Some("Kenya, Uganda"));
}
