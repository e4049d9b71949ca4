use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer, Result as ActixResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use toolcat_core::{EntityId, Error, FilterRequest, GroupFacet, GroupKind};
use toolcat_storage::StorageManager;
use tracing::{debug, warn};

#[derive(Serialize)]
struct GroupInfo {
    name: String,
    kind: &'static str,
    available: bool,
}

#[derive(Serialize)]
struct ValuesResponse {
    group: String,
    values: Vec<String>,
}

#[derive(Deserialize)]
struct NamesRequest {
    #[serde(default)]
    scopes: BTreeSet<String>,
}

#[derive(Serialize)]
struct ResolveResponse {
    ids: Vec<EntityId>,
    count: usize,
}

#[derive(Serialize)]
struct EntityResponse {
    entity: toolcat_core::Entity,
    labels: BTreeMap<String, Vec<String>>,
    areas: Vec<String>,
}

pub struct RestApi;

impl RestApi {
    pub async fn start(storage: Arc<StorageManager>, port: u16) -> std::io::Result<()> {
        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);

            App::new()
                .wrap(cors)
                .app_data(web::Data::new(storage.clone()))
                .configure(configure)
        })
        .bind(("0.0.0.0", port))?
        .run()
        .await
    }
}

/// Register every route; shared by the server and the tests
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/groups", web::get().to(list_groups))
        .route("/groups/{name}/values", web::get().to(group_values))
        .route("/geography/scopes", web::get().to(geography_scopes))
        .route("/geography/names", web::post().to(geography_names))
        .route("/resolve", web::post().to(resolve))
        .route("/entities/{id}", web::get().to(get_entity));
}

fn error_response(e: &Error) -> HttpResponse {
    let body = serde_json::json!({ "error": e.to_string() });
    match e {
        Error::UnknownGroup(_) => HttpResponse::BadRequest().json(body),
        _ => {
            warn!("Request failed: {}", e);
            HttpResponse::InternalServerError().json(body)
        }
    }
}

async fn health(storage: web::Data<Arc<StorageManager>>) -> ActixResult<HttpResponse> {
    match storage.build_info() {
        Ok(build) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "build": build,
        }))),
        Err(e) => Ok(error_response(&e)),
    }
}

async fn list_groups(storage: web::Data<Arc<StorageManager>>) -> ActixResult<HttpResponse> {
    let snapshot = match storage.catalog().snapshot() {
        Ok(snapshot) => snapshot,
        Err(e) => return Ok(error_response(&e)),
    };

    let groups: Vec<GroupInfo> = storage
        .schema()
        .groups
        .iter()
        .map(|g| GroupInfo {
            name: g.name.clone(),
            kind: match g.kind {
                GroupKind::Linked { .. } => "linked",
                GroupKind::EntityColumn { .. } => "entity_column",
            },
            available: matches!(snapshot.group(&g.name), Some(GroupFacet::Available(_))),
        })
        .collect();
    Ok(HttpResponse::Ok().json(groups))
}

async fn group_values(
    storage: web::Data<Arc<StorageManager>>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let group = path.into_inner();
    if storage.schema().group(&group).is_none() {
        return Ok(HttpResponse::NotFound().json(serde_json::json!({
            "error": format!("Unknown attribute group: {}", group)
        })));
    }

    let values = storage.catalog().values_for(&group);
    Ok(HttpResponse::Ok().json(ValuesResponse { group, values }))
}

async fn geography_scopes(storage: web::Data<Arc<StorageManager>>) -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(storage.geography().scopes()))
}

async fn geography_names(
    storage: web::Data<Arc<StorageManager>>,
    req: web::Json<NamesRequest>,
) -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(storage.geography().names_for(&req.scopes)))
}

async fn resolve(
    storage: web::Data<Arc<StorageManager>>,
    req: web::Json<FilterRequest>,
) -> ActixResult<HttpResponse> {
    let request = req.into_inner();
    debug!("Resolving {:?}", request);
    match storage.engine().resolve_ordered(&request) {
        Ok(ids) => Ok(HttpResponse::Ok().json(ResolveResponse {
            count: ids.len(),
            ids,
        })),
        Err(e) => Ok(error_response(&e)),
    }
}

async fn get_entity(
    storage: web::Data<Arc<StorageManager>>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    let id = EntityId(path.into_inner());
    let snapshot = match storage.catalog().snapshot() {
        Ok(snapshot) => snapshot,
        Err(e) => return Ok(error_response(&e)),
    };

    let Some(entity) = snapshot.entity(id) else {
        return Ok(HttpResponse::NotFound().json(serde_json::json!({
            "error": "Entity not found"
        })));
    };

    let labels = storage
        .schema()
        .linked_groups()
        .map(|g| (g.name.clone(), snapshot.labels_for(&g.name, id).to_vec()))
        .filter(|(_, labels)| !labels.is_empty())
        .collect();
    let areas = snapshot
        .geography()
        .map(|g| g.names_of(id))
        .unwrap_or_default();

    Ok(HttpResponse::Ok().json(EntityResponse {
        entity: entity.clone(),
        labels,
        areas,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test};
    use toolcat_ingest::{SourceExtract, SourceRecord, SourceTable};
    use toolcat_core::AttributeSchema;

    fn storage(dir: &std::path::Path) -> Arc<StorageManager> {
        let schema = AttributeSchema::tool_catalog();
        let header = schema.required_columns().into_iter().map(str::to_string).collect();
        let records = vec![
            SourceRecord::new()
                .with("tool_id", "1")
                .with("tool_name", "Alpha")
                .with("sector", "Health,Water")
                .with("cost", "Free")
                .with("primary_area_scope", "Country")
                .with("primary_area_of_focus", "Kenya"),
            SourceRecord::new()
                .with("tool_id", "2")
                .with("tool_name", "beta")
                .with("sector", "Water")
                .with("cost", "Subscription-based"),
        ];
        let manager = StorageManager::new(dir).unwrap();
        manager
            .rebuild(&SourceExtract::new(SourceTable::new(header, records)))
            .unwrap();
        Arc::new(manager)
    }

    macro_rules! app {
        ($storage:expr) => {
            test::init_service(App::new().app_data(web::Data::new($storage)).configure(configure)).await
        };
    }

    #[actix_web::test]
    async fn test_resolve_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(storage(dir.path()));

        let req = test::TestRequest::post()
            .uri("/resolve")
            .set_json(serde_json::json!({"selections": {"Sector Focus": ["Water"]}}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["count"], 2);
        assert_eq!(body["ids"], serde_json::json!([1, 2]));

        let req = test::TestRequest::post()
            .uri("/resolve")
            .set_json(serde_json::json!({"selections": {"Sector Focus": ["Water"], "Cost": ["Free"]}}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["ids"], serde_json::json!([1]));
    }

    #[actix_web::test]
    async fn test_unknown_group_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(storage(dir.path()));

        let req = test::TestRequest::post()
            .uri("/resolve")
            .set_json(serde_json::json!({"selections": {"Colour": ["Blue"]}}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get().uri("/groups/Colour/values").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_values_and_geography() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(storage(dir.path()));

        let req = test::TestRequest::get().uri("/groups/Sector%20Focus/values").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["values"], serde_json::json!(["Health", "Water"]));

        let req = test::TestRequest::get().uri("/geography/scopes").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, serde_json::json!(["Country"]));

        let req = test::TestRequest::post()
            .uri("/geography/names")
            .set_json(serde_json::json!({"scopes": ["Continent"]}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, serde_json::json!([]));
    }

    #[actix_web::test]
    async fn test_entity_detail() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(storage(dir.path()));

        let req = test::TestRequest::get().uri("/entities/1").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["entity"]["name"], "Alpha");
        assert_eq!(body["labels"]["Sector Focus"], serde_json::json!(["Health", "Water"]));
        assert_eq!(body["areas"], serde_json::json!(["Kenya"]));

        let req = test::TestRequest::get().uri("/entities/42").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_health_and_groups() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(storage(dir.path()));

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["build"]["entities"], 2);

        let req = test::TestRequest::get().uri("/groups").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let groups = body.as_array().unwrap();
        assert_eq!(groups.len(), AttributeSchema::tool_catalog().groups.len());
        assert!(groups.iter().all(|g| g["available"] == true));
    }
}
