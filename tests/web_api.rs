//! HTTP surface of the web API over an in-memory store.

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use locator::settings::DirectorySettings;
use locator::state::AppState;
use locator::store::{EntityStatus, MemoryStore, NewTerm, Stores, Taxonomy};
use locator::web::create_router;
use serde_json::{Value, json};
use tower::ServiceExt;

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Two facilities, one published with a county tag, one draft.
async fn seeded_app() -> (Router, Stores) {
    let stores = Stores::memory(MemoryStore::new());

    let oh = stores
        .terms
        .insert_term(
            Taxonomy::County,
            NewTerm {
                name: "OH".to_owned(),
                slug: "oh".to_owned(),
                description: String::new(),
                parent: None,
            },
        )
        .await
        .unwrap();

    let clinic = stores
        .entities
        .insert_entity(10, "Clinic A", EntityStatus::Published)
        .await
        .unwrap();
    stores
        .entities
        .write_fields(clinic, &[("Phone", "555")])
        .await
        .unwrap();
    stores
        .entities
        .replace_tags(clinic, Taxonomy::County, &[oh])
        .await
        .unwrap();
    stores
        .entities
        .insert_entity(11, "Closed Clinic", EntityStatus::Draft)
        .await
        .unwrap();

    (create_router(AppState::new(stores.clone())), stores)
}

#[tokio::test]
async fn health_reports_healthy() {
    let (app, _) = seeded_app().await;
    let (status, body) = send(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn facility_listing_shows_published_only() {
    let (app, _) = seeded_app().await;
    let response = app.clone().oneshot(get("/api/facilities")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .get(header::CACHE_CONTROL)
            .is_some_and(|v| v.to_str().unwrap().starts_with("public"))
    );

    let (_, body) = send(&app, get("/api/facilities")).await;
    let facilities = body.as_array().unwrap();
    assert_eq!(facilities.len(), 1);
    assert_eq!(facilities[0]["facilityId"], 10);
    assert_eq!(facilities[0]["title"], "Clinic A");
    assert_eq!(facilities[0]["fields"]["Phone"], "555");
    assert_eq!(facilities[0]["counties"], json!(["OH"]));
    assert_eq!(facilities[0]["insurance"], json!([]));
}

#[tokio::test]
async fn coordinates_are_written_back() {
    let (app, stores) = seeded_app().await;
    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/facilities/10/coordinates",
            json!({ "lat": 39.96, "lng": -82.99 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lat"], 39.96);

    let id = stores.entities.find_by_facility_id(10).await.unwrap().unwrap();
    let entity = stores.entities.get_entity(id).await.unwrap().unwrap();
    assert_eq!(entity.field("Latitude"), Some("39.96"));
    assert_eq!(entity.field("Longitude"), Some("-82.99"));
    assert_eq!(entity.field("Phone"), Some("555"));
}

#[tokio::test]
async fn coordinates_out_of_range_are_rejected() {
    let (app, _) = seeded_app().await;
    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/facilities/10/coordinates",
            json!({ "lat": 123.0, "lng": 0.0 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_COORDINATES");
}

#[tokio::test]
async fn coordinates_for_unknown_facility_are_not_found() {
    let (app, _) = seeded_app().await;
    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/facilities/999/coordinates",
            json!({ "lat": 1.0, "lng": 1.0 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn terms_listing_by_taxonomy() {
    let (app, _) = seeded_app().await;

    let (status, body) = send(&app, get("/api/terms/county")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["slug"], "oh");
    assert_eq!(body[0]["taxonomy"], "county");

    let (status, body) = send(&app, get("/api/terms/zipcode")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "UNKNOWN_TAXONOMY");
}

#[tokio::test]
async fn admin_requires_token_when_configured() {
    let stores = Stores::memory(MemoryStore::new());
    let app = create_router(AppState::new(stores).with_admin_token(Some("s3cret".to_owned())));

    let (status, body) = send(&app, get("/api/admin/status")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let request = Request::get("/api/admin/status")
        .header(header::AUTHORIZATION, "Bearer s3cret")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let refresh = body["refresh"].as_array().unwrap();
    assert_eq!(refresh.len(), 7);
    assert!(refresh.iter().all(|r| r["due"] == true && r["locked"] == false));
}

#[tokio::test]
async fn admin_token_must_match_exactly() {
    let stores = Stores::memory(MemoryStore::new());
    let app = create_router(AppState::new(stores).with_admin_token(Some("s3cret".to_owned())));

    for presented in ["Bearer s3cret ", "Bearer  s3cret", "Bearer s3cre", "bearer s3cret"] {
        let request = Request::get("/api/admin/status")
            .header(header::AUTHORIZATION, presented)
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{presented:?}");
    }
}

#[tokio::test]
async fn invalid_settings_are_reported_but_stored() {
    let (app, stores) = seeded_app().await;
    let (status, body) = send(
        &app,
        json_request(
            Method::PUT,
            "/api/admin/settings",
            json!({
                "endpoint": "  https://directory.example/service.asmx  ",
                "facilityList": "Get Facilities!",
                "serviceList": "GetServices",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["settings"]["endpoint"],
        "https://directory.example/service.asmx"
    );
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["field"], "facilityList");

    let stored = DirectorySettings::load(stores.state.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.service_list, "GetServices");
    assert_eq!(stored.endpoint, "https://directory.example/service.asmx");
}

#[tokio::test]
async fn manual_sync_is_accepted() {
    let (app, _) = seeded_app().await;
    let request = Request::post("/api/admin/sync").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "scheduled");
}
