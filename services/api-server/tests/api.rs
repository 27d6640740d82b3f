//! Router tests over the in-memory backend.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use bauxite_api::{build_router, AppState};
use bauxite_database::Repositories;
use bauxite_utils::{AppConfig, StorageBackend};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> Router {
    let mut config = AppConfig::default();
    config.database.backend = StorageBackend::Memory;
    config.auth.jwt_secret = "router-test-secret".to_string();
    let state = AppState::new(config, Repositories::in_memory()).unwrap();
    build_router(state)
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn login(app: &Router) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"username": " admin ", "password": "admin"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["data"]["access_token"].as_str().unwrap().to_string()
}

fn mine_body(name: &str, code: &str) -> Value {
    json!({
        "name": name,
        "code": code,
        "country": "Guinea",
        "port_location": "Kamsar",
        "port_latitude": 10.65,
        "port_longitude": -14.61
    })
}

fn production_body(name: &str, year: i32, status: &str) -> Value {
    json!({
        "scenario_name": name,
        "contractual_year": year,
        "total_planned_tonnage": 14000000,
        "start_date": format!("{}-01-01", year),
        "end_date": format!("{}-12-31", year),
        "status": status
    })
}

async fn create_partner(app: &Router, token: &str, code: &str, halco: bool, minimum: Option<i64>) -> i64 {
    let (status, entity) = send(
        app,
        Method::POST,
        "/api/partner-entities",
        Some(token),
        Some(json!({"name": format!("Entity {}", code), "code": code, "is_halco_buyer": halco})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", entity);

    let (status, partner) = send(
        app,
        Method::POST,
        "/api/partners",
        Some(token),
        Some(json!({
            "entity_id": entity["data"]["id"],
            "name": format!("Partner {}", code),
            "code": format!("{}-P", code),
            "minimum_contractual_tonnage": minimum
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", partner);
    partner["data"]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_is_public() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["checks"]["storage"]["backend"], "memory");
}

#[tokio::test]
async fn test_login_rules() {
    let app = app();

    let (status, body) = send(&app, Method::POST, "/api/auth/login", None, Some(json!({"username": "admin"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0], "Username and password are required");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"username": "admin", "password": "nope"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"username": "admin", "password": "admin"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["token_type"], "Bearer");
    assert_eq!(body["data"]["expires_in"], 3600);
}

#[tokio::test]
async fn test_protected_routes_need_bearer_token() {
    let app = app();

    let (status, _) = send(&app, Method::GET, "/api/mines", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::GET, "/api/mines", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/api/mines")
        .header(header::AUTHORIZATION, "Token abc")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = app();
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "abc-123")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "abc-123");
}

#[tokio::test]
async fn test_mine_lifecycle() {
    let app = app();
    let token = login(&app).await;
    let token = Some(token.as_str());

    let mut body = mine_body("Sangaredi", "SNG");
    body["products"] = json!([{"name": "CBG Standard"}, {"name": "CBG Fines", "code": "FINES"}]);
    let (status, created) = send(&app, Method::POST, "/api/mines", token, Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", created);
    assert_eq!(created["data"]["products_count"], 2);
    assert_eq!(created["data"]["created_by"], "admin");
    let id = created["data"]["id"].as_i64().unwrap();

    let (status, duplicate) = send(&app, Method::POST, "/api/mines", token, Some(mine_body("Sangaredi", "OTHER"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(duplicate["message"], "A mine with the name 'Sangaredi' already exists");

    let (status, updated) = send(
        &app,
        Method::PATCH,
        &format!("/api/mines/{}", id),
        token,
        Some(json!({"port_berths": 3, "code": null})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"]["port_berths"], 3);
    assert!(updated["data"]["code"].is_null());

    let (status, _) = send(&app, Method::DELETE, &format!("/api/mines/{}", id), token, None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, listing) = send(&app, Method::GET, "/api/mines", token, None).await;
    assert_eq!(listing["metadata"]["total"], 0);
    let (status, _) = send(&app, Method::GET, &format!("/api/mines/{}", id), token, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, products) = send(&app, Method::GET, &format!("/api/products?mine_id={}", id), token, None).await;
    assert_eq!(products["metadata"]["total"], 2);

    let (status, _) = send(&app, Method::POST, &format!("/api/mines/{}/restore", id), token, None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, listing) = send(&app, Method::GET, "/api/mines?include_products=true", token, None).await;
    assert_eq!(listing["metadata"]["total"], 1);
    assert_eq!(listing["data"][0]["products"].as_array().unwrap().len(), 2);

    let (_, statistics) = send(&app, Method::GET, "/api/mines/statistics", token, None).await;
    assert_eq!(statistics["data"]["total"], 1);
    assert_eq!(statistics["data"]["by_country"][0]["country"], "Guinea");
}

#[tokio::test]
async fn test_soft_deleted_names_stay_reserved() {
    let app = app();
    let token = login(&app).await;
    let token = Some(token.as_str());

    let mut body = mine_body("Sangaredi", "SNG");
    body["products"] = json!([{"name": "CBG Standard", "code": "CBG"}]);
    let (_, mine) = send(&app, Method::POST, "/api/mines", token, Some(body)).await;
    let mine_id = mine["data"]["id"].as_i64().unwrap();
    let (_, products) = send(&app, Method::GET, &format!("/api/products/mine/{}", mine_id), token, None).await;
    let product_id = products["data"][0]["id"].as_i64().unwrap();

    let (status, _) = send(&app, Method::DELETE, &format!("/api/products/{}", product_id), token, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/products",
        token,
        Some(json!({"mine_id": mine_id, "name": "CBG Standard"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        format!("A product named 'CBG Standard' already exists for mine {}", mine_id)
    );

    let (status, _) = send(&app, Method::DELETE, &format!("/api/mines/{}", mine_id), token, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, Method::POST, "/api/mines", token, Some(mine_body("Sangaredi", "NEW"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "A mine with the name 'Sangaredi' already exists");
    let (status, body) = send(&app, Method::POST, "/api/mines", token, Some(mine_body("Boke", "SNG"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "A mine with the code 'SNG' already exists");
}

#[tokio::test]
async fn test_mine_changes_refresh_cached_products() {
    let app = app();
    let token = login(&app).await;
    let token = Some(token.as_str());

    let mut body = mine_body("Sangaredi", "SNG");
    body["products"] = json!([{"name": "CBG Standard"}]);
    let (_, mine) = send(&app, Method::POST, "/api/mines", token, Some(body)).await;
    let mine_id = mine["data"]["id"].as_i64().unwrap();
    let (_, products) = send(&app, Method::GET, &format!("/api/products/mine/{}", mine_id), token, None).await;
    let product_uri = format!("/api/products/{}?include_mine=true", products["data"][0]["id"]);

    let (_, product) = send(&app, Method::GET, &product_uri, token, None).await;
    assert_eq!(product["data"]["mine"]["name"], "Sangaredi");

    let (status, _) = send(
        &app,
        Method::PATCH,
        &format!("/api/mines/{}", mine_id),
        token,
        Some(json!({"name": "Sangaredi North"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, product) = send(&app, Method::GET, &product_uri, token, None).await;
    assert_eq!(product["data"]["mine"]["name"], "Sangaredi North");
}

#[tokio::test]
async fn test_mine_listing_paging_and_search() {
    let app = app();
    let token = login(&app).await;
    let token = Some(token.as_str());

    for (name, code) in [("Bidikoum", "BDK"), ("Sangaredi", "SNG"), ("Kamsar North", "KMN")] {
        let (status, _) = send(&app, Method::POST, "/api/mines", token, Some(mine_body(name, code))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, page) = send(
        &app,
        Method::GET,
        "/api/mines?page=2&per_page=2&sort_by=name&sort_direction=asc",
        token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["metadata"], json!({"page": 2, "per_page": 2, "total": 3, "pages": 2}));
    assert_eq!(page["data"][0]["name"], "Sangaredi");

    let (status, _) = send(&app, Method::GET, "/api/mines?sort_by=secret", token, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::GET, "/api/mines/search", token, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0], "Search query 'q' is required");

    let (_, found) = send(&app, Method::GET, "/api/mines/search?q=SANG", token, None).await;
    assert_eq!(found["data"].as_array().unwrap().len(), 1);

    let (_, by_country) = send(&app, Method::GET, "/api/mines/country/Guinea", token, None).await;
    assert_eq!(by_country["data"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_product_names_unique_per_mine() {
    let app = app();
    let token = login(&app).await;
    let token = Some(token.as_str());

    let (_, first) = send(&app, Method::POST, "/api/mines", token, Some(mine_body("Sangaredi", "SNG"))).await;
    let (_, second) = send(&app, Method::POST, "/api/mines", token, Some(mine_body("Bidikoum", "BDK"))).await;
    let first = first["data"]["id"].as_i64().unwrap();
    let second = second["data"]["id"].as_i64().unwrap();

    let (status, _) = send(&app, Method::POST, "/api/products", token, Some(json!({"mine_id": first, "name": "CBG"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(&app, Method::POST, "/api/products", token, Some(json!({"mine_id": first, "name": "CBG"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, Method::POST, "/api/products", token, Some(json!({"mine_id": second, "name": "CBG"}))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/products/batch",
        token,
        Some(json!({"mine_id": second, "products": [{"name": "Fines"}, {"name": "Fines"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]
        .as_array()
        .unwrap()
        .contains(&json!("Duplicate product names in batch: Fines")));

    let (status, body) = send(
        &app,
        Method::PATCH,
        "/api/products/batch",
        token,
        Some(json!({"updates": [{"name": "Coarse"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0], "Update 1: 'id' is required");
}

#[tokio::test]
async fn test_single_active_scenario_per_year() {
    let app = app();
    let token = login(&app).await;
    let token = Some(token.as_str());

    let (status, first) = send(&app, Method::POST, "/api/productions", token, Some(production_body("Base", 2025, "active"))).await;
    assert_eq!(status, StatusCode::CREATED, "{}", first);
    assert_eq!(first["data"]["version"], 1);
    assert!(!first["data"]["activated_at"].is_null());

    let (status, second) = send(&app, Method::POST, "/api/productions", token, Some(production_body("Stretch", 2025, "draft"))).await;
    assert_eq!(status, StatusCode::CREATED);
    let second_id = second["data"]["id"].as_i64().unwrap();

    let (status, conflict) = send(
        &app,
        Method::POST,
        &format!("/api/productions/{}/status", second_id),
        token,
        Some(json!({"status": "active"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(conflict["errors"][0], "There is already an ACTIVE scenario for the year 2025.");

    let (status, active) = send(&app, Method::GET, "/api/productions/active?year=2025", token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active["data"]["id"], first["data"]["id"]);

    let (status, _) = send(&app, Method::GET, "/api/productions/active?year=2031", token, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/productions/{}/status", second_id),
        token,
        Some(json!({"status": "archived"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/productions/{}/status", second_id),
        token,
        Some(json!({"status": "draft"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid status transition from archived to draft");
}

#[tokio::test]
async fn test_enrollment_tonnage_and_summary() {
    let app = app();
    let token = login(&app).await;
    let token_ref = Some(token.as_str());

    let halco = create_partner(&app, &token, "HAL", true, Some(1000)).await;
    let offtaker = create_partner(&app, &token, "OFF", false, None).await;

    let mut body = production_body("Base", 2026, "draft");
    body["enrollments"] = json!([
        {"partner_id": halco, "vessel_size_t": 60000, "manual_incentive_tonnage": 500},
        {"partner_id": offtaker, "vessel_size_t": 45000, "minimum_tonnage": 200, "adjusted_tonnage": 1800}
    ]);
    let (status, created) = send(&app, Method::POST, "/api/productions", token_ref, Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", created);
    let id = created["data"]["id"].as_i64().unwrap();
    assert_eq!(created["data"]["summary"]["partners_count"], 2);
    assert_eq!(created["data"]["summary"]["total_planned_tonnage"], 3300);

    let (_, summary) = send(&app, Method::GET, &format!("/api/productions/{}/summary", id), token_ref, None).await;
    let enrollments = summary["data"]["enrollments"].as_array().unwrap();
    let planned: Vec<i64> = enrollments
        .iter()
        .map(|e| e["planned_tonnage"].as_i64().unwrap())
        .collect();
    assert!(planned.contains(&1500));
    assert!(planned.contains(&1800));

    let (_, buyers) = send(
        &app,
        Method::GET,
        &format!("/api/productions/{}/partners?halco_buyer=true", id),
        token_ref,
        None,
    )
    .await;
    assert_eq!(buyers["data"].as_array().unwrap().len(), 1);
    assert_eq!(buyers["data"][0]["partner_id"], halco);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/productions/{}/enrollments", id),
        token_ref,
        Some(json!({"partner_id": halco, "vessel_size_t": 60000})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        format!("Partner {} is already enrolled in production {}", halco, id)
    );

    let enrollment_id = enrollments
        .iter()
        .find(|e| e["partner_id"] == halco)
        .and_then(|e| e["id"].as_i64())
        .unwrap();
    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/api/productions/{}/enrollments/{}", id, enrollment_id),
        token_ref,
        Some(json!({"calculated_incentive_tonnage": 100})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["errors"][0],
        "manual_incentive_tonnage and calculated_incentive_tonnage are mutually exclusive"
    );

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/api/productions/{}/enrollments/{}", id, enrollment_id),
        token_ref,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, remaining) = send(&app, Method::GET, &format!("/api/productions/{}/enrollments", id), token_ref, None).await;
    assert_eq!(remaining["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_oversized_tonnage_is_rejected() {
    let app = app();
    let token = login(&app).await;
    let partner = create_partner(&app, &token, "BIG", true, None).await;
    let token = Some(token.as_str());

    let mut body = production_body("Base", 2027, "draft");
    body["enrollments"] = json!([{
        "partner_id": partner,
        "vessel_size_t": 60000,
        "minimum_tonnage": i64::MAX,
        "manual_incentive_tonnage": 1
    }]);
    let (status, body) = send(&app, Method::POST, "/api/productions", token, Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .any(|error| error.as_str().unwrap_or_default().starts_with("Enrollment 1: ")));
    let (_, listing) = send(&app, Method::GET, "/api/productions", token, None).await;
    assert_eq!(listing["metadata"]["total"], 0);

    let (status, created) = send(&app, Method::POST, "/api/productions", token, Some(production_body("Base", 2027, "draft"))).await;
    assert_eq!(status, StatusCode::CREATED, "{}", created);
    let id = created["data"]["id"].as_i64().unwrap();
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/productions/{}/enrollments", id),
        token,
        Some(json!({"partner_id": partner, "vessel_size_t": 60000, "minimum_tonnage": 0, "adjusted_tonnage": i64::MAX})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, summary) = send(&app, Method::GET, &format!("/api/productions/{}/summary", id), token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["data"]["summary"]["partners_count"], 0);
}

#[tokio::test]
async fn test_enrollment_minimum_required_without_partner_default() {
    let app = app();
    let token = login(&app).await;
    let partner = create_partner(&app, &token, "NOMIN", false, None).await;

    let (_, production) = send(
        &app,
        Method::POST,
        "/api/productions",
        Some(token.as_str()),
        Some(production_body("Base", 2027, "planned")),
    )
    .await;
    let id = production["data"]["id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/productions/{}/enrollments", id),
        Some(token.as_str()),
        Some(json!({"partner_id": partner, "vessel_size_t": 50000})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"][0].as_str().unwrap().contains("minimum_tonnage is required"));
}

#[tokio::test]
async fn test_new_version_copies_enrollments_as_draft() {
    let app = app();
    let token = login(&app).await;
    let partner = create_partner(&app, &token, "VER", true, Some(900)).await;

    let mut body = production_body("Plan", 2028, "active");
    body["enrollments"] = json!([{"partner_id": partner, "vessel_size_t": 60000, "calculated_vld_total_tonnage": 700}]);
    let (_, source) = send(&app, Method::POST, "/api/productions", Some(token.as_str()), Some(body)).await;
    let source_id = source["data"]["id"].as_i64().unwrap();

    let (status, copy) = send(
        &app,
        Method::POST,
        &format!("/api/productions/{}/versions", source_id),
        Some(token.as_str()),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", copy);
    assert_eq!(copy["data"]["status"], "draft");
    assert_eq!(copy["data"]["version"], 2);
    assert_eq!(copy["data"]["base_scenario_id"], source_id);
    assert_eq!(copy["data"]["enrollments"][0]["calculated_vld_total_tonnage"], 0);
    assert_eq!(copy["data"]["enrollments"][0]["minimum_tonnage"], 900);
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let app = app();
    let token = login(&app).await;
    let token = Some(token.as_str());

    for uri in ["/api/mines/999", "/api/products/999", "/api/partners/999", "/api/productions/999"] {
        let (status, body) = send(&app, Method::GET, uri, token, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
        assert_eq!(body["success"], false);
    }

    let (status, _) = send(&app, Method::GET, "/api/mines/abc", token, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_exposed() {
    let app = app();
    let token = login(&app).await;
    send(&app, Method::GET, "/api/mines", Some(token.as_str()), None).await;

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("bauxite_operation_calls_total"));
}
