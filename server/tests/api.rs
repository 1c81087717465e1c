use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use dramaticket_server::config::Config;
use dramaticket_server::identity::Registration;
use dramaticket_server::routes::create_routes;
use dramaticket_server::state::AppState;
use dramaticket_server::store::{Collection, MemoryStore, Store};

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    admin_token: String,
}

/// Router over an in-memory store with one registered administrator.
async fn setup() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let mut state = AppState::new(Config::default(), store.clone()).unwrap();

    let admin = state
        .identity
        .register(
            Registration {
                name: "Administración".into(),
                email: "admin@dramaticket.cl".into(),
                password: "admin123".into(),
                confirm_password: "admin123".into(),
            },
            None,
        )
        .await
        .unwrap();
    state.config = Arc::new(Config {
        admin_user_id: Some(admin.session.user_id),
        ..Config::default()
    });

    TestApp {
        router: create_routes(state),
        store,
        admin_token: admin.token,
    }
}

async fn call(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn register(app: &TestApp, name: &str, email: &str) -> String {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "name": name,
            "email": email,
            "password": "secreto1",
            "confirm_password": "secreto1",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["token"].as_str().unwrap().to_string()
}

fn event_body(title: &str, price: i64) -> Value {
    json!({
        "title": title,
        "genre": "Drama",
        "venue": "Teatro Municipal",
        "starts_at": "2030-05-01T20:00:00Z",
        "price": price,
        "description": "Una obra clásica",
        "image_url": "http://localhost:3001/uploads/event-images/obra.png",
    })
}

async fn create_event(app: &TestApp, title: &str, price: i64) -> String {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/admin/events",
        Some(&app.admin_token),
        Some(event_body(title, price)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["id"].as_str().unwrap().to_string()
}

fn valid_card() -> Value {
    json!({
        "card_number": "4111 1111 1111 1111",
        "card_holder": "Ana Pérez",
        "expiry": "12/39",
        "cvc": "123",
    })
}

fn seat_state(map: &Value, label: &str) -> String {
    map["rows"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|row| row["seats"].as_array().unwrap())
        .find(|cell| cell["label"] == label)
        .map(|cell| cell["state"].as_str().unwrap().to_string())
        .unwrap()
}

async fn select(app: &TestApp, token: &str, event_id: &str, labels: &[&str]) {
    for label in labels {
        let uri = format!("/api/events/{event_id}/seats/{label}/toggle");
        let (status, body) = call(app, Method::POST, &uri, Some(token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["toggle"]["outcome"], "selected");
    }
}

#[tokio::test]
async fn test_health_check_carries_security_headers() {
    let app = setup().await;
    let response = app
        .router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["x-frame-options"], "DENY");
}

#[tokio::test]
async fn test_full_purchase_flow() {
    let app = setup().await;
    let event_id = create_event(&app, "Hamlet", 15000).await;
    let buyer = register(&app, "Ana", "ana@teatro.cl").await;

    let (status, body) = call(&app, Method::GET, &format!("/api/events/{event_id}/seats"), Some(&buyer), None).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body["data"]["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|row| row["seats"].as_array().unwrap().len() == 10));
    assert_eq!(body["data"]["can_continue"], false);

    select(&app, &buyer, &event_id, &["B2", "A1"]).await;

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/events/{event_id}/seats/continue"),
        Some(&buyer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["seats"], json!(["A1", "B2"]));
    assert_eq!(body["data"]["quantity"], 2);
    assert_eq!(body["data"]["total_amount"], "30000");

    let (status, body) = call(&app, Method::GET, "/api/checkout", Some(&buyer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["event_title"], "Hamlet");

    let (status, body) = call(&app, Method::POST, "/api/checkout", Some(&buyer), Some(valid_card())).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let confirmation = &body["data"];
    assert_eq!(confirmation["card_last4"], "1111");
    assert_eq!(confirmation["status"], "completed");
    assert_eq!(confirmation["seats"], json!(["A1", "B2"]));
    let scan: Value = serde_json::from_str(confirmation["qr_content"].as_str().unwrap()).unwrap();
    assert_eq!(scan["purchase_id"], confirmation["purchase_id"]);
    assert_eq!(scan["seats"], json!(["A1", "B2"]));

    let (status, _) = call(&app, Method::GET, "/api/checkout", Some(&buyer), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = call(&app, Method::GET, "/api/confirmation", Some(&buyer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["purchase_id"], confirmation["purchase_id"]);

    let (_, body) = call(&app, Method::GET, &format!("/api/events/{event_id}/seats"), None, None).await;
    assert_eq!(seat_state(&body["data"], "A1"), "occupied");
    assert_eq!(seat_state(&body["data"], "B2"), "occupied");
    assert_eq!(seat_state(&body["data"], "A2"), "available");

    let (status, body) = call(&app, Method::GET, "/api/account", Some(&buyer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["profile"]["name"], "Ana");
    assert_eq!(body["data"]["purchases"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_sold_seat_cannot_be_selected_by_another_buyer() {
    let app = setup().await;
    let event_id = create_event(&app, "Yerma", 9000).await;
    let first = register(&app, "Ana", "ana@teatro.cl").await;
    let second = register(&app, "Luis", "luis@teatro.cl").await;

    select(&app, &second, &event_id, &["C3"]).await;
    select(&app, &first, &event_id, &["C3"]).await;
    call(&app, Method::POST, &format!("/api/events/{event_id}/seats/continue"), Some(&first), None).await;
    let (status, _) = call(&app, Method::POST, "/api/checkout", Some(&first), Some(valid_card())).await;
    assert_eq!(status, StatusCode::CREATED);

    // The second buyer's pending selection is dropped on the next view.
    let (_, body) = call(&app, Method::GET, &format!("/api/events/{event_id}/seats"), Some(&second), None).await;
    assert_eq!(body["data"]["dropped"], json!(["C3"]));
    assert_eq!(body["data"]["quantity"], 0);

    let uri = format!("/api/events/{event_id}/seats/C3/toggle");
    let (_, body) = call(&app, Method::POST, &uri, Some(&second), None).await;
    assert_eq!(body["data"]["toggle"]["outcome"], "ignored");
    assert_eq!(body["data"]["toggle"]["reason"], "occupied");
}

#[tokio::test]
async fn test_invalid_payment_writes_nothing() {
    let app = setup().await;
    let event_id = create_event(&app, "Hamlet", 15000).await;
    let buyer = register(&app, "Ana", "ana@teatro.cl").await;
    select(&app, &buyer, &event_id, &["A1"]).await;
    call(&app, Method::POST, &format!("/api/events/{event_id}/seats/continue"), Some(&buyer), None).await;

    let mut card = valid_card();
    card["expiry"] = json!("13/30");
    let (status, body) = call(&app, Method::POST, "/api/checkout", Some(&buyer), Some(card)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    assert!(app.store.list_purchases().await.unwrap().is_empty());
    let (status, _) = call(&app, Method::GET, "/api/checkout", Some(&buyer), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_denied_purchase_write_reports_permission() {
    let app = setup().await;
    let event_id = create_event(&app, "Hamlet", 15000).await;
    let buyer = register(&app, "Ana", "ana@teatro.cl").await;
    select(&app, &buyer, &event_id, &["A1"]).await;
    call(&app, Method::POST, &format!("/api/events/{event_id}/seats/continue"), Some(&buyer), None).await;

    app.store.deny_writes(Collection::Purchases);
    let (status, body) = call(&app, Method::POST, "/api/checkout", Some(&buyer), Some(valid_card())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_guests_cannot_select_or_continue() {
    let app = setup().await;
    let event_id = create_event(&app, "Hamlet", 15000).await;

    let uri = format!("/api/events/{event_id}/seats/A1/toggle");
    let (status, body) = call(&app, Method::POST, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["toggle"]["reason"], "sign_in_required");

    let (status, body) = call(&app, Method::POST, &format!("/api/events/{event_id}/seats/continue"), None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "LOGIN_REQUIRED");
    assert!(body["error"]["details"]["login_url"]
        .as_str()
        .unwrap()
        .starts_with("/login?redirect=%2Fapi%2Fevents%2F"));

    let (_, anonymous) = call(&app, Method::POST, "/api/auth/anonymous", None, None).await;
    let token = anonymous["data"]["token"].as_str().unwrap();
    let (_, body) = call(&app, Method::POST, &uri, Some(token), None).await;
    assert_eq!(body["data"]["toggle"]["reason"], "sign_in_required");
}

#[tokio::test]
async fn test_unknown_event_is_not_found() {
    let app = setup().await;
    let uri = format!("/api/events/{}/seats", uuid::Uuid::new_v4());
    let (status, body) = call(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_catalog_listing_and_search() {
    let app = setup().await;
    for title in ["Hamlet", "Yerma", "La Celestina", "Bodas de Sangre"] {
        create_event(&app, title, 12000).await;
    }

    let (_, body) = call(&app, Method::GET, "/api/events", None, None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 4);
    let (_, body) = call(&app, Method::GET, "/api/events/featured", None, None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    let (_, body) = call(&app, Method::GET, "/api/events/search?q=YER", None, None).await;
    let found = body["data"].as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["title"], "Yerma");

    let (_, body) = call(&app, Method::GET, "/api/events/search?q=", None, None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 4);

    let id = found[0]["id"].as_str().unwrap();
    let (_, body) = call(&app, Method::GET, &format!("/api/events/{id}"), None, None).await;
    assert_eq!(body["data"]["price_label"], "CLP$12000");
    assert_eq!(body["data"]["date_label"], "1 de mayo de 2030 20:00 hs.");
}

#[tokio::test]
async fn test_admin_routes_reject_members() {
    let app = setup().await;
    let member = register(&app, "Ana", "ana@teatro.cl").await;

    let (status, body) = call(&app, Method::GET, "/api/admin/stats", Some(&member), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "ADMIN_ONLY");
    assert_eq!(body["error"]["details"]["redirect"], "/");

    let (status, _) = call(&app, Method::GET, "/api/admin/stats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_price_change_requires_justification() {
    let app = setup().await;
    let event_id = create_event(&app, "Hamlet", 15000).await;
    let uri = format!("/api/admin/events/{event_id}");

    let (status, _) = call(&app, Method::PUT, &uri, Some(&app.admin_token), Some(event_body("Hamlet", 18000))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, body) = call(&app, Method::GET, &uri, Some(&app.admin_token), None).await;
    assert_eq!(body["data"]["price"], "15000");

    let mut justified = event_body("Hamlet", 18000);
    justified["price_change_justification"] = json!("Temporada alta");
    let (status, body) = call(&app, Method::PUT, &uri, Some(&app.admin_token), Some(justified)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["price"], "18000");
    assert_eq!(body["data"]["price_change_justification"], "Temporada alta");

    let (_, body) = call(&app, Method::GET, "/api/admin/audit", Some(&app.admin_token), None).await;
    let actions: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions, vec!["EVENT_UPDATE", "EVENT_CREATE"]);
}

#[tokio::test]
async fn test_delete_event_cascades_through_the_api() {
    let app = setup().await;
    let event_id = create_event(&app, "Hamlet", 15000).await;
    let buyer = register(&app, "Ana", "ana@teatro.cl").await;
    select(&app, &buyer, &event_id, &["A1"]).await;
    call(&app, Method::POST, &format!("/api/events/{event_id}/seats/continue"), Some(&buyer), None).await;
    call(&app, Method::POST, "/api/checkout", Some(&buyer), Some(valid_card())).await;

    let uri = format!("/api/admin/events/{event_id}");
    let (status, body) = call(&app, Method::DELETE, &uri, Some(&app.admin_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["seats_deleted"], 50);
    assert_eq!(body["data"]["purchases_deleted"], 1);

    let (status, _) = call(&app, Method::GET, &format!("/api/events/{event_id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.store.list_purchases().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_purchase_export_is_a_csv_attachment() {
    let app = setup().await;
    let event_id = create_event(&app, "Hamlet", 15000).await;
    let buyer = register(&app, "Ana", "ana@teatro.cl").await;
    select(&app, &buyer, &event_id, &["A1", "A2"]).await;
    call(&app, Method::POST, &format!("/api/events/{event_id}/seats/continue"), Some(&buyer), None).await;
    call(&app, Method::POST, "/api/checkout", Some(&buyer), Some(valid_card())).await;

    let request = Request::get("/api/admin/purchases/export")
        .header(header::AUTHORIZATION, format!("Bearer {}", app.admin_token))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/csv"));
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment; filename=\"compras_DramaTicket_"));

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let csv = String::from_utf8(bytes.to_vec()).unwrap();
    let lines: Vec<&str> = csv.split("\r\n").collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("\"ID Compra\";\"UID Usuario\""));
    assert!(lines[1].contains("\"A1, A2\""));
}

#[tokio::test]
async fn test_statistics_summarise_sales() {
    let app = setup().await;
    let event_id = create_event(&app, "Hamlet", 15000).await;
    let buyer = register(&app, "Ana", "ana@teatro.cl").await;
    select(&app, &buyer, &event_id, &["A1", "A2", "A3"]).await;
    call(&app, Method::POST, &format!("/api/events/{event_id}/seats/continue"), Some(&buyer), None).await;
    call(&app, Method::POST, "/api/checkout", Some(&buyer), Some(valid_card())).await;

    let (status, body) = call(&app, Method::GET, "/api/admin/stats", Some(&app.admin_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_events"], 1);
    assert_eq!(body["data"]["total_users"], 2);
    assert_eq!(body["data"]["tickets_sold"], 3);
    assert_eq!(body["data"]["total_revenue"], "45000");
    assert_eq!(body["data"]["top_events"][0]["title"], "Hamlet");
}

#[tokio::test]
async fn test_sign_out_revokes_the_token() {
    let app = setup().await;
    let token = register(&app, "Ana", "ana@teatro.cl").await;

    let (status, body) = call(&app, Method::GET, "/api/auth/session", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_admin"], false);

    let (status, _) = call(&app, Method::POST, "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, Method::GET, "/api/auth/session", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "ANA@teatro.cl", "password": "secreto1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["session"]["name"], "Ana");
}

#[tokio::test]
async fn test_registration_rejects_duplicates_and_mismatches() {
    let app = setup().await;
    register(&app, "Ana", "ana@teatro.cl").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "name": "Otra Ana",
            "email": "ana@teatro.cl",
            "password": "secreto1",
            "confirm_password": "secreto1",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "name": "Luis",
            "email": "luis@teatro.cl",
            "password": "secreto1",
            "confirm_password": "secreto2",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_session_cache_round_trip_and_key_rules() {
    let app = setup().await;
    let token = register(&app, "Ana", "ana@teatro.cl").await;

    let (status, _) = call(&app, Method::PUT, "/api/cache/filters", Some(&token), Some(json!({ "genre": "Drama" }))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = call(&app, Method::GET, "/api/cache/filters", Some(&token), None).await;
    assert_eq!(body["data"]["genre"], "Drama");

    let other = register(&app, "Luis", "luis@teatro.cl").await;
    let (status, _) = call(&app, Method::GET, "/api/cache/filters", Some(&other), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, Method::DELETE, "/api/cache/filters", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, Method::GET, "/api/cache/filters", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, Method::PUT, "/api/cache/bad%20key", Some(&token), Some(json!(1))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_live_seat_map_streams_snapshots() {
    let app = setup().await;
    let event_id = create_event(&app, "Hamlet", 15000).await;

    let request = Request::get(format!("/api/events/{event_id}/seats/live"))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let mut frames = response.into_body().into_data_stream();
    let first = tokio::time::timeout(Duration::from_secs(5), frames.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let first = String::from_utf8(first.to_vec()).unwrap();
    assert!(first.contains("event: seats"));
    assert!(!first.contains("occupied"));

    let buyer = register(&app, "Ana", "ana@teatro.cl").await;
    select(&app, &buyer, &event_id, &["E10"]).await;
    call(&app, Method::POST, &format!("/api/events/{event_id}/seats/continue"), Some(&buyer), None).await;
    call(&app, Method::POST, "/api/checkout", Some(&buyer), Some(valid_card())).await;

    let next = tokio::time::timeout(Duration::from_secs(5), frames.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let next = String::from_utf8(next.to_vec()).unwrap();
    assert!(next.contains("\"label\":\"E10\",\"number\":10,\"state\":\"occupied\""));
}

#[tokio::test]
async fn test_purchase_flow_keys_cannot_be_written_by_clients() {
    let app = setup().await;
    let event_id = create_event(&app, "Hamlet", 15000).await;
    let buyer = register(&app, "Ana", "ana@teatro.cl").await;
    let (_, session) = call(&app, Method::GET, "/api/auth/session", Some(&buyer), None).await;

    let forged = json!({
        "event_id": event_id,
        "event_title": "Hamlet",
        "event_date": "2030-05-01T20:00:00Z",
        "event_venue": "Teatro Municipal",
        "unit_price": "0",
        "seats": ["Z99", "A1"],
        "quantity": 2,
        "total_amount": "0",
        "user_id": session["data"]["user_id"],
    });
    let (status, body) = call(&app, Method::PUT, "/api/cache/currentPurchase", Some(&buyer), Some(forged)).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    let (status, _) = call(&app, Method::DELETE, "/api/cache/lastPurchaseConfirmation", Some(&buyer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, Method::POST, "/api/checkout", Some(&buyer), Some(valid_card())).await;
    assert_ne!(status, StatusCode::CREATED);
    assert!(app.store.list_purchases().await.unwrap().is_empty());

    select(&app, &buyer, &event_id, &["A1"]).await;
    call(&app, Method::POST, &format!("/api/events/{event_id}/seats/continue"), Some(&buyer), None).await;
    let (status, body) = call(&app, Method::POST, "/api/checkout", Some(&buyer), Some(valid_card())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["total_amount"], "15000");

    let seats = app
        .store
        .list_seats(event_id.parse().unwrap())
        .await
        .unwrap();
    assert_eq!(seats.len(), 50);
}

#[tokio::test]
async fn test_same_seat_bought_twice_keeps_both_purchases() {
    let app = setup().await;
    let event_id = create_event(&app, "Bodas de Sangre", 12000).await;
    let first = register(&app, "Ana", "ana@teatro.cl").await;
    let second = register(&app, "Luis", "luis@teatro.cl").await;

    for token in [&first, &second] {
        select(&app, token, &event_id, &["D7"]).await;
        let (status, _) = call(
            &app,
            Method::POST,
            &format!("/api/events/{event_id}/seats/continue"),
            Some(token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (a, b) = tokio::join!(
        call(&app, Method::POST, "/api/checkout", Some(&first), Some(valid_card())),
        call(&app, Method::POST, "/api/checkout", Some(&second), Some(valid_card())),
    );
    assert_eq!(a.0, StatusCode::CREATED, "{}", a.1);
    assert_eq!(b.0, StatusCode::CREATED, "{}", b.1);

    let purchases = app.store.list_purchases().await.unwrap();
    assert_eq!(purchases.len(), 2);

    let seats = app
        .store
        .list_seats(event_id.parse().unwrap())
        .await
        .unwrap();
    assert_eq!(seats.len(), 50);
    let seat = seats.iter().find(|s| s.label == "D7").unwrap();
    assert!(seat.is_occupied());
    let owner = seat.purchase_id.unwrap();
    assert!(purchases.iter().any(|p| p.id == owner));
    assert_eq!(seats.iter().filter(|s| s.is_occupied()).count(), 1);
}
