//! Profiles, health, metrics and the OpenAPI document.

use axum::http::{Method, StatusCode};
use quill_test_utils::app::{body_json, TestApp};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn profile_upsert_and_public_read() {
    let app = TestApp::new();
    let user = Uuid::now_v7();
    let token = app.token(user);

    let missing = app.get(&format!("/profiles/{}", user), None).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let response = app
        .send_json(
            Method::PUT,
            "/profiles/me",
            Some(&token),
            json!({"username": "grace", "displayName": "Grace H"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["userId"], user.to_string());
    assert_eq!(body["data"]["username"], "grace");

    let response = app.get(&format!("/profiles/{}", user), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["displayName"], "Grace H");

    let response = app
        .send_json(
            Method::PUT,
            "/profiles/me",
            Some(&token),
            json!({"displayName": "Rear Admiral"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.get(&format!("/profiles/{}", user), None).await;
    assert_eq!(
        body_json(response).await["data"]["displayName"],
        "Rear Admiral"
    );
}

#[tokio::test]
async fn username_rules_are_enforced() {
    let app = TestApp::new();
    let first = app.token(Uuid::now_v7());
    let second = app.token(Uuid::now_v7());

    let response = app
        .send_json(Method::PUT, "/profiles/me", Some(&first), json!({"username": "ada"}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send_json(Method::PUT, "/profiles/me", Some(&second), json!({"username": "ada"}))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"]["code"], "CONFLICT");

    let response = app
        .send_json(Method::PUT, "/profiles/me", Some(&second), json!({"username": "no spaces"}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .send_json(Method::PUT, "/profiles/me", None, json!({"username": "anon"}))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_reports_store_state() {
    let app = TestApp::new();

    let response = app.get("/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["details"]["database"]["status"], "healthy");

    app.repo.set_failing(true);
    let response = app.get("/health", None).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["status"], "unhealthy");
}

#[tokio::test]
async fn store_failures_surface_as_database_errors() {
    let app = TestApp::new();
    app.repo.set_failing(true);

    let response = app.get("/notes", None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "DATABASE_ERROR");
}

#[tokio::test]
async fn ping_metrics_and_openapi_are_served() {
    let app = TestApp::new();

    assert_eq!(app.get("/health/ping", None).await.status(), StatusCode::OK);
    assert_eq!(app.get("/metrics", None).await.status(), StatusCode::OK);

    let response = app.get("/openapi.json", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let doc = body_json(response).await;
    assert_eq!(doc["info"]["title"], "Quill API");
    assert!(doc["paths"]["/notes/{id}"].is_object());
}
