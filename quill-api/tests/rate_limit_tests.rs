//! Fixed-window rate limiting through the full router.

use std::time::Duration;

use axum::http::{header, HeaderValue, Method, StatusCode};
use quill_api::ratelimit::RateLimitRule;
use quill_api::ApiConfig;
use quill_test_utils::app::{body_json, request, test_config, TestApp};
use uuid::Uuid;

fn limited(limit: u32) -> TestApp {
    TestApp::with_config(ApiConfig {
        rate_limit_enabled: true,
        rate_limit_rules: vec![RateLimitRule::new(
            "/notes",
            limit,
            Duration::from_secs(60),
        )],
        ..test_config()
    })
}

#[tokio::test]
async fn requests_over_the_limit_get_429() {
    let app = limited(5);

    for expected_remaining in (0..5).rev() {
        let response = app.get("/notes", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("x-ratelimit-limit"),
            Some(&HeaderValue::from_static("5"))
        );
        assert_eq!(
            response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok()),
            Some(expected_remaining.to_string().as_str())
        );
    }

    let rejected = app.get("/notes", None).await;
    assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        rejected.headers().get(header::RETRY_AFTER),
        Some(&HeaderValue::from_static("60"))
    );
    assert_eq!(
        rejected.headers().get("x-ratelimit-remaining"),
        Some(&HeaderValue::from_static("0"))
    );
    let body = body_json(rejected).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");
}

#[tokio::test]
async fn window_resets_after_it_elapses() {
    let app = limited(2);
    for _ in 0..2 {
        assert_eq!(app.get("/notes", None).await.status(), StatusCode::OK);
    }
    assert_eq!(
        app.get("/notes", None).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    app.clock.advance(Duration::from_secs(61));
    assert_eq!(app.get("/notes", None).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn prefix_rule_shares_one_counter() {
    let app = limited(2);
    let missing = format!("/notes/{}", Uuid::now_v7());

    assert_eq!(app.get("/notes", None).await.status(), StatusCode::OK);
    assert_eq!(app.get(&missing, None).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        app.get("/notes", None).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn users_and_addresses_are_counted_separately() {
    let app = limited(1);
    let alice = app.token(Uuid::now_v7());
    let bob = app.token(Uuid::now_v7());

    assert_eq!(app.get("/notes", Some(&alice)).await.status(), StatusCode::OK);
    assert_eq!(
        app.get("/notes", Some(&alice)).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(app.get("/notes", Some(&bob)).await.status(), StatusCode::OK);

    let mut from_proxy = request(Method::GET, "/notes", None, None);
    from_proxy
        .headers_mut()
        .insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
    assert_eq!(app.send(from_proxy).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn unmatched_paths_use_the_fallback_rule() {
    let app = limited(1);
    for _ in 0..3 {
        assert_eq!(app.get("/health/ping", None).await.status(), StatusCode::OK);
    }
}
