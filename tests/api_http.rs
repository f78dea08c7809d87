// tests/api_http.rs
//
// Thin-adapter checks through the public router: status mapping, JSON
// shapes, the verification flow and its rate limit.

use axum::{
    body::{to_bytes, Body},
    http::Request,
};
use http::StatusCode;
use serde_json::{json, Value};
use tower::ServiceExt; // for `oneshot`

use call_sentinel::app;

async fn post_json(router: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), 256 * 1024).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn get(router: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), 256 * 1024).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_endpoint_answers() {
    let router = app();
    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn screening_an_unknown_number_allows_it() {
    let router = app();
    let (status, body) = post_json(
        &router,
        "/screen",
        json!({ "phone_number": "+1 555 010 0199" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], json!("allowed"));
    assert!(body["risk"].as_f64().unwrap() < 0.40);
    assert!(body["breakdown"]["regulatory"].is_number());
    assert_eq!(body["origin"], json!("scored"));
}

#[tokio::test]
async fn malformed_numbers_get_a_400() {
    let router = app();
    let (status, _) = post_json(&router, "/screen", json!({ "phone_number": "garbage" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn batch_screening_drops_only_the_bad_entry() {
    let router = app();
    let (status, body) = post_json(
        &router,
        "/screen/batch",
        json!({ "phone_numbers": ["+15550000001", "nope", "+15550000003"] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let map = body.as_object().unwrap();
    assert_eq!(map.len(), 2);
    assert!(map.contains_key("+15550000001"));
    assert!(map.contains_key("+15550000003"));
}

#[tokio::test]
async fn reputation_endpoint_returns_the_neutral_default() {
    let router = app();
    let (status, body) = get(&router, "/reputation?number=%2B15550100199").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["score"], json!(50.0));
    let conf = body["confidence"].as_f64().unwrap();
    assert!((conf - 0.3).abs() < 1e-6);
}

#[tokio::test]
async fn verification_flow_round_trips() {
    let router = app();
    let (status, issued) = post_json(
        &router,
        "/verify/request",
        json!({ "phone_number": "+15550100199" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let code = issued["code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 6);

    let (status, checked) = post_json(
        &router,
        "/verify/check",
        json!({ "phone_number": "+15550100199", "code": code }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(checked["verified"], json!(true));

    // Consumed: the same code no longer verifies.
    let (status, rechecked) = post_json(
        &router,
        "/verify/check",
        json!({ "phone_number": "+15550100199", "code": issued["code"] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rechecked["verified"], json!(false));
}

#[tokio::test]
async fn verification_attempts_are_rate_limited() {
    let router = app();
    let _ = post_json(
        &router,
        "/verify/request",
        json!({ "phone_number": "+15550100199" }),
    )
    .await;

    // Six failed attempts pass the gate (count is inspected before each).
    for _ in 0..6 {
        let (status, _) = post_json(
            &router,
            "/verify/check",
            json!({ "phone_number": "+15550100199", "code": "wrong0" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    // The seventh sees six prior attempts and is refused.
    let (status, _) = post_json(
        &router,
        "/verify/check",
        json!({ "phone_number": "+15550100199", "code": "wrong0" }),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}
