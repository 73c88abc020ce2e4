use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

use adaptix_api::{create_router, AppState};

mod common;
use common::{questions_json, sample_test, test_config, InMemoryStore, ScriptedClient};

fn test_app(store: InMemoryStore, client: ScriptedClient) -> axum::Router {
    let state = Arc::new(AppState::with_parts(
        test_config(),
        Arc::new(store),
        Arc::new(client),
    ));
    create_router(state)
}

#[tokio::test]
async fn health_endpoint_reports_quota_state() {
    let app = test_app(InMemoryStore::new(), ScriptedClient::new());

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["dependencies"]["ai_quota"]["daily_limit"], 100);
}

#[tokio::test]
async fn starting_an_attempt_over_http_returns_the_batch() {
    let store = InMemoryStore::new().with_test(sample_test("t1", "algebra", 10, 5));
    let client = ScriptedClient::new().final_text(questions_json(5, "easy", "algebra"));
    let app = test_app(store, client);

    let body = json!({ "learner_id": "learner-1" });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/tests/t1/attempts")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    if status != StatusCode::CREATED {
        panic!(
            "unexpected status {} body {}",
            status,
            String::from_utf8_lossy(&body)
        );
    }

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["questions"].as_array().unwrap().len(), 5);
    assert_eq!(json["session_number"], 1);
    assert_eq!(json["total_sessions"], 2);
    assert_eq!(json["used_fallback"], false);
}

#[tokio::test]
async fn unknown_test_maps_to_404() {
    let app = test_app(InMemoryStore::new(), ScriptedClient::new());

    let body = json!({ "learner_id": "learner-1" });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/tests/missing/attempts")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn insights_for_unknown_attempt_map_to_404() {
    let app = test_app(InMemoryStore::new(), ScriptedClient::new());

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/v1/attempts/nope/insights")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_endpoint_requires_basic_auth() {
    let app = test_app(InMemoryStore::new(), ScriptedClient::new());

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
