//! Router tests that never reach the database.
//!
//! Every request here is rejected (or answered) before a handler issues a
//! query, so the pool is lazy and the database need not exist.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use lore_api::{
    build_rate_limiter, config::RateLimitConfig, handlers::notes::run_tagging,
    handlers::notes::TaggingReport, router, AppState,
};
use lore_db::{create_lazy_pool, test_fixtures::DEFAULT_TEST_DATABASE_URL, Database, PoolConfig};
use lore_tagger::mock::MockTagger;

fn lazy_state() -> AppState {
    let pool = create_lazy_pool(DEFAULT_TEST_DATABASE_URL, PoolConfig::default())
        .expect("lazy pool");
    AppState::new(Database::new(pool))
}

fn app() -> Router {
    router(lazy_state())
}

fn request(method: Method, uri: &str, owner: Option<&str>, body: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(owner) = owner {
        builder = builder.header("x-user-id", owner);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_missing_owner_header_is_unauthorized() {
    let (status, body) = send(app(), request(Method::GET, "/notes", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("X-User-Id"));
}

#[tokio::test]
async fn test_non_numeric_owner_header_is_unauthorized() {
    let (status, _) = send(
        app(),
        request(Method::GET, "/nodes/7", Some("gandalf"), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_non_numeric_path_id_is_bad_request() {
    let (status, body) = send(
        app(),
        request(Method::GET, "/nodes/abc", Some("1"), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_list_by_unknown_type_is_bad_request() {
    let (status, body) = send(
        app(),
        request(Method::GET, "/entities/by-type/DRAGONISH", Some("1"), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("DRAGONISH"));
}

#[tokio::test]
async fn test_retag_rejects_unknown_type_and_blank_name() {
    let (status, _) = send(
        app(),
        request(
            Method::POST,
            "/retag-entity-everywhere",
            Some("1"),
            Some(r#"{"name": "Gandalf", "type": "WIZARDISH"}"#),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        app(),
        request(
            Method::POST,
            "/retag-entity-everywhere",
            Some("1"),
            Some(r#"{"name": "   ", "type": "PERSON"}"#),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("name"));
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let (status, body) = send(
        app(),
        request(Method::POST, "/nodes", Some("1"), Some("{\"name\": ")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_add_mention_rejects_empty_span() {
    let (status, _) = send(
        app(),
        request(
            Method::POST,
            "/notes/3/mentions/add",
            Some("1"),
            Some(r#"{"name_segment": "torch", "type": "ITEM", "start_pos": 5, "end_pos": 5}"#),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_correct_mention_requires_both_positions() {
    let (status, body) = send(
        app(),
        request(
            Method::POST,
            "/mentions/9/correct",
            Some("1"),
            Some(r#"{"new_type": "PERSON", "note_id": 3, "start_pos": 4}"#),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("together"));
}

#[tokio::test]
async fn test_update_note_without_fields_is_bad_request() {
    let (status, _) = send(
        app(),
        request(Method::PUT, "/notes/3", Some("1"), Some("{}")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let (status, body) = send(app(), request(Method::GET, "/openapi.json", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/nodes/{id}/type"].is_object());
    assert!(body["paths"]["/entities/player-characters-detailed"]["get"].is_object());
}

#[tokio::test]
async fn test_player_characters_detailed_requires_owner() {
    let (status, _) = send(
        app(),
        request(Method::GET, "/entities/player-characters-detailed", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_rate_limit_returns_429_json() {
    let limiter = build_rate_limiter(RateLimitConfig {
        requests: 1,
        period_secs: 60,
    })
    .unwrap();
    let app = router(lazy_state().with_rate_limiter(limiter));

    let (first, _) = send(app.clone(), request(Method::GET, "/openapi.json", None, None)).await;
    assert_eq!(first, StatusCode::OK);

    let (second, body) = send(app, request(Method::GET, "/openapi.json", None, None)).await;
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].is_string());
}

fn sample_note() -> lore_core::Note {
    let now = chrono::Utc::now();
    lore_core::Note {
        id: 11,
        owner_id: 4,
        title: None,
        content: "Aria met Bree at the Prancing Pony.".to_string(),
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn test_tagging_disabled_without_tagger() {
    let report = run_tagging(&lazy_state(), &sample_note()).await;
    assert_eq!(report, TaggingReport::Disabled);
}

#[tokio::test]
async fn test_tagger_failure_is_reported_not_raised() {
    let tagger = MockTagger::new().failing("sidecar down");
    let state = lazy_state().with_tagger(Arc::new(tagger.clone()));

    let report = run_tagging(&state, &sample_note()).await;
    match report {
        TaggingReport::Failed { error } => assert!(error.contains("sidecar down")),
        other => panic!("expected failure report, got {:?}", other),
    }

    let calls = tagger.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].note_id, 11);
    assert_eq!(calls[0].user_id, 4);
}
