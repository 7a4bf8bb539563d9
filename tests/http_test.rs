use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use engram::config::EngramConfig;
use engram::curator::FallbackCurator;
use engram::db;
use engram::embedding::deterministic::StaticEmbedding;
use engram::engine::MemoryEngine;
use engram::server;

const DIMS: usize = 8;
const API_KEY: &str = "test-secret-key";

/// Router with auth enabled and a tight per-minute limit for S5.
fn test_app(max_per_minute: u32) -> axum::Router {
    let mut config = EngramConfig::default();
    config.vector.dimensions = DIMS;
    config.cleanup.enabled = false;
    config.security.api_secret_key = Some(API_KEY.to_string());
    config.security.enable_auth = true;
    config.security.max_requests_per_minute = max_per_minute;
    let config = Arc::new(config);

    let conn = db::open_memory_database(DIMS).unwrap();
    let engine = Arc::new(MemoryEngine::new(
        conn,
        Arc::new(StaticEmbedding::new(DIMS)),
        Arc::new(FallbackCurator),
        Arc::clone(&config),
    ));
    server::build_router(engine, config)
}

fn get(uri: &str, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, api_key: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let app = test_app(60);
    let response = app.oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn protected_routes_require_api_key() {
    let app = test_app(60);

    let response = app
        .clone()
        .oneshot(get("/cam/memory/mem-000000000000", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(get("/cam/memory/mem-000000000000", Some("wrong-key")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Correct key gets through to the handler (which reports NotFound).
    let response = app
        .oneshot(get("/cam/memory/mem-000000000000", Some(API_KEY)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// S5: the M-th request in a minute succeeds, the (M+1)-th gets 429 with a
/// retry hint.
#[tokio::test]
async fn rate_limit_boundary() {
    let app = test_app(3);

    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(get("/cam/memory/mem-000000000000", Some(API_KEY)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    let response = app
        .oneshot(get("/cam/memory/mem-000000000000", Some(API_KEY)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    let body = body_json(response).await;
    assert!(body["error"]["retry_after_seconds"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn store_and_retrieve_over_http() {
    let app = test_app(60);

    let vector: Vec<f32> = {
        let mut v = vec![0.0f32; DIMS];
        v[0] = 1.0;
        v
    };

    let response = app
        .clone()
        .oneshot(post_json(
            "/cam/multi/store",
            Some(API_KEY),
            serde_json::json!({
                "witnessed_by": ["alice", "claude"],
                "situation_type": "consultation_1to1",
                "content": { "text": "Algorithm optimization" },
                "primary_vector": &vector,
                "metadata": {
                    "timestamp": "2026-08-01T12:00:00Z",
                    "memory_type": "conversation"
                }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let stored = body_json(response).await;
    let memory_id = stored["memory_id"].as_str().unwrap().to_string();
    assert!(memory_id.starts_with("mem-"));
    assert_eq!(stored["status"], "stored");

    // Witness-scoped retrieval over HTTP
    let response = app
        .clone()
        .oneshot(post_json(
            "/cam/multi/retrieve",
            Some(API_KEY),
            serde_json::json!({
                "requesting_entity": "bob",
                "resonance_vectors": [{ "vector": &vector, "weight": 1.0 }],
                "retrieval": { "top_k": 5, "similarity_threshold": 0.0 }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["memories"].as_array().unwrap().len(), 0);
    assert_eq!(body["access_granted_count"], 0);

    let response = app
        .clone()
        .oneshot(post_json(
            "/cam/multi/retrieve",
            Some(API_KEY),
            serde_json::json!({
                "requesting_entity": "alice",
                "resonance_vectors": [{ "vector": &vector, "weight": 1.0 }],
                "retrieval": { "top_k": 5, "similarity_threshold": 0.0 }
            }),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["memories"].as_array().unwrap().len(), 1);
    assert_eq!(body["memories"][0]["memory_id"], memory_id.as_str());
    assert_eq!(body["entity_verification"]["search_scope"], "witnessed_memories_only");

    // Witness-checked point read: denial is a 404.
    let response = app
        .clone()
        .oneshot(get(
            &format!("/cam/multi/memory/{memory_id}?requesting_entity=bob"),
            Some(API_KEY),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(get(
            &format!("/cam/multi/memory/{memory_id}?requesting_entity=alice"),
            Some(API_KEY),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn script_injection_is_rejected() {
    let app = test_app(60);
    let vector = vec![0.0f32; DIMS];

    let response = app
        .oneshot(post_json(
            "/cam/multi/store",
            Some(API_KEY),
            serde_json::json!({
                "witnessed_by": ["alice"],
                "situation_type": "conversation",
                "content": { "text": "<script>alert(1)</script>" },
                "primary_vector": &vector,
                "metadata": {
                    "timestamp": "2026-08-01T12:00:00Z",
                    "memory_type": "conversation"
                }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_requires_basic_auth_on_top_of_api_key() {
    let mut config = EngramConfig::default();
    config.vector.dimensions = DIMS;
    config.cleanup.enabled = false;
    config.security.api_secret_key = Some(API_KEY.to_string());
    config.security.enable_auth = true;
    config.security.admin_username = "admin".to_string();
    config.security.admin_password = Some("hunter2".to_string());
    let config = Arc::new(config);

    let conn = db::open_memory_database(DIMS).unwrap();
    let engine = Arc::new(MemoryEngine::new(
        conn,
        Arc::new(StaticEmbedding::new(DIMS)),
        Arc::new(FallbackCurator),
        Arc::clone(&config),
    ));
    let app = server::build_router(engine, config);

    // API key alone is not enough.
    let response = app
        .clone()
        .oneshot(get("/api/v1/admin/status", Some(API_KEY)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // API key + basic credentials.
    use base64::Engine as _;
    let basic = base64::engine::general_purpose::STANDARD.encode("admin:hunter2");
    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/admin/status")
        .header("x-api-key", API_KEY)
        .header("authorization", format!("Basic {basic}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["memories"], 0);
}
