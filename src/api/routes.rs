//! Router composition.
//!
//! Authenticated routes sit behind the rate-limit + API-key middleware; the
//! admin subtree adds HTTP Basic on top; `/` and `/health` stay public.

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::api::{admin, curated, memory, multi, AppState};
use crate::security::{auth, SecurityState};

/// Build the authenticated API router (everything except `/` and `/health`).
/// `mcp` is the pre-nested MCP router; merging it here puts the JSON-RPC
/// endpoint behind the same rate-limit and API-key stack as the REST surface.
pub fn protected_router(
    state: AppState,
    security: SecurityState,
    mcp: Router<AppState>,
) -> Router {
    let admin_routes = Router::new()
        .route("/api/v1/admin/flush/memories", post(admin::flush_memories))
        .route("/api/v1/admin/recreate/indexes", post(admin::recreate_indexes))
        .route("/api/v1/admin/status", get(admin::status))
        .layer(middleware::from_fn_with_state(
            security.clone(),
            auth::admin_middleware,
        ));

    Router::new()
        // Single-agent surface
        .route("/cam/store", post(memory::store))
        .route("/cam/retrieve", post(memory::retrieve))
        .route("/cam/memory/{id}", get(memory::get_memory))
        .route("/cam/memory/{id}/annotate", post(memory::annotate))
        .route("/cam/memory/{id}/annotations", get(memory::annotations))
        // Multi-entity surface
        .route("/cam/multi/store", post(multi::store))
        .route("/cam/multi/retrieve", post(multi::retrieve))
        .route("/cam/multi/memory/{id}", get(multi::get_memory))
        .route("/cam/multi/situations/{entity_id}", get(multi::situations))
        // Curated surface
        .route("/cam/curated/analyze", post(curated::analyze))
        .route("/cam/curated/store", post(curated::store))
        .route("/cam/curated/retrieve", post(curated::retrieve))
        .route("/cam/curated/stats/{entity_id}", get(curated::stats))
        .merge(admin_routes)
        .merge(mcp)
        .layer(middleware::from_fn_with_state(
            security,
            auth::security_middleware,
        ))
        .with_state(state)
}

/// Public router: liveness and service description.
pub fn public_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .with_state(state)
}

/// GET / — service description.
async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "name": "engram",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "description": "Witness-scoped semantic memory service for AI agents",
        "features": ["single-agent", "multi-entity", "witness-based-access", "curation", "mcp"],
    }))
}

/// GET /health — unauthenticated liveness; 503 when the store is unhealthy.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.health().await {
        Ok(report) if report.integrity_ok => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected",
                "vector_index": report.sqlite_vec_version,
                "memories": report.memory_count,
            })),
        ),
        Ok(report) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "error": report.integrity_details,
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unhealthy", "error": e.to_string() })),
        ),
    }
}
