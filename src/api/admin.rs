//! Admin endpoints: `/api/v1/admin/*`.
//!
//! Behind HTTP Basic Auth plus the regular API key. These operate on the
//! store directly and never go through the witness predicate — they exist for
//! operational recovery, not data access.

use axum::extract::State;
use axum::Json;
use serde_json::json;
use tracing::warn;

use crate::api::error::ApiResult;
use crate::api::AppState;

/// POST /api/v1/admin/flush/memories — drop all records, preserve the index
/// definitions.
pub async fn flush_memories(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let deleted = state.engine.flush_memories().await?;
    warn!(deleted, "admin flushed all memories");
    Ok(Json(json!({ "status": "flushed", "deleted": deleted })))
}

/// POST /api/v1/admin/recreate/indexes — rebuild the vector index from stored
/// embeddings.
pub async fn recreate_indexes(
    State(state): State<AppState>,
) -> ApiResult<Json<serde_json::Value>> {
    let reindexed = state.engine.recreate_indexes().await?;
    warn!(reindexed, "admin recreated vector index");
    Ok(Json(json!({ "status": "recreated", "reindexed": reindexed })))
}

/// GET /api/v1/admin/status — counts and health.
pub async fn status(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let health = state.engine.health().await?;
    let stats = state.engine.stats().await?;
    Ok(Json(json!({
        "healthy": health.integrity_ok,
        "schema_version": health.schema_version,
        "vector_dimensions": health.vector_dimensions,
        "sqlite_vec_version": health.sqlite_vec_version,
        "memories": stats.total_memories,
        "by_type": stats.by_type,
        "situations": stats.total_situations,
        "annotations": stats.total_annotations,
    })))
}
