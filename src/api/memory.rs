//! Single-agent endpoints: `/cam/store`, `/cam/retrieve`, `/cam/memory/*`.

use axum::extract::{Path, State};
use axum::Json;
use tracing::info;

use crate::api::error::ApiResult;
use crate::api::AppState;
use crate::engine::{
    RetrieveResponse, RetrieveSingleRequest, StoreResponse, StoreSingleRequest,
};
use crate::memory::types::{Annotation, MemoryRecord};
use crate::security::sanitize;

/// POST /cam/store
pub async fn store(
    State(state): State<AppState>,
    Json(request): Json<StoreSingleRequest>,
) -> ApiResult<Json<StoreResponse>> {
    sanitize::validate_text_field(
        "content.text",
        &request.content.text,
        state.engine.config().security.max_content_bytes,
    )?;
    let response = state.engine.store_single(request).await?;
    info!(memory_id = %response.memory_id, "single-agent memory stored");
    Ok(Json(response))
}

/// POST /cam/retrieve
pub async fn retrieve(
    State(state): State<AppState>,
    Json(request): Json<RetrieveSingleRequest>,
) -> ApiResult<Json<RetrieveResponse>> {
    let response = state.engine.retrieve_single(request).await?;
    Ok(Json(response))
}

/// GET /cam/memory/{id}
pub async fn get_memory(
    State(state): State<AppState>,
    Path(memory_id): Path<String>,
) -> ApiResult<Json<MemoryRecord>> {
    let record = state.engine.get(&memory_id, None).await?;
    Ok(Json(record))
}

/// POST /cam/memory/{id}/annotate
pub async fn annotate(
    State(state): State<AppState>,
    Path(memory_id): Path<String>,
    Json(annotation): Json<Annotation>,
) -> ApiResult<Json<serde_json::Value>> {
    sanitize::validate_text_field(
        "annotation.content",
        &annotation.content,
        state.engine.config().security.max_annotation_bytes,
    )?;
    state.engine.annotate(&memory_id, annotation).await?;
    Ok(Json(serde_json::json!({ "memory_id": memory_id, "status": "annotated" })))
}

/// GET /cam/memory/{id}/annotations
pub async fn annotations(
    State(state): State<AppState>,
    Path(memory_id): Path<String>,
) -> ApiResult<Json<Vec<Annotation>>> {
    let annotations = state.engine.annotations(&memory_id).await?;
    Ok(Json(annotations))
}
