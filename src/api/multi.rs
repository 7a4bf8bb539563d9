//! Multi-entity endpoints: `/cam/multi/*`.
//!
//! The witness-checked read takes `requesting_entity` as a query parameter;
//! denials return 404 so existence is not leaked.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::info;

use crate::api::error::ApiResult;
use crate::api::AppState;
use crate::engine::{
    RetrieveMultiRequest, RetrieveMultiResponse, StoreMultiRequest, StoreResponse,
};
use crate::error::EngramError;
use crate::memory::types::{MemoryRecord, Situation};
use crate::security::sanitize;

/// POST /cam/multi/store
pub async fn store(
    State(state): State<AppState>,
    Json(request): Json<StoreMultiRequest>,
) -> ApiResult<Json<StoreResponse>> {
    sanitize::validate_text_field(
        "content.text",
        &request.content.text,
        state.engine.config().security.max_content_bytes,
    )?;
    let response = state.engine.store_multi(request).await?;
    info!(
        memory_id = %response.memory_id,
        situation_id = %response.situation_id,
        "multi-entity memory stored"
    );
    Ok(Json(response))
}

/// POST /cam/multi/retrieve
pub async fn retrieve(
    State(state): State<AppState>,
    Json(request): Json<RetrieveMultiRequest>,
) -> ApiResult<Json<RetrieveMultiResponse>> {
    let response = state.engine.retrieve_multi(request).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct EntityQuery {
    pub requesting_entity: Option<String>,
}

/// GET /cam/multi/memory/{id}?requesting_entity=...
pub async fn get_memory(
    State(state): State<AppState>,
    Path(memory_id): Path<String>,
    Query(query): Query<EntityQuery>,
) -> ApiResult<Json<MemoryRecord>> {
    let entity = query
        .requesting_entity
        .as_deref()
        .filter(|e| !e.is_empty())
        .ok_or_else(|| EngramError::invalid("requesting_entity query parameter is required"))?;
    let record = state.engine.get(&memory_id, Some(entity)).await?;
    Ok(Json(record))
}

/// GET /cam/multi/situations/{entity_id}
pub async fn situations(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> ApiResult<Json<Vec<Situation>>> {
    let situations = state.engine.situations_for(&entity_id).await?;
    Ok(Json(situations))
}
