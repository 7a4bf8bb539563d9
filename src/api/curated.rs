//! Curated-memory endpoints: `/cam/curated/*`.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::api::AppState;
use crate::curation::{self, CuratedTurnRequest, CurationReport};
use crate::engine::{RetrieveMultiRequest, RetrieveMultiResponse};
use crate::memory::retrieve::{ResonanceVector, RetrievalOptions};
use crate::memory::stats::EntityStatsResponse;
use crate::security::sanitize;

/// POST /cam/curated/analyze — decision report only, nothing stored.
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<CuratedTurnRequest>,
) -> ApiResult<Json<CurationReport>> {
    validate_turn(&state, &request)?;
    let report = curation::analyze_only(&state.engine, &request).await;
    Ok(Json(report))
}

/// POST /cam/curated/store — curate the turn and store admitted observations.
pub async fn store(
    State(state): State<AppState>,
    Json(request): Json<CuratedTurnRequest>,
) -> ApiResult<Json<CurationReport>> {
    validate_turn(&state, &request)?;
    let report = curation::curate_and_store(Arc::clone(&state.engine), &request).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct CuratedRetrieveRequest {
    pub entity_id: String,
    pub query: String,
    #[serde(default)]
    pub retrieval: Option<RetrievalOptions>,
}

/// POST /cam/curated/retrieve — embed the query text and run a witness-scoped
/// search for the entity.
pub async fn retrieve(
    State(state): State<AppState>,
    Json(request): Json<CuratedRetrieveRequest>,
) -> ApiResult<Json<RetrieveMultiResponse>> {
    sanitize::validate_id_field("entity_id", &request.entity_id, 200)?;
    sanitize::validate_text_field(
        "query",
        &request.query,
        state.engine.config().security.max_annotation_bytes,
    )?;

    let vector = state.engine.embed(&request.query).await?;
    let response = state
        .engine
        .retrieve_multi(RetrieveMultiRequest {
            requesting_entity: request.entity_id,
            resonance_vectors: vec![ResonanceVector {
                vector,
                weight: 1.0,
                label: Some("query".to_string()),
            }],
            tags: None,
            filters: None,
            entity_filters: None,
            retrieval: request.retrieval,
            ordering: None,
        })
        .await?;
    Ok(Json(response))
}

/// GET /cam/curated/stats/{entity_id}
pub async fn stats(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> ApiResult<Json<EntityStatsResponse>> {
    let stats = state.engine.entity_stats(&entity_id).await?;
    Ok(Json(stats))
}

fn validate_turn(state: &AppState, request: &CuratedTurnRequest) -> ApiResult<()> {
    let max = state.engine.config().security.max_content_bytes;
    sanitize::validate_id_field("entity_id", &request.entity_id, 200)?;
    sanitize::validate_text_field("user_input", &request.turn.user_input, max)?;
    sanitize::validate_text_field("agent_response", &request.turn.agent_response, max)?;
    Ok(())
}
