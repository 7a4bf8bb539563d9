#![allow(dead_code)]

use std::sync::Arc;

use engram::config::EngramConfig;
use engram::curator::{Curator, FallbackCurator};
use engram::db;
use engram::embedding::deterministic::StaticEmbedding;
use engram::engine::{MemoryEngine, RetrieveMultiRequest, StoreMultiRequest};
use engram::memory::retrieve::{ResonanceVector, RetrievalOptions};
use engram::memory::types::{MemoryContent, MemoryMetadata, MemoryType};

/// Small dimension keeps test vectors readable.
pub const DIMS: usize = 8;

/// Config for an in-process engine: tiny vectors, no auth, no cleanup loops.
pub fn test_config() -> EngramConfig {
    let mut config = EngramConfig::default();
    config.vector.dimensions = DIMS;
    config.security.enable_auth = false;
    config.cleanup.enabled = false;
    config
}

/// Engine over an in-memory database with deterministic embeddings and the
/// conservative fallback curator.
pub fn test_engine() -> Arc<MemoryEngine> {
    test_engine_with_curator(Box::new(FallbackCurator))
}

pub fn test_engine_with_curator(curator: Box<dyn Curator>) -> Arc<MemoryEngine> {
    let config = Arc::new(test_config());
    let conn = db::open_memory_database(DIMS).unwrap();
    Arc::new(MemoryEngine::new(
        conn,
        Arc::new(StaticEmbedding::new(DIMS)),
        Arc::from(curator),
        config,
    ))
}

/// Unit vector along the given axis. Distinct axes are orthogonal.
pub fn unit_vector(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    v[axis % DIMS] = 1.0;
    v
}

pub fn metadata(memory_type: MemoryType) -> MemoryMetadata {
    MemoryMetadata {
        timestamp: "2026-08-01T12:00:00Z".to_string(),
        memory_type,
        agent_id: None,
        domain: None,
        confidence: Some(0.9),
        importance: Some(0.5),
        topic_tags: vec![],
        interaction_quality: None,
        situation_duration_minutes: None,
    }
}

/// A multi-entity store request with sensible defaults.
pub fn multi_request(
    witnesses: &[&str],
    situation_type: &str,
    text: &str,
    vector: Vec<f32>,
) -> StoreMultiRequest {
    StoreMultiRequest {
        witnessed_by: witnesses.iter().map(|s| s.to_string()).collect(),
        situation_type: situation_type.to_string(),
        situation_id: None,
        content: MemoryContent::from_text(text),
        primary_vector: vector,
        metadata: metadata(MemoryType::Conversation),
        tags: vec![],
        causality: None,
        retention: None,
        access_control: None,
    }
}

/// A witness-scoped retrieval request for one resonance vector.
pub fn retrieve_request(entity: &str, vector: Vec<f32>, threshold: f32) -> RetrieveMultiRequest {
    RetrieveMultiRequest {
        requesting_entity: entity.to_string(),
        resonance_vectors: vec![ResonanceVector {
            vector,
            weight: 1.0,
            label: None,
        }],
        tags: None,
        filters: None,
        entity_filters: None,
        retrieval: Some(RetrievalOptions {
            top_k: 10,
            similarity_threshold: threshold,
            diversity_lambda: None,
            boost_recent: None,
            exclude_denials: true,
        }),
        ordering: None,
    }
}
