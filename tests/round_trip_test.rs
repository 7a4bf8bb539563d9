mod helpers;

use engram::engine::StoreSingleRequest;
use engram::error::EngramError;
use engram::memory::types::{
    CausalityInfo, MediaItem, MemoryContent, MemoryType, RetentionInfo,
};
use helpers::{metadata, multi_request, retrieve_request, test_engine, unit_vector};

/// store_multi → get reconstructs every client-provided field.
#[tokio::test]
async fn store_then_get_round_trips_all_fields() {
    let engine = test_engine();

    let mut request = multi_request(
        &["alice", "claude"],
        "consultation_1to1",
        "Round-trip body",
        unit_vector(0),
    );
    request.content.summary = Some("short summary".to_string());
    request.content.speakers = Some(
        [
            ("alice".to_string(), "what about X?".to_string()),
            ("claude".to_string(), "X works like this".to_string()),
        ]
        .into_iter()
        .collect(),
    );
    request.content.media = vec![MediaItem {
        media_type: "website".to_string(),
        url: "https://example.org/paper".to_string(),
        title: Some("A paper".to_string()),
        description: None,
        mime_type: None,
        authors: None,
        r#abstract: None,
        preview_text: None,
    }];
    request.tags = vec!["roundtrip".to_string()];
    request.metadata.topic_tags = vec!["testing".to_string()];
    request.causality = Some(CausalityInfo {
        parent_memories: vec!["mem-aaaaaaaaaaaa".to_string()],
        influence_strength: vec![0.7],
        synthesis_type: Some("elaboration".to_string()),
        reasoning: None,
    });
    request.retention = Some(RetentionInfo {
        ttl_seconds: Some(3600),
        decay_function: Default::default(),
    });

    let stored = engine.store_multi(request).await.unwrap();
    let record = engine.get(&stored.memory_id, Some("alice")).await.unwrap();

    assert_eq!(record.content.text, "Round-trip body");
    assert_eq!(record.content.summary.as_deref(), Some("short summary"));
    assert_eq!(record.content.media.len(), 1);
    assert_eq!(record.content.media[0].url, "https://example.org/paper");
    assert_eq!(
        record.content.speakers.as_ref().unwrap()["alice"],
        "what about X?"
    );
    assert_eq!(record.vector, unit_vector(0));
    assert_eq!(record.metadata.timestamp, "2026-08-01T12:00:00Z");
    assert_eq!(record.tags, vec!["roundtrip"]);
    assert_eq!(record.metadata.topic_tags, vec!["testing"]);
    assert_eq!(record.witnessed_by, vec!["alice", "claude"]);
    assert_eq!(record.situation_type, "consultation_1to1");
    let causality = record.causality.unwrap();
    assert_eq!(causality.parent_memories, vec!["mem-aaaaaaaaaaaa"]);
    assert_eq!(causality.influence_strength, vec![0.7]);
    assert_eq!(record.retention.unwrap().ttl_seconds, Some(3600));
}

/// Validation rejections: bad vectors, bad timestamps, mismatched causality.
#[tokio::test]
async fn invalid_requests_are_rejected() {
    let engine = test_engine();

    // Wrong dimension
    let request = multi_request(&["alice"], "conversation", "x", vec![1.0, 0.0]);
    assert!(matches!(
        engine.store_multi(request).await.unwrap_err(),
        EngramError::InvalidRequest(_)
    ));

    // NaN component
    let mut vector = unit_vector(0);
    vector[2] = f32::NAN;
    let request = multi_request(&["alice"], "conversation", "x", vector);
    assert!(engine.store_multi(request).await.is_err());

    // Timestamp without Z
    let mut request = multi_request(&["alice"], "conversation", "x", unit_vector(0));
    request.metadata.timestamp = "2026-08-01T12:00:00+00:00".to_string();
    assert!(matches!(
        engine.store_multi(request).await.unwrap_err(),
        EngramError::InvalidRequest(_)
    ));

    // Empty content
    let request = multi_request(&["alice"], "conversation", "", unit_vector(0));
    assert!(engine.store_multi(request).await.is_err());

    // Mismatched causality arms
    let mut request = multi_request(&["alice"], "conversation", "x", unit_vector(0));
    request.causality = Some(CausalityInfo {
        parent_memories: vec!["mem-aaaaaaaaaaaa".to_string()],
        influence_strength: vec![0.5, 0.5],
        synthesis_type: None,
        reasoning: None,
    });
    assert!(matches!(
        engine.store_multi(request).await.unwrap_err(),
        EngramError::InvalidRequest(_)
    ));

    // Single-agent store without agent_id
    let request = StoreSingleRequest {
        content: MemoryContent::from_text("x"),
        primary_vector: unit_vector(0),
        metadata: metadata(MemoryType::Fact),
        tags: vec![],
        causality: None,
        retention: None,
    };
    assert!(matches!(
        engine.store_single(request).await.unwrap_err(),
        EngramError::InvalidRequest(_)
    ));
}

/// A single-agent store is a multi-entity memory witnessed by the agent.
#[tokio::test]
async fn single_agent_store_unifies_into_witness_model() {
    let engine = test_engine();

    let mut meta = metadata(MemoryType::Fact);
    meta.agent_id = Some("agent-007".to_string());
    let stored = engine
        .store_single(StoreSingleRequest {
            content: MemoryContent::from_text("Single-agent fact"),
            primary_vector: unit_vector(1),
            metadata: meta,
            tags: vec![],
            causality: None,
            retention: None,
        })
        .await
        .unwrap();

    let record = engine.get(&stored.memory_id, None).await.unwrap();
    assert_eq!(record.witnessed_by, vec!["agent-007"]);
    assert_eq!(record.situation_type, "legacy_single_agent");

    // Visible through the witness-scoped surface too.
    let response = engine
        .retrieve_multi(retrieve_request("agent-007", unit_vector(1), 0.0))
        .await
        .unwrap();
    assert_eq!(response.memories.len(), 1);
}

/// Resonance combination: permutation-invariant, and the similarity floor at
/// 1.0 admits only exact matches.
#[tokio::test]
async fn resonance_combination_and_exact_floor() {
    let engine = test_engine();

    engine
        .store_multi(multi_request(&["alice"], "conversation", "exact", unit_vector(0)))
        .await
        .unwrap();
    engine
        .store_multi(multi_request(&["alice"], "conversation", "close", {
            let mut v = unit_vector(0);
            v[1] = 0.3;
            v
        }))
        .await
        .unwrap();

    // threshold = 1 keeps only the exact match (within float tolerance the
    // engine reports ~1.0 for the identical vector).
    let response = engine
        .retrieve_multi(retrieve_request("alice", unit_vector(0), 0.999))
        .await
        .unwrap();
    assert_eq!(response.memories.len(), 1);
    assert_eq!(
        response.memories[0].content_preview, "exact",
        "only the identical vector should clear a ~1.0 floor"
    );
}

/// Deleted memories disappear from point reads and KNN.
#[tokio::test]
async fn delete_removes_from_reads_and_search() {
    let engine = test_engine();
    let vector = unit_vector(2);

    let stored = engine
        .store_multi(multi_request(&["alice"], "conversation", "to delete", vector.clone()))
        .await
        .unwrap();

    assert!(engine.delete(&stored.memory_id).await.unwrap());

    assert!(matches!(
        engine.get(&stored.memory_id, Some("alice")).await.unwrap_err(),
        EngramError::NotFound(_)
    ));
    let response = engine
        .retrieve_multi(retrieve_request("alice", vector, 0.0))
        .await
        .unwrap();
    assert!(response.memories.is_empty());
}

/// Situations accumulate members and list per entity by recency.
#[tokio::test]
async fn situations_for_entity() {
    let engine = test_engine();

    let mut request = multi_request(
        &["alice", "bob"],
        "group_discussion",
        "first memory",
        unit_vector(0),
    );
    request.situation_id = Some("sit-standup".to_string());
    engine.store_multi(request).await.unwrap();

    let mut request = multi_request(
        &["alice", "bob"],
        "group_discussion",
        "second memory",
        unit_vector(1),
    );
    request.situation_id = Some("sit-standup".to_string());
    engine.store_multi(request).await.unwrap();

    let situations = engine.situations_for("alice").await.unwrap();
    assert_eq!(situations.len(), 1);
    assert_eq!(situations[0].situation_id, "sit-standup");
    assert_eq!(situations[0].memory_ids.len(), 2);
    assert_eq!(situations[0].participants, vec!["alice", "bob"]);

    assert!(engine.situations_for("stranger").await.unwrap().is_empty());
}
