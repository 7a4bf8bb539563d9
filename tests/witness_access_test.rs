mod helpers;

use engram::error::EngramError;
use engram::memory::types::Annotation;
use helpers::{multi_request, retrieve_request, test_engine, unit_vector};

/// A 1:1 consultation is invisible to entities outside its witness set.
#[tokio::test]
async fn private_consultation_is_private() {
    let engine = test_engine();
    let vector = unit_vector(0);

    let stored = engine
        .store_multi(multi_request(
            &["alice", "claude"],
            "consultation_1to1",
            "Algorithm optimization",
            vector.clone(),
        ))
        .await
        .unwrap();
    assert_eq!(stored.status, "stored");
    assert!(stored.memory_id.starts_with("mem-"));

    // Bob gets nothing.
    let for_bob = engine
        .retrieve_multi(retrieve_request("bob", vector.clone(), 0.0))
        .await
        .unwrap();
    assert!(for_bob.memories.is_empty());
    assert_eq!(for_bob.access_granted_count, 0);
    assert_eq!(
        for_bob.entity_verification.search_scope,
        "witnessed_memories_only"
    );

    // Alice gets exactly the memory at similarity ~1.0.
    let for_alice = engine
        .retrieve_multi(retrieve_request("alice", vector, 0.0))
        .await
        .unwrap();
    assert_eq!(for_alice.memories.len(), 1);
    assert_eq!(for_alice.memories[0].memory_id, stored.memory_id);
    assert!((for_alice.memories[0].similarity_score - 1.0).abs() < 1e-3);
    assert_eq!(for_alice.access_granted_count, 1);
}

/// Every witness of a group memory sees it; outsiders do not.
#[tokio::test]
async fn group_visibility() {
    let engine = test_engine();
    let vector = unit_vector(1);

    let stored = engine
        .store_multi(multi_request(
            &["alice", "bob", "claude"],
            "group_discussion",
            "Sprint retro decisions",
            vector.clone(),
        ))
        .await
        .unwrap();

    for entity in ["alice", "bob", "claude"] {
        let response = engine
            .retrieve_multi(retrieve_request(entity, vector.clone(), 0.0))
            .await
            .unwrap();
        assert_eq!(response.memories.len(), 1, "{entity} should see the memory");
        assert_eq!(response.memories[0].memory_id, stored.memory_id);
    }

    let for_dave = engine
        .retrieve_multi(retrieve_request("dave", vector, 0.0))
        .await
        .unwrap();
    assert!(for_dave.memories.is_empty());
}

/// Witness-checked reads hide denials behind NotFound.
#[tokio::test]
async fn get_denial_is_indistinguishable_from_missing() {
    let engine = test_engine();

    let stored = engine
        .store_multi(multi_request(
            &["alice"],
            "conversation",
            "secret plan",
            unit_vector(2),
        ))
        .await
        .unwrap();

    engine.get(&stored.memory_id, Some("alice")).await.unwrap();

    let denied = engine.get(&stored.memory_id, Some("bob")).await.unwrap_err();
    assert!(matches!(denied, EngramError::NotFound(_)));

    let missing = engine.get("mem-000000000000", Some("bob")).await.unwrap_err();
    assert!(matches!(missing, EngramError::NotFound(_)));
}

/// Hyphen variants of an entity ID resolve to the same witness token.
#[tokio::test]
async fn entity_id_normalisation_round_trip() {
    let engine = test_engine();
    let vector = unit_vector(3);

    let stored = engine
        .store_multi(multi_request(
            &["human-alice-123"],
            "conversation",
            "normalisation check",
            vector.clone(),
        ))
        .await
        .unwrap();

    // Original string is preserved on the record.
    let record = engine.get(&stored.memory_id, Some("humanalice123")).await.unwrap();
    assert_eq!(record.witnessed_by, vec!["human-alice-123"]);

    let response = engine
        .retrieve_multi(retrieve_request("humanalice123", vector, 0.0))
        .await
        .unwrap();
    assert_eq!(response.memories.len(), 1);
}

/// Only witnesses may annotate; annotations never mutate the parent.
#[tokio::test]
async fn annotation_respects_witness_set() {
    let engine = test_engine();

    let stored = engine
        .store_multi(multi_request(
            &["alice", "claude"],
            "consultation_1to1",
            "annotation target",
            unit_vector(4),
        ))
        .await
        .unwrap();

    let note = |annotator: &str| Annotation {
        annotator_id: annotator.to_string(),
        annotation_type: "observation".to_string(),
        content: "a follow-up note".to_string(),
        vector: None,
        confidence: Some(0.8),
        tags: vec![],
        evidence_links: vec![],
        created_at: String::new(),
    };

    engine.annotate(&stored.memory_id, note("claude")).await.unwrap();

    let err = engine.annotate(&stored.memory_id, note("mallory")).await.unwrap_err();
    assert!(matches!(err, EngramError::Forbidden(_)));

    let annotations = engine.annotations(&stored.memory_id).await.unwrap();
    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations[0].annotator_id, "claude");

    let record = engine.get(&stored.memory_id, Some("alice")).await.unwrap();
    assert_eq!(record.content.text, "annotation target");
}

/// Stored assistant denials are filtered from witness-scoped retrieval by
/// default and returned when the caller opts out.
#[tokio::test]
async fn denial_memories_excluded_unless_opted_out() {
    let engine = test_engine();
    let vector = unit_vector(7);

    engine
        .store_multi(multi_request(
            &["alice"],
            "conversation",
            "Alice prefers dark mode in her editor",
            vector.clone(),
        ))
        .await
        .unwrap();
    engine
        .store_multi(multi_request(
            &["alice"],
            "conversation",
            "I'm sorry, I don't have access to that information.",
            vector.clone(),
        ))
        .await
        .unwrap();

    let response = engine
        .retrieve_multi(retrieve_request("alice", vector.clone(), 0.0))
        .await
        .unwrap();
    assert_eq!(response.memories.len(), 1);
    assert!(response.memories[0].content_preview.contains("dark mode"));

    let mut request = retrieve_request("alice", vector, 0.0);
    if let Some(options) = request.retrieval.as_mut() {
        options.exclude_denials = false;
    }
    let response = engine.retrieve_multi(request).await.unwrap();
    assert_eq!(response.memories.len(), 2);
}

/// Witness sets deduplicate by normalised form; empty sets are rejected.
#[tokio::test]
async fn witness_set_semantics() {
    let engine = test_engine();

    let stored = engine
        .store_multi(multi_request(
            &["human-alice-123", "humanalice123", "claude"],
            "conversation",
            "dedup check",
            unit_vector(5),
        ))
        .await
        .unwrap();
    let record = engine.get(&stored.memory_id, Some("claude")).await.unwrap();
    assert_eq!(record.witnessed_by, vec!["human-alice-123", "claude"]);

    let err = engine
        .store_multi(multi_request(&[], "conversation", "no witnesses", unit_vector(6)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngramError::InvalidRequest(_)));
}
