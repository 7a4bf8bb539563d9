//! Curation pipeline — turn a conversation exchange into stored memories.
//!
//! For each turn the curator emits scored observations; the admission rule
//! drops ephemeral, low-confidence, or low-value ones; survivors are embedded
//! and stored with retention derived from their storage type. The decision
//! report lists every observation — stored and rejected — so callers can
//! explain behaviour. Curator failures degrade to the conservative fallback
//! decision instead of failing the request.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::curator::{fallback_decision, CurationDecision, CurationTurn, Observation, StorageType};
use crate::engine::MemoryEngine;
use crate::error::EngramResult;
use crate::memory::types::{
    now_rfc3339, situation_types, MemoryContent, MemoryMetadata, MemoryType, PrivacyLevel,
    RetentionInfo,
};

/// Request body for the curated analyze/store endpoints.
#[derive(Debug, Deserialize)]
pub struct CuratedTurnRequest {
    /// The entity that witnessed (and owns) whatever gets stored.
    pub entity_id: String,
    #[serde(flatten)]
    pub turn: CurationTurn,
    /// Bypass curation and store the raw turn as one memory.
    #[serde(default)]
    pub force_storage: bool,
}

/// One observation's fate.
#[derive(Debug, Serialize)]
pub struct ObservationDecision {
    pub observation: Observation,
    pub stored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_id: Option<String>,
    pub retention_policy: String,
    pub reason: String,
}

/// The full decision report for one turn.
#[derive(Debug, Serialize)]
pub struct CurationReport {
    pub should_store: bool,
    pub overall_reasoning: String,
    pub requires_review: bool,
    pub decisions: Vec<ObservationDecision>,
    pub stored_memory_ids: Vec<String>,
}

/// Map curator storage types onto the closed memory-type vocabulary. The
/// storage type itself is preserved in `metadata.domain` for filtering.
fn memory_type_for(storage_type: StorageType) -> MemoryType {
    match storage_type {
        StorageType::Facts | StorageType::Relationships => MemoryType::Fact,
        StorageType::Preferences => MemoryType::Preference,
        StorageType::Context => MemoryType::Conversation,
        StorageType::Temporary => MemoryType::Event,
        StorageType::Skills => MemoryType::Pattern,
    }
}

fn privacy_for(observation: &Observation) -> PrivacyLevel {
    match observation.privacy_level.as_deref() {
        Some("public") => PrivacyLevel::Public,
        Some("personal") | Some("private") | Some("confidential") => PrivacyLevel::Personal,
        _ => PrivacyLevel::ParticipantsOnly,
    }
}

fn rejection_reason(observation: &Observation) -> String {
    if observation.ephemerality_score > 0.8 {
        format!("ephemerality {:.2} > 0.8", observation.ephemerality_score)
    } else if observation.confidence_score < 0.3 {
        format!("confidence {:.2} < 0.3", observation.confidence_score)
    } else {
        format!("contextual value {:.2} < 0.2", observation.contextual_value)
    }
}

/// Run the curator over a turn, degrading to the fallback decision on
/// upstream failure. Pure with respect to storage.
pub async fn analyze(engine: &MemoryEngine, turn: &CurationTurn) -> CurationDecision {
    match engine.curator().analyze(turn).await {
        Ok(decision) => decision,
        Err(e) => {
            tracing::warn!(error = %e, "curator call failed; using fallback decision");
            fallback_decision(turn)
        }
    }
}

/// Analyse a turn and report decisions without storing anything.
pub async fn analyze_only(engine: &MemoryEngine, request: &CuratedTurnRequest) -> CurationReport {
    let decision = analyze(engine, &request.turn).await;
    report_for(&decision, Vec::new())
}

/// Analyse, admit, embed, and store. Returns the full decision report with
/// the IDs of stored memories.
pub async fn curate_and_store(
    engine: Arc<MemoryEngine>,
    request: &CuratedTurnRequest,
) -> EngramResult<CurationReport> {
    if request.force_storage {
        return force_store(engine, request).await;
    }

    let decision = analyze(&engine, &request.turn).await;

    let mut stored_ids = Vec::new();
    let mut outcomes: Vec<(Option<String>, bool)> = Vec::with_capacity(decision.observations.len());

    for observation in &decision.observations {
        if !observation.should_store() {
            outcomes.push((None, false));
            continue;
        }
        let memory_id = store_observation(&engine, &request.entity_id, observation).await?;
        stored_ids.push(memory_id.clone());
        outcomes.push((Some(memory_id), true));
    }

    engine
        .record_curation(
            &request.entity_id,
            decision.observations.len(),
            stored_ids.len(),
            decision.observations.len() - stored_ids.len(),
        )
        .await?;

    let mut report = report_for(&decision, stored_ids);
    for (decision_entry, (memory_id, stored)) in report.decisions.iter_mut().zip(outcomes) {
        decision_entry.stored = stored;
        decision_entry.memory_id = memory_id;
        if stored {
            decision_entry.reason = "admitted".to_string();
        }
    }
    Ok(report)
}

async fn store_observation(
    engine: &MemoryEngine,
    entity_id: &str,
    observation: &Observation,
) -> EngramResult<String> {
    let vector = engine.embed(&observation.content).await?;
    let retention_policy = observation.retention_policy();

    let record = crate::memory::types::MemoryRecord {
        memory_id: crate::memory::types::new_memory_id(),
        content: MemoryContent::from_text(observation.content.clone()),
        vector,
        metadata: MemoryMetadata {
            timestamp: now_rfc3339(),
            memory_type: memory_type_for(observation.memory_type),
            agent_id: Some(entity_id.to_string()),
            domain: Some(observation.memory_type.as_str().to_string()),
            confidence: Some(observation.confidence_score),
            importance: Some(observation.contextual_value),
            topic_tags: observation.tags.clone(),
            interaction_quality: None,
            situation_duration_minutes: None,
        },
        tags: observation.tags.clone(),
        witnessed_by: vec![entity_id.to_string()],
        situation_id: crate::memory::types::new_situation_id(),
        situation_type: situation_types::CONVERSATION.to_string(),
        privacy_level: privacy_for(observation),
        causality: None,
        retention: Some(RetentionInfo {
            ttl_seconds: retention_policy.ttl_seconds(),
            decay_function: Default::default(),
        }),
        created_at: now_rfc3339(),
        access_count: 0,
        last_accessed_at: None,
    };

    let response = engine.put_record(record).await?;
    Ok(response.memory_id)
}

/// `force_storage=true`: skip curation entirely and store the raw turn.
async fn force_store(
    engine: Arc<MemoryEngine>,
    request: &CuratedTurnRequest,
) -> EngramResult<CurationReport> {
    let content = format!("{}\n{}", request.turn.user_input, request.turn.agent_response);
    let observation = Observation {
        memory_type: StorageType::Context,
        content,
        confidence_score: 1.0,
        ephemerality_score: 0.0,
        contextual_value: 1.0,
        privacy_level: None,
        tags: vec!["forced".to_string()],
        rationale: "force_storage override".to_string(),
    };

    let memory_id = store_observation(&engine, &request.entity_id, &observation).await?;
    engine.record_curation(&request.entity_id, 1, 1, 0).await?;

    Ok(CurationReport {
        should_store: true,
        overall_reasoning: "force_storage override; curation bypassed".to_string(),
        requires_review: false,
        decisions: vec![ObservationDecision {
            observation,
            stored: true,
            memory_id: Some(memory_id.clone()),
            retention_policy: "medium_term".to_string(),
            reason: "forced".to_string(),
        }],
        stored_memory_ids: vec![memory_id],
    })
}

fn report_for(decision: &CurationDecision, stored_memory_ids: Vec<String>) -> CurationReport {
    let decisions = decision
        .observations
        .iter()
        .map(|observation| {
            let admitted = observation.should_store();
            ObservationDecision {
                retention_policy: observation.retention_policy().as_str().to_string(),
                reason: if admitted {
                    "admitted".to_string()
                } else {
                    rejection_reason(observation)
                },
                observation: observation.clone(),
                stored: false,
                memory_id: None,
            }
        })
        .collect();

    CurationReport {
        should_store: decision.should_store,
        overall_reasoning: decision.overall_reasoning.clone(),
        requires_review: decision.requires_review,
        decisions,
        stored_memory_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(
        storage_type: StorageType,
        content: &str,
        confidence: f64,
        ephemerality: f64,
        value: f64,
    ) -> Observation {
        Observation {
            memory_type: storage_type,
            content: content.to_string(),
            confidence_score: confidence,
            ephemerality_score: ephemerality,
            contextual_value: value,
            privacy_level: None,
            tags: vec![],
            rationale: "test".to_string(),
        }
    }

    #[test]
    fn storage_type_mapping_covers_vocabulary() {
        assert_eq!(memory_type_for(StorageType::Facts), MemoryType::Fact);
        assert_eq!(memory_type_for(StorageType::Preferences), MemoryType::Preference);
        assert_eq!(memory_type_for(StorageType::Context), MemoryType::Conversation);
        assert_eq!(memory_type_for(StorageType::Temporary), MemoryType::Event);
        assert_eq!(memory_type_for(StorageType::Skills), MemoryType::Pattern);
        assert_eq!(memory_type_for(StorageType::Relationships), MemoryType::Fact);
    }

    #[test]
    fn rejection_reasons_name_the_failing_gate() {
        let o = observation(StorageType::Temporary, "raining", 1.0, 0.95, 0.1);
        assert!(rejection_reason(&o).contains("ephemerality"));

        let o = observation(StorageType::Facts, "maybe", 0.1, 0.0, 0.9);
        assert!(rejection_reason(&o).contains("confidence"));

        let o = observation(StorageType::Facts, "trivia", 0.9, 0.0, 0.1);
        assert!(rejection_reason(&o).contains("contextual value"));
    }

    #[test]
    fn report_lists_all_observations() {
        let decision = CurationDecision {
            observations: vec![
                observation(StorageType::Facts, "lives in Liversedge", 0.95, 0.1, 0.9),
                observation(StorageType::Temporary, "raining", 1.0, 0.95, 0.1),
            ],
            should_store: true,
            overall_reasoning: "mixed".to_string(),
            requires_review: false,
        };
        let report = report_for(&decision, vec![]);
        assert_eq!(report.decisions.len(), 2);
        assert_eq!(report.decisions[0].retention_policy, "permanent");
        assert_eq!(report.decisions[1].retention_policy, "short_term");
        assert_eq!(report.decisions[0].reason, "admitted");
        assert!(report.decisions[1].reason.contains("ephemerality"));
    }
}
