//! Memory curator — the AI collaborator that decomposes a conversation turn
//! into scored observations.
//!
//! The curator is pluggable: production wires [`openai::OpenAiCurator`] to a
//! chat-completions endpoint, tests wire [`scripted::ScriptedCurator`] to
//! canned decisions, and deployments without an API key use the conservative
//! fallback. Observation scoring vocabulary and the fallback shape follow the
//! curation pipeline contract.

pub mod openai;
pub mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::CuratorConfig;
use crate::error::EngramResult;

/// Curator vocabulary for what kind of information an observation captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    Facts,
    Preferences,
    Context,
    Temporary,
    Skills,
    Relationships,
}

impl StorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Facts => "facts",
            Self::Preferences => "preferences",
            Self::Context => "context",
            Self::Temporary => "temporary",
            Self::Skills => "skills",
            Self::Relationships => "relationships",
        }
    }

    /// Default retention policy per storage type.
    pub fn retention_policy(&self) -> RetentionPolicy {
        match self {
            Self::Facts => RetentionPolicy::Permanent,
            Self::Preferences | Self::Skills | Self::Relationships => RetentionPolicy::LongTerm,
            Self::Context => RetentionPolicy::MediumTerm,
            Self::Temporary => RetentionPolicy::ShortTerm,
        }
    }
}

/// How long an admitted observation is retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    Permanent,
    LongTerm,
    MediumTerm,
    ShortTerm,
    SessionOnly,
}

impl RetentionPolicy {
    /// TTL derived from policy: short=7d, medium=30d, long=365d, session=4h.
    pub fn ttl_seconds(&self) -> Option<u64> {
        match self {
            Self::Permanent => None,
            Self::LongTerm => Some(365 * 24 * 3600),
            Self::MediumTerm => Some(30 * 24 * 3600),
            Self::ShortTerm => Some(7 * 24 * 3600),
            Self::SessionOnly => Some(4 * 3600),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::LongTerm => "long_term",
            Self::MediumTerm => "medium_term",
            Self::ShortTerm => "short_term",
            Self::SessionOnly => "session_only",
        }
    }
}

/// Agent-specific curation preferences passed through to the curator prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurationPreferences {
    #[serde(default)]
    pub priority_topics: Vec<String>,
    #[serde(default)]
    pub retention_bias: Option<String>,
    #[serde(default)]
    pub agent_personality: Option<String>,
}

/// One conversation turn submitted for curation.
#[derive(Debug, Clone, Deserialize)]
pub struct CurationTurn {
    pub user_input: String,
    pub agent_response: String,
    #[serde(default)]
    pub conversation_context: Option<String>,
    #[serde(default)]
    pub curation_preferences: Option<CurationPreferences>,
}

/// A single scored observation extracted from a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub memory_type: StorageType,
    pub content: String,
    pub confidence_score: f64,
    /// How quickly this loses value: 0 = permanent, 1 = expires immediately.
    pub ephemerality_score: f64,
    pub contextual_value: f64,
    #[serde(default)]
    pub privacy_level: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, alias = "reasoning")]
    pub rationale: String,
}

impl Observation {
    /// Admission rule: drop high-ephemerality, low-confidence, or
    /// low-value observations.
    pub fn should_store(&self) -> bool {
        self.ephemerality_score <= 0.8
            && self.confidence_score >= 0.3
            && self.contextual_value >= 0.2
    }

    /// Retention follows the storage type alone; ephemerality already gated
    /// admission.
    pub fn retention_policy(&self) -> RetentionPolicy {
        self.memory_type.retention_policy()
    }
}

/// The curator's reply for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurationDecision {
    pub observations: Vec<Observation>,
    pub should_store: bool,
    pub overall_reasoning: String,
    #[serde(default)]
    pub requires_review: bool,
}

/// Trait for the curation collaborator.
#[async_trait]
pub trait Curator: Send + Sync {
    async fn analyze(&self, turn: &CurationTurn) -> EngramResult<CurationDecision>;
}

/// Conservative decision used when the curator is unavailable or its reply
/// cannot be parsed: admit the whole turn as a single `context` memory,
/// flagged for review.
pub fn fallback_decision(turn: &CurationTurn) -> CurationDecision {
    CurationDecision {
        observations: vec![Observation {
            memory_type: StorageType::Context,
            content: format!("{}\n{}", turn.user_input, turn.agent_response),
            confidence_score: 0.3,
            ephemerality_score: 0.5,
            contextual_value: 0.5,
            privacy_level: None,
            tags: vec!["fallback".to_string(), "needs_review".to_string()],
            rationale: "curator unavailable; conservative storage".to_string(),
        }],
        should_store: true,
        overall_reasoning: "fallback decision due to analysis failure".to_string(),
        requires_review: true,
    }
}

/// A curator that always produces the conservative fallback. Used when no
/// curator API key is configured.
pub struct FallbackCurator;

#[async_trait]
impl Curator for FallbackCurator {
    async fn analyze(&self, turn: &CurationTurn) -> EngramResult<CurationDecision> {
        Ok(fallback_decision(turn))
    }
}

/// Create a curator from config.
pub fn create_curator(config: &CuratorConfig) -> anyhow::Result<Box<dyn Curator>> {
    match config.provider.as_str() {
        "openai" => match &config.api_key {
            Some(_) => Ok(Box::new(openai::OpenAiCurator::new(config)?)),
            None => {
                tracing::warn!(
                    "no curator API key configured; curation will use fallback decisions"
                );
                Ok(Box::new(FallbackCurator))
            }
        },
        "fallback" => Ok(Box::new(FallbackCurator)),
        other => anyhow::bail!("unknown curator provider: {other}. Supported: openai, fallback"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(confidence: f64, ephemerality: f64, value: f64) -> Observation {
        Observation {
            memory_type: StorageType::Facts,
            content: "x".to_string(),
            confidence_score: confidence,
            ephemerality_score: ephemerality,
            contextual_value: value,
            privacy_level: None,
            tags: vec![],
            rationale: String::new(),
        }
    }

    #[test]
    fn admission_rule_thresholds() {
        assert!(observation(0.9, 0.1, 0.9).should_store());
        // Each gate individually
        assert!(!observation(0.9, 0.81, 0.9).should_store());
        assert!(!observation(0.29, 0.1, 0.9).should_store());
        assert!(!observation(0.9, 0.1, 0.19).should_store());
        // Boundary values are admitted
        assert!(observation(0.3, 0.8, 0.2).should_store());
    }

    #[test]
    fn retention_mapping() {
        assert_eq!(StorageType::Facts.retention_policy(), RetentionPolicy::Permanent);
        assert_eq!(StorageType::Preferences.retention_policy(), RetentionPolicy::LongTerm);
        assert_eq!(StorageType::Skills.retention_policy(), RetentionPolicy::LongTerm);
        assert_eq!(StorageType::Relationships.retention_policy(), RetentionPolicy::LongTerm);
        assert_eq!(StorageType::Context.retention_policy(), RetentionPolicy::MediumTerm);
        assert_eq!(StorageType::Temporary.retention_policy(), RetentionPolicy::ShortTerm);
    }

    #[test]
    fn retention_ignores_ephemerality_of_admitted_observations() {
        // An admitted fact near the ephemerality gate keeps fact retention.
        let mut o = observation(0.9, 0.7, 0.9);
        o.memory_type = StorageType::Facts;
        assert!(o.should_store());
        assert_eq!(o.retention_policy(), RetentionPolicy::Permanent);

        o.memory_type = StorageType::Preferences;
        assert_eq!(o.retention_policy(), RetentionPolicy::LongTerm);
    }

    #[test]
    fn ttl_table() {
        assert_eq!(RetentionPolicy::Permanent.ttl_seconds(), None);
        assert_eq!(RetentionPolicy::ShortTerm.ttl_seconds(), Some(604_800));
        assert_eq!(RetentionPolicy::MediumTerm.ttl_seconds(), Some(2_592_000));
        assert_eq!(RetentionPolicy::LongTerm.ttl_seconds(), Some(31_536_000));
        assert_eq!(RetentionPolicy::SessionOnly.ttl_seconds(), Some(14_400));
    }

    #[test]
    fn fallback_is_flagged_for_review() {
        let turn = CurationTurn {
            user_input: "hello".to_string(),
            agent_response: "hi".to_string(),
            conversation_context: None,
            curation_preferences: None,
        };
        let decision = fallback_decision(&turn);
        assert!(decision.requires_review);
        assert_eq!(decision.observations.len(), 1);
        assert_eq!(decision.observations[0].confidence_score, 0.3);
        assert_eq!(decision.observations[0].content, "hello\nhi");
        assert!(decision.observations[0].should_store());
    }
}
