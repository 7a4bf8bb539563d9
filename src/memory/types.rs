//! Core memory type definitions.
//!
//! Defines [`MemoryType`] (the closed memory-type vocabulary),
//! [`PrivacyLevel`], [`DecayFunction`], the [`MemoryRecord`] stored per
//! engram, plus [`Annotation`] and [`Situation`]. Entity-ID normalisation
//! lives here too: the witness index matches on hyphen-stripped tokens while
//! records preserve the caller's original strings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Closed vocabulary for `metadata.memory_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Fact,
    Preference,
    Event,
    Solution,
    Insight,
    Decision,
    Pattern,
    Conversation,
    /// Single-agent memories wrapped by the unified engine.
    LegacySingleAgent,
}

impl MemoryType {
    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Preference => "preference",
            Self::Event => "event",
            Self::Solution => "solution",
            Self::Insight => "insight",
            Self::Decision => "decision",
            Self::Pattern => "pattern",
            Self::Conversation => "conversation",
            Self::LegacySingleAgent => "legacy_single_agent",
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fact" => Ok(Self::Fact),
            "preference" => Ok(Self::Preference),
            "event" => Ok(Self::Event),
            "solution" => Ok(Self::Solution),
            "insight" => Ok(Self::Insight),
            "decision" => Ok(Self::Decision),
            "pattern" => Ok(Self::Pattern),
            "conversation" => Ok(Self::Conversation),
            "legacy_single_agent" => Ok(Self::LegacySingleAgent),
            _ => Err(format!("unknown memory type: {s}")),
        }
    }
}

/// Who may see a memory beyond its witnesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyLevel {
    Personal,
    #[default]
    ParticipantsOnly,
    Group,
    Public,
}

impl PrivacyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::ParticipantsOnly => "participants_only",
            Self::Group => "group",
            Self::Public => "public",
        }
    }
}

impl std::str::FromStr for PrivacyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "personal" => Ok(Self::Personal),
            "participants_only" => Ok(Self::ParticipantsOnly),
            "group" => Ok(Self::Group),
            "public" => Ok(Self::Public),
            _ => Err(format!("unknown privacy level: {s}")),
        }
    }
}

/// Retention decay applied by the monthly cleanup job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecayFunction {
    #[default]
    None,
    Linear,
    Logarithmic,
}

impl DecayFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Linear => "linear",
            Self::Logarithmic => "logarithmic",
        }
    }
}

impl std::str::FromStr for DecayFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "linear" => Ok(Self::Linear),
            "logarithmic" => Ok(Self::Logarithmic),
            _ => Err(format!("unknown decay function: {s}")),
        }
    }
}

/// Situation lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SituationStatus {
    #[default]
    Active,
    Archived,
    Private,
}

impl SituationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
            Self::Private => "private",
        }
    }
}

/// Well-known situation types. The field itself is an open string (tag-matched
/// as a literal), these are the values the engine assigns.
pub mod situation_types {
    pub const CONVERSATION: &str = "conversation";
    pub const CONSULTATION_1TO1: &str = "consultation_1to1";
    pub const GROUP_DISCUSSION: &str = "group_discussion";
    pub const PUBLIC_PRESENTATION: &str = "public_presentation";
    pub const LEGACY_SINGLE_AGENT: &str = "legacy_single_agent";
}

/// A media reference attached to a memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    #[serde(rename = "type")]
    pub media_type: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#abstract: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_text: Option<String>,
}

/// Memory content: required text plus optional media, speaker breakdown, and summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryContent {
    pub text: String,
    #[serde(default)]
    pub media: Vec<MediaItem>,
    /// entity_id → that entity's utterance, for multi-entity memories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speakers: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl MemoryContent {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            media: Vec::new(),
            speakers: None,
            summary: None,
        }
    }
}

/// Client-supplied metadata. `timestamp` is kept as the caller's RFC-3339
/// string (validated on ingest) so `put` → `get` round-trips byte-identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetadata {
    pub timestamp: String,
    pub memory_type: MemoryType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance: Option<f64>,
    #[serde(default)]
    pub topic_tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interaction_quality: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub situation_duration_minutes: Option<f64>,
}

/// Causal links to earlier memories. Parents are weak references: they may
/// dangle after deletion and are filtered out of retrieval responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CausalityInfo {
    #[serde(default)]
    pub parent_memories: Vec<String>,
    #[serde(default)]
    pub influence_strength: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesis_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// Retention policy fields set by the curation pipeline or callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RetentionInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
    #[serde(default)]
    pub decay_function: DecayFunction,
}

/// A full memory record as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub memory_id: String,
    pub content: MemoryContent,
    pub vector: Vec<f32>,
    pub metadata: MemoryMetadata,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Original witness strings, deduplicated by normalised form.
    pub witnessed_by: Vec<String>,
    pub situation_id: String,
    pub situation_type: String,
    #[serde(default)]
    pub privacy_level: PrivacyLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causality: Option<CausalityInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention: Option<RetentionInfo>,
    pub created_at: String,
    #[serde(default)]
    pub access_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<String>,
}

/// An append-only note attached to a memory. Never modifies the parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub annotator_id: String,
    #[serde(rename = "type")]
    pub annotation_type: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub evidence_links: Vec<String>,
    #[serde(default)]
    pub created_at: String,
}

/// A derived grouping of memories sharing participants and context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Situation {
    pub situation_id: String,
    pub situation_type: String,
    pub participants: Vec<String>,
    pub memory_ids: Vec<String>,
    pub created_at: String,
    pub last_activity: String,
    pub status: SituationStatus,
}

// ── Identifiers and normalisation ─────────────────────────────────────────────

/// Mint a fresh memory ID: `mem-<12 hex>`.
pub fn new_memory_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("mem-{}", &hex[..12])
}

/// Mint a fresh situation ID: `sit-<12 hex>`.
pub fn new_situation_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("sit-{}", &hex[..12])
}

/// Normalise an entity ID for witness-index matching by stripping hyphens.
///
/// `human-alice-123` and `humanalice123` are the same access token. Idempotent.
/// The logical API treats IDs as opaque; only the index uses this form.
pub fn normalize_entity_id(entity_id: &str) -> String {
    entity_id.replace('-', "")
}

/// Deduplicate a witness list by normalised form, preserving the first
/// original string for each token and its order of appearance.
pub fn dedup_witnesses(witnesses: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for w in witnesses {
        if seen.insert(normalize_entity_id(w)) {
            out.push(w.clone());
        }
    }
    out
}

/// Current UTC time as RFC-3339 with a trailing `Z`.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Validate a client timestamp: must parse as RFC-3339 and end in `Z`.
pub fn validate_timestamp(ts: &str) -> Result<(), String> {
    if !ts.ends_with('Z') {
        return Err(format!("timestamp must be UTC with trailing Z: {ts}"));
    }
    chrono::DateTime::parse_from_rfc3339(ts)
        .map(|_| ())
        .map_err(|e| format!("timestamp does not parse as RFC-3339: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn memory_type_round_trip() {
        for t in [
            "fact",
            "preference",
            "event",
            "solution",
            "insight",
            "decision",
            "pattern",
            "conversation",
            "legacy_single_agent",
        ] {
            assert_eq!(MemoryType::from_str(t).unwrap().as_str(), t);
        }
        assert!(MemoryType::from_str("gossip").is_err());
    }

    #[test]
    fn privacy_default_is_participants_only() {
        assert_eq!(PrivacyLevel::default(), PrivacyLevel::ParticipantsOnly);
    }

    #[test]
    fn normalisation_strips_hyphens_and_is_idempotent() {
        let once = normalize_entity_id("human-alice-123");
        assert_eq!(once, "humanalice123");
        assert_eq!(normalize_entity_id(&once), once);
    }

    #[test]
    fn dedup_preserves_first_original() {
        let witnesses = vec![
            "human-alice-123".to_string(),
            "humanalice123".to_string(),
            "claude-prime".to_string(),
        ];
        let deduped = dedup_witnesses(&witnesses);
        assert_eq!(deduped, vec!["human-alice-123", "claude-prime"]);
    }

    #[test]
    fn memory_ids_have_expected_shape() {
        let id = new_memory_id();
        assert!(id.starts_with("mem-"));
        assert_eq!(id.len(), 16);
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(new_memory_id(), id);
    }

    #[test]
    fn timestamp_validation() {
        assert!(validate_timestamp("2026-08-02T10:00:00Z").is_ok());
        assert!(validate_timestamp("2026-08-02T10:00:00.123456Z").is_ok());
        // Missing Z
        assert!(validate_timestamp("2026-08-02T10:00:00+00:00").is_err());
        assert!(validate_timestamp("not a timestamp").is_err());
        assert!(validate_timestamp("").is_err());
    }

    #[test]
    fn now_has_trailing_z() {
        assert!(now_rfc3339().ends_with('Z'));
        assert!(validate_timestamp(&now_rfc3339()).is_ok());
    }
}
