//! Witness-scoped retrieval — KNN with filters, similarity floor, recency
//! boost, MMR diversity, and ordering.
//!
//! The query pipeline: combine resonance vectors (weighted mean, renormalised
//! to unit length) → vec0 KNN over a candidate pool of `max(4·top_k, pool_min)`
//! → witness scope → structured filters → similarity floor → denial-content
//! filter → recency boost → optional MMR re-rank → ordering → top_k cut →
//! access tracking.
//!
//! The similarity floor is applied before MMR, so a caller's threshold is an
//! absolute contract. `boost_recent` is additive: `score += boost ·
//! exp(-age_days/30)`.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{EngramError, EngramResult};
use crate::memory::access;
use crate::memory::store::{self, validate_vector};
use crate::memory::types::{normalize_entity_id, MemoryRecord};
use crate::memory::{cosine_similarity, embedding_to_bytes, l2_distance_to_cosine, l2_normalize};

// ── Request types ─────────────────────────────────────────────────────────────

/// A query embedding with a weight; multiple resonance vectors are combined
/// into a single query direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResonanceVector {
    pub vector: Vec<f32>,
    #[serde(default = "default_weight")]
    pub weight: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

fn default_weight() -> f32 {
    1.0
}

/// Include/exclude tag predicates: AND of includes, AND-NOT of excludes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagFilter {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimestampRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_range: Option<TimestampRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domains: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub situation_types: Option<Vec<String>>,
}

/// Entity-level filters for multi-entity retrieval.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityFilters {
    /// Every listed entity must be in the memory's witness set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub co_participants: Option<Vec<String>>,
    /// Reject memories whose witness set, minus the requester, is exactly
    /// this set (memories private to those entities).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_private_to: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalOptions {
    pub top_k: usize,
    pub similarity_threshold: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diversity_lambda: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boost_recent: Option<f64>,
    /// Drop memories whose content is an assistant denial ("I don't have
    /// access...", "I can't recall..."). On by default for witness-scoped
    /// searches; such memories are noise when re-feeding context to an agent.
    #[serde(default = "default_exclude_denials")]
    pub exclude_denials: bool,
}

fn default_exclude_denials() -> bool {
    true
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            similarity_threshold: 0.7,
            diversity_lambda: None,
            boost_recent: None,
            exclude_denials: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderingCriterion {
    pub field: String,
    #[serde(default = "default_direction")]
    pub direction: String,
}

fn default_direction() -> String {
    "desc".to_string()
}

/// A fully-resolved retrieval query against the store.
#[derive(Debug, Clone, Default)]
pub struct RetrievalQuery {
    pub resonance_vectors: Vec<ResonanceVector>,
    /// When set, the search is scoped to this entity's witnessed memories.
    pub requesting_entity: Option<String>,
    pub tags: Option<TagFilter>,
    pub filters: Option<RetrievalFilters>,
    pub entity_filters: Option<EntityFilters>,
    pub options: RetrievalOptions,
    pub ordering: Option<Vec<OrderingCriterion>>,
}

// ── Result types ──────────────────────────────────────────────────────────────

/// One retrieved record with its similarity score.
#[derive(Debug)]
pub struct RetrievedMemory {
    pub record: MemoryRecord,
    pub similarity: f64,
}

/// Raw search outcome before protocol shaping.
#[derive(Debug)]
pub struct SearchOutcome {
    pub hits: Vec<RetrievedMemory>,
    /// Matches surviving all filters, before the top_k cut.
    pub total_found: usize,
    /// Candidates rejected by the defence-in-depth access check.
    pub access_denied_count: usize,
    pub query_vector_dims: usize,
}

// ── Query combination ─────────────────────────────────────────────────────────

/// Combine resonance vectors by weighted mean, then renormalise to unit
/// length. Order-invariant for equal weights.
pub fn combine_resonance(
    vectors: &[ResonanceVector],
    dimensions: usize,
) -> EngramResult<Vec<f32>> {
    if vectors.is_empty() {
        return Err(EngramError::invalid("resonance_vectors must not be empty"));
    }
    for (i, rv) in vectors.iter().enumerate() {
        validate_vector(&rv.vector, dimensions)
            .map_err(|e| EngramError::invalid(format!("resonance_vectors[{i}]: {e}")))?;
        if !rv.weight.is_finite() || rv.weight < 0.0 {
            return Err(EngramError::invalid(format!(
                "resonance_vectors[{i}]: weight must be a non-negative finite number"
            )));
        }
    }

    let total_weight: f32 = vectors.iter().map(|rv| rv.weight).sum();
    if total_weight <= 0.0 {
        return Err(EngramError::invalid("resonance vector weights sum to zero"));
    }

    let mut combined = vec![0.0f32; dimensions];
    for rv in vectors {
        let w = rv.weight / total_weight;
        for (acc, x) in combined.iter_mut().zip(rv.vector.iter()) {
            *acc += w * x;
        }
    }
    Ok(l2_normalize(&combined))
}

// ── Search ────────────────────────────────────────────────────────────────────

/// Run a retrieval query. `pool_min` is the configured candidate pool floor.
pub fn search(
    conn: &Connection,
    query: &RetrievalQuery,
    dimensions: usize,
    pool_min: usize,
) -> EngramResult<SearchOutcome> {
    let combined = combine_resonance(&query.resonance_vectors, dimensions)?;

    if query.options.top_k == 0 {
        return Ok(SearchOutcome {
            hits: Vec::new(),
            total_found: 0,
            access_denied_count: 0,
            query_vector_dims: dimensions,
        });
    }

    let pool = (4 * query.options.top_k).max(pool_min);
    let candidates = knn_candidates(conn, &combined, pool, query.requesting_entity.as_deref())?;

    let mut access_denied_count = 0usize;
    let mut scored: Vec<RetrievedMemory> = Vec::new();

    for (memory_id, distance) in candidates {
        let Some(record) = store::try_get(conn, &memory_id)? else {
            continue;
        };

        // Defence in depth: the KNN join is already witness-scoped, but every
        // candidate is re-checked against the access predicate.
        if let Some(entity) = &query.requesting_entity {
            if !access::allow(&record, entity) {
                access_denied_count += 1;
                continue;
            }
        }

        if !passes_filters(&record, query) {
            continue;
        }

        let similarity = l2_distance_to_cosine(distance);
        if similarity < query.options.similarity_threshold as f64 {
            continue;
        }

        // Witness-scoped searches drop stored assistant denials by default.
        if query.requesting_entity.is_some()
            && query.options.exclude_denials
            && is_denial_content(&record.content.text)
        {
            tracing::debug!(memory_id = %record.memory_id, "filtered out denial memory");
            continue;
        }

        scored.push(RetrievedMemory { record, similarity });
    }

    // Recency boost is additive on the similarity score.
    if let Some(boost) = query.options.boost_recent {
        if boost > 0.0 {
            let now = chrono::Utc::now();
            for hit in &mut scored {
                hit.similarity += boost * recency_factor(&hit.record.created_at, now);
            }
        }
    }

    let total_found = scored.len();

    // MMR diversity over the surviving pool.
    if let Some(lambda) = query.options.diversity_lambda {
        if lambda > 0.0 && scored.len() > 1 {
            scored = mmr_rerank(scored, lambda);
        }
    }

    apply_ordering(&mut scored, query.ordering.as_deref());
    scored.truncate(query.options.top_k);

    let returned_ids: Vec<&str> = scored.iter().map(|h| h.record.memory_id.as_str()).collect();
    store::touch_access(conn, &returned_ids)?;

    Ok(SearchOutcome {
        hits: scored,
        total_found,
        access_denied_count,
        query_vector_dims: dimensions,
    })
}

/// The most recent memories, optionally witness-scoped. Used by the MCP
/// `list_recent_memories` tool.
pub fn recent(
    conn: &Connection,
    limit: usize,
    requesting_entity: Option<&str>,
) -> EngramResult<Vec<MemoryRecord>> {
    let ids: Vec<String> = match requesting_entity {
        Some(entity) => {
            let mut stmt = conn.prepare(
                "SELECT m.id FROM memories m \
                 JOIN memory_witnesses w ON w.memory_id = m.id \
                 WHERE w.entity_id_norm = ?1 \
                 ORDER BY m.created_at DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![normalize_entity_id(entity), limit as i64], |row| {
                    row.get(0)
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id FROM memories ORDER BY created_at DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit as i64], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };

    let mut records = Vec::with_capacity(ids.len());
    for id in &ids {
        if let Some(record) = store::try_get(conn, id)? {
            records.push(record);
        }
    }
    Ok(records)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// vec0 KNN over the candidate pool. When an entity is given, the candidate
/// set is joined against the witness index so the scope predicate is part of
/// the query itself, not only a post-filter.
fn knn_candidates(
    conn: &Connection,
    query_vector: &[f32],
    pool: usize,
    requesting_entity: Option<&str>,
) -> EngramResult<Vec<(String, f64)>> {
    let query_bytes = embedding_to_bytes(query_vector);

    let results = match requesting_entity {
        Some(entity) => {
            let mut stmt = conn.prepare(
                "SELECT v.id, v.distance FROM \
                 (SELECT id, distance FROM memories_vec WHERE embedding MATCH ?1 \
                  ORDER BY distance LIMIT ?2) v \
                 JOIN memory_witnesses w ON w.memory_id = v.id \
                 WHERE w.entity_id_norm = ?3 \
                 ORDER BY v.distance",
            )?;
            let rows = stmt
                .query_map(
                    params![query_bytes, pool as i64, normalize_entity_id(entity)],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
                )?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id, distance FROM memories_vec WHERE embedding MATCH ?1 \
                 ORDER BY distance LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![query_bytes, pool as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(results)
}

fn passes_filters(record: &MemoryRecord, query: &RetrievalQuery) -> bool {
    if let Some(tags) = &query.tags {
        for include in &tags.include {
            if !record.tags.iter().any(|t| t == include) {
                return false;
            }
        }
        for exclude in &tags.exclude {
            if record.tags.iter().any(|t| t == exclude) {
                return false;
            }
        }
    }

    if let Some(filters) = &query.filters {
        if let Some(types) = &filters.memory_types {
            if !types.iter().any(|t| t == record.metadata.memory_type.as_str()) {
                return false;
            }
        }
        if let Some(agents) = &filters.agent_ids {
            match &record.metadata.agent_id {
                Some(agent) if agents.contains(agent) => {}
                _ => return false,
            }
        }
        if let Some(domains) = &filters.domains {
            match &record.metadata.domain {
                Some(domain) if domains.contains(domain) => {}
                _ => return false,
            }
        }
        if let Some(threshold) = filters.confidence_threshold {
            if record.metadata.confidence.unwrap_or(0.0) < threshold {
                return false;
            }
        }
        if let Some(situation_types) = &filters.situation_types {
            if !situation_types.contains(&record.situation_type) {
                return false;
            }
        }
        if let Some(range) = &filters.timestamp_range {
            if !within_range(&record.metadata.timestamp, range) {
                return false;
            }
        }
    }

    if let Some(entity_filters) = &query.entity_filters {
        let witness_norms: HashSet<String> = record
            .witnessed_by
            .iter()
            .map(|w| normalize_entity_id(w))
            .collect();

        if let Some(co_participants) = &entity_filters.co_participants {
            for participant in co_participants {
                if !witness_norms.contains(&normalize_entity_id(participant)) {
                    return false;
                }
            }
        }

        if let Some(private_to) = &entity_filters.exclude_private_to {
            let requester_norm = query
                .requesting_entity
                .as_deref()
                .map(normalize_entity_id);
            let mut others: HashSet<String> = witness_norms;
            if let Some(requester) = &requester_norm {
                others.remove(requester);
            }
            let excluded: HashSet<String> =
                private_to.iter().map(|e| normalize_entity_id(e)).collect();
            if !others.is_empty() && others == excluded {
                return false;
            }
        }
    }

    true
}

/// Phrases marking a memory as a stored assistant denial rather than real
/// information. Matched as lowercase substrings of the content.
const DENIAL_PHRASES: &[&str] = &[
    "don't have access",
    "don't know",
    "sorry",
    "can't",
    "unable",
    "i don't have",
    "i'm sorry",
    "i cannot",
    "no access to personal data",
    "don't remember",
    "can't remember",
    "no memory of",
    "not familiar with",
    "haven't mentioned",
    "you haven't",
    "didn't tell me",
    "haven't told me",
    "haven't shared",
    "not provided",
    "haven't provided",
    "no information about",
    "would need you to",
    "please tell me",
    "feel free to share",
    "happy to help",
    "don't recall",
    "can't recall",
    "no record of",
    "not aware of",
];

fn is_denial_content(text: &str) -> bool {
    let lowered = text.to_lowercase();
    DENIAL_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

fn within_range(timestamp: &str, range: &TimestampRange) -> bool {
    let Ok(ts) = chrono::DateTime::parse_from_rfc3339(timestamp) else {
        return false;
    };
    if let Some(after) = &range.after {
        if let Ok(bound) = chrono::DateTime::parse_from_rfc3339(after) {
            if ts < bound {
                return false;
            }
        }
    }
    if let Some(before) = &range.before {
        if let Ok(bound) = chrono::DateTime::parse_from_rfc3339(before) {
            if ts > bound {
                return false;
            }
        }
    }
    true
}

/// exp(-age_days/30): 1.0 for brand-new memories, ~0.37 at a month.
fn recency_factor(created_at: &str, now: chrono::DateTime<chrono::Utc>) -> f64 {
    let Ok(created) = chrono::DateTime::parse_from_rfc3339(created_at) else {
        return 0.0;
    };
    let age_days = (now - created.with_timezone(&chrono::Utc)).num_seconds() as f64 / 86_400.0;
    (-age_days.max(0.0) / 30.0).exp()
}

/// Maximal Marginal Relevance re-rank.
///
/// `lambda` is the diversity weight: selection score is
/// `(1-λ)·similarity - λ·max_redundancy` where redundancy is cosine
/// similarity to already-selected records.
fn mmr_rerank(hits: Vec<RetrievedMemory>, lambda: f64) -> Vec<RetrievedMemory> {
    let lambda = lambda.clamp(0.0, 1.0);
    let mut remaining = hits;
    let mut selected: Vec<RetrievedMemory> = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (i, candidate) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|s| cosine_similarity(&candidate.record.vector, &s.record.vector) as f64)
                .fold(0.0f64, f64::max);
            let score = (1.0 - lambda) * candidate.similarity - lambda * redundancy;
            if score > best_score {
                best_score = score;
                best_idx = i;
            }
        }
        selected.push(remaining.swap_remove(best_idx));
    }
    selected
}

fn apply_ordering(hits: &mut [RetrievedMemory], ordering: Option<&[OrderingCriterion]>) {
    let Some(criteria) = ordering.filter(|c| !c.is_empty()) else {
        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        return;
    };

    hits.sort_by(|a, b| {
        for criterion in criteria {
            let cmp = match criterion.field.as_str() {
                "timestamp" => a.record.metadata.timestamp.cmp(&b.record.metadata.timestamp),
                "importance" => a
                    .record
                    .metadata
                    .importance
                    .unwrap_or(0.0)
                    .partial_cmp(&b.record.metadata.importance.unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal),
                "confidence" => a
                    .record
                    .metadata
                    .confidence
                    .unwrap_or(0.0)
                    .partial_cmp(&b.record.metadata.confidence.unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal),
                _ => a
                    .similarity
                    .partial_cmp(&b.similarity)
                    .unwrap_or(std::cmp::Ordering::Equal),
            };
            let cmp = if criterion.direction == "asc" { cmp } else { cmp.reverse() };
            if cmp != std::cmp::Ordering::Equal {
                return cmp;
            }
        }
        std::cmp::Ordering::Equal
    });
}

/// First 200 chars of content text, on a char boundary.
pub fn content_preview(text: &str) -> String {
    const MAX: usize = 200;
    if text.len() <= MAX {
        text.to_string()
    } else {
        let end = text
            .char_indices()
            .take_while(|(i, _)| *i < MAX)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(MAX);
        text[..end].to_string()
    }
}
