//! The memory engine — async orchestration over the store for both transports.
//!
//! One engine serves single-agent and multi-entity traffic: a single-agent
//! store wraps the record as a multi-entity memory with
//! `witnessed_by = {agent_id}` and `situation_type = "legacy_single_agent"`.
//! Database work runs on the blocking pool behind an `Arc<Mutex<Connection>>`;
//! no lock is held across an await point. Every public operation runs under
//! the configured request deadline and returns `Timeout` when it expires.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::EngramConfig;
use crate::curator::Curator;
use crate::db;
use crate::embedding::EmbeddingProvider;
use crate::error::{EngramError, EngramResult};
use crate::memory::retrieve::{
    self, content_preview, EntityFilters, OrderingCriterion, RetrievalFilters, RetrievalOptions,
    RetrievalQuery, ResonanceVector, TagFilter,
};
use crate::memory::types::{
    dedup_witnesses, new_memory_id, new_situation_id, now_rfc3339, situation_types,
    validate_timestamp, Annotation, CausalityInfo, MemoryContent, MemoryMetadata, MemoryRecord,
    PrivacyLevel, RetentionInfo, Situation,
};
use crate::memory::{access, annotate, stats, store};

// ── Request/response shapes ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StoreSingleRequest {
    pub content: MemoryContent,
    pub primary_vector: Vec<f32>,
    pub metadata: MemoryMetadata,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub causality: Option<CausalityInfo>,
    #[serde(default)]
    pub retention: Option<RetentionInfo>,
}

#[derive(Debug, Deserialize)]
pub struct StoreMultiRequest {
    pub witnessed_by: Vec<String>,
    pub situation_type: String,
    #[serde(default)]
    pub situation_id: Option<String>,
    pub content: MemoryContent,
    pub primary_vector: Vec<f32>,
    pub metadata: MemoryMetadata,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub causality: Option<CausalityInfo>,
    #[serde(default)]
    pub retention: Option<RetentionInfo>,
    #[serde(default)]
    pub access_control: Option<AccessControlOptions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessControlOptions {
    #[serde(default)]
    pub privacy_level: Option<PrivacyLevel>,
}

#[derive(Debug, Serialize)]
pub struct StoreResponse {
    pub memory_id: String,
    pub status: String,
    pub timestamp: String,
    pub vector_dimensions: usize,
    pub situation_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RetrieveSingleRequest {
    pub resonance_vectors: Vec<ResonanceVector>,
    #[serde(default)]
    pub tags: Option<TagFilter>,
    #[serde(default)]
    pub filters: Option<RetrievalFilters>,
    #[serde(default)]
    pub retrieval: Option<RetrievalOptions>,
    #[serde(default)]
    pub ordering: Option<Vec<OrderingCriterion>>,
}

#[derive(Debug, Deserialize)]
pub struct RetrieveMultiRequest {
    pub requesting_entity: String,
    pub resonance_vectors: Vec<ResonanceVector>,
    #[serde(default)]
    pub tags: Option<TagFilter>,
    #[serde(default)]
    pub filters: Option<RetrievalFilters>,
    #[serde(default)]
    pub entity_filters: Option<EntityFilters>,
    #[serde(default)]
    pub retrieval: Option<RetrievalOptions>,
    #[serde(default)]
    pub ordering: Option<Vec<OrderingCriterion>>,
}

#[derive(Debug, Serialize)]
pub struct MemorySearchResult {
    pub memory_id: String,
    pub similarity_score: f64,
    pub content_preview: String,
    pub metadata: MemoryMetadata,
    pub tags: Vec<String>,
    pub media_count: usize,
    pub annotation_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub situation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub co_participants: Option<Vec<String>>,
    /// Causality parents still present in the store (dangling IDs filtered).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causality_parents: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct RetrieveResponse {
    pub memories: Vec<MemorySearchResult>,
    pub total_found: usize,
    pub search_time_ms: u64,
    pub query_vector_dims: usize,
}

#[derive(Debug, Serialize)]
pub struct EntityVerification {
    pub requesting_entity: String,
    pub search_scope: String,
}

#[derive(Debug, Serialize)]
pub struct RetrieveMultiResponse {
    pub memories: Vec<MemorySearchResult>,
    pub total_found: usize,
    pub access_granted_count: usize,
    pub access_denied_count: usize,
    pub search_time_ms: u64,
    pub query_vector_dims: usize,
    pub entity_verification: EntityVerification,
}

// ── Engine ────────────────────────────────────────────────────────────────────

pub struct MemoryEngine {
    db: Arc<Mutex<Connection>>,
    embedder: Arc<dyn EmbeddingProvider>,
    curator: Arc<dyn Curator>,
    config: Arc<EngramConfig>,
}

impl MemoryEngine {
    pub fn new(
        conn: Connection,
        embedder: Arc<dyn EmbeddingProvider>,
        curator: Arc<dyn Curator>,
        config: Arc<EngramConfig>,
    ) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            embedder,
            curator,
            config,
        }
    }

    pub fn config(&self) -> &EngramConfig {
        &self.config
    }

    pub fn curator(&self) -> &dyn Curator {
        self.curator.as_ref()
    }

    pub fn dimensions(&self) -> usize {
        self.config.vector.dimensions
    }

    /// Embed text via the configured provider, enforcing the deployment
    /// dimension.
    pub async fn embed(&self, text: &str) -> EngramResult<Vec<f32>> {
        let deadline = self.deadline();
        match tokio::time::timeout(deadline, self.embedder.embed(text)).await {
            Ok(result) => result,
            Err(_) => Err(EngramError::Timeout("embedding call deadline expired".into())),
        }
    }

    // ── Store ────────────────────────────────────────────────────────────────

    /// Single-agent store: wrapped as a multi-entity record witnessed by the
    /// agent alone.
    pub async fn store_single(&self, request: StoreSingleRequest) -> EngramResult<StoreResponse> {
        let agent_id = request
            .metadata
            .agent_id
            .clone()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| EngramError::invalid("metadata.agent_id is required"))?;

        let record = self.build_record(
            vec![agent_id],
            situation_types::LEGACY_SINGLE_AGENT.to_string(),
            None,
            request.content,
            request.primary_vector,
            request.metadata,
            request.tags,
            request.causality,
            request.retention,
            PrivacyLevel::ParticipantsOnly,
        )?;
        self.put_record(record).await
    }

    /// Multi-entity store with an explicit witness set.
    pub async fn store_multi(&self, request: StoreMultiRequest) -> EngramResult<StoreResponse> {
        if request.situation_type.is_empty() {
            return Err(EngramError::invalid("situation_type is required"));
        }
        let privacy = request
            .access_control
            .as_ref()
            .and_then(|ac| ac.privacy_level)
            .unwrap_or_default();

        let record = self.build_record(
            request.witnessed_by,
            request.situation_type,
            request.situation_id,
            request.content,
            request.primary_vector,
            request.metadata,
            request.tags,
            request.causality,
            request.retention,
            privacy,
        )?;
        self.put_record(record).await
    }

    /// Validate and persist a fully-built record.
    pub async fn put_record(&self, record: MemoryRecord) -> EngramResult<StoreResponse> {
        let dimensions = self.dimensions();
        let memory_id = record.memory_id.clone();
        let situation_id = record.situation_id.clone();

        self.with_deadline(self.run_blocking(move |conn| store::put(conn, &record, dimensions)))
            .await?;

        tracing::info!(memory_id = %memory_id, situation_id = %situation_id, "memory stored");
        Ok(StoreResponse {
            memory_id,
            status: "stored".to_string(),
            timestamp: now_rfc3339(),
            vector_dimensions: dimensions,
            situation_id,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn build_record(
        &self,
        witnessed_by: Vec<String>,
        situation_type: String,
        situation_id: Option<String>,
        content: MemoryContent,
        primary_vector: Vec<f32>,
        metadata: MemoryMetadata,
        tags: Vec<String>,
        causality: Option<CausalityInfo>,
        retention: Option<RetentionInfo>,
        privacy_level: PrivacyLevel,
    ) -> EngramResult<MemoryRecord> {
        if content.text.is_empty() {
            return Err(EngramError::invalid("content.text must not be empty"));
        }
        validate_timestamp(&metadata.timestamp).map_err(EngramError::invalid)?;
        store::validate_vector(&primary_vector, self.dimensions())
            .map_err(|e| EngramError::invalid(format!("primary_vector: {e}")))?;

        let witnessed_by = dedup_witnesses(&witnessed_by);
        if witnessed_by.is_empty() {
            return Err(EngramError::invalid("witnessed_by must not be empty"));
        }

        if let Some(causality) = &causality {
            if causality.parent_memories.len() != causality.influence_strength.len() {
                return Err(EngramError::invalid(
                    "causality.parent_memories and causality.influence_strength must have equal length",
                ));
            }
            if causality
                .influence_strength
                .iter()
                .any(|s| !(0.0..=1.0).contains(s))
            {
                return Err(EngramError::invalid(
                    "causality.influence_strength values must be in [0, 1]",
                ));
            }
        }

        Ok(MemoryRecord {
            memory_id: new_memory_id(),
            content,
            vector: primary_vector,
            metadata,
            tags,
            witnessed_by,
            situation_id: situation_id
                .filter(|s| !s.is_empty())
                .unwrap_or_else(new_situation_id),
            situation_type,
            privacy_level,
            causality,
            retention,
            created_at: now_rfc3339(),
            access_count: 0,
            last_accessed_at: None,
        })
    }

    // ── Retrieve ─────────────────────────────────────────────────────────────

    /// Legacy single-agent retrieval: unscoped search over the unified store.
    pub async fn retrieve_single(
        &self,
        request: RetrieveSingleRequest,
    ) -> EngramResult<RetrieveResponse> {
        let query = RetrievalQuery {
            resonance_vectors: request.resonance_vectors,
            requesting_entity: None,
            tags: request.tags,
            filters: request.filters,
            entity_filters: None,
            options: request.retrieval.unwrap_or_else(|| self.default_options()),
            ordering: request.ordering,
        };

        let started = Instant::now();
        let outcome = self.search(query).await?;
        let search_time_ms = started.elapsed().as_millis() as u64;

        let memories = self.shape_results(outcome.hits, false).await?;
        Ok(RetrieveResponse {
            memories,
            total_found: outcome.total_found,
            search_time_ms,
            query_vector_dims: outcome.query_vector_dims,
        })
    }

    /// Witness-scoped retrieval. The search never leaves the requesting
    /// entity's witnessed memories.
    pub async fn retrieve_multi(
        &self,
        request: RetrieveMultiRequest,
    ) -> EngramResult<RetrieveMultiResponse> {
        if request.requesting_entity.is_empty() {
            return Err(EngramError::invalid("requesting_entity is required"));
        }
        let requesting_entity = request.requesting_entity.clone();

        let query = RetrievalQuery {
            resonance_vectors: request.resonance_vectors,
            requesting_entity: Some(requesting_entity.clone()),
            tags: request.tags,
            filters: request.filters,
            entity_filters: request.entity_filters,
            options: request.retrieval.unwrap_or_else(|| self.default_options()),
            ordering: request.ordering,
        };

        let started = Instant::now();
        let outcome = self.search(query).await?;
        let search_time_ms = started.elapsed().as_millis() as u64;

        let access_granted_count = outcome.hits.len();
        let memories = self.shape_results(outcome.hits, true).await?;

        Ok(RetrieveMultiResponse {
            memories,
            total_found: outcome.total_found,
            access_granted_count,
            access_denied_count: outcome.access_denied_count,
            search_time_ms,
            query_vector_dims: outcome.query_vector_dims,
            entity_verification: EntityVerification {
                requesting_entity,
                search_scope: "witnessed_memories_only".to_string(),
            },
        })
    }

    async fn search(
        &self,
        query: RetrievalQuery,
    ) -> EngramResult<retrieve::SearchOutcome> {
        let dimensions = self.dimensions();
        let pool_min = self.config.retrieval.candidate_pool_min;
        self.with_deadline(
            self.run_blocking(move |conn| retrieve::search(conn, &query, dimensions, pool_min)),
        )
        .await
    }

    fn default_options(&self) -> RetrievalOptions {
        RetrievalOptions {
            top_k: self.config.retrieval.default_top_k,
            similarity_threshold: self.config.retrieval.default_similarity_threshold,
            diversity_lambda: None,
            boost_recent: None,
            exclude_denials: true,
        }
    }

    async fn shape_results(
        &self,
        hits: Vec<retrieve::RetrievedMemory>,
        multi: bool,
    ) -> EngramResult<Vec<MemorySearchResult>> {
        let ids: Vec<String> = hits.iter().map(|h| h.record.memory_id.clone()).collect();
        let annotation_counts: Vec<u32> = self
            .run_blocking(move |conn| {
                ids.iter().map(|id| annotate::count(conn, id)).collect()
            })
            .await?;

        // Filter dangling causality parents out of the response.
        let parent_ids: Vec<Vec<String>> = hits
            .iter()
            .map(|h| {
                h.record
                    .causality
                    .as_ref()
                    .map(|c| c.parent_memories.clone())
                    .unwrap_or_default()
            })
            .collect();
        let live_parents: Vec<Vec<String>> = self
            .run_blocking(move |conn| {
                let mut out = Vec::with_capacity(parent_ids.len());
                for parents in &parent_ids {
                    let mut live = Vec::new();
                    for parent in parents {
                        if store::try_get(conn, parent)?.is_some() {
                            live.push(parent.clone());
                        }
                    }
                    out.push(live);
                }
                Ok(out)
            })
            .await?;

        Ok(hits
            .into_iter()
            .zip(annotation_counts)
            .zip(live_parents)
            .map(|((hit, annotation_count), parents)| {
                let record = hit.record;
                MemorySearchResult {
                    memory_id: record.memory_id,
                    similarity_score: hit.similarity,
                    content_preview: content_preview(&record.content.text),
                    metadata: record.metadata,
                    tags: record.tags,
                    media_count: record.content.media.len(),
                    annotation_count,
                    situation_id: multi.then_some(record.situation_id),
                    co_participants: multi.then_some(record.witnessed_by),
                    causality_parents: if parents.is_empty() { None } else { Some(parents) },
                }
            })
            .collect())
    }

    // ── Point reads, annotations, situations ─────────────────────────────────

    /// Read one memory. With a requesting entity, the witness predicate is
    /// applied and denials surface as `NotFound` so existence is not leaked.
    pub async fn get(
        &self,
        memory_id: &str,
        requesting_entity: Option<&str>,
    ) -> EngramResult<MemoryRecord> {
        let id = memory_id.to_string();
        let entity = requesting_entity.map(|s| s.to_string());
        self.with_deadline(self.run_blocking(move |conn| {
            let record = store::get(conn, &id)?;
            if let Some(entity) = &entity {
                if !access::allow(&record, entity) {
                    return Err(EngramError::not_found("memory", &id));
                }
            }
            store::touch_access(conn, &[id.as_str()])?;
            Ok(record)
        }))
        .await
    }

    /// Append an annotation. Only a witness of the parent may annotate.
    pub async fn annotate(&self, memory_id: &str, annotation: Annotation) -> EngramResult<()> {
        if annotation.annotator_id.is_empty() {
            return Err(EngramError::invalid("annotator_id is required"));
        }
        if annotation.content.is_empty() {
            return Err(EngramError::invalid("annotation content must not be empty"));
        }
        if let Some(vector) = &annotation.vector {
            store::validate_vector(vector, self.dimensions())
                .map_err(|e| EngramError::invalid(format!("annotation vector: {e}")))?;
        }

        let id = memory_id.to_string();
        self.with_deadline(self.run_blocking(move |conn| {
            let record = store::get(conn, &id)?;
            if !access::allow(&record, &annotation.annotator_id) {
                return Err(EngramError::Forbidden(format!(
                    "{} is not a witness of {id}",
                    annotation.annotator_id
                )));
            }
            annotate::append(conn, &id, &annotation)
        }))
        .await
    }

    pub async fn annotations(&self, memory_id: &str) -> EngramResult<Vec<Annotation>> {
        let id = memory_id.to_string();
        self.run_blocking(move |conn| {
            // Listing annotations of an unknown memory is NotFound, not empty.
            store::get(conn, &id)?;
            annotate::list(conn, &id)
        })
        .await
    }

    /// Situations in which the entity appears, ordered by last activity.
    pub async fn situations_for(&self, entity_id: &str) -> EngramResult<Vec<Situation>> {
        let entity = entity_id.to_string();
        self.run_blocking(move |conn| crate::memory::situations::for_entity(conn, &entity))
            .await
    }

    pub async fn recent(
        &self,
        limit: usize,
        requesting_entity: Option<String>,
    ) -> EngramResult<Vec<MemoryRecord>> {
        self.run_blocking(move |conn| {
            retrieve::recent(conn, limit, requesting_entity.as_deref())
        })
        .await
    }

    pub async fn delete(&self, memory_id: &str) -> EngramResult<bool> {
        let id = memory_id.to_string();
        self.run_blocking(move |conn| store::delete(conn, &id)).await
    }

    // ── Stats, health, admin ─────────────────────────────────────────────────

    pub async fn stats(&self) -> EngramResult<stats::StatsResponse> {
        self.run_blocking(|conn| stats::global_stats(conn)).await
    }

    pub async fn entity_stats(&self, entity_id: &str) -> EngramResult<stats::EntityStatsResponse> {
        let entity = entity_id.to_string();
        self.run_blocking(move |conn| stats::entity_stats(conn, &entity))
            .await
    }

    pub async fn health(&self) -> EngramResult<db::HealthReport> {
        self.run_blocking(|conn| {
            db::check_database_health(conn).map_err(|e| EngramError::Storage(e.to_string()))
        })
        .await
    }

    /// Admin: drop all records while preserving schema and index definitions.
    pub async fn flush_memories(&self) -> EngramResult<usize> {
        self.run_blocking(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?;
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM memories", [])?;
            tx.execute("DELETE FROM memories_vec", [])?;
            tx.execute("DELETE FROM situations", [])?;
            store::write_audit_log(&tx, "flush", "all", None)?;
            tx.commit()?;
            Ok(count as usize)
        })
        .await
    }

    /// Admin: drop and recreate the vec0 table, re-inserting every stored
    /// embedding. Recovers from index corruption without touching records.
    pub async fn recreate_indexes(&self) -> EngramResult<usize> {
        let dimensions = self.dimensions();
        self.run_blocking(move |conn| {
            conn.execute("DROP TABLE IF EXISTS memories_vec", [])?;
            crate::db::schema::init_vec_table(conn, dimensions)?;

            let rows: Vec<(String, Vec<u8>)> = {
                let mut stmt = conn.prepare("SELECT id, embedding FROM memories")?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            };
            let mut reindexed = 0usize;
            for (id, blob) in rows {
                let unit = crate::memory::l2_normalize(&crate::memory::bytes_to_embedding(&blob));
                conn.execute(
                    "INSERT INTO memories_vec (id, embedding) VALUES (?1, ?2)",
                    rusqlite::params![id, crate::memory::embedding_to_bytes(&unit)],
                )?;
                reindexed += 1;
            }
            Ok(reindexed)
        })
        .await
    }

    /// Record one curation pass for the per-entity stats endpoint.
    pub async fn record_curation(
        &self,
        entity_id: &str,
        observations: usize,
        stored: usize,
        rejected: usize,
    ) -> EngramResult<()> {
        let entity = entity_id.to_string();
        self.run_blocking(move |conn| {
            stats::record_curation(conn, &entity, observations, stored, rejected)
        })
        .await
    }

    // ── Cleanup jobs (invoked by the scheduler and admin surface) ────────────

    pub async fn run_expiry(&self) -> EngramResult<crate::memory::cleanup::CleanupSummary> {
        self.run_blocking(crate::memory::cleanup::expire_ttl).await
    }

    pub async fn run_consolidation(&self) -> EngramResult<crate::memory::cleanup::CleanupSummary> {
        let config = self.config.cleanup.clone();
        self.run_blocking(move |conn| crate::memory::cleanup::consolidate(conn, &config))
            .await
    }

    pub async fn run_decay(&self) -> EngramResult<crate::memory::cleanup::CleanupSummary> {
        let config = self.config.cleanup.clone();
        self.run_blocking(move |conn| crate::memory::cleanup::decay_importance(conn, &config))
            .await
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn deadline(&self) -> Duration {
        Duration::from_secs(self.config.server.request_timeout_secs)
    }

    async fn with_deadline<T>(
        &self,
        fut: impl Future<Output = EngramResult<T>>,
    ) -> EngramResult<T> {
        match tokio::time::timeout(self.deadline(), fut).await {
            Ok(result) => result,
            Err(_) => Err(EngramError::Timeout("request deadline expired".into())),
        }
    }

    async fn run_blocking<T, F>(&self, f: F) -> EngramResult<T>
    where
        F: FnOnce(&mut Connection) -> EngramResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| EngramError::Storage(format!("db lock poisoned: {e}")))?;
            f(&mut *conn)
        })
        .await?
    }
}
