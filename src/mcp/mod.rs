//! MCP tool surface.
//!
//! Exposes six tools over the Model Context Protocol: `store_memory`,
//! `retrieve_memories`, `get_memory`, `list_recent_memories`,
//! `get_memory_stats`, and the unified `memory` tool that routes natural
//! language to store or retrieve. All tools return text content blocks and
//! share the engine with the HTTP surface, so semantics are identical across
//! transports.

pub mod get_memory;
pub mod get_memory_stats;
pub mod list_recent_memories;
pub mod retrieve_memories;
pub mod store_memory;
pub mod unified;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use std::sync::Arc;

use get_memory::GetMemoryParams;
use get_memory_stats::GetMemoryStatsParams;
use list_recent_memories::ListRecentMemoriesParams;
use retrieve_memories::RetrieveMemoriesParams;
use store_memory::StoreMemoryParams;
use unified::MemoryParams;

use crate::engine::{MemoryEngine, RetrieveSingleRequest, StoreSingleRequest};
use crate::memory::retrieve::{ResonanceVector, RetrievalFilters, RetrievalOptions, TagFilter};
use crate::memory::types::{now_rfc3339, MemoryContent, MemoryMetadata, MemoryType};
use crate::security::sanitize;

/// Keywords that route a unified `memory` request to storage.
const STORE_KEYWORDS: &[&str] = &["remember", "save", "store", "note that", "keep in mind"];
/// Keywords that route a unified `memory` request to retrieval.
const RETRIEVE_KEYWORDS: &[&str] = &[
    "what do",
    "recall",
    "find",
    "search",
    "do you know",
    "have we",
    "did we",
];

/// Where the unified `memory` tool routes a request.
#[derive(Debug, PartialEq)]
pub enum UnifiedRoute {
    Store(String),
    Retrieve(String),
    Ambiguous,
}

/// Keyword heuristic: store keywords and no retrieve keywords → store;
/// mirror-symmetrically for retrieve; anything else is ambiguous.
pub fn route_unified(request: &str) -> UnifiedRoute {
    let lowered = request.to_lowercase();
    let is_store = STORE_KEYWORDS.iter().any(|kw| lowered.contains(kw));
    let is_retrieve = RETRIEVE_KEYWORDS.iter().any(|kw| lowered.contains(kw));

    match (is_store, is_retrieve) {
        (true, false) => UnifiedRoute::Store(strip_keyword(&lowered, STORE_KEYWORDS)),
        (false, true) => UnifiedRoute::Retrieve(strip_keyword(&lowered, RETRIEVE_KEYWORDS)),
        _ => UnifiedRoute::Ambiguous,
    }
}

/// Take the text after the first matching keyword, or the whole request.
fn strip_keyword(lowered: &str, keywords: &[&str]) -> String {
    for keyword in keywords {
        if let Some(index) = lowered.find(keyword) {
            let rest = lowered[index + keyword.len()..].trim();
            if !rest.is_empty() {
                return rest.to_string();
            }
        }
    }
    lowered.to_string()
}

/// The Engram MCP tool handler. Holds the shared engine and exposes all
/// tools via the `#[tool_router]` macro.
#[derive(Clone)]
pub struct EngramTools {
    tool_router: ToolRouter<Self>,
    engine: Arc<MemoryEngine>,
}

#[tool_router]
impl EngramTools {
    pub fn new(engine: Arc<MemoryEngine>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            engine,
        }
    }

    /// Store a new memory with a semantic vector embedding.
    #[tool(description = "Store information in Engram for future retrieval. The memory becomes semantically searchable across all future sessions. Use after solving a problem, learning a preference, or making a decision.")]
    async fn store_memory(
        &self,
        Parameters(params): Parameters<StoreMemoryParams>,
    ) -> Result<String, String> {
        self.do_store(params).await
    }

    /// Search stored memories semantically.
    #[tool(description = "Search for relevant memories semantically — finds conceptually similar information even if exact words differ. Use at conversation start to recall context or before making decisions.")]
    async fn retrieve_memories(
        &self,
        Parameters(params): Parameters<RetrieveMemoriesParams>,
    ) -> Result<String, String> {
        self.do_retrieve(params).await
    }

    /// Retrieve a specific memory by ID.
    #[tool(description = "Retrieve a specific memory by ID. Returns complete memory with all metadata, tags, and content.")]
    async fn get_memory(
        &self,
        Parameters(params): Parameters<GetMemoryParams>,
    ) -> Result<String, String> {
        let record = self
            .engine
            .get(&params.memory_id, None)
            .await
            .map_err(|e| format!("❌ {e}"))?;

        Ok(format!(
            "📄 Memory: {id}\n\n**Type:** {memory_type}\n**Stored by:** {agent}\n**When:** {when}\n**Importance:** {importance}\n**Tags:** {tags}\n\n**Content:**\n{content}\n",
            id = record.memory_id,
            memory_type = record.metadata.memory_type,
            agent = record.metadata.agent_id.as_deref().unwrap_or("unknown"),
            when = record.metadata.timestamp,
            importance = record
                .metadata
                .importance
                .map(|i| i.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            tags = if record.tags.is_empty() {
                "none".to_string()
            } else {
                record.tags.join(", ")
            },
            content = record.content.text,
        ))
    }

    /// Timeline of recent memories, newest first.
    #[tool(description = "Get a timeline of recent memories in reverse chronological order. Useful at session start to see recent context.")]
    async fn list_recent_memories(
        &self,
        Parameters(params): Parameters<ListRecentMemoriesParams>,
    ) -> Result<String, String> {
        let limit = params.limit.unwrap_or(10).clamp(1, 50);
        let records = self
            .engine
            .recent(limit, None)
            .await
            .map_err(|e| format!("❌ {e}"))?;

        if records.is_empty() {
            return Ok("📋 No recent memories found. Start storing some!".to_string());
        }

        let mut text = format!("📋 Your {} most recent memories:\n\n", records.len());
        for (i, record) in records.iter().enumerate() {
            text.push_str(&format!(
                "{}. [{}] {}\n   {}\n\n",
                i + 1,
                record.metadata.memory_type,
                record.memory_id,
                truncate(&record.content.text, 80),
            ));
        }
        Ok(text)
    }

    /// System health and usage statistics.
    #[tool(description = "Get statistics about the memory system: total memories stored, health status, and available features.")]
    async fn get_memory_stats(
        &self,
        Parameters(_params): Parameters<GetMemoryStatsParams>,
    ) -> Result<String, String> {
        let health = self.engine.health().await.map_err(|e| format!("❌ {e}"))?;
        let stats = self.engine.stats().await.map_err(|e| format!("❌ {e}"))?;

        let health_line = if health.integrity_ok { "✅ Healthy" } else { "⚠️ Degraded" };
        let by_type = stats
            .by_type
            .iter()
            .map(|(memory_type, count)| format!("• {memory_type}: {count}"))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(format!(
            "📊 Engram Memory System Status\n\n**Health:** {health_line}\n**Vector index:** sqlite-vec {vec_version}\n**Total memories:** {total}\n**Situations:** {situations}\n**Annotations:** {annotations}\n\n**By type:**\n{by_type}\n",
            vec_version = health.sqlite_vec_version,
            total = stats.total_memories,
            situations = stats.total_situations,
            annotations = stats.total_annotations,
        ))
    }

    /// Unified natural-language interface: store or retrieve automatically.
    #[tool(description = "Unified interface — describe what you want in natural language and Engram decides whether to store or retrieve. Examples: 'Remember that the user likes minimal UI design', 'What do I know about deployment preferences?'")]
    async fn memory(
        &self,
        Parameters(params): Parameters<MemoryParams>,
    ) -> Result<String, String> {
        match route_unified(&params.request) {
            UnifiedRoute::Store(content) => {
                self.do_store(StoreMemoryParams {
                    content,
                    tags: None,
                    memory_type: None,
                    agent_id: None,
                    importance: None,
                })
                .await
            }
            UnifiedRoute::Retrieve(query) => {
                self.do_retrieve(RetrieveMemoriesParams {
                    query,
                    top_k: None,
                    threshold: None,
                    filter_tags: None,
                    memory_type: None,
                })
                .await
            }
            UnifiedRoute::Ambiguous => Ok(AMBIGUOUS_MESSAGE.to_string()),
        }
    }
}

const AMBIGUOUS_MESSAGE: &str = r#"I'm not sure if you want to store or retrieve information.

Please use:
• **store_memory** - to save information
• **retrieve_memories** - to search for information

Or be more explicit: "Remember that..." or "What do I know about...""#;

impl EngramTools {
    async fn do_store(&self, params: StoreMemoryParams) -> Result<String, String> {
        if params.content.is_empty() {
            return Err("content must not be empty".to_string());
        }
        sanitize::validate_text_field(
            "content",
            &params.content,
            self.engine.config().security.max_content_bytes,
        )
        .map_err(|e| e.to_string())?;

        let memory_type: MemoryType = params
            .memory_type
            .as_deref()
            .unwrap_or("fact")
            .parse()
            .map_err(|e: String| e)?;
        let importance = params.importance.unwrap_or(0.5);
        if !(0.0..=1.0).contains(&importance) {
            return Err("importance must be between 0.0 and 1.0".to_string());
        }
        let agent_id = params.agent_id.unwrap_or_else(|| "mcp-client".to_string());
        let tags = params.tags.unwrap_or_default();

        tracing::info!(
            content_len = params.content.len(),
            memory_type = %memory_type,
            agent_id = %agent_id,
            "store_memory called"
        );

        let vector = self
            .engine
            .embed(&params.content)
            .await
            .map_err(|e| format!("embedding failed: {e}"))?;

        let result = self
            .engine
            .store_single(StoreSingleRequest {
                content: MemoryContent::from_text(params.content),
                primary_vector: vector,
                metadata: MemoryMetadata {
                    timestamp: now_rfc3339(),
                    memory_type,
                    agent_id: Some(agent_id),
                    domain: None,
                    confidence: None,
                    importance: Some(importance),
                    topic_tags: tags.clone(),
                    interaction_quality: None,
                    situation_duration_minutes: None,
                },
                tags: tags.clone(),
                causality: None,
                retention: None,
            })
            .await
            .map_err(|e| format!("store failed: {e}"))?;

        Ok(format!(
            "✅ Memory stored successfully!\n\n**ID:** {id}\n**Type:** {memory_type}\n**Tags:** {tags}\n**Importance:** {importance}\n\nThis information is now available across all future sessions.",
            id = result.memory_id,
            tags = if tags.is_empty() { "none".to_string() } else { tags.join(", ") },
        ))
    }

    async fn do_retrieve(&self, params: RetrieveMemoriesParams) -> Result<String, String> {
        if params.query.is_empty() {
            return Err("query must not be empty".to_string());
        }
        let top_k = params.top_k.unwrap_or(5).clamp(1, 20);
        let threshold = params.threshold.unwrap_or(0.7);

        tracing::info!(query = %params.query, top_k, threshold, "retrieve_memories called");

        let vector = self
            .engine
            .embed(&params.query)
            .await
            .map_err(|e| format!("embedding failed: {e}"))?;

        let memory_types = params
            .memory_type
            .filter(|t| t != "any")
            .map(|t| vec![t]);
        let tags = params.filter_tags.filter(|t| !t.is_empty()).map(|include| TagFilter {
            include,
            exclude: vec![],
        });

        let response = self
            .engine
            .retrieve_single(RetrieveSingleRequest {
                resonance_vectors: vec![ResonanceVector {
                    vector,
                    weight: 1.0,
                    label: Some("query".to_string()),
                }],
                tags,
                filters: memory_types.map(|types| RetrievalFilters {
                    memory_types: Some(types),
                    ..Default::default()
                }),
                retrieval: Some(RetrievalOptions {
                    top_k,
                    similarity_threshold: threshold,
                    diversity_lambda: None,
                    boost_recent: None,
                    exclude_denials: true,
                }),
                ordering: None,
            })
            .await
            .map_err(|e| format!("retrieval failed: {e}"))?;

        if response.memories.is_empty() {
            return Ok(format!(
                "🔍 No memories found matching '{query}'\n\nTry:\n• Broadening your search terms\n• Lowering the threshold (currently {threshold})\n• Checking with list_recent_memories",
                query = params.query,
            ));
        }

        let mut text = format!(
            "🔍 Found {} relevant memories for '{}':\n\n",
            response.memories.len(),
            params.query,
        );
        for (i, memory) in response.memories.iter().enumerate() {
            text.push_str(&format!(
                "**{n}. [{memory_type}] {id}**\n   Score: {score:.3}\n   {preview}\n   Tags: {tags}\n\n",
                n = i + 1,
                memory_type = memory.metadata.memory_type,
                id = memory.memory_id,
                score = memory.similarity_score,
                preview = truncate(&memory.content_preview, 150),
                tags = if memory.tags.is_empty() {
                    "none".to_string()
                } else {
                    memory.tags.join(", ")
                },
            ));
        }
        Ok(text)
    }
}

#[tool_handler]
impl ServerHandler for EngramTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "Engram is a witness-scoped semantic memory service. Use store_memory to \
                 save information, retrieve_memories to search semantically, and the \
                 unified memory tool for natural-language requests."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}

/// Truncate to max_chars on a char boundary, appending "..." if shortened.
fn truncate(content: &str, max_chars: usize) -> String {
    if content.len() <= max_chars {
        content.to_string()
    } else {
        let end = content
            .char_indices()
            .take_while(|(i, _)| *i < max_chars)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(max_chars);
        format!("{}...", &content[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_requests_route_to_store() {
        match route_unified("Remember that the user likes minimal UI design") {
            UnifiedRoute::Store(content) => {
                assert_eq!(content, "that the user likes minimal ui design");
            }
            other => panic!("expected store route, got {other:?}"),
        }
        assert!(matches!(
            route_unified("Note that the deploy is on Friday"),
            UnifiedRoute::Store(_)
        ));
        assert!(matches!(
            route_unified("Please save this solution for later"),
            UnifiedRoute::Store(_)
        ));
    }

    #[test]
    fn retrieve_requests_route_to_retrieve() {
        match route_unified("What do I know about the user's UI preferences?") {
            UnifiedRoute::Retrieve(query) => {
                assert!(query.contains("ui preferences"));
            }
            other => panic!("expected retrieve route, got {other:?}"),
        }
        assert!(matches!(
            route_unified("Have we solved latency issues before?"),
            UnifiedRoute::Retrieve(_)
        ));
        assert!(matches!(
            route_unified("search for deployment decisions"),
            UnifiedRoute::Retrieve(_)
        ));
    }

    #[test]
    fn mixed_or_neither_is_ambiguous() {
        // Both keyword sets present
        assert_eq!(
            route_unified("Remember to search for the answer"),
            UnifiedRoute::Ambiguous
        );
        // Neither present
        assert_eq!(route_unified("hello there"), UnifiedRoute::Ambiguous);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 80), "short");
        let long = "é".repeat(100);
        let truncated = truncate(&long, 80);
        assert!(truncated.ends_with("..."));
    }
}
