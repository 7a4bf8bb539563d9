//! MCP `retrieve_memories` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `retrieve_memories` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RetrieveMemoriesParams {
    /// What to search for. Search is semantic, not keyword-exact.
    #[schemars(
        description = "What to search for. Semantic search: 'authentication issues' also finds 'login problems'."
    )]
    pub query: String,

    /// Maximum number of results (1-20). Defaults to 5.
    #[schemars(description = "Maximum number of results to return (1-20). Defaults to 5.")]
    pub top_k: Option<usize>,

    /// Minimum similarity score (0-1). Lower is more permissive. Defaults to 0.7.
    #[schemars(
        description = "Minimum similarity score (0-1). Lower = more permissive. Default 0.7 works well."
    )]
    pub threshold: Option<f32>,

    /// Only return memories carrying all of these tags.
    #[schemars(description = "Only return memories with these tags (optional)")]
    pub filter_tags: Option<Vec<String>>,

    /// Filter by memory type, or `any`.
    #[schemars(
        description = "Filter by memory type: 'fact', 'preference', 'event', 'solution', 'insight', 'decision', 'pattern', or 'any'. Defaults to 'any'."
    )]
    pub memory_type: Option<String>,
}
