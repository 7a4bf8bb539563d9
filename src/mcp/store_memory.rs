//! MCP `store_memory` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `store_memory` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct StoreMemoryParams {
    /// The information to remember. Be specific and include relevant context.
    #[schemars(
        description = "The information to remember. Be specific and include relevant context."
    )]
    pub content: String,

    /// Keywords for categorization and searching.
    #[schemars(description = "Keywords for categorization and searching, e.g. ['user-preference', 'editor']")]
    pub tags: Option<Vec<String>>,

    /// Memory type: `fact`, `preference`, `event`, `solution`, `insight`,
    /// `decision`, or `pattern`. Defaults to `fact`.
    #[schemars(
        description = "Type of memory: 'fact' (objective information), 'preference' (user/system preferences), 'event' (something that happened), 'solution' (how a problem was solved), 'insight' (understanding or realization), 'decision' (choice made and why), 'pattern' (recurring theme). Defaults to 'fact'."
    )]
    pub memory_type: Option<String>,

    /// Identifier for who is storing this memory. Defaults to `mcp-client`.
    #[schemars(description = "Identifier for who is storing this memory. Defaults to 'mcp-client'.")]
    pub agent_id: Option<String>,

    /// Importance score 0-1; higher surfaces the memory earlier.
    #[schemars(description = "Importance score 0-1 (higher = more important for retrieval). Defaults to 0.5.")]
    pub importance: Option<f64>,
}
