//! MCP `list_recent_memories` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `list_recent_memories` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListRecentMemoriesParams {
    /// Number of recent memories to retrieve (1-50). Defaults to 10.
    #[schemars(description = "Number of recent memories to retrieve (1-50). Defaults to 10.")]
    pub limit: Option<usize>,
}
