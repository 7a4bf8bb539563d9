//! MCP unified `memory` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the unified `memory` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MemoryParams {
    /// Natural language request, e.g. "Remember that..." or "What do I know
    /// about...".
    #[schemars(
        description = "Natural language request. Examples: 'Remember that...', 'What do I know about...', 'Have we discussed...'"
    )]
    pub request: String,
}
