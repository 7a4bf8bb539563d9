//! MCP `get_memory` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `get_memory` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetMemoryParams {
    /// The unique ID of the memory (e.g. `mem-76a306a44e0c`).
    #[schemars(description = "The unique ID of the memory (e.g. 'mem-76a306a44e0c')")]
    pub memory_id: String,
}
