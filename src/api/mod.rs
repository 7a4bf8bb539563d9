//! HTTP surface — a thin façade over the engine.
//!
//! Each handler parses, validates, calls the engine or curation pipeline, and
//! maps errors to HTTP codes via [`error::ApiError`]. Route composition lives
//! in [`routes`].

pub mod admin;
pub mod curated;
pub mod error;
pub mod memory;
pub mod multi;
pub mod routes;

use std::sync::Arc;

use crate::engine::MemoryEngine;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MemoryEngine>,
}
