//! Engram — a witness-scoped semantic memory service for AI agents.
//!
//! Memories are free-form text with a dense vector embedding, structured
//! metadata, and a non-empty *witness set*: only entities who were present
//! when a memory was created may retrieve or annotate it. Retrieval is
//! approximate nearest-neighbour over cosine similarity with structured
//! filters; an AI curator decomposes conversation turns into scored
//! observations and routes them to storage or rejection; a cleanup scheduler
//! expires, consolidates, and demotes memories over time.
//!
//! One engine serves two transports with identical semantics:
//!
//! - an HTTP/JSON API (`/cam/*`, plus curated and admin surfaces)
//! - an MCP JSON-RPC endpoint (`/mcp`) exposing six tools
//!
//! # Modules
//!
//! - [`config`] — TOML + `ENGRAM_*` environment configuration
//! - [`db`] — SQLite + sqlite-vec initialization, schema, health
//! - [`memory`] — the storage and retrieval core (store, retrieve, access,
//!   annotate, situations, stats, cleanup)
//! - [`engine`] — async orchestration shared by both transports
//! - [`embedding`] / [`curator`] — pluggable AI collaborators
//! - [`curation`] — the turn-to-memories pipeline
//! - [`security`] — API keys, rate limiting, input sanitisation
//! - [`api`] / [`mcp`] — the HTTP and MCP surfaces
//! - [`server`] — process composition and background jobs

pub mod api;
pub mod cli;
pub mod config;
pub mod curation;
pub mod curator;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod mcp;
pub mod memory;
pub mod security;
pub mod server;
