//! SQL DDL for all Engram tables.
//!
//! Defines the `memories`, `memory_witnesses`, `situations`, `annotations`,
//! `causality_edges`, `memory_log`, `curation_log`, and `schema_meta` tables,
//! plus the `memories_vec` (vec0) virtual table. All DDL uses `IF NOT EXISTS`
//! for idempotent initialization. The vec0 table is created with the
//! configured embedding dimension, which is then pinned in `schema_meta`.

use rusqlite::Connection;

/// All schema DDL statements for Engram's core tables.
const SCHEMA_SQL: &str = r#"
-- Core memory records
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    content_text TEXT NOT NULL,
    content_summary TEXT,
    speakers TEXT,
    media TEXT,
    embedding BLOB NOT NULL,
    memory_type TEXT NOT NULL,
    agent_id TEXT,
    domain TEXT,
    timestamp TEXT NOT NULL,
    confidence REAL,
    importance REAL,
    interaction_quality REAL,
    duration_minutes REAL,
    topic_tags TEXT,
    tags TEXT,
    situation_id TEXT NOT NULL,
    situation_type TEXT NOT NULL,
    privacy_level TEXT NOT NULL DEFAULT 'participants_only'
        CHECK(privacy_level IN ('personal','participants_only','group','public')),
    causality TEXT,
    retention_ttl_seconds INTEGER,
    retention_decay TEXT NOT NULL DEFAULT 'none'
        CHECK(retention_decay IN ('none','linear','logarithmic')),
    expires_at TEXT,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed_at TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memories_type ON memories(memory_type);
CREATE INDEX IF NOT EXISTS idx_memories_agent ON memories(agent_id);
CREATE INDEX IF NOT EXISTS idx_memories_situation ON memories(situation_id);
CREATE INDEX IF NOT EXISTS idx_memories_timestamp ON memories(timestamp);
CREATE INDEX IF NOT EXISTS idx_memories_expires ON memories(expires_at);
CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at);

-- Witness access set. entity_id_norm is the hyphen-stripped token used by
-- every access query; entity_id preserves the caller's original string.
CREATE TABLE IF NOT EXISTS memory_witnesses (
    memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    entity_id TEXT NOT NULL,
    entity_id_norm TEXT NOT NULL,
    PRIMARY KEY (memory_id, entity_id_norm)
);

CREATE INDEX IF NOT EXISTS idx_witnesses_entity ON memory_witnesses(entity_id_norm);

-- Situations (derived grouping of memories sharing participants and context)
CREATE TABLE IF NOT EXISTS situations (
    id TEXT PRIMARY KEY,
    situation_type TEXT NOT NULL,
    participants TEXT NOT NULL,
    memory_count INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active','archived','private')),
    created_at TEXT NOT NULL,
    last_activity TEXT NOT NULL
);

-- Append-only annotations; never mutate their parent memory
CREATE TABLE IF NOT EXISTS annotations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    annotator_id TEXT NOT NULL,
    annotation_type TEXT NOT NULL,
    content TEXT NOT NULL,
    vector BLOB,
    confidence REAL,
    tags TEXT,
    evidence_links TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_annotations_memory ON annotations(memory_id);

-- Causality edges. child_id cascades with its record; parent_id is a weak
-- reference and may dangle after the parent is deleted.
CREATE TABLE IF NOT EXISTS causality_edges (
    child_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    parent_id TEXT NOT NULL,
    influence REAL NOT NULL,
    PRIMARY KEY (child_id, parent_id)
);

CREATE INDEX IF NOT EXISTS idx_causality_parent ON causality_edges(parent_id);

-- Audit log
CREATE TABLE IF NOT EXISTS memory_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    operation TEXT NOT NULL
        CHECK(operation IN ('create','annotate','delete','expire','merge','decay','flush')),
    memory_id TEXT NOT NULL,
    details TEXT,
    created_at TEXT NOT NULL
);

-- Per-entity curation decisions, aggregated by the stats endpoint
CREATE TABLE IF NOT EXISTS curation_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id TEXT NOT NULL,
    observations INTEGER NOT NULL,
    stored INTEGER NOT NULL,
    rejected INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_curation_entity ON curation_log(entity_id);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables plus the vec0 virtual table sized to the
/// configured embedding dimension. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection, dimensions: usize) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    init_vec_table(conn, dimensions)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('vector_dimensions', ?1)",
        [dimensions.to_string()],
    )?;

    Ok(())
}

/// Create the vec0 virtual table (sqlite-vec syntax requires a literal dimension).
pub fn init_vec_table(conn: &Connection, dimensions: usize) -> rusqlite::Result<()> {
    let ddl = format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS memories_vec USING vec0(\
         id TEXT PRIMARY KEY, embedding FLOAT[{dimensions}])"
    );
    conn.execute_batch(&ddl)
}
