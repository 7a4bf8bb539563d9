//! Store statistics, global and per-entity.

use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::EngramResult;
use crate::memory::types::{normalize_entity_id, now_rfc3339};

/// Global store statistics.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_memories: i64,
    pub by_type: BTreeMap<String, i64>,
    pub total_situations: i64,
    pub total_annotations: i64,
}

/// Per-entity statistics, including curation outcomes.
#[derive(Debug, Serialize)]
pub struct EntityStatsResponse {
    pub entity_id: String,
    pub memory_count: i64,
    pub situation_count: i64,
    pub by_type: BTreeMap<String, i64>,
    pub interactions_analyzed: i64,
    pub memories_stored: i64,
    pub memories_rejected: i64,
}

/// Counts across the whole store.
pub fn global_stats(conn: &Connection) -> EngramResult<StatsResponse> {
    let total_memories: i64 =
        conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
    let total_situations: i64 =
        conn.query_row("SELECT COUNT(*) FROM situations", [], |row| row.get(0))?;
    let total_annotations: i64 =
        conn.query_row("SELECT COUNT(*) FROM annotations", [], |row| row.get(0))?;

    let mut by_type = BTreeMap::new();
    let mut stmt =
        conn.prepare("SELECT memory_type, COUNT(*) FROM memories GROUP BY memory_type")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    for row in rows {
        let (memory_type, count) = row?;
        by_type.insert(memory_type, count);
    }

    Ok(StatsResponse {
        total_memories,
        by_type,
        total_situations,
        total_annotations,
    })
}

/// Counts scoped to one entity's witnessed memories, plus its curation history.
pub fn entity_stats(conn: &Connection, entity_id: &str) -> EngramResult<EntityStatsResponse> {
    let norm = normalize_entity_id(entity_id);

    let memory_count = crate::memory::store::scan_by_entity(conn, entity_id)?.len() as i64;

    let situation_count: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT m.situation_id) FROM memories m \
         JOIN memory_witnesses w ON w.memory_id = m.id WHERE w.entity_id_norm = ?1",
        params![norm],
        |row| row.get(0),
    )?;

    let mut by_type = BTreeMap::new();
    let mut stmt = conn.prepare(
        "SELECT m.memory_type, COUNT(*) FROM memories m \
         JOIN memory_witnesses w ON w.memory_id = m.id \
         WHERE w.entity_id_norm = ?1 GROUP BY m.memory_type",
    )?;
    let rows = stmt.query_map(params![norm], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    for row in rows {
        let (memory_type, count) = row?;
        by_type.insert(memory_type, count);
    }

    let (interactions_analyzed, memories_stored, memories_rejected): (i64, i64, i64) = conn
        .query_row(
            "SELECT COUNT(*), COALESCE(SUM(stored), 0), COALESCE(SUM(rejected), 0) \
             FROM curation_log WHERE entity_id = ?1",
            params![entity_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

    Ok(EntityStatsResponse {
        entity_id: entity_id.to_string(),
        memory_count,
        situation_count,
        by_type,
        interactions_analyzed,
        memories_stored,
        memories_rejected,
    })
}

/// Record one curation pass for an entity.
pub fn record_curation(
    conn: &Connection,
    entity_id: &str,
    observations: usize,
    stored: usize,
    rejected: usize,
) -> EngramResult<()> {
    conn.execute(
        "INSERT INTO curation_log (entity_id, observations, stored, rejected, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            entity_id,
            observations as i64,
            stored as i64,
            rejected as i64,
            now_rfc3339()
        ],
    )?;
    Ok(())
}
