//! Write path — validation, transactional insert, read-back, and deletion.
//!
//! [`put`] is the single entry point for new records. It runs inside a
//! transaction: duplicate-ID check, insert into `memories`, witness rows,
//! normalised vec0 insert, situation upsert, causality edges, audit log. A
//! record is never visible with a partial witness set — the transaction
//! commits all of it or none of it.

use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::error::{EngramError, EngramResult};
use crate::memory::types::{
    normalize_entity_id, now_rfc3339, CausalityInfo, MemoryContent, MemoryMetadata,
    MemoryRecord, PrivacyLevel, RetentionInfo,
};
use crate::memory::{bytes_to_embedding, embedding_to_bytes, l2_normalize};

/// Validate an embedding vector: exact dimension, every component finite.
/// Never silently truncates or pads.
pub fn validate_vector(vector: &[f32], dimensions: usize) -> Result<(), String> {
    if vector.len() != dimensions {
        return Err(format!(
            "vector has {} dimensions, expected {dimensions}",
            vector.len()
        ));
    }
    if let Some(pos) = vector.iter().position(|x| !x.is_finite()) {
        return Err(format!("vector component {pos} is not finite"));
    }
    Ok(())
}

/// Full write path. Fails with `AlreadyExists` on a duplicate `memory_id`,
/// leaving the stored record unchanged.
pub fn put(conn: &mut Connection, record: &MemoryRecord, dimensions: usize) -> EngramResult<()> {
    validate_vector(&record.vector, dimensions).map_err(EngramError::invalid)?;
    if record.witnessed_by.is_empty() {
        return Err(EngramError::invalid("witnessed_by must not be empty"));
    }

    let tx = conn.transaction()?;

    // 1. Duplicate-ID gate
    let exists: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM memories WHERE id = ?1",
        params![record.memory_id],
        |row| row.get(0),
    )?;
    if exists {
        return Err(EngramError::AlreadyExists(record.memory_id.clone()));
    }

    // 2. Insert the record row
    insert_memory_row(&tx, record)?;

    // 3. Witness access set (normalised + original)
    for witness in &record.witnessed_by {
        tx.execute(
            "INSERT OR IGNORE INTO memory_witnesses (memory_id, entity_id, entity_id_norm) \
             VALUES (?1, ?2, ?3)",
            params![record.memory_id, witness, normalize_entity_id(witness)],
        )?;
    }

    // 4. Normalised embedding into the vec0 index
    let unit = l2_normalize(&record.vector);
    tx.execute(
        "INSERT INTO memories_vec (id, embedding) VALUES (?1, ?2)",
        params![record.memory_id, embedding_to_bytes(&unit)],
    )?;

    // 5. Situation registration
    upsert_situation(&tx, record)?;

    // 6. Causality edges (parents are weak references)
    if let Some(causality) = &record.causality {
        for (parent, influence) in causality
            .parent_memories
            .iter()
            .zip(causality.influence_strength.iter())
        {
            tx.execute(
                "INSERT OR REPLACE INTO causality_edges (child_id, parent_id, influence) \
                 VALUES (?1, ?2, ?3)",
                params![record.memory_id, parent, influence],
            )?;
        }
    }

    // 7. Audit log
    write_audit_log(&tx, "create", &record.memory_id, None)?;

    tx.commit()?;
    Ok(())
}

/// Fetch a record by ID, or `None` if absent. No access check — callers apply
/// the witness predicate.
pub fn try_get(conn: &Connection, memory_id: &str) -> EngramResult<Option<MemoryRecord>> {
    let row = conn
        .query_row(
            "SELECT id, content_text, content_summary, speakers, media, embedding, \
             memory_type, agent_id, domain, timestamp, confidence, importance, \
             interaction_quality, duration_minutes, topic_tags, tags, situation_id, \
             situation_type, privacy_level, causality, retention_ttl_seconds, \
             retention_decay, created_at, access_count, last_accessed_at \
             FROM memories WHERE id = ?1",
            params![memory_id],
            row_to_record,
        )
        .optional()?;

    let Some(mut record) = row else {
        return Ok(None);
    };

    record.witnessed_by = load_witnesses(conn, memory_id)?;
    Ok(Some(record))
}

/// Fetch a record by ID, failing with `NotFound` if absent.
pub fn get(conn: &Connection, memory_id: &str) -> EngramResult<MemoryRecord> {
    try_get(conn, memory_id)?.ok_or_else(|| EngramError::not_found("memory", memory_id))
}

/// Delete a record, its witness rows, annotations, vec entry, and outgoing
/// causality edges. Incoming edges (other memories citing this one as a
/// parent) are left dangling per the weak-reference contract.
pub fn delete(conn: &mut Connection, memory_id: &str) -> EngramResult<bool> {
    let tx = conn.transaction()?;

    let situation_id: Option<String> = tx
        .query_row(
            "SELECT situation_id FROM memories WHERE id = ?1",
            params![memory_id],
            |row| row.get(0),
        )
        .optional()?;

    let Some(situation_id) = situation_id else {
        return Ok(false);
    };

    // FK cascade removes witnesses, annotations, and outgoing causality edges.
    tx.execute("DELETE FROM memories WHERE id = ?1", params![memory_id])?;
    tx.execute("DELETE FROM memories_vec WHERE id = ?1", params![memory_id])?;

    // Situation bookkeeping: drop the situation once its last memory is gone.
    let remaining: i64 = tx.query_row(
        "SELECT COUNT(*) FROM memories WHERE situation_id = ?1",
        params![situation_id],
        |row| row.get(0),
    )?;
    if remaining == 0 {
        tx.execute("DELETE FROM situations WHERE id = ?1", params![situation_id])?;
    } else {
        tx.execute(
            "UPDATE situations SET memory_count = ?1, last_activity = ?2 WHERE id = ?3",
            params![remaining, now_rfc3339(), situation_id],
        )?;
    }

    write_audit_log(&tx, "delete", memory_id, None)?;
    tx.commit()?;
    Ok(true)
}

/// IDs of every memory witnessed by the given entity, newest first.
pub fn scan_by_entity(conn: &Connection, entity_id: &str) -> EngramResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT m.id FROM memories m \
         JOIN memory_witnesses w ON w.memory_id = m.id \
         WHERE w.entity_id_norm = ?1 \
         ORDER BY m.created_at DESC",
    )?;
    let ids = stmt
        .query_map(params![normalize_entity_id(entity_id)], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

/// Bump `access_count` and `last_accessed_at` for retrieved records.
pub fn touch_access(conn: &Connection, memory_ids: &[&str]) -> EngramResult<()> {
    if memory_ids.is_empty() {
        return Ok(());
    }
    let now = now_rfc3339();
    let mut stmt = conn.prepare(
        "UPDATE memories SET access_count = access_count + 1, last_accessed_at = ?1 \
         WHERE id = ?2",
    )?;
    for id in memory_ids {
        stmt.execute(params![now, id])?;
    }
    Ok(())
}

/// Write an entry to the memory_log audit table.
pub(crate) fn write_audit_log(
    conn: &Connection,
    operation: &str,
    memory_id: &str,
    details: Option<&serde_json::Value>,
) -> EngramResult<()> {
    conn.execute(
        "INSERT INTO memory_log (operation, memory_id, details, created_at) \
         VALUES (?1, ?2, ?3, ?4)",
        params![operation, memory_id, details.map(|d| d.to_string()), now_rfc3339()],
    )?;
    Ok(())
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn insert_memory_row(tx: &Transaction, record: &MemoryRecord) -> EngramResult<()> {
    let speakers_json = record
        .content
        .speakers
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let media_json = if record.content.media.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&record.content.media)?)
    };
    let causality_json = record
        .causality
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let (ttl_seconds, decay) = match &record.retention {
        Some(r) => (r.ttl_seconds, r.decay_function.as_str()),
        None => (None, "none"),
    };
    let expires_at = expiry_timestamp(&record.created_at, ttl_seconds);

    tx.execute(
        "INSERT INTO memories (id, content_text, content_summary, speakers, media, \
         embedding, memory_type, agent_id, domain, timestamp, confidence, importance, \
         interaction_quality, duration_minutes, topic_tags, tags, situation_id, \
         situation_type, privacy_level, causality, retention_ttl_seconds, \
         retention_decay, expires_at, access_count, last_accessed_at, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, \
         ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)",
        params![
            record.memory_id,
            record.content.text,
            record.content.summary,
            speakers_json,
            media_json,
            embedding_to_bytes(&record.vector),
            record.metadata.memory_type.as_str(),
            record.metadata.agent_id,
            record.metadata.domain,
            record.metadata.timestamp,
            record.metadata.confidence,
            record.metadata.importance,
            record.metadata.interaction_quality,
            record.metadata.situation_duration_minutes,
            serde_json::to_string(&record.metadata.topic_tags)?,
            serde_json::to_string(&record.tags)?,
            record.situation_id,
            record.situation_type,
            record.privacy_level.as_str(),
            causality_json,
            ttl_seconds,
            decay,
            expires_at,
            record.access_count,
            record.last_accessed_at,
            record.created_at,
        ],
    )?;
    Ok(())
}

/// Register the memory under its situation, creating the situation on first
/// use and extending the participant union otherwise.
fn upsert_situation(tx: &Transaction, record: &MemoryRecord) -> EngramResult<()> {
    let now = now_rfc3339();
    let existing: Option<String> = tx
        .query_row(
            "SELECT participants FROM situations WHERE id = ?1",
            params![record.situation_id],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(participants_json) => {
            let mut participants: Vec<String> = serde_json::from_str(&participants_json)?;
            for witness in &record.witnessed_by {
                let norm = normalize_entity_id(witness);
                if !participants.iter().any(|p| normalize_entity_id(p) == norm) {
                    participants.push(witness.clone());
                }
            }
            tx.execute(
                "UPDATE situations SET participants = ?1, \
                 memory_count = memory_count + 1, last_activity = ?2 WHERE id = ?3",
                params![
                    serde_json::to_string(&participants)?,
                    now,
                    record.situation_id
                ],
            )?;
        }
        None => {
            tx.execute(
                "INSERT INTO situations (id, situation_type, participants, memory_count, \
                 status, created_at, last_activity) VALUES (?1, ?2, ?3, 1, 'active', ?4, ?4)",
                params![
                    record.situation_id,
                    record.situation_type,
                    serde_json::to_string(&record.witnessed_by)?,
                    now
                ],
            )?;
        }
    }
    Ok(())
}

/// Compute the expiry timestamp for a TTL, if any.
fn expiry_timestamp(created_at: &str, ttl_seconds: Option<u64>) -> Option<String> {
    let ttl = ttl_seconds?;
    let created = chrono::DateTime::parse_from_rfc3339(created_at).ok()?;
    let expires = created + chrono::Duration::seconds(ttl as i64);
    Some(
        expires
            .with_timezone(&chrono::Utc)
            .to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
    )
}

fn load_witnesses(conn: &Connection, memory_id: &str) -> EngramResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT entity_id FROM memory_witnesses WHERE memory_id = ?1 ORDER BY rowid",
    )?;
    let witnesses = stmt
        .query_map(params![memory_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(witnesses)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let speakers_json: Option<String> = row.get(3)?;
    let media_json: Option<String> = row.get(4)?;
    let embedding_blob: Vec<u8> = row.get(5)?;
    let memory_type_str: String = row.get(6)?;
    let topic_tags_json: Option<String> = row.get(14)?;
    let tags_json: Option<String> = row.get(15)?;
    let privacy_str: String = row.get(18)?;
    let causality_json: Option<String> = row.get(19)?;
    let ttl_seconds: Option<u64> = row.get(20)?;
    let decay_str: String = row.get(21)?;

    let causality: Option<CausalityInfo> =
        causality_json.and_then(|s| serde_json::from_str(&s).ok());
    let retention = if ttl_seconds.is_some() || decay_str != "none" {
        Some(RetentionInfo {
            ttl_seconds,
            decay_function: decay_str.parse().unwrap_or_default(),
        })
    } else {
        None
    };

    Ok(MemoryRecord {
        memory_id: row.get(0)?,
        content: MemoryContent {
            text: row.get(1)?,
            summary: row.get(2)?,
            speakers: speakers_json.and_then(|s| serde_json::from_str(&s).ok()),
            media: media_json
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
        },
        vector: bytes_to_embedding(&embedding_blob),
        metadata: MemoryMetadata {
            timestamp: row.get(9)?,
            memory_type: memory_type_str.parse().unwrap_or(
                crate::memory::types::MemoryType::LegacySingleAgent,
            ),
            agent_id: row.get(7)?,
            domain: row.get(8)?,
            confidence: row.get(10)?,
            importance: row.get(11)?,
            interaction_quality: row.get(12)?,
            situation_duration_minutes: row.get(13)?,
            topic_tags: topic_tags_json
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
        },
        tags: tags_json
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        witnessed_by: Vec::new(), // filled by try_get
        situation_id: row.get(16)?,
        situation_type: row.get(17)?,
        privacy_level: privacy_str.parse().unwrap_or_default(),
        causality,
        retention,
        created_at: row.get(22)?,
        access_count: row.get(23)?,
        last_accessed_at: row.get(24)?,
    })
}
