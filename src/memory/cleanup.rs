//! Retention lifecycle — TTL expiry, near-duplicate consolidation, and
//! importance decay.
//!
//! All jobs are idempotent and journal a summary to the audit log. The
//! scheduler in [`crate::server`] runs expiry daily, consolidation weekly,
//! and decay monthly by default.

use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::HashSet;

use crate::config::CleanupConfig;
use crate::error::EngramResult;
use crate::memory::store::{self, write_audit_log};
use crate::memory::types::{normalize_entity_id, now_rfc3339};
use crate::memory::{cosine_threshold_to_l2, embedding_to_bytes, l2_normalize};

/// Summary journalled after each cleanup pass.
#[derive(Debug, Default, Serialize)]
pub struct CleanupSummary {
    pub deleted: usize,
    pub merged: usize,
    pub demoted: usize,
}

/// Daily job: delete every memory whose TTL has elapsed, then sweep vec0
/// entries orphaned by out-of-band deletions.
pub fn expire_ttl(conn: &mut Connection) -> EngramResult<CleanupSummary> {
    let now = now_rfc3339();
    let expired: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT id FROM memories WHERE expires_at IS NOT NULL AND expires_at < ?1",
        )?;
        let ids = stmt
            .query_map(params![now], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    };

    let mut deleted = 0usize;
    for id in &expired {
        write_audit_log(conn, "expire", id, None)?;
        if store::delete(conn, id)? {
            deleted += 1;
        }
    }

    deleted += sweep_orphaned_vectors(conn)?;

    if deleted > 0 {
        tracing::info!(deleted, "ttl expiry pass complete");
    }
    Ok(CleanupSummary {
        deleted,
        ..Default::default()
    })
}

/// Weekly job: merge memory pairs with cosine similarity above the configured
/// threshold and identical witness sets. The survivor keeps the earlier
/// timestamp, the higher confidence, and the concatenated content.
pub fn consolidate(conn: &mut Connection, config: &CleanupConfig) -> EngramResult<CleanupSummary> {
    let ids: Vec<String> = {
        let mut stmt = conn.prepare("SELECT id FROM memories ORDER BY created_at")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    };

    let max_distance = cosine_threshold_to_l2(config.consolidation_threshold);
    let mut absorbed: HashSet<String> = HashSet::new();
    let mut merged = 0usize;

    for id in &ids {
        if absorbed.contains(id) {
            continue;
        }
        let Some(record) = store::try_get(conn, id)? else {
            continue;
        };

        let candidates = near_neighbours(conn, &record.vector, 10)?;
        for (candidate_id, distance) in candidates {
            if candidate_id == *id || absorbed.contains(&candidate_id) {
                continue;
            }
            if distance > max_distance {
                break; // ordered by distance
            }
            let Some(candidate) = store::try_get(conn, &candidate_id)? else {
                continue;
            };
            if witness_set(&record) != witness_set(&candidate) {
                continue;
            }

            merge_pair(conn, id, &candidate_id)?;
            absorbed.insert(candidate_id);
            merged += 1;
        }
    }

    if merged > 0 {
        tracing::info!(merged, "consolidation pass complete");
    }
    Ok(CleanupSummary {
        merged,
        ..Default::default()
    })
}

/// Monthly job: renormalise `importance` via each record's decay function.
///
/// `logarithmic`: `importance ← importance · exp(-λ·age_days)`.
/// `linear`: `importance ← max(0, importance - λ·age_days)`.
pub fn decay_importance(
    conn: &mut Connection,
    config: &CleanupConfig,
) -> EngramResult<CleanupSummary> {
    let now = chrono::Utc::now();
    let rows: Vec<(String, f64, String, String)> = {
        let mut stmt = conn.prepare(
            "SELECT id, importance, retention_decay, created_at FROM memories \
             WHERE retention_decay != 'none' AND importance IS NOT NULL",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let mut demoted = 0usize;
    for (id, importance, decay, created_at) in rows {
        let age_days = match chrono::DateTime::parse_from_rfc3339(&created_at) {
            Ok(created) => {
                (now - created.with_timezone(&chrono::Utc)).num_seconds() as f64 / 86_400.0
            }
            Err(_) => continue,
        };
        let decayed = match decay.as_str() {
            "logarithmic" => importance * (-config.decay_lambda * age_days.max(0.0)).exp(),
            "linear" => (importance - config.decay_lambda * age_days.max(0.0)).max(0.0),
            _ => continue,
        };
        if (decayed - importance).abs() > f64::EPSILON {
            conn.execute(
                "UPDATE memories SET importance = ?1 WHERE id = ?2",
                params![decayed, id],
            )?;
            demoted += 1;
        }
    }

    if demoted > 0 {
        write_audit_log(
            conn,
            "decay",
            "batch",
            Some(&serde_json::json!({ "demoted": demoted, "lambda": config.decay_lambda })),
        )?;
        tracing::info!(demoted, "importance decay pass complete");
    }
    Ok(CleanupSummary {
        demoted,
        ..Default::default()
    })
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn near_neighbours(
    conn: &Connection,
    vector: &[f32],
    limit: usize,
) -> EngramResult<Vec<(String, f64)>> {
    let unit = l2_normalize(vector);
    let mut stmt = conn.prepare(
        "SELECT id, distance FROM memories_vec WHERE embedding MATCH ?1 \
         ORDER BY distance LIMIT ?2",
    )?;
    let results = stmt
        .query_map(params![embedding_to_bytes(&unit), limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(results)
}

fn witness_set(record: &crate::memory::types::MemoryRecord) -> HashSet<String> {
    record
        .witnessed_by
        .iter()
        .map(|w| normalize_entity_id(w))
        .collect()
}

/// Fold `loser` into `survivor` and delete the loser.
fn merge_pair(conn: &mut Connection, survivor: &str, loser: &str) -> EngramResult<()> {
    let (survivor_text, survivor_conf, survivor_ts): (String, Option<f64>, String) = conn
        .query_row(
            "SELECT content_text, confidence, timestamp FROM memories WHERE id = ?1",
            params![survivor],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
    let (loser_text, loser_conf, loser_ts): (String, Option<f64>, String) = conn.query_row(
        "SELECT content_text, confidence, timestamp FROM memories WHERE id = ?1",
        params![loser],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let merged_text = format!("{survivor_text}\n{loser_text}");
    let merged_conf = match (survivor_conf, loser_conf) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };
    let merged_ts = if loser_ts < survivor_ts { loser_ts } else { survivor_ts };

    conn.execute(
        "UPDATE memories SET content_text = ?1, confidence = ?2, timestamp = ?3 WHERE id = ?4",
        params![merged_text, merged_conf, merged_ts, survivor],
    )?;

    write_audit_log(
        conn,
        "merge",
        survivor,
        Some(&serde_json::json!({ "absorbed": loser })),
    )?;
    store::delete(conn, loser)?;
    Ok(())
}

/// Remove vec0 rows whose backing memory row is gone.
fn sweep_orphaned_vectors(conn: &Connection) -> EngramResult<usize> {
    let orphans: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT v.id FROM memories_vec v LEFT JOIN memories m ON m.id = v.id \
             WHERE m.id IS NULL",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    };
    for id in &orphans {
        conn.execute("DELETE FROM memories_vec WHERE id = ?1", params![id])?;
    }
    Ok(orphans.len())
}
