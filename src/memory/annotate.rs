//! Append-only annotations.
//!
//! Annotations attach notes to a memory without ever mutating it. Only a
//! witness of the parent memory may annotate; the witness check lives in the
//! engine so this module stays a pure storage concern.

use rusqlite::{params, Connection};

use crate::error::{EngramError, EngramResult};
use crate::memory::store::write_audit_log;
use crate::memory::types::{now_rfc3339, Annotation};
use crate::memory::{bytes_to_embedding, embedding_to_bytes};

/// Append an annotation to a memory. Fails with `NotFound` if the parent is
/// absent. The parent record is not touched.
pub fn append(
    conn: &mut Connection,
    memory_id: &str,
    annotation: &Annotation,
) -> EngramResult<()> {
    let tx = conn.transaction()?;

    let exists: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM memories WHERE id = ?1",
        params![memory_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(EngramError::not_found("memory", memory_id));
    }

    let created_at = if annotation.created_at.is_empty() {
        now_rfc3339()
    } else {
        annotation.created_at.clone()
    };

    tx.execute(
        "INSERT INTO annotations (memory_id, annotator_id, annotation_type, content, \
         vector, confidence, tags, evidence_links, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            memory_id,
            annotation.annotator_id,
            annotation.annotation_type,
            annotation.content,
            annotation.vector.as_ref().map(|v| embedding_to_bytes(v)),
            annotation.confidence,
            serde_json::to_string(&annotation.tags)?,
            serde_json::to_string(&annotation.evidence_links)?,
            created_at,
        ],
    )?;

    write_audit_log(
        &tx,
        "annotate",
        memory_id,
        Some(&serde_json::json!({ "annotator_id": annotation.annotator_id })),
    )?;

    tx.commit()?;
    Ok(())
}

/// List a memory's annotations in append order.
pub fn list(conn: &Connection, memory_id: &str) -> EngramResult<Vec<Annotation>> {
    let mut stmt = conn.prepare(
        "SELECT annotator_id, annotation_type, content, vector, confidence, tags, \
         evidence_links, created_at FROM annotations WHERE memory_id = ?1 ORDER BY id",
    )?;
    let annotations = stmt
        .query_map(params![memory_id], |row| {
            let vector_blob: Option<Vec<u8>> = row.get(3)?;
            let tags_json: Option<String> = row.get(5)?;
            let links_json: Option<String> = row.get(6)?;
            Ok(Annotation {
                annotator_id: row.get(0)?,
                annotation_type: row.get(1)?,
                content: row.get(2)?,
                vector: vector_blob.map(|b| bytes_to_embedding(&b)),
                confidence: row.get(4)?,
                tags: tags_json
                    .and_then(|s| serde_json::from_str(&s).ok())
                    .unwrap_or_default(),
                evidence_links: links_json
                    .and_then(|s| serde_json::from_str(&s).ok())
                    .unwrap_or_default(),
                created_at: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(annotations)
}

/// Count a memory's annotations.
pub fn count(conn: &Connection, memory_id: &str) -> EngramResult<u32> {
    let n: u32 = conn.query_row(
        "SELECT COUNT(*) FROM annotations WHERE memory_id = ?1",
        params![memory_id],
        |row| row.get(0),
    )?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::memory::store;
    use crate::memory::types::{
        MemoryContent, MemoryMetadata, MemoryRecord, MemoryType, PrivacyLevel,
    };

    const DIMS: usize = 8;

    fn test_db_with_memory(id: &str) -> Connection {
        let mut conn = db::open_memory_database(DIMS).unwrap();
        let mut vector = vec![0.0f32; DIMS];
        vector[0] = 1.0;
        let record = MemoryRecord {
            memory_id: id.to_string(),
            content: MemoryContent::from_text("annotated memory"),
            vector,
            metadata: MemoryMetadata {
                timestamp: "2026-08-01T00:00:00Z".to_string(),
                memory_type: MemoryType::Fact,
                agent_id: None,
                domain: None,
                confidence: None,
                importance: None,
                topic_tags: vec![],
                interaction_quality: None,
                situation_duration_minutes: None,
            },
            tags: vec![],
            witnessed_by: vec!["alice".to_string()],
            situation_id: "sit-ann".to_string(),
            situation_type: "conversation".to_string(),
            privacy_level: PrivacyLevel::ParticipantsOnly,
            causality: None,
            retention: None,
            created_at: now_rfc3339(),
            access_count: 0,
            last_accessed_at: None,
        };
        store::put(&mut conn, &record, DIMS).unwrap();
        conn
    }

    fn note(annotator: &str, content: &str) -> Annotation {
        Annotation {
            annotator_id: annotator.to_string(),
            annotation_type: "observation".to_string(),
            content: content.to_string(),
            vector: None,
            confidence: Some(0.8),
            tags: vec!["note".to_string()],
            evidence_links: vec![],
            created_at: String::new(),
        }
    }

    #[test]
    fn append_n_times_adds_exactly_n() {
        let mut conn = test_db_with_memory("mem-ann000000001");
        for i in 0..3 {
            append(&mut conn, "mem-ann000000001", &note("alice", &format!("note {i}"))).unwrap();
        }
        assert_eq!(count(&conn, "mem-ann000000001").unwrap(), 3);

        let listed = list(&conn, "mem-ann000000001").unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].content, "note 0");
        assert_eq!(listed[2].content, "note 2");
    }

    #[test]
    fn append_does_not_mutate_parent() {
        let mut conn = test_db_with_memory("mem-ann000000002");
        let before = store::get(&conn, "mem-ann000000002").unwrap();

        append(&mut conn, "mem-ann000000002", &note("alice", "a note")).unwrap();

        let after = store::get(&conn, "mem-ann000000002").unwrap();
        assert_eq!(after.content.text, before.content.text);
        assert_eq!(after.access_count, before.access_count);
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(after.witnessed_by, before.witnessed_by);
    }

    #[test]
    fn append_to_missing_parent_fails() {
        let mut conn = db::open_memory_database(DIMS).unwrap();
        let err = append(&mut conn, "mem-nope00000000", &note("alice", "x")).unwrap_err();
        assert!(matches!(err, EngramError::NotFound(_)));
    }

    #[test]
    fn annotation_vector_round_trips() {
        let mut conn = test_db_with_memory("mem-ann000000003");
        let mut a = note("claude", "with vector");
        a.vector = Some(vec![0.5f32; DIMS]);
        append(&mut conn, "mem-ann000000003", &a).unwrap();

        let listed = list(&conn, "mem-ann000000003").unwrap();
        assert_eq!(listed[0].vector.as_deref(), Some(&[0.5f32; DIMS][..]));
        assert_eq!(listed[0].created_at.is_empty(), false);
    }
}
