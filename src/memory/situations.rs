//! Situation lookup.
//!
//! Situations are created implicitly by the write path ([`crate::memory::store`])
//! and garbage-collected when their last memory is deleted; this module is the
//! read side.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{EngramError, EngramResult};
use crate::memory::types::{normalize_entity_id, Situation, SituationStatus};

/// Load one situation with its member memory IDs.
pub fn get(conn: &Connection, situation_id: &str) -> EngramResult<Situation> {
    let row = conn
        .query_row(
            "SELECT id, situation_type, participants, status, created_at, last_activity \
             FROM situations WHERE id = ?1",
            params![situation_id],
            |row| {
                let participants_json: String = row.get(2)?;
                let status_str: String = row.get(3)?;
                Ok(Situation {
                    situation_id: row.get(0)?,
                    situation_type: row.get(1)?,
                    participants: serde_json::from_str(&participants_json)
                        .unwrap_or_default(),
                    memory_ids: Vec::new(),
                    created_at: row.get(4)?,
                    last_activity: row.get(5)?,
                    status: parse_status(&status_str),
                })
            },
        )
        .optional()?;

    let Some(mut situation) = row else {
        return Err(EngramError::not_found("situation", situation_id));
    };
    situation.memory_ids = member_memory_ids(conn, situation_id)?;
    Ok(situation)
}

/// Situations in which the entity appears as a participant, ordered by
/// `last_activity` descending.
pub fn for_entity(conn: &Connection, entity_id: &str) -> EngramResult<Vec<Situation>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT s.id, s.last_activity FROM situations s \
         JOIN memories m ON m.situation_id = s.id \
         JOIN memory_witnesses w ON w.memory_id = m.id \
         WHERE w.entity_id_norm = ?1 \
         ORDER BY s.last_activity DESC",
    )?;
    let ids = stmt
        .query_map(params![normalize_entity_id(entity_id)], |row| {
            row.get::<_, String>(0)
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut situations = Vec::with_capacity(ids.len());
    for id in ids {
        situations.push(get(conn, &id)?);
    }
    // DISTINCT loses the outer ordering on some query plans; re-sort to be sure.
    situations.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
    Ok(situations)
}

fn member_memory_ids(conn: &Connection, situation_id: &str) -> EngramResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM memories WHERE situation_id = ?1 ORDER BY created_at",
    )?;
    let ids = stmt
        .query_map(params![situation_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

fn parse_status(s: &str) -> SituationStatus {
    match s {
        "archived" => SituationStatus::Archived,
        "private" => SituationStatus::Private,
        _ => SituationStatus::Active,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::memory::store;
    use crate::memory::types::{
        now_rfc3339, MemoryContent, MemoryMetadata, MemoryRecord, MemoryType, PrivacyLevel,
    };

    const DIMS: usize = 8;

    fn record(id: &str, situation: &str, witnesses: &[&str]) -> MemoryRecord {
        let mut vector = vec![0.0f32; DIMS];
        vector[0] = 1.0;
        MemoryRecord {
            memory_id: id.to_string(),
            content: MemoryContent::from_text("situation member"),
            vector,
            metadata: MemoryMetadata {
                timestamp: "2026-08-01T00:00:00Z".to_string(),
                memory_type: MemoryType::Conversation,
                agent_id: None,
                domain: None,
                confidence: None,
                importance: None,
                topic_tags: vec![],
                interaction_quality: None,
                situation_duration_minutes: None,
            },
            tags: vec![],
            witnessed_by: witnesses.iter().map(|s| s.to_string()).collect(),
            situation_id: situation.to_string(),
            situation_type: "group_discussion".to_string(),
            privacy_level: PrivacyLevel::ParticipantsOnly,
            causality: None,
            retention: None,
            created_at: now_rfc3339(),
            access_count: 0,
            last_accessed_at: None,
        }
    }

    #[test]
    fn get_returns_members_and_participants() {
        let mut conn = db::open_memory_database(DIMS).unwrap();
        store::put(&mut conn, &record("mem-sit00000001", "sit-a", &["alice", "bob"]), DIMS)
            .unwrap();
        store::put(&mut conn, &record("mem-sit00000002", "sit-a", &["alice", "claude"]), DIMS)
            .unwrap();

        let situation = get(&conn, "sit-a").unwrap();
        assert_eq!(situation.situation_type, "group_discussion");
        assert_eq!(situation.participants, vec!["alice", "bob", "claude"]);
        assert_eq!(
            situation.memory_ids,
            vec!["mem-sit00000001", "mem-sit00000002"]
        );
        assert_eq!(situation.status, SituationStatus::Active);
    }

    #[test]
    fn for_entity_lists_only_witnessed_situations() {
        let mut conn = db::open_memory_database(DIMS).unwrap();
        store::put(&mut conn, &record("mem-sit00000003", "sit-b", &["alice"]), DIMS).unwrap();
        store::put(&mut conn, &record("mem-sit00000004", "sit-c", &["bob"]), DIMS).unwrap();

        let for_alice = for_entity(&conn, "alice").unwrap();
        assert_eq!(for_alice.len(), 1);
        assert_eq!(for_alice[0].situation_id, "sit-b");

        assert!(for_entity(&conn, "dave").unwrap().is_empty());
    }

    #[test]
    fn unknown_situation_is_not_found() {
        let conn = db::open_memory_database(DIMS).unwrap();
        assert!(matches!(
            get(&conn, "sit-missing").unwrap_err(),
            EngramError::NotFound(_)
        ));
    }
}
